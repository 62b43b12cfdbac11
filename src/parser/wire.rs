//! Wire decoding for every producer record format.
//!
//! Each decoder checks the record length once, then reads fields at fixed
//! little-endian offsets and returns a [`DecodedRecord`]. Framing (how many
//! bytes the next record needs) lives with each parser; these functions
//! only ever see one whole record.

use thiserror::Error;

use super::record::{
    DecodedRecord, FftsLogKind, FftsRecord, GeApiRecord, GeContextRecord, GeEventRecord,
    GeGraphIdMapRecord, GeNodeRecord, GeTaskDescRecord, HwtsRecord, HwtsRptType, RtTrackRecord,
    ShapeType, TsKeypointRecord, TsTimelineRecord,
};

/// HWTS and FFTS records are fixed 64 bytes.
pub const HWTS_RECORD_SIZE: usize = 64;
pub const FFTS_RECORD_SIZE: usize = 64;

/// TS header: mode u8, rpt_type u8, buf_size u16, reserved u32.
pub const TS_HEADER_SIZE: usize = 8;
pub const TS_TIMELINE_SIZE: usize = 32;
pub const TS_KEYPOINT_SIZE: usize = 40;
pub const TS_RPT_TYPE_TIMELINE: u8 = 3;
pub const TS_RPT_TYPE_KEYPOINT: u8 = 10;

/// GE record sizes; the family is known from the source, not the bytes.
pub const GE_API_EVENT_SIZE: usize = 40;
pub const GE_COMPACT_SIZE: usize = 64;
pub const GE_ADDITIONAL_SIZE: usize = 256;
const GE_HEADER_SIZE: usize = 24;
pub const GE_MAGIC: u16 = 0x5A5A;

/// End-timestamp value that marks a 40-byte GE record as an event.
pub const GE_EVENT_FLAG: u64 = u64::MAX;

pub const GE_LEVEL_RUNTIME: u16 = 5000;
pub const GE_LEVEL_NODE: u16 = 10000;
pub const GE_LEVEL_MODEL: u16 = 20000;

pub const GE_TYPE_NODE_LAUNCH: u32 = 5;
pub const GE_TYPE_MODEL_LOAD: u32 = 2;
pub const GE_TYPE_NODE_BASIC_INFO: u32 = 0;
pub const GE_TYPE_TASK_TRACK: u32 = 1;
pub const GE_TYPE_GRAPH_ID_MAP: u32 = 0;
pub const GE_TYPE_CONTEXT_ID_INFO: u32 = 4;
pub const GE_TYPE_TASK_DESC: u32 = 6;

/// Most context ids that fit in one additional-info payload.
pub const GE_MAX_CONTEXT_IDS: usize = 55;

const HWTS_RPT_TYPE_MASK: u8 = 0b0000_0111;
const HWTS_COUNT_SHIFT: u8 = 4;

const FFTS_LOG_TYPE_MASK: u16 = 0x003F;
const FFTS_COUNT_SHIFT: u16 = 6;
const FFTS_COUNT_MASK: u16 = 0x000F;
const FFTS_SQE_TYPE_SHIFT: u16 = 10;
const FFTS_SQE_TYPE_MASK: u16 = 0x003F;

pub const FFTS_LOG_TASK_START: u8 = 0;
pub const FFTS_LOG_TASK_END: u8 = 1;
pub const FFTS_LOG_SUBTASK_START: u8 = 34;
pub const FFTS_LOG_SUBTASK_END: u8 = 35;

/// Errors produced while decoding a single record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{record}: need {need} bytes, have {have}")]
    Incomplete {
        record: &'static str,
        need: usize,
        have: usize,
    },

    #[error("{record}: invalid record length {len}")]
    InvalidLength { record: &'static str, len: usize },

    #[error("{record}: bad magic number {magic:#06x}")]
    BadMagic { record: &'static str, magic: u16 },

    #[error("{record}: unknown report type {raw}")]
    UnknownReportType { record: &'static str, raw: u32 },

    #[error("{record}: size {len} does not match expected {expected}")]
    SizeMismatch {
        record: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("{record}: zero timestamp")]
    ZeroTimestamp { record: &'static str },

    #[error("{record}: context id count {count} exceeds {max}")]
    ContextOverflow {
        record: &'static str,
        count: u32,
        max: usize,
    },

    #[error("{record}: {reason}")]
    Protocol {
        record: &'static str,
        reason: &'static str,
    },
}

impl DecodeError {
    /// Incomplete data is expected and never logged as an error.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

// ---------------------------------------------------------------------------
// Byte-reading helpers (callers check lengths up front)
// ---------------------------------------------------------------------------

#[inline]
fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    data.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .unwrap_or([0; N])
}

#[inline]
pub(crate) fn read_u8(data: &[u8], offset: usize) -> u8 {
    data.get(offset).copied().unwrap_or(0)
}

#[inline]
pub(crate) fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(read_fixed::<2>(data, offset))
}

#[inline]
pub(crate) fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(read_fixed::<4>(data, offset))
}

#[inline]
pub(crate) fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(read_fixed::<8>(data, offset))
}

fn ensure_len(data: &[u8], need: usize, record: &'static str) -> Result<(), DecodeError> {
    if data.len() < need {
        Err(DecodeError::Incomplete {
            record,
            need,
            have: data.len(),
        })
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HWTS
// ---------------------------------------------------------------------------

/// Report type from the first byte of an HWTS record.
pub fn hwts_rpt_type(byte0: u8) -> HwtsRptType {
    match byte0 & HWTS_RPT_TYPE_MASK {
        0 => HwtsRptType::Start,
        1 => HwtsRptType::End,
        _ => HwtsRptType::Invalid,
    }
}

/// HWTS record, 64 bytes.
///
/// ```text
/// 0  u8  cnt(4) | res(1) | type(3)
/// 1  u8  core id
/// 2  u16 0x6bd3
/// 4  u16 reserved
/// 6  u16 stream id
/// 8  u16 task id
/// 16 u64 syscnt
/// ```
pub fn decode_hwts(data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    ensure_len(data, HWTS_RECORD_SIZE, "hwts")?;
    let byte0 = read_u8(data, 0);
    Ok(DecodedRecord::Hwts(HwtsRecord {
        rpt_type: hwts_rpt_type(byte0),
        count: byte0 >> HWTS_COUNT_SHIFT,
        stream_id: read_u16_le(data, 6),
        task_id: read_u16_le(data, 8),
        syscnt: read_u64_le(data, 16),
    }))
}

// ---------------------------------------------------------------------------
// TS
// ---------------------------------------------------------------------------

/// TS record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    pub mode: u8,
    pub rpt_type: u8,
    pub buf_size: u16,
}

pub fn decode_ts_header(data: &[u8]) -> Result<TsHeader, DecodeError> {
    ensure_len(data, TS_HEADER_SIZE, "ts header")?;
    Ok(TsHeader {
        mode: read_u8(data, 0),
        rpt_type: read_u8(data, 1),
        buf_size: read_u16_le(data, 2),
    })
}

/// Decode one whole TS record (`data.len()` equals the header's buf_size).
pub fn decode_ts(data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    let header = decode_ts_header(data)?;
    match header.rpt_type {
        TS_RPT_TYPE_TIMELINE => {
            ensure_len(data, TS_TIMELINE_SIZE, "ts timeline")?;
            Ok(DecodedRecord::TsTimeline(TsTimelineRecord {
                task_type: read_u16_le(data, 8),
                task_state: read_u16_le(data, 10),
                stream_id: read_u16_le(data, 12),
                task_id: read_u16_le(data, 14),
                timestamp: read_u64_le(data, 16),
                thread_id: read_u32_le(data, 24),
                device_id: read_u32_le(data, 28),
            }))
        }
        TS_RPT_TYPE_KEYPOINT => {
            if data.len() != TS_KEYPOINT_SIZE {
                return Err(DecodeError::SizeMismatch {
                    record: "ts keypoint",
                    len: data.len(),
                    expected: TS_KEYPOINT_SIZE,
                });
            }
            let timestamp = read_u64_le(data, 8);
            if timestamp == 0 {
                return Err(DecodeError::ZeroTimestamp {
                    record: "ts keypoint",
                });
            }
            Ok(DecodedRecord::TsKeypoint(TsKeypointRecord {
                timestamp,
                index_id: read_u64_le(data, 16),
                model_id: read_u64_le(data, 24),
                stream_id: read_u16_le(data, 32),
                task_id: read_u16_le(data, 34),
                tag: read_u16_le(data, 36),
            }))
        }
        other => Ok(DecodedRecord::TsOther { rpt_type: other }),
    }
}

// ---------------------------------------------------------------------------
// FFTS
// ---------------------------------------------------------------------------

/// Bit-packed FFTS header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FftsHeader {
    pub log_type: u8,
    pub count: u8,
    pub sqe_type: u8,
}

pub fn unpack_ffts_header(raw: u16) -> FftsHeader {
    FftsHeader {
        log_type: (raw & FFTS_LOG_TYPE_MASK) as u8,
        count: ((raw >> FFTS_COUNT_SHIFT) & FFTS_COUNT_MASK) as u8,
        sqe_type: ((raw >> FFTS_SQE_TYPE_SHIFT) & FFTS_SQE_TYPE_MASK) as u8,
    }
}

pub fn pack_ffts_header(header: FftsHeader) -> u16 {
    (u16::from(header.log_type) & FFTS_LOG_TYPE_MASK)
        | ((u16::from(header.count) & FFTS_COUNT_MASK) << FFTS_COUNT_SHIFT)
        | ((u16::from(header.sqe_type) & FFTS_SQE_TYPE_MASK) << FFTS_SQE_TYPE_SHIFT)
}

const STARS_ID_LOW_MASK: u16 = 0x0FFF;
const STARS_PATTERN_SHIFT: u16 = 12;
const STARS_PATTERN_MASK: u16 = 0b11;
const STARS_PATTERN_SWAPPED: u16 = 0b10;
const STARS_BIT12: u16 = 1 << 12;

/// Recover the true (stream id, task id) from the encoded pair some chips
/// write into STARS logs.
pub fn stars_roll_back(raw_stream_id: u16, raw_task_id: u16) -> (u16, u16) {
    if (raw_stream_id >> STARS_PATTERN_SHIFT) & STARS_PATTERN_MASK == STARS_PATTERN_SWAPPED {
        let task_id = (raw_stream_id & STARS_ID_LOW_MASK) | (raw_task_id & 0xF000);
        let stream_id = raw_task_id & STARS_ID_LOW_MASK;
        (stream_id, task_id)
    } else if raw_stream_id & STARS_BIT12 != 0 {
        let task_id = (raw_task_id & 0x1FFF) | (raw_stream_id & 0xE000);
        let stream_id = raw_stream_id & STARS_ID_LOW_MASK;
        (stream_id, task_id)
    } else {
        (raw_stream_id, raw_task_id)
    }
}

/// FFTS record, 64 bytes.
///
/// ```text
/// 0  u16 log_type(6) | cnt(4) | sqe_type(6)
/// 2  u16 reserved
/// 4  u16 stream id (encoded)
/// 6  u16 task id (encoded)
/// 8  u32 syscnt low
/// 12 u32 syscnt high
/// 16 u8  sub-task type     (thread-level only)
/// 17 u8  ffts type
/// 18 u16 sub-task id
/// 20 u16 thread id
/// ```
///
/// Returns `Ok(None)` for log types outside the two task bands.
pub fn decode_ffts(data: &[u8]) -> Result<Option<DecodedRecord>, DecodeError> {
    ensure_len(data, FFTS_RECORD_SIZE, "ffts")?;
    let header = unpack_ffts_header(read_u16_le(data, 0));
    let kind = match header.log_type {
        FFTS_LOG_TASK_START => FftsLogKind::TaskStart,
        FFTS_LOG_TASK_END => FftsLogKind::TaskEnd,
        FFTS_LOG_SUBTASK_START => FftsLogKind::SubTaskStart,
        FFTS_LOG_SUBTASK_END => FftsLogKind::SubTaskEnd,
        _ => return Ok(None),
    };

    let (stream_id, task_id) = stars_roll_back(read_u16_le(data, 4), read_u16_le(data, 6));
    let low = u64::from(read_u32_le(data, 8));
    let high = u64::from(read_u32_le(data, 12));
    let thread_level = matches!(kind, FftsLogKind::SubTaskStart | FftsLogKind::SubTaskEnd);

    Ok(Some(DecodedRecord::Ffts(FftsRecord {
        kind,
        log_type: header.log_type,
        count: header.count,
        sqe_type: header.sqe_type,
        stream_id,
        task_id,
        syscnt: (high << 32) | low,
        sub_task_id: thread_level.then(|| read_u16_le(data, 18)),
        ffts_thread_id: if thread_level { read_u16_le(data, 20) } else { 0 },
    })))
}

// ---------------------------------------------------------------------------
// GE and runtime (shared 24-byte header for compact/additional records)
// ---------------------------------------------------------------------------

struct GeHeader {
    level: u16,
    record_type: u32,
    thread_id: u32,
    timestamp: u64,
}

fn decode_ge_header(data: &[u8], record: &'static str) -> Result<GeHeader, DecodeError> {
    ensure_len(data, GE_HEADER_SIZE, record)?;
    let magic = read_u16_le(data, 0);
    if magic != GE_MAGIC {
        return Err(DecodeError::BadMagic { record, magic });
    }
    Ok(GeHeader {
        level: read_u16_le(data, 2),
        record_type: read_u32_le(data, 4),
        thread_id: read_u32_le(data, 8),
        timestamp: read_u64_le(data, 16),
    })
}

fn expect_type(
    header: &GeHeader,
    level: u16,
    record_type: u32,
    record: &'static str,
) -> Result<(), DecodeError> {
    if header.level != level || header.record_type != record_type {
        return Err(DecodeError::UnknownReportType {
            record,
            raw: header.record_type,
        });
    }
    Ok(())
}

/// GE api/event record, 40 bytes. Which of the two it is depends on the
/// end field holding [`GE_EVENT_FLAG`].
pub fn decode_ge_api_event(data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    ensure_len(data, GE_API_EVENT_SIZE, "ge api/event")?;
    let magic = read_u16_le(data, 0);
    if magic != GE_MAGIC {
        return Err(DecodeError::BadMagic {
            record: "ge api/event",
            magic,
        });
    }
    let level = read_u16_le(data, 2);
    let record_type = read_u32_le(data, 4);
    let thread_id = read_u32_le(data, 8);
    let end_or_flag = read_u64_le(data, 24);
    let item_id = read_u64_le(data, 32);

    if end_or_flag == GE_EVENT_FLAG {
        Ok(DecodedRecord::GeEvent(GeEventRecord {
            level,
            event_type: record_type,
            thread_id,
            request_id: read_u32_le(data, 12),
            timestamp: read_u64_le(data, 16),
            item_id,
        }))
    } else {
        Ok(DecodedRecord::GeApi(GeApiRecord {
            level,
            api_type: record_type,
            thread_id,
            begin: read_u64_le(data, 16),
            end: end_or_flag,
            item_id,
        }))
    }
}

/// GE node basic info compact record, 64 bytes.
pub fn decode_ge_node(data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    ensure_len(data, GE_COMPACT_SIZE, "ge node basic info")?;
    let header = decode_ge_header(data, "ge node basic info")?;
    expect_type(
        &header,
        GE_LEVEL_NODE,
        GE_TYPE_NODE_BASIC_INFO,
        "ge node basic info",
    )?;
    Ok(DecodedRecord::GeNode(GeNodeRecord {
        thread_id: header.thread_id,
        timestamp: header.timestamp,
        op_name: read_u64_le(data, 24),
        op_type: read_u64_le(data, 32),
        task_type: read_u32_le(data, 40),
        block_dim: read_u32_le(data, 44),
    }))
}

/// Runtime task-track compact record, 64 bytes.
pub fn decode_rt_track(data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    ensure_len(data, GE_COMPACT_SIZE, "rt task track")?;
    let header = decode_ge_header(data, "rt task track")?;
    expect_type(&header, GE_LEVEL_RUNTIME, GE_TYPE_TASK_TRACK, "rt task track")?;
    Ok(DecodedRecord::RtTrack(RtTrackRecord {
        thread_id: header.thread_id,
        timestamp: header.timestamp,
        device_id: read_u16_le(data, 24),
        stream_id: read_u16_le(data, 26),
        task_id: read_u32_le(data, 28),
        task_type: read_u64_le(data, 32),
    }))
}

/// GE context id additional-info record, 256 bytes.
pub fn decode_ge_context(data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    ensure_len(data, GE_ADDITIONAL_SIZE, "ge context id info")?;
    let header = decode_ge_header(data, "ge context id info")?;
    expect_type(
        &header,
        GE_LEVEL_NODE,
        GE_TYPE_CONTEXT_ID_INFO,
        "ge context id info",
    )?;
    let count = read_u32_le(data, 32);
    if count as usize > GE_MAX_CONTEXT_IDS {
        return Err(DecodeError::ContextOverflow {
            record: "ge context id info",
            count,
            max: GE_MAX_CONTEXT_IDS,
        });
    }
    let context_ids = (0..count as usize)
        .map(|i| read_u32_le(data, 36 + i * 4))
        .collect();
    Ok(DecodedRecord::GeContext(GeContextRecord {
        thread_id: header.thread_id,
        timestamp: header.timestamp,
        op_name: read_u64_le(data, 24),
        context_ids,
    }))
}

/// GE graph id map additional-info record, 256 bytes.
pub fn decode_ge_graph_id_map(data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    ensure_len(data, GE_ADDITIONAL_SIZE, "ge graph id map")?;
    let header = decode_ge_header(data, "ge graph id map")?;
    expect_type(&header, GE_LEVEL_MODEL, GE_TYPE_GRAPH_ID_MAP, "ge graph id map")?;
    Ok(DecodedRecord::GeGraphIdMap(GeGraphIdMapRecord {
        graph_id: read_u32_le(data, 24),
        model_id: read_u32_le(data, 28),
    }))
}

/// GE task descriptor additional-info record, 256 bytes.
pub fn decode_ge_task_desc(data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    ensure_len(data, GE_ADDITIONAL_SIZE, "ge task desc")?;
    let header = decode_ge_header(data, "ge task desc")?;
    expect_type(&header, GE_LEVEL_NODE, GE_TYPE_TASK_DESC, "ge task desc")?;
    let shape_raw = read_u32_le(data, 44);
    let shape = ShapeType::from_u32(shape_raw).ok_or(DecodeError::Protocol {
        record: "ge task desc",
        reason: "unknown shape type",
    })?;
    Ok(DecodedRecord::GeTaskDesc(GeTaskDescRecord {
        thread_id: header.thread_id,
        timestamp: header.timestamp,
        model_id: read_u32_le(data, 24),
        stream_id: read_u32_le(data, 28),
        task_id: read_u32_le(data, 32),
        context_id: read_u32_le(data, 36),
        index_id: read_u32_le(data, 40),
        shape,
        op_name: read_u64_le(data, 48),
        op_type: read_u64_le(data, 56),
    }))
}

/// Parse one `hash:name` dictionary line. Blank lines yield `None`.
pub fn parse_hash_line(line: &[u8]) -> Result<Option<(u64, String)>, DecodeError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let (hash, name) = text.split_once(':').ok_or(DecodeError::Protocol {
        record: "ge hash dictionary",
        reason: "missing ':' separator",
    })?;
    let hash = hash.trim().parse::<u64>().map_err(|_| DecodeError::Protocol {
        record: "ge hash dictionary",
        reason: "hash is not an unsigned integer",
    })?;
    Ok(Some((hash, name.trim().to_string())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn hwts_bytes(byte0: u8, stream: u16, task: u16, syscnt: u64) -> Vec<u8> {
        let mut data = vec![0u8; HWTS_RECORD_SIZE];
        data[0] = byte0;
        data[2..4].copy_from_slice(&0x6bd3u16.to_le_bytes());
        data[6..8].copy_from_slice(&stream.to_le_bytes());
        data[8..10].copy_from_slice(&task.to_le_bytes());
        data[16..24].copy_from_slice(&syscnt.to_le_bytes());
        data
    }

    fn ge_header(level: u16, record_type: u32, thread: u32, ts: u64, size: usize) -> Vec<u8> {
        let mut data = vec![0u8; size];
        data[0..2].copy_from_slice(&GE_MAGIC.to_le_bytes());
        data[2..4].copy_from_slice(&level.to_le_bytes());
        data[4..8].copy_from_slice(&record_type.to_le_bytes());
        data[8..12].copy_from_slice(&thread.to_le_bytes());
        data[16..24].copy_from_slice(&ts.to_le_bytes());
        data
    }

    #[test]
    fn test_hwts_rpt_type_low_bits() {
        assert_eq!(hwts_rpt_type(0x00), HwtsRptType::Start);
        assert_eq!(hwts_rpt_type(0x01), HwtsRptType::End);
        assert_eq!(hwts_rpt_type(0x02), HwtsRptType::Invalid);
        // Count bits do not leak into the type.
        assert_eq!(hwts_rpt_type(0xF1), HwtsRptType::End);
        assert_eq!(hwts_rpt_type(0x08), HwtsRptType::Start);
    }

    #[test]
    fn test_decode_hwts() {
        let data = hwts_bytes(0x31, 100, 30, 2_000_000);
        let DecodedRecord::Hwts(r) = decode_hwts(&data).unwrap() else {
            panic!("expected Hwts");
        };
        assert_eq!(r.rpt_type, HwtsRptType::End);
        assert_eq!(r.count, 3);
        assert_eq!(r.stream_id, 100);
        assert_eq!(r.task_id, 30);
        assert_eq!(r.syscnt, 2_000_000);
    }

    #[test]
    fn test_decode_hwts_short() {
        let err = decode_hwts(&[0u8; 10]).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_decode_ts_keypoint_size_mismatch() {
        let mut data = vec![0u8; 48];
        data[1] = TS_RPT_TYPE_KEYPOINT;
        data[2..4].copy_from_slice(&48u16.to_le_bytes());
        data[8..16].copy_from_slice(&10u64.to_le_bytes());
        assert!(matches!(
            decode_ts(&data).unwrap_err(),
            DecodeError::SizeMismatch { len: 48, .. }
        ));
    }

    #[test]
    fn test_decode_ts_keypoint_zero_timestamp() {
        let mut data = vec![0u8; TS_KEYPOINT_SIZE];
        data[1] = TS_RPT_TYPE_KEYPOINT;
        data[2..4].copy_from_slice(&(TS_KEYPOINT_SIZE as u16).to_le_bytes());
        assert!(matches!(
            decode_ts(&data).unwrap_err(),
            DecodeError::ZeroTimestamp { .. }
        ));
    }

    #[test]
    fn test_decode_ts_other_type() {
        let mut data = vec![0u8; 16];
        data[1] = 42;
        data[2..4].copy_from_slice(&16u16.to_le_bytes());
        assert!(matches!(
            decode_ts(&data).unwrap(),
            DecodedRecord::TsOther { rpt_type: 42 }
        ));
    }

    #[test]
    fn test_ffts_header_bits() {
        let header = FftsHeader {
            log_type: 35,
            count: 9,
            sqe_type: 63,
        };
        let raw = pack_ffts_header(header);
        assert_eq!(raw & 0x3F, 35);
        assert_eq!(unpack_ffts_header(raw), header);
    }

    #[test]
    fn test_stars_roll_back_bit12() {
        let raw_stream = 0x1000 | 0xE000 | 0x0123;
        let raw_task = 0x0456;
        let (stream, task) = stars_roll_back(raw_stream, raw_task);
        assert_eq!(stream, raw_stream & 0x0FFF);
        assert_eq!(task, 0x0456 | 0xE000);
    }

    #[test]
    fn test_stars_roll_back_swapped_pattern_roundtrip() {
        let (stream, task) = (0x0ABCu16, 0x5DEFu16);
        // Pre-encode: bits 12-13 of the stream field hold 0b10.
        let raw_stream = (task & 0x0FFF) | 0x2000;
        let raw_task = (task & 0xF000) | stream;
        assert_eq!(stars_roll_back(raw_stream, raw_task), (stream, task));
    }

    #[test]
    fn test_stars_roll_back_plain_ids_unchanged() {
        assert_eq!(stars_roll_back(0x0123, 0x4567), (0x0123, 0x4567));
    }

    #[test]
    fn test_decode_ffts_skips_other_log_types() {
        let mut data = vec![0u8; FFTS_RECORD_SIZE];
        let raw = pack_ffts_header(FftsHeader {
            log_type: 7,
            count: 0,
            sqe_type: 0,
        });
        data[0..2].copy_from_slice(&raw.to_le_bytes());
        assert!(decode_ffts(&data).unwrap().is_none());
    }

    #[test]
    fn test_decode_ffts_syscnt_halves() {
        let mut data = vec![0u8; FFTS_RECORD_SIZE];
        let raw = pack_ffts_header(FftsHeader {
            log_type: FFTS_LOG_SUBTASK_END,
            count: 1,
            sqe_type: 4,
        });
        data[0..2].copy_from_slice(&raw.to_le_bytes());
        data[4..6].copy_from_slice(&7u16.to_le_bytes());
        data[6..8].copy_from_slice(&9u16.to_le_bytes());
        data[8..12].copy_from_slice(&0x0000_0010u32.to_le_bytes());
        data[12..16].copy_from_slice(&0x0000_0002u32.to_le_bytes());
        data[18..20].copy_from_slice(&3u16.to_le_bytes());
        let Some(DecodedRecord::Ffts(r)) = decode_ffts(&data).unwrap() else {
            panic!("expected Ffts");
        };
        assert_eq!(r.kind, FftsLogKind::SubTaskEnd);
        assert_eq!(r.syscnt, (2u64 << 32) | 0x10);
        assert_eq!(r.sub_task_id, Some(3));
        assert_eq!((r.stream_id, r.task_id), (7, 9));
        assert_eq!(r.sqe_type, 4);
    }

    #[test]
    fn test_decode_ge_api_vs_event() {
        let mut api = ge_header(GE_LEVEL_NODE, GE_TYPE_NODE_LAUNCH, 1, 10, GE_API_EVENT_SIZE);
        api[24..32].copy_from_slice(&50u64.to_le_bytes());
        assert!(matches!(
            decode_ge_api_event(&api).unwrap(),
            DecodedRecord::GeApi(GeApiRecord { begin: 10, end: 50, .. })
        ));

        let mut event = ge_header(GE_LEVEL_MODEL, GE_TYPE_MODEL_LOAD, 1, 7, GE_API_EVENT_SIZE);
        event[24..32].copy_from_slice(&GE_EVENT_FLAG.to_le_bytes());
        event[32..40].copy_from_slice(&9u64.to_le_bytes());
        let DecodedRecord::GeEvent(e) = decode_ge_api_event(&event).unwrap() else {
            panic!("expected GeEvent");
        };
        assert_eq!(e.timestamp, 7);
        assert_eq!(e.item_id, 9);
    }

    #[test]
    fn test_decode_ge_bad_magic() {
        let mut data = ge_header(GE_LEVEL_NODE, GE_TYPE_NODE_BASIC_INFO, 1, 1, GE_COMPACT_SIZE);
        data[0] = 0;
        assert!(matches!(
            decode_ge_node(&data).unwrap_err(),
            DecodeError::BadMagic { .. }
        ));
    }

    #[test]
    fn test_decode_ge_node_wrong_type() {
        let data = ge_header(GE_LEVEL_RUNTIME, GE_TYPE_TASK_TRACK, 1, 1, GE_COMPACT_SIZE);
        assert!(matches!(
            decode_ge_node(&data).unwrap_err(),
            DecodeError::UnknownReportType { .. }
        ));
    }

    #[test]
    fn test_decode_ge_context_ids() {
        let mut data = ge_header(
            GE_LEVEL_NODE,
            GE_TYPE_CONTEXT_ID_INFO,
            4,
            20,
            GE_ADDITIONAL_SIZE,
        );
        data[24..32].copy_from_slice(&77u64.to_le_bytes());
        data[32..36].copy_from_slice(&2u32.to_le_bytes());
        data[36..40].copy_from_slice(&5u32.to_le_bytes());
        data[40..44].copy_from_slice(&6u32.to_le_bytes());
        let DecodedRecord::GeContext(r) = decode_ge_context(&data).unwrap() else {
            panic!("expected GeContext");
        };
        assert_eq!(r.context_ids, vec![5, 6]);
        assert_eq!(r.op_name, 77);
    }

    #[test]
    fn test_decode_ge_context_overflow() {
        let mut data = ge_header(
            GE_LEVEL_NODE,
            GE_TYPE_CONTEXT_ID_INFO,
            4,
            20,
            GE_ADDITIONAL_SIZE,
        );
        data[32..36].copy_from_slice(&56u32.to_le_bytes());
        assert!(matches!(
            decode_ge_context(&data).unwrap_err(),
            DecodeError::ContextOverflow { count: 56, .. }
        ));
    }

    #[test]
    fn test_parse_hash_line() {
        assert_eq!(
            parse_hash_line(b"123:Conv2D\n").unwrap(),
            Some((123, "Conv2D".to_string()))
        );
        assert_eq!(parse_hash_line(b"  \n").unwrap(), None);
        assert!(parse_hash_line(b"abc:Conv2D").is_err());
        assert!(parse_hash_line(b"Conv2D").is_err());
    }

    #[test]
    fn test_decode_error_display() {
        let e = DecodeError::InvalidLength {
            record: "ts",
            len: 0,
        };
        assert_eq!(e.to_string(), "ts: invalid record length 0");
        let e = DecodeError::BadMagic {
            record: "ge",
            magic: 0x1234,
        };
        assert_eq!(e.to_string(), "ge: bad magic number 0x1234");
    }
}
