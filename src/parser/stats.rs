use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Diagnostic counters maintained by the parsers and the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Counter {
    HwtsStart = 0,
    HwtsEnd = 1,
    HwtsInvalid = 2,
    HwtsRepeatStart = 3,
    HwtsRepeatEnd = 4,
    HwtsEndBeforeStart = 5,
    HwtsMerged = 6,
    TsTimeline = 7,
    TsRepeatPhase = 8,
    TsMerged = 9,
    TsKeypoint = 10,
    TsKeypointDropped = 11,
    TsOther = 12,
    FftsRecords = 13,
    FftsRepeat = 14,
    FftsMerged = 15,
    RtTrack = 16,
    RtRepeat = 17,
    RtAgedDropped = 18,
    GeApi = 19,
    GeModel = 20,
    GeModelRejected = 21,
    GeNode = 22,
    GeContext = 23,
    GeTaskDesc = 24,
    GeHash = 25,
    GeMatched = 26,
    GeAgedDropped = 27,
    DeviceAttempts = 28,
    DeviceMerged = 29,
    StepAssigned = 30,
    DescUploaded = 31,
    DescRejected = 32,
    DescDataError = 33,
    DescUnknownShape = 34,
    InternFailed = 35,
    UploadFailed = 36,
    Malformed = 37,
    ChunkUnrouted = 38,
    GeSkipped = 39,
}

/// Number of counters, used for array sizing.
pub const COUNTER_CARDINALITY: usize = 40;

impl Counter {
    /// Returns the canonical log label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HwtsStart => "hwts_start",
            Self::HwtsEnd => "hwts_end",
            Self::HwtsInvalid => "hwts_invalid",
            Self::HwtsRepeatStart => "hwts_repeat_start",
            Self::HwtsRepeatEnd => "hwts_repeat_end",
            Self::HwtsEndBeforeStart => "hwts_end_before_start",
            Self::HwtsMerged => "hwts_merged",
            Self::TsTimeline => "ts_timeline",
            Self::TsRepeatPhase => "ts_repeat_phase",
            Self::TsMerged => "ts_merged",
            Self::TsKeypoint => "ts_keypoint",
            Self::TsKeypointDropped => "ts_keypoint_dropped",
            Self::TsOther => "ts_other",
            Self::FftsRecords => "ffts_records",
            Self::FftsRepeat => "ffts_repeat",
            Self::FftsMerged => "ffts_merged",
            Self::RtTrack => "rt_track",
            Self::RtRepeat => "rt_repeat",
            Self::RtAgedDropped => "rt_aged_dropped",
            Self::GeApi => "ge_api",
            Self::GeModel => "ge_model",
            Self::GeModelRejected => "ge_model_rejected",
            Self::GeNode => "ge_node",
            Self::GeContext => "ge_context",
            Self::GeTaskDesc => "ge_task_desc",
            Self::GeHash => "ge_hash",
            Self::GeMatched => "ge_matched",
            Self::GeAgedDropped => "ge_aged_dropped",
            Self::DeviceAttempts => "device_attempts",
            Self::DeviceMerged => "device_merged",
            Self::StepAssigned => "step_assigned",
            Self::DescUploaded => "desc_uploaded",
            Self::DescRejected => "desc_rejected",
            Self::DescDataError => "desc_data_error",
            Self::DescUnknownShape => "desc_unknown_shape",
            Self::InternFailed => "intern_failed",
            Self::UploadFailed => "upload_failed",
            Self::Malformed => "malformed",
            Self::ChunkUnrouted => "chunk_unrouted",
            Self::GeSkipped => "ge_skipped",
        }
    }

    /// Return all counters in numeric order.
    pub fn all() -> &'static [Self] {
        &[
            Self::HwtsStart,
            Self::HwtsEnd,
            Self::HwtsInvalid,
            Self::HwtsRepeatStart,
            Self::HwtsRepeatEnd,
            Self::HwtsEndBeforeStart,
            Self::HwtsMerged,
            Self::TsTimeline,
            Self::TsRepeatPhase,
            Self::TsMerged,
            Self::TsKeypoint,
            Self::TsKeypointDropped,
            Self::TsOther,
            Self::FftsRecords,
            Self::FftsRepeat,
            Self::FftsMerged,
            Self::RtTrack,
            Self::RtRepeat,
            Self::RtAgedDropped,
            Self::GeApi,
            Self::GeModel,
            Self::GeModelRejected,
            Self::GeNode,
            Self::GeContext,
            Self::GeTaskDesc,
            Self::GeHash,
            Self::GeMatched,
            Self::GeAgedDropped,
            Self::DeviceAttempts,
            Self::DeviceMerged,
            Self::StepAssigned,
            Self::DescUploaded,
            Self::DescRejected,
            Self::DescDataError,
            Self::DescUnknownShape,
            Self::InternFailed,
            Self::UploadFailed,
            Self::Malformed,
            Self::ChunkUnrouted,
            Self::GeSkipped,
        ]
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producer stream a chunk was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SourceKind {
    GeHash = 0,
    GeApiEvent = 1,
    GeCompact = 2,
    GeGraphIdMap = 3,
    GeContext = 4,
    GeTaskDesc = 5,
    RtCompact = 6,
    Hwts = 7,
    Ffts = 8,
    Ts = 9,
}

pub const SOURCE_KIND_CARDINALITY: usize = 10;

impl SourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GeHash => "ge_hash",
            Self::GeApiEvent => "ge_api_event",
            Self::GeCompact => "ge_compact",
            Self::GeGraphIdMap => "ge_graph_id_map",
            Self::GeContext => "ge_context",
            Self::GeTaskDesc => "ge_task_desc",
            Self::RtCompact => "rt_compact",
            Self::Hwts => "hwts",
            Self::Ffts => "ffts",
            Self::Ts => "ts",
        }
    }

    /// Dispatch order: the first kind whose predicate matches wins.
    pub fn all() -> &'static [Self] {
        &[
            Self::GeHash,
            Self::GeApiEvent,
            Self::GeCompact,
            Self::GeGraphIdMap,
            Self::GeContext,
            Self::GeTaskDesc,
            Self::RtCompact,
            Self::Hwts,
            Self::Ffts,
            Self::Ts,
        ]
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte totals for one source kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteStats {
    pub total: u64,
    pub analyzed: u64,
    pub discarded: u64,
}

/// Lock-free diagnostic counters.
///
/// Written on the decode thread, readable from any thread.
pub struct AnalyzerStats {
    counts: [AtomicU64; COUNTER_CARDINALITY],
    bytes_total: [AtomicU64; SOURCE_KIND_CARDINALITY],
    bytes_analyzed: [AtomicU64; SOURCE_KIND_CARDINALITY],
    bytes_discarded: [AtomicU64; SOURCE_KIND_CARDINALITY],
}

impl AnalyzerStats {
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            bytes_total: std::array::from_fn(|_| AtomicU64::new(0)),
            bytes_analyzed: std::array::from_fn(|_| AtomicU64::new(0)),
            bytes_discarded: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Increment the counter by one.
    pub fn record(&self, c: Counter) {
        self.record_n(c, 1);
    }

    /// Increment the counter by n.
    pub fn record_n(&self, c: Counter, n: u64) {
        if let Some(counter) = self.counts.get(c as usize) {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn get(&self, c: Counter) -> u64 {
        self.counts
            .get(c as usize)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Add byte totals observed by one reassembly pass.
    pub fn record_bytes(&self, kind: SourceKind, total: u64, analyzed: u64, discarded: u64) {
        let i = kind as usize;
        if let Some(v) = self.bytes_total.get(i) {
            v.fetch_add(total, Ordering::Relaxed);
        }
        if let Some(v) = self.bytes_analyzed.get(i) {
            v.fetch_add(analyzed, Ordering::Relaxed);
        }
        if let Some(v) = self.bytes_discarded.get(i) {
            v.fetch_add(discarded, Ordering::Relaxed);
        }
    }

    pub fn bytes(&self, kind: SourceKind) -> ByteStats {
        let i = kind as usize;
        let load = |arr: &[AtomicU64; SOURCE_KIND_CARDINALITY]| {
            arr.get(i).map(|v| v.load(Ordering::Relaxed)).unwrap_or(0)
        };
        ByteStats {
            total: load(&self.bytes_total),
            analyzed: load(&self.bytes_analyzed),
            discarded: load(&self.bytes_discarded),
        }
    }

    /// Read all non-zero counters without resetting them.
    pub fn snapshot(&self) -> Vec<(Counter, u64)> {
        Counter::all()
            .iter()
            .filter_map(|c| {
                let v = self.get(*c);
                (v > 0).then_some((*c, v))
            })
            .collect()
    }
}

impl Default for AnalyzerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_table_matches_cardinality() {
        assert_eq!(Counter::all().len(), COUNTER_CARDINALITY);
        for (i, c) in Counter::all().iter().enumerate() {
            assert_eq!(*c as usize, i);
        }
        assert_eq!(SourceKind::all().len(), SOURCE_KIND_CARDINALITY);
    }

    #[test]
    fn test_record_and_snapshot() {
        let stats = AnalyzerStats::new();
        stats.record(Counter::HwtsStart);
        stats.record(Counter::HwtsStart);
        stats.record_n(Counter::DescUploaded, 5);

        let snap = stats.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.contains(&(Counter::HwtsStart, 2)));
        assert!(snap.contains(&(Counter::DescUploaded, 5)));

        // Snapshots do not reset.
        assert_eq!(stats.get(Counter::HwtsStart), 2);
    }

    #[test]
    fn test_byte_stats_accumulate() {
        let stats = AnalyzerStats::new();
        stats.record_bytes(SourceKind::Ts, 100, 64, 0);
        stats.record_bytes(SourceKind::Ts, 10, 40, 6);
        assert_eq!(
            stats.bytes(SourceKind::Ts),
            ByteStats {
                total: 110,
                analyzed: 104,
                discarded: 6,
            }
        );
        assert_eq!(stats.bytes(SourceKind::Hwts), ByteStats::default());
    }

    #[test]
    fn test_counter_display() {
        assert_eq!(Counter::HwtsMerged.to_string(), "hwts_merged");
        assert_eq!(SourceKind::GeApiEvent.to_string(), "ge_api_event");
    }
}
