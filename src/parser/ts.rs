use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::chunk::Frame;
use super::freq::FrequencyConverter;
use super::record::{DecodedRecord, OpFlag, OpKey, OpTimeRecord, OpTimeTable, TsTimelineRecord};
use super::stats::{AnalyzerStats, Counter};
use super::wire::{decode_ts, decode_ts_header, DecodeError, TS_HEADER_SIZE};
use crate::analyzer::step::StepTable;

pub const TS_TASK_STATE_START: u16 = 2;
pub const TS_TASK_STATE_END: u16 = 3;
pub const TS_TASK_STATE_AICORE_START: u16 = 7;
pub const TS_TASK_STATE_AICORE_END: u16 = 8;

pub fn is_ts_data(name: &str) -> bool {
    name.contains("ts_track.data")
}

/// Builds four-phase timeline records and the step table from the TS
/// stream.
pub struct TsParser {
    freq: FrequencyConverter,
    stats: Arc<AnalyzerStats>,
    drafts: HashMap<OpKey, OpTimeRecord>,
    completed: OpTimeTable,
    newly_completed: Vec<OpKey>,
    steps: StepTable,
}

impl TsParser {
    pub fn new(freq: FrequencyConverter, stats: Arc<AnalyzerStats>) -> Self {
        Self {
            freq,
            stats,
            drafts: HashMap::with_capacity(256),
            completed: OpTimeTable::new(),
            newly_completed: Vec::new(),
            steps: StepTable::new(),
        }
    }

    /// Framing callback: records are prefixed by a header carrying their
    /// total length.
    pub fn frame(&mut self, data: &[u8]) -> Frame {
        let header = match decode_ts_header(data) {
            Ok(header) => header,
            Err(_) => return Frame::Incomplete,
        };
        let size = usize::from(header.buf_size);
        if size < TS_HEADER_SIZE {
            self.stats.record(Counter::Malformed);
            warn!(
                buf_size = header.buf_size,
                rpt_type = header.rpt_type,
                "invalid ts record length"
            );
            return Frame::Corrupt;
        }
        if size > data.len() {
            return Frame::Incomplete;
        }

        match decode_ts(&data[..size]) {
            Ok(DecodedRecord::TsTimeline(record)) => self.handle_timeline(record),
            Ok(DecodedRecord::TsKeypoint(record)) => {
                self.stats.record(Counter::TsKeypoint);
                let ts = self.freq.to_ns(record.timestamp);
                if !self.steps.on_keypoint(&record, ts) {
                    self.stats.record(Counter::TsKeypointDropped);
                }
            }
            Ok(DecodedRecord::TsOther { rpt_type }) => {
                self.stats.record(Counter::TsOther);
                debug!(rpt_type, size, "skipping ts record");
            }
            Ok(other) => debug!(record = other.name(), "unexpected record in ts stream"),
            Err(e @ (DecodeError::SizeMismatch { .. } | DecodeError::ZeroTimestamp { .. })) => {
                self.stats.record(Counter::TsKeypointDropped);
                warn!(error = %e, "dropping ts keypoint");
            }
            Err(e) => {
                self.stats.record(Counter::Malformed);
                warn!(error = %e, "dropping ts record");
            }
        }
        Frame::Record(size)
    }

    fn handle_timeline(&mut self, record: TsTimelineRecord) {
        self.stats.record(Counter::TsTimeline);
        let key = OpKey::new(u32::from(record.task_id), u32::from(record.stream_id));
        let ts = self.freq.to_ns(record.timestamp);
        if !matches!(
            record.task_state,
            TS_TASK_STATE_START
                | TS_TASK_STATE_END
                | TS_TASK_STATE_AICORE_START
                | TS_TASK_STATE_AICORE_END
        ) {
            debug!(%key, state = record.task_state, "ignoring ts task state");
            return;
        }

        let draft = self
            .drafts
            .entry(key)
            .or_insert_with(|| OpTimeRecord::new(key, OpFlag::Op));
        let slot = match record.task_state {
            TS_TASK_STATE_START => &mut draft.start,
            TS_TASK_STATE_END => &mut draft.end,
            TS_TASK_STATE_AICORE_START => &mut draft.start_aicore,
            TS_TASK_STATE_AICORE_END => &mut draft.end_aicore,
            _ => return,
        };
        if *slot != 0 {
            self.stats.record(Counter::TsRepeatPhase);
            warn!(
                %key,
                state = record.task_state,
                old = *slot,
                new = ts,
                "repeated ts task state"
            );
        }
        *slot = ts;
        draft.thread_id = record.thread_id;

        if draft.has_all_phases() {
            if let Some(done) = self.drafts.remove(&key) {
                self.completed.push(done);
                self.newly_completed.push(key);
                self.stats.record(Counter::TsMerged);
            }
        }
    }

    pub fn completed(&self) -> &OpTimeTable {
        &self.completed
    }

    pub fn completed_mut(&mut self) -> &mut OpTimeTable {
        &mut self.completed
    }

    pub fn steps(&self) -> &StepTable {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut StepTable {
        &mut self.steps
    }

    /// Completed table and step table borrowed together.
    pub fn tables_mut(&mut self) -> (&mut OpTimeTable, &mut StepTable) {
        (&mut self.completed, &mut self.steps)
    }

    pub fn draft_count(&self) -> usize {
        self.drafts.len()
    }

    pub fn take_newly_completed(&mut self) -> Vec<OpKey> {
        std::mem::take(&mut self.newly_completed)
    }
}
