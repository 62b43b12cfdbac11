use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::chunk::Frame;
use super::freq::FrequencyConverter;
use super::record::{DecodedRecord, HwtsRecord, HwtsRptType, OpFlag, OpKey, OpTimeRecord, OpTimeTable};
use super::stats::{AnalyzerStats, Counter};
use super::wire::{decode_hwts, HWTS_RECORD_SIZE};

/// Source tags carrying HWTS records.
pub fn is_hwts_data(name: &str) -> bool {
    name.contains("hwts.data")
}

/// Pairs HWTS start/end records into completed timing entries.
pub struct HwtsParser {
    freq: FrequencyConverter,
    stats: Arc<AnalyzerStats>,
    drafts: HashMap<OpKey, OpTimeRecord>,
    completed: OpTimeTable,
    newly_completed: Vec<OpKey>,
}

impl HwtsParser {
    pub fn new(freq: FrequencyConverter, stats: Arc<AnalyzerStats>) -> Self {
        Self {
            freq,
            stats,
            drafts: HashMap::with_capacity(256),
            completed: OpTimeTable::new(),
            newly_completed: Vec::new(),
        }
    }

    /// Framing callback for the reassembler: one fixed 64-byte record.
    pub fn frame(&mut self, data: &[u8]) -> Frame {
        if data.len() < HWTS_RECORD_SIZE {
            return Frame::Incomplete;
        }
        match decode_hwts(&data[..HWTS_RECORD_SIZE]) {
            Ok(DecodedRecord::Hwts(record)) => self.handle(record),
            Ok(other) => debug!(record = other.name(), "unexpected record in hwts stream"),
            Err(e) => {
                self.stats.record(Counter::Malformed);
                warn!(error = %e, "dropping hwts record");
            }
        }
        Frame::Record(HWTS_RECORD_SIZE)
    }

    fn handle(&mut self, record: HwtsRecord) {
        let is_start = match record.rpt_type {
            HwtsRptType::Start => true,
            HwtsRptType::End => false,
            HwtsRptType::Invalid => {
                self.stats.record(Counter::HwtsInvalid);
                return;
            }
        };

        let key = OpKey::new(u32::from(record.task_id), u32::from(record.stream_id));
        let ts = self.freq.to_ns(record.syscnt);
        let draft = self
            .drafts
            .entry(key)
            .or_insert_with(|| OpTimeRecord::new(key, OpFlag::Op));

        if is_start {
            self.stats.record(Counter::HwtsStart);
            if draft.start != 0 {
                self.stats.record(Counter::HwtsRepeatStart);
                warn!(%key, old = draft.start, new = ts, "repeated hwts start");
            }
            draft.start = ts;
        } else {
            self.stats.record(Counter::HwtsEnd);
            if draft.end != 0 {
                self.stats.record(Counter::HwtsRepeatEnd);
                warn!(%key, old = draft.end, new = ts, "repeated hwts end");
            }
            draft.end = ts;
        }

        if draft.start != 0 && draft.end != 0 && draft.end < draft.start {
            self.stats.record(Counter::HwtsEndBeforeStart);
            warn!(%key, start = draft.start, end = draft.end, "hwts end before start");
        }

        if draft.has_span() {
            if let Some(done) = self.drafts.remove(&key) {
                self.completed.push(done);
                self.newly_completed.push(key);
                self.stats.record(Counter::HwtsMerged);
            }
        }
    }

    pub fn completed(&self) -> &OpTimeTable {
        &self.completed
    }

    pub fn completed_mut(&mut self) -> &mut OpTimeTable {
        &mut self.completed
    }

    pub fn draft_count(&self) -> usize {
        self.drafts.len()
    }

    /// Keys promoted since the last call, oldest first.
    pub fn take_newly_completed(&mut self) -> Vec<OpKey> {
        std::mem::take(&mut self.newly_completed)
    }
}
