use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::chunk::Frame;
use super::freq::FrequencyConverter;
use super::record::{
    DecodedRecord, FftsLogKind, FftsRecord, OpFlag, OpKey, OpTimeRecord, OpTimeTable,
};
use super::stats::{AnalyzerStats, Counter};
use super::wire::{decode_ffts, FFTS_RECORD_SIZE};

pub fn is_ffts_data(name: &str) -> bool {
    name.contains("ffts.data")
}

/// Pairs FFTS queue-level task logs and thread-level sub-task logs.
pub struct FftsParser {
    freq: FrequencyConverter,
    stats: Arc<AnalyzerStats>,
    drafts: HashMap<OpKey, OpTimeRecord>,
    completed: OpTimeTable,
    newly_completed: Vec<OpKey>,
}

impl FftsParser {
    pub fn new(freq: FrequencyConverter, stats: Arc<AnalyzerStats>) -> Self {
        Self {
            freq,
            stats,
            drafts: HashMap::with_capacity(256),
            completed: OpTimeTable::new(),
            newly_completed: Vec::new(),
        }
    }

    pub fn frame(&mut self, data: &[u8]) -> Frame {
        if data.len() < FFTS_RECORD_SIZE {
            return Frame::Incomplete;
        }
        match decode_ffts(&data[..FFTS_RECORD_SIZE]) {
            Ok(Some(DecodedRecord::Ffts(record))) => self.handle(record),
            Ok(Some(other)) => debug!(record = other.name(), "unexpected record in ffts stream"),
            Ok(None) => {}
            Err(e) => {
                self.stats.record(Counter::Malformed);
                warn!(error = %e, "dropping ffts record");
            }
        }
        Frame::Record(FFTS_RECORD_SIZE)
    }

    fn handle(&mut self, record: FftsRecord) {
        self.stats.record(Counter::FftsRecords);
        let task_id = u32::from(record.task_id);
        let stream_id = u32::from(record.stream_id);
        let (key, flag) = match record.sub_task_id {
            Some(sub) => (
                OpKey::with_context(task_id, stream_id, u32::from(sub)),
                OpFlag::OpThread,
            ),
            None => (OpKey::new(task_id, stream_id), OpFlag::Op),
        };
        let ts = self.freq.to_ns(record.syscnt);

        let draft = self
            .drafts
            .entry(key)
            .or_insert_with(|| OpTimeRecord::new(key, flag));
        draft.thread_id = u32::from(record.ffts_thread_id);
        let slot = match record.kind {
            FftsLogKind::TaskStart | FftsLogKind::SubTaskStart => &mut draft.start,
            FftsLogKind::TaskEnd | FftsLogKind::SubTaskEnd => &mut draft.end,
        };
        if *slot != 0 {
            self.stats.record(Counter::FftsRepeat);
            warn!(%key, log_type = record.log_type, old = *slot, new = ts, "repeated ffts log");
        }
        *slot = ts;

        if draft.has_span() {
            if let Some(done) = self.drafts.remove(&key) {
                self.completed.push(done);
                self.newly_completed.push(key);
                self.stats.record(Counter::FftsMerged);
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

    pub fn take_newly_completed(&mut self) -> Vec<OpKey> {
        std::mem::take(&mut self.newly_completed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::parser::wire::{
        pack_ffts_header, FftsHeader, FFTS_LOG_SUBTASK_END, FFTS_LOG_SUBTASK_START,
        FFTS_LOG_TASK_END, FFTS_LOG_TASK_START,
    };

    fn ffts_record(log_type: u8, raw_stream: u16, raw_task: u16, syscnt: u64, sub: u16) -> Vec<u8> {
        let mut data = vec![0u8; FFTS_RECORD_SIZE];
        let header = pack_ffts_header(FftsHeader {
            log_type,
            count: 1,
            sqe_type: 0,
        });
        data[0..2].copy_from_slice(&header.to_le_bytes());
        data[4..6].copy_from_slice(&raw_stream.to_le_bytes());
        data[6..8].copy_from_slice(&raw_task.to_le_bytes());
        data[8..12].copy_from_slice(&(syscnt as u32).to_le_bytes());
        data[12..16].copy_from_slice(&((syscnt >> 32) as u32).to_le_bytes());
        data[18..20].copy_from_slice(&sub.to_le_bytes());
        data
    }

    fn parser() -> (FftsParser, Arc<AnalyzerStats>) {
        let stats = Arc::new(AnalyzerStats::new());
        (
            FftsParser::new(FrequencyConverter::new(1.0), Arc::clone(&stats)),
            stats,
        )
    }

    #[test]
    fn test_queue_level_pair() {
        let (mut p, stats) = parser();
        p.frame(&ffts_record(FFTS_LOG_TASK_START, 3, 40, 100, 0));
        p.frame(&ffts_record(FFTS_LOG_TASK_END, 3, 40, 300, 0));
        let r = p.completed().get(&OpKey::new(40, 3))[0];
        assert_eq!((r.start, r.end), (100, 300));
        assert_eq!(r.flag, OpFlag::Op);
        assert_eq!(stats.get(Counter::FftsMerged), 1);
    }

    #[test]
    fn test_thread_level_keys_carry_context() {
        let (mut p, _) = parser();
        p.frame(&ffts_record(FFTS_LOG_SUBTASK_START, 3, 40, 100, 2));
        p.frame(&ffts_record(FFTS_LOG_SUBTASK_START, 3, 40, 110, 5));
        p.frame(&ffts_record(FFTS_LOG_SUBTASK_END, 3, 40, 200, 5));
        assert_eq!(p.draft_count(), 1);

        let key = OpKey::with_context(40, 3, 5);
        let r = p.completed().get(&key)[0];
        assert_eq!(r.flag, OpFlag::OpThread);
        assert_eq!((r.start, r.end), (110, 200));
        assert_eq!(p.take_newly_completed(), vec![key]);
    }

    #[test]
    fn test_ids_are_rolled_back() {
        let (mut p, _) = parser();
        // Bit 12 set on the stream field.
        let raw_stream = 0x1000 | 0x0007;
        p.frame(&ffts_record(FFTS_LOG_TASK_START, raw_stream, 0x0020, 100, 0));
        p.frame(&ffts_record(FFTS_LOG_TASK_END, raw_stream, 0x0020, 150, 0));
        assert_eq!(p.completed().get(&OpKey::new(0x0020, 7)).len(), 1);
    }

    #[test]
    fn test_other_log_types_ignored() {
        let (mut p, stats) = parser();
        assert_eq!(p.frame(&ffts_record(12, 3, 40, 100, 0)), Frame::Record(64));
        assert_eq!(p.draft_count(), 0);
        assert_eq!(stats.get(Counter::FftsRecords), 0);
    }

    #[test]
    fn test_repeat_counted() {
        let (mut p, stats) = parser();
        p.frame(&ffts_record(FFTS_LOG_TASK_START, 3, 40, 100, 0));
        p.frame(&ffts_record(FFTS_LOG_TASK_START, 3, 40, 120, 0));
        p.frame(&ffts_record(FFTS_LOG_TASK_END, 3, 40, 300, 0));
        assert_eq!(stats.get(Counter::FftsRepeat), 1);
        assert_eq!(p.completed().get(&OpKey::new(40, 3))[0].start, 120);
    }
}
