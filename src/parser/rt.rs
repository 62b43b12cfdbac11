use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::chunk::Frame;
use super::record::{DecodedRecord, OpKey, RtTrackRecord};
use super::stats::{AnalyzerStats, Counter};
use super::wire::{decode_rt_track, GE_COMPACT_SIZE};

/// Source tags carrying runtime task-track compact records.
pub fn is_rt_compact_data(name: &str) -> bool {
    name.contains("compact") && name.contains("task_track")
}

/// Host-side launch of one device task, waiting for its device timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtOpInfo {
    pub thread_id: u32,
    /// Host clock, nanoseconds.
    pub timestamp: u64,
    pub age_flag: bool,
}

/// Collects runtime task-track records keyed by (task, stream).
pub struct RtParser {
    stats: Arc<AnalyzerStats>,
    counterparts: HashMap<OpKey, Vec<RtOpInfo>>,
    len: usize,
}

impl RtParser {
    pub fn new(stats: Arc<AnalyzerStats>) -> Self {
        Self {
            stats,
            counterparts: HashMap::new(),
            len: 0,
        }
    }

    pub fn frame(&mut self, data: &[u8], aging: bool) -> Frame {
        if data.len() < GE_COMPACT_SIZE {
            return Frame::Incomplete;
        }
        match decode_rt_track(&data[..GE_COMPACT_SIZE]) {
            Ok(DecodedRecord::RtTrack(record)) => self.handle(record, aging),
            Ok(other) => debug!(record = other.name(), "unexpected record in rt stream"),
            Err(e) => {
                self.stats.record(Counter::Malformed);
                warn!(error = %e, "dropping rt task track record");
            }
        }
        Frame::Record(GE_COMPACT_SIZE)
    }

    fn handle(&mut self, record: RtTrackRecord, aging: bool) {
        self.stats.record(Counter::RtTrack);
        let key = OpKey::new(record.task_id, u32::from(record.stream_id));
        let info = RtOpInfo {
            thread_id: record.thread_id,
            timestamp: record.timestamp,
            age_flag: aging,
        };
        let list = self.counterparts.entry(key).or_default();
        if list
            .iter()
            .any(|c| c.thread_id == info.thread_id && c.timestamp == info.timestamp)
        {
            self.stats.record(Counter::RtRepeat);
            debug!(%key, timestamp = info.timestamp, "duplicate rt task track");
            return;
        }
        list.push(info);
        self.len += 1;
    }

    /// Counterparts for `key` in arrival order.
    pub fn counterparts(&self, key: &OpKey) -> &[RtOpInfo] {
        self.counterparts
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn remove(&mut self, key: &OpKey, pos: usize) -> Option<RtOpInfo> {
        let list = self.counterparts.get_mut(key)?;
        if pos >= list.len() {
            return None;
        }
        let info = list.remove(pos);
        if list.is_empty() {
            self.counterparts.remove(key);
        }
        self.len -= 1;
        Some(info)
    }

    /// Drop aged counterparts nothing consumed. Returns how many went.
    pub fn drop_aged(&mut self) -> usize {
        let mut dropped = 0;
        self.counterparts.retain(|_, list| {
            let before = list.len();
            list.retain(|c| !c.age_flag);
            dropped += before - list.len();
            !list.is_empty()
        });
        self.len -= dropped;
        if dropped > 0 {
            self.stats.record_n(Counter::RtAgedDropped, dropped as u64);
            debug!(dropped, "dropped aged rt counterparts");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
