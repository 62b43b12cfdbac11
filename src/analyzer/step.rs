use tracing::{debug, warn};

use crate::parser::record::{KeypointOp, TsKeypointRecord};

pub const KEYPOINT_TAG_START: u16 = 0;
pub const KEYPOINT_TAG_END: u16 = 1;

/// Training-step intervals built from TS keypoints.
///
/// At most one interval is open at a time: a start opens one at the tail,
/// the matching end closes it.
#[derive(Debug, Default)]
pub struct StepTable {
    keypoints: Vec<KeypointOp>,
}

impl StepTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one keypoint with its timestamp already in nanoseconds.
    /// Returns false when the keypoint was rejected.
    pub fn on_keypoint(&mut self, record: &TsKeypointRecord, timestamp: u64) -> bool {
        match record.tag {
            KEYPOINT_TAG_START => {
                if self.keypoints.last().is_some_and(KeypointOp::is_open) {
                    warn!(
                        index_id = record.index_id,
                        timestamp, "keypoint start while previous step still open"
                    );
                    return false;
                }
                self.keypoints.push(KeypointOp {
                    stream_id: record.stream_id,
                    task_id: record.task_id,
                    index_id: record.index_id,
                    model_id: record.model_id,
                    start_time: timestamp,
                    ..Default::default()
                });
                true
            }
            KEYPOINT_TAG_END => match self.keypoints.last_mut() {
                Some(last) if last.is_open() && timestamp > last.start_time => {
                    last.end_time = timestamp;
                    true
                }
                _ => {
                    warn!(
                        index_id = record.index_id,
                        timestamp, "keypoint end without a matching open start"
                    );
                    false
                }
            },
            tag => {
                debug!(tag, "unknown keypoint tag");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn closed_count(&self) -> usize {
        self.keypoints.iter().filter(|k| !k.is_open()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeypointOp> {
        self.keypoints.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut KeypointOp> {
        self.keypoints.iter_mut()
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&mut KeypointOp) -> bool,
    {
        self.keypoints.retain_mut(keep);
    }

    /// Step index whose interval strictly contains `timestamp`, or 0.
    ///
    /// With fewer than two closed steps there is not enough data to
    /// assign anything.
    pub fn op_index_id(&mut self, timestamp: u64) -> u64 {
        if self.closed_count() < 2 {
            return 0;
        }
        let hit = self
            .keypoints
            .iter_mut()
            .filter(|k| !k.is_open())
            .find(|k| k.start_time < timestamp && timestamp < k.end_time);
        match hit {
            Some(k) => {
                k.find_succ_times += 1;
                k.index_id
            }
            None => {
                debug!(timestamp, "no step contains timestamp");
                0
            }
        }
    }

    /// Forget uploaded steps older than `max_index`.
    pub fn prune_uploaded_below(&mut self, max_index: u64) -> usize {
        let before = self.keypoints.len();
        self.keypoints
            .retain(|k| !(k.uploaded && k.index_id < max_index));
        before - self.keypoints.len()
    }
}
