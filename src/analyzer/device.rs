use tracing::debug;

use super::emit::Emitter;
use super::Analyzer;
use crate::parser::ge::GeParser;
use crate::parser::record::{OpKey, OpTimeRecord, OpTimeTable};
use crate::parser::rt::RtParser;
use crate::parser::stats::{AnalyzerStats, Counter};

/// Completed table a device record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceTable {
    Hwts,
    Ts,
    Ffts,
}

impl Analyzer {
    pub(crate) fn device_keys(&self, table: DeviceTable) -> Vec<OpKey> {
        match table {
            DeviceTable::Hwts => self.hwts.completed().keys(),
            DeviceTable::Ts => self.ts.completed().keys(),
            DeviceTable::Ffts => self.ffts.completed().keys(),
        }
    }

    /// Try to attribute completed device records under `keys` to a GE
    /// operation through their runtime launch record. Returns how many
    /// descriptors were emitted.
    pub(crate) fn handle_device_data(&mut self, table: DeviceTable, keys: &[OpKey]) -> usize {
        let Self {
            hwts,
            ts,
            ffts,
            rt,
            ge,
            emitter,
            stats,
            ..
        } = self;
        let completed = match table {
            DeviceTable::Hwts => hwts.completed_mut(),
            DeviceTable::Ts => ts.completed_mut(),
            DeviceTable::Ffts => ffts.completed_mut(),
        };

        let mut seen = Vec::with_capacity(keys.len());
        let mut merged = 0;
        for key in keys {
            if seen.contains(key) {
                continue;
            }
            seen.push(*key);
            merged += correlate_key(completed, key, rt, ge, emitter, stats);
        }
        merged
    }
}

fn correlate_key(
    completed: &mut OpTimeTable,
    key: &OpKey,
    rt: &mut RtParser,
    ge: &mut GeParser,
    emitter: &Emitter,
    stats: &AnalyzerStats,
) -> usize {
    let mut merged = 0;
    let mut pos = 0;
    while let Some(record) = completed.get(key).get(pos).copied() {
        if try_match(&record, rt, ge, emitter, stats) {
            completed.remove(key, pos);
            merged += 1;
        } else {
            pos += 1;
        }
    }
    merged
}

/// Match one device record: the first runtime counterpart, in arrival
/// order, whose thread has a resolved GE window containing the launch
/// time wins.
fn try_match(
    record: &OpTimeRecord,
    rt: &mut RtParser,
    ge: &mut GeParser,
    emitter: &Emitter,
    stats: &AnalyzerStats,
) -> bool {
    let rt_key = record.key.base();
    let context = record.key.has_context().then_some(record.key.context_id);
    if rt.counterparts(&rt_key).is_empty() {
        return false;
    }
    stats.record(Counter::DeviceAttempts);

    let hit = rt
        .counterparts(&rt_key)
        .iter()
        .enumerate()
        .find_map(|(i, c)| {
            ge.take_resolved(c.thread_id, c.timestamp, context)
                .map(|info| (i, c.thread_id, info))
        });
    let Some((pos, thread_id, info)) = hit else {
        return false;
    };

    let meta = ge.meta_for(&info, thread_id);
    emitter.construct_and_upload(record, &meta);
    // Sub-task records share one launch; keep it for the siblings.
    if !record.key.has_context() {
        rt.remove(&rt_key, pos);
    }
    stats.record(Counter::DeviceMerged);
    debug!(key = %record.key, op = %meta.name, "device record merged");
    true
}
