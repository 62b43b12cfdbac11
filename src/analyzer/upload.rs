use tracing::{debug, info, warn};

use super::emit::Emitter;
use super::Analyzer;
use crate::desc::{KEYPOINT_OP_NAME, KEYPOINT_OP_TYPE};
use crate::parser::ge::{GeOpKey, GeParser, OpMeta};
use crate::parser::record::{OpFlag, OpKey, OpTimeRecord, ShapeType};
use crate::parser::stats::{AnalyzerStats, Counter};
use crate::platform::ProfilingMode;

impl Analyzer {
    /// Explicit mode, else the static-shape switch, else inferred from the
    /// data: keypoints mean step trace, completed TS records mean single op.
    /// An inferred mode stays latched once seen, since uploading drains the
    /// tables it was inferred from.
    pub fn mode(&self) -> Option<ProfilingMode> {
        if let Some(mode) = self.platform.mode {
            return Some(mode);
        }
        if self.platform.static_shape {
            return Some(ProfilingMode::StaticShape);
        }
        if !self.ts.steps().is_empty() {
            Some(ProfilingMode::StepTrace)
        } else if self.last_mode.is_some() {
            self.last_mode
        } else if !self.ts.completed().is_empty() {
            Some(ProfilingMode::SingleOp)
        } else {
            None
        }
    }

    fn current_mode(&mut self) -> Option<ProfilingMode> {
        let mode = self.mode();
        if mode != self.last_mode {
            info!(mode = ?mode, previous = ?self.last_mode, "profiling mode selected");
            self.last_mode = mode;
        }
        mode
    }

    /// Assign step indices to HWTS and TS records that lack one, then
    /// forget uploaded steps older than the newest index assigned.
    /// Returns that index.
    pub fn update_op_index_id(&mut self) -> u64 {
        let (ts_table, steps) = self.ts.tables_mut();
        let hwts_table = self.hwts.completed_mut();

        let mut max_index = 0;
        let mut assigned = 0u64;
        for table in [hwts_table, ts_table] {
            for record in table.iter_mut().filter(|r| r.index_id == 0) {
                let index = steps.op_index_id(record.start);
                if index != 0 {
                    record.index_id = index;
                    max_index = max_index.max(index);
                    assigned += 1;
                }
            }
        }

        if max_index > 0 {
            let pruned = steps.prune_uploaded_below(max_index);
            if pruned > 0 {
                debug!(pruned, max_index, "pruned uploaded steps");
            }
        }
        self.stats.record_n(Counter::StepAssigned, assigned);
        max_index
    }

    /// Emit HWTS and TS records whose GE descriptor is known, following the
    /// active mode. Records without a match yet stay for a later pass.
    pub(crate) fn upload_by_mode(&mut self) {
        let Some(mode) = self.current_mode() else {
            return;
        };
        let static_shape = self.platform.static_shape;
        let Self {
            hwts,
            ts,
            ge,
            emitter,
            stats,
            ..
        } = self;

        for table in [hwts.completed_mut(), ts.completed_mut()] {
            table.retain(|record| match mode {
                ProfilingMode::StepTrace => upload_step_trace(record, ge, emitter, stats),
                ProfilingMode::StaticShape => {
                    upload_static_shape(record, static_shape, ge, emitter, stats)
                }
                ProfilingMode::SingleOp => upload_base(record, ge, emitter),
            });
        }
    }

    /// Emit one descriptor per closed step not uploaded yet.
    pub(crate) fn upload_keypoints(&mut self) {
        let one_shot = self.current_mode() == Some(ProfilingMode::StaticShape);
        let Self {
            ts, ge, emitter, ..
        } = self;

        ts.steps_mut().retain(|kp| {
            if kp.is_open() || kp.uploaded {
                return true;
            }
            let mut record = OpTimeRecord::new(
                OpKey::new(u32::from(kp.task_id), u32::from(kp.stream_id)),
                OpFlag::None,
            );
            record.index_id = kp.index_id;
            record.start = kp.start_time;
            record.end = kp.end_time;
            let meta = OpMeta {
                name: KEYPOINT_OP_NAME.to_string(),
                op_type: KEYPOINT_OP_TYPE.to_string(),
                model_id: ge
                    .graph_id_for(kp.model_id)
                    .map(u64::from)
                    .unwrap_or(kp.model_id),
                thread_id: 0,
            };
            emitter.construct_and_upload(&record, &meta);
            kp.uploaded = true;
            !one_shot
        });
    }
}

/// Both the step-agnostic and the step-specific descriptor existing is a
/// data error; the record is dropped.
fn upload_step_trace(
    record: &OpTimeRecord,
    ge: &mut GeParser,
    emitter: &Emitter,
    stats: &AnalyzerStats,
) -> bool {
    if record.index_id == 0 {
        return true;
    }
    let base = GeOpKey::new(record.key.base(), 0);
    let indexed = GeOpKey::new(record.key.base(), record.index_id);
    match (ge.is_op_info_completed(&base), ge.is_op_info_completed(&indexed)) {
        (true, true) => {
            stats.record(Counter::DescDataError);
            warn!(
                key = %record.key,
                index_id = record.index_id,
                "ge descriptor exists both per step and for all steps"
            );
            false
        }
        (true, false) => upload_base(record, ge, emitter),
        (false, true) => {
            if let Some(meta) = ge.remove_op_info(&indexed).map(OpMeta::from) {
                emitter.construct_and_upload(record, &meta);
            }
            false
        }
        (false, false) => true,
    }
}

fn upload_static_shape(
    record: &OpTimeRecord,
    static_shape: bool,
    ge: &mut GeParser,
    emitter: &Emitter,
    stats: &AnalyzerStats,
) -> bool {
    if !static_shape {
        match ge.stream_shape(record.key.stream_id) {
            None => return true,
            Some(ShapeType::Dynamic) => {
                stats.record(Counter::DescUnknownShape);
                debug!(key = %record.key, "dropping record on dynamic-shape stream");
                return false;
            }
            Some(ShapeType::Static) => {}
        }
    }
    upload_base(record, ge, emitter)
}

/// Emit against the step-agnostic descriptor, which stays for reuse.
fn upload_base(record: &OpTimeRecord, ge: &GeParser, emitter: &Emitter) -> bool {
    match ge.op_meta(&GeOpKey::new(record.key.base(), 0)) {
        Some(meta) => {
            emitter.construct_and_upload(record, &meta);
            false
        }
        None => true,
    }
}
