use std::sync::Arc;

use tracing::{debug, warn};

use crate::desc::{OpIndexTable, ProfOpDesc, FFTS_PLUS_OP_TYPE};
use crate::parser::ge::OpMeta;
use crate::parser::record::{OpFlag, OpTimeRecord};
use crate::parser::stats::{AnalyzerStats, Counter};
use crate::upload::Uploader;

/// Builds signed descriptors and hands them to the uploader.
pub(crate) struct Emitter {
    index_table: Arc<OpIndexTable>,
    uploader: Arc<dyn Uploader>,
    stats: Arc<AnalyzerStats>,
}

impl Emitter {
    pub fn new(
        index_table: Arc<OpIndexTable>,
        uploader: Arc<dyn Uploader>,
        stats: Arc<AnalyzerStats>,
    ) -> Self {
        Self {
            index_table,
            uploader,
            stats,
        }
    }

    /// Returns true when the descriptor reached the uploader.
    pub fn construct_and_upload(&self, record: &OpTimeRecord, meta: &OpMeta) -> bool {
        if record.start > record.end || record.start_aicore > record.end_aicore {
            self.stats.record(Counter::DescRejected);
            warn!(
                key = %record.key,
                start = record.start,
                end = record.end,
                start_aicore = record.start_aicore,
                end_aicore = record.end_aicore,
                "dropping descriptor with inverted timestamps"
            );
            return false;
        }

        let op_index = self.index_table.intern(&meta.op_type, &meta.name);
        if op_index == 0 {
            self.stats.record(Counter::InternFailed);
            debug!(key = %record.key, "op index table exhausted");
            return false;
        }

        let flag = if meta.op_type == FFTS_PLUS_OP_TYPE {
            OpFlag::Subgraph
        } else {
            record.flag
        };
        let desc = ProfOpDesc {
            flag,
            model_id: meta.model_id,
            thread_id: meta.thread_id,
            op_index,
            duration: record.end - record.start,
            start: record.start,
            end: record.end,
            execution_time: record.end_aicore - record.start_aicore,
            cube_fops: 0,
            vector_fops: 0,
        };

        match self.uploader.upload_data(desc.encode().to_vec()) {
            Ok(()) => {
                self.stats.record(Counter::DescUploaded);
                true
            }
            Err(e) => {
                // Nobody will resolve this index now.
                let _ = self.index_table.resolve(op_index);
                self.stats.record(Counter::UploadFailed);
                warn!(uploader = self.uploader.name(), error = %e, "upload failed");
                false
            }
        }
    }
}
