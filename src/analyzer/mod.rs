//! Correlation engine.
//!
//! Routes each chunk to its producer parser, then stitches the producers'
//! tables together: GE metadata onto device timing, step indices onto
//! device records, and finally descriptors out through the uploader.

mod device;
pub(crate) mod emit;
pub mod source;
pub mod step;
mod upload;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::desc::OpIndexTable;
use crate::parser::chunk::ChunkReassembler;
use crate::parser::ffts::FftsParser;
use crate::parser::ge::{is_aging, is_hash_data, GeParser};
use crate::parser::hwts::HwtsParser;
use crate::parser::rt::RtParser;
use crate::parser::stats::{AnalyzerStats, Counter, SourceKind};
use crate::parser::ts::TsParser;
use crate::platform::{FrequencyTable, PlatformContext, ProfilingMode};
use crate::upload::Uploader;

use self::device::DeviceTable;
use self::emit::Emitter;
use self::source::{classify, stream_name};

/// One slice of producer output.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Producer file name, e.g. `hwts.data.0.slice_3`.
    pub source_tag: String,
    pub payload: Vec<u8>,
    pub size_hint: u32,
}

impl Chunk {
    pub fn new(source_tag: impl Into<String>, payload: Vec<u8>) -> Self {
        let size_hint = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Self {
            source_tag: source_tag.into(),
            payload,
            size_hint,
        }
    }
}

/// Owns every parser table for one profiling session.
pub struct Analyzer {
    platform: PlatformContext,
    stats: Arc<AnalyzerStats>,
    index_table: Arc<OpIndexTable>,
    streams: HashMap<String, ChunkReassembler>,
    ge: GeParser,
    hwts: HwtsParser,
    ts: TsParser,
    ffts: FftsParser,
    rt: RtParser,
    emitter: Emitter,
    last_mode: Option<ProfilingMode>,
}

impl Analyzer {
    pub fn new(
        platform: PlatformContext,
        freq: FrequencyTable,
        index_table: Arc<OpIndexTable>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        let stats = Arc::new(AnalyzerStats::new());
        info!(
            chip = %platform.chip,
            static_shape = platform.static_shape,
            mode = ?platform.mode,
            uploader = uploader.name(),
            "analyzer created"
        );
        Self {
            platform,
            ge: GeParser::new(platform.chip, Arc::clone(&stats)),
            hwts: HwtsParser::new(freq.hwts(), Arc::clone(&stats)),
            ts: TsParser::new(freq.ts(), Arc::clone(&stats)),
            ffts: FftsParser::new(freq.ffts(), Arc::clone(&stats)),
            rt: RtParser::new(Arc::clone(&stats)),
            emitter: Emitter::new(Arc::clone(&index_table), uploader, Arc::clone(&stats)),
            index_table,
            streams: HashMap::new(),
            stats,
            last_mode: None,
        }
    }

    /// Route one chunk to its parser and run whatever correlation the new
    /// records make possible. Never fails; bad data is logged and counted.
    pub fn feed(&mut self, chunk: &Chunk) {
        let tag = chunk.source_tag.as_str();
        let Some(kind) = classify(tag) else {
            self.stats.record(Counter::ChunkUnrouted);
            debug!(source = tag, size = chunk.payload.len(), "no parser for chunk");
            return;
        };
        if chunk.size_hint as usize != chunk.payload.len() {
            debug!(
                source = tag,
                size_hint = chunk.size_hint,
                size = chunk.payload.len(),
                "chunk size hint differs from payload"
            );
        }

        let aging = is_aging(tag);
        let stream = self
            .streams
            .entry(stream_name(tag).to_string())
            .or_default();
        let before = (
            stream.total_bytes(),
            stream.analyzed_bytes(),
            stream.discarded_bytes(),
        );
        stream.append(&chunk.payload);

        let records = match kind {
            SourceKind::GeHash => stream.consume(|d| self.ge.frame_hash_dictionary(d)),
            SourceKind::GeApiEvent => stream.consume(|d| self.ge.frame_api_event(d, aging)),
            SourceKind::GeCompact => stream.consume(|d| self.ge.frame_node(d, aging)),
            SourceKind::GeGraphIdMap => stream.consume(|d| self.ge.frame_graph_id_map(d)),
            SourceKind::GeContext => stream.consume(|d| self.ge.frame_context(d, aging)),
            SourceKind::GeTaskDesc => stream.consume(|d| self.ge.frame_task_desc(d)),
            SourceKind::RtCompact => stream.consume(|d| self.rt.frame(d, aging)),
            SourceKind::Hwts => stream.consume(|d| self.hwts.frame(d)),
            SourceKind::Ffts => stream.consume(|d| self.ffts.frame(d)),
            SourceKind::Ts => stream.consume(|d| self.ts.frame(d)),
        };

        self.stats.record_bytes(
            kind,
            stream.total_bytes() - before.0,
            stream.analyzed_bytes() - before.1,
            stream.discarded_bytes() - before.2,
        );
        debug!(source = tag, %kind, records, "chunk parsed");

        match kind {
            SourceKind::Hwts => {
                let keys = self.hwts.take_newly_completed();
                self.handle_device_data(DeviceTable::Hwts, &keys);
            }
            SourceKind::Ffts => {
                let keys = self.ffts.take_newly_completed();
                self.handle_device_data(DeviceTable::Ffts, &keys);
            }
            SourceKind::Ts => {
                let keys = self.ts.take_newly_completed();
                self.handle_device_data(DeviceTable::Ts, &keys);
                self.post_process();
            }
            _ => {}
        }
    }

    /// Matching, step assignment and upload after new TS data.
    fn post_process(&mut self) {
        self.ge.match_api_info();
        if self.ge.resolved_len() > 0 {
            self.correlate_pending();
        }
        self.update_op_index_id();
        self.upload_by_mode();
        self.upload_keypoints();
    }

    /// Retry device correlation for every completed record still waiting.
    fn correlate_pending(&mut self) {
        for table in [DeviceTable::Hwts, DeviceTable::Ffts, DeviceTable::Ts] {
            let keys = self.device_keys(table);
            self.handle_device_data(table, &keys);
        }
    }

    /// Emit everything that can be emitted now. All descriptors reach the
    /// uploader before this returns.
    pub fn flush(&mut self) {
        for (name, stream) in self.streams.iter_mut() {
            if !is_hash_data(name) || stream.pending() == 0 {
                continue;
            }
            let tail = stream.take_remainder();
            self.stats
                .record_bytes(SourceKind::GeHash, 0, tail.len() as u64, 0);
            self.ge.parse_hash_dictionary(&tail);
        }

        self.ge.match_api_info();
        self.correlate_pending();
        self.update_op_index_id();
        self.upload_by_mode();
        self.upload_keypoints();
        self.rt.drop_aged();

        debug!(
            uploaded = self.stats.get(Counter::DescUploaded),
            "analyzer flushed"
        );
    }

    /// Log every non-zero counter and per-source byte totals.
    pub fn print_stats(&self) {
        for (counter, value) in self.stats.snapshot() {
            info!(counter = counter.as_str(), value, "analyzer counter");
        }
        for kind in SourceKind::all() {
            let bytes = self.stats.bytes(*kind);
            if bytes.total == 0 {
                continue;
            }
            info!(
                source = kind.as_str(),
                total = bytes.total,
                analyzed = bytes.analyzed,
                discarded = bytes.discarded,
                "analyzer bytes"
            );
        }
        info!(
            hwts_completed = self.hwts.completed().len(),
            ts_completed = self.ts.completed().len(),
            ffts_completed = self.ffts.completed().len(),
            ge_resolved = self.ge.resolved_len(),
            ge_ops = self.ge.op_info_len(),
            rt_pending = self.rt.len(),
            keypoints = self.ts.steps().len(),
            interned = self.index_table.len(),
            "analyzer tables"
        );
    }

    /// Step index for a device timestamp; 0 when unassigned.
    pub fn op_index_id(&mut self, timestamp: u64) -> u64 {
        self.ts.steps_mut().op_index_id(timestamp)
    }

    pub fn stats(&self) -> &Arc<AnalyzerStats> {
        &self.stats
    }

    pub fn platform(&self) -> &PlatformContext {
        &self.platform
    }

    pub fn ge(&self) -> &GeParser {
        &self.ge
    }

    pub fn hwts(&self) -> &HwtsParser {
        &self.hwts
    }

    pub fn ts(&self) -> &TsParser {
        &self.ts
    }

    pub fn ffts(&self) -> &FftsParser {
        &self.ffts
    }

    pub fn rt(&self) -> &RtParser {
        &self.rt
    }
}
