//! GE (graph engine) metadata.
//!
//! Host-side records describing which named operation ran on which model.
//! Records are held in per-thread partial tables until [`GeParser::match_api_info`]
//! stitches api intervals, model intervals and node fragments together.

mod matching;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::chunk::Frame;
use super::record::{
    DecodedRecord, GeApiRecord, GeContextRecord, GeEventRecord, GeNodeRecord, GeTaskDescRecord,
    OpKey, ShapeType, NO_CONTEXT,
};
use super::stats::{AnalyzerStats, Counter};
use super::wire::{
    decode_ge_api_event, decode_ge_context, decode_ge_graph_id_map, decode_ge_node,
    decode_ge_task_desc, parse_hash_line, DecodeError, GE_ADDITIONAL_SIZE, GE_API_EVENT_SIZE,
    GE_COMPACT_SIZE, GE_LEVEL_MODEL, GE_LEVEL_NODE, GE_TYPE_MODEL_LOAD, GE_TYPE_NODE_LAUNCH,
};
use crate::desc::FFTS_PLUS_OP_TYPE;
use crate::platform::ChipGeneration;

pub fn is_hash_data(name: &str) -> bool {
    name.contains("hash_dic")
}

pub fn is_api_or_event_data(name: &str) -> bool {
    name.contains("api_event")
}

pub fn is_compact_data(name: &str) -> bool {
    name.contains("compact") && name.contains("node_basic_info")
}

pub fn is_graph_id_map_data(name: &str) -> bool {
    name.contains("graph_id_info")
}

pub fn is_context_data(name: &str) -> bool {
    name.contains("context_id_info")
}

pub fn is_task_desc_data(name: &str) -> bool {
    name.contains("task_desc")
}

/// Aging data may be discarded if it stays unmatched; `unaging` data is
/// kept until matched.
pub fn is_aging(name: &str) -> bool {
    !name.contains("unaging") && name.contains("aging")
}

/// Key of a resolved GE operation: the device task plus the step it
/// belongs to (0 = valid for every step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeOpKey {
    pub op: OpKey,
    pub index_id: u64,
}

impl GeOpKey {
    pub const fn new(op: OpKey, index_id: u64) -> Self {
        Self { op, index_id }
    }
}

/// Names and model of an operation, from a resolved task descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeOpInfo {
    pub op_name: String,
    pub op_type: String,
    pub model_id: u64,
    pub thread_id: u32,
}

/// Partial GE fragment on one thread. Names are still hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeOpFlagInfo {
    pub op_name: u64,
    pub op_type: u64,
    pub model_id: u64,
    pub start: u64,
    /// 0 while a model interval is still open.
    pub end: u64,
    pub model_flag: bool,
    pub node_flag: bool,
    pub age_flag: bool,
    pub context_id: u32,
}

impl Default for GeOpFlagInfo {
    fn default() -> Self {
        Self {
            op_name: 0,
            op_type: 0,
            model_id: 0,
            start: 0,
            end: 0,
            model_flag: false,
            node_flag: false,
            age_flag: false,
            context_id: NO_CONTEXT,
        }
    }
}

/// Resolved metadata handed to descriptor construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpMeta {
    pub name: String,
    pub op_type: String,
    pub model_id: u64,
    pub thread_id: u32,
}

impl From<GeOpInfo> for OpMeta {
    fn from(info: GeOpInfo) -> Self {
        Self {
            name: info.op_name,
            op_type: info.op_type,
            model_id: info.model_id,
            thread_id: info.thread_id,
        }
    }
}

type ThreadTable = HashMap<u32, Vec<GeOpFlagInfo>>;

/// Owns every GE table for one session.
pub struct GeParser {
    chip: ChipGeneration,
    stats: Arc<AnalyzerStats>,
    hash_dict: HashMap<u64, String>,
    api: ThreadTable,
    models: ThreadTable,
    nodes: ThreadTable,
    contexts: ThreadTable,
    resolved: ThreadTable,
    graph_ids: HashMap<u32, u32>,
    op_info: HashMap<GeOpKey, GeOpInfo>,
    pending_descs: Vec<GeTaskDescRecord>,
    stream_shapes: HashMap<u32, ShapeType>,
    ffts_plus: bool,
}

fn table_len(table: &ThreadTable) -> usize {
    table.values().map(Vec::len).sum()
}

impl GeParser {
    pub fn new(chip: ChipGeneration, stats: Arc<AnalyzerStats>) -> Self {
        Self {
            chip,
            stats,
            hash_dict: HashMap::new(),
            api: HashMap::new(),
            models: HashMap::new(),
            nodes: HashMap::new(),
            contexts: HashMap::new(),
            resolved: HashMap::new(),
            graph_ids: HashMap::new(),
            op_info: HashMap::new(),
            pending_descs: Vec::new(),
            stream_shapes: HashMap::new(),
            ffts_plus: false,
        }
    }

    fn malformed(&self, e: &DecodeError) {
        self.stats.record(Counter::Malformed);
        warn!(error = %e, "dropping ge record");
    }

    // -- framing callbacks, one per source family --------------------------

    /// Hash dictionary text: one `hash:name` line per record.
    pub fn frame_hash_dictionary(&mut self, data: &[u8]) -> Frame {
        let Some(pos) = data.iter().position(|b| *b == b'\n') else {
            return Frame::Incomplete;
        };
        self.parse_hash_dictionary(&data[..pos]);
        Frame::Record(pos + 1)
    }

    pub fn frame_api_event(&mut self, data: &[u8], aging: bool) -> Frame {
        if data.len() < GE_API_EVENT_SIZE {
            return Frame::Incomplete;
        }
        self.parse_api_and_event(&data[..GE_API_EVENT_SIZE], aging);
        Frame::Record(GE_API_EVENT_SIZE)
    }

    pub fn frame_node(&mut self, data: &[u8], aging: bool) -> Frame {
        if data.len() < GE_COMPACT_SIZE {
            return Frame::Incomplete;
        }
        self.parse_node_basic_info(&data[..GE_COMPACT_SIZE], aging);
        Frame::Record(GE_COMPACT_SIZE)
    }

    pub fn frame_context(&mut self, data: &[u8], aging: bool) -> Frame {
        if data.len() < GE_ADDITIONAL_SIZE {
            return Frame::Incomplete;
        }
        self.parse_context_id_info(&data[..GE_ADDITIONAL_SIZE], aging);
        Frame::Record(GE_ADDITIONAL_SIZE)
    }

    pub fn frame_graph_id_map(&mut self, data: &[u8]) -> Frame {
        if data.len() < GE_ADDITIONAL_SIZE {
            return Frame::Incomplete;
        }
        self.parse_graph_id_map(&data[..GE_ADDITIONAL_SIZE]);
        Frame::Record(GE_ADDITIONAL_SIZE)
    }

    pub fn frame_task_desc(&mut self, data: &[u8]) -> Frame {
        if data.len() < GE_ADDITIONAL_SIZE {
            return Frame::Incomplete;
        }
        self.parse_task_desc(&data[..GE_ADDITIONAL_SIZE]);
        Frame::Record(GE_ADDITIONAL_SIZE)
    }

    // -- record parsers ----------------------------------------------------

    pub fn parse_hash_dictionary(&mut self, line: &[u8]) {
        match parse_hash_line(line) {
            Ok(Some((hash, name))) => {
                self.stats.record(Counter::GeHash);
                self.hash_dict.insert(hash, name);
                self.promote_task_descs();
            }
            Ok(None) => {}
            Err(e) => self.malformed(&e),
        }
    }

    pub fn parse_api_and_event(&mut self, data: &[u8], aging: bool) {
        match decode_ge_api_event(data) {
            Ok(DecodedRecord::GeApi(api)) => self.handle_api(api, aging),
            Ok(DecodedRecord::GeEvent(event)) => self.handle_event(event, aging),
            Ok(other) => debug!(record = other.name(), "unexpected record in ge api stream"),
            Err(e) => self.malformed(&e),
        }
    }

    fn handle_api(&mut self, api: GeApiRecord, aging: bool) {
        if api.level != GE_LEVEL_NODE || api.api_type != GE_TYPE_NODE_LAUNCH {
            self.stats.record(Counter::GeSkipped);
            debug!(level = api.level, api_type = api.api_type, "skipping ge api");
            return;
        }
        self.stats.record(Counter::GeApi);
        self.api.entry(api.thread_id).or_default().push(GeOpFlagInfo {
            start: api.begin,
            end: api.end,
            age_flag: aging,
            ..Default::default()
        });
    }

    /// Model load events come in pairs per (thread, model). An event for a
    /// model with an open interval closes it rather than restarting it;
    /// the next one opens a fresh interval.
    fn handle_event(&mut self, event: GeEventRecord, aging: bool) {
        if event.level != GE_LEVEL_MODEL || event.event_type != GE_TYPE_MODEL_LOAD {
            self.stats.record(Counter::GeSkipped);
            debug!(
                level = event.level,
                event_type = event.event_type,
                "skipping ge event"
            );
            return;
        }
        self.stats.record(Counter::GeModel);
        let model_id = event.item_id;
        let ts = event.timestamp;
        let intervals = self.models.entry(event.thread_id).or_default();

        match intervals
            .iter_mut()
            .find(|m| m.model_id == model_id && m.end == 0)
        {
            Some(open) if ts >= open.start => open.end = ts,
            Some(open) => {
                self.stats.record(Counter::GeModelRejected);
                warn!(
                    thread_id = event.thread_id,
                    model_id,
                    start = open.start,
                    end = ts,
                    "model end before start"
                );
            }
            None => intervals.push(GeOpFlagInfo {
                model_id,
                start: ts,
                model_flag: true,
                age_flag: aging,
                ..Default::default()
            }),
        }
    }

    pub fn parse_node_basic_info(&mut self, data: &[u8], aging: bool) {
        let node = match decode_ge_node(data) {
            Ok(DecodedRecord::GeNode(node)) => node,
            Ok(other) => {
                debug!(record = other.name(), "unexpected record in ge compact stream");
                return;
            }
            Err(e) => return self.malformed(&e),
        };
        self.handle_node(node, aging);
    }

    fn handle_node(&mut self, node: GeNodeRecord, aging: bool) {
        self.stats.record(Counter::GeNode);
        if self.resolve_name(node.op_type) == Some(FFTS_PLUS_OP_TYPE) {
            if !self.ffts_plus {
                debug!(thread_id = node.thread_id, "ffts plus graph detected");
            }
            self.ffts_plus = true;
            return;
        }
        self.nodes.entry(node.thread_id).or_default().push(GeOpFlagInfo {
            op_name: node.op_name,
            op_type: node.op_type,
            start: node.timestamp,
            node_flag: true,
            age_flag: aging,
            ..Default::default()
        });
    }

    pub fn parse_context_id_info(&mut self, data: &[u8], aging: bool) {
        match decode_ge_context(data) {
            Ok(DecodedRecord::GeContext(ctx)) => self.handle_context(ctx, aging),
            Ok(other) => debug!(record = other.name(), "unexpected record in ge context stream"),
            Err(e) => self.malformed(&e),
        }
    }

    /// Context fragments are only consumed by V4 matching; other chips
    /// count and drop them.
    fn handle_context(&mut self, ctx: GeContextRecord, aging: bool) {
        self.stats.record(Counter::GeContext);
        if self.chip != ChipGeneration::V4 {
            debug!(thread_id = ctx.thread_id, chip = %self.chip, "ignoring context ids");
            return;
        }
        let fragments = self.contexts.entry(ctx.thread_id).or_default();
        fragments.extend(ctx.context_ids.iter().map(|&context_id| GeOpFlagInfo {
            op_name: ctx.op_name,
            start: ctx.timestamp,
            age_flag: aging,
            context_id,
            ..Default::default()
        }));
    }

    pub fn parse_graph_id_map(&mut self, data: &[u8]) {
        match decode_ge_graph_id_map(data) {
            Ok(DecodedRecord::GeGraphIdMap(map)) => {
                self.graph_ids.insert(map.model_id, map.graph_id);
            }
            Ok(other) => debug!(record = other.name(), "unexpected record in ge graph stream"),
            Err(e) => self.malformed(&e),
        }
    }

    pub fn parse_task_desc(&mut self, data: &[u8]) {
        let record = match decode_ge_task_desc(data) {
            Ok(DecodedRecord::GeTaskDesc(record)) => record,
            Ok(other) => {
                debug!(record = other.name(), "unexpected record in ge task desc stream");
                return;
            }
            Err(e) => return self.malformed(&e),
        };
        self.stats.record(Counter::GeTaskDesc);
        if let Some(prev) = self.stream_shapes.insert(record.stream_id, record.shape) {
            if prev != record.shape {
                warn!(
                    stream_id = record.stream_id,
                    ?prev,
                    now = ?record.shape,
                    "stream shape type changed"
                );
            }
        }
        self.pending_descs.push(record);
        self.promote_task_descs();
    }

    /// Move task descriptors whose names both resolve into the op table.
    fn promote_task_descs(&mut self) {
        let Self {
            hash_dict,
            op_info,
            pending_descs,
            ..
        } = self;
        pending_descs.retain(|r| {
            let (Some(name), Some(op_type)) = (hash_dict.get(&r.op_name), hash_dict.get(&r.op_type))
            else {
                return true;
            };
            let key = GeOpKey::new(
                OpKey::with_context(r.task_id, r.stream_id, r.context_id),
                u64::from(r.index_id),
            );
            op_info.insert(
                key,
                GeOpInfo {
                    op_name: name.clone(),
                    op_type: op_type.clone(),
                    model_id: u64::from(r.model_id),
                    thread_id: r.thread_id,
                },
            );
            false
        });
    }

    // -- accessors ---------------------------------------------------------

    pub fn resolve_name(&self, hash: u64) -> Option<&str> {
        self.hash_dict.get(&hash).map(String::as_str)
    }

    /// Dictionary name, or the decimal hash when the dictionary lacks it.
    fn name_or_hash(&self, hash: u64) -> String {
        self.resolve_name(hash)
            .map(str::to_string)
            .unwrap_or_else(|| hash.to_string())
    }

    pub fn is_op_info_completed(&self, key: &GeOpKey) -> bool {
        self.op_info.contains_key(key)
    }

    pub fn op_name(&self, key: &GeOpKey) -> &str {
        self.op_info.get(key).map(|i| i.op_name.as_str()).unwrap_or("")
    }

    pub fn op_type(&self, key: &GeOpKey) -> &str {
        self.op_info.get(key).map(|i| i.op_type.as_str()).unwrap_or("")
    }

    pub fn model_id(&self, key: &GeOpKey) -> u64 {
        self.op_info.get(key).map(|i| i.model_id).unwrap_or(0)
    }

    pub fn op_meta(&self, key: &GeOpKey) -> Option<OpMeta> {
        self.op_info.get(key).map(|info| OpMeta {
            name: info.op_name.clone(),
            op_type: info.op_type.clone(),
            model_id: info.model_id,
            thread_id: info.thread_id,
        })
    }

    pub fn remove_op_info(&mut self, key: &GeOpKey) -> Option<GeOpInfo> {
        self.op_info.remove(key)
    }

    pub fn op_info_len(&self) -> usize {
        self.op_info.len()
    }

    pub fn pending_task_descs(&self) -> usize {
        self.pending_descs.len()
    }

    pub fn stream_shape(&self, stream_id: u32) -> Option<ShapeType> {
        self.stream_shapes.get(&stream_id).copied()
    }

    pub fn graph_id_for(&self, model_id: u64) -> Option<u32> {
        u32::try_from(model_id)
            .ok()
            .and_then(|m| self.graph_ids.get(&m).copied())
    }

    pub fn is_ffts_plus(&self) -> bool {
        self.ffts_plus
    }

    pub fn chip(&self) -> ChipGeneration {
        self.chip
    }

    pub fn pending_api(&self, thread_id: u32) -> &[GeOpFlagInfo] {
        self.api.get(&thread_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pending_api_len(&self) -> usize {
        table_len(&self.api)
    }

    pub fn nodes(&self, thread_id: u32) -> &[GeOpFlagInfo] {
        self.nodes.get(&thread_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolved(&self, thread_id: u32) -> &[GeOpFlagInfo] {
        self.resolved.get(&thread_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolved_len(&self) -> usize {
        table_len(&self.resolved)
    }

    /// Metadata for a resolved fragment, with names looked up.
    pub fn meta_for(&self, info: &GeOpFlagInfo, thread_id: u32) -> OpMeta {
        OpMeta {
            name: self.name_or_hash(info.op_name),
            op_type: self.name_or_hash(info.op_type),
            model_id: info.model_id,
            thread_id,
        }
    }

    /// Consume the first resolved entry on `thread_id` whose window
    /// `[start, end)` contains `timestamp`. With a context id, the entry
    /// must carry the same one.
    pub fn take_resolved(
        &mut self,
        thread_id: u32,
        timestamp: u64,
        context_id: Option<u32>,
    ) -> Option<GeOpFlagInfo> {
        let list = self.resolved.get_mut(&thread_id)?;
        let pos = list.iter().position(|e| {
            e.start <= timestamp
                && timestamp < e.end
                && context_id.map_or(true, |c| c == e.context_id)
        })?;
        let info = list.remove(pos);
        if list.is_empty() {
            self.resolved.remove(&thread_id);
        }
        Some(info)
    }
}
