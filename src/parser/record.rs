use std::collections::HashMap;
use std::fmt;

/// Context id value meaning "this key has no context component".
pub const NO_CONTEXT: u32 = u32::MAX;

/// Composite key identifying one device task, optionally narrowed to a
/// sub-task context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpKey {
    pub task_id: u32,
    pub stream_id: u32,
    pub context_id: u32,
}

impl OpKey {
    pub const fn new(task_id: u32, stream_id: u32) -> Self {
        Self {
            task_id,
            stream_id,
            context_id: NO_CONTEXT,
        }
    }

    pub const fn with_context(task_id: u32, stream_id: u32, context_id: u32) -> Self {
        Self {
            task_id,
            stream_id,
            context_id,
        }
    }

    pub const fn has_context(&self) -> bool {
        self.context_id != NO_CONTEXT
    }

    /// The same task without its context component.
    pub const fn base(&self) -> Self {
        Self::new(self.task_id, self.stream_id)
    }
}

impl Default for OpKey {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl fmt::Display for OpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_context() {
            write!(f, "{}-{}-{}", self.task_id, self.stream_id, self.context_id)
        } else {
            write!(f, "{}-{}", self.task_id, self.stream_id)
        }
    }
}

/// Descriptor flag carried through to the emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum OpFlag {
    #[default]
    Op = 0,
    OpThread = 1,
    Subgraph = 2,
    None = 3,
}

impl OpFlag {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Op => "op",
            Self::OpThread => "op_thread",
            Self::Subgraph => "subgraph",
            Self::None => "none",
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Op),
            1 => Some(Self::OpThread),
            2 => Some(Self::Subgraph),
            3 => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for OpFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start/end timing of one device task, in nanoseconds.
///
/// A zero timestamp means the phase has not been observed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpTimeRecord {
    pub key: OpKey,
    /// Step index; 0 = unassigned.
    pub index_id: u64,
    pub start: u64,
    pub end: u64,
    pub start_aicore: u64,
    pub end_aicore: u64,
    pub thread_id: u32,
    pub flag: OpFlag,
    pub age_flag: bool,
}

impl OpTimeRecord {
    pub fn new(key: OpKey, flag: OpFlag) -> Self {
        Self {
            key,
            flag,
            ..Default::default()
        }
    }

    /// Start and end both observed.
    pub fn has_span(&self) -> bool {
        self.start > 0 && self.end > 0
    }

    /// All four timeline phases observed.
    pub fn has_all_phases(&self) -> bool {
        self.has_span() && self.start_aicore > 0 && self.end_aicore > 0
    }
}

/// Completed timing records, several per key in arrival order
/// (task ids are reused by the hardware).
#[derive(Debug, Default)]
pub struct OpTimeTable {
    entries: HashMap<OpKey, Vec<OpTimeRecord>>,
    len: usize,
}

impl OpTimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: OpTimeRecord) {
        self.entries.entry(record.key).or_default().push(record);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &OpKey) -> &[OpTimeRecord] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> Vec<OpKey> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpTimeRecord> {
        self.entries.values().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpTimeRecord> {
        self.entries.values_mut().flatten()
    }

    /// Remove the record at `pos` under `key`, keeping the order of the rest.
    pub fn remove(&mut self, key: &OpKey, pos: usize) -> Option<OpTimeRecord> {
        let list = self.entries.get_mut(key)?;
        if pos >= list.len() {
            return None;
        }
        let record = list.remove(pos);
        if list.is_empty() {
            self.entries.remove(key);
        }
        self.len -= 1;
        Some(record)
    }

    /// Keep only the records for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&mut OpTimeRecord) -> bool,
    {
        let mut removed = 0;
        self.entries.retain(|_, list| {
            let before = list.len();
            list.retain_mut(|r| keep(r));
            removed += before - list.len();
            !list.is_empty()
        });
        self.len -= removed;
    }
}

/// One training-step interval delimited by a start and end keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeypointOp {
    pub stream_id: u16,
    pub task_id: u16,
    pub index_id: u64,
    pub model_id: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub uploaded: bool,
    pub find_succ_times: u64,
}

impl KeypointOp {
    pub fn is_open(&self) -> bool {
        self.end_time == 0
    }
}

/// HWTS report type, read from the low 3 bits of the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwtsRptType {
    Start,
    End,
    Invalid,
}

/// Decoded HWTS task record.
#[derive(Debug, Clone, Copy)]
pub struct HwtsRecord {
    pub rpt_type: HwtsRptType,
    pub count: u8,
    pub stream_id: u16,
    pub task_id: u16,
    pub syscnt: u64,
}

/// Decoded TS 4-phase timeline record.
#[derive(Debug, Clone, Copy)]
pub struct TsTimelineRecord {
    pub task_type: u16,
    pub task_state: u16,
    pub stream_id: u16,
    pub task_id: u16,
    pub timestamp: u64,
    pub thread_id: u32,
    pub device_id: u32,
}

/// Decoded TS step keypoint record.
#[derive(Debug, Clone, Copy)]
pub struct TsKeypointRecord {
    pub timestamp: u64,
    pub index_id: u64,
    pub model_id: u64,
    pub stream_id: u16,
    pub task_id: u16,
    pub tag: u16,
}

/// FFTS log band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FftsLogKind {
    TaskStart,
    TaskEnd,
    SubTaskStart,
    SubTaskEnd,
}

/// Decoded FFTS record; ids are already rolled back.
#[derive(Debug, Clone, Copy)]
pub struct FftsRecord {
    pub kind: FftsLogKind,
    pub log_type: u8,
    pub count: u8,
    pub sqe_type: u8,
    pub stream_id: u16,
    pub task_id: u16,
    pub syscnt: u64,
    /// Sub-task (context) id; thread-level records only.
    pub sub_task_id: Option<u16>,
    pub ffts_thread_id: u16,
}

/// Decoded runtime task-track record.
#[derive(Debug, Clone, Copy)]
pub struct RtTrackRecord {
    pub thread_id: u32,
    pub timestamp: u64,
    pub device_id: u16,
    pub stream_id: u16,
    pub task_id: u32,
    pub task_type: u64,
}

/// Decoded GE api record (an interval on one thread).
#[derive(Debug, Clone, Copy)]
pub struct GeApiRecord {
    pub level: u16,
    pub api_type: u32,
    pub thread_id: u32,
    pub begin: u64,
    pub end: u64,
    pub item_id: u64,
}

/// Decoded GE event record (a point in time on one thread).
#[derive(Debug, Clone, Copy)]
pub struct GeEventRecord {
    pub level: u16,
    pub event_type: u32,
    pub thread_id: u32,
    pub request_id: u32,
    pub timestamp: u64,
    pub item_id: u64,
}

/// Decoded GE node basic info record.
#[derive(Debug, Clone, Copy)]
pub struct GeNodeRecord {
    pub thread_id: u32,
    pub timestamp: u64,
    pub op_name: u64,
    pub op_type: u64,
    pub task_type: u32,
    pub block_dim: u32,
}

/// Decoded GE context id record.
#[derive(Debug, Clone)]
pub struct GeContextRecord {
    pub thread_id: u32,
    pub timestamp: u64,
    pub op_name: u64,
    pub context_ids: Vec<u32>,
}

/// Decoded GE graph id map record.
#[derive(Debug, Clone, Copy)]
pub struct GeGraphIdMapRecord {
    pub graph_id: u32,
    pub model_id: u32,
}

/// Shape type of a stream, as declared by its task descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Static,
    Dynamic,
}

impl ShapeType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Static),
            1 => Some(Self::Dynamic),
            _ => None,
        }
    }
}

/// Decoded GE task descriptor record.
#[derive(Debug, Clone, Copy)]
pub struct GeTaskDescRecord {
    pub thread_id: u32,
    pub timestamp: u64,
    pub model_id: u32,
    pub stream_id: u32,
    pub task_id: u32,
    pub context_id: u32,
    pub index_id: u32,
    pub shape: ShapeType,
    pub op_name: u64,
    pub op_type: u64,
}

/// One decoded wire record from any producer.
#[derive(Debug, Clone)]
pub enum DecodedRecord {
    Hwts(HwtsRecord),
    TsTimeline(TsTimelineRecord),
    TsKeypoint(TsKeypointRecord),
    /// A TS record type the engine does not consume.
    TsOther { rpt_type: u8 },
    Ffts(FftsRecord),
    RtTrack(RtTrackRecord),
    GeApi(GeApiRecord),
    GeEvent(GeEventRecord),
    GeNode(GeNodeRecord),
    GeContext(GeContextRecord),
    GeGraphIdMap(GeGraphIdMapRecord),
    GeTaskDesc(GeTaskDescRecord),
}

impl DecodedRecord {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hwts(_) => "hwts",
            Self::TsTimeline(_) => "ts timeline",
            Self::TsKeypoint(_) => "ts keypoint",
            Self::TsOther { .. } => "ts other",
            Self::Ffts(_) => "ffts",
            Self::RtTrack(_) => "rt task track",
            Self::GeApi(_) => "ge api",
            Self::GeEvent(_) => "ge event",
            Self::GeNode(_) => "ge node basic info",
            Self::GeContext(_) => "ge context id info",
            Self::GeGraphIdMap(_) => "ge graph id map",
            Self::GeTaskDesc(_) => "ge task desc",
        }
    }
}
