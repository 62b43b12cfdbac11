use std::sync::Arc;

use opscope::desc::{verify, DescError, KEYPOINT_OP_NAME};
use opscope::parser::record::OpKey;
use opscope::parser::stats::{Counter, SourceKind};
use opscope::parser::wire::{
    GE_API_EVENT_SIZE, GE_COMPACT_SIZE, GE_EVENT_FLAG, GE_LEVEL_MODEL, GE_LEVEL_NODE,
    GE_LEVEL_RUNTIME, GE_MAGIC, GE_TYPE_MODEL_LOAD, GE_TYPE_NODE_BASIC_INFO,
    GE_TYPE_NODE_LAUNCH, GE_TYPE_TASK_TRACK, HWTS_RECORD_SIZE, TS_KEYPOINT_SIZE,
    TS_RPT_TYPE_KEYPOINT, TS_RPT_TYPE_TIMELINE, TS_TIMELINE_SIZE,
};
use opscope::{
    Analyzer, ChannelUploader, Chunk, FrequencyTable, MemoryUploader, OpIndexTable,
    PlatformContext, ProfOpDesc, Uploader,
};

fn ge_header(level: u16, record_type: u32, thread: u32, ts: u64, size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    data[0..2].copy_from_slice(&GE_MAGIC.to_le_bytes());
    data[2..4].copy_from_slice(&level.to_le_bytes());
    data[4..8].copy_from_slice(&record_type.to_le_bytes());
    data[8..12].copy_from_slice(&thread.to_le_bytes());
    data[16..24].copy_from_slice(&ts.to_le_bytes());
    data
}

fn api_payload(thread: u32, begin: u64, end: u64) -> Vec<u8> {
    let mut data = ge_header(
        GE_LEVEL_NODE,
        GE_TYPE_NODE_LAUNCH,
        thread,
        begin,
        GE_API_EVENT_SIZE,
    );
    data[24..32].copy_from_slice(&end.to_le_bytes());
    data
}

fn model_payload(thread: u32, model_id: u64, ts: u64) -> Vec<u8> {
    let mut data = ge_header(
        GE_LEVEL_MODEL,
        GE_TYPE_MODEL_LOAD,
        thread,
        ts,
        GE_API_EVENT_SIZE,
    );
    data[24..32].copy_from_slice(&GE_EVENT_FLAG.to_le_bytes());
    data[32..40].copy_from_slice(&model_id.to_le_bytes());
    data
}

fn node_payload(thread: u32, ts: u64, op_name: u64, op_type: u64) -> Vec<u8> {
    let mut data = ge_header(
        GE_LEVEL_NODE,
        GE_TYPE_NODE_BASIC_INFO,
        thread,
        ts,
        GE_COMPACT_SIZE,
    );
    data[24..32].copy_from_slice(&op_name.to_le_bytes());
    data[32..40].copy_from_slice(&op_type.to_le_bytes());
    data
}

fn rt_payload(thread: u32, ts: u64, stream: u16, task: u32) -> Vec<u8> {
    let mut data = ge_header(
        GE_LEVEL_RUNTIME,
        GE_TYPE_TASK_TRACK,
        thread,
        ts,
        GE_COMPACT_SIZE,
    );
    data[26..28].copy_from_slice(&stream.to_le_bytes());
    data[28..32].copy_from_slice(&task.to_le_bytes());
    data
}

fn hwts_payload(end: bool, task: u16, stream: u16, syscnt: u64) -> Vec<u8> {
    let mut data = vec![0u8; HWTS_RECORD_SIZE];
    data[0] = u8::from(end);
    data[6..8].copy_from_slice(&stream.to_le_bytes());
    data[8..10].copy_from_slice(&task.to_le_bytes());
    data[16..24].copy_from_slice(&syscnt.to_le_bytes());
    data
}

fn timeline_payload(state: u16, task: u16, stream: u16, ts: u64) -> Vec<u8> {
    let mut data = vec![0u8; TS_TIMELINE_SIZE];
    data[1] = TS_RPT_TYPE_TIMELINE;
    data[2..4].copy_from_slice(&(TS_TIMELINE_SIZE as u16).to_le_bytes());
    data[10..12].copy_from_slice(&state.to_le_bytes());
    data[12..14].copy_from_slice(&stream.to_le_bytes());
    data[14..16].copy_from_slice(&task.to_le_bytes());
    data[16..24].copy_from_slice(&ts.to_le_bytes());
    data
}

fn keypoint_payload(tag: u16, index: u64, ts: u64) -> Vec<u8> {
    let mut data = vec![0u8; TS_KEYPOINT_SIZE];
    data[1] = TS_RPT_TYPE_KEYPOINT;
    data[2..4].copy_from_slice(&(TS_KEYPOINT_SIZE as u16).to_le_bytes());
    data[8..16].copy_from_slice(&ts.to_le_bytes());
    data[16..24].copy_from_slice(&index.to_le_bytes());
    data[36..38].copy_from_slice(&tag.to_le_bytes());
    data
}

/// One captured file: its name and full contents.
struct Capture {
    files: Vec<(&'static str, Vec<u8>)>,
}

impl Capture {
    /// Two operators on one thread, each launched once and timed by HWTS.
    fn two_ops() -> Self {
        let mut api = model_payload(7, 1, 0);
        api.extend(api_payload(7, 100, 200));
        api.extend(api_payload(7, 300, 400));
        api.extend(model_payload(7, 1, 1000));

        let mut nodes = node_payload(7, 150, 11, 21);
        nodes.extend(node_payload(7, 350, 12, 22));

        let mut rt = rt_payload(7, 180, 2, 40);
        rt.extend(rt_payload(7, 380, 2, 41));

        let mut hwts = hwts_payload(false, 40, 2, 5000);
        hwts.extend(hwts_payload(true, 40, 2, 5600));
        hwts.extend(hwts_payload(false, 41, 2, 6000));
        hwts.extend(hwts_payload(true, 41, 2, 6900));

        Self {
            files: vec![
                (
                    "unaging.additional.hash_dic",
                    b"11:conv1\n21:Conv2D\n12:relu1\n22:Relu\n".to_vec(),
                ),
                ("unaging.api_event.data", api),
                ("unaging.compact.node_basic_info", nodes),
                ("unaging.compact.task_track", rt),
                ("hwts.data.0", hwts),
            ],
        }
    }

    /// Replay with every file cut into `slice` byte pieces.
    fn replay(&self, slice: usize) -> Replay {
        let mut replay = Replay::new(PlatformContext::default());
        for (name, data) in &self.files {
            for (i, piece) in data.chunks(slice).enumerate() {
                replay
                    .analyzer
                    .feed(&Chunk::new(format!("{name}.slice_{i}"), piece.to_vec()));
            }
        }
        replay.analyzer.flush();
        replay
    }
}

struct Replay {
    analyzer: Analyzer,
    uploader: Arc<MemoryUploader>,
    table: Arc<OpIndexTable>,
}

impl Replay {
    fn new(platform: PlatformContext) -> Self {
        let uploader = Arc::new(MemoryUploader::new());
        let table = Arc::new(OpIndexTable::new());
        let sink: Arc<dyn Uploader> = uploader.clone();
        Self {
            analyzer: Analyzer::new(platform, FrequencyTable::default(), Arc::clone(&table), sink),
            uploader,
            table,
        }
    }

    /// (op name, start, end) of every descriptor, sorted by start.
    fn descriptors(&self) -> Vec<(String, u64, u64)> {
        let mut out: Vec<_> = self
            .uploader
            .take()
            .iter()
            .map(|bytes| {
                let desc = ProfOpDesc::decode(bytes).unwrap();
                let (_, name) = self.table.resolve(desc.op_index).unwrap();
                (name, desc.start, desc.end)
            })
            .collect();
        out.sort_by_key(|(_, start, _)| *start);
        out
    }
}

#[test]
fn test_device_records_take_ge_names() {
    let replay = Capture::two_ops().replay(4096);
    assert_eq!(
        replay.descriptors(),
        vec![
            ("conv1".to_string(), 5000, 5600),
            ("relu1".to_string(), 6000, 6900),
        ]
    );
    assert_eq!(replay.analyzer.stats().get(Counter::DeviceMerged), 2);
    assert!(replay.analyzer.hwts().completed().is_empty());
    assert!(replay.analyzer.rt().is_empty());
}

#[test]
fn test_output_independent_of_slice_boundaries() {
    let capture = Capture::two_ops();
    let whole = capture.replay(1 << 20).descriptors();
    for slice in [1, 5, 63, 64, 100] {
        let replay = capture.replay(slice);
        assert_eq!(replay.descriptors(), whole, "slice size {slice}");
        let bytes = replay.analyzer.stats().bytes(SourceKind::Hwts);
        assert_eq!(bytes.analyzed, 4 * HWTS_RECORD_SIZE as u64);
        assert_eq!(bytes.discarded, 0);
    }
}

#[test]
fn test_hwts_pair_without_launch_stays_pending() {
    let mut replay = Replay::new(PlatformContext::default());
    let mut hwts = hwts_payload(false, 30, 100, 1_000_000);
    hwts.extend(hwts_payload(true, 30, 100, 2_000_000));
    replay.analyzer.feed(&Chunk::new("hwts.data.0.slice_0", hwts));
    replay.analyzer.flush();

    let pending = replay.analyzer.hwts().completed().get(&OpKey::new(30, 100));
    assert_eq!(pending.len(), 1);
    assert_eq!((pending[0].start, pending[0].end), (1_000_000, 2_000_000));
    assert!(replay.uploader.is_empty());
}

#[test]
fn test_steps_index_device_records() {
    let mut replay = Replay::new(PlatformContext::default());
    let mut steps = keypoint_payload(0, 5, 1000);
    steps.extend(keypoint_payload(1, 5, 2000));
    steps.extend(keypoint_payload(0, 7, 3000));
    steps.extend(keypoint_payload(1, 7, 4000));
    replay
        .analyzer
        .feed(&Chunk::new("ts_track.data.0.slice_0", steps));

    assert_eq!(replay.analyzer.op_index_id(3500), 7);
    assert_eq!(replay.analyzer.op_index_id(1500), 5);
    assert_eq!(replay.analyzer.op_index_id(2500), 0);

    let out = replay.descriptors();
    assert_eq!(
        out,
        vec![
            (KEYPOINT_OP_NAME.to_string(), 1000, 2000),
            (KEYPOINT_OP_NAME.to_string(), 3000, 4000),
        ]
    );
}

#[test]
fn test_malformed_ts_discards_buffer_only() {
    let mut replay = Replay::new(PlatformContext::default());
    let mut bad = timeline_payload(2, 1, 1, 100);
    bad[2..4].copy_from_slice(&0u16.to_le_bytes());
    bad.extend(timeline_payload(3, 1, 1, 200));
    replay
        .analyzer
        .feed(&Chunk::new("ts_track.data.0.slice_0", bad));

    let stats = replay.analyzer.stats();
    assert_eq!(stats.get(Counter::Malformed), 1);
    assert_eq!(
        stats.bytes(SourceKind::Ts).discarded,
        2 * TS_TIMELINE_SIZE as u64
    );

    // The stream recovers on the next slice.
    let mut good = timeline_payload(2, 1, 1, 100);
    good.extend(timeline_payload(7, 1, 1, 110));
    good.extend(timeline_payload(8, 1, 1, 190));
    good.extend(timeline_payload(3, 1, 1, 200));
    replay
        .analyzer
        .feed(&Chunk::new("ts_track.data.0.slice_1", good));
    assert_eq!(replay.analyzer.stats().get(Counter::TsMerged), 1);
}

#[test]
fn test_flipped_descriptor_byte_fails_verification() {
    let replay = Capture::two_ops().replay(4096);
    let mut bytes = replay.uploader.take().remove(0);
    assert!(verify(&bytes));

    bytes[30] ^= 0x01;
    assert!(!verify(&bytes));
    let Err(DescError::SignatureMismatch { .. }) = ProfOpDesc::decode(&bytes) else {
        panic!("expected signature mismatch");
    };
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_channel_uploader_feeds_async_consumer() {
    let table = Arc::new(OpIndexTable::new());
    let (uploader, mut rx) = ChannelUploader::new(1);

    let producer = {
        let table = Arc::clone(&table);
        tokio::task::spawn_blocking(move || {
            let sink: Arc<dyn Uploader> = Arc::new(uploader);
            let mut analyzer =
                Analyzer::new(PlatformContext::default(), FrequencyTable::default(), table, sink);
            for (name, data) in Capture::two_ops().files {
                analyzer.feed(&Chunk::new(name, data));
            }
            analyzer.flush();
        })
    };

    let mut names = Vec::new();
    while let Some(bytes) = rx.recv().await {
        let desc = ProfOpDesc::decode(&bytes).unwrap();
        names.push(table.resolve(desc.op_index).unwrap().1);
    }
    producer.await.unwrap();

    names.sort();
    assert_eq!(names, vec!["conv1", "relu1"]);
    assert!(table.is_empty());
}
