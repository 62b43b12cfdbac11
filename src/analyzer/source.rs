use crate::parser::ffts::is_ffts_data;
use crate::parser::ge::{
    is_api_or_event_data, is_compact_data, is_context_data, is_graph_id_map_data, is_hash_data,
    is_task_desc_data,
};
use crate::parser::hwts::is_hwts_data;
use crate::parser::rt::is_rt_compact_data;
use crate::parser::stats::SourceKind;
use crate::parser::ts::is_ts_data;

impl SourceKind {
    /// Whether a chunk with this source tag belongs to this stream kind.
    pub fn matches(self, tag: &str) -> bool {
        match self {
            Self::GeHash => is_hash_data(tag),
            Self::GeApiEvent => is_api_or_event_data(tag),
            Self::GeCompact => is_compact_data(tag),
            Self::GeGraphIdMap => is_graph_id_map_data(tag),
            Self::GeContext => is_context_data(tag),
            Self::GeTaskDesc => is_task_desc_data(tag),
            Self::RtCompact => is_rt_compact_data(tag),
            Self::Hwts => is_hwts_data(tag),
            Self::Ffts => is_ffts_data(tag),
            Self::Ts => is_ts_data(tag),
        }
    }
}

/// First matching kind in dispatch order.
pub fn classify(tag: &str) -> Option<SourceKind> {
    SourceKind::all().iter().copied().find(|k| k.matches(tag))
}

/// Reassembly stream name: the tag without a trailing `.slice_N`.
pub fn stream_name(tag: &str) -> &str {
    match tag.rfind(".slice_") {
        Some(pos) => {
            let suffix = &tag[pos + ".slice_".len()..];
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                &tag[..pos]
            } else {
                tag
            }
        }
        None => tag,
    }
}
