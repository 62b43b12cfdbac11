use tracing::debug;

use super::{GeOpFlagInfo, GeParser, ThreadTable};
use crate::parser::stats::Counter;
use crate::platform::ChipGeneration;

impl GeParser {
    /// Resolve pending api intervals against model intervals and node
    /// fragments on the same thread.
    ///
    /// The model is the first closed interval strictly containing the api
    /// window. A node matches when it starts inside `[api.start, api.end]`;
    /// the first one is taken, or every one when ffts-plus is active. Each
    /// matched node becomes one resolved entry carrying the api window.
    /// Api entries without a node stay pending, except aged ones which are
    /// dropped.
    pub fn match_api_info(&mut self) {
        if self.chip == ChipGeneration::V4 && self.ffts_plus {
            reconcile_contexts(&mut self.nodes, &mut self.contexts);
        }

        let Self {
            api,
            models,
            nodes,
            resolved,
            stats,
            ffts_plus,
            ..
        } = self;
        let take_all = *ffts_plus;
        let mut matched = 0u64;
        let mut aged = 0u64;

        for (&thread_id, pending) in api.iter_mut() {
            let thread_models = models.get(&thread_id).map(Vec::as_slice).unwrap_or(&[]);
            let mut thread_nodes = nodes.get_mut(&thread_id);

            pending.retain(|entry| {
                let model = thread_models
                    .iter()
                    .find(|m| m.end != 0 && m.start < entry.start && entry.end < m.end);
                let hits = match thread_nodes.as_mut() {
                    Some(list) => take_nodes(list, entry.start, entry.end, take_all),
                    None => Vec::new(),
                };

                if hits.is_empty() {
                    if entry.age_flag {
                        aged += 1;
                        return false;
                    }
                    return true;
                }

                let out = resolved.entry(thread_id).or_default();
                for node in hits {
                    out.push(GeOpFlagInfo {
                        op_name: node.op_name,
                        op_type: node.op_type,
                        model_id: model.map_or(0, |m| m.model_id),
                        start: entry.start,
                        end: entry.end,
                        model_flag: model.is_some(),
                        node_flag: true,
                        age_flag: entry.age_flag,
                        context_id: node.context_id,
                    });
                    matched += 1;
                }
                false
            });
        }

        api.retain(|_, list| !list.is_empty());
        nodes.retain(|_, list| !list.is_empty());

        if matched > 0 || aged > 0 {
            stats.record_n(Counter::GeMatched, matched);
            stats.record_n(Counter::GeAgedDropped, aged);
            debug!(matched, aged, "ge api matching pass");
        }
    }
}

/// Remove and return the nodes starting inside `[start, end]`: the first
/// one, or all of them when `all` is set.
fn take_nodes(
    list: &mut Vec<GeOpFlagInfo>,
    start: u64,
    end: u64,
    all: bool,
) -> Vec<GeOpFlagInfo> {
    let inside = |n: &GeOpFlagInfo| start <= n.start && n.start <= end;
    if all {
        let (hits, rest): (Vec<_>, Vec<_>) = std::mem::take(list).into_iter().partition(inside);
        *list = rest;
        hits
    } else {
        match list.iter().position(inside) {
            Some(pos) => vec![list.remove(pos)],
            None => Vec::new(),
        }
    }
}

/// Replace each node fragment by one fragment per context id reported for
/// the same (thread, start, op name).
fn reconcile_contexts(nodes: &mut ThreadTable, contexts: &mut ThreadTable) {
    for (thread_id, node_list) in nodes.iter_mut() {
        let Some(ctx_list) = contexts.get_mut(thread_id) else {
            continue;
        };
        let mut out = Vec::with_capacity(node_list.len());
        for node in node_list.drain(..) {
            let (hits, rest): (Vec<_>, Vec<_>) = std::mem::take(ctx_list)
                .into_iter()
                .partition(|c| c.start == node.start && c.op_name == node.op_name);
            *ctx_list = rest;
            if hits.is_empty() {
                out.push(node);
            } else {
                out.extend(hits.into_iter().map(|c| GeOpFlagInfo {
                    context_id: c.context_id,
                    ..node
                }));
            }
        }
        *node_list = out;
    }
    contexts.retain(|_, list| !list.is_empty());
}
