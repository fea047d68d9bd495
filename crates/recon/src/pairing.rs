//! Pairing resolver — mutual-best-choice selection over ranked candidate edges.
//!
//! Each edge is ranked from both endpoints with the same ranking function.
//! An edge is accepted iff it is rank 1 from both sides. Since the ranking
//! ends on a unique row id, every row has at most one rank-1 edge, so the
//! accepted set is one-to-one by construction. Non-mutual preferences stay
//! unpaired and surface later as `PAIRING_INCOMPLETE`.

use crate::candidates::{rank, CandidateEdge};
use crate::keys::digest_fields;
use crate::model::{EnrichedTransaction, GroupKey, PairId, PairRecord, RowId};

/// A candidate edge with its 1-based rank from each endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedEdge {
    pub edge: CandidateEdge,
    pub rank_from_a: usize,
    pub rank_from_b: usize,
}

impl RankedEdge {
    pub fn is_mutual_best(&self) -> bool {
        self.rank_from_a == 1 && self.rank_from_b == 1
    }
}

/// Rank every edge from both of its endpoints.
pub fn rank_edges(rows: &[&EnrichedTransaction], edges: &[CandidateEdge]) -> Vec<RankedEdge> {
    // Per node, incident edge indices sorted by that node's preference
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    for (i, e) in edges.iter().enumerate() {
        incident[e.a].push(i);
        incident[e.b].push(i);
    }

    let mut ranks_a = vec![0usize; edges.len()];
    let mut ranks_b = vec![0usize; edges.len()];

    for (node, edge_ids) in incident.iter_mut().enumerate() {
        let anchor = rows[node];
        edge_ids.sort_by(|&x, &y| {
            let cx = rows[edges[x].other(node)];
            let cy = rows[edges[y].other(node)];
            rank(anchor, cx).cmp(&rank(anchor, cy))
        });
        for (position, &edge_id) in edge_ids.iter().enumerate() {
            if edges[edge_id].a == node {
                ranks_a[edge_id] = position + 1;
            } else {
                ranks_b[edge_id] = position + 1;
            }
        }
    }

    edges
        .iter()
        .enumerate()
        .map(|(i, &edge)| RankedEdge {
            edge,
            rank_from_a: ranks_a[i],
            rank_from_b: ranks_b[i],
        })
        .collect()
}

/// `pair_id` does not depend on which leg is listed first.
pub fn pair_id(group_key: &GroupKey, x: &RowId, y: &RowId) -> PairId {
    let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
    PairId(digest_fields(&[
        Some(group_key.to_string()),
        Some(lo.to_string()),
        Some(hi.to_string()),
    ]))
}

/// Accept mutual-best edges within one bucket. Output is sorted.
pub fn resolve_pairs(
    group_key: &GroupKey,
    rows: &[&EnrichedTransaction],
    edges: &[CandidateEdge],
) -> Vec<PairRecord> {
    let mut records = Vec::new();

    for ranked in rank_edges(rows, edges) {
        if !ranked.is_mutual_best() {
            continue;
        }
        let left = &rows[ranked.edge.a].row_id;
        let right = &rows[ranked.edge.b].row_id;
        let id = pair_id(group_key, left, right);
        for row_id in [left, right] {
            records.push(PairRecord {
                group_key: group_key.clone(),
                pair_id: id.clone(),
                row_id: row_id.clone(),
            });
        }
    }

    records.sort();
    records
}
