use crate::model::{EnrichedTransaction, RowId};

/// Ordering wrapper that places nulls after every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NullsLast<T> {
    Value(T),
    Null,
}

impl<T> From<Option<T>> for NullsLast<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Value(v),
            None => Self::Null,
        }
    }
}

/// How much an anchor prefers one candidate. Lower sorts first; the derived
/// `Ord` compares fields top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateRank<'a> {
    /// Cancelled candidates (false) before active ones.
    pub candidate_active: bool,
    /// Same description (false) before different; null reads as "".
    pub description_differs: bool,
    pub sequence_distance: NullsLast<u64>,
    pub candidate_sequence: NullsLast<i64>,
    pub candidate_row_id: &'a RowId,
}

/// Rank `candidate` from `anchor`'s point of view.
pub fn rank<'a>(anchor: &EnrichedTransaction, candidate: &'a EnrichedTransaction) -> CandidateRank<'a> {
    let a = &anchor.record;
    let c = &candidate.record;

    let distance = match (a.sequence_number, c.sequence_number) {
        (Some(x), Some(y)) => Some(x.abs_diff(y)),
        _ => None,
    };

    CandidateRank {
        candidate_active: !c.is_cancelled,
        description_differs: a.description.as_deref().unwrap_or("")
            != c.description.as_deref().unwrap_or(""),
        sequence_distance: distance.into(),
        candidate_sequence: c.sequence_number.into(),
        candidate_row_id: &candidate.row_id,
    }
}

/// Undirected candidate edge between two rows of one bucket, by index (`a < b`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateEdge {
    pub a: usize,
    pub b: usize,
}

impl CandidateEdge {
    /// The endpoint opposite `node`.
    pub fn other(&self, node: usize) -> usize {
        if node == self.a {
            self.b
        } else {
            self.a
        }
    }
}

/// Buckets without a cancelled row are never enumerated.
pub fn has_cancelled(rows: &[&EnrichedTransaction]) -> bool {
    rows.iter().any(|r| r.record.is_cancelled)
}

/// Every pair of distinct rows whose quantity, cash and cost are exact negatives.
pub fn candidate_edges(rows: &[&EnrichedTransaction]) -> Vec<CandidateEdge> {
    if !has_cancelled(rows) {
        return Vec::new();
    }

    let amounts: Vec<_> = rows.iter().map(|r| r.record.amounts()).collect();
    let mut edges = Vec::new();

    for a in 0..rows.len() {
        for b in (a + 1)..rows.len() {
            if rows[a].row_id == rows[b].row_id {
                continue;
            }
            if amounts[a].is_negation_of(&amounts[b]) {
                edges.push(CandidateEdge { a, b });
            }
        }
    }

    edges
}
