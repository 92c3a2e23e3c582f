//! Position sweep: force the answer into every slot and score each layout once

use rand::Rng;

use super::certainty::CertaintyRecord;
use crate::dataset::{relocate_all, QuestionRow};
use crate::runner::{DatasetScorer, ScoredRow, ScoringError};

/// One question scored once per forced answer position
#[derive(Debug, Clone, PartialEq)]
pub struct PositionLockedRow {
    pub record: CertaintyRecord,
    /// Indexed by the position the answer was moved to
    pub positions: Vec<ScoredRow>,
}

impl PositionLockedRow {
    pub fn is_certain(&self) -> bool {
        self.record.summary.is_certain
    }

    /// Chosen index when the answer sat at `pos`, -1 when unscored
    pub fn response_idx(&self, pos: usize) -> Option<i64> {
        self.positions.get(pos).map(ScoredRow::response_idx)
    }

    pub fn is_correct(&self, pos: usize) -> bool {
        self.positions.get(pos).map(ScoredRow::is_correct).unwrap_or(false)
    }
}

/// Score every record with its answer at each of `0..option_count`
pub async fn position_sweep<R: Rng>(
    scorer: &DatasetScorer,
    records: &[CertaintyRecord],
    option_count: usize,
    shuffle_distractors: bool,
    rng: &mut R,
) -> Result<Vec<PositionLockedRow>, ScoringError> {
    let base: Vec<QuestionRow> = records.iter().map(|r| r.row.clone()).collect();
    let mut per_row: Vec<Vec<ScoredRow>> = records.iter().map(|_| Vec::with_capacity(option_count)).collect();

    for pos in 0..option_count {
        tracing::info!("Position {}/{}: answer moved to index {}", pos + 1, option_count, pos);
        let relocated = relocate_all(&base, pos, shuffle_distractors, rng)?;
        let scored = scorer.score_once(&relocated).await?;
        for (slot, row) in per_row.iter_mut().zip(scored) {
            slot.push(row);
        }
    }

    Ok(records
        .iter()
        .cloned()
        .zip(per_row)
        .map(|(record, positions)| PositionLockedRow { record, positions })
        .collect())
}
