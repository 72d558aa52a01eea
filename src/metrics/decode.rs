use std::cmp::Ordering;

use crate::error::{EvalError, EvalResult};
use crate::model::ScoreMatrix;

// First occurrence wins on ties.
pub fn decode(scores: &[f64]) -> EvalResult<usize> {
    let Some(&first) = scores.first() else {
        return Err(EvalError::invalid("cannot decode an empty score row"));
    };

    let mut best_index = 0;
    let mut best_score = first;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > best_score {
            best_index = index;
            best_score = score;
        }
    }
    Ok(best_index)
}

pub fn decode_rows(matrix: &ScoreMatrix, field: &str) -> EvalResult<Vec<usize>> {
    matrix.width(field)?;
    matrix.rows.iter().map(|row| decode(row)).collect()
}

/// The `k` highest-scoring indices in ascending index order. Equal scores at
/// the cut go to the lower index.
pub fn top_k(scores: &[f64], k: usize) -> Vec<usize> {
    let mut indices = (0..scores.len()).collect::<Vec<usize>>();
    if k == 0 {
        return Vec::new();
    }
    if k < indices.len() {
        indices.select_nth_unstable_by(k - 1, |left, right| rank_order(scores, *left, *right));
        indices.truncate(k);
    }
    indices.sort_unstable();
    indices
}

fn rank_order(scores: &[f64], left: usize, right: usize) -> Ordering {
    scores[right]
        .total_cmp(&scores[left])
        .then_with(|| left.cmp(&right))
}

/// Scores must be non-negative, otherwise masked-out classes can still win the argmax.
pub fn apply_mask(scores: &[f64], mask: &[f64]) -> EvalResult<Vec<f64>> {
    if scores.len() != mask.len() {
        return Err(EvalError::shape("validity mask", scores.len(), mask.len()));
    }
    Ok(scores
        .iter()
        .zip(mask)
        .map(|(score, keep)| score * keep)
        .collect())
}

pub fn masked_decode_rows(
    matrix: &ScoreMatrix,
    field: &str,
    masks: &[&[f64]],
) -> EvalResult<Vec<usize>> {
    if matrix.len() != masks.len() {
        return Err(EvalError::shape(
            format!("{field} masks"),
            matrix.len(),
            masks.len(),
        ));
    }

    let mut preds = Vec::with_capacity(matrix.len());
    for (row, mask) in matrix.rows.iter().zip(masks) {
        let masked = apply_mask(row, mask)?;
        preds.push(decode(&masked)?);
    }
    Ok(preds)
}
