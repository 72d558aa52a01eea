use crate::error::{EvalError, EvalResult};
use crate::model::ScoreMatrix;

use super::decode::top_k;

pub const RECALL_RANKS: [usize; 3] = [1, 5, 10];

// Sentinel labels never match.
pub fn matches(preds: &[usize], labels: &[i64]) -> EvalResult<Vec<bool>> {
    if preds.len() != labels.len() {
        return Err(EvalError::shape("predictions", labels.len(), preds.len()));
    }
    Ok(preds
        .iter()
        .zip(labels)
        .map(|(pred, label)| label_matches(*label, *pred))
        .collect())
}

pub fn label_matches(label: i64, pred: usize) -> bool {
    usize::try_from(label).is_ok_and(|label| label == pred)
}

pub fn ratio(numerator: usize, denominator: usize, what: &str) -> EvalResult<f64> {
    if denominator == 0 {
        return Err(EvalError::invalid(format!(
            "{what} has no applicable turns to divide by"
        )));
    }
    Ok(numerator as f64 / denominator as f64)
}

fn count_true(values: &[bool]) -> usize {
    values.iter().filter(|value| **value).count()
}

pub fn accuracy(preds: &[usize], labels: &[i64]) -> EvalResult<f64> {
    let matched = matches(preds, labels)?;
    ratio(count_true(&matched), matched.len(), "accuracy")
}

pub fn match_rate(matched: &[bool], what: &str) -> EvalResult<f64> {
    ratio(count_true(matched), matched.len(), what)
}

pub fn applicable_count(labels: &[i64]) -> usize {
    labels.iter().filter(|label| **label >= 0).count()
}

pub fn conditional_accuracy(matched: &[bool], labels: &[i64], what: &str) -> EvalResult<f64> {
    if matched.len() != labels.len() {
        return Err(EvalError::shape(what, labels.len(), matched.len()));
    }
    ratio(count_true(matched), applicable_count(labels), what)
}

pub fn joint_matches(left: &[bool], right: &[bool]) -> EvalResult<Vec<bool>> {
    if left.len() != right.len() {
        return Err(EvalError::shape("joint matches", left.len(), right.len()));
    }
    Ok(left.iter().zip(right).map(|(a, b)| *a && *b).collect())
}

pub fn joint_accuracy(
    left: &[bool],
    right: &[bool],
    applicable_labels: &[i64],
) -> EvalResult<f64> {
    let joint = joint_matches(left, right)?;
    conditional_accuracy(&joint, applicable_labels, "joint accuracy")
}

pub fn hits_at_k(scores: &ScoreMatrix, labels: &[i64], k: usize) -> EvalResult<Vec<bool>> {
    if scores.len() != labels.len() {
        return Err(EvalError::shape("ranking scores", labels.len(), scores.len()));
    }
    Ok(scores
        .rows
        .iter()
        .zip(labels)
        .map(|(row, label)| {
            usize::try_from(*label).is_ok_and(|gold| top_k(row, k).contains(&gold))
        })
        .collect())
}

pub fn recall_at_k(scores: &ScoreMatrix, labels: &[i64], k: usize) -> EvalResult<f64> {
    let hits = hits_at_k(scores, labels, k)?;
    ratio(count_true(&hits), applicable_count(labels), "recall")
}

#[derive(Debug, Clone)]
pub struct RankingOutcome {
    pub recall: Vec<(usize, f64)>,
    pub top1: Vec<bool>,
}

pub fn rank_candidates(scores: &ScoreMatrix, labels: &[i64]) -> EvalResult<RankingOutcome> {
    scores.width("utterance")?;
    let mut recall = Vec::with_capacity(RECALL_RANKS.len());
    for rank in RECALL_RANKS {
        recall.push((rank, recall_at_k(scores, labels, rank)?));
    }
    let top1 = hits_at_k(scores, labels, 1)?;
    Ok(RankingOutcome { recall, top1 })
}
