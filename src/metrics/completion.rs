use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::knowledge::KnowledgeBaseMode;
use crate::model::{EvaluationBundle, LabeledScores, TurnPositions};

use super::aggregate::{
    RankingOutcome, conditional_accuracy, joint_matches, match_rate, matches, rank_candidates,
};
use super::breakdown::{BreakdownTask, HeadOutcome};
use super::cascade::{TurnSignals, turn_correctness};
use super::decode::{decode_rows, masked_decode_rows};

#[derive(Debug, Clone, Copy)]
pub struct TaskCompletionHeads<'a> {
    pub intent: &'a LabeledScores,
    pub nextstep: &'a LabeledScores,
    pub action: &'a LabeledScores,
    pub value: &'a LabeledScores,
    pub utterance: &'a LabeledScores,
}

impl<'a> TaskCompletionHeads<'a> {
    pub fn from_bundle(bundle: &'a EvaluationBundle) -> EvalResult<Self> {
        let heads = Self {
            intent: EvaluationBundle::require(&bundle.intent, "intent")?,
            nextstep: EvaluationBundle::require(&bundle.nextstep, "nextstep")?,
            action: EvaluationBundle::require(&bundle.action, "action")?,
            value: EvaluationBundle::require(&bundle.value, "value")?,
            utterance: EvaluationBundle::require(&bundle.utterance, "utterance")?,
        };
        heads.ensure_aligned()?;
        Ok(heads)
    }

    pub fn turn_count(&self) -> usize {
        self.nextstep.len()
    }

    fn ensure_aligned(&self) -> EvalResult<()> {
        ensure_heads_aligned(&[
            ("intent", self.intent),
            ("nextstep", self.nextstep),
            ("action", self.action),
            ("value", self.value),
            ("utterance", self.utterance),
        ])
    }
}

pub fn ensure_heads_aligned(heads: &[(&str, &LabeledScores)]) -> EvalResult<()> {
    let Some((_, first)) = heads.first() else {
        return Ok(());
    };
    let expected = first.len();
    for (name, head) in heads {
        head.ensure_aligned(name)?;
        if head.len() != expected {
            return Err(EvalError::shape(format!("{name} labels"), expected, head.len()));
        }
    }
    Ok(())
}

pub fn ensure_positions_aligned(positions: &TurnPositions, turn_count: usize) -> EvalResult<()> {
    if positions.conversation_ids.len() != turn_count {
        return Err(EvalError::shape(
            "conversation ids",
            turn_count,
            positions.conversation_ids.len(),
        ));
    }
    if positions.turn_counts.len() != turn_count {
        return Err(EvalError::shape(
            "turn counts",
            turn_count,
            positions.turn_counts.len(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TaskCompletionScores {
    pub intent_accuracy: f64,
    pub nextstep_accuracy: f64,
    pub action_accuracy: f64,
    pub value_accuracy: f64,
    pub joint_accuracy: f64,
    pub ranking: RankingOutcome,
    pub intent_preds: Vec<usize>,
    pub nextstep_preds: Vec<usize>,
    pub action_preds: Vec<usize>,
    pub value_preds: Vec<usize>,
    pub intent_matches: Vec<bool>,
    pub nextstep_matches: Vec<bool>,
    pub joint_matches: Vec<bool>,
}

impl TaskCompletionScores {
    pub fn signals<'a>(&'a self, nextstep_labels: &'a [i64]) -> TurnSignals<'a> {
        TurnSignals {
            intent: &self.intent_matches,
            nextstep: &self.nextstep_matches,
            utterance: &self.ranking.top1,
            action_value: &self.joint_matches,
            nextstep_labels,
        }
    }

    pub fn head_outcomes<'a>(&'a self, heads: &TaskCompletionHeads<'a>) -> [HeadOutcome<'a>; 4] {
        [
            HeadOutcome {
                task: BreakdownTask::Intent,
                preds: &self.intent_preds,
                labels: &heads.intent.labels,
            },
            HeadOutcome {
                task: BreakdownTask::NextStep,
                preds: &self.nextstep_preds,
                labels: &heads.nextstep.labels,
            },
            HeadOutcome {
                task: BreakdownTask::Action,
                preds: &self.action_preds,
                labels: &heads.action.labels,
            },
            HeadOutcome {
                task: BreakdownTask::Value,
                preds: &self.value_preds,
                labels: &heads.value.labels,
            },
        ]
    }
}

// With a knowledge base, actions are restricted by the predicted intent and
// values by the restricted action.
pub fn score_task_completion(
    heads: &TaskCompletionHeads<'_>,
    knowledge_base: KnowledgeBaseMode<'_>,
) -> EvalResult<TaskCompletionScores> {
    let intent_preds = decode_rows(&heads.intent.scores, "intent")?;
    let intent_matches = matches(&intent_preds, &heads.intent.labels)?;
    let intent_accuracy = match_rate(&intent_matches, "intent accuracy")?;

    let nextstep_preds = decode_rows(&heads.nextstep.scores, "nextstep")?;
    let nextstep_matches = matches(&nextstep_preds, &heads.nextstep.labels)?;
    let nextstep_accuracy = match_rate(&nextstep_matches, "nextstep accuracy")?;

    let action_preds = match knowledge_base.knowledge_base() {
        None => decode_rows(&heads.action.scores, "action")?,
        Some(kb) => {
            let masks = kb.action_masks_for(&intent_preds)?;
            masked_decode_rows(&heads.action.scores, "action", &masks)?
        }
    };
    let action_matches = matches(&action_preds, &heads.action.labels)?;
    let action_accuracy =
        conditional_accuracy(&action_matches, &heads.action.labels, "action accuracy")?;

    let value_preds = match knowledge_base.knowledge_base() {
        None => decode_rows(&heads.value.scores, "value")?,
        Some(kb) => {
            let masks = kb.value_masks_for(&action_preds)?;
            masked_decode_rows(&heads.value.scores, "value", &masks)?
        }
    };
    let value_matches = matches(&value_preds, &heads.value.labels)?;
    let value_accuracy =
        conditional_accuracy(&value_matches, &heads.value.labels, "value accuracy")?;

    let joint_matches = joint_matches(&action_matches, &value_matches)?;
    let joint_accuracy =
        conditional_accuracy(&joint_matches, &heads.action.labels, "joint accuracy")?;

    let ranking = rank_candidates(&heads.utterance.scores, &heads.utterance.labels)?;

    debug!(
        turns = heads.turn_count(),
        knowledge_base = knowledge_base.as_str(),
        "scored task-completion heads"
    );

    Ok(TaskCompletionScores {
        intent_accuracy,
        nextstep_accuracy,
        action_accuracy,
        value_accuracy,
        joint_accuracy,
        ranking,
        intent_preds,
        nextstep_preds,
        action_preds,
        value_preds,
        intent_matches,
        nextstep_matches,
        joint_matches,
    })
}

pub fn flat_turn_accuracy(
    scores: &TaskCompletionScores,
    nextstep_labels: &[i64],
) -> EvalResult<f64> {
    let correct = turn_correctness(&scores.signals(nextstep_labels))?;
    match_rate(&correct, "turn accuracy")
}
