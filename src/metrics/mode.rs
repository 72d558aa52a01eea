use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::knowledge::KnowledgeBaseMode;
use crate::model::{EvaluationBundle, TargetMaps};

use super::aggregate::{accuracy, conditional_accuracy, joint_accuracy, matches, rank_candidates};
use super::breakdown::{BreakdownTask, HeadOutcome, append_breakdowns};
use super::cascade::{cascade_score, turn_correctness};
use super::completion::{
    TaskCompletionHeads, TaskCompletionScores, ensure_heads_aligned, ensure_positions_aligned,
    flat_turn_accuracy, score_task_completion,
};
use super::decode::decode_rows;
use super::report::{
    ACCURACY, ACTION_ACCURACY, CASCADING_SCORE, INTENT_ACCURACY, JOINT_ACCURACY, MetricReport,
    NEXTSTEP_ACCURACY, TURN_ACCURACY, VALUE_ACCURACY, recall_metric_name,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EvaluationMode {
    Classification,
    UtteranceRanking,
    ActionWithValues,
    TaskCompletion,
    CascadedTaskCompletion,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ReportShaping {
    // Drops intent, value and recall@5/10.
    #[default]
    Compact,
    Full,
    WithBreakdown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext<'a> {
    pub knowledge_base: KnowledgeBaseMode<'a>,
    pub target_maps: Option<&'a TargetMaps>,
    pub shaping: ReportShaping,
}

impl<'a> EvalContext<'a> {
    fn target_maps(&self) -> EvalResult<&'a TargetMaps> {
        self.target_maps
            .ok_or_else(|| EvalError::invalid("breakdown reports need target maps"))
    }
}

impl EvaluationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::UtteranceRanking => "utterance_ranking",
            Self::ActionWithValues => "action_with_values",
            Self::TaskCompletion => "task_completion",
            Self::CascadedTaskCompletion => "cascaded_task_completion",
        }
    }

    pub fn primary_metric(self) -> String {
        match self {
            Self::Classification => ACCURACY.to_string(),
            Self::UtteranceRanking => recall_metric_name(5),
            Self::ActionWithValues => JOINT_ACCURACY.to_string(),
            Self::TaskCompletion => TURN_ACCURACY.to_string(),
            Self::CascadedTaskCompletion => CASCADING_SCORE.to_string(),
        }
    }

    pub fn evaluate(
        self,
        bundle: &EvaluationBundle,
        context: &EvalContext<'_>,
    ) -> EvalResult<MetricReport> {
        match self {
            Self::Classification => classification_report(bundle),
            Self::UtteranceRanking => ranking_report(bundle),
            Self::ActionWithValues => action_value_report(bundle, context),
            Self::TaskCompletion | Self::CascadedTaskCompletion => {
                task_completion_report(self, bundle, context)
            }
        }
    }
}

fn classification_report(bundle: &EvaluationBundle) -> EvalResult<MetricReport> {
    let head = EvaluationBundle::require(&bundle.classes, "classes")?;
    ensure_heads_aligned(&[("classes", head)])?;

    let preds = decode_rows(&head.scores, "classes")?;
    let mut report = MetricReport::new(EvaluationMode::Classification.primary_metric());
    report.insert_score(ACCURACY, accuracy(&preds, &head.labels)?);
    Ok(report)
}

fn ranking_report(bundle: &EvaluationBundle) -> EvalResult<MetricReport> {
    let head = EvaluationBundle::require(&bundle.utterance, "utterance")?;
    ensure_heads_aligned(&[("utterance", head)])?;

    let ranking = rank_candidates(&head.scores, &head.labels)?;
    let mut report = MetricReport::new(EvaluationMode::UtteranceRanking.primary_metric());
    for (rank, recall) in &ranking.recall {
        report.insert_score(recall_metric_name(*rank), *recall);
    }
    Ok(report)
}

fn action_value_report(
    bundle: &EvaluationBundle,
    context: &EvalContext<'_>,
) -> EvalResult<MetricReport> {
    let action = EvaluationBundle::require(&bundle.action, "action")?;
    let value = EvaluationBundle::require(&bundle.value, "value")?;
    ensure_heads_aligned(&[("action", action), ("value", value)])?;

    let action_preds = decode_rows(&action.scores, "action")?;
    let value_preds = decode_rows(&value.scores, "value")?;
    let action_matches = matches(&action_preds, &action.labels)?;
    let value_matches = matches(&value_preds, &value.labels)?;

    let mut report = MetricReport::new(EvaluationMode::ActionWithValues.primary_metric());
    report.insert_score(
        ACTION_ACCURACY,
        conditional_accuracy(&action_matches, &action.labels, "action accuracy")?,
    );
    report.insert_score(
        VALUE_ACCURACY,
        conditional_accuracy(&value_matches, &value.labels, "value accuracy")?,
    );
    report.insert_score(
        JOINT_ACCURACY,
        joint_accuracy(&action_matches, &value_matches, &action.labels)?,
    );

    if context.shaping == ReportShaping::WithBreakdown {
        let heads = [
            HeadOutcome {
                task: BreakdownTask::Action,
                preds: &action_preds,
                labels: &action.labels,
            },
            HeadOutcome {
                task: BreakdownTask::Value,
                preds: &value_preds,
                labels: &value.labels,
            },
        ];
        append_breakdowns(&mut report, context.target_maps()?, &heads)?;
    }
    Ok(report)
}

fn task_completion_report(
    mode: EvaluationMode,
    bundle: &EvaluationBundle,
    context: &EvalContext<'_>,
) -> EvalResult<MetricReport> {
    let heads = TaskCompletionHeads::from_bundle(bundle)?;
    let positions = match mode {
        EvaluationMode::CascadedTaskCompletion => {
            let positions = bundle.turns.as_ref().ok_or_else(|| {
                EvalError::invalid("cascaded evaluation needs conversation ids and turn counts")
            })?;
            ensure_positions_aligned(positions, heads.turn_count())?;
            Some(positions)
        }
        _ => None,
    };

    let scores = score_task_completion(&heads, context.knowledge_base)?;
    let mut report = MetricReport::new(mode.primary_metric());
    insert_head_scores(&mut report, &scores);

    let nextstep_labels = &heads.nextstep.labels;
    match positions {
        Some(positions) => {
            let correct = turn_correctness(&scores.signals(nextstep_labels))?;
            let cascade = cascade_score(positions, &correct)?;
            debug!(
                conversations = cascade.conversation_count,
                turns = cascade.turn_count,
                "scored conversations"
            );
            report.insert_score(TURN_ACCURACY, cascade.turn_accuracy);
            report.insert_score(CASCADING_SCORE, cascade.cascading_score);
        }
        None => {
            report.insert_score(TURN_ACCURACY, flat_turn_accuracy(&scores, nextstep_labels)?);
        }
    }

    match context.shaping {
        ReportShaping::WithBreakdown => {
            let outcomes = scores.head_outcomes(&heads);
            append_breakdowns(&mut report, context.target_maps()?, &outcomes)?;
        }
        ReportShaping::Full => {}
        ReportShaping::Compact => {
            report.remove(INTENT_ACCURACY);
            report.remove(VALUE_ACCURACY);
            report.remove(&recall_metric_name(5));
            report.remove(&recall_metric_name(10));
        }
    }
    Ok(report)
}

fn insert_head_scores(report: &mut MetricReport, scores: &TaskCompletionScores) {
    report.insert_score(INTENT_ACCURACY, scores.intent_accuracy);
    report.insert_score(NEXTSTEP_ACCURACY, scores.nextstep_accuracy);
    report.insert_score(ACTION_ACCURACY, scores.action_accuracy);
    report.insert_score(VALUE_ACCURACY, scores.value_accuracy);
    report.insert_score(JOINT_ACCURACY, scores.joint_accuracy);
    for (rank, recall) in &scores.ranking.recall {
        report.insert_score(recall_metric_name(*rank), *recall);
    }
}
