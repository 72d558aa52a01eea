use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};
use crate::metrics::MetricReport;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreMatrix {
    pub rows: Vec<Vec<f64>>,
}

impl ScoreMatrix {
    #[cfg(test)]
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self, field: &str) -> EvalResult<usize> {
        let Some(first) = self.rows.first() else {
            return Ok(0);
        };
        let expected = first.len();
        for row in &self.rows {
            if row.len() != expected {
                return Err(EvalError::shape(
                    format!("{field} score row"),
                    expected,
                    row.len(),
                ));
            }
        }
        Ok(expected)
    }
}

// Negative labels mark turns where the head does not apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledScores {
    pub scores: ScoreMatrix,
    pub labels: Vec<i64>,
}

impl LabeledScores {
    #[cfg(test)]
    pub fn new(rows: Vec<Vec<f64>>, labels: Vec<i64>) -> Self {
        Self {
            scores: ScoreMatrix::new(rows),
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn ensure_aligned(&self, field: &str) -> EvalResult<()> {
        if self.scores.len() != self.labels.len() {
            return Err(EvalError::shape(
                format!("{field} scores"),
                self.labels.len(),
                self.scores.len(),
            ));
        }
        self.scores.width(field)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnPositions {
    pub conversation_ids: Vec<i64>,
    pub turn_counts: Vec<i64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Respond,
    TakeAction,
    EndConversation,
}

impl NextStep {
    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            0 => Some(Self::Respond),
            1 => Some(Self::TakeAction),
            2 => Some(Self::EndConversation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationBundle {
    #[serde(default)]
    pub intent: Option<LabeledScores>,
    #[serde(default)]
    pub nextstep: Option<LabeledScores>,
    #[serde(default)]
    pub action: Option<LabeledScores>,
    #[serde(default)]
    pub value: Option<LabeledScores>,
    #[serde(default)]
    pub utterance: Option<LabeledScores>,
    #[serde(default)]
    pub classes: Option<LabeledScores>,
    #[serde(default)]
    pub turns: Option<TurnPositions>,
    #[serde(default)]
    pub history: Option<Vec<Vec<String>>>,
    // Value indices past the vocabulary point into these tokens.
    #[serde(default)]
    pub context: Option<Vec<Vec<String>>>,
}

impl EvaluationBundle {
    pub fn turn_count(&self) -> usize {
        [
            &self.nextstep,
            &self.intent,
            &self.action,
            &self.value,
            &self.utterance,
            &self.classes,
        ]
        .into_iter()
        .find_map(|head| head.as_ref().map(LabeledScores::len))
        .unwrap_or(0)
    }

    pub fn require<'a>(
        field: &'a Option<LabeledScores>,
        name: &str,
    ) -> EvalResult<&'a LabeledScores> {
        field
            .as_ref()
            .ok_or_else(|| EvalError::invalid(format!("bundle is missing the {name} head")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetMaps {
    #[serde(default)]
    pub intent: Vec<String>,
    #[serde(default)]
    pub nextstep: Vec<String>,
    #[serde(default)]
    pub action: Vec<String>,
    #[serde(default)]
    pub value: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEnvelope {
    pub manifest_version: u32,
    pub generated_at: String,
    pub mode: String,
    pub bundle_path: String,
    pub bundle_sha256: String,
    pub knowledge_base: Option<String>,
    pub turn_count: usize,
    pub primary_metric: String,
    pub report: MetricReport,
}
