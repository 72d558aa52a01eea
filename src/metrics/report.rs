use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

pub const ACCURACY: &str = "Accuracy";
pub const INTENT_ACCURACY: &str = "Intent_Accuracy";
pub const NEXTSTEP_ACCURACY: &str = "Nextstep_Accuracy";
pub const ACTION_ACCURACY: &str = "Action_Accuracy";
pub const VALUE_ACCURACY: &str = "Value_Accuracy";
pub const JOINT_ACCURACY: &str = "Joint_Accuracy";
pub const TURN_ACCURACY: &str = "Turn_Accuracy";
pub const CASCADING_SCORE: &str = "Cascading_Score";

pub fn recall_metric_name(rank: usize) -> String {
    format!("Recall_at_{rank}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Score(f64),
    Summary(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Score(value) => write!(f, "{value:.4}"),
            Self::Summary(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReport {
    pub primary: String,
    pub metrics: IndexMap<String, MetricValue>,
}

impl MetricReport {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            metrics: IndexMap::new(),
        }
    }

    pub fn insert_score(&mut self, name: impl Into<String>, value: f64) {
        self.metrics
            .insert(name.into(), MetricValue::Score(round_to(value, 4)));
    }

    pub fn insert_summary(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.metrics
            .insert(name.into(), MetricValue::Summary(text.into()));
    }

    pub fn extend_summaries(&mut self, entries: IndexMap<String, String>) {
        for (name, text) in entries {
            self.insert_summary(name, text);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<MetricValue> {
        self.metrics.shift_remove(name)
    }

    pub fn score(&self, name: &str) -> Option<f64> {
        match self.metrics.get(name)? {
            MetricValue::Score(value) => Some(*value),
            MetricValue::Summary(_) => None,
        }
    }

    pub fn primary_score(&self) -> Option<f64> {
        self.score(&self.primary)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
