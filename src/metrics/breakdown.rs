use indexmap::IndexMap;

use crate::error::{EvalError, EvalResult};
use crate::model::TargetMaps;

use super::report::{MetricReport, round_to};

pub const COPY_CLASS: &str = "copy";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BreakdownTask {
    Intent,
    NextStep,
    Action,
    Value,
}

impl BreakdownTask {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::NextStep => "nextstep",
            Self::Action => "action",
            Self::Value => "value",
        }
    }

    pub fn class_names(self, maps: &TargetMaps) -> &[String] {
        match self {
            Self::Intent => &maps.intent,
            Self::NextStep => &maps.nextstep,
            Self::Action => &maps.action,
            Self::Value => &maps.value,
        }
    }

    // Classes kept from each end of the ranking.
    pub fn limit(self) -> usize {
        match self {
            Self::NextStep => 2,
            _ => 5,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ClassTally {
    right: usize,
    wrong: usize,
}

impl ClassTally {
    fn total(self) -> usize {
        self.right + self.wrong
    }

    fn ratio(self) -> f64 {
        round_to(self.right as f64 / self.total() as f64 * 100.0, 3)
    }
}

// Value labels past the vocabulary are tallied under `copy`.
pub fn breakdown(
    preds: &[usize],
    labels: &[i64],
    class_names: &[String],
    task: BreakdownTask,
) -> EvalResult<IndexMap<String, String>> {
    if preds.len() != labels.len() {
        return Err(EvalError::shape(
            format!("{} predictions", task.as_str()),
            labels.len(),
            preds.len(),
        ));
    }

    let mut tracker = IndexMap::<&str, ClassTally>::new();
    for (pred, label) in preds.iter().zip(labels) {
        let Ok(index) = usize::try_from(*label) else {
            continue;
        };
        let class = match class_names.get(index) {
            Some(name) => name.as_str(),
            None if task == BreakdownTask::Value => COPY_CLASS,
            None => {
                return Err(EvalError::UnknownClass {
                    task: task.as_str().to_string(),
                    index: *label,
                    known: class_names.len(),
                });
            }
        };

        let tally = tracker.entry(class).or_default();
        if *pred == index {
            tally.right += 1;
        } else {
            tally.wrong += 1;
        }
    }

    let mut ranked = tracker
        .into_iter()
        .map(|(class, tally)| (class, tally, tally.ratio()))
        .collect::<Vec<_>>();
    ranked.sort_by(|left, right| right.2.total_cmp(&left.2));

    let limit = task.limit();
    let lower_start = ranked.len().saturating_sub(limit);
    let mut out = IndexMap::new();
    for (position, (class, tally, ratio)) in ranked.into_iter().enumerate() {
        if position < limit || position >= lower_start {
            let key = format!("{}_{:02}_{}", task.as_str(), position + 1, class);
            let summary = format!(
                "{} out of {} correct ({}%)",
                tally.right,
                tally.total(),
                format_ratio(ratio)
            );
            out.insert(key, summary);
        }
    }
    Ok(out)
}

pub fn format_ratio(ratio: f64) -> String {
    let rendered = ratio.to_string();
    if rendered.contains('.') {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeadOutcome<'a> {
    pub task: BreakdownTask,
    pub preds: &'a [usize],
    pub labels: &'a [i64],
}

pub fn append_breakdowns(
    report: &mut MetricReport,
    maps: &TargetMaps,
    heads: &[HeadOutcome<'_>],
) -> EvalResult<()> {
    for head in heads {
        let names = head.task.class_names(maps);
        report.extend_summaries(breakdown(head.preds, head.labels, names, head.task)?);
    }
    Ok(())
}
