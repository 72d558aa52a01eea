use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::cli::InspectArgs;
use crate::metrics::{COPY_CLASS, decode_rows};
use crate::model::{EvaluationBundle, TargetMaps};
use crate::util::read_json;


const PADDING_TOKENS: [&str; 2] = ["[PAD]", "<pad>"];

#[derive(Debug, Clone, Serialize, PartialEq)]
struct TurnFinding {
    turn: usize,
    history: String,
    predicted_action: String,
    actual_action: String,
    predicted_value: String,
    actual_value: String,
    action_correct: bool,
    value_correct: bool,
}

pub fn run(args: InspectArgs) -> Result<()> {
    let bundle: EvaluationBundle = read_json(&args.bundle_path)?;
    let maps: TargetMaps = read_json(&args.target_maps_path)?;

    let cleaner = HistoryCleaner::new()?;
    let mut findings = collect_findings(&bundle, &maps, &cleaner, args.filter)?;
    let total = findings.len();
    if let Some(limit) = args.limit {
        findings.truncate(limit);
    }

    info!(
        bundle = %args.bundle_path.display(),
        filter = args.filter,
        findings = total,
        shown = findings.len(),
        "inspection completed"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &findings)
            .context("failed to serialize inspection output")?;
        writeln!(output)?;
    } else {
        render_findings(&mut output, &findings)?;
    }
    output.flush()?;
    Ok(())
}

fn collect_findings(
    bundle: &EvaluationBundle,
    maps: &TargetMaps,
    cleaner: &HistoryCleaner,
    filter: bool,
) -> Result<Vec<TurnFinding>> {
    let action = EvaluationBundle::require(&bundle.action, "action")?;
    let value = EvaluationBundle::require(&bundle.value, "value")?;
    let action_preds = decode_rows(&action.scores, "action")?;
    let value_preds = decode_rows(&value.scores, "value")?;
    if action_preds.len() != value_preds.len() || value_preds.len() != value.labels.len() {
        bail!(
            "action and value heads disagree on turn count ({} vs {})",
            action_preds.len(),
            value_preds.len()
        );
    }

    let mut findings = Vec::new();
    for (turn, (predicted_action, actual_action)) in
        action_preds.iter().zip(&action.labels).enumerate()
    {
        let Ok(actual_action) = usize::try_from(*actual_action) else {
            continue;
        };
        let action_correct = *predicted_action == actual_action;
        if filter && action_correct {
            continue;
        }

        let context = bundle
            .context
            .as_ref()
            .and_then(|context| context.get(turn))
            .map(Vec::as_slice);
        let history = bundle
            .history
            .as_ref()
            .and_then(|history| history.get(turn))
            .map(|tokens| cleaner.detokenize(tokens))
            .unwrap_or_default();

        let predicted_value = value_preds[turn];
        let actual_value = value.labels[turn];
        findings.push(TurnFinding {
            turn,
            history,
            predicted_action: action_name(&maps.action, *predicted_action)?,
            actual_action: action_name(&maps.action, actual_action)?,
            predicted_value: resolve_value(predicted_value, &maps.value, context)?,
            actual_value: match usize::try_from(actual_value) {
                Ok(index) => resolve_value(index, &maps.value, context)?,
                Err(_) => "(none)".to_string(),
            },
            action_correct,
            value_correct: usize::try_from(actual_value).is_ok_and(|index| index == predicted_value),
        });
    }
    Ok(findings)
}

fn action_name(actions: &[String], index: usize) -> Result<String> {
    actions
        .get(index)
        .cloned()
        .with_context(|| format!("action index {index} is outside the action map"))
}

// Values past the vocabulary are copied from the turn's context tokens.
fn resolve_value(index: usize, vocabulary: &[String], context: Option<&[String]>) -> Result<String> {
    if let Some(name) = vocabulary.get(index) {
        return Ok(name.clone());
    }

    let offset = index - vocabulary.len();
    match context.and_then(|tokens| tokens.get(offset)) {
        Some(token) => Ok(token.clone()),
        None => Ok(format!("{COPY_CLASS}[{offset}]")),
    }
}

struct HistoryCleaner {
    wordpiece: Regex,
    separator: Regex,
}

impl HistoryCleaner {
    fn new() -> Result<Self> {
        Ok(Self {
            wordpiece: Regex::new(r" ##").context("failed to compile wordpiece regex")?,
            separator: Regex::new(r"\s*</s>\s*").context("failed to compile separator regex")?,
        })
    }

    fn detokenize(&self, tokens: &[String]) -> String {
        let joined = tokens
            .iter()
            .filter(|token| !PADDING_TOKENS.contains(&token.as_str()))
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join(" ");
        let merged = self.wordpiece.replace_all(&joined, "");
        let unmarked = merged.replace('Ġ', "").replace(" âĢ Ļ", "'");
        self.separator
            .replace_all(&unmarked, " // ")
            .trim()
            .to_string()
    }
}

fn render_findings(output: &mut impl Write, findings: &[TurnFinding]) -> Result<()> {
    for finding in findings {
        writeln!(output, "{}\t{}", finding.turn, finding.history)?;
        writeln!(
            output,
            "Predicted Action: {}, Actual: {}",
            finding.predicted_action, finding.actual_action
        )?;
        writeln!(
            output,
            "Predicted Value: {}, Actual: {}",
            finding.predicted_value, finding.actual_value
        )?;
    }
    Ok(())
}
