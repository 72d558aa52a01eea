use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::{EvaluateArgs, Task};
use crate::knowledge::{KnowledgeBase, KnowledgeBaseMode};
use crate::metrics::{EvalContext, EvaluationMode, MetricReport, ReportShaping};
use crate::model::{EvaluationBundle, ReportEnvelope, TargetMaps};
use crate::util::{now_utc_string, read_json, sha256_file, write_json_pretty};

#[cfg(test)]
mod tests;

pub fn run(args: EvaluateArgs) -> Result<()> {
    let bundle: EvaluationBundle = read_json(&args.bundle_path)?;
    let knowledge_base = load_knowledge_base(&args)?;
    let target_maps = args
        .target_maps_path
        .as_deref()
        .map(read_json::<TargetMaps>)
        .transpose()?;

    let mode = resolve_mode(args.task, args.cascade);
    let context = EvalContext {
        knowledge_base: knowledge_base
            .as_ref()
            .map_or(KnowledgeBaseMode::Disabled, KnowledgeBaseMode::Constrained),
        target_maps: target_maps.as_ref(),
        shaping: resolve_shaping(&args),
    };

    info!(
        bundle = %args.bundle_path.display(),
        mode = mode.as_str(),
        turns = bundle.turn_count(),
        knowledge_base = context.knowledge_base.as_str(),
        shaping = ?context.shaping,
        "evaluation requested"
    );

    let report = mode
        .evaluate(&bundle, &context)
        .with_context(|| format!("failed to evaluate {}", args.bundle_path.display()))?;

    info!(
        primary = %report.primary,
        value = report.primary_score().unwrap_or_default(),
        metrics = report.len(),
        "evaluation completed"
    );

    if let Some(report_path) = &args.report_path {
        let envelope = build_envelope(&args, mode, &bundle, context.knowledge_base, &report)?;
        write_json_pretty(report_path, &envelope)?;
        info!(path = %report_path.display(), "wrote metric report");
    }

    if args.json {
        write_json_report(&report)
    } else {
        write_text_report(mode, context.knowledge_base, &report)
    }
}

pub(crate) fn resolve_mode(task: Task, cascade: bool) -> EvaluationMode {
    match task {
        Task::Utterance => EvaluationMode::UtteranceRanking,
        Task::Aawv => EvaluationMode::ActionWithValues,
        Task::Tcom | Task::Tcwi | Task::Remove if cascade => {
            EvaluationMode::CascadedTaskCompletion
        }
        Task::Tcom | Task::Tcwi | Task::Remove => EvaluationMode::TaskCompletion,
        Task::Classify => EvaluationMode::Classification,
    }
}

pub(crate) fn resolve_shaping(args: &EvaluateArgs) -> ReportShaping {
    if args.breakdown {
        ReportShaping::WithBreakdown
    } else if args.do_eval {
        ReportShaping::Full
    } else {
        ReportShaping::Compact
    }
}

fn load_knowledge_base(args: &EvaluateArgs) -> Result<Option<KnowledgeBase>> {
    if !args.use_kb {
        if let Some(path) = &args.kb_path {
            warn!(path = %path.display(), "knowledge base ignored without --use-kb");
        }
        return Ok(None);
    }

    let Some(path) = &args.kb_path else {
        bail!("--use-kb requires --kb-path");
    };
    if !args.task.is_task_completion() {
        warn!(task = ?args.task, "knowledge base only constrains task-completion modes");
    }

    let knowledge_base: KnowledgeBase = read_json(path)?;
    knowledge_base
        .validate()
        .with_context(|| format!("invalid knowledge base {}", path.display()))?;
    info!(
        path = %path.display(),
        intents = knowledge_base.intents.len(),
        actions = knowledge_base.actions.len(),
        "loaded knowledge base"
    );
    Ok(Some(knowledge_base))
}

fn build_envelope(
    args: &EvaluateArgs,
    mode: EvaluationMode,
    bundle: &EvaluationBundle,
    knowledge_base: KnowledgeBaseMode<'_>,
    report: &MetricReport,
) -> Result<ReportEnvelope> {
    Ok(ReportEnvelope {
        manifest_version: 1,
        generated_at: now_utc_string(),
        mode: mode.as_str().to_string(),
        bundle_path: args.bundle_path.display().to_string(),
        bundle_sha256: sha256_file(&args.bundle_path)?,
        knowledge_base: match knowledge_base {
            KnowledgeBaseMode::Disabled => None,
            KnowledgeBaseMode::Constrained(_) => args.kb_path.as_deref().map(display_path),
        },
        turn_count: bundle.turn_count(),
        primary_metric: report.primary.clone(),
        report: report.clone(),
    })
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

fn write_json_report(report: &MetricReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, report)
        .context("failed to serialize metric report")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_report(
    mode: EvaluationMode,
    knowledge_base: KnowledgeBaseMode<'_>,
    report: &MetricReport,
) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    render_text_report(&mut output, mode, knowledge_base, report)?;
    output.flush()?;
    Ok(())
}

pub(crate) fn render_text_report(
    output: &mut impl Write,
    mode: EvaluationMode,
    knowledge_base: KnowledgeBaseMode<'_>,
    report: &MetricReport,
) -> Result<()> {
    writeln!(
        output,
        "Mode: {} (knowledge base: {})",
        mode.as_str(),
        knowledge_base.as_str()
    )?;
    match report.primary_score() {
        Some(value) => writeln!(output, "Primary: {} = {value:.4}", report.primary)?,
        None => writeln!(output, "Primary: {}", report.primary)?,
    }
    for (name, value) in &report.metrics {
        writeln!(output, "  {name}: {value}")?;
    }
    Ok(())
}
