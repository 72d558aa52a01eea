use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use super::*;

fn write_fixture(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec(value).expect("fixture should serialize"))
        .expect("fixture should be written");
    path
}

fn conversation_bundle() -> Value {
    json!({
        "intent": {
            "scores": [[0.9, 0.1], [0.9, 0.1], [0.9, 0.1]],
            "labels": [0, 0, 0]
        },
        "nextstep": {
            "scores": [[0.8, 0.1, 0.1], [0.1, 0.8, 0.1], [0.1, 0.1, 0.8]],
            "labels": [0, 1, 2]
        },
        "action": {
            "scores": [[0.5, 0.5], [0.2, 0.8], [0.5, 0.5]],
            "labels": [-1, 1, -1]
        },
        "value": {
            "scores": [[0.5, 0.5], [0.7, 0.3], [0.5, 0.5]],
            "labels": [-1, 0, -1]
        },
        "utterance": {
            "scores": [[0.1, 0.7, 0.2], [0.3, 0.3, 0.4], [0.3, 0.3, 0.4]],
            "labels": [1, -1, -1]
        },
        "turns": {
            "conversation_ids": [42, 42, 42],
            "turn_counts": [1, 3, 5]
        }
    })
}

fn evaluate_args(bundle_path: PathBuf) -> EvaluateArgs {
    EvaluateArgs {
        bundle_path,
        task: Task::Tcom,
        cascade: false,
        breakdown: false,
        do_eval: false,
        use_kb: false,
        kb_path: None,
        target_maps_path: None,
        report_path: None,
        json: false,
    }
}

#[test]
fn resolve_mode_maps_tasks_to_modes() {
    assert_eq!(resolve_mode(Task::Utterance, true), EvaluationMode::UtteranceRanking);
    assert_eq!(resolve_mode(Task::Aawv, false), EvaluationMode::ActionWithValues);
    assert_eq!(resolve_mode(Task::Tcwi, false), EvaluationMode::TaskCompletion);
    assert_eq!(
        resolve_mode(Task::Remove, true),
        EvaluationMode::CascadedTaskCompletion
    );
    assert_eq!(resolve_mode(Task::Classify, true), EvaluationMode::Classification);
}

#[test]
fn resolve_shaping_prefers_breakdown_over_full_reports() {
    let mut args = evaluate_args(PathBuf::from("bundle.json"));
    assert_eq!(resolve_shaping(&args), ReportShaping::Compact);

    args.do_eval = true;
    assert_eq!(resolve_shaping(&args), ReportShaping::Full);

    args.breakdown = true;
    assert_eq!(resolve_shaping(&args), ReportShaping::WithBreakdown);
}

#[test]
fn run_writes_report_envelope_with_provenance() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let bundle_path = write_fixture(dir.path(), "bundle.json", &conversation_bundle());
    let report_path = dir.path().join("reports").join("cascade.json");

    let mut args = evaluate_args(bundle_path.clone());
    args.cascade = true;
    args.do_eval = true;
    args.report_path = Some(report_path.clone());
    run(args).expect("evaluation should succeed");

    let raw = fs::read(&report_path).expect("report should be written");
    let envelope: Value = serde_json::from_slice(&raw).expect("report should be json");
    assert_eq!(envelope["mode"], "cascaded_task_completion");
    assert_eq!(envelope["primary_metric"], "Cascading_Score");
    assert_eq!(envelope["turn_count"], 3);
    assert_eq!(
        envelope["bundle_sha256"],
        sha256_file(&bundle_path).expect("bundle should hash")
    );
    assert!(envelope["knowledge_base"].is_null());
    // one streak over three turns, divided by the three corpus turns
    assert_eq!(envelope["report"]["metrics"]["Cascading_Score"], 0.3333);
    assert_eq!(envelope["report"]["metrics"]["Turn_Accuracy"], 0.3333);
    assert_eq!(envelope["report"]["metrics"]["Recall_at_1"], 1.0);
}

#[test]
fn run_requires_kb_path_when_kb_is_enabled() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let bundle_path = write_fixture(dir.path(), "bundle.json", &conversation_bundle());

    let mut args = evaluate_args(bundle_path);
    args.use_kb = true;
    let error = run(args).expect_err("kb flag without a path should fail");
    assert!(error.to_string().contains("--kb-path"), "unexpected error: {error}");
}

#[test]
fn run_rejects_knowledge_base_with_uneven_masks() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let bundle_path = write_fixture(dir.path(), "bundle.json", &conversation_bundle());
    let kb_path = write_fixture(
        dir.path(),
        "kb.json",
        &json!({
            "intents": ["refund"],
            "actions": ["pull-up-account", "offer-refund"],
            "intent_masks": {"refund": [1, 1]},
            "action_masks": {"pull-up-account": [1, 0], "offer-refund": [1]}
        }),
    );

    let mut args = evaluate_args(bundle_path);
    args.use_kb = true;
    args.kb_path = Some(kb_path);
    let error = run(args).expect_err("uneven masks should be rejected");
    assert!(
        format!("{error:#}").contains("shape mismatch"),
        "unexpected error: {error:#}"
    );
}

#[test]
fn run_surfaces_engine_errors_with_bundle_context() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut bundle = conversation_bundle();
    bundle["turns"]["turn_counts"] = json!([1, 3]);
    let bundle_path = write_fixture(dir.path(), "bundle.json", &bundle);

    let mut args = evaluate_args(bundle_path);
    args.cascade = true;
    let error = run(args).expect_err("misaligned turn counts should fail");
    let rendered = format!("{error:#}");
    assert!(rendered.contains("failed to evaluate"), "unexpected error: {rendered}");
    assert!(rendered.contains("turn counts"), "unexpected error: {rendered}");
}

#[test]
fn render_text_report_lists_metrics_in_order() {
    let mut report = MetricReport::new("Turn_Accuracy");
    report.insert_score("Nextstep_Accuracy", 0.5);
    report.insert_score("Turn_Accuracy", 0.25);
    report.insert_summary("action_01_refund", "1 out of 2 correct (50.0%)");

    let mut rendered = Vec::new();
    render_text_report(
        &mut rendered,
        EvaluationMode::TaskCompletion,
        KnowledgeBaseMode::Disabled,
        &report,
    )
    .expect("report should render");

    let text = String::from_utf8(rendered).expect("report should be utf-8");
    assert_eq!(
        text,
        "Mode: task_completion (knowledge base: disabled)\n\
         Primary: Turn_Accuracy = 0.2500\n  \
         Nextstep_Accuracy: 0.5000\n  \
         Turn_Accuracy: 0.2500\n  \
         action_01_refund: 1 out of 2 correct (50.0%)\n"
    );
}
