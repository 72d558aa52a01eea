use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "dialog-eval",
    version,
    about = "Evaluation metrics for task-oriented dialogue model predictions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score a prediction bundle and print the metric report.
    Evaluate(EvaluateArgs),
    /// Walk action/value predictions turn by turn.
    Inspect(InspectArgs),
}

/// Training task the predictions were produced for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Task {
    /// Single-head classification scored by accuracy.
    Classify,
    /// Utterance candidate ranking.
    Utterance,
    /// Action prediction with slot values.
    Aawv,
    /// Task completion.
    Tcom,
    /// Task completion with intent.
    Tcwi,
    /// Task completion ablation with removed context.
    Remove,
}

impl Task {
    pub fn is_task_completion(self) -> bool {
        matches!(self, Self::Tcom | Self::Tcwi | Self::Remove)
    }
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub bundle_path: PathBuf,

    #[arg(long, value_enum, default_value_t = Task::Tcom)]
    pub task: Task,

    /// Score task completion as streaks within conversations.
    #[arg(long, default_value_t = false)]
    pub cascade: bool,

    /// Append per-class breakdowns to the report.
    #[arg(long, default_value_t = false)]
    pub breakdown: bool,

    /// Keep every task-completion metric instead of the compact set.
    #[arg(long, default_value_t = false)]
    pub do_eval: bool,

    /// Constrain action and value predictions with knowledge-base masks.
    #[arg(long, default_value_t = false)]
    pub use_kb: bool,

    #[arg(long)]
    pub kb_path: Option<PathBuf>,

    #[arg(long)]
    pub target_maps_path: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long)]
    pub bundle_path: PathBuf,

    #[arg(long)]
    pub target_maps_path: PathBuf,

    /// Skip turns whose action was predicted correctly.
    #[arg(long, default_value_t = false)]
    pub filter: bool,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
