mod aggregate;
mod breakdown;
mod cascade;
mod completion;
mod decode;
mod mode;
mod report;

pub use self::breakdown::COPY_CLASS;
pub use self::decode::decode_rows;
pub use self::mode::{EvalContext, EvaluationMode, ReportShaping};
pub use self::report::MetricReport;
