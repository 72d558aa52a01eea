use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("shape mismatch for {field}: expected {expected}, found {found}")]
    ShapeMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("unknown class index {index} for {task} (known classes: {known})")]
    UnknownClass {
        task: String,
        index: i64,
        known: usize,
    },

    #[error("knowledge base has no {kind} mask for class {name:?}")]
    MissingMask { kind: &'static str, name: String },
}

impl EvalError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn shape(field: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::ShapeMismatch {
            field: field.into(),
            expected,
            found,
        }
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
