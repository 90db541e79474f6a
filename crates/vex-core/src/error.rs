use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Vector bytes do not match the expected element type or dimension.
    #[error("Format error: {0}")]
    Format(String),

    /// A textual vector literal could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operands of incompatible element type, dimension or metric.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The planner cannot satisfy the proposed constraints. Never surfaced to
    /// callers of the virtual table; the planner falls back instead.
    #[error("Plan infeasible: {0}")]
    PlanInfeasible(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VexError>;

impl VexError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            VexError::Io(_) => "io",
            VexError::Format(_) => "format",
            VexError::Parse(_) => "parse",
            VexError::TypeMismatch(_) => "type_mismatch",
            VexError::ConstraintViolation(_) => "constraint_violation",
            VexError::NotFound(_) => "not_found",
            VexError::PlanInfeasible(_) => "plan_infeasible",
            VexError::Storage(_) => "storage",
            VexError::Config(_) => "config",
            VexError::Timeout(_) => "timeout",
            VexError::Internal(_) => "internal",
            VexError::Other(_) => "other",
        }
    }
}

// Errors from downstream crates convert through `anyhow`:
//
// #[derive(Error, Debug)]
// pub enum IngestError {
//     #[error("embedding service unavailable: {0}")]
//     Embedding(String),
//
//     #[error(transparent)]
//     Vex(#[from] VexError),
// }
//
// impl From<IngestError> for VexError {
//     fn from(err: IngestError) -> Self {
//         match err {
//             IngestError::Vex(e) => e,
//             other => VexError::Other(other.into()),
//         }
//     }
// }
