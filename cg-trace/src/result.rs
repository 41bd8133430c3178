use thiserror::Error;

pub type TraceResult<T> = Result<T, TraceError>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TraceError {
    #[error("module of type {type_name} is not part of the traced model")]
    UnknownModule { type_name: String },

    #[error("module '{path}' of type {type_name} cannot be called directly")]
    NotCallable { path: String, type_name: String },

    #[error("{what}: expected {expected}, got shape {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: String,
        actual: Vec<usize>,
    },

    #[error("model expected input {index}, but only {count} inputs were given")]
    MissingInput { index: usize, count: usize },
}
