use cg_trace::result::TraceError;
use thiserror::Error;

use crate::tokenize::TokenizeError;

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum GraphError {
    #[error("line {line}: {source}")]
    Tokenize {
        line: usize,
        #[source]
        source: TokenizeError,
    },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: reference to '{name}', which is not produced by any earlier instruction")]
    UnresolvedReference { line: usize, name: String },

    #[error("line {line}: name '{name}' is defined twice")]
    DuplicateName { line: usize, name: String },

    #[error("line {line}: invalid scope '{scope}'")]
    InvalidScope { line: usize, scope: String },

    #[error("line {line}: scope refers to module '{name}', which is not part of the model")]
    UnknownModule { line: usize, name: String },

    #[error("no op found for module '{0}'")]
    ModuleNotFound(String),

    #[error("tracing failed: {0}")]
    Trace(#[from] TraceError),
}
