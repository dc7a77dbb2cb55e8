use thiserror::Error;

/// Failures of the text-rewrite stage itself (not of the rewritten code).
#[derive(Debug, Error)]
pub enum RewriteError {
    /// Two distinct literal spans hashed to the same placeholder key.
    /// Fatal: the pass cannot continue with an ambiguous mask map.
    #[error("mask key collision: {key} maps to both {first:?} and {second:?}")]
    MaskCollision {
        key: u64,
        first: String,
        second: String,
    },

    /// Template interpolations nested past the recursion bound.
    #[error("template literal nesting exceeds depth {max}")]
    TemplateDepth { max: usize },
}

/// Failures from the host language: parsing or evaluating rewritten code.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LangError {
    #[error("syntax error: {0}")]
    Parse(String),

    #[error("name '{0}' is not defined")]
    Name(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("{0}")]
    Domain(String),

    #[error("evaluation interrupted")]
    Interrupted,

    #[error("capability '{0}' is not available in this environment")]
    Capability(String),
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Lang(#[from] LangError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShellError>;
