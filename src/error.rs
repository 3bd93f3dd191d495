//! Error type shared by every sampler and diagnostic in the crate.

use thiserror::Error;

/// Everything that can go wrong while setting up or running a chain.
///
/// Invalid arguments are rejected before a chain starts. A parameter domain
/// violation during sampling is fatal to that chain and is surfaced as-is;
/// nothing is retried or clamped.
#[derive(Error, Debug)]
pub enum McmcError {
    /// Arguments rejected before any iteration runs.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A distribution was asked for parameters outside its support.
    #[error("{distribution} parameter domain violation: {detail}")]
    ParameterDomain {
        distribution: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error("statistic reduction failed: {0}")]
    Stats(#[from] ndarray_stats::errors::MinMaxError),

    #[error("progress bar template: {0}")]
    Template(#[from] indicatif::style::TemplateError),
}

impl McmcError {
    pub(crate) fn domain(distribution: &'static str, detail: impl ToString) -> Self {
        McmcError::ParameterDomain {
            distribution,
            detail: detail.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, McmcError>;
