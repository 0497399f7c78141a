//! Typed error hierarchy for the assemble server.
//!
//! Two top-level enums cover the two failure domains:
//! - `AuthError` — OAuth gateway exchange and identity-probe failures
//! - `SubmitError` — submission validation and staging-pipeline failures
//!
//! Submission errors are never surfaced as HTTP errors: the façade converts
//! every `SubmitError` into a failed `SubmissionResult` whose message is the
//! error's Display text, verbatim.

use thiserror::Error;

/// Errors from the OAuth token exchange and GitHub identity probes.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated to GitHub")]
    NotAuthenticated,

    /// Hard failure reported by the gateway; carries the server's own
    /// message text.
    #[error("{0}")]
    Gateway(String),

    /// The polling loop exceeded its total-elapsed-time ceiling.
    #[error("timeout")]
    TimedOut,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors from the submission façade and the repository staging pipeline.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Bad request - {0}")]
    BadRequest(String),

    #[error("No code was submitted -- did you select the correct cell?")]
    EmptyCode,

    #[error("Submitted code is not valid Python code")]
    InvalidSource,

    #[error("Feature scaffold did not produce a feature file to receive the submitted code")]
    NoPrimaryFeatureFile,

    #[error("{0}")]
    Project(String),

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error("{0}")]
    GitHub(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
