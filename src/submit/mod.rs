//! Submission subsystem: façade, staging pipeline, and its collaborators.
//!
//! The façade is the single entry point the HTTP boundary calls. It
//! validates the raw request, resolves project and identity, runs the
//! pipeline, and converts any failure into a uniform [`SubmissionResult`].
//! Exactly one outcome object leaves every invocation; no error ever
//! escapes to the boundary layer.

pub mod codecheck;
pub mod pipeline;
pub mod scaffold;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::{AuthError, SubmitError};
use crate::github::GitHubApi;
use crate::project;
use crate::session::{self, Session};
use self::codecheck::is_valid_source;
use self::pipeline::{PipelineEnv, RepoSpec};
use self::scaffold::Scaffolder;

/// Inbound submission payload.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmissionRequest {
    #[serde(rename = "codeContent")]
    pub code_content: String,
}

/// The uniform outcome returned to the boundary: exactly one of `url` or
/// `message` is populated, consistent with the `result` flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    pub result: bool,
    pub url: Option<String>,
    pub message: Option<String>,
}

impl SubmissionResult {
    pub fn success(url: String) -> Self {
        Self {
            result: true,
            url: Some(url),
            message: None,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            result: false,
            url: None,
            message: Some(message),
        }
    }
}

/// Boundary-facing entry point: validate, stage, and convert the outcome.
///
/// This is the one place submission errors become a result value; the
/// error's Display text is passed through verbatim as the user-facing
/// diagnostic.
pub async fn create_pull_request_for_code_content(
    config: &Config,
    session: &Mutex<Session>,
    github: &dyn GitHubApi,
    scaffolder: Arc<dyn Scaffolder>,
    notebook_dir: Option<&Path>,
    input: serde_json::Value,
) -> SubmissionResult {
    match submit_inner(config, session, github, scaffolder, notebook_dir, input).await {
        Ok(url) => SubmissionResult::success(url),
        Err(e) => {
            info!("submission failed: {e}");
            SubmissionResult::failure(e.to_string())
        }
    }
}

async fn submit_inner(
    config: &Config,
    session: &Mutex<Session>,
    github: &dyn GitHubApi,
    scaffolder: Arc<dyn Scaffolder>,
    notebook_dir: Option<&Path>,
    input: serde_json::Value,
) -> Result<String, SubmitError> {
    debug!("Loading request");
    let request: SubmissionRequest =
        serde_json::from_value(input).map_err(|e| SubmitError::BadRequest(e.to_string()))?;

    info!("Checking for valid code");
    check_code_is_valid(&request.code_content)?;

    let project = project::resolve(&config.project_config_path, notebook_dir)?;
    let identity = session::resolve_identity(session, github).await?;
    let token = session
        .lock()
        .await
        .access_token()
        .ok_or(AuthError::NotAuthenticated)?;

    let env = PipelineEnv {
        debug: config.debug,
        clone_url: format!(
            "https://{}@github.com/{}/{}",
            token, identity.login, project.repo_slug
        ),
        username: identity.login,
        email: identity.email,
        token,
        upstream: RepoSpec {
            owner: project.github_owner,
            slug: project.repo_slug,
        },
        package: project.package,
    };

    pipeline::run(&env, github, scaffolder, &request.code_content).await
}

/// Empty and syntactically invalid code get distinct user-facing messages,
/// and both are rejected before any repository work begins.
fn check_code_is_valid(code: &str) -> Result<(), SubmitError> {
    if code.trim().is_empty() {
        return Err(SubmitError::EmptyCode);
    }
    if !is_valid_source(code) {
        return Err(SubmitError::InvalidSource);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::scaffold::PackageScaffolder;
    use crate::github::test_support::RecordingGitHub;
    use serde_json::json;

    fn scaffolder() -> Arc<dyn Scaffolder> {
        Arc::new(PackageScaffolder)
    }

    fn assert_single_outcome(result: &SubmissionResult) {
        assert_eq!(result.result, result.url.is_some());
        assert_eq!(!result.result, result.message.is_some());
        assert!(result.url.is_some() != result.message.is_some());
    }

    #[tokio::test]
    async fn test_bad_request_shape_fails_fast() {
        let config = Config::default();
        let session = Mutex::new(Session::new("token"));
        let github = RecordingGitHub::default();

        for input in [
            json!({"wrongField": "x = 1"}),
            json!({}),
            json!({"codeContent": 42}),
            json!("just a string"),
        ] {
            let result = create_pull_request_for_code_content(
                &config,
                &session,
                &github,
                scaffolder(),
                None,
                input,
            )
            .await;
            assert!(!result.result);
            assert!(result.message.as_deref().unwrap().starts_with("Bad request - "));
            assert_single_outcome(&result);
        }
        // Validation failed before any network or git work.
        assert_eq!(github.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_code_rejected_without_side_effects() {
        let config = Config::default();
        let session = Mutex::new(Session::new("token"));
        let github = RecordingGitHub::default();

        for code in ["", "   ", "\n\t\n"] {
            let result = create_pull_request_for_code_content(
                &config,
                &session,
                &github,
                scaffolder(),
                None,
                json!({"codeContent": code}),
            )
            .await;
            assert!(!result.result);
            assert_eq!(
                result.message.as_deref(),
                Some("No code was submitted -- did you select the correct cell?")
            );
            assert_single_outcome(&result);
        }
        assert_eq!(github.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_code_rejected_with_its_own_message() {
        let config = Config::default();
        let session = Mutex::new(Session::new("token"));
        let github = RecordingGitHub::default();

        let result = create_pull_request_for_code_content(
            &config,
            &session,
            &github,
            scaffolder(),
            None,
            json!({"codeContent": "def f(:"}),
        )
        .await;
        assert!(!result.result);
        assert_eq!(
            result.message.as_deref(),
            Some("Submitted code is not valid Python code")
        );
        assert_eq!(github.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_project_becomes_failure_result() {
        let mut config = Config::default();
        // Point at an empty directory so detection cannot succeed.
        let empty = tempfile::tempdir().unwrap();
        config.set_project_config_path(empty.path().to_str().unwrap());
        let session = Mutex::new(Session::new("token"));
        let github = RecordingGitHub::default();

        let result = create_pull_request_for_code_content(
            &config,
            &session,
            &github,
            scaffolder(),
            None,
            json!({"codeContent": "x = 1 + 1"}),
        )
        .await;
        assert!(!result.result);
        assert!(result.message.as_deref().unwrap().contains("project.yml"));
        assert_single_outcome(&result);
    }

    #[tokio::test]
    async fn test_unauthenticated_submission_fails_cleanly() {
        let mut config = Config::default();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("project.yml"),
            "project:\n  slug: house-prices\ngithub:\n  owner: example-org\n",
        )
        .unwrap();
        config.set_project_config_path(dir.path().to_str().unwrap());
        let session = Mutex::new(Session::new(""));
        let github = RecordingGitHub::default();

        let result = create_pull_request_for_code_content(
            &config,
            &session,
            &github,
            scaffolder(),
            None,
            json!({"codeContent": "x = 1 + 1"}),
        )
        .await;
        assert!(!result.result);
        assert_eq!(result.message.as_deref(), Some("Not authenticated to GitHub"));
        assert_single_outcome(&result);
    }

    #[test]
    fn test_submission_result_serializes_with_explicit_nulls() {
        let ok = serde_json::to_value(SubmissionResult::success("http://x".into())).unwrap();
        assert_eq!(ok, json!({"result": true, "url": "http://x", "message": null}));

        let failed = serde_json::to_value(SubmissionResult::failure("nope".into())).unwrap();
        assert_eq!(failed, json!({"result": false, "url": null, "message": "nope"}));
    }
}
