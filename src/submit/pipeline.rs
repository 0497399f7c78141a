//! The repository staging pipeline.
//!
//! The ordered sequence of operations that turns a validated code string
//! into a pull request: fork, clone, configure, branch, scaffold, write,
//! commit, push, open PR. Steps are strictly sequential and the first
//! failure aborts the rest; the single conversion of errors into a
//! user-facing result happens in the façade, not here.
//!
//! Remote-mutating steps (fork, push, PR creation) are gated by the debug
//! flag: a dry run still clones and commits inside its private temporary
//! directory, so templating and git mechanics are exercised end to end.

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use git2::{Cred, PushOptions, RemoteCallbacks, Repository, Signature, build::CheckoutBuilder};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codecheck::format_source;
use super::scaffold::{EntryKind, FeatureContext, ScaffoldEntry, Scaffolder, primary_feature_file};
use crate::errors::SubmitError;
use crate::github::{GitHubApi, PullRequestParams};

/// Placeholder URL returned instead of a real pull request in debug mode.
pub const TESTING_URL: &str = "http://some/testing/url";

pub const COMMIT_MESSAGE: &str = "Add new feature";
pub const PR_TITLE: &str = "Propose new feature";

/// Upstream repository coordinates.
#[derive(Debug, Clone)]
pub struct RepoSpec {
    pub owner: String,
    pub slug: String,
}

impl std::fmt::Display for RepoSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.slug)
    }
}

/// Everything one pipeline run needs, resolved up front by the façade so
/// the steps themselves never touch session state.
#[derive(Debug, Clone)]
pub struct PipelineEnv {
    pub debug: bool,
    /// GitHub login of the submitting user.
    pub username: String,
    /// Commit author email.
    pub email: String,
    pub token: String,
    /// URL of the user's fork, with embedded token credentials so push
    /// needs no separate auth prompt.
    pub clone_url: String,
    pub upstream: RepoSpec,
    /// Python package of the target project, for scaffolding.
    pub package: String,
}

/// Ephemeral branch identity, derived from one random identifier per run.
#[derive(Debug, Clone)]
pub struct FeatureBranch {
    pub feature_name: String,
    pub branch_name: String,
}

impl FeatureBranch {
    pub fn generate() -> Self {
        Self::from_identifier(&Uuid::new_v4().to_string())
    }

    /// `feature_name` is the identifier normalized for use as a code
    /// symbol; `branch_name` prefixes the raw identifier.
    pub fn from_identifier(identifier: &str) -> Self {
        Self {
            feature_name: identifier.replace('-', "_"),
            branch_name: format!("submit-feature-{identifier}"),
        }
    }
}

/// Run the full pipeline; returns the pull request URL.
pub async fn run(
    env: &PipelineEnv,
    github: &dyn GitHubApi,
    scaffolder: Arc<dyn Scaffolder>,
    code: &str,
) -> Result<String, SubmitError> {
    info!("Forking upstream repo");
    if env.debug {
        debug!("skipped fork of {} in debug mode", env.upstream);
    } else {
        github
            .create_fork(&env.token, &env.upstream.owner, &env.upstream.slug)
            .await
            .map_err(|e| SubmitError::GitHub(e.to_string()))?;
    }

    let branch = FeatureBranch::generate();

    // Steps 2-8 are git2 plumbing and filesystem work; keep them off the
    // async worker threads.
    {
        let env = env.clone();
        let branch = branch.clone();
        let code = code.to_string();
        tokio::task::spawn_blocking(move || {
            stage_feature(&env, scaffolder.as_ref(), &branch, &code)
        })
        .await
        .map_err(|e| SubmitError::Other(anyhow!("staging task failed: {e}")))??;
    }

    info!("Creating pull request");
    if env.debug {
        debug!("skipped real pull request in debug mode");
        return Ok(TESTING_URL.to_string());
    }
    let base = github
        .default_branch(&env.token, &env.upstream.owner, &env.upstream.slug)
        .await
        .map_err(|e| SubmitError::GitHub(e.to_string()))?;
    let params = PullRequestParams {
        title: PR_TITLE.to_string(),
        body: pull_request_body(&branch.feature_name, &env.username),
        base,
        head: format!("{}:{}", env.username, branch.branch_name),
        maintainer_can_modify: true,
    };
    github
        .create_pull_request(&env.token, &env.upstream.owner, &env.upstream.slug, params)
        .await
        .map_err(|e| SubmitError::GitHub(e.to_string()))
}

/// Clone into an exclusively owned temporary directory and run the local
/// steps there. The directory is removed on every exit path; removal
/// failures are logged, never surfaced, and never mask the primary result.
fn stage_feature(
    env: &PipelineEnv,
    scaffolder: &dyn Scaffolder,
    branch: &FeatureBranch,
    code: &str,
) -> Result<(), SubmitError> {
    let workspace = tempfile::tempdir()?;
    let result = stage_in(workspace.path(), env, scaffolder, branch, code);
    if let Err(e) = workspace.close() {
        warn!("Failed to remove temporary workspace: {e}");
    }
    result
}

fn stage_in(
    root: &Path,
    env: &PipelineEnv,
    scaffolder: &dyn Scaffolder,
    branch: &FeatureBranch,
    code: &str,
) -> Result<(), SubmitError> {
    info!("Cloning repo");
    let repo = Repository::clone(&env.clone_url, root)?;

    info!("Configuring repo");
    configure_repo(&repo, env)?;

    info!("Creating new branch and checking it out");
    checkout_new_branch(&repo, &branch.branch_name)?;

    info!("Starting new feature");
    let ctx = FeatureContext {
        username: env.username.replace('-', "_"),
        feature_name: branch.feature_name.clone(),
        package: env.package.clone(),
    };
    let entries = scaffolder.start_feature(root, &ctx)?;
    let primary = primary_feature_file(&entries)
        .ok_or(SubmitError::NoPrimaryFeatureFile)?
        .to_path_buf();

    info!("Adding code content");
    std::fs::write(root.join(&primary), format_source(code))?;

    info!("Committing new feature");
    commit_entries(&repo, &entries, env)?;

    info!("Pushing to remote");
    if env.debug {
        debug!("skipped push to remote in debug mode");
    } else {
        push_branch(&repo, &branch.branch_name, env)?;
    }
    Ok(())
}

fn configure_repo(repo: &Repository, env: &PipelineEnv) -> Result<(), git2::Error> {
    let mut config = repo.config()?;
    config.set_str("user.name", &env.username)?;
    config.set_str("user.email", &env.email)?;
    repo.remote_set_url("origin", &env.clone_url)?;
    Ok(())
}

fn checkout_new_branch(repo: &Repository, name: &str) -> Result<(), git2::Error> {
    let head = repo.head()?.peel_to_commit()?;
    repo.branch(name, &head, false)?;
    repo.set_head(&format!("refs/heads/{name}"))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))?;
    Ok(())
}

/// Stage exactly the scaffold's file entries (the rewritten primary file is
/// one of them), never a blanket add.
fn commit_entries(
    repo: &Repository,
    entries: &[ScaffoldEntry],
    env: &PipelineEnv,
) -> Result<(), git2::Error> {
    let mut index = repo.index()?;
    for entry in entries.iter().filter(|e| e.kind == EntryKind::File) {
        index.add_path(&entry.path)?;
    }
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let sig = Signature::now(&env.username, &env.email)?;
    let parent = repo.head()?.peel_to_commit()?;
    repo.commit(Some("HEAD"), &sig, &sig, COMMIT_MESSAGE, &tree, &[&parent])?;
    Ok(())
}

fn push_branch(repo: &Repository, branch_name: &str, env: &PipelineEnv) -> Result<(), git2::Error> {
    let mut remote = repo.find_remote("origin")?;
    let mut callbacks = RemoteCallbacks::new();
    let username = env.username.clone();
    let token = env.token.clone();
    callbacks.credentials(move |_url, username_from_url, _allowed| {
        Cred::userpass_plaintext(username_from_url.unwrap_or(&username), &token)
    });
    let mut options = PushOptions::new();
    options.remote_callbacks(callbacks);
    let refspec = format!("refs/heads/{branch_name}:refs/heads/{branch_name}");
    remote.push(&[refspec.as_str()], Some(&mut options))
}

fn pull_request_body(feature_name: &str, username: &str) -> String {
    format!(
        "Propose new feature: {feature_name}\n\
         Submitted by user: {username}\n\
         \n\
         --\n\
         Pull request automatically created by assemble-server\n"
    )
}
