//! Project context resolution.
//!
//! A project is identified by a `project.yml` descriptor at its root. The
//! context is resolved fresh per request from one of three sources, first
//! match wins: the explicitly configured path, the notebook directory the
//! server was pointed at, or the process working directory.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::SubmitError;

/// File name of the project descriptor.
pub const PROJECT_FILE: &str = "project.yml";

#[derive(Debug, Deserialize)]
struct ProjectFile {
    project: ProjectSection,
    github: GithubSection,
}

#[derive(Debug, Deserialize)]
struct ProjectSection {
    slug: String,
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    framework_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubSection {
    owner: String,
}

/// Immutable per-request view of the target project.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Repository name on GitHub.
    pub repo_slug: String,
    /// Owner of the upstream repository.
    pub github_owner: String,
    /// Python package receiving scaffolded features.
    pub package: String,
    pub version: Option<String>,
    pub framework_version: Option<String>,
}

impl ProjectContext {
    /// Refspec of the upstream repo, `"{owner}/{slug}"`.
    pub fn upstream_repo_spec(&self) -> String {
        format!("{}/{}", self.github_owner, self.repo_slug)
    }
}

impl fmt::Display for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.upstream_repo_spec())
    }
}

/// Resolve the project context.
///
/// Sources, in order: `config_path` when non-empty (a descriptor file or a
/// directory at or under which one lives), then `notebook_dir`, then the
/// current working directory. Directories are searched upward.
pub fn resolve(
    config_path: &str,
    notebook_dir: Option<&Path>,
) -> Result<ProjectContext, SubmitError> {
    if !config_path.is_empty() {
        return from_path(Path::new(config_path));
    }

    if let Some(dir) = notebook_dir
        && let Ok(ctx) = from_path(dir)
    {
        return Ok(ctx);
    }

    if let Ok(cwd) = env::current_dir()
        && let Ok(ctx) = from_path(&cwd)
    {
        return Ok(ctx);
    }

    Err(SubmitError::Project(
        "Could not detect project".to_string(),
    ))
}

/// Load a context from a descriptor file, or discover one upward from a
/// directory.
pub fn from_path(path: &Path) -> Result<ProjectContext, SubmitError> {
    let descriptor = if path.is_file() {
        path.to_path_buf()
    } else {
        discover(path).ok_or_else(|| {
            SubmitError::Project(format!(
                "No {} found at or above {}",
                PROJECT_FILE,
                path.display()
            ))
        })?
    };
    load(&descriptor)
}

/// Walk upward from `start` looking for the project descriptor.
fn discover(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn load(descriptor: &Path) -> Result<ProjectContext, SubmitError> {
    let raw = std::fs::read_to_string(descriptor)?;
    let file: ProjectFile = serde_yaml::from_str(&raw)
        .map_err(|e| SubmitError::Project(format!("Invalid {PROJECT_FILE}: {e}")))?;

    let package = file
        .project
        .package
        .unwrap_or_else(|| file.project.slug.replace('-', "_"));

    Ok(ProjectContext {
        repo_slug: file.project.slug,
        github_owner: file.github.owner,
        package,
        version: file.project.version,
        framework_version: file.project.framework_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_descriptor(dir: &Path) -> PathBuf {
        let path = dir.join(PROJECT_FILE);
        fs::write(
            &path,
            "project:\n  slug: house-prices\n  version: \"1.2.0\"\ngithub:\n  owner: example-org\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_from_descriptor_file() {
        let dir = tempdir().unwrap();
        let descriptor = write_descriptor(dir.path());
        let ctx = from_path(&descriptor).unwrap();
        assert_eq!(ctx.repo_slug, "house-prices");
        assert_eq!(ctx.github_owner, "example-org");
        assert_eq!(ctx.version.as_deref(), Some("1.2.0"));
        assert_eq!(ctx.framework_version, None);
    }

    #[test]
    fn test_package_defaults_to_underscored_slug() {
        let dir = tempdir().unwrap();
        write_descriptor(dir.path());
        let ctx = from_path(dir.path()).unwrap();
        assert_eq!(ctx.package, "house_prices");
    }

    #[test]
    fn test_explicit_package_wins() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(PROJECT_FILE),
            "project:\n  slug: house-prices\n  package: hp\ngithub:\n  owner: example-org\n",
        )
        .unwrap();
        let ctx = from_path(dir.path()).unwrap();
        assert_eq!(ctx.package, "hp");
    }

    #[test]
    fn test_upstream_repo_spec() {
        let dir = tempdir().unwrap();
        write_descriptor(dir.path());
        let ctx = from_path(dir.path()).unwrap();
        assert_eq!(ctx.upstream_repo_spec(), "example-org/house-prices");
    }

    #[test]
    fn test_discovery_walks_upward() {
        let dir = tempdir().unwrap();
        write_descriptor(dir.path());
        let nested = dir.path().join("notebooks/analysis");
        fs::create_dir_all(&nested).unwrap();
        let ctx = from_path(&nested).unwrap();
        assert_eq!(ctx.repo_slug, "house-prices");
    }

    #[test]
    fn test_missing_descriptor_is_an_error() {
        let dir = tempdir().unwrap();
        let err = from_path(dir.path()).unwrap_err();
        assert!(err.to_string().contains(PROJECT_FILE));
    }

    #[test]
    fn test_resolve_prefers_explicit_path() {
        let explicit = tempdir().unwrap();
        write_descriptor(explicit.path());
        let other = tempdir().unwrap();
        fs::write(
            other.path().join(PROJECT_FILE),
            "project:\n  slug: other\ngithub:\n  owner: someone\n",
        )
        .unwrap();

        let ctx = resolve(
            explicit.path().to_str().unwrap(),
            Some(other.path()),
        )
        .unwrap();
        assert_eq!(ctx.repo_slug, "house-prices");
    }

    #[test]
    fn test_resolve_falls_back_to_notebook_dir() {
        let dir = tempdir().unwrap();
        write_descriptor(dir.path());
        let ctx = resolve("", Some(dir.path())).unwrap();
        assert_eq!(ctx.github_owner, "example-org");
    }

    #[test]
    fn test_invalid_yaml_reports_descriptor() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_FILE), "project: [not, a, mapping\n").unwrap();
        let err = from_path(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid"));
    }
}
