//! Feature scaffolding collaborator.
//!
//! The pipeline treats templating as a boundary: given a target username and
//! feature name, a [`Scaffolder`] materializes the new feature's file layout
//! inside the cloned repository and reports every entry it created. The
//! submitted code is then written to the single primary feature file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// What a scaffold entry is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One path created (or touched) by the scaffolder, relative to the
/// repository root.
#[derive(Debug, Clone)]
pub struct ScaffoldEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl ScaffoldEntry {
    fn file(path: PathBuf) -> Self {
        Self {
            path,
            kind: EntryKind::File,
        }
    }

    fn dir(path: PathBuf) -> Self {
        Self {
            path,
            kind: EntryKind::Dir,
        }
    }
}

/// Inputs for scaffolding one feature.
#[derive(Debug, Clone)]
pub struct FeatureContext {
    /// Submitting user's login, separator-normalized for use as a package
    /// segment (`-` becomes `_`).
    pub username: String,
    /// uuid-derived feature identifier, already underscore-normalized.
    pub feature_name: String,
    /// Python package of the target project.
    pub package: String,
}

/// Boundary trait for the templating engine.
pub trait Scaffolder: Send + Sync {
    /// Create the file layout for a new feature under `repo_root`. Returns
    /// the entries created, repo-relative, in creation order.
    fn start_feature(
        &self,
        repo_root: &Path,
        ctx: &FeatureContext,
    ) -> anyhow::Result<Vec<ScaffoldEntry>>;
}

/// The single file the submitted code is written into: the first file entry
/// whose path has no `__init__` segment.
pub fn primary_feature_file(entries: &[ScaffoldEntry]) -> Option<&Path> {
    entries
        .iter()
        .find(|entry| {
            entry.kind == EntryKind::File
                && !entry.path.to_string_lossy().contains("__init__")
        })
        .map(|entry| entry.path.as_path())
}

/// Built-in scaffolder producing the contrib package layout:
/// `src/{package}/features/contrib/user_{username}/feature_{name}.py`,
/// creating any missing `__init__.py` package markers along the way.
pub struct PackageScaffolder;

impl Scaffolder for PackageScaffolder {
    fn start_feature(
        &self,
        repo_root: &Path,
        ctx: &FeatureContext,
    ) -> anyhow::Result<Vec<ScaffoldEntry>> {
        let mut entries = Vec::new();

        let user_segment = format!("user_{}", ctx.username);
        let user_dir: PathBuf = [
            "src",
            ctx.package.as_str(),
            "features",
            "contrib",
            user_segment.as_str(),
        ]
        .iter()
        .collect();

        // Create missing directories one segment at a time so each new one
        // is reported as its own entry.
        let mut partial = PathBuf::new();
        for component in user_dir.components() {
            partial.push(component);
            let absolute = repo_root.join(&partial);
            if !absolute.is_dir() {
                fs::create_dir(&absolute)
                    .with_context(|| format!("Failed to create {}", absolute.display()))?;
                entries.push(ScaffoldEntry::dir(partial.clone()));
            }
        }

        // Package markers down the contrib chain.
        let mut marker_dir = PathBuf::from("src").join(&ctx.package);
        for segment in ["features", "contrib", user_segment.as_str()] {
            marker_dir.push(segment);
            let marker = marker_dir.join("__init__.py");
            let absolute = repo_root.join(&marker);
            if !absolute.is_file() {
                fs::write(&absolute, "")
                    .with_context(|| format!("Failed to create {}", absolute.display()))?;
                entries.push(ScaffoldEntry::file(marker));
            }
        }

        let feature_file = user_dir.join(format!("feature_{}.py", ctx.feature_name));
        let absolute = repo_root.join(&feature_file);
        fs::write(
            &absolute,
            format!("\"\"\"New feature submitted by {}.\"\"\"\n", ctx.username),
        )
        .with_context(|| format!("Failed to create {}", absolute.display()))?;
        entries.push(ScaffoldEntry::file(feature_file));

        Ok(entries)
    }
}
