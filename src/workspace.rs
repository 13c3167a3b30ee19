// src/workspace.rs

//! Task workspace: project root, working directory and temp allocation.
//!
//! Everything handed to a launcher is expressed relative to the project
//! root, so a request rebuilt after a restart points at the same files. Temp
//! files and dirs live under `<working dir>/.taskexec/tmp` for the same
//! reason: they stay inside the project tree.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::TempPath;

use crate::errors::{Result, TaskExecError};
use crate::params::Params;
use crate::template::TemplateEngine;

const TEMP_SUBDIR: &str = ".taskexec/tmp";

#[derive(Debug, Clone)]
pub struct Workspace {
    project_path: PathBuf,
    path: PathBuf,
}

impl Workspace {
    /// Create a workspace rooted at `project_path` with the task working
    /// directory at `project_path/working_dir`.
    ///
    /// A relative `project_path` is resolved against the current directory.
    pub fn new(project_path: impl AsRef<Path>, working_dir: impl AsRef<Path>) -> Result<Self> {
        let project_path = absolute(project_path.as_ref())?;
        let working_dir = working_dir.as_ref();
        if working_dir.is_absolute() {
            return Err(TaskExecError::ConfigError(format!(
                "working directory {:?} must be relative to the project root",
                working_dir
            )));
        }
        let path = normalize(&project_path.join(working_dir));
        Ok(Self { project_path, path })
    }

    /// Absolute project root.
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Absolute working directory of the task.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_root(&self) -> Result<PathBuf> {
        let root = self.path.join(TEMP_SUBDIR);
        fs::create_dir_all(&root).with_context(|| format!("creating dir {:?}", root))?;
        Ok(root)
    }

    /// Allocate a uniquely named directory that outlives this process.
    ///
    /// Batch commands may keep running after we exit, so the directory is
    /// never removed here.
    pub fn create_temp_dir(&self, prefix: &str) -> Result<PathBuf> {
        let root = self.temp_root()?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&root)
            .with_context(|| format!("creating temp dir in {:?}", root))?;
        Ok(dir.keep())
    }

    /// Allocate a uniquely named file that is deleted when the returned
    /// path is dropped.
    pub fn create_temp_file(&self, prefix: &str, suffix: &str) -> Result<TempPath> {
        let root = self.temp_root()?;
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&root)
            .with_context(|| format!("creating temp file in {:?}", root))?;
        Ok(file.into_temp_path())
    }

    /// Read a template file (relative to the working directory) and expand
    /// it against `params`.
    pub fn template_file(
        &self,
        engine: &dyn TemplateEngine,
        file: &str,
        params: &Params,
    ) -> Result<String> {
        let path = self.path.join(file);
        let content =
            fs::read_to_string(&path).with_context(|| format!("reading template {:?}", path))?;
        engine.render(&content, params)
    }

    /// Path of `path` relative to the working directory.
    pub fn relativize(&self, path: &Path) -> Result<PathBuf> {
        relativize(&self.path, path)
    }
}

/// Express `path` relative to `base`.
///
/// First tries a direct `strip_prefix`; if that fails (symlinked temp dirs
/// on macOS, for instance) both sides are canonicalized and compared again.
pub fn relativize(base: &Path, path: &Path) -> Result<PathBuf> {
    if let Ok(rel) = path.strip_prefix(base) {
        return Ok(rel.to_path_buf());
    }

    if let (Ok(base_canon), Ok(path_canon)) = (base.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&base_canon) {
            return Ok(rel.to_path_buf());
        }
    }

    Err(TaskExecError::ConfigError(format!(
        "path {:?} is not inside {:?}",
        path, base
    )))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().context("resolving current directory")?;
    Ok(normalize(&cwd.join(path)))
}

/// Lexically drop `.` components and resolve `..` against earlier ones.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
