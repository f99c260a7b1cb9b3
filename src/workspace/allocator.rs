//! Per-job workspace allocation.
//!
//! Every job owns an isolated directory tree under the jobs root:
//!
//! ```text
//! jobs/<job-id>/
//!     raw/          uploaded documents awaiting transformation
//!     transformed/  corrected documents (transform output, score input)
//!     scored/       evaluations and the batch summary
//!     rubric/       rubric file for the score stage
//!     artifacts/    anything else produced for the job
//! ```

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::error::WorkspaceError;
use crate::scheduler::job::JobId;

const RAW_DIR: &str = "raw";
const TRANSFORMED_DIR: &str = "transformed";
const SCORED_DIR: &str = "scored";
const RUBRIC_DIR: &str = "rubric";
const ARTIFACTS_DIR: &str = "artifacts";

/// Directory layout of one job's workspace. All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub job_id: JobId,
    pub root: PathBuf,
    pub raw: PathBuf,
    pub transformed: PathBuf,
    pub scored: PathBuf,
    pub rubric: PathBuf,
    pub artifacts: PathBuf,
}

impl JobPaths {
    /// Computes the layout for `job_id` under `jobs_root` without touching disk.
    pub fn under(jobs_root: &Path, job_id: JobId) -> Self {
        let root = jobs_root.join(job_id.to_string());
        Self {
            job_id,
            raw: root.join(RAW_DIR),
            transformed: root.join(TRANSFORMED_DIR),
            scored: root.join(SCORED_DIR),
            rubric: root.join(RUBRIC_DIR),
            artifacts: root.join(ARTIFACTS_DIR),
            root,
        }
    }

    fn all_dirs(&self) -> [&Path; 6] {
        [
            self.root.as_path(),
            self.raw.as_path(),
            self.transformed.as_path(),
            self.scored.as_path(),
            self.rubric.as_path(),
            self.artifacts.as_path(),
        ]
    }

    /// Returns `path` relative to the job root, or `path` itself when it
    /// lies outside the workspace.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Writes uploaded files into `dir`, keeping only the final component of
    /// each name. Returns the stored paths relative to the job root.
    pub async fn store_files(
        &self,
        dir: &Path,
        files: &[(String, Vec<u8>)],
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| WorkspaceError::io(dir, e))?;

        let mut stored = Vec::with_capacity(files.len());
        for (index, (filename, data)) in files.iter().enumerate() {
            let name = safe_file_name(filename, &format!("upload_{}", index + 1));
            let target = dir.join(name);
            fs::write(&target, data)
                .await
                .map_err(|e| WorkspaceError::io(&target, e))?;
            stored.push(self.relative(&target));
        }
        Ok(stored)
    }

    /// Writes the rubric upload into `rubric/` and returns its absolute path.
    pub async fn store_rubric(
        &self,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, WorkspaceError> {
        fs::create_dir_all(&self.rubric)
            .await
            .map_err(|e| WorkspaceError::io(&self.rubric, e))?;
        let target = self.rubric.join(safe_file_name(filename, "rubric"));
        fs::write(&target, data)
            .await
            .map_err(|e| WorkspaceError::io(&target, e))?;
        Ok(target)
    }

    /// Copies the regular files of `source` (non-recursive) into `dest`.
    /// Returns the copied paths relative to the job root, sorted by name.
    pub async fn import_dir(
        &self,
        source: &Path,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        fs::create_dir_all(dest)
            .await
            .map_err(|e| WorkspaceError::io(dest, e))?;

        let mut entries = fs::read_dir(source)
            .await
            .map_err(|e| WorkspaceError::io(source, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::io(source, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| WorkspaceError::io(entry.path(), e))?;
            if file_type.is_file() {
                names.push(entry.file_name());
            }
        }
        names.sort();

        let mut copied = Vec::with_capacity(names.len());
        for name in names {
            let target = dest.join(&name);
            fs::copy(source.join(&name), &target)
                .await
                .map_err(|e| WorkspaceError::io(&target, e))?;
            copied.push(self.relative(&target));
        }
        Ok(copied)
    }

    /// Resolves a path relative to the job root for download.
    ///
    /// Absolute paths, `..` components and symlinks leading outside the
    /// workspace are rejected. The target must be an existing file.
    pub async fn resolve_artifact(&self, relative: &str) -> Result<PathBuf, WorkspaceError> {
        let requested = Path::new(relative);
        let escapes = requested.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(WorkspaceError::OutsideWorkspace(relative.to_string()));
        }

        let root = fs::canonicalize(&self.root)
            .await
            .map_err(|e| WorkspaceError::io(&self.root, e))?;
        let target = match fs::canonicalize(self.root.join(requested)).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkspaceError::NotFound(relative.to_string()))
            }
            Err(e) => return Err(WorkspaceError::io(self.root.join(requested), e)),
        };
        if !target.starts_with(&root) {
            return Err(WorkspaceError::OutsideWorkspace(relative.to_string()));
        }

        let is_file = fs::metadata(&target)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(WorkspaceError::NotFound(relative.to_string()));
        }
        Ok(target)
    }
}

/// Final path component of `name`, or `fallback` when there is none.
fn safe_file_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

/// Creates job workspaces under a common jobs root.
#[derive(Debug, Clone)]
pub struct WorkspaceAllocator {
    jobs_root: PathBuf,
}

impl WorkspaceAllocator {
    /// Creates an allocator rooted at `jobs_root`. Nothing is created on disk
    /// until the first workspace is allocated.
    pub fn new(jobs_root: impl Into<PathBuf>) -> Self {
        Self {
            jobs_root: jobs_root.into(),
        }
    }

    /// Returns the configured jobs root.
    pub fn jobs_root(&self) -> &Path {
        &self.jobs_root
    }

    /// Creates (or re-opens) the workspace for `job_id`, generating an id
    /// when none is given.
    ///
    /// Idempotent: existing directories and the files in them are kept.
    pub async fn create_workspace(&self, job_id: Option<JobId>) -> Result<JobPaths, WorkspaceError> {
        let job_id = job_id.unwrap_or_default();
        let jobs_root = std::path::absolute(&self.jobs_root)
            .map_err(|e| WorkspaceError::io(&self.jobs_root, e))?;
        let paths = JobPaths::under(&jobs_root, job_id);

        for dir in paths.all_dirs() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| WorkspaceError::io(dir, e))?;
        }

        debug!(job_id = %job_id, root = %paths.root.display(), "Workspace ready");
        Ok(paths)
    }

    /// Deletes a workspace tree. A tree that is already gone is not an error.
    pub async fn remove_workspace(&self, paths: &JobPaths) -> Result<(), WorkspaceError> {
        match fs::remove_dir_all(&paths.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::io(&paths.root, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_workspace_builds_layout() {
        let tmp = TempDir::new().expect("tempdir");
        let allocator = WorkspaceAllocator::new(tmp.path().join("jobs"));

        let paths = allocator.create_workspace(None).await.expect("allocate");

        assert!(paths.root.is_absolute());
        assert!(paths.root.ends_with(paths.job_id.to_string()));
        for dir in paths.all_dirs() {
            assert!(dir.is_dir(), "{} should exist", dir.display());
        }
        assert_eq!(paths.raw, paths.root.join("raw"));
        assert_eq!(paths.scored, paths.root.join("scored"));
    }

    #[tokio::test]
    async fn test_create_workspace_is_idempotent() {
        let tmp = TempDir::new().expect("tempdir");
        let allocator = WorkspaceAllocator::new(tmp.path());
        let id = JobId::new();

        let first = allocator.create_workspace(Some(id)).await.expect("first");
        std::fs::write(first.raw.join("essay.txt"), "hello").expect("write");

        let second = allocator.create_workspace(Some(id)).await.expect("second");

        assert_eq!(first, second);
        let files: Vec<_> = std::fs::read_dir(&second.raw)
            .expect("read_dir")
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(
            std::fs::read_to_string(second.raw.join("essay.txt")).expect("read"),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_remove_workspace() {
        let tmp = TempDir::new().expect("tempdir");
        let allocator = WorkspaceAllocator::new(tmp.path());
        let paths = allocator.create_workspace(None).await.expect("allocate");

        allocator.remove_workspace(&paths).await.expect("remove");
        assert!(!paths.root.exists());
        // Second removal is a no-op.
        allocator.remove_workspace(&paths).await.expect("remove again");
    }

    #[test]
    fn test_relative_strips_root_or_keeps_verbatim() {
        let paths = JobPaths::under(Path::new("/srv/jobs"), JobId::new());
        let inside = paths.transformed.join("a.txt");
        assert_eq!(paths.relative(&inside), PathBuf::from("transformed/a.txt"));

        let outside = PathBuf::from("/elsewhere/b.txt");
        assert_eq!(paths.relative(&outside), outside);
    }

    #[tokio::test]
    async fn test_store_files_sanitizes_names() {
        let tmp = TempDir::new().expect("tempdir");
        let allocator = WorkspaceAllocator::new(tmp.path());
        let paths = allocator.create_workspace(None).await.expect("allocate");

        let stored = paths
            .store_files(
                &paths.raw,
                &[
                    ("../../etc/evil.txt".to_string(), b"x".to_vec()),
                    (String::new(), b"y".to_vec()),
                ],
            )
            .await
            .expect("store");

        assert_eq!(
            stored,
            vec![PathBuf::from("raw/evil.txt"), PathBuf::from("raw/upload_2")]
        );
        assert!(paths.raw.join("evil.txt").is_file());
    }

    #[tokio::test]
    async fn test_store_rubric() {
        let tmp = TempDir::new().expect("tempdir");
        let allocator = WorkspaceAllocator::new(tmp.path());
        let paths = allocator.create_workspace(None).await.expect("allocate");

        let rubric = paths
            .store_rubric("nested/rubric.json", b"{}")
            .await
            .expect("store rubric");
        assert_eq!(rubric, paths.rubric.join("rubric.json"));
        assert!(rubric.is_file());
    }

    #[tokio::test]
    async fn test_import_dir_copies_files_only() {
        let tmp = TempDir::new().expect("tempdir");
        let source = tmp.path().join("incoming");
        std::fs::create_dir_all(source.join("nested")).expect("mkdir");
        std::fs::write(source.join("b.txt"), "b").expect("write");
        std::fs::write(source.join("a.txt"), "a").expect("write");

        let allocator = WorkspaceAllocator::new(tmp.path().join("jobs"));
        let paths = allocator.create_workspace(None).await.expect("allocate");
        let copied = paths.import_dir(&source, &paths.raw).await.expect("import");

        assert_eq!(
            copied,
            vec![PathBuf::from("raw/a.txt"), PathBuf::from("raw/b.txt")]
        );
        assert!(!paths.raw.join("nested").exists());
    }

    #[tokio::test]
    async fn test_resolve_artifact() {
        let tmp = TempDir::new().expect("tempdir");
        let allocator = WorkspaceAllocator::new(tmp.path());
        let paths = allocator.create_workspace(None).await.expect("allocate");
        std::fs::write(paths.scored.join("essay.txt"), "graded").expect("write");

        let resolved = paths
            .resolve_artifact("scored/essay.txt")
            .await
            .expect("resolve");
        assert!(resolved.ends_with("scored/essay.txt"));

        assert!(matches!(
            paths.resolve_artifact("../other/secret.txt").await,
            Err(WorkspaceError::OutsideWorkspace(_))
        ));
        assert!(matches!(
            paths.resolve_artifact("/etc/passwd").await,
            Err(WorkspaceError::OutsideWorkspace(_))
        ));
        assert!(matches!(
            paths.resolve_artifact("scored/missing.txt").await,
            Err(WorkspaceError::NotFound(_))
        ));
        assert!(matches!(
            paths.resolve_artifact("scored").await,
            Err(WorkspaceError::NotFound(_))
        ));
    }
}
