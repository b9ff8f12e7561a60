//! Source packaging
//!
//! The source tree is zipped once per run by the external `zip` tool and the
//! resulting artifact is shared read-only by every host attempt.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use sd_core::config::ArchiveConfig;
use sd_core::DeployError;

/// Packaging errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The source directory does not exist
    #[error("Source directory {} does not exist", .0.display())]
    SourceMissing(PathBuf),

    /// The source exists but is not a directory
    #[error("Source {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The source directory has nothing in it to deploy
    #[error("Source directory {} is empty; nothing to deploy", .0.display())]
    EmptySource(PathBuf),

    /// The packaging tool could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The packaging tool exited unsuccessfully
    #[error("{program} exited with {status}: {diagnostic}")]
    ToolFailed {
        program: String,
        status: String,
        diagnostic: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ArchiveError> for DeployError {
    fn from(err: ArchiveError) -> Self {
        DeployError::Archive(err.to_string())
    }
}

/// A packaged source tree on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Full local path of the archive
    pub path: PathBuf,
    /// File name, also used on the remote side
    pub file_name: String,
    /// Size in bytes
    pub size: u64,
    /// Hex-encoded SHA-256 of the archive
    pub sha256: String,
}

impl Artifact {
    /// Describe an existing archive file
    pub async fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "artifact path has no file name")
            })?;

        let mut file = tokio::fs::File::open(&path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }

        Ok(Self {
            path,
            file_name,
            size,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Zips a source directory into a single artifact
#[derive(Debug, Clone)]
pub struct Archiver {
    config: ArchiveConfig,
}

impl Archiver {
    /// Create an archiver
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// Package `source` and return the artifact
    ///
    /// Runs the packaging tool exactly once. A stale artifact with the same
    /// name is removed first so a failed run never leaves an old archive
    /// looking like a fresh one.
    pub async fn create(&self, source: &Path) -> Result<Artifact, ArchiveError> {
        let metadata = match tokio::fs::metadata(source).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArchiveError::SourceMissing(source.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(ArchiveError::NotADirectory(source.to_path_buf()));
        }
        // zip refuses to write an archive with no entries
        if tokio::fs::read_dir(source).await?.next_entry().await?.is_none() {
            return Err(ArchiveError::EmptySource(source.to_path_buf()));
        }

        let source = tokio::fs::canonicalize(source).await?;
        let base_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());

        let output_dir = self.config.output_dir();
        tokio::fs::create_dir_all(&output_dir).await?;
        let archive_path = output_dir.join(format!("{}.zip", base_name));

        match tokio::fs::remove_file(&archive_path).await {
            Ok(()) => tracing::debug!("Removed stale artifact {:?}", archive_path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let (work_dir, entry) = match (self.config.include_root_dir, source.parent()) {
            (true, Some(parent)) => (parent.to_path_buf(), base_name.clone()),
            _ => (source.clone(), ".".to_string()),
        };

        tracing::info!("Packaging {:?} into {:?}", source, archive_path);
        let output = Command::new(&self.config.program)
            .args(["-q", "-r", "-y"])
            .arg(&archive_path)
            .arg(&entry)
            .current_dir(&work_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ArchiveError::Spawn {
                program: self.config.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostic = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ArchiveError::ToolFailed {
                program: self.config.program.clone(),
                status: output.status.to_string(),
                diagnostic,
            });
        }

        if !tokio::fs::try_exists(&archive_path).await? {
            return Err(ArchiveError::ToolFailed {
                program: self.config.program.clone(),
                status: output.status.to_string(),
                diagnostic: format!("no archive was written to {}", archive_path.display()),
            });
        }

        let artifact = Artifact::from_path(archive_path).await?;
        tracing::info!(
            "Artifact {} ready ({} bytes, sha256 {})",
            artifact.file_name,
            artifact.size,
            artifact.sha256
        );
        Ok(artifact)
    }
}
