//! File system service
//!
//! Provides the file operations behind report artifacts: preparing the reports
//! directory, writing artifacts and listing what has been generated.

use crate::error::AppError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A generated report on disk
#[derive(Debug, Serialize, Clone)]
pub struct ReportFile {
    /// File name
    pub name: String,
    /// Path on disk
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification, Unix seconds
    pub modified: Option<u64>,
}

/// File system service
pub struct FileService;

impl FileService {
    /// Validate and canonicalize a path
    ///
    /// # Arguments
    /// * `path_str` - Path string to validate
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Canonicalized absolute path
    /// * `Err(AppError)` - If path is invalid, doesn't exist, or cannot be accessed
    pub fn validate_and_canonicalize_path(path_str: &str) -> Result<PathBuf, AppError> {
        let path = Path::new(path_str);

        if !path.exists() {
            return Err(AppError::FileNotFound(format!(
                "Path does not exist: {}",
                path_str
            )));
        }

        let canonical = path
            .canonicalize()
            .map_err(|e| AppError::InvalidPath(format!("Invalid path: {} - {}", path_str, e)))?;

        Ok(canonical)
    }

    /// Create `path_str` (and parents) if needed and return its canonical form
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Canonicalized absolute directory path
    /// * `Err(AppError)` - If the directory cannot be created or the path is a file
    pub async fn ensure_directory(path_str: &str) -> Result<PathBuf, AppError> {
        fs::create_dir_all(path_str).await.map_err(|e| {
            AppError::PermissionDenied(format!("Failed to create directory: {} - {}", path_str, e))
        })?;

        let canonical = Self::validate_and_canonicalize_path(path_str)?;
        if !canonical.is_dir() {
            return Err(AppError::NotADirectory(format!(
                "Path is not a directory: {}",
                path_str
            )));
        }
        Ok(canonical)
    }

    /// Write `content` to `file_path`, creating parent directories
    ///
    /// # Arguments
    /// * `file_path` - Path to the file (relative paths resolve against `base_dir`)
    /// * `content` - Content to write
    /// * `base_dir` - Optional base directory for relative paths
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - The canonicalized absolute path of the written file
    /// * `Err(AppError)` - If the path escapes `base_dir` or the write fails
    pub async fn write_file(
        file_path: &str,
        content: &str,
        base_dir: Option<&Path>,
    ) -> Result<PathBuf, AppError> {
        let relative = Path::new(file_path);
        if base_dir.is_some()
            && (relative.is_absolute()
                || relative
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir)))
        {
            return Err(AppError::InvalidPath(format!(
                "Path must stay inside the base directory: {}",
                file_path
            )));
        }

        let target = match base_dir {
            Some(dir) => dir.join(relative),
            None => relative.to_path_buf(),
        };

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::PermissionDenied(format!(
                    "Failed to create directory: {} - {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        fs::write(&target, content).await.map_err(|e| {
            AppError::PermissionDenied(format!(
                "Failed to write file: {} - {}",
                target.display(),
                e
            ))
        })?;

        target
            .canonicalize()
            .map_err(|e| AppError::InvalidPath(format!("Invalid path: {} - {}", target.display(), e)))
    }

    /// List generated reports in a directory, newest first
    pub async fn list_reports(dir: &Path) -> Result<Vec<ReportFile>, AppError> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| {
            AppError::PermissionDenied(format!(
                "Failed to read directory: {} - {}",
                dir.display(),
                e
            ))
        })?;

        let mut reports = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::PermissionDenied(format!(
                "Failed to read directory entry: {} - {}",
                dir.display(),
                e
            ))
        })? {
            let entry_path = entry.path();
            if entry_path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            let metadata = entry.metadata().await.map_err(|e| {
                AppError::PermissionDenied(format!(
                    "Failed to read metadata: {} - {}",
                    entry_path.display(),
                    e
                ))
            })?;
            if !metadata.is_file() {
                continue;
            }

            let name = entry_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();
            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs());

            reports.push(ReportFile {
                name,
                path: entry_path.to_string_lossy().to_string(),
                size: metadata.len(),
                modified,
            });
        }

        // Newest first, then by name
        reports.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));

        Ok(reports)
    }
}
