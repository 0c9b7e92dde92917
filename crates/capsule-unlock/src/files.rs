//! Selecting files for batch capsule creation
//!
//! Explicit file arguments must pass the filters; files found while walking
//! a directory that do not pass are skipped and reported.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chain::ConditionSpec;
use crate::create::{CreateRequest, KeyMode};
use crate::error::{UnlockError, UnlockResult};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Size, extension and depth rules for batch input
#[derive(Clone, Debug)]
pub struct FileFilter {
    pub max_file_size: u64,
    /// Allowed extensions, case-insensitive; `None` allows everything
    pub extensions: Option<Vec<String>>,
    pub recursive: bool,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            extensions: None,
            recursive: false,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchFile {
    pub path: PathBuf,
    pub size: u64,
    pub content_type: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FileSelection {
    pub files: Vec<BatchFile>,
    pub skipped: Vec<SkippedFile>,
}

impl FileSelection {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

impl FileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_file_size = max_size;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect::<Vec<_>>();
        self.extensions = (!extensions.is_empty()).then_some(extensions);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Expand files and directories, in argument order then file-name order
    pub fn select(&self, paths: &[PathBuf]) -> UnlockResult<FileSelection> {
        let mut selection = FileSelection::default();

        for path in paths {
            if path.is_file() {
                let file = self
                    .check(path)
                    .map_err(|reason| UnlockError::InvalidInput(format!("{}: {reason}", path.display())))?;
                selection.files.push(file);
            } else if path.is_dir() {
                self.walk(path, &mut selection)?;
            } else {
                return Err(UnlockError::InvalidInput(format!(
                    "Path does not exist or is not accessible: {}",
                    path.display()
                )));
            }
        }

        debug!(
            files = selection.files.len(),
            skipped = selection.skipped.len(),
            bytes = selection.total_size(),
            "Selected batch input"
        );
        Ok(selection)
    }

    fn walk(&self, dir: &Path, selection: &mut FileSelection) -> UnlockResult<()> {
        let walker = WalkDir::new(dir).sort_by_file_name();
        let walker = if self.recursive { walker } else { walker.max_depth(1) };

        for entry in walker {
            let entry = entry.map_err(|e| UnlockError::InvalidInput(format!("Failed to read directory entry: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            match self.check(entry.path()) {
                Ok(file) => selection.files.push(file),
                Err(reason) => {
                    warn!(path = %entry.path().display(), %reason, "Skipping file");
                    selection.skipped.push(SkippedFile {
                        path: entry.path().to_path_buf(),
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    fn check(&self, path: &Path) -> Result<BatchFile, String> {
        let size = std::fs::metadata(path)
            .map_err(|e| format!("cannot read metadata: {e}"))?
            .len();
        if size > self.max_file_size {
            return Err(format!("file too large: {size} bytes (max {})", self.max_file_size));
        }

        if let Some(allowed) = &self.extensions {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .ok_or_else(|| "no extension, but extensions are restricted".to_string())?;
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)) {
                return Err(format!("extension '{ext}' not allowed (allowed: {})", allowed.join(", ")));
            }
        }

        Ok(BatchFile {
            path: path.to_path_buf(),
            size,
            content_type: content_type_for(path),
        })
    }
}

impl BatchFile {
    /// Read the file into a creation request
    pub async fn load(&self, condition: ConditionSpec, key_mode: KeyMode) -> UnlockResult<CreateRequest> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|e| UnlockError::InvalidInput(format!("Failed to read {}: {e}", self.path.display())))?;
        let request = CreateRequest::new(content, self.content_type.clone(), condition);
        Ok(match key_mode {
            KeyMode::Wallet => request,
            KeyMode::Random => request.with_random_key(),
        })
    }
}

/// MIME type guessed from the file extension
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_guess() {
        assert_eq!(content_type_for(Path::new("note.TXT")), "text/plain");
        assert_eq!(content_type_for(Path::new("data.json")), "application/json");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_extension_list_normalized() {
        let filter = FileFilter::new().with_extensions(vec![".txt".into(), "".into(), "md".into()]);
        assert_eq!(filter.extensions, Some(vec!["txt".to_string(), "md".to_string()]));
        assert!(FileFilter::new().with_extensions(Vec::new()).extensions.is_none());
    }
}
