//! File relocation after a processing attempt.
//!
//! Every file selected by a scan leaves the input directory once its attempt
//! ends, so the next scan never sees it again.

use std::path::{Path, PathBuf};

/// Where a file goes once its attempt has ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelocationPolicy {
    /// Every file goes to the processed directory, whatever the outcome.
    #[default]
    Always,
    /// Files whose attempt did not complete go to `failed_folder` so they can
    /// be replayed by moving them back into the input directory.
    DeadLetter { failed_folder: PathBuf },
}

impl RelocationPolicy {
    /// Destination directory for a file whose attempt `completed` or not.
    pub fn destination<'a>(&'a self, processed_folder: &'a Path, completed: bool) -> &'a Path {
        match self {
            Self::DeadLetter { failed_folder } if !completed => failed_folder.as_path(),
            _ => processed_folder,
        }
    }
}

/// Move `path` into `dest_dir`, keeping its base name.
///
/// Falls back to copy + remove when a plain rename is not possible, e.g.
/// across filesystems. An existing file with the same name is replaced.
pub async fn relocate(path: &Path, dest_dir: &Path) -> std::io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("no file name in {}", path.display()),
        )
    })?;
    let destination = dest_dir.join(file_name);

    if let Err(rename_err) = tokio::fs::rename(path, &destination).await {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(rename_err);
        }
        tracing::debug!(
            from = %path.display(),
            to = %destination.display(),
            error = %rename_err,
            "Rename failed, copying instead"
        );
        tokio::fs::copy(path, &destination).await?;
        tokio::fs::remove_file(path).await?;
    }

    Ok(destination)
}
