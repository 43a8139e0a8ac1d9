//! Artifact persistence
//!
//! The exported report is written next to its destination first and then
//! renamed into place, so a partially written report is never visible. On
//! Unix the file is readable by its owner only.

use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::core::ExportArtifact;
use crate::error::{ExportError, ExportResult};

/// Base name used when no output file is given
pub const DEFAULT_REPORT_STEM: &str = "report";

/// `report.<format extension>`
pub fn default_file_name(artifact: &ExportArtifact) -> String {
    format!("{}.{}", DEFAULT_REPORT_STEM, artifact.format.file_extension())
}

/// Where the artifact goes: an explicit file, a file inside a directory, or
/// the default name in the working directory
pub fn resolve_output_path(requested: Option<&Path>, artifact: &ExportArtifact) -> PathBuf {
    match requested {
        Some(path) if path.is_dir() => path.join(default_file_name(artifact)),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(default_file_name(artifact)),
    }
}

/// Write the artifact to `path`, replacing any previous file
pub fn write_artifact(path: &Path, artifact: &ExportArtifact) -> ExportResult<PathBuf> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&directory)?;

    let mut staged = NamedTempFile::new_in(&directory)?;
    staged.write_all(&artifact.bytes)?;
    staged.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o600))?;
    }

    staged
        .persist(path)
        .map_err(|e| ExportError::IoError(e.error))?;

    debug!("Wrote {} bytes to {}", artifact.len(), path.display());
    Ok(path.to_path_buf())
}
