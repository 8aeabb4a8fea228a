//! Artifact store: path preparation, best-effort removal, and the
//! completion footer.
//!
//! Stage metadata lives inside the artifact file itself, not in a side file:
//! a successful stage appends a small JSON footer recording the done flag and
//! the stage fingerprint. Readers that want the stage payload strip the
//! footer back off. Any failure to read the footer is reported as "no
//! completion", so a corrupt or half-written artifact always looks stale.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

/// Trailing magic identifying a completion footer.
const FOOTER_MAGIC: &[u8; 8] = b"ABXMETA1";

/// Fixed trailer size: 8-byte footer length + 8-byte magic.
const TRAILER_LEN: u64 = 16;

/// Completion metadata attached to a stage artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Whether the producing stage finished successfully.
    pub done: bool,
    /// Stage fingerprint, absent for the ingestion stage.
    pub fingerprint: Option<String>,
}

/// Creates every missing ancestor directory for a batch of output paths.
///
/// # Errors
///
/// Returns [`StoreError::DirectoryCreation`] on the first path whose parent
/// cannot be created; this is fatal for the whole task.
pub fn ensure_parent_dirs<P: AsRef<Path>>(paths: &[P]) -> Result<(), StoreError> {
    for path in paths {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                fs::create_dir_all(parent).map_err(|source| StoreError::DirectoryCreation {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
    }
    Ok(())
}

/// Removes a file if it exists. Never errors: a missing file is the desired
/// state, and any other failure is logged and swallowed so it cannot mask the
/// primary error being reported by the caller.
pub fn try_remove(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "could not remove artifact"),
    }
}

/// Appends a completion footer marking the artifact done.
///
/// Must only be called after the producing stage has fully written its
/// payload.
pub fn write_completion(path: &Path, fingerprint: Option<&str>) -> Result<(), StoreError> {
    let completion = Completion {
        done: true,
        fingerprint: fingerprint.map(str::to_string),
    };
    let body = serde_json::to_vec(&completion)?;

    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(&body)?;
    file.write_all(&(body.len() as u64).to_le_bytes())?;
    file.write_all(FOOTER_MAGIC)?;
    file.sync_all()?;
    Ok(())
}

/// Reads the completion footer, if any.
///
/// Returns `None` for a missing file, a file without a footer, or a footer
/// that cannot be parsed. The caller treats all of these as stale.
pub fn read_completion(path: &Path) -> Option<Completion> {
    let (completion, _) = split_footer(path).ok()??;
    Some(completion)
}

/// Reads an artifact's payload with any completion footer stripped.
pub fn read_payload(path: &Path) -> io::Result<Vec<u8>> {
    let mut data = fs::read(path)?;
    if let Ok(Some((_, payload_len))) = split_footer(path) {
        data.truncate(payload_len as usize);
    }
    Ok(data)
}

/// Last-modified time of a path, `None` when it cannot be read.
pub fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Locates and parses the footer. `Ok(None)` means the file exists but has
/// no (valid) footer.
fn split_footer(path: &Path) -> io::Result<Option<(Completion, u64)>> {
    let mut file = fs::File::open(path)?;
    let file_len = file.metadata()?.len();
    if file_len < TRAILER_LEN {
        return Ok(None);
    }

    let mut trailer = [0u8; TRAILER_LEN as usize];
    file.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
    file.read_exact(&mut trailer)?;
    if &trailer[8..16] != FOOTER_MAGIC {
        return Ok(None);
    }

    let body_len = u64::from_le_bytes(trailer[0..8].try_into().expect("8-byte slice"));
    if body_len > file_len - TRAILER_LEN {
        return Ok(None);
    }

    let payload_len = file_len - TRAILER_LEN - body_len;
    let mut body = vec![0u8; body_len as usize];
    file.seek(SeekFrom::Start(payload_len))?;
    file.read_exact(&mut body)?;

    match serde_json::from_slice(&body) {
        Ok(completion) => Ok(Some((completion, payload_len))),
        Err(_) => Ok(None),
    }
}
