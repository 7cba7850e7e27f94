//! `.ops` sidecar files that persist an image's applied history.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec;
use crate::error::Result;
use crate::ops::Operation;

pub const SIDECAR_SUFFIX: &str = ".ops";

/// `photo.png` -> `photo.png.ops`
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    let mut raw: OsString = image_path.as_os_str().to_owned();
    raw.push(SIDECAR_SUFFIX);
    PathBuf::from(raw)
}

/// Best-effort read. A missing, unreadable or corrupt sidecar means "no history".
pub fn read_history(image_path: &Path) -> Vec<Operation> {
    let path = sidecar_path(image_path);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("no sidecar at {}", path.display());
            return Vec::new();
        }
        Err(err) => {
            warn!("ignoring unreadable sidecar {}: {err}", path.display());
            return Vec::new();
        }
    };

    match codec::try_decode(&raw) {
        Ok(ops) => {
            debug!("restored {} operation(s) from {}", ops.len(), path.display());
            ops
        }
        Err(err) => {
            warn!("ignoring corrupt sidecar {}: {err}", path.display());
            Vec::new()
        }
    }
}

pub fn write_history(image_path: &Path, ops: &[Operation]) -> Result<()> {
    let path = sidecar_path(image_path);
    write_atomically(&path, codec::encode(ops).as_bytes())?;
    debug!("wrote {} operation(s) to {}", ops.len(), path.display());
    Ok(())
}

/// Write to a sibling temp file, then rename over `path`, so a failed write
/// never leaves a truncated file behind.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    if let Err(err) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        err
    })
}

pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".tmp");
    PathBuf::from(raw)
}
