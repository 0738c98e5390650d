//! Atomic file replacement.
//!
//! Table files are always rewritten whole. The new content goes to a temp file
//! next to the target, is flushed to disk, and is then renamed over the
//! original, so a failed write never leaves the old file truncated.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Generate a temp path for atomic writes.
/// Format: {dir}/.tmp.{random}.{filename}
pub fn temp_path(final_path: &Path) -> PathBuf {
    let filename = final_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let random: u64 = rand::random();
    let temp_name = format!(".tmp.{:016x}.{}", random, filename);
    final_path.with_file_name(temp_name)
}

/// Replace `final_path` with `content`.
///
/// On any error the temp file is removed and the previous file, if any, is
/// left untouched.
pub fn replace_file(final_path: &Path, content: &[u8]) -> io::Result<()> {
    let temp = temp_path(final_path);

    if let Err(e) = write_synced(&temp, content) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    fs::rename(&temp, final_path).inspect_err(|_| {
        let _ = fs::remove_file(&temp);
    })
}

fn write_synced(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}
