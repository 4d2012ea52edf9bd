//! Report files of a verification run.
//!
//! Two files per run, both pretty-printed JSON:
//! - `<module>.obligations.json`: the ordered array of obligation results
//! - `<module>.trust.json`: the trust summary

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{VerificationRun, VerifyError};

/// Writes both report files into `dir`, creating it if needed. Returns the
/// paths written.
pub fn write_reports(dir: &Path, run: &VerificationRun) -> Result<[PathBuf; 2], VerifyError> {
    fs::create_dir_all(dir).map_err(|source| VerifyError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let module = &run.trust.module;
    let obligations = dir.join(format!("{module}.obligations.json"));
    let trust = dir.join(format!("{module}.trust.json"));
    write_json(&obligations, &run.results)?;
    write_json(&trust, &run.trust)?;
    tracing::debug!(obligations = %obligations.display(), trust = %trust.display(), "reports written");
    Ok([obligations, trust])
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), VerifyError> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(path, text).map_err(|source| VerifyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
