//! Read and parse profile documents.

use std::{ffi::OsStr, fs, path::Path};

use tracing::debug;

use crate::{Error, Profile, error::excerpt_at, raw::RawProfile, resolve::resolve};

/// Name given to profiles loaded from text without a `name` field.
const UNNAMED: &str = "profile";

/// Load a fully resolved [`Profile`] from a YAML file at `path`.
///
/// A profile without a `name` field is named after the file stem.
pub fn load_from_path(path: &Path) -> Result<Profile, Error> {
    if !matches!(
        path.extension().and_then(OsStr::to_str),
        Some("yaml" | "yml")
    ) {
        return Err(Error::Read {
            path: Some(path.to_path_buf()),
            message: "Unsupported profile format (expected a .yaml or .yml file)".to_string(),
        });
    }
    let source = fs::read_to_string(path).map_err(|e| Error::Read {
        path: Some(path.to_path_buf()),
        message: e.to_string(),
    })?;
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(UNNAMED);
    debug!(path = %path.display(), "loading_profile");
    parse_and_resolve(&source, stem).map_err(|e| e.with_path(path))
}

/// Load a fully resolved [`Profile`] from YAML text.
pub fn load_from_str(source: &str) -> Result<Profile, Error> {
    parse_and_resolve(source, UNNAMED)
}

fn parse_and_resolve(source: &str, fallback_name: &str) -> Result<Profile, Error> {
    let raw: RawProfile = serde_yaml::from_str(source).map_err(|e| parse_error(source, &e))?;
    resolve(&raw, fallback_name)
}

/// Convert a YAML error into [`Error::Parse`] with an excerpt at its location.
fn parse_error(source: &str, err: &serde_yaml::Error) -> Error {
    let (line, col) = err
        .location()
        .map(|loc| (loc.line(), loc.column()))
        .unwrap_or((1, 1));
    Error::Parse {
        path: None,
        line,
        col,
        message: err.to_string(),
        excerpt: excerpt_at(source, line, col),
    }
}
