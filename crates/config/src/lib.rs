//! Automation profile loading for chorebot.
//!
//! A profile is a YAML document declaring states, reusable handler and
//! operation templates, and the scenes the engine evaluates. Loading parses
//! the document with a strict serde schema, expands templates, compiles every
//! condition and validates references, failing fast with the location of the
//! first problem.

use std::{
    env,
    path::{Path, PathBuf},
};

pub mod error;
mod loader;
mod profile;
mod raw;
mod resolve;

#[cfg(test)]
mod test_load;

pub use error::Error;
pub use loader::{load_from_path, load_from_str};
pub use profile::{HandlerSpec, OpKind, OpSpec, PressWay, Profile, SceneSpec, SwitchDirection};

/// Determine the preferred user profile path (`~/.chorebot/profile.yaml`).
pub fn default_profile_path() -> PathBuf {
    let mut p = PathBuf::from(env::var_os("HOME").unwrap_or_default());
    p.push(".chorebot");
    p.push("profile.yaml");
    p
}

/// Resolve the effective profile path.
///
/// Uses `explicit` when provided, else `~/.chorebot/profile.yaml` when it
/// exists, else returns a "no profile found" error.
pub fn resolve_profile_path(explicit: Option<&Path>) -> Result<PathBuf, Error> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let preferred = default_profile_path();
    if preferred.exists() {
        return Ok(preferred);
    }

    Err(Error::Read {
        path: Some(preferred),
        message: "No profile found. Create ~/.chorebot/profile.yaml or pass a path".to_string(),
    })
}
