//! OIDC settings persisted in a `KEY=VALUE` env file.

use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use accounts_common::{EnvFile, EnvFileError, OidcSettings};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Refusing to write settings: {0}")]
    Invalid(#[from] EnvFileError),
}

/// Parse the env file at `path`. A missing file reads as empty.
pub fn read_env_file(path: &Path) -> Result<EnvFile, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(EnvFile::parse(&contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(EnvFile::new()),
        Err(source) => Err(SettingsError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Effective settings: process environment variables win over the file.
pub fn load_oidc_settings(path: &Path) -> Result<OidcSettings, SettingsError> {
    let env = read_env_file(path)?;
    Ok(OidcSettings::from_lookup(|key| {
        std::env::var(key)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| env.get(key).map(String::from))
    }))
}

/// Merge `settings` into the file at `path` and replace it atomically.
/// Keys other than the eight OIDC keys are kept as they were.
pub fn save_oidc_settings(path: &Path, settings: &OidcSettings) -> Result<(), SettingsError> {
    let mut env = read_env_file(path)?;
    settings.apply_to(&mut env)?;

    let write_err = |source: std::io::Error| SettingsError::Write {
        path: path.display().to_string(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(env.render().as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    tracing::info!("Wrote OIDC settings to {}", path.display());
    Ok(())
}
