use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const TOKEN_STORE_FILE_NAME: &str = "credentials.json";
pub const TOKEN_KEY: &str = "token";

const TOKEN_STORE_VERSION: u32 = 1;

pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn token(&self) -> Option<String> {
        None
    }
}

/// Persistent key-value store for credentials, one JSON file in the config
/// dir. Values are written with private permissions.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenStorePayload {
    version: u32,
    entries: BTreeMap<String, String>,
}

impl TokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                entries: BTreeMap::new(),
            });
        }

        let text = std::fs::read_to_string(&path)?;
        let payload: TokenStorePayload = serde_json::from_str(&text).map_err(|e| Error::Parse {
            message: format!("invalid credential store: {e}"),
        })?;
        if payload.version != TOKEN_STORE_VERSION {
            return Err(Error::InvalidConfig {
                message: format!(
                    "unsupported credential store version: {}",
                    payload.version
                ),
            });
        }

        Ok(Self {
            path,
            entries: payload.entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn save(&self) -> Result<()> {
        let payload = TokenStorePayload {
            version: TOKEN_STORE_VERSION,
            entries: self.entries.clone(),
        };
        let text = serde_json::to_string_pretty(&payload).map_err(|e| Error::InvalidConfig {
            message: format!("credential store encode failed: {e}"),
        })?;
        write_atomic_private(&self.path, text.as_bytes())?;
        Ok(())
    }
}

impl CredentialProvider for TokenStore {
    fn token(&self) -> Option<String> {
        self.get(TOKEN_KEY).map(|s| s.to_string())
    }
}

fn write_atomic_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let tmp = path.with_extension("tmp");

    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        std::fs::rename(&tmp, path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn ensure_private_dir(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(path)?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(path)?;
        Ok(())
    }
}
