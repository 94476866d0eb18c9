//! Bearer credential storage injected into the API client.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::RwLock,
};

pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Option<String>;
    fn store(&self, token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

#[derive(Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialProvider for MemoryCredentials {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn store(&self, token: &str) -> io::Result<()> {
        let mut guard = self
            .token
            .write()
            .map_err(|_| io::Error::other("credential lock poisoned"))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        let mut guard = self
            .token
            .write()
            .map_err(|_| io::Error::other("credential lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

/// Keeps the token in a single file so separate CLI invocations share a session.
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for FileCredentials {
    fn token(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    fn store(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, token)
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
