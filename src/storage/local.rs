//! Filesystem-backed object store.

use super::{DEFAULT_COMPOSE_FAN_IN, ObjectStore, StorageResult};
use crate::error::StorageError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Object store that keeps each object as a file under `root`
///
/// Object names map to relative paths (`a/b/c.csv` → `{root}/a/b/c.csv`).
/// Writes go through a temporary file and a rename so readers never observe
/// a half-written object.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
    public_base_url: Option<String>,
    signing_secret: String,
}

impl LocalStore {
    /// Store rooted at `root`
    ///
    /// Signed URLs are `file://` URLs until [`with_public_base_url`](Self::with_public_base_url)
    /// is set.
    pub fn new(root: impl Into<PathBuf>, signing_secret: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: None,
            signing_secret: signing_secret.into(),
        }
    }

    /// Base URL under which `root` is served (e.g. by a static file server)
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into());
        self
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hex SHA-256 signature binding `path` to its expiry timestamp
    pub fn sign(&self, path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Check a signature produced by [`sign`](Self::sign) against the current time
    pub fn verify(&self, path: &str, expires: i64, signature: &str, now: i64) -> bool {
        now <= expires && self.sign(path, expires) == signature
    }

    fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(name);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !safe {
            return Err(StorageError::Backend {
                path: name.to_string(),
                reason: "object names must be relative paths without '..'".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn backend(path: &str, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Backend {
                path: path.to_string(),
                reason: e.to_string(),
            }
        }
    }

    async fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let target = self.resolve(name)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::backend(name, e))?;
        }

        let mut tmp = target.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Self::backend(name, e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| Self::backend(name, e))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()> {
        self.write_atomic(path, &bytes).await
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let file = self.resolve(path)?;
        tokio::fs::read(&file)
            .await
            .map_err(|e| Self::backend(path, e))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let file = self.resolve(path)?;
        match tokio::fs::metadata(&file).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::backend(path, e)),
        }
    }

    async fn compose(&self, sources: &[String], dest: &str) -> StorageResult<()> {
        if sources.len() > DEFAULT_COMPOSE_FAN_IN {
            return Err(StorageError::FanInExceeded {
                count: sources.len(),
                limit: DEFAULT_COMPOSE_FAN_IN,
            });
        }

        let mut combined = Vec::new();
        for source in sources {
            combined.extend(self.get(source).await?);
        }
        self.write_atomic(dest, &combined).await
    }

    async fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        // Walk from the deepest directory fully named by the prefix
        let dir_part = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir_part)?
        };

        let mut names = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Self::backend(prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::backend(prefix, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Self::backend(prefix, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.starts_with(prefix) && !name.ends_with(".tmp") {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> StorageResult<String> {
        if !self.exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let expires = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.sign(path, expires);
        let base = match &self.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("file://{}", self.root.display()),
        };

        let mut url = url::Url::parse(&format!("{}/{}", base, path)).map_err(|e| {
            StorageError::Backend {
                path: path.to_string(),
                reason: format!("invalid signed URL base: {}", e),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    fn name(&self) -> &str {
        "local"
    }
}
