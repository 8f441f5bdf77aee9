//! Persistent, named response stores.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/<hex(store name)>/<key>.json   request identity + status + headers
//! <root>/<hex(store name)>/<key>.body   response body
//! ```
//!
//! The metadata file is written last, so an entry only becomes visible once
//! its body is complete.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::request::{Request, RequestIdentity, Response, ResponseType};

/// All named stores under one root directory.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    /// Does not create the directory; stores are created on first `open()`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Default: ~/.cache/pwa-camera/stores/
    ///
    /// `None` when the platform has no user cache directory.
    pub fn with_default_dir() -> Option<Self> {
        let root = dirs::cache_dir()?.join("pwa-camera").join("stores");
        Some(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }

    /// Open a store, creating it if needed.
    pub async fn open(&self, name: &str) -> io::Result<CacheStore> {
        let dir = self.store_dir(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(CacheStore {
            name: name.to_string(),
            dir,
        })
    }

    pub async fn has(&self, name: &str) -> bool {
        tokio::fs::metadata(self.store_dir(name))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Names of every existing store, sorted.
    pub async fn keys(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let decoded = entry
                .file_name()
                .to_str()
                .and_then(|s| hex::decode(s).ok())
                .and_then(|b| String::from_utf8(b).ok());
            match decoded {
                Some(name) => names.push(name),
                None => log::debug!("Ignoring foreign directory {:?}", entry.path()),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Delete a store and all its entries. Returns false if it did not exist.
    pub async fn delete(&self, name: &str) -> io::Result<bool> {
        match tokio::fs::remove_dir_all(self.store_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Metadata persisted next to each body.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    identity: RequestIdentity,
    status: u16,
    headers: Vec<(String, String)>,
    response_type: ResponseType,
}

/// One named store mapping request identities to responses.
#[derive(Debug, Clone)]
pub struct CacheStore {
    name: String,
    dir: PathBuf,
}

impl CacheStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.body", key))
    }

    /// Look up the stored response for `request`.
    pub async fn match_request(&self, request: &Request) -> io::Result<Option<Response>> {
        let identity = request.identity();
        let key = identity.key();

        let meta = match tokio::fs::read(self.meta_path(&key)).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let entry: StoredEntry = serde_json::from_slice(&meta)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if entry.identity != identity {
            // Hash prefix collision
            return Ok(None);
        }

        let body = match tokio::fs::read(self.body_path(&key)).await {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(Response {
            status: entry.status,
            headers: entry.headers,
            body: body.into(),
            response_type: entry.response_type,
        }))
    }

    /// Store `response` under the identity of `request`, replacing any previous entry.
    pub async fn put(&self, request: &Request, response: Response) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let identity = request.identity();
        let key = identity.key();
        let entry = StoredEntry {
            identity,
            status: response.status,
            headers: response.headers,
            response_type: response.response_type,
        };
        let meta = serde_json::to_vec_pretty(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        write_atomic(&self.body_path(&key), &response.body).await?;
        write_atomic(&self.meta_path(&key), &meta).await
    }

    /// Remove the entry for `request`. Returns true if one existed.
    pub async fn delete(&self, request: &Request) -> io::Result<bool> {
        let key = request.identity().key();
        let removed = match tokio::fs::remove_file(self.meta_path(&key)).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e),
        };
        match tokio::fs::remove_file(self.body_path(&key)).await {
            Ok(()) => Ok(removed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(removed),
            Err(e) => Err(e),
        }
    }

    /// Identities of every stored entry, sorted.
    pub async fn keys(&self) -> io::Result<Vec<RequestIdentity>> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let meta = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<StoredEntry>(&meta) {
                Ok(stored) => keys.push(stored.identity),
                Err(e) => log::warn!("Skipping unreadable entry {:?}: {}", path, e),
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Number of stored entries.
    pub async fn len(&self) -> io::Result<usize> {
        Ok(self.keys().await?.len())
    }

    pub async fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len().await? == 0)
    }
}

static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

/// Write to a temporary sibling, then rename over the target.
async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!(
        "{}.{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        NEXT_TMP.fetch_add(1, Ordering::Relaxed)
    ));
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}
