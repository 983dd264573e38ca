//! Load-once RSA key pairs indexed by key id.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Maximum size of a single key file.
const MAX_KEY_FILE_BYTES: u64 = 1024 * 1024;

const PRIVATE_KEY_FILE: &str = "private.pem";
const PUBLIC_KEY_FILE: &str = "public.pem";

/// Error type for key store operations.
#[derive(Debug)]
pub enum KeyStoreError {
    /// The key directory tree could not be walked.
    Walk { path: PathBuf, source: io::Error },
    /// A key file could not be read.
    Read { path: PathBuf, source: io::Error },
    /// No key pair is registered under the kid.
    KeyNotFound(String),
}

impl fmt::Display for KeyStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Walk { path, source } => {
                write!(f, "walking key directory {}: {}", path.display(), source)
            }
            Self::Read { path, source } => {
                write!(f, "reading key file {}: {}", path.display(), source)
            }
            Self::KeyNotFound(kid) => write!(f, "kid lookup failed: {}", kid),
        }
    }
}

impl std::error::Error for KeyStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Walk { source, .. } | Self::Read { source, .. } => Some(source),
            Self::KeyNotFound(_) => None,
        }
    }
}

/// Source of PEM encoded keys by kid.
pub trait KeyLookup: Send + Sync {
    fn private_key(&self, kid: &str) -> Result<&str, KeyStoreError>;
    fn public_key(&self, kid: &str) -> Result<&str, KeyStoreError>;
}

/// An RSA key pair. A half missing on disk is kept as an empty PEM.
#[derive(Debug, Clone, Default)]
pub struct KeyPair {
    kid: String,
    private_pem: String,
    public_pem: String,
}

impl KeyPair {
    /// Key id, taken from the directory the pair was loaded from.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn private_pem(&self) -> &str {
        &self.private_pem
    }

    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }
}

/// Immutable kid -> key pair map.
///
/// Populated once by [`KeyStore::load`]; there is no way to insert or evict
/// afterwards, so a single instance is shared across requests behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    store: HashMap<String, KeyPair>,
}

impl KeyStore {
    /// Load every `<root>/<kid>/{private,public}.pem` pair.
    ///
    /// Non-directory entries under `root`, files with other names and anything
    /// nested deeper are ignored.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, KeyStoreError> {
        let root = root.as_ref();
        let walk_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| KeyStoreError::Walk { path, source }
        };

        let mut store = HashMap::new();
        for entry in fs::read_dir(root).map_err(walk_err(root))? {
            let entry = entry.map_err(walk_err(root))?;
            let dir = entry.path();
            if !entry.file_type().map_err(walk_err(&dir))?.is_dir() {
                continue;
            }
            let Some(kid) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %dir.display(), "skipping key directory with non UTF-8 name");
                continue;
            };

            let mut pair = KeyPair {
                kid: kid.clone(),
                ..KeyPair::default()
            };
            for file in fs::read_dir(&dir).map_err(walk_err(&dir))? {
                let file = file.map_err(walk_err(&dir))?;
                let path = file.path();
                if !file.file_type().map_err(walk_err(&path))?.is_file() {
                    continue;
                }
                match file.file_name().to_str() {
                    Some(PRIVATE_KEY_FILE) => pair.private_pem = read_pem(&path)?,
                    Some(PUBLIC_KEY_FILE) => pair.public_pem = read_pem(&path)?,
                    _ => {}
                }
            }

            if pair.private_pem.is_empty() || pair.public_pem.is_empty() {
                tracing::warn!(kid = %kid, "key pair is incomplete");
            }
            store.insert(kid, pair);
        }

        tracing::debug!(root = %root.display(), keys = store.len(), "key store loaded");
        Ok(Self { store })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.store.keys().map(String::as_str)
    }

    pub fn get(&self, kid: &str) -> Result<&KeyPair, KeyStoreError> {
        self.store
            .get(kid)
            .ok_or_else(|| KeyStoreError::KeyNotFound(kid.to_string()))
    }
}

impl KeyLookup for KeyStore {
    fn private_key(&self, kid: &str) -> Result<&str, KeyStoreError> {
        self.get(kid).map(KeyPair::private_pem)
    }

    fn public_key(&self, kid: &str) -> Result<&str, KeyStoreError> {
        self.get(kid).map(KeyPair::public_pem)
    }
}

fn read_pem(path: &Path) -> Result<String, KeyStoreError> {
    let read_err = |source| KeyStoreError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut pem = String::new();
    fs::File::open(path)
        .map_err(read_err)?
        .take(MAX_KEY_FILE_BYTES)
        .read_to_string(&mut pem)
        .map_err(read_err)?;
    Ok(pem)
}
