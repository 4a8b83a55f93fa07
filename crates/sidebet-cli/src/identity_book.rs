//! The identity book: handles, their addresses, and the keys minted for
//! them, kept on disk between runs.
//!
//! The file holds private keys in the clear. It is written owner-only on
//! Unix.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sidebet_engine::{IdentityResolver, InMemoryIdentities};
use sidebet_ledger::LocalKeys;
use sidebet_types::{Address, UserHandle};

#[derive(Debug, Default, Serialize, Deserialize)]
struct BookFile {
    identities: BTreeMap<String, Address>,
    /// Hex secrets of the keys minted for book entries.
    #[serde(default)]
    keys: Vec<String>,
}

/// Identities from `path`. A missing file is an empty book.
pub fn load(path: &Path) -> Result<InMemoryIdentities> {
    let keys = Arc::new(LocalKeys::new());
    let identities = InMemoryIdentities::with_keys(Arc::clone(&keys));
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No identity book yet");
        return Ok(identities);
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading identity book {}", path.display()))?;
    let book: BookFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing identity book {}", path.display()))?;
    for secret in &book.keys {
        keys.import(secret).context("identity book holds an invalid key")?;
    }
    for (handle, address) in book.identities {
        identities
            .associate(&UserHandle::new(handle), address)
            .context("identity book is inconsistent")?;
    }
    tracing::debug!(
        path = %path.display(),
        identities = identities.entries().len(),
        keys = keys.len(),
        "Identity book loaded"
    );
    Ok(identities)
}

/// Write every identity, and the key behind each minted one, to `path`.
pub fn save(path: &Path, identities: &InMemoryIdentities) -> Result<()> {
    let mut book = BookFile::default();
    for (handle, address) in identities.entries() {
        if let Some(secret) = identities.keys().export(&address) {
            book.keys.push(secret);
        }
        book.identities.insert(handle.as_str().to_string(), address);
    }
    book.keys.sort();

    let json = serde_json::to_string_pretty(&book).context("rendering identity book")?;
    let staging = path.with_extension("tmp");
    write_private(&staging, json.as_bytes())
        .with_context(|| format!("writing {}", staging.display()))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("replacing identity book {}", path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}
