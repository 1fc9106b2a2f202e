//! Persisted wallet state.
//!
//! Only the mnemonic, passphrase, last receive index and network are ever
//! stored; everything else is rederived. Persistence is optional: a
//! [`MemoryStore`] behaves identically to a [`FileStore`] for derivation.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bitcoin::Network;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::encryption;
use crate::error::WalletError;

/// Magic identifying a Satchel wallet file.
pub const WALLET_MAGIC: &str = "SATW";

/// Current wallet file format version.
pub const WALLET_VERSION: u32 = 1;

/// The persisted part of a wallet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub mnemonic: String,
    #[serde(default)]
    pub passphrase: String,
    /// Next receive index to hand out.
    #[serde(default)]
    pub receive_index: u32,
    pub network: Network,
}

impl WalletRecord {
    pub fn new(mnemonic: String, passphrase: String, network: Network) -> Self {
        Self {
            mnemonic,
            passphrase,
            receive_index: 0,
            network,
        }
    }
}

impl Drop for WalletRecord {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
        self.passphrase.zeroize();
    }
}

impl fmt::Debug for WalletRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletRecord")
            .field("mnemonic", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .field("receive_index", &self.receive_index)
            .field("network", &self.network)
            .finish()
    }
}

/// Durable storage for a single wallet record.
pub trait WalletStore: Send + Sync {
    /// The stored record, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<WalletRecord>, WalletError>;

    /// Replace the stored record.
    fn save(&self, record: &WalletRecord) -> Result<(), WalletError>;
}

/// In-memory store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<WalletRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalletStore for MemoryStore {
    fn load(&self) -> Result<Option<WalletRecord>, WalletError> {
        Ok(self.record.lock().clone())
    }

    fn save(&self, record: &WalletRecord) -> Result<(), WalletError> {
        *self.record.lock() = Some(record.clone());
        Ok(())
    }
}

/// Unencrypted header preceding the sealed payload.
#[derive(Serialize, Deserialize)]
struct FileHeader {
    magic: String,
    version: u32,
}

/// Password-encrypted wallet file at a fixed path.
///
/// # File format
/// ```text
/// header_len (4 bytes LE) || header_json || encrypted_payload
/// ```
pub struct FileStore {
    path: PathBuf,
    password: Zeroizing<Vec<u8>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, password: &[u8]) -> Self {
        Self {
            path: path.into(),
            password: Zeroizing::new(password.to_vec()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn encode(&self, record: &WalletRecord) -> Result<Vec<u8>, WalletError> {
        let header = serde_json::to_vec(&FileHeader {
            magic: WALLET_MAGIC.to_string(),
            version: WALLET_VERSION,
        })
        .map_err(|e| WalletError::Serialization(e.to_string()))?;
        let payload = Zeroizing::new(
            serde_json::to_vec(record).map_err(|e| WalletError::Serialization(e.to_string()))?,
        );
        let sealed = encryption::encrypt(&payload, &self.password)?;

        let header_len = u32::try_from(header.len())
            .map_err(|_| WalletError::Serialization("header too large".into()))?;
        let mut data = Vec::with_capacity(4 + header.len() + sealed.len());
        data.extend_from_slice(&header_len.to_le_bytes());
        data.extend_from_slice(&header);
        data.extend_from_slice(&sealed);
        Ok(data)
    }

    fn decode(&self, data: &[u8]) -> Result<WalletRecord, WalletError> {
        let (len_bytes, rest) = data
            .split_first_chunk::<4>()
            .ok_or_else(|| WalletError::CorruptedFile("file too short".into()))?;
        let header_len = u32::from_le_bytes(*len_bytes) as usize;
        if rest.len() < header_len {
            return Err(WalletError::CorruptedFile("header truncated".into()));
        }
        let (header, sealed) = rest.split_at(header_len);
        let header: FileHeader = serde_json::from_slice(header)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid header: {e}")))?;
        if header.magic != WALLET_MAGIC {
            return Err(WalletError::CorruptedFile("invalid magic".into()));
        }
        if header.version != WALLET_VERSION {
            return Err(WalletError::CorruptedFile(format!(
                "unsupported version: {}",
                header.version
            )));
        }

        let payload = encryption::decrypt(sealed, &self.password)?;
        serde_json::from_slice(&payload)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid payload: {e}")))
    }
}

impl WalletStore for FileStore {
    fn load(&self) -> Result<Option<WalletRecord>, WalletError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).map_err(|e| WalletError::IoError(e.to_string()))?;
        self.decode(&data).map(Some)
    }

    fn save(&self, record: &WalletRecord) -> Result<(), WalletError> {
        let data = self.encode(record)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WalletError::IoError(e.to_string()))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &data).map_err(|e| WalletError::IoError(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| WalletError::IoError(e.to_string()))?;
        debug!(path = %self.path.display(), "wallet saved");
        Ok(())
    }
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
