//! # Contract Registry: Admitted Contract Index
//!
//! Import resolution asks one question of the registry: does a contract with
//! this bare name exist? [`ContractRegistry`] is that query. Three backings:
//!
//! - [`MemoryRegistry`]: a name set, for tests and `--allow` overrides.
//! - [`ContractStore`]: the owned, mutable index written by the driver when a
//!   contract is admitted. Serialized with `rkyv`.
//! - [`MappedStore`]: a read-only `mmap` view over a saved store, validated once
//!   on open and searched zero-copy.

use crate::policy::{PolicyError, PolicyTables};
use memmap2::Mmap;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    DeserializeError(String),
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("Invalid contract name: {0:?}")]
    InvalidName(String),
}

/// Read-only membership query consulted for `import` resolution.
pub trait ContractRegistry {
    /// Returns `Ok(true)` if a contract named `name` has been registered.
    fn exists(&self, name: &str) -> Result<bool, RegistryError>;
}

impl<T: ContractRegistry + ?Sized> ContractRegistry for &T {
    fn exists(&self, name: &str) -> Result<bool, RegistryError> {
        (**self).exists(name)
    }
}

/// BLAKE3 digest of contract source.
///
/// # Examples
/// ```
/// # use common::registry::source_hash;
/// assert_eq!(source_hash(b"a = 1"), source_hash(b"a = 1"));
/// assert_ne!(source_hash(b"a = 1"), source_hash(b"a = 2"));
/// ```
pub fn source_hash(source: &[u8]) -> [u8; 32] {
    *blake3::hash(source).as_bytes()
}

/// In-memory name set.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    names: BTreeSet<String>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for MemoryRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl ContractRegistry for MemoryRegistry {
    fn exists(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.names.contains(name))
    }
}

/// Single admitted contract.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Deserialize, Serialize)]
#[rkyv(derive(Debug))]
pub struct ContractEntry {
    /// Bare module name used by `import <name>`.
    pub name: String,
    /// Import root the contract was registered under.
    pub root: String,
    /// BLAKE3 of the admitted source.
    pub source_hash: [u8; 32],
    /// Unix seconds at registration.
    pub registered_at: u64,
}

impl ContractEntry {
    /// Hex form of [`ContractEntry::source_hash`].
    pub fn source_hex(&self) -> String {
        blake3::Hash::from(self.source_hash).to_hex().to_string()
    }
}

/// Owned contract index, serializable to disk. Entries stay sorted by name.
#[derive(Debug, Clone, Default, Archive, Deserialize, Serialize)]
#[rkyv(derive(Debug))]
pub struct ContractStore {
    pub entries: Vec<ContractEntry>,
}

impl ContractStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records an admitted contract under `root`, replacing any entry with the
    /// same name.
    ///
    /// # Errors
    /// - `Policy` if `root` is not a permitted import root.
    /// - `InvalidName` if `name` is not a bare identifier, or starts with `_`
    ///   (an import binding it could never be admitted).
    pub fn register(
        &mut self,
        policy: &PolicyTables,
        name: &str,
        root: &str,
        source: &[u8],
    ) -> Result<&ContractEntry, RegistryError> {
        let root = policy.import_root(root)?;
        if !is_contract_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let registered_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let idx = self.insert(ContractEntry {
            name: name.to_string(),
            root: root.as_str().to_string(),
            source_hash: source_hash(source),
            registered_at,
        });
        tracing::info!(contract = name, root = %root, "contract registered");
        Ok(&self.entries[idx])
    }

    /// Inserts an entry in name order and returns its index.
    pub fn insert(&mut self, entry: ContractEntry) -> usize {
        match self
            .entries
            .binary_search_by(|e| e.name.as_str().cmp(&entry.name))
        {
            Ok(idx) => {
                self.entries[idx] = entry;
                idx
            }
            Err(idx) => {
                self.entries.insert(idx, entry);
                idx
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ContractEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Returns the number of contracts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorts entries by name and serializes the store using `rkyv`.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, RegistryError> {
        self.entries.sort_by(|a, b| a.name.cmp(&b.name));
        let aligned = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| RegistryError::DeserializeError(e.to_string()))?;
        Ok(aligned.to_vec())
    }

    /// Saves the store to a file (sorts by name before writing).
    pub fn save(&mut self, path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = self.to_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Loads a saved store into memory. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(&bytes);
        rkyv::from_bytes::<ContractStore, rkyv::rancor::Error>(&aligned)
            .map_err(|e| RegistryError::DeserializeError(e.to_string()))
    }
}

impl ContractRegistry for ContractStore {
    fn exists(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.get(name).is_some())
    }
}

/// Memory-mapped read-only store handle.
pub struct MappedStore {
    _mmap: Mmap,
}

impl MappedStore {
    /// Opens a saved store via mmap.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        // Validate the archive
        rkyv::access::<ArchivedContractStore, rkyv::rancor::Error>(&mmap)
            .map_err(|e| RegistryError::DeserializeError(e.to_string()))?;

        Ok(Self { _mmap: mmap })
    }

    /// Returns a reference to the archived store (zero-copy).
    pub fn archived(&self) -> &ArchivedContractStore {
        // SAFETY: We validated the archive in `open()` via rkyv::access.
        // The mmap is held for the lifetime of self, so the reference is valid.
        unsafe { rkyv::access_unchecked::<ArchivedContractStore>(&self._mmap[..]) }
    }

    /// Finds an entry by name (binary search; requires sorted store).
    pub fn find(&self, name: &str) -> Option<&ArchivedContractEntry> {
        let entries = &self.archived().entries;
        let idx = entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()?;
        Some(&entries[idx])
    }

    /// Returns the number of contracts.
    pub fn len(&self) -> usize {
        self.archived().entries.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.archived().entries.is_empty()
    }
}

impl ContractRegistry for MappedStore {
    fn exists(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.find(name).is_some())
    }
}

fn is_contract_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
