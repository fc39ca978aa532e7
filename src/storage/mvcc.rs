use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    storage::{
        engine::Engine,
        keycode::{deserialize_key, serialize_key},
    },
};

/// Transaction version number type
pub type Version = u64;

/// MVCC storage with optimistic transactions
///
/// Writes are buffered in the transaction and only reach the engine at commit,
/// after the read and write sets have been validated against every version
/// committed since the transaction's snapshot was taken.
pub struct Mvcc<E: Engine> {
    engine: Arc<Mutex<E>>,
}

impl<E: Engine> Clone for Mvcc<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<E: Engine> Mvcc<E> {
    pub fn new(eng: E) -> Self {
        Self {
            engine: Arc::new(Mutex::new(eng)),
        }
    }

    pub fn begin(&self) -> Result<MvccTransaction<E>> {
        MvccTransaction::begin(self.engine.clone())
    }
}

/// Snapshot used for MVCC visibility checks
#[derive(Debug, Clone)]
pub struct TransactionState {
    pub version: Version,
    pub active_versions: HashSet<Version>,
}

impl TransactionState {
    fn is_visible(&self, version: Version) -> bool {
        if self.active_versions.contains(&version) {
            return false;
        }
        version <= self.version
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum MvccKey {
    NextVersion,
    TxnActive(Version),
    Version(#[serde(with = "serde_bytes")] Vec<u8>, Version),
}

impl MvccKey {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        deserialize_key(data)
    }
}

/// Prefixes for scanning MVCC keys
///
/// Variant order must match `MvccKey`, since keycode writes the variant index
/// as the first byte.
#[derive(Debug, Serialize, Deserialize)]
pub enum MvccKeyPrefix {
    NextVersion,
    TxnActive,
    Version(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl MvccKeyPrefix {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(self)
    }
}

/// Buffered writes at a point in time, restored when a batch fails
#[derive(Debug, Clone)]
pub struct Checkpoint {
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

/// MVCC transaction
pub struct MvccTransaction<E: Engine> {
    engine: Arc<Mutex<E>>,
    state: TransactionState,
    reads: BTreeSet<Vec<u8>>,
    read_prefixes: BTreeSet<Vec<u8>>,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<E: Engine> MvccTransaction<E> {
    /// Begins a new transaction
    pub fn begin(eng: Arc<Mutex<E>>) -> Result<Self> {
        let mut engine = eng.lock()?;

        let next_version = match engine.get(&MvccKey::NextVersion.encode()?)? {
            Some(value) => bincode::deserialize(&value)?,
            None => 1,
        };

        engine.set(
            MvccKey::NextVersion.encode()?,
            bincode::serialize(&(next_version + 1))?,
        )?;

        let active_versions = Self::scan_active(&mut engine)?;

        engine.set(MvccKey::TxnActive(next_version).encode()?, vec![])?;
        drop(engine);

        Ok(Self {
            engine: eng,
            state: TransactionState {
                version: next_version,
                active_versions,
            },
            reads: BTreeSet::new(),
            read_prefixes: BTreeSet::new(),
            writes: BTreeMap::new(),
        })
    }

    pub fn version(&self) -> Version {
        self.state.version
    }

    /// Validates the read and write sets, then applies the buffered writes
    ///
    /// Fails with `ConflictAborted` if any key this transaction read or wrote
    /// has a version committed after the snapshot. Either way the transaction
    /// is no longer active afterwards.
    pub fn commit(self) -> Result<()> {
        let mut engine = self.engine.lock()?;

        if let Err(err) = self.validate(&mut engine) {
            engine.delete(&MvccKey::TxnActive(self.state.version).encode()?)?;
            return Err(err);
        }

        for (key, value) in self.writes.iter() {
            engine.set(
                MvccKey::Version(key.clone(), self.state.version).encode()?,
                bincode::serialize(value)?,
            )?;
        }

        engine.delete(&MvccKey::TxnActive(self.state.version).encode()?)
    }

    /// Rolls back the transaction, nothing was written so only the marker goes
    pub fn rollback(self) -> Result<()> {
        let mut engine = self.engine.lock()?;
        engine.delete(&MvccKey::TxnActive(self.state.version).encode()?)
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.writes.insert(key, None);
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            writes: self.writes.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.writes = checkpoint.writes;
    }

    /// Gets the value for a key, seeing this transaction's own writes first
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(value.clone());
        }
        self.reads.insert(key.to_vec());

        let mut engine = self.engine.lock()?;
        let from = MvccKey::Version(key.to_vec(), 0).encode()?;
        let to = MvccKey::Version(key.to_vec(), self.state.version).encode()?;
        let mut iter = engine.scan(from..=to).rev();

        while let Some((key, value)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::Version(_, version) => {
                    if self.state.is_visible(version) {
                        return Ok(bincode::deserialize(&value)?);
                    }
                }
                other => return Err(unexpected_key(other)),
            }
        }
        Ok(None)
    }

    /// Scans keys with prefix, returning the latest visible value per key
    pub fn scan_prefix(&mut self, prefix: &[u8]) -> Result<Vec<ScanResult>> {
        self.read_prefixes.insert(prefix.to_vec());

        let mut results = BTreeMap::new();
        {
            let mut eng = self.engine.lock()?;
            let mut iter = eng.scan_prefix(Self::version_prefix(prefix)?);
            while let Some((key, value)) = iter.next().transpose()? {
                match MvccKey::decode(&key)? {
                    MvccKey::Version(raw_key, version) => {
                        if self.state.is_visible(version) {
                            match bincode::deserialize::<Option<Vec<u8>>>(&value)? {
                                Some(raw_value) => results.insert(raw_key, raw_value),
                                None => results.remove(&raw_key),
                            };
                        }
                    }
                    other => return Err(unexpected_key(other)),
                }
            }
        }

        for (key, value) in self.writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => results.insert(key.clone(), value.clone()),
                None => results.remove(key),
            };
        }

        Ok(results
            .into_iter()
            .map(|(key, value)| ScanResult { key, value })
            .collect())
    }

    /// Encoded prefix of every stored version of keys starting with `prefix`
    fn version_prefix(prefix: &[u8]) -> Result<Vec<u8>> {
        let mut enc_prefix = MvccKeyPrefix::Version(prefix.to_vec()).encode()?;
        // drop the 0x00 0x00 terminator so longer keys still match
        enc_prefix.truncate(enc_prefix.len() - 2);
        Ok(enc_prefix)
    }

    fn validate(&self, engine: &mut MutexGuard<E>) -> Result<()> {
        for key in self.reads.iter().chain(self.writes.keys()) {
            let from = MvccKey::Version(key.clone(), 0).encode()?;
            let to = MvccKey::Version(key.clone(), u64::MAX).encode()?;
            if let Some((k, _)) = engine.scan(from..=to).next_back().transpose()? {
                self.check_visible(&k)?;
            }
        }

        for prefix in self.read_prefixes.iter() {
            let mut iter = engine.scan_prefix(Self::version_prefix(prefix)?);
            while let Some((k, _)) = iter.next().transpose()? {
                self.check_visible(&k)?;
            }
        }
        Ok(())
    }

    fn check_visible(&self, key: &[u8]) -> Result<()> {
        match MvccKey::decode(key)? {
            MvccKey::Version(_, version) if !self.state.is_visible(version) => {
                Err(Error::ConflictAborted)
            }
            MvccKey::Version(..) => Ok(()),
            other => Err(unexpected_key(other)),
        }
    }

    fn scan_active(engine: &mut MutexGuard<E>) -> Result<HashSet<Version>> {
        let mut active_versions = HashSet::new();
        let mut iter = engine.scan_prefix(MvccKeyPrefix::TxnActive.encode()?);

        while let Some((key, _)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::TxnActive(version) => {
                    active_versions.insert(version);
                }
                other => return Err(unexpected_key(other)),
            }
        }
        Ok(active_versions)
    }
}

fn unexpected_key(key: MvccKey) -> Error {
    Error::Internal(format!("unexpected key: {:?}", key))
}

/// Scan result containing key-value pair
#[derive(Debug, PartialEq)]
pub struct ScanResult {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}
