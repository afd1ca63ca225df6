//! Persisted settings store
//!
//! A single binary file next to the executable: the magic bytes `DRTD`
//! followed by `key\0 <u16 little-endian size> <size bytes>` records.
//! Readers tolerate unknown keys and size mismatches by falling back to
//! the caller's default; the file is written only on clean shutdown.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use log::{debug, info, warn};

use crate::errors::StoreError;
use crate::util::lock;

const MAGIC: [u8; 4] = *b"DRTD";
const FILE_NAME: &str = ".drtd";

/// Values that can live in the store as fixed-size little-endian records.
pub trait StoreValue: Sized {
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Option<Self>;
}

macro_rules! impl_store_value {
    ($($ty:ty),*) => {
        $(impl StoreValue for $ty {
            fn to_bytes(&self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }

            fn from_bytes(bytes: &[u8]) -> Option<Self> {
                Some(<$ty>::from_le_bytes(bytes.try_into().ok()?))
            }
        })*
    };
}

impl_store_value!(u8, u16, u32, i32, f32);

impl StoreValue for bool {
    fn to_bytes(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [value] => Some(*value != 0),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Store {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Vec<u8>>,
}

impl Store {
    /// Derive the store path from the executable location and read the
    /// file if it exists. A wrong magic is fatal per the error contract.
    pub fn open(executable: &Path) -> Result<Self, StoreError> {
        let path = executable.with_file_name(FILE_NAME);
        let mut store = Self {
            path: Some(path.clone()),
            entries: BTreeMap::new(),
        };

        let mut file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!("no settings file at {}", path.display());
                return Ok(store);
            }
            Err(error) => return Err(error.into()),
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        if contents.len() < MAGIC.len() || contents[..MAGIC.len()] != MAGIC {
            return Err(StoreError::BadMagic);
        }

        let mut cursor = MAGIC.len();
        while cursor < contents.len() {
            let Some(key_end) = contents[cursor..].iter().position(|&b| b == 0) else {
                break;
            };
            let key = String::from_utf8_lossy(&contents[cursor..cursor + key_end]).into_owned();
            cursor += key_end + 1;

            if cursor + 2 > contents.len() {
                break;
            }
            let size = u16::from_le_bytes([contents[cursor], contents[cursor + 1]]) as usize;
            cursor += 2;

            if cursor + size > contents.len() {
                warn!("settings record \"{key}\" is truncated, stopping");
                break;
            }
            debug!("loaded setting \"{key}\" ({size} bytes)");
            store
                .entries
                .insert(key, contents[cursor..cursor + size].to_vec());
            cursor += size;
        }

        Ok(store)
    }

    pub fn get<T: StoreValue>(&self, key: &str, default: T) -> T {
        match self.entries.get(key) {
            Some(bytes) => T::from_bytes(bytes).unwrap_or_else(|| {
                warn!("setting \"{key}\" has unexpected size, using default");
                default
            }),
            None => default,
        }
    }

    pub fn set<T: StoreValue>(&mut self, key: &str, value: T) {
        self.entries.insert(key.to_string(), value.to_bytes());
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut contents = MAGIC.to_vec();
        for (key, bytes) in &self.entries {
            contents.extend_from_slice(key.as_bytes());
            contents.push(0);
            contents.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            contents.extend_from_slice(bytes);
        }
        std::fs::write(path, contents)?;
        info!("settings written to {}", path.display());
        Ok(())
    }
}

static STORE: LazyLock<Mutex<Store>> = LazyLock::new(|| Mutex::new(Store::default()));

/// Replace the process-wide store with one loaded from disk.
pub fn open(executable: &Path) -> Result<(), StoreError> {
    *lock(&STORE) = Store::open(executable)?;
    Ok(())
}

pub fn get<T: StoreValue>(key: &str, default: T) -> T {
    lock(&STORE).get(key, default)
}

pub fn set<T: StoreValue>(key: &str, value: T) {
    lock(&STORE).set(key, value);
}

/// Write the store out; called on clean shutdown only.
pub fn persist() -> Result<(), StoreError> {
    lock(&STORE).persist()
}
