//! Read-only access to legacy LMDB stores
//!
//! The legacy application kept its response cache in an LMDB environment
//! (`data.mdb` + `lock.mdb`). Values are either JSON documents or pickled
//! Python objects; the latter are recognised by their protocol header and are
//! never decoded.

use heed::types::Bytes;
use heed::{Database, EnvFlags, EnvOpenOptions};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::types::{MigrationError, MigrationOutcome};

/// Data file inside an LMDB environment directory
pub const LMDB_DATA_FILE: &str = "data.mdb";

/// `mm_magic` of the LMDB meta page, stored little-endian after the page header
const LMDB_MAGIC: u32 = 0xBEEF_C0DE;
const LMDB_MAGIC_OFFSET: usize = 16;

/// Pickle protocol 2-5 headers (`PROTO` opcode followed by the version)
pub const PICKLE_PREFIXES: [&[u8]; 4] = [b"\x80\x02", b"\x80\x03", b"\x80\x04", b"\x80\x05"];

const MIN_MAP_SIZE: usize = 10 * 1024 * 1024;
const MAP_SIZE_ALIGN: usize = 1024 * 1024;

/// True when `bytes` start with an unsafe serialization header
pub fn is_unsafe_payload(bytes: &[u8]) -> bool {
    PICKLE_PREFIXES.iter().any(|prefix| bytes.starts_with(prefix))
}

/// Check a file for the LMDB meta-page signature
pub fn has_lmdb_signature(path: &Path) -> bool {
    let mut header = [0u8; LMDB_MAGIC_OFFSET + 4];
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    if file.read_exact(&mut header).is_err() {
        return false;
    }
    let magic = u32::from_le_bytes([
        header[LMDB_MAGIC_OFFSET],
        header[LMDB_MAGIC_OFFSET + 1],
        header[LMDB_MAGIC_OFFSET + 2],
        header[LMDB_MAGIC_OFFSET + 3],
    ]);
    magic == LMDB_MAGIC
}

/// Resolve the data file of an environment given either its directory or the file
pub fn data_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(LMDB_DATA_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Raw key/value pair read from the store
#[derive(Debug, Clone)]
pub struct KvRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Every readable record of a store plus the number of entries that failed to decode
#[derive(Debug, Clone, Default)]
pub struct KvScan {
    pub records: Vec<KvRecord>,
    pub unreadable: usize,
    pub file_size: u64,
}

/// Open the environment read-only and copy out every record of the main database.
///
/// Blocking; async callers run it on `tokio::task::spawn_blocking`.
pub fn read_all(path: &Path) -> MigrationOutcome<KvScan> {
    let data_path = data_file(path);
    let file_size = std::fs::metadata(&data_path)?.len();
    let map_size = map_size_for(file_size);

    let mut options = EnvOpenOptions::new();
    options.map_size(map_size);
    let (env_path, flags) = if path.is_dir() {
        (path.to_path_buf(), EnvFlags::READ_ONLY | EnvFlags::NO_LOCK)
    } else {
        (
            path.to_path_buf(),
            EnvFlags::READ_ONLY | EnvFlags::NO_LOCK | EnvFlags::NO_SUB_DIR,
        )
    };

    // SAFETY: the legacy store is dormant during migration and opened read-only,
    // so no other writer can truncate the memory map underneath us.
    let env = unsafe {
        options.flags(flags);
        options.open(&env_path)
    }
    .map_err(|e| MigrationError::KvStore(format!("{}: {e}", env_path.display())))?;

    let mut scan = KvScan {
        file_size,
        ..Default::default()
    };
    {
        let rtxn = env
            .read_txn()
            .map_err(|e| MigrationError::KvStore(e.to_string()))?;
        let db: Option<Database<Bytes, Bytes>> = env
            .open_database(&rtxn, None)
            .map_err(|e| MigrationError::KvStore(e.to_string()))?;
        let Some(db) = db else {
            debug!("LMDB store {} has no main database", env_path.display());
            return Ok(scan);
        };

        let iter = db
            .iter(&rtxn)
            .map_err(|e| MigrationError::KvStore(e.to_string()))?;
        for item in iter {
            match item {
                Ok((key, value)) => scan.records.push(KvRecord {
                    key: key.to_vec(),
                    value: value.to_vec(),
                }),
                Err(e) => {
                    scan.unreadable += 1;
                    warn!("Skipping unreadable LMDB entry in {}: {}", env_path.display(), e);
                }
            }
        }
    }

    debug!(
        "Read {} records ({} unreadable) from {}",
        scan.records.len(),
        scan.unreadable,
        env_path.display()
    );
    Ok(scan)
}

fn map_size_for(file_size: u64) -> usize {
    let wanted = usize::try_from(file_size)
        .unwrap_or(usize::MAX / 2)
        .saturating_mul(2)
        .max(MIN_MAP_SIZE);
    wanted.div_ceil(MAP_SIZE_ALIGN) * MAP_SIZE_ALIGN
}
