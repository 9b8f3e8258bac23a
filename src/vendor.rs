//! MAC address vendor resolution.
//!
//! The backing store is a newline-delimited JSON file with one record per
//! assigned prefix (the macaddress.io export format). Lookups go through an
//! in-memory cache keyed by uppercase prefix strings of arbitrary length, so
//! the longest cached prefix of an address always wins.
//!
//! # Thread Safety
//!
//! The cache sits behind a [`RwLock`]: lookups take the shared lock and only
//! take the exclusive lock to insert a record found by a disk scan. Each scan
//! opens its own read handle, so concurrent scans never share a file cursor.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::mac::MacAddr;

/// Vendor information for an assigned MAC prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VendorRecord {
    #[serde(rename = "oui", default)]
    pub prefix_key: String,
    #[serde(rename = "isPrivate", default)]
    pub is_private: bool,
    #[serde(rename = "companyName", default)]
    pub company: String,
    #[serde(rename = "companyAddress", default)]
    pub address: String,
    #[serde(rename = "countryCode", default)]
    pub country_code: String,
    #[serde(rename = "assignmentBlockSize", default)]
    pub block_size: String,
    #[serde(rename = "dateCreated", default)]
    pub created: String,
    #[serde(rename = "dateUpdated", default)]
    pub updated: String,
}

impl VendorRecord {
    fn unknown() -> Self {
        Self {
            prefix_key: "00:00:00:00:00:00".to_string(),
            is_private: false,
            company: "UNKNOWN".to_string(),
            address: "UNKNOWN".to_string(),
            ..Default::default()
        }
    }

    fn private() -> Self {
        Self {
            prefix_key: String::new(),
            is_private: true,
            company: "Local/Privacy MAC".to_string(),
            address: "UNKNOWN".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct Cache {
    entries: HashMap<String, Arc<VendorRecord>>,
    preloaded: bool,
}

/// Longest-prefix vendor resolver over a JSON-lines backing store.
#[derive(Debug)]
pub struct Resolver {
    path: PathBuf,
    cache: RwLock<Cache>,
    unknown: Arc<VendorRecord>,
    private: Arc<VendorRecord>,
}

/// Uppercases and canonicalizes a MAC string; unparseable input is only
/// uppercased so partial prefixes still match.
fn normalize(mac: &str) -> String {
    match mac.parse::<MacAddr>() {
        Ok(parsed) => parsed.to_string(),
        Err(_) => mac.trim().to_uppercase(),
    }
}

/// Cache key for a stored record; records without a prefix never match.
fn record_key(record: &VendorRecord) -> Option<String> {
    let key = record.prefix_key.trim().to_uppercase();
    (!key.is_empty()).then_some(key)
}

fn parse_record(line: &str) -> Option<VendorRecord> {
    match serde_json::from_str::<VendorRecord>(line) {
        Ok(record) => Some(record),
        Err(error) => {
            debug!("Skipping malformed vendor record: {}", error);
            None
        }
    }
}

impl Resolver {
    /// Opens the backing store without loading it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened, and
    /// [`Error::Parse`] if the file has content but not a single valid record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = BufReader::new(File::open(&path)?);

        let mut saw_content = false;
        let mut saw_record = false;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            saw_content = true;
            if serde_json::from_str::<VendorRecord>(&line).is_ok() {
                saw_record = true;
                break;
            }
        }
        if saw_content && !saw_record {
            return Err(Error::Parse(format!(
                "no valid vendor records in {}",
                path.display()
            )));
        }

        Ok(Self {
            path,
            cache: RwLock::new(Cache::default()),
            unknown: Arc::new(VendorRecord::unknown()),
            private: Arc::new(VendorRecord::private()),
        })
    }

    /// Loads every record into the cache. Malformed lines are skipped.
    ///
    /// After a successful preload, lookups that miss the cache return the
    /// unknown record without touching the disk.
    pub fn preload(&self) -> Result<usize> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut loaded = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(record) = parse_record(&line)
                && let Some(key) = record_key(&record)
            {
                loaded.insert(key, Arc::new(record));
            }
        }

        let count = loaded.len();
        let mut cache = self.cache.write();
        cache.entries.extend(loaded);
        cache.preloaded = true;
        drop(cache);

        info!("Preloaded {} vendor records", count);
        Ok(count)
    }

    /// The shared record returned when nothing matches.
    pub fn unknown(&self) -> Arc<VendorRecord> {
        Arc::clone(&self.unknown)
    }

    /// The shared record returned for locally-administered addresses.
    pub fn private(&self) -> Arc<VendorRecord> {
        Arc::clone(&self.private)
    }

    /// Number of records currently cached.
    pub fn cached_count(&self) -> usize {
        self.cache.read().entries.len()
    }

    /// Resolves a MAC address (or prefix) to its vendor. Never fails.
    ///
    /// # Resolution Order
    ///
    /// 1. Longest cached prefix of the normalized address
    /// 2. Shared private record if the second hex digit is 2, 6, A or E
    /// 3. Unknown record if the store was preloaded
    /// 4. A linear scan of the backing store; the first stored prefix that
    ///    prefixes the address is cached and returned
    ///
    /// A miss is not cached, so later lookups rescan in case the store grew.
    pub fn lookup(&self, mac: &str) -> Arc<VendorRecord> {
        let mac = normalize(mac);

        {
            let cache = self.cache.read();
            for end in (0..=mac.len()).rev() {
                if !mac.is_char_boundary(end) {
                    continue;
                }
                if let Some(record) = cache.entries.get(&mac[..end]) {
                    return Arc::clone(record);
                }
            }

            if matches!(mac.chars().nth(1), Some('2' | '6' | 'A' | 'E')) {
                return self.private();
            }

            if cache.preloaded {
                return self.unknown();
            }
        }

        match self.scan(&mac) {
            Ok(Some(record)) => record,
            Ok(None) => self.unknown(),
            Err(error) => {
                debug!("Vendor scan of {} failed: {}", self.path.display(), error);
                self.unknown()
            }
        }
    }

    fn scan(&self, mac: &str) -> Result<Option<Arc<VendorRecord>>> {
        let reader = BufReader::new(File::open(&self.path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Some(record) = parse_record(&line) else {
                continue;
            };
            let Some(key) = record_key(&record) else {
                continue;
            };
            if !mac.starts_with(&key) {
                continue;
            }

            let record = Arc::new(record);
            let mut cache = self.cache.write();
            let cached = cache.entries.entry(key).or_insert(record);
            return Ok(Some(Arc::clone(cached)));
        }
        Ok(None)
    }
}
