//! Static reservation management and persistence.
//!
//! This module owns the canonical list of `dhcp-host=` reservations:
//!
//! - Parsing the reservation file, including commented-out (disabled) entries
//! - CRUD with field validation and MAC/IP uniqueness among enabled entries
//! - Rendering back to the service's native directive syntax
//! - A full, non-mutating consistency scan ([`StaticStore::validate_all`])
//!
//! # File Format
//!
//! ```text
//! dhcp-host=AA:BB:CC:DD:EE:FF,set:trusted,192.168.1.50,nas,12h # rack 2
//! # dhcp-host=AA:BB:CC:DD:EE:01,192.168.1.51,old-laptop
//! ```
//!
//! Disabled entries are written as `# ` followed by the exact text they were
//! parsed from, so toggling an unedited entry never rewrites it.
//!
//! # Thread Safety
//!
//! All operations are thread-safe. [`StaticStore`] uses:
//! - [`RwLock`] for the entry list (readers copy out)
//! - [`Mutex`] for file save operations (prevents interleaved writes)

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lease::{directive_values, parse_tag};
use crate::mac::MacAddr;

/// Longest hostname accepted (RFC 1035 presentation form).
const MAX_HOSTNAME_LENGTH: usize = 253;

fn default_enabled() -> bool {
    true
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Returns true for dnsmasq lease-time values: `infinite`, or a number with
/// an optional `s`, `m`, `h`, `d` or `w` suffix.
fn is_lease_time(value: &str) -> bool {
    if value.eq_ignore_ascii_case("infinite") {
        return true;
    }
    let digits = value
        .strip_suffix(|c: char| matches!(c.to_ascii_lowercase(), 's' | 'm' | 'h' | 'd' | 'w'))
        .unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

/// A static DHCP reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticEntry {
    /// Unique identifier, assigned by the store.
    #[serde(default)]
    pub id: String,
    pub mac: MacAddr,
    #[serde(default)]
    pub ip: Option<Ipv4Addr>,
    /// Empty when the reservation has no hostname.
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub lease_time: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 1-based line in the file the entry was read from.
    #[serde(default)]
    pub line_number: usize,
    /// Source text (without the disabling `# `) the entry was read from.
    #[serde(default)]
    pub raw_line: String,
}

impl StaticEntry {
    /// Creates an enabled entry with only a MAC address set.
    pub fn new(mac: MacAddr) -> Self {
        Self {
            id: String::new(),
            mac,
            ip: None,
            hostname: String::new(),
            tag: None,
            lease_time: None,
            comment: None,
            enabled: true,
            line_number: 0,
            raw_line: String::new(),
        }
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.ip.is_none() && self.hostname.is_empty() {
            return Err("either IP address or hostname is required".to_string());
        }

        if !self.hostname.is_empty() {
            if self.hostname.len() > MAX_HOSTNAME_LENGTH {
                return Err(format!(
                    "hostname too long (max {} characters)",
                    MAX_HOSTNAME_LENGTH
                ));
            }
            if !self
                .hostname
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            {
                return Err("hostname contains invalid characters".to_string());
            }
            if self.hostname.parse::<Ipv4Addr>().is_ok() || is_lease_time(&self.hostname) {
                return Err(format!(
                    "hostname {} would be read back as an address or lease time",
                    self.hostname
                ));
            }
        }

        if let Some(tag) = &self.tag
            && (tag.is_empty()
                || tag
                    .chars()
                    .any(|c| c.is_whitespace() || matches!(c, ',' | ':' | '#' | ';' | '=')))
        {
            return Err("tag contains invalid characters".to_string());
        }

        if let Some(lease_time) = &self.lease_time
            && !is_lease_time(lease_time)
        {
            return Err(format!("invalid lease time: {}", lease_time));
        }

        if let Some(comment) = &self.comment {
            if comment.contains(['\n', '\r']) {
                return Err("comment must be a single line".to_string());
            }
            if comment.is_empty() || comment.trim() != comment {
                return Err("comment must be non-empty and trimmed".to_string());
            }
        }

        Ok(())
    }

    /// Trims the comment and drops it when blank, the way the parser reads it.
    fn tidy(&mut self) {
        self.comment = self
            .comment
            .take()
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());
    }

    /// Checks field-level rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the first rule that fails.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(Error::Validation)
    }

    /// Renders the enabled form: `dhcp-host=<MAC>[,set:<tag>][,<ip>][,<hostname>][,<lease>][ # <comment>]`.
    pub fn directive(&self) -> String {
        let mut parts = vec![self.mac.to_string()];
        if let Some(tag) = &self.tag {
            parts.push(format!("set:{}", tag));
        }
        if let Some(ip) = self.ip {
            parts.push(ip.to_string());
        }
        if !self.hostname.is_empty() {
            parts.push(self.hostname.clone());
        }
        if let Some(lease_time) = &self.lease_time {
            parts.push(lease_time.clone());
        }

        let mut line = format!("dhcp-host={}", parts.join(","));
        if let Some(comment) = self.comment.as_deref().filter(|comment| !comment.is_empty()) {
            line.push_str(" # ");
            line.push_str(comment);
        }
        line
    }

    /// Renders the line written to the reservation file.
    pub fn to_config_line(&self) -> String {
        if self.enabled {
            return self.directive();
        }
        if self.raw_line.is_empty() {
            format!("# {}", self.directive())
        } else {
            format!("# {}", self.raw_line)
        }
    }

    /// Returns true if the entry passes every filter that is set.
    pub fn matches(&self, filter: &StaticFilter) -> bool {
        fn contains_ci(haystack: &str, needle: &str) -> bool {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }

        if let Some(enabled) = filter.enabled
            && self.enabled != enabled
        {
            return false;
        }
        if let Some(mac) = &filter.mac
            && !contains_ci(&self.mac.to_string(), mac)
        {
            return false;
        }
        if let Some(ip) = &filter.ip
            && !self.ip.is_some_and(|addr| addr.to_string().contains(ip.as_str()))
        {
            return false;
        }
        if let Some(hostname) = &filter.hostname
            && !contains_ci(&self.hostname, hostname)
        {
            return false;
        }
        if let Some(tag) = &filter.tag
            && !contains_ci(self.tag.as_deref().unwrap_or_default(), tag)
        {
            return false;
        }
        true
    }

    fn conflicts_with(&self, other: &StaticEntry) -> Option<Error> {
        if !self.enabled || !other.enabled {
            return None;
        }
        if self.mac == other.mac {
            return Some(Error::Conflict(format!(
                "MAC address {} already exists",
                self.mac
            )));
        }
        if let Some(ip) = self.ip
            && other.ip == Some(ip)
        {
            return Some(Error::Conflict(format!("IP address {} already exists", ip)));
        }
        None
    }
}

/// Parses one line of the reservation file.
///
/// Returns `None` for blank lines, plain comments, other directives, and
/// malformed `dhcp-host` lines.
pub fn parse_config_line(line: &str, line_number: usize) -> Option<StaticEntry> {
    let trimmed = line.trim();
    let (enabled, text) = match trimmed.strip_prefix('#') {
        Some(rest) => (false, rest.trim_start_matches('#').trim_start()),
        None => (true, trimmed),
    };
    if text.is_empty() {
        return None;
    }

    let (directive, comment) = match text.find(['#', ';']) {
        Some(index) => (text[..index].trim_end(), Some(text[index + 1..].trim())),
        None => (text, None),
    };

    let values = directive_values(directive)?;
    let mac: MacAddr = values.first()?.parse().ok()?;

    let mut entry = StaticEntry::new(mac);
    entry.enabled = enabled;
    entry.line_number = line_number;
    entry.raw_line = text.to_string();
    entry.comment = comment
        .filter(|comment| !comment.is_empty())
        .map(str::to_string);

    for value in values.iter().skip(1).filter(|value| !value.is_empty()) {
        if let Some(tag) = parse_tag(value) {
            entry.tag = Some(tag.to_string());
        } else if let Ok(ip) = value.parse::<Ipv4Addr>() {
            entry.ip = Some(ip);
        } else if is_lease_time(value) {
            entry.lease_time = Some(value.to_string());
        } else {
            entry.hostname = value.to_string();
        }
    }

    Some(entry)
}

/// Parses the whole reservation file, skipping lines that are not entries.
///
/// Parsed entries have no id; the store assigns them.
pub fn parse_config(text: &str) -> Vec<StaticEntry> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let entry = parse_config_line(line, index + 1);
            if entry.is_none() && line.contains("dhcp-host") {
                debug!("Skipping malformed reservation on line {}: {:?}", index + 1, line);
            }
            entry
        })
        .collect()
}

/// Renders entries to file content, one directive per line.
pub fn render_config(entries: &[StaticEntry]) -> String {
    let mut content = String::new();
    for entry in entries {
        content.push_str(&entry.to_config_line());
        content.push('\n');
    }
    content
}

/// Optional criteria for [`StaticStore::list`].
///
/// MAC, hostname and tag match case-insensitive substrings; IP matches a
/// substring of the dotted form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticFilter {
    pub enabled: Option<bool>,
    pub mac: Option<String>,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub tag: Option<String>,
}

/// A problem found by [`StaticStore::validate_all`]. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    Invalid {
        position: usize,
        reason: String,
    },
    DuplicateMac {
        mac: MacAddr,
        first: usize,
        second: usize,
    },
    DuplicateIp {
        ip: Ipv4Addr,
        first: usize,
        second: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Invalid { position, reason } => write!(f, "entry {}: {}", position, reason),
            Violation::DuplicateMac { mac, first, second } => {
                write!(f, "duplicate MAC {} in entries {} and {}", mac, first, second)
            }
            Violation::DuplicateIp { ip, first, second } => {
                write!(f, "duplicate IP {} in entries {} and {}", ip, first, second)
            }
        }
    }
}

/// Thread-safe owner of the static reservation list.
///
/// # Example
///
/// ```no_run
/// use dhcpwatch::{StaticEntry, StaticStore};
///
/// # async fn example() -> dhcpwatch::Result<()> {
/// let store = StaticStore::new();
/// store.load("/etc/dnsmasq.d/static.conf").await?;
///
/// let mut entry = StaticEntry::new("aa:bb:cc:dd:ee:ff".parse()?);
/// entry.hostname = "nas".to_string();
/// store.add(entry).await?;
/// store.save("/etc/dnsmasq.d/static.conf").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct StaticStore {
    entries: RwLock<Vec<StaticEntry>>,
    save_lock: Mutex<()>,
}

impl StaticStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every entry with the contents of the reservation file.
    ///
    /// Entries whose line number and source text are unchanged keep the id
    /// they had before the reload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read. The current entries
    /// are left untouched in that case.
    pub async fn load<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let mut parsed = parse_config(&content);

        let mut entries = self.entries.write().await;
        let mut previous: HashMap<(usize, String), String> = entries
            .iter()
            .map(|entry| ((entry.line_number, entry.raw_line.clone()), entry.id.clone()))
            .collect();
        for entry in &mut parsed {
            let key = (entry.line_number, entry.raw_line.clone());
            entry.id = previous.remove(&key).unwrap_or_else(new_id);
        }
        *entries = parsed;
        let count = entries.len();
        drop(entries);

        info!("Loaded {} static entries from {}", count, path.display());
        Ok(count)
    }

    /// Writes every entry, enabled and disabled, to the reservation file.
    ///
    /// The file is replaced by rename, so a watcher never observes it half
    /// written. Line numbers and raw lines are updated to what was just
    /// written, so reloading the saved file keeps every id.
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let entries = {
            let mut entries = self.entries.write().await;
            for (index, entry) in entries.iter_mut().enumerate() {
                entry.line_number = index + 1;
                // The reload that follows keys ids on the text written here.
                if entry.enabled || entry.raw_line.is_empty() {
                    entry.raw_line = entry.directive().trim().to_string();
                }
            }
            entries.clone()
        };
        let content = render_config(&entries);

        let file_name = path
            .file_name()
            .ok_or_else(|| Error::Io(std::io::Error::other("reservation path has no file name")))?;
        let mut temp_name = std::ffi::OsString::from(".");
        temp_name.push(file_name);
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        let _lock = self.save_lock.lock().await;
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        info!("Saved {} static entries to {}", entries.len(), path.display());
        Ok(entries.len())
    }

    /// Returns a copy of every entry in file order.
    pub async fn get_all(&self) -> Vec<StaticEntry> {
        self.entries.read().await.clone()
    }

    /// Returns copies of the entries passing `filter`.
    pub async fn list(&self, filter: &StaticFilter) -> Vec<StaticEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|entry| entry.matches(filter))
            .cloned()
            .collect()
    }

    /// Returns the entry with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry has this id.
    pub async fn get_by_id(&self, id: &str) -> Result<StaticEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Returns every entry (enabled or not) for a MAC address.
    pub async fn get_by_mac(&self, mac: MacAddr) -> Vec<StaticEntry> {
        let entries = self.entries.read().await;
        entries.iter().filter(|entry| entry.mac == mac).cloned().collect()
    }

    /// Returns every entry (enabled or not) reserving an IP address.
    pub async fn get_by_ip(&self, ip: Ipv4Addr) -> Vec<StaticEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|entry| entry.ip == Some(ip))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Adds an entry and returns the stored copy with its new id.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if field rules fail
    /// - [`Error::Conflict`] if the entry is enabled and an enabled entry
    ///   already uses the same MAC or IP
    pub async fn add(&self, mut entry: StaticEntry) -> Result<StaticEntry> {
        entry.tidy();
        entry.validate()?;

        let mut entries = self.entries.write().await;
        if let Some(error) = entries
            .iter()
            .find_map(|existing| entry.conflicts_with(existing))
        {
            return Err(error);
        }

        entry.id = new_id();
        entry.line_number = entries.len() + 1;
        entry.raw_line = entry.directive();
        entries.push(entry.clone());

        debug!("Added static entry {} for {}", entry.id, entry.mac);
        Ok(entry)
    }

    /// Replaces the entry with `id`, keeping its id and line number.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if field rules fail
    /// - [`Error::NotFound`] if no entry has this id
    /// - [`Error::Conflict`] under the same rule as [`add`](Self::add),
    ///   ignoring the entry being replaced
    pub async fn update(&self, id: &str, mut entry: StaticEntry) -> Result<StaticEntry> {
        entry.tidy();
        entry.validate()?;

        let mut entries = self.entries.write().await;
        let index = entries
            .iter()
            .position(|existing| existing.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Some(error) = entries
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != index)
            .find_map(|(_, existing)| entry.conflicts_with(existing))
        {
            return Err(error);
        }

        entry.id = entries[index].id.clone();
        entry.line_number = entries[index].line_number;
        entry.raw_line = entry.directive();
        entries[index] = entry.clone();

        debug!("Updated static entry {}", entry.id);
        Ok(entry)
    }

    /// Removes the entry with `id`.
    pub async fn delete(&self, id: &str) -> Result<StaticEntry> {
        let mut entries = self.entries.write().await;
        let index = entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let removed = entries.remove(index);

        debug!("Deleted static entry {}", id);
        Ok(removed)
    }

    /// Marks the entry as enabled. Uniqueness is not rechecked; use
    /// [`validate_all`](Self::validate_all) to find duplicates.
    pub async fn enable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, true).await
    }

    /// Marks the entry as disabled.
    pub async fn disable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, false).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Scans every entry without modifying anything.
    ///
    /// Reports each entry failing field rules and each duplicate MAC or IP
    /// among enabled entries, paired with the first entry that used it.
    pub async fn validate_all(&self) -> Vec<Violation> {
        let entries = self.entries.read().await;
        let mut violations = Vec::new();
        let mut macs: HashMap<MacAddr, usize> = HashMap::new();
        let mut ips: HashMap<Ipv4Addr, usize> = HashMap::new();

        for (index, entry) in entries.iter().enumerate() {
            let position = index + 1;
            if let Err(reason) = entry.check() {
                violations.push(Violation::Invalid { position, reason });
            }
            if !entry.enabled {
                continue;
            }

            match macs.get(&entry.mac) {
                Some(&first) => violations.push(Violation::DuplicateMac {
                    mac: entry.mac,
                    first,
                    second: position,
                }),
                None => {
                    macs.insert(entry.mac, position);
                }
            }

            if let Some(ip) = entry.ip {
                match ips.get(&ip) {
                    Some(&first) => violations.push(Violation::DuplicateIp {
                        ip,
                        first,
                        second: position,
                    }),
                    None => {
                        ips.insert(ip, position);
                    }
                }
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mac: &str, ip: Option<[u8; 4]>, hostname: &str) -> StaticEntry {
        let mut entry = StaticEntry::new(mac.parse().unwrap());
        entry.ip = ip.map(Ipv4Addr::from);
        entry.hostname = hostname.to_string();
        entry
    }

    #[test]
    fn test_parse_full_line() {
        let parsed = parse_config_line(
            "dhcp-host=aa:bb:cc:dd:ee:ff,set:trusted,192.168.1.50,nas,12h # rack 2",
            7,
        )
        .unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.mac.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(parsed.tag.as_deref(), Some("trusted"));
        assert_eq!(parsed.ip, Some(Ipv4Addr::new(192, 168, 1, 50)));
        assert_eq!(parsed.hostname, "nas");
        assert_eq!(parsed.lease_time.as_deref(), Some("12h"));
        assert_eq!(parsed.comment.as_deref(), Some("rack 2"));
        assert_eq!(parsed.line_number, 7);
    }

    #[test]
    fn test_parse_disabled_line_keeps_raw_text() {
        let raw = "dhcp-host=aa-bb-cc-dd-ee-01,192.168.1.51,old-laptop";
        let parsed = parse_config_line(&format!("#  {}", raw), 3).unwrap();
        assert!(!parsed.enabled);
        assert_eq!(parsed.raw_line, raw);
        assert_eq!(parsed.to_config_line(), format!("# {}", raw));
    }

    #[test]
    fn test_parse_skips_non_entries() {
        for line in [
            "",
            "# just a note",
            "domain=lan",
            "dhcp-host=not-a-mac,192.168.1.2",
            "dhcp-range=192.168.1.100,192.168.1.200",
        ] {
            assert!(parse_config_line(line, 1).is_none(), "{}", line);
        }
    }

    #[test]
    fn test_render_omits_absent_fields() {
        let mut only_ip = entry("aa:bb:cc:dd:ee:ff", Some([10, 0, 0, 5]), "");
        assert_eq!(only_ip.directive(), "dhcp-host=AA:BB:CC:DD:EE:FF,10.0.0.5");

        only_ip.comment = Some("lab box".to_string());
        only_ip.tag = Some("lab".to_string());
        assert_eq!(
            only_ip.directive(),
            "dhcp-host=AA:BB:CC:DD:EE:FF,set:lab,10.0.0.5 # lab box"
        );
    }

    #[test]
    fn test_enabled_round_trip() {
        let mut original = entry("aa:bb:cc:dd:ee:ff", Some([192, 168, 1, 9]), "printer");
        original.tag = Some("office".to_string());
        original.lease_time = Some("infinite".to_string());
        original.comment = Some("2nd floor".to_string());

        let parsed = parse_config_line(&original.to_config_line(), 1).unwrap();
        assert_eq!(parsed.mac, original.mac);
        assert_eq!(parsed.ip, original.ip);
        assert_eq!(parsed.hostname, original.hostname);
        assert_eq!(parsed.tag, original.tag);
        assert_eq!(parsed.lease_time, original.lease_time);
        assert_eq!(parsed.comment, original.comment);
        assert!(parsed.enabled);
    }

    #[test]
    fn test_validation_rules() {
        let base = entry("aa:bb:cc:dd:ee:ff", None, "");
        assert!(matches!(base.validate(), Err(Error::Validation(_))));

        let bad_chars = entry("aa:bb:cc:dd:ee:ff", None, "my_host");
        let message = bad_chars.validate().unwrap_err().to_string();
        assert_eq!(message, "validation failed: hostname contains invalid characters");

        let too_long = entry("aa:bb:cc:dd:ee:ff", None, &"a".repeat(254));
        assert!(too_long.validate().is_err());

        let numeric = entry("aa:bb:cc:dd:ee:ff", None, "10.1.2.3");
        assert!(numeric.validate().is_err());

        let mut bad_lease = entry("aa:bb:cc:dd:ee:ff", Some([10, 0, 0, 1]), "");
        bad_lease.lease_time = Some("soon".to_string());
        assert!(bad_lease.validate().is_err());

        assert!(entry("aa:bb:cc:dd:ee:ff", Some([10, 0, 0, 1]), "").validate().is_ok());
        assert!(entry("aa:bb:cc:dd:ee:ff", None, "web-01.lan").validate().is_ok());
    }

    #[tokio::test]
    async fn test_add_assigns_unique_ids() {
        let store = StaticStore::new();
        let first = store
            .add(entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one"))
            .await
            .unwrap();
        let second = store
            .add(entry("aa:bb:cc:dd:ee:02", Some([10, 0, 0, 2]), "two"))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.line_number, 1);
        assert_eq!(second.line_number, 2);
        assert_eq!(store.get_by_id(&second.id).await.unwrap().hostname, "two");
    }

    #[tokio::test]
    async fn test_add_duplicate_mac_conflicts_only_when_both_enabled() {
        let store = StaticStore::new();
        store
            .add(entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one"))
            .await
            .unwrap();

        let duplicate = entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 2]), "two");
        assert!(matches!(
            store.add(duplicate.clone()).await,
            Err(Error::Conflict(_))
        ));

        let mut disabled = duplicate;
        disabled.enabled = false;
        assert!(store.add(disabled).await.is_ok());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_add_duplicate_ip_conflicts() {
        let store = StaticStore::new();
        store
            .add(entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one"))
            .await
            .unwrap();
        let result = store
            .add(entry("aa:bb:cc:dd:ee:02", Some([10, 0, 0, 1]), "two"))
            .await;
        assert!(matches!(result, Err(Error::Conflict(message)) if message.contains("10.0.0.1")));
    }

    #[tokio::test]
    async fn test_invalid_add_does_not_mutate() {
        let store = StaticStore::new();
        let result = store.add(entry("aa:bb:cc:dd:ee:01", None, "bad host")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_preserves_id_and_line() {
        let store = StaticStore::new();
        let first = store
            .add(entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one"))
            .await
            .unwrap();
        store
            .add(entry("aa:bb:cc:dd:ee:02", Some([10, 0, 0, 2]), "two"))
            .await
            .unwrap();

        let mut changed = entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 11]), "one-renamed");
        changed.id = "ignored".to_string();
        let updated = store.update(&first.id, changed).await.unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.line_number, 1);
        assert_eq!(updated.raw_line, updated.directive());

        let clash = entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 2]), "one");
        assert!(matches!(
            store.update(&first.id, clash).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            store.update("missing", entry("aa:bb:cc:dd:ee:09", None, "x")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_enable_disable() {
        let store = StaticStore::new();
        let added = store
            .add(entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one"))
            .await
            .unwrap();

        store.disable(&added.id).await.unwrap();
        assert!(!store.get_by_id(&added.id).await.unwrap().enabled);
        store.enable(&added.id).await.unwrap();
        assert!(store.get_by_id(&added.id).await.unwrap().enabled);

        store.delete(&added.id).await.unwrap();
        assert!(matches!(store.delete(&added.id).await, Err(Error::NotFound(_))));
        assert!(matches!(store.enable(&added.id).await, Err(Error::NotFound(_))));
        assert!(matches!(store.disable("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enable_does_not_recheck_uniqueness() {
        let store = StaticStore::new();
        store
            .add(entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one"))
            .await
            .unwrap();
        let mut twin = entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 2]), "two");
        twin.enabled = false;
        let twin = store.add(twin).await.unwrap();

        store.enable(&twin.id).await.unwrap();
        let violations = store.validate_all().await;
        assert_eq!(
            violations,
            vec![Violation::DuplicateMac {
                mac: "AA:BB:CC:DD:EE:01".parse().unwrap(),
                first: 1,
                second: 2,
            }]
        );
        assert_eq!(
            violations[0].to_string(),
            "duplicate MAC AA:BB:CC:DD:EE:01 in entries 1 and 2"
        );
    }

    #[tokio::test]
    async fn test_validate_all_reports_invalid_and_duplicate_ip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.conf");
        tokio::fs::write(
            &path,
            "dhcp-host=AA:BB:CC:DD:EE:01,10.0.0.1,ok\n\
             dhcp-host=AA:BB:CC:DD:EE:02,10.0.0.1,clash\n\
             dhcp-host=AA:BB:CC:DD:EE:03,bad_name\n\
             # dhcp-host=AA:BB:CC:DD:EE:04,10.0.0.1,off\n",
        )
        .await
        .unwrap();

        let store = StaticStore::new();
        assert_eq!(store.load(&path).await.unwrap(), 4);
        let violations = store.validate_all().await;
        assert_eq!(violations.len(), 2);
        assert!(violations.contains(&Violation::DuplicateIp {
            ip: Ipv4Addr::new(10, 0, 0, 1),
            first: 1,
            second: 2,
        }));
        assert!(violations.contains(&Violation::Invalid {
            position: 3,
            reason: "hostname contains invalid characters".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_load_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.conf");
        let original = "\
dhcp-host=AA:BB:CC:DD:EE:01,set:iot,10.0.0.1,plug # kitchen
#dhcp-host=aa:bb:cc:dd:ee:02 , 10.0.0.2 , Old-Box
this line is junk
dhcp-host=AA:BB:CC:DD:EE:03,10.0.0.3
";
        tokio::fs::write(&path, original).await.unwrap();

        let store = StaticStore::new();
        assert_eq!(store.load(&path).await.unwrap(), 3);
        store.save(&path).await.unwrap();

        let saved = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            saved,
            "\
dhcp-host=AA:BB:CC:DD:EE:01,set:iot,10.0.0.1,plug # kitchen
# dhcp-host=aa:bb:cc:dd:ee:02 , 10.0.0.2 , Old-Box
dhcp-host=AA:BB:CC:DD:EE:03,10.0.0.3
"
        );
    }

    #[tokio::test]
    async fn test_reload_keeps_ids_of_unchanged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.conf");
        tokio::fs::write(
            &path,
            "dhcp-host=AA:BB:CC:DD:EE:01,10.0.0.1\ndhcp-host=AA:BB:CC:DD:EE:02,10.0.0.2\n",
        )
        .await
        .unwrap();

        let store = StaticStore::new();
        store.load(&path).await.unwrap();
        let before = store.get_all().await;

        tokio::fs::write(
            &path,
            "dhcp-host=AA:BB:CC:DD:EE:01,10.0.0.1\ndhcp-host=AA:BB:CC:DD:EE:02,10.0.0.9\n",
        )
        .await
        .unwrap();
        store.load(&path).await.unwrap();
        let after = store.get_all().await;

        assert_eq!(before[0].id, after[0].id);
        assert_ne!(before[1].id, after[1].id);
    }

    #[tokio::test]
    async fn test_ids_survive_delete_save_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.conf");
        let store = StaticStore::new();
        let first = store
            .add(entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one"))
            .await
            .unwrap();
        let second = store
            .add(entry("aa:bb:cc:dd:ee:02", Some([10, 0, 0, 2]), "two"))
            .await
            .unwrap();

        store.delete(&first.id).await.unwrap();
        store.save(&path).await.unwrap();
        assert_eq!(store.get_by_id(&second.id).await.unwrap().line_number, 1);

        store.load(&path).await.unwrap();
        let reloaded = store.get_all().await;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].id, second.id);
        assert!(!dir.path().join(".static.conf.tmp").exists());
    }

    #[tokio::test]
    async fn test_noncanonical_lines_keep_ids_across_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.conf");
        tokio::fs::write(
            &path,
            "dhcp-host=aa:bb:cc:dd:ee:01,10.0.0.1,nas ; rack\n\
             #dhcp-host=aa-bb-cc-dd-ee-02 , 10.0.0.2\n",
        )
        .await
        .unwrap();

        let store = StaticStore::new();
        store.load(&path).await.unwrap();
        let before = store.get_all().await;

        store.save(&path).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "dhcp-host=AA:BB:CC:DD:EE:01,10.0.0.1,nas # rack\n\
             # dhcp-host=aa-bb-cc-dd-ee-02 , 10.0.0.2\n"
        );

        store.load(&path).await.unwrap();
        for entry in &before {
            let reloaded = store.get_by_id(&entry.id).await.unwrap();
            assert_eq!(reloaded.mac, entry.mac);
        }
    }

    #[tokio::test]
    async fn test_add_trims_comment() {
        let store = StaticStore::new();
        let mut padded = entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one");
        padded.comment = Some("  top shelf ".to_string());
        let added = store.add(padded).await.unwrap();
        assert_eq!(added.comment.as_deref(), Some("top shelf"));
        assert_eq!(parse_config_line(&added.directive(), 1).unwrap().comment, added.comment);

        let mut blank = entry("aa:bb:cc:dd:ee:02", Some([10, 0, 0, 2]), "two");
        blank.comment = Some("   ".to_string());
        assert_eq!(store.add(blank).await.unwrap().comment, None);
    }

    #[test]
    fn test_untrimmed_comment_is_invalid() {
        let mut padded = entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one");
        padded.comment = Some(" note".to_string());
        assert!(matches!(padded.validate(), Err(Error::Validation(_))));
        padded.comment = Some(String::new());
        assert!(padded.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = StaticStore::new();
        store
            .add(entry("aa:bb:cc:dd:ee:01", Some([10, 0, 0, 1]), "one"))
            .await
            .unwrap();

        let result = store.load(dir.path().join("missing.conf")).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = StaticStore::new();
        let mut tagged = entry("aa:bb:cc:dd:ee:01", Some([192, 168, 1, 10]), "Living-Room-TV");
        tagged.tag = Some("Media".to_string());
        store.add(tagged).await.unwrap();
        let mut off = entry("aa:bb:cc:00:00:02", Some([192, 168, 2, 20]), "garage");
        off.enabled = false;
        store.add(off).await.unwrap();

        let by_host = StaticFilter {
            hostname: Some("living".to_string()),
            ..Default::default()
        };
        assert_eq!(store.list(&by_host).await.len(), 1);

        let by_mac = StaticFilter {
            mac: Some("aa:bb:cc".to_string()),
            ..Default::default()
        };
        assert_eq!(store.list(&by_mac).await.len(), 2);

        let disabled_only = StaticFilter {
            enabled: Some(false),
            ..Default::default()
        };
        let found = store.list(&disabled_only).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hostname, "garage");

        let by_tag_and_ip = StaticFilter {
            tag: Some("media".to_string()),
            ip: Some("192.168.2.".to_string()),
            ..Default::default()
        };
        assert!(store.list(&by_tag_and_ip).await.is_empty());

        assert_eq!(store.get_by_ip(Ipv4Addr::new(192, 168, 2, 20)).await.len(), 1);
        assert_eq!(
            store.get_by_mac("AA:BB:CC:DD:EE:01".parse().unwrap()).await.len(),
            1
        );
    }
}
