//! Lease file and reservation parsing.
//!
//! Converts the DHCP service's textual state into [`LeaseRecord`]s:
//!
//! - dynamic leases from the lease file (`<epoch> <mac> <ip> <hostname> [<client-id>]`)
//! - static reservations from `dhcp-host=` directives, reported as
//!   synthetic leases that never expire
//!
//! Parsing never fails as a whole. A malformed line is skipped and the rest
//! of the text is still returned.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::mac::MacAddr;
use crate::vendor::{Resolver, VendorRecord};

/// Remaining duration reported for static reservations (10 years).
pub const STATIC_LEASE_DAYS: i64 = 3650;

/// Minimum number of whitespace-separated fields on a lease line.
const LEASE_LINE_FIELDS: usize = 5;

fn serialize_seconds<S: Serializer>(
    delta: &TimeDelta,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_i64(delta.num_seconds())
}

/// A lease as reported to readers.
///
/// Rebuilt wholesale on every reload; never edited in place.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseRecord {
    pub mac: MacAddr,
    pub ip: Option<Ipv4Addr>,
    pub hostname: String,
    pub client_id: String,
    /// Absolute expiry; `None` for static reservations.
    pub expires_at: Option<DateTime<Utc>>,
    /// Time until expiry, negative once expired.
    #[serde(serialize_with = "serialize_seconds")]
    pub remaining: TimeDelta,
    pub tag: Option<String>,
    pub vendor: Arc<VendorRecord>,
    pub is_static: bool,
}

impl LeaseRecord {
    /// Returns true if the lease expiry is in the past. Static leases never expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < Utc::now())
    }

    /// Recomputes `remaining` against `now`. Static leases are left untouched.
    pub fn refresh_remaining(&mut self, now: DateTime<Utc>) {
        if let Some(expires_at) = self.expires_at {
            self.remaining = expires_at - now;
        }
    }
}

/// Strips a `#` or `;` comment and the whitespace before it.
pub(crate) fn strip_comment(line: &str) -> &str {
    match line.find(['#', ';']) {
        Some(index) => line[..index].trim_end(),
        None => line,
    }
}

/// Extracts the tag from a `set:<tag>` or `tag:<tag>` value.
pub(crate) fn parse_tag(value: &str) -> Option<&str> {
    let (prefix, tag) = value.split_once(':')?;
    if tag.contains(':') {
        return None;
    }
    if prefix.eq_ignore_ascii_case("set") || prefix.eq_ignore_ascii_case("tag") {
        Some(tag)
    } else {
        None
    }
}

/// Splits a `dhcp-host=<values>` directive into its comma-separated values.
pub(crate) fn directive_values(line: &str) -> Option<Vec<&str>> {
    let (key, values) = line.split_once('=')?;
    if values.contains('=') || !key.trim().eq_ignore_ascii_case("dhcp-host") {
        return None;
    }
    Some(values.split(',').map(str::trim).collect())
}

/// Parses lease text, attaching vendor information from the resolver.
#[derive(Debug, Clone)]
pub struct LeaseParser {
    resolver: Arc<Resolver>,
}

impl LeaseParser {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Parses lease file content relative to the current time.
    pub fn parse_lease_file(&self, text: &str) -> Vec<LeaseRecord> {
        self.parse_lease_file_at(text, Utc::now())
    }

    /// Parses lease file content, computing `remaining` against `now`.
    ///
    /// Expired leases are kept with a negative remaining duration.
    pub fn parse_lease_file_at(&self, text: &str, now: DateTime<Utc>) -> Vec<LeaseRecord> {
        text.lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let record = self.parse_lease_line(line, now);
                if record.is_none() && !line.trim().is_empty() {
                    debug!("Skipping malformed lease line {}: {:?}", index + 1, line);
                }
                record
            })
            .collect()
    }

    fn parse_lease_line(&self, line: &str, now: DateTime<Utc>) -> Option<LeaseRecord> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < LEASE_LINE_FIELDS {
            return None;
        }

        let epoch: i64 = fields[0].parse().ok()?;
        let expires_at = DateTime::from_timestamp(epoch, 0)?;
        let mac: MacAddr = fields[1].parse().ok()?;

        Some(LeaseRecord {
            mac,
            ip: fields[2].parse().ok(),
            hostname: fields[3].to_string(),
            client_id: fields[4].to_string(),
            expires_at: Some(expires_at),
            remaining: expires_at - now,
            tag: None,
            vendor: self.resolver.lookup(&mac.to_string()),
            is_static: false,
        })
    }

    /// Parses `dhcp-host=` directives into synthetic, never-expiring leases.
    ///
    /// After the MAC, each value is classified by shape: `set:`/`tag:` values
    /// become the tag, IPv4 addresses the IP, and anything else becomes both
    /// the hostname and the client identifier.
    pub fn parse_static_config(&self, text: &str) -> Vec<LeaseRecord> {
        text.lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return None;
                }
                let record = self.parse_static_line(trimmed);
                if record.is_none() {
                    debug!("Skipping malformed static line {}: {:?}", index + 1, line);
                }
                record
            })
            .collect()
    }

    fn parse_static_line(&self, line: &str) -> Option<LeaseRecord> {
        let values = directive_values(strip_comment(line))?;
        if values.len() < 2 {
            return None;
        }

        let mac: MacAddr = values[0].parse().ok()?;
        let mut record = LeaseRecord {
            mac,
            ip: None,
            hostname: String::new(),
            client_id: String::new(),
            expires_at: None,
            remaining: TimeDelta::days(STATIC_LEASE_DAYS),
            tag: None,
            vendor: self.resolver.lookup(&mac.to_string()),
            is_static: true,
        };

        for value in &values[1..] {
            if let Some(tag) = parse_tag(value) {
                record.tag = Some(tag.to_string());
            } else if let Ok(ip) = value.parse::<Ipv4Addr>() {
                record.ip = Some(ip);
            } else {
                // TODO: give reservations a real identifier instead of reusing the hostname
                record.hostname = value.to_string();
                record.client_id = value.to_string();
            }
        }

        Some(record)
    }
}
