//! # dhcpwatch
//!
//! A live-reloading monitor for a dnsmasq-style DHCP service's on-disk state.
//!
//! ## Features
//!
//! - Lease file parsing with MAC vendor resolution
//! - Longest-prefix vendor cache over a JSON-lines database, with lazy disk scans
//! - Static reservation (`dhcp-host=`) management with uniqueness checks
//! - Lossless round trips of the reservation file, including disabled entries
//! - File watching that reloads each source when its file changes
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dhcpwatch::{Config, LeaseParser, Monitor, Resolver};
//!
//! #[tokio::main]
//! async fn main() -> dhcpwatch::Result<()> {
//!     let config = Config::load_or_create("dhcpwatch.json")?;
//!     let resolver = Arc::new(Resolver::open(&config.vendor_db_file)?);
//!     let monitor = Monitor::start(config, LeaseParser::new(resolver)).await?;
//!     println!("{} leases", monitor.get_leases().await.len());
//!     monitor.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Resolver`] - MAC-to-vendor lookup with a layered cache
//! - [`LeaseParser`] - Lease file and reservation text to [`LeaseRecord`]s
//! - [`StaticStore`] - Thread-safe reservation list with persistence
//! - [`Monitor`] - Watches the files and serves consistent snapshots

pub mod config;
pub mod error;
pub mod hosts;
pub mod lease;
pub mod mac;
pub mod monitor;
pub mod reservation;
pub mod vendor;

pub use config::Config;
pub use error::{Error, Result};
pub use hosts::{HostEntry, parse_hosts};
pub use lease::{LeaseParser, LeaseRecord};
pub use mac::MacAddr;
pub use monitor::{Monitor, Snapshot, Source, SourceState};
pub use reservation::{StaticEntry, StaticFilter, StaticStore, Violation};
pub use vendor::{Resolver, VendorRecord};
