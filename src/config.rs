use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub leases_file: PathBuf,
    pub hosts_file: PathBuf,
    pub static_file: Option<PathBuf>,
    pub vendor_db_file: PathBuf,
    #[serde(default)]
    pub vendor_db_preload: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leases_file: PathBuf::from("/var/lib/misc/dnsmasq.leases"),
            hosts_file: PathBuf::from("/var/lib/misc/hosts"),
            static_file: Some(PathBuf::from("/etc/dnsmasq.d/static.conf")),
            vendor_db_file: PathBuf::from("/usr/share/dhcpwatch/macaddress.io-db.json"),
            vendor_db_preload: false,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            let config = Config::default();
            config.save(path)?;
            config
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Applies `LEASESFILE`, `HOSTSFILE`, `STATICFILE`, `MACDBFILE` and
    /// `MACDBPRELOAD` overrides. An empty `STATICFILE` disables the static source.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LEASESFILE").filter(|value| !value.is_empty()) {
            self.leases_file = PathBuf::from(value);
        }
        if let Some(value) = lookup("HOSTSFILE").filter(|value| !value.is_empty()) {
            self.hosts_file = PathBuf::from(value);
        }
        if let Some(value) = lookup("STATICFILE") {
            self.static_file = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        if let Some(value) = lookup("MACDBFILE").filter(|value| !value.is_empty()) {
            self.vendor_db_file = PathBuf::from(value);
        }
        if let Some(preload) = lookup("MACDBPRELOAD").as_deref().and_then(parse_bool) {
            self.vendor_db_preload = preload;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.leases_file.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "leases_file must not be empty".to_string(),
            ));
        }

        if self.hosts_file.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "hosts_file must not be empty".to_string(),
            ));
        }

        if self.vendor_db_file.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "vendor_db_file must not be empty".to_string(),
            ));
        }

        if let Some(static_file) = &self.static_file {
            if static_file.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(
                    "static_file must not be empty when set".to_string(),
                ));
            }
            if *static_file == self.leases_file || *static_file == self.hosts_file {
                return Err(Error::InvalidConfig(
                    "static_file must differ from leases_file and hosts_file".to_string(),
                ));
            }
        }

        Ok(())
    }
}
