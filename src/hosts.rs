//! Hosts file parsing (`<ip> <name> [alias...]`).

use serde::{Deserialize, Serialize};

use crate::lease::strip_comment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub ip: String,
    pub name: String,
    pub aliases: Vec<String>,
}

/// Parses hosts file content. Lines with fewer than two fields are skipped.
pub fn parse_hosts(text: &str) -> Vec<HostEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = strip_comment(line.trim()).split_whitespace();
            let ip = fields.next()?;
            let name = fields.next()?;
            Some(HostEntry {
                ip: ip.to_string(),
                name: name.to_string(),
                aliases: fields.map(str::to_string).collect(),
            })
        })
        .collect()
}
