//! Hardware (MAC) address value type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A 6-byte Ethernet hardware address.
///
/// Parses the usual spellings (`aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF`,
/// `aabb.ccdd.eeff`, `aabbccddeeff`) and always displays in the canonical
/// uppercase colon-separated form used by the static reservation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Returns true if the IEEE locally-administered bit is set.
    pub fn is_locally_administered(&self) -> bool {
        self.0[0] & 0x02 != 0
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        let digits: String = if input.contains(':') || input.contains('-') {
            let groups: Vec<&str> = input.split([':', '-']).collect();
            if groups.len() != 6 || groups.iter().any(|group| group.len() != 2) {
                return Err(Error::Parse(format!("invalid MAC address: {}", input)));
            }
            groups.concat()
        } else if input.contains('.') {
            let groups: Vec<&str> = input.split('.').collect();
            if groups.len() != 3 || groups.iter().any(|group| group.len() != 4) {
                return Err(Error::Parse(format!("invalid MAC address: {}", input)));
            }
            groups.concat()
        } else {
            input.to_string()
        };

        if digits.len() != 12 || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(Error::Parse(format!("invalid MAC address: {}", input)));
        }

        let mut bytes = [0u8; 6];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16)
                .map_err(|_| Error::Parse(format!("invalid MAC address: {}", input)))?;
        }
        Ok(MacAddr(bytes))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spellings() {
        let expected = MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        for text in [
            "aa:bb:cc:dd:ee:ff",
            "AA-BB-CC-DD-EE-FF",
            "aabb.ccdd.eeff",
            "AABBCCDDEEFF",
            "  aa:BB:cc:DD:ee:FF ",
        ] {
            assert_eq!(text.parse::<MacAddr>().unwrap(), expected, "{}", text);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "aa:bb:cc", "aa:bb:cc:dd:ee:gg", "a:b:c:d:e:f", "aabbccddeeff00", "*:*"] {
            assert!(text.parse::<MacAddr>().is_err(), "{}", text);
        }
    }

    #[test]
    fn test_display_is_uppercase_colon() {
        let mac: MacAddr = "0a:1b:2c:3d:4e:5f".parse().unwrap();
        assert_eq!(mac.to_string(), "0A:1B:2C:3D:4E:5F");
    }

    #[test]
    fn test_locally_administered() {
        assert!("02:00:00:00:00:01".parse::<MacAddr>().unwrap().is_locally_administered());
        assert!("DA:A1:19:00:00:01".parse::<MacAddr>().unwrap().is_locally_administered());
        assert!(!"00:1A:2B:00:00:01".parse::<MacAddr>().unwrap().is_locally_administered());
    }

    #[test]
    fn test_serde_as_string() {
        let mac: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"AA:BB:CC:DD:EE:FF\"");
        let back: MacAddr = serde_json::from_str("\"aa-bb-cc-dd-ee-ff\"").unwrap();
        assert_eq!(back, mac);
    }
}
