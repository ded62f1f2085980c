use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// `major.minor` format version, as found in the `%PDF-x.y` header.
///
/// Serializes as the `"1.7"` string form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormatVersion {
    pub major: u8,
    pub minor: u8,
}

impl FormatVersion {
    pub const V1_4: Self = Self::new(1, 4);
    pub const V1_7: Self = Self::new(1, 7);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::V1_7
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for FormatVersion {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| TypeError::InvalidVersion(s.to_string()))?;
        let major = major
            .parse()
            .map_err(|_| TypeError::InvalidVersion(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| TypeError::InvalidVersion(s.to_string()))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for FormatVersion {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FormatVersion> for String {
    fn from(v: FormatVersion) -> Self {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let v: FormatVersion = "1.7".parse().unwrap();
        assert_eq!(v, FormatVersion::V1_7);
        assert_eq!(v.to_string(), "1.7");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("17".parse::<FormatVersion>().is_err());
        assert!("1.x".parse::<FormatVersion>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&FormatVersion::V1_4).unwrap();
        assert_eq!(json, "\"1.4\"");
        let back: FormatVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FormatVersion::V1_4);
        assert!(serde_json::from_str::<FormatVersion>("\"one\"").is_err());
    }

    #[test]
    fn ordering() {
        assert!(FormatVersion::V1_4 < FormatVersion::V1_7);
    }
}
