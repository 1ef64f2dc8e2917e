use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Longest tenant id accepted from a cookie or header.
const TENANT_ID_MAX_LEN: usize = 64;

/// Identity of an independent user of the system (UUIDv7, time-sortable).
///
/// Issued by the gateway on first contact and stable for the tenant's
/// lifetime. Items, settings and the processing lock are all scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Validate an id received from outside the process.
    ///
    /// Only ASCII alphanumerics, `-` and `_` are accepted so the value is safe
    /// to echo in cookies, logs and OAuth `state` parameters.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= TENANT_ID_MAX_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CoreError::InvalidTenant(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Parse an IANA zone name such as `Asia/Karachi`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| CoreError::InvalidTimezone(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_ids_are_unique_and_parseable() {
        let a = TenantId::new();
        let b = TenantId::new();
        assert_ne!(a, b);
        assert_eq!(TenantId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn tenant_parse_rejects_unsafe_values() {
        assert!(TenantId::parse("").is_err());
        assert!(TenantId::parse("a;b").is_err());
        assert!(TenantId::parse("../etc").is_err());
        assert!(TenantId::parse(&"x".repeat(65)).is_err());
        assert!(TenantId::parse("tenant_01-abc").is_ok());
    }

    #[test]
    fn timezone_names() {
        assert_eq!(parse_timezone("Asia/Karachi").unwrap(), chrono_tz::Asia::Karachi);
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
