//! Types returned by the identity and ASN lookup services

use serde::{Deserialize, Serialize};
use std::fmt;

/// The host's externally observed network identity
///
/// Built fresh from every successful lookup and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    /// External IP address as reported by the service
    pub ip_address: String,
    /// ISO 3166-1 alpha-2 code (may be empty)
    pub country_code: String,
    pub country_name: String,
    pub city_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Identity {
    /// Identity carrying only an address (plain-text lookup services)
    pub fn from_ip(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.ip_address.is_empty()
    }

    /// Coordinate pair, when the service reported both
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ip_address)?;
        if !self.country_code.is_empty() {
            write!(f, " ({}", self.country_code)?;
            if !self.city_name.is_empty() {
                write!(f, ", {}", self.city_name)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Hostname / organisation info from the ASN service
///
/// Every field is optional: a missing key means "unknown", not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsnInfo {
    pub hostname: Option<String>,
    pub org: Option<String>,
    pub timezone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_service_json() {
        let json = r#"{
            "ipAddress": "203.0.113.7",
            "countryCode": "NL",
            "countryName": "Netherlands",
            "cityName": "Amsterdam",
            "latitude": 52.37,
            "longitude": 4.89,
            "timeZone": "+01:00"
        }"#;

        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.ip_address, "203.0.113.7");
        assert_eq!(identity.country_code, "NL");
        assert_eq!(identity.coordinates(), Some((52.37, 4.89)));
        assert_eq!(identity.to_string(), "203.0.113.7 (NL, Amsterdam)");
    }

    #[test]
    fn test_identity_missing_fields_default() {
        let identity: Identity = serde_json::from_str(r#"{"ipAddress": "198.51.100.1"}"#).unwrap();
        assert!(identity.is_valid());
        assert!(identity.country_code.is_empty());
        assert_eq!(identity.coordinates(), None);
        assert_eq!(identity.to_string(), "198.51.100.1");
    }

    #[test]
    fn test_asn_info_absent_keys_are_unknown() {
        let asn: AsnInfo =
            serde_json::from_str(r#"{"org": "AS64500 Example Net", "city": "x"}"#).unwrap();
        assert_eq!(asn.org.as_deref(), Some("AS64500 Example Net"));
        assert!(asn.hostname.is_none());
        assert!(asn.timezone.is_none());
    }
}
