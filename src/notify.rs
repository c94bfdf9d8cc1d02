//! Outbound callbacks: change notifications and the displayed state
//!
//! Rendering and desktop notifications live outside this crate; the binary
//! ships log/console implementations.

use chrono::Local;
use std::path::Path;
use tracing::{info, warn};

use crate::cache::AssetKind;
use crate::errors::LookupError;
use crate::identity::types::{AsnInfo, Identity};

pub trait Notifier: Send + Sync {
    fn on_identity_changed(&self, old: &Identity, new: &Identity);
    fn on_lookup_failed(&self, error: &LookupError);
}

/// Receives the latest identity after every successful lookup
pub trait DisplayState: Send + Sync {
    fn update(&self, ip: &str, country_code: &str);

    fn show_asn(&self, _asn: &AsnInfo) {}

    fn show_asset(&self, _kind: AssetKind, _path: &Path) {}
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn on_identity_changed(&self, old: &Identity, new: &Identity) {
        info!(
            old = %old.ip_address,
            new = %new.ip_address,
            "External IP address has changed to {}",
            new
        );
    }

    fn on_lookup_failed(&self, error: &LookupError) {
        warn!(kind = error.kind(), "External IP lookup failed: {}", error);
    }
}

/// Prints one status line per update on stdout
pub struct ConsoleDisplay;

impl DisplayState for ConsoleDisplay {
    fn update(&self, ip: &str, country_code: &str) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        if country_code.is_empty() {
            println!("[{}] IP: {}", stamp, ip);
        } else {
            println!("[{}] IP: {} ({})", stamp, ip, country_code);
        }
    }

    fn show_asn(&self, asn: &AsnInfo) {
        let unknown = "unknown";
        println!(
            "    host: {}  org: {}  tz: {}",
            asn.hostname.as_deref().unwrap_or(unknown),
            asn.org.as_deref().unwrap_or(unknown),
            asn.timezone.as_deref().unwrap_or(unknown),
        );
    }

    fn show_asset(&self, kind: AssetKind, path: &Path) {
        println!("    {}: {}", kind, path.display());
    }
}
