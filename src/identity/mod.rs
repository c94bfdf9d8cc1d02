//! Last-known identity and change detection
//!
//! The store decides whether a lookup result is the initial population, a
//! genuine change of address, or nothing new. Only the IP address string is
//! compared; geolocation drift under the same address is not a change.

pub mod types;

use crate::errors::LookupError;
use types::Identity;

/// What a lookup result meant for the stored identity
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOutcome {
    /// Same address as before (other fields may have moved)
    NoChange,
    /// No usable identity was known yet
    FirstSeen(Identity),
    /// Address differs from a previously known one
    Changed { old: Identity, new: Identity },
    /// Lookup failed or returned no address; stored identity untouched
    Failed(LookupError),
}

#[derive(Debug, Default)]
pub struct IdentityStore {
    current: Option<Identity>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    pub fn apply_result(&mut self, result: Result<Identity, LookupError>) -> ChangeOutcome {
        let new = match result {
            Ok(identity) if identity.is_valid() => identity,
            // An answer without an address is no answer
            Ok(_) => return ChangeOutcome::Failed(LookupError::NoData),
            Err(e) => return ChangeOutcome::Failed(e),
        };

        let previous = self.current.replace(new.clone());
        match previous {
            Some(old) if old.is_valid() => {
                if old.ip_address == new.ip_address {
                    ChangeOutcome::NoChange
                } else {
                    ChangeOutcome::Changed { old, new }
                }
            }
            _ => ChangeOutcome::FirstSeen(new),
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
