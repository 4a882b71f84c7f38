//! Trust ledger: verification state per remote device.
//!
//! Pure lookup and update, no cryptographic operations. The pairwise engine
//! consults the ledger before originating or accepting a session: `Blocked`
//! devices are refused outright, `Unverified` devices proceed with a
//! warning. Unknown devices default to `Unverified`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::ids::DeviceId;

/// Verification state of a remote device's keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustState {
    /// Keys seen but never verified or cross-signed
    #[default]
    Unverified,
    /// Keys verified by the local user (or cross-signed by a trusted chain)
    Verified,
    /// Device explicitly blocked; no sessions may be established
    Blocked,
}

/// Shared ledger of per-device trust decisions.
///
/// Clones share the same underlying state via `Arc`, so one ledger can serve
/// both engines and the host's verification UI.
#[derive(Debug, Clone, Default)]
pub struct TrustLedger {
    inner: Arc<Mutex<HashMap<DeviceId, TrustState>>>,
}

impl TrustLedger {
    /// Create an empty ledger (all devices `Unverified`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trust decision for a device.
    pub fn set_trust(&self, device: DeviceId, state: TrustState) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(device, state);
    }

    /// Look up the trust state of a device, defaulting to `Unverified`.
    pub fn get_trust(&self, device: &DeviceId) -> TrustState {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(device).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_device_defaults_to_unverified() {
        let ledger = TrustLedger::new();
        assert_eq!(ledger.get_trust(&DeviceId::from("nobody")), TrustState::Unverified);
    }

    #[test]
    fn set_then_get_roundtrips() {
        let ledger = TrustLedger::new();
        let device = DeviceId::from("alice-phone");

        ledger.set_trust(device.clone(), TrustState::Verified);
        assert_eq!(ledger.get_trust(&device), TrustState::Verified);

        ledger.set_trust(device.clone(), TrustState::Blocked);
        assert_eq!(ledger.get_trust(&device), TrustState::Blocked);
    }

    #[test]
    fn clones_share_state() {
        let ledger = TrustLedger::new();
        let clone = ledger.clone();
        let device = DeviceId::from("bob-laptop");

        ledger.set_trust(device.clone(), TrustState::Blocked);
        assert_eq!(clone.get_trust(&device), TrustState::Blocked);
    }
}
