//! Pending key request correlation
//!
//! The encryption hook only sees a string map, so key creation parameters are
//! parked here under a fresh token and the token rides in the materials
//! description instead.
//!
//! Entries whose token is never consumed (the object store call failed before
//! reaching the hook) stay until the process exits.

use dashmap::DashMap;
use ionic_s3_core::KeyParams;
use uuid::Uuid;

/// Token to key parameters, consumed exactly once
#[derive(Debug, Default)]
pub struct PendingRequestCorrelator {
    pending: DashMap<String, KeyParams>,
}

impl PendingRequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park key parameters and return the token identifying them
    pub fn store(&self, params: KeyParams) -> String {
        let token = Uuid::new_v4().to_string();
        self.pending.insert(token.clone(), params);
        token
    }

    /// Remove and return the parameters behind `token`
    pub fn take(&self, token: &str) -> Option<KeyParams> {
        self.pending.remove(token).map(|(_, params)| params)
    }

    /// Number of tokens not yet consumed
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
