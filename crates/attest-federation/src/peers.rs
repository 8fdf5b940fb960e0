//! The peer registry: static federation configuration.
//!
//! Peer entries come from externally supplied configuration. Loading is
//! fail-fast: duplicate ids or incomplete entries abort the load rather
//! than producing a registry that silently drops peers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use attest_core::Ed25519PublicKey;

/// Identifier of a federation peer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One configured peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    pub url: String,
    /// The key the peer signs its manifests with.
    pub pubkey: Ed25519PublicKey,
    pub enabled: bool,
}

/// Peer registry load failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate peer id: {0}")]
    DuplicatePeer(String),

    #[error("peer {0} has an empty {1}")]
    IncompleteEntry(String, &'static str),
}

/// The loaded peer directory.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, PeerRecord>,
}

impl PeerRegistry {
    /// Load a registry from configuration entries. Fail-fast.
    pub fn load(entries: Vec<PeerRecord>) -> Result<Self, RegistryError> {
        let mut peers = HashMap::with_capacity(entries.len());
        for entry in entries {
            if entry.id.as_str().is_empty() {
                return Err(RegistryError::IncompleteEntry(
                    entry.url.clone(),
                    "id",
                ));
            }
            if entry.url.is_empty() {
                return Err(RegistryError::IncompleteEntry(
                    entry.id.as_str().to_string(),
                    "url",
                ));
            }
            if peers.insert(entry.id.clone(), entry.clone()).is_some() {
                return Err(RegistryError::DuplicatePeer(entry.id.as_str().to_string()));
            }
        }
        Ok(Self { peers })
    }

    /// Look up a peer by id.
    pub fn get(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(id)
    }

    /// All enabled peers, in unspecified order.
    pub fn enabled(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values().filter(|p| p.enabled)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
