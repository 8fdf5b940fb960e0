//! # Attest Testkit
//!
//! Shared fixtures, a scriptable federation client, and proptest
//! strategies for the attest ledger crates. Test-only; never a
//! dependency of production code.

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    seed_chain, single_peer_registry, test_keypair, ScriptedClient, ScriptedReply,
};
