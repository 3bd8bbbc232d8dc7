//! The cryptographic signature verifier (spec §1, "out of scope").
//!
//! Consumed as a narrow interface: does `(public_key, seq, addresses)`
//! verify against `signature`? Expressed as a trait so the registry itself
//! carries no cryptographic dependency.

use crate::pubkey::PublicKey;

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &PublicKey, seq: u64, addresses: &[String], signature: &[u8]) -> bool;
}

/// A verifier that accepts everything. Used by tests, and as the
/// placeholder wiring in `main.rs` until a real verifier is plugged in.
pub struct AlwaysValid;

impl SignatureVerifier for AlwaysValid {
    fn verify(&self, _public_key: &PublicKey, _seq: u64, _addresses: &[String], _signature: &[u8]) -> bool {
        true
    }
}
