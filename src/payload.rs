//! Registration payloads and their validation (spec §3, §4.4).

use realm_zonedata::{AddressEntry, AddressKind, PayloadKind};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::ledger::Utxo;
use crate::pubkey::PublicKey;

/// A registration submitted by a client, before signature verification.
///
/// Serializes/deserializes as `{public_key, seq, addresses, ttl}`, the shape
/// exchanged over the Application API (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub public_key: PublicKey,
    /// Monotonic per-key sequence number; a write is rejected unless it is
    /// at least as new as any previously-stored sequence.
    pub seq: u64,
    /// Non-empty list of address URIs, e.g. `agora://1.2.3.4:2826`.
    pub addresses: Vec<String>,
    /// Record TTL hint in seconds.
    pub ttl: u32,
}

/// The out-of-band signature accompanying a [`RegistrationPayload`],
/// verified against `(public_key, seq, addresses)` by the external
/// cryptographic verifier (spec §1 "out of scope").
#[derive(Clone, Debug, Default)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A flash node's channel descriptor, validated against the ledger's block
/// at `height` (spec §3).
#[derive(Clone, Debug)]
pub struct KnownChannel {
    pub height: u64,
    pub conf: u32,
}

/// The internal pairing of a registration with its derived DNS kind and
/// on-chain UTXO reference (spec §3).
#[derive(Clone, Debug)]
pub struct TypedPayload {
    pub kind: PayloadKind,
    pub payload: RegistrationPayload,
    pub utxo: Option<Utxo>,
}

/// Extract the host component of a `scheme://host[:port][/path]` URI.
///
/// Handles the bracketed form (`[::1]:2826`) RFC 3986 requires for literal
/// IPv6 hosts.
pub fn uri_host(uri: &str) -> Option<&str> {
    let after_scheme = uri.split("://").nth(1)?;
    let host = if let Some(rest) = after_scheme.strip_prefix('[') {
        &rest[..rest.find(']')?]
    } else {
        after_scheme.split(['/', ':']).next()?
    };
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Validate a registration, per spec §4.4.
///
/// Returns the classified addresses and the dominant (last-seen, per spec
/// §9's open question) address kind used as `TypedPayload.kind`.
pub fn ensure_valid_payload(
    new: &RegistrationPayload,
    previous: Option<&RegistrationPayload>,
) -> RegistryResult<(PayloadKind, Vec<AddressEntry>)> {
    if let Some(previous) = previous {
        if previous.seq > new.seq {
            return Err(RegistryError::StaleWrite);
        }
    }

    if new.addresses.is_empty() {
        return Err(RegistryError::AddressMalformed);
    }

    let mut classified = Vec::with_capacity(new.addresses.len());
    let mut dominant = None;
    for uri in &new.addresses {
        let host = uri_host(uri).ok_or(RegistryError::AddressMalformed)?;
        let kind = AddressKind::classify(host);
        dominant = Some(kind);
        classified.push(AddressEntry {
            kind,
            host: host.to_owned(),
            uri: uri.clone(),
        });
    }

    let has_cname = classified.iter().any(|a| a.kind == AddressKind::Cname);
    if has_cname && classified.len() != 1 {
        return Err(RegistryError::AddressMalformed);
    }

    // `dominant` is set iff `classified` is non-empty, which holds because
    // `new.addresses` was checked non-empty above.
    Ok((dominant.unwrap().into(), classified))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PublicKey {
        PublicKey::parse(&"a".repeat(59)).unwrap()
    }

    #[test]
    fn accepts_first_registration() {
        let payload = RegistrationPayload {
            public_key: key(),
            seq: 1,
            addresses: vec!["agora://1.2.3.4:2826".into()],
            ttl: 60,
        };
        let (kind, addrs) = ensure_valid_payload(&payload, None).unwrap();
        assert_eq!(kind, PayloadKind::A);
        assert_eq!(addrs.len(), 1);
    }

    #[test]
    fn rejects_stale_write() {
        let previous = RegistrationPayload {
            public_key: key(),
            seq: 5,
            addresses: vec!["agora://1.2.3.4:2826".into()],
            ttl: 60,
        };
        let new = RegistrationPayload { seq: 4, ..previous.clone() };
        assert!(matches!(
            ensure_valid_payload(&new, Some(&previous)),
            Err(RegistryError::StaleWrite)
        ));
    }

    #[test]
    fn rejects_cname_mixed_with_other_addresses() {
        let payload = RegistrationPayload {
            public_key: key(),
            seq: 1,
            addresses: vec!["agora://node.example:2826".into(), "agora://1.2.3.4:2826".into()],
            ttl: 60,
        };
        assert!(ensure_valid_payload(&payload, None).is_err());
    }

    #[test]
    fn dominant_kind_is_last_seen() {
        let payload = RegistrationPayload {
            public_key: key(),
            seq: 1,
            addresses: vec!["agora://1.2.3.4:2826".into(), "agora://[::1]:2826".into()],
            ttl: 60,
        };
        let (kind, _) = ensure_valid_payload(&payload, None).unwrap();
        assert_eq!(kind, PayloadKind::Aaaa);
    }
}
