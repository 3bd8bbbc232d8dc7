//! DNS resource-record projection for registered validator/flash-node payloads.
//!
//! This crate turns a registration's address list into the resource records
//! an authoritative zone serves for it, and reconstructs an approximation of
//! that address list from a fetched `URI` RRset. It knows nothing about
//! signatures, storage, or the network — it is a pure data-shape crate kept
//! separate from the binary so the projection logic can be tested and
//! reused without pulling in the store or transport layers.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use bytes::Bytes;
use domain::base::{Name, Rtype, ToName, Ttl};
use domain::rdata::{Aaaa, Cname, Ns, Soa, Uri, A};
use serde::{Deserialize, Serialize};

pub type StoredName = Name<Bytes>;

/// The two labels prepended to a pubkey label when serving its `URI`
/// record, per RFC 7553's SRV-style naming convention.
pub const URI_SERVICE_LABEL_FIRST: &str = "_agora";
pub const URI_SERVICE_LABEL_SECOND: &str = "_tcp";

/// The service label prepended to a pubkey label when serving its `URI`
/// record, per RFC 7553's SRV-style naming convention.
pub const URI_SERVICE_LABEL: &str = "_agora._tcp";

//----------- AddressKind -------------------------------------------------------

/// The DNS-visible kind of a single registered address, derived from its
/// host component.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AddressKind {
    A,
    Aaaa,
    Cname,
}

impl AddressKind {
    /// Classify the host component of a registered address.
    ///
    /// An IPv4 literal becomes `A`, an IPv6 literal becomes `AAAA`, and
    /// anything else (a hostname) becomes `CNAME`.
    pub fn classify(host: &str) -> AddressKind {
        if host.parse::<Ipv4Addr>().is_ok() {
            AddressKind::A
        } else if host.parse::<Ipv6Addr>().is_ok() {
            AddressKind::Aaaa
        } else {
            AddressKind::Cname
        }
    }

    pub fn rtype(self) -> Rtype {
        match self {
            AddressKind::A => Rtype::A,
            AddressKind::Aaaa => Rtype::AAAA,
            AddressKind::Cname => Rtype::CNAME,
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressKind::A => "A",
            AddressKind::Aaaa => "AAAA",
            AddressKind::Cname => "CNAME",
        })
    }
}

//----------- PayloadKind --------------------------------------------------------

/// `TypedPayload.kind`.
///
/// Normally one of the three address kinds, classified from the dominant
/// (last-seen, see spec §9) address in a registration. [`PayloadKind::Uri`]
/// is a fourth, reconstruction-only value: see [`make`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PayloadKind {
    A,
    Aaaa,
    Cname,
    Uri,
}

impl From<AddressKind> for PayloadKind {
    fn from(kind: AddressKind) -> Self {
        match kind {
            AddressKind::A => PayloadKind::A,
            AddressKind::Aaaa => PayloadKind::Aaaa,
            AddressKind::Cname => PayloadKind::Cname,
        }
    }
}

//----------- AddressEntry -------------------------------------------------------

/// One registered address, already classified and split into its host and
/// full URI form.
#[derive(Clone, Debug)]
pub struct AddressEntry {
    pub kind: AddressKind,
    pub host: String,
    pub uri: String,
}

//----------- Rr / RData ---------------------------------------------------------

/// A resource record as served by the zone engine.
///
/// This is a deliberately small, closed representation — only the record
/// types this registry ever emits — rather than `domain`'s fully generic
/// zone record data, since the store and the answer logic only ever need to
/// construct these few shapes.
#[derive(Clone, Debug)]
pub struct Rr {
    pub owner: StoredName,
    pub ttl: Ttl,
    pub data: RData,
}

#[derive(Clone, Debug)]
pub enum RData {
    A(A),
    Aaaa(Aaaa),
    Cname(Cname<StoredName>),
    Uri(Uri<Bytes>),
    Soa(Soa<StoredName>),
    Ns(Ns<StoredName>),
}

impl Rr {
    pub fn rtype(&self) -> Rtype {
        match &self.data {
            RData::A(_) => Rtype::A,
            RData::Aaaa(_) => Rtype::AAAA,
            RData::Cname(_) => Rtype::CNAME,
            RData::Uri(_) => Rtype::URI,
            RData::Soa(_) => Rtype::SOA,
            RData::Ns(_) => Rtype::NS,
        }
    }

    pub fn soa(owner: StoredName, ttl: Ttl, soa: Soa<StoredName>) -> Rr {
        Rr {
            owner,
            ttl,
            data: RData::Soa(soa),
        }
    }

    pub fn ns(owner: StoredName, ttl: Ttl, target: StoredName) -> Rr {
        Rr {
            owner,
            ttl,
            data: RData::Ns(Ns::new(target)),
        }
    }
}

//----------- errors --------------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProjectionError {
    /// A host component did not parse as the address kind it was classified
    /// as (should not happen if [`AddressKind::classify`] was used).
    InvalidHost,
    /// A `CNAME` address co-occurred with other addresses.
    CnameMixedWithOthers,
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProjectionError::InvalidHost => "a registered address's host did not parse",
            ProjectionError::CnameMixedWithOthers => {
                "a CNAME address cannot coexist with other addresses"
            }
        })
    }
}

//----------- to_rr / make --------------------------------------------------------

/// Prepend the `_agora._tcp` service label to a pubkey's owner name.
pub fn uri_owner_name(name: &StoredName) -> StoredName {
    StoredName::bytes_from_str(&format!("{URI_SERVICE_LABEL}.{name}"))
        .expect("a valid owner name with a short label prepended is still valid")
}

/// Project a registration's addresses into the records served at `name`.
///
/// Per spec §4.7: a lone `CNAME` address yields a `CNAME` record at `name`
/// plus one `URI` record at `_agora._tcp.name`; any other mix of `A`/`AAAA`
/// addresses yields one address record per entry at `name`, each paired with
/// its own `URI` record.
pub fn to_rr(name: &StoredName, addresses: &[AddressEntry], ttl: Ttl) -> Result<Vec<Rr>, ProjectionError> {
    let uri_name = uri_owner_name(name);

    if let [only] = addresses {
        if only.kind == AddressKind::Cname {
            let target = StoredName::bytes_from_str(&only.host).map_err(|_| ProjectionError::InvalidHost)?;
            return Ok(vec![
                Rr {
                    owner: name.clone(),
                    ttl,
                    data: RData::Cname(Cname::new(target)),
                },
                Rr {
                    owner: uri_name,
                    ttl,
                    data: RData::Uri(Uri::new(1, 1, only.uri.as_bytes().into())),
                },
            ]);
        }
    }

    let mut out = Vec::with_capacity(addresses.len() * 2);
    for addr in addresses {
        let data = match addr.kind {
            AddressKind::A => {
                let ip: Ipv4Addr = addr.host.parse().map_err(|_| ProjectionError::InvalidHost)?;
                RData::A(A::new(ip))
            }
            AddressKind::Aaaa => {
                let ip: Ipv6Addr = addr.host.parse().map_err(|_| ProjectionError::InvalidHost)?;
                RData::Aaaa(Aaaa::new(ip))
            }
            AddressKind::Cname => return Err(ProjectionError::CnameMixedWithOthers),
        };
        out.push(Rr {
            owner: name.clone(),
            ttl,
            data,
        });
        out.push(Rr {
            owner: uri_name.clone(),
            ttl,
            data: RData::Uri(Uri::new(1, 1, addr.uri.as_bytes().into())),
        });
    }
    Ok(out)
}

/// Reconstruct an approximate `TypedPayload` from a fetched `URI` RRset.
///
/// Used on the caching path (spec §4.3, `getAndCacheRecords`): the owner
/// name of each `URI` record is the pubkey's `_agora._tcp.{pubkey}.{zone}`
/// name, from which the bare pubkey-bearing name is recovered by stripping
/// the service label. Per spec §4.7 the reconstructed kind is always `Uri`,
/// not re-derived from the target host — the caching zone does not attempt
/// to recover the original `A`/`AAAA`/`CNAME` classification.
pub fn make(uri_rrs: &[Rr]) -> Option<(StoredName, Vec<AddressEntry>, PayloadKind)> {
    let mut name = None;
    let mut addresses = Vec::new();

    for rr in uri_rrs {
        let RData::Uri(uri) = &rr.data else {
            continue;
        };

        let owner_labels: Vec<_> = rr.owner.iter_labels().collect();
        let service_labels = StoredName::bytes_from_str(URI_SERVICE_LABEL).ok()?;
        let service_label_count = service_labels.iter_labels().count();
        if owner_labels.len() <= service_label_count {
            continue;
        }
        let pubkey_name = rr.owner.to_name::<StoredName>().ok().and_then(|n| {
            let mut iter = n.iter_suffixes();
            iter.nth(service_label_count)
        })?;

        name.get_or_insert_with(|| pubkey_name.clone());

        let uri_str = String::from_utf8_lossy(uri.target()).into_owned();
        let after_scheme = uri_str.split("://").nth(1).unwrap_or(&uri_str);
        let host = if let Some(rest) = after_scheme.strip_prefix('[') {
            rest.find(']').map(|end| &rest[..end]).unwrap_or(rest).to_string()
        } else {
            after_scheme.split(['/', ':']).next().unwrap_or("").to_string()
        };
        addresses.push(AddressEntry {
            kind: AddressKind::classify(&host),
            host,
            uri: uri_str,
        });
    }

    name.map(|name| (name, addresses, PayloadKind::Uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> StoredName {
        StoredName::bytes_from_str(s).unwrap()
    }

    #[test]
    fn classifies_ipv4_ipv6_and_hostnames() {
        assert_eq!(AddressKind::classify("1.2.3.4"), AddressKind::A);
        assert_eq!(AddressKind::classify("::1"), AddressKind::Aaaa);
        assert_eq!(AddressKind::classify("node.example"), AddressKind::Cname);
    }

    #[test]
    fn projects_a_addresses_with_uri_sibling() {
        let owner = name("k1.validators.realm");
        let addrs = vec![AddressEntry {
            kind: AddressKind::A,
            host: "1.2.3.4".into(),
            uri: "agora://1.2.3.4:2826".into(),
        }];
        let rrs = to_rr(&owner, &addrs, Ttl::from_secs(60)).unwrap();
        assert_eq!(rrs.len(), 2);
        assert_eq!(rrs[0].rtype(), Rtype::A);
        assert_eq!(rrs[1].rtype(), Rtype::URI);
        assert_eq!(rrs[1].owner, uri_owner_name(&owner));
    }

    #[test]
    fn projects_lone_cname_with_uri_sibling_only() {
        let owner = name("k1.validators.realm");
        let addrs = vec![AddressEntry {
            kind: AddressKind::Cname,
            host: "relay.example.".into(),
            uri: "agora://relay.example:2826".into(),
        }];
        let rrs = to_rr(&owner, &addrs, Ttl::from_secs(60)).unwrap();
        assert_eq!(rrs.len(), 2);
        assert_eq!(rrs[0].rtype(), Rtype::CNAME);
        assert_eq!(rrs[1].rtype(), Rtype::URI);
    }

    #[test]
    fn rejects_cname_mixed_with_other_addresses() {
        let owner = name("k1.validators.realm");
        let addrs = vec![
            AddressEntry {
                kind: AddressKind::Cname,
                host: "relay.example.".into(),
                uri: "agora://relay.example".into(),
            },
            AddressEntry {
                kind: AddressKind::A,
                host: "1.2.3.4".into(),
                uri: "agora://1.2.3.4".into(),
            },
        ];
        assert_eq!(
            to_rr(&owner, &addrs, Ttl::from_secs(60)),
            Err(ProjectionError::CnameMixedWithOthers)
        );
    }
}
