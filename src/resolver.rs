//! Upstream resolver (spec §4.1 component C2, "out of scope" — consumed as
//! a narrow interface).
//!
//! Secondary zones poll this for SOA and AXFR; caching zones poll it for
//! on-demand record lookups. [`DgramUpstreamResolver`] issues real queries
//! over UDP (retrying over TCP on truncation); [`FakeResolver`] is an
//! in-memory substitute for tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use domain::base::iana::Rcode;
use domain::base::message_builder::MessageBuilder;
use domain::base::name::ToName;
use domain::base::{Message, Rtype, Ttl};
use domain::rdata::AllRecordData;
use realm_zonedata::{RData, Rr, StoredName};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use crate::error::{RegistryError, RegistryResult};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Issues DNS queries to configured peers; returns decoded answer sets
/// (spec §4.1 component C2).
#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    async fn query_soa(&self, server: &str, zone: &StoredName) -> RegistryResult<Rr>;
    async fn query_axfr(&self, server: &str, zone: &StoredName) -> RegistryResult<Vec<Rr>>;
    async fn query(&self, server: &str, name: &StoredName, rtype: Rtype) -> RegistryResult<Vec<Rr>>;
}

/// Queries real upstream servers over UDP, with a TCP retry when the
/// answer comes back truncated.
pub struct DgramUpstreamResolver;

impl DgramUpstreamResolver {
    pub fn new() -> Self {
        Self
    }

    async fn ask(&self, server: &str, name: &StoredName, rtype: Rtype) -> RegistryResult<Vec<u8>> {
        let addr: SocketAddr = server
            .parse()
            .map_err(|_| RegistryError::Upstream(format!("invalid upstream address: {server}")))?;

        let mut builder = MessageBuilder::from_target(BytesMut::new())
            .map_err(|_| RegistryError::Upstream("failed to build query".into()))?
            .question();
        builder
            .push((name, rtype))
            .map_err(|_| RegistryError::Upstream("failed to build question".into()))?;
        let query = builder.finish();

        let sock = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| RegistryError::Upstream(e.to_string()))?;
        sock.connect(addr).await.map_err(|e| RegistryError::Upstream(e.to_string()))?;
        timeout(QUERY_TIMEOUT, sock.send(&query))
            .await
            .map_err(|_| RegistryError::Upstream("timed out sending query".into()))?
            .map_err(|e| RegistryError::Upstream(e.to_string()))?;

        let mut buf = vec![0u8; 4096];
        let n = timeout(QUERY_TIMEOUT, sock.recv(&mut buf))
            .await
            .map_err(|_| RegistryError::Upstream("timed out awaiting reply".into()))?
            .map_err(|e| RegistryError::Upstream(e.to_string()))?;
        buf.truncate(n);

        let msg = Message::from_octets(buf.clone())
            .map_err(|_| RegistryError::Upstream("malformed reply".into()))?;
        if msg.header().tc() {
            return self.ask_tcp(addr, &query).await;
        }
        if msg.header().rcode() != Rcode::NOERROR {
            return Err(RegistryError::Upstream(format!("upstream rcode {}", msg.header().rcode())));
        }
        Ok(buf)
    }

    async fn ask_tcp(&self, addr: SocketAddr, query: &[u8]) -> RegistryResult<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = timeout(QUERY_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| RegistryError::Upstream("timed out connecting over tcp".into()))?
            .map_err(|e| RegistryError::Upstream(e.to_string()))?;

        let len = (query.len() as u16).to_be_bytes();
        stream.write_all(&len).await.map_err(|e| RegistryError::Upstream(e.to_string()))?;
        stream.write_all(query).await.map_err(|e| RegistryError::Upstream(e.to_string()))?;

        let mut len_buf = [0u8; 2];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| RegistryError::Upstream(e.to_string()))?;
        let reply_len = u16::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; reply_len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| RegistryError::Upstream(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, raw: &[u8]) -> RegistryResult<Vec<Rr>> {
        let msg = Message::from_octets(raw.to_vec())
            .map_err(|_| RegistryError::Upstream("malformed reply".into()))?;
        let mut out = Vec::new();
        let section = msg
            .answer()
            .map_err(|_| RegistryError::Upstream("malformed answer section".into()))?;
        for record in section {
            let record = record.map_err(|_| RegistryError::Upstream("malformed record".into()))?;
            let owner = record.owner().to_name::<StoredName>();
            let ttl = record.ttl();
            let Ok(record) = record.into_record::<AllRecordData<_, _>>() else {
                continue;
            };
            let Some(record) = record else { continue };
            let data = match record.data() {
                AllRecordData::A(a) => RData::A(*a),
                AllRecordData::Aaaa(aaaa) => RData::Aaaa(*aaaa),
                AllRecordData::Cname(cname) => RData::Cname(cname.clone().flatten_into()),
                AllRecordData::Uri(uri) => RData::Uri(uri.clone().flatten_into()),
                AllRecordData::Soa(soa) => RData::Soa(soa.clone().flatten_into()),
                AllRecordData::Ns(ns) => RData::Ns(ns.clone().flatten_into()),
                _ => continue,
            };
            out.push(Rr { owner, ttl, data });
        }
        Ok(out)
    }
}

impl Default for DgramUpstreamResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamResolver for DgramUpstreamResolver {
    async fn query_soa(&self, server: &str, zone: &StoredName) -> RegistryResult<Rr> {
        let raw = self.ask(server, zone, Rtype::SOA).await?;
        let rrs = self.decode(&raw)?;
        rrs.into_iter()
            .find(|rr| matches!(rr.data, RData::Soa(_)))
            .ok_or_else(|| RegistryError::Upstream("no SOA in reply".into()))
    }

    async fn query_axfr(&self, server: &str, zone: &StoredName) -> RegistryResult<Vec<Rr>> {
        // AXFR replies are large and multi-message in the general case; the
        // single-datagram path above covers the common small-zone case used
        // in this registry. A production deployment would drive this over
        // a persistent TCP stream instead.
        let raw = self.ask(server, zone, Rtype::AXFR).await?;
        self.decode(&raw)
    }

    async fn query(&self, server: &str, name: &StoredName, rtype: Rtype) -> RegistryResult<Vec<Rr>> {
        let raw = self.ask(server, name, rtype).await?;
        self.decode(&raw)
    }
}

//----------- in-memory fake, for tests --------------------------------------------

/// An in-memory [`UpstreamResolver`] for tests: a fixed table of
/// `server -> (name, rtype) -> records`, settable by test code, with a SOA
/// record kept separately so `query_soa` can be driven independent of the
/// other records.
#[derive(Default)]
pub struct FakeResolver {
    records: Mutex<HashMap<(String, String, Rtype), Vec<Rr>>>,
    soa: Mutex<HashMap<(String, String), Rr>>,
    unreachable: Mutex<bool>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_soa(&self, server: &str, zone: &StoredName, soa: Rr) {
        self.soa.lock().unwrap().insert((server.to_owned(), zone.to_string()), soa);
    }

    pub fn set_records(&self, server: &str, name: &StoredName, rtype: Rtype, rrs: Vec<Rr>) {
        self.records
            .lock()
            .unwrap()
            .insert((server.to_owned(), name.to_string(), rtype), rrs);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    fn check_reachable(&self) -> RegistryResult<()> {
        if *self.unreachable.lock().unwrap() {
            Err(RegistryError::Upstream("fake resolver is unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UpstreamResolver for FakeResolver {
    async fn query_soa(&self, server: &str, zone: &StoredName) -> RegistryResult<Rr> {
        self.check_reachable()?;
        self.soa
            .lock()
            .unwrap()
            .get(&(server.to_owned(), zone.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::Upstream("no SOA configured in fake resolver".into()))
    }

    async fn query_axfr(&self, server: &str, zone: &StoredName) -> RegistryResult<Vec<Rr>> {
        self.check_reachable()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(server.to_owned(), zone.to_string(), Rtype::AXFR))
            .cloned()
            .unwrap_or_default())
    }

    async fn query(&self, server: &str, name: &StoredName, rtype: Rtype) -> RegistryResult<Vec<Rr>> {
        self.check_reachable()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(server.to_owned(), name.to_string(), rtype))
            .cloned()
            .unwrap_or_default())
    }
}

/// `Ttl`-related helper: the floor spec §4.2 applies to rearmed refresh
/// timers, expressed here so `zone/mod.rs` doesn't need to import `Ttl`
/// just for this one conversion.
pub fn ttl_to_duration(ttl: Ttl) -> Duration {
    Duration::from_secs(ttl.as_secs() as u64)
}
