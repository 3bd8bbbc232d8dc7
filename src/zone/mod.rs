//! The zone engine (spec §4.2): per-zone role, SOA maintenance, AXFR
//! transfer, TTL eviction, and DNS answer logic.
//!
//! A zone's activity — serving a query, maintaining its SOA, transferring
//! or expiring its data — never interleaves with another activity on the
//! *same* zone (spec §5 "single-threaded cooperative"). This crate gets
//! that guarantee from a single `tokio::sync::Mutex` held for the duration
//! of each operation, rather than a hand-rolled actor loop: the two give
//! identical observable serialization, and the mutex is far less code.
//! Timers still fire through an mpsc channel into a small background task,
//! which is the piece that actually needs to run independently of any
//! caller.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::base::iana::Rcode;
use domain::base::Rtype;
use domain::rdata::Soa;
use realm_zonedata::{self as zonedata, AddressEntry, RData, Rr, StoredName};
use tokio::sync::{mpsc, Mutex};

use crate::config::ZoneConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::metrics::{MetricsCollection, TransferOutcome};
use crate::payload::TypedPayload;
use crate::pubkey::PublicKey;
use crate::resolver::{ttl_to_duration, UpstreamResolver};
use crate::store::{AddressRow, Store, ZoneTag};
use crate::timer::Timer;

pub fn now_unix() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as u32
}

//----------- ZoneRole --------------------------------------------------------------

/// A zone's role, derived once at construction from its configuration
/// (spec §4.2).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ZoneRole {
    Primary,
    Secondary,
    Caching,
}

impl ZoneRole {
    pub fn derive(config: &ZoneConfig) -> ZoneRole {
        if config.authoritative && config.soa.email.is_some() {
            ZoneRole::Primary
        } else if config.authoritative {
            ZoneRole::Secondary
        } else {
            ZoneRole::Caching
        }
    }
}

//----------- answer outcome ---------------------------------------------------------

/// The result of answering one question against one zone (spec §4.6).
pub struct Answer {
    pub rcode: Rcode,
    pub aa: bool,
    pub ra: bool,
    pub answers: Vec<Rr>,
    pub authorities: Vec<Rr>,
}

impl Answer {
    fn refused(aa: bool, ra: bool) -> Answer {
        Answer {
            rcode: Rcode::REFUSED,
            aa,
            ra,
            answers: Vec::new(),
            authorities: Vec::new(),
        }
    }
}

//----------- Zone ---------------------------------------------------------------------

struct ZoneState {
    role: ZoneRole,
    soa: Soa<StoredName>,
    config: ZoneConfig,
}

pub struct Zone {
    pub tag: ZoneTag,
    pub root: StoredName,
    inner: Mutex<ZoneState>,
    store: Store,
    resolver: Arc<dyn UpstreamResolver>,
    soa_timer: Timer,
    expire_timer: Timer,
    metrics: Arc<MetricsCollection>,
}

impl Zone {
    /// Construct a zone and spawn the background task that drives its
    /// timers. The zone itself does not start SOA maintenance until
    /// [`Zone::start`] is called.
    pub fn new(
        tag: ZoneTag,
        root: StoredName,
        config: ZoneConfig,
        store: Store,
        resolver: Arc<dyn UpstreamResolver>,
        metrics: Arc<MetricsCollection>,
    ) -> Arc<Zone> {
        let role = ZoneRole::derive(&config);
        let soa = seed_soa(&root, &config, role);
        let (fire_tx, fire_rx) = mpsc::channel(8);

        let zone = Arc::new(Zone {
            tag,
            root,
            inner: Mutex::new(ZoneState { role, soa, config }),
            store,
            resolver,
            soa_timer: Timer::new("soa", fire_tx.clone()),
            expire_timer: Timer::new("expire", fire_tx),
            metrics,
        });

        spawn_timer_loop(zone.clone(), fire_rx);
        zone
    }

    pub async fn role(&self) -> ZoneRole {
        self.inner.lock().await.role
    }

    /// Whether `soa_update_timer` currently has a pending schedule (spec
    /// §4.3's block hook: a secondary re-runs `updateSOA` immediately,
    /// modelling a DNS NOTIFY, only if a refresh is already pending).
    pub fn soa_timer_pending(&self) -> bool {
        self.soa_timer.pending()
    }

    pub fn stop_soa_timer(&self) {
        self.soa_timer.stop();
    }

    /// Start-up behaviour per spec §4.2.
    pub async fn start(self: &Arc<Self>) {
        let (role, expire) = {
            let state = self.inner.lock().await;
            (state.role, state.config.soa.expire)
        };
        match role {
            ZoneRole::Primary => {}
            ZoneRole::Secondary => {
                self.expire_timer.rearm_floored(expire);
                self.soa_timer.rearm(Duration::ZERO);
            }
            ZoneRole::Caching => {
                if let Ok(Some(expires)) = self.store.earliest_expiry(self.tag).await {
                    let remaining = (expires - now_unix() as i64).max(0) as u64;
                    self.expire_timer.rearm(Duration::from_secs(remaining));
                }
                self.soa_timer.rearm(Duration::ZERO);
            }
        }
    }

    /// SOA maintenance (spec §4.2 `updateSOA`).
    pub async fn update_soa(self: &Arc<Self>) {
        let (role, server, retry, refresh, cur_serial) = {
            let state = self.inner.lock().await;
            (
                state.role,
                state.config.query_servers.first().cloned(),
                state.config.soa.retry,
                state.config.soa.refresh,
                state.soa.serial(),
            )
        };

        match role {
            ZoneRole::Primary => {
                let mut state = self.inner.lock().await;
                let next = std::cmp::max(now_unix(), state.soa.serial().into_int().wrapping_add(1));
                bump_serial(&mut state.soa, next);
                self.metrics.set_zone_serial(self.tag, next);
            }
            ZoneRole::Secondary | ZoneRole::Caching => {
                let Some(server) = server else {
                    tracing::warn!(zone = %self.root, "no query servers configured");
                    return;
                };
                match self.resolver.query_soa(&server, &self.root).await {
                    Err(err) => {
                        tracing::warn!(zone = %self.root, %err, "SOA query failed");
                        self.soa_timer.rearm_floored(retry);
                        if role == ZoneRole::Secondary {
                            let expire = self.inner.lock().await.config.soa.expire;
                            self.expire_timer.rearm_floored(expire);
                        }
                    }
                    Ok(rr) => {
                        let RData::Soa(new_soa) = rr.data else {
                            tracing::warn!(zone = %self.root, "SOA reply carried non-SOA data");
                            return;
                        };
                        let bumped = new_soa.serial() > cur_serial;
                        if bumped {
                            self.metrics.set_zone_serial(self.tag, new_soa.serial().into_int());
                            self.inner.lock().await.soa = new_soa;
                        }
                        if bumped && role == ZoneRole::Secondary {
                            self.axfr_transfer(&server).await;
                        }
                        let rearm = if role == ZoneRole::Secondary {
                            refresh
                        } else {
                            ttl_to_duration(rr.ttl)
                        };
                        self.soa_timer.rearm_floored(rearm);
                        if role == ZoneRole::Secondary {
                            self.expire_timer.stop();
                        }
                    }
                }
            }
        }
    }

    /// AXFR transfer (spec §4.2, secondary only).
    async fn axfr_transfer(&self, server: &str) {
        let outcome = match self.resolver.query_axfr(server, &self.root).await {
            Ok(rrs) => match self.replace_all(rrs).await {
                Ok(()) => TransferOutcome::Success,
                Err(err) => {
                    tracing::warn!(zone = %self.root, %err, "AXFR import failed");
                    TransferOutcome::Failure
                }
            },
            Err(err) => {
                tracing::warn!(zone = %self.root, %err, "AXFR query failed");
                TransferOutcome::Failure
            }
        };
        self.metrics.observe_axfr(self.tag, outcome);
    }

    /// `clear-all -> insert-all`, atomic with respect to readers because no
    /// suspension point separates the two (spec §4.2/§5).
    async fn replace_all(&self, rrs: Vec<Rr>) -> RegistryResult<()> {
        let grouped = group_by_pubkey(&self.root, &rrs);
        self.store.clear_addresses(self.tag).await?;
        for (pubkey, rows) in grouped {
            self.store.put_addresses(self.tag, &pubkey, &rows).await?;
        }
        Ok(())
    }

    /// `disable` (spec §4.2, secondary only): wipe addresses so lookups
    /// return `NameError`; the SOA pull timer keeps running so the zone
    /// can recover.
    pub async fn on_expire(&self) {
        let role = self.inner.lock().await.role;
        if role != ZoneRole::Secondary {
            return;
        }
        if let Err(err) = self.store.clear_addresses(self.tag).await {
            tracing::warn!(zone = %self.root, %err, "failed to disable zone on expiry");
        }
    }

    /// `updateTTLExpired` (spec §4.2, caching only).
    pub async fn ttl_sweep(&self) {
        let server = {
            let state = self.inner.lock().await;
            state.config.query_servers.first().cloned()
        };
        let Some(server) = server else { return };

        let expired = match self.store.get_expired(self.tag, now_unix() as i64).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(zone = %self.root, %err, "failed to read expired rows");
                return;
            }
        };

        let mut by_pubkey: std::collections::BTreeMap<String, Vec<Rtype>> = std::collections::BTreeMap::new();
        for row in expired {
            by_pubkey.entry(row.pubkey).or_default().push(row.rtype);
        }

        for (pubkey, rtypes) in by_pubkey {
            let name = match owner_name_for(&self.root, &pubkey) {
                Some(name) => name,
                None => continue,
            };
            let mut fresh = Vec::new();
            for rtype in rtypes {
                match self.resolver.query(&server, &name, rtype).await {
                    Ok(rrs) => fresh.extend(rrs),
                    Err(err) => tracing::warn!(zone = %self.root, %err, "TTL refresh query failed"),
                }
            }
            if fresh.is_empty() {
                let _ = self.store.delete_pubkey(self.tag, &pubkey).await;
                self.metrics.observe_ttl_eviction();
            } else {
                let ttl = fresh[0].ttl;
                let expires = now_unix() as i64 + ttl.as_secs() as i64;
                let rows = rrs_to_address_rows(&pubkey, &fresh, expires);
                let _ = self.store.put_addresses(self.tag, &pubkey, &rows).await;
            }
        }

        if let Ok(Some(expires)) = self.store.earliest_expiry(self.tag).await {
            let remaining = (expires - now_unix() as i64).max(0) as u64;
            self.expire_timer.rearm(Duration::from_secs(remaining));
        }
    }

    /// Look up a payload's addresses on demand and cache them (spec §4.3
    /// `getAndCacheRecords`). Caching zones only.
    ///
    /// Per spec §4.7, reconstruction works from the canonical `URI` RRset
    /// rather than the requested qtype directly: `zonedata::make` recovers
    /// the pubkey-bearing owner name and the full address list from it,
    /// and `zonedata::to_rr` reprojects that into the complete record set,
    /// which is what gets cached and re-served from.
    ///
    /// Per spec §9's open question, this installs the fetched records with
    /// no signature check: the caching zone trusts its configured upstream
    /// implicitly. This is a deliberately preserved trust boundary, not an
    /// oversight — callers should authenticate the upstream transport if
    /// that trust is unwarranted for their deployment.
    async fn get_and_cache_records(&self, name: &StoredName, rtype: Rtype) -> RegistryResult<Vec<Rr>> {
        let server = {
            let state = self.inner.lock().await;
            state.config.query_servers.first().cloned()
        };
        let Some(server) = server else {
            return Ok(Vec::new());
        };

        let uri_name = zonedata::uri_owner_name(name);
        let uri_rrs = self.resolver.query(&server, &uri_name, Rtype::URI).await?;
        if uri_rrs.is_empty() {
            return Ok(Vec::new());
        }
        let Some((owner, addresses, _kind)) = zonedata::make(&uri_rrs) else {
            return Ok(Vec::new());
        };
        let Some(pubkey) = pubkey_label(&self.root, &owner) else {
            return Ok(Vec::new());
        };

        let ttl = uri_rrs[0].ttl;
        let projected = zonedata::to_rr(&owner, &addresses, ttl).map_err(|_| RegistryError::AddressMalformed)?;
        let expires = now_unix() as i64 + ttl.as_secs() as i64;
        let rows = rrs_to_address_rows(pubkey.as_bare(), &projected, expires);
        self.store.put_addresses(self.tag, pubkey.as_bare(), &rows).await?;

        Ok(projected.into_iter().filter(|rr| rr.rtype() == rtype).collect())
    }

    /// Write (or overwrite) a pubkey's addresses directly — used by
    /// `registerValidator`/`registerFlashNode` on a primary, and by the
    /// secondary/caching `update` path (spec §4.8 step 4: "Store
    /// TypedPayload{kind, payload, utxo}; bump SOA").
    ///
    /// `addresses` is the already-classified, already-validated form of
    /// `typed.payload.addresses` (spec §4.4's `ensure_valid_payload`
    /// output); `typed` itself carries the dominant kind and the optional
    /// stake UTXO alongside the raw payload.
    pub async fn store_payload(&self, typed: &TypedPayload, addresses: &[AddressEntry]) -> RegistryResult<()> {
        let pubkey = &typed.payload.public_key;
        tracing::debug!(zone = %self.root, %pubkey, kind = ?typed.kind, "storing payload");

        let owner = owner_name_for(&self.root, pubkey.as_bare()).ok_or(RegistryError::Internal("bad owner name".into()))?;
        let domain_ttl = domain::base::Ttl::from_secs(typed.payload.ttl);
        let rrs = zonedata::to_rr(&owner, addresses, domain_ttl).map_err(|_| RegistryError::AddressMalformed)?;

        let role = self.inner.lock().await.role;
        let expires = if role == ZoneRole::Caching { now_unix() as i64 + typed.payload.ttl as i64 } else { 0 };
        let rows = rrs_to_address_rows(pubkey.as_bare(), &rrs, expires);
        self.store.put_addresses(self.tag, pubkey.as_bare(), &rows).await?;

        if let Some(utxo) = &typed.utxo {
            self.store.put_utxo(self.tag, pubkey.as_bare(), typed.payload.seq, &utxo.0).await?;
        }

        if role == ZoneRole::Primary {
            self.bump_serial_on_write().await;
        }
        Ok(())
    }

    pub async fn remove_payload(&self, pubkey: &PublicKey) -> RegistryResult<()> {
        self.store.delete_pubkey(self.tag, pubkey.as_bare()).await?;
        if self.inner.lock().await.role == ZoneRole::Primary {
            self.bump_serial_on_write().await;
        }
        Ok(())
    }

    async fn bump_serial_on_write(&self) {
        let mut state = self.inner.lock().await;
        let next = std::cmp::max(now_unix(), state.soa.serial().into_int().wrapping_add(1));
        bump_serial(&mut state.soa, next.into());
        self.metrics.set_zone_serial(self.tag, next);
    }

    pub async fn get_payload_addresses(&self, pubkey: &str) -> RegistryResult<Vec<AddressRow>> {
        self.store.get_addresses(self.tag, pubkey).await
    }

    pub async fn get_utxo(&self, pubkey: &str) -> RegistryResult<Option<(u64, String)>> {
        self.store.get_utxo(self.tag, pubkey).await
    }

    pub async fn list_utxo_pubkeys(&self) -> RegistryResult<Vec<(String, String)>> {
        self.store.list_utxo_pubkeys(self.tag).await
    }

    /// Full-zone enumeration for AXFR (spec §4.2 "Enumeration").
    pub async fn enumerate(&self) -> RegistryResult<Vec<Rr>> {
        let pubkeys = self.store.list_pubkeys(self.tag).await?;
        let mut out = Vec::new();
        for pubkey in pubkeys {
            let rows = self.store.get_addresses(self.tag, &pubkey).await?;
            out.extend(address_rows_to_rrs(&self.root, &pubkey, &rows));
        }
        Ok(out)
    }

    /// Answer one question against this zone (spec §4.6).
    pub async fn answer(&self, matches: bool, qname: &StoredName, qtype: Rtype, peer: IpAddr) -> Answer {
        let (role, soa, allow_transfer) = {
            let state = self.inner.lock().await;
            (state.role, state.soa.clone(), state.config.allow_transfer.clone())
        };
        let aa = role != ZoneRole::Caching;
        let ra = role == ZoneRole::Caching;

        let soa_rr = || Rr::soa(self.root.clone(), soa_ttl(&soa), soa.clone());
        let ns_rr = || Rr::ns(self.root.clone(), soa_ttl(&soa), self.root.clone());

        match qtype {
            Rtype::AXFR => {
                if matches && role != ZoneRole::Caching && allow_transfer.iter().any(|ip| *ip == peer) {
                    let mut answers = vec![soa_rr()];
                    match self.enumerate().await {
                        Ok(rrs) => answers.extend(rrs),
                        Err(err) => {
                            tracing::warn!(zone = %self.root, %err, "enumeration failed during AXFR");
                            return Answer::refused(aa, ra);
                        }
                    }
                    answers.push(soa_rr());
                    Answer { rcode: Rcode::NOERROR, aa, ra, answers, authorities: Vec::new() }
                } else {
                    Answer::refused(aa, ra)
                }
            }
            Rtype::SOA => {
                if matches {
                    Answer { rcode: Rcode::NOERROR, aa, ra, answers: vec![soa_rr()], authorities: Vec::new() }
                } else {
                    Answer { rcode: Rcode::NOERROR, aa, ra, answers: Vec::new(), authorities: vec![soa_rr()] }
                }
            }
            Rtype::NS => {
                if matches {
                    Answer { rcode: Rcode::NOERROR, aa, ra, answers: vec![ns_rr()], authorities: Vec::new() }
                } else {
                    Answer::refused(aa, ra)
                }
            }
            _ => {
                let Some(pubkey) = pubkey_label(&self.root, qname) else {
                    return Answer { rcode: Rcode::FORMERR, aa, ra, answers: Vec::new(), authorities: Vec::new() };
                };

                let rows = match self.store.get_addresses(self.tag, pubkey.as_bare()).await {
                    Ok(rows) => rows,
                    Err(err) => {
                        tracing::warn!(zone = %self.root, %err, "store read failed");
                        return Answer { rcode: Rcode::SERVFAIL, aa, ra, answers: Vec::new(), authorities: Vec::new() };
                    }
                };

                // `ALL`/`ANY` (spec §4.5's supported-qtype set) asks for
                // whatever RRset exists at the name, not a single type; the
                // CNAME-fallback rule below only applies to a specific qtype.
                let mut matching: Vec<_> = if qtype == Rtype::ANY {
                    rows.clone()
                } else {
                    rows.iter().filter(|r| r.rtype == qtype).cloned().collect()
                };
                if matching.is_empty() && qtype != Rtype::CNAME && qtype != Rtype::ANY {
                    matching = rows.iter().filter(|r| r.rtype == Rtype::CNAME).cloned().collect();
                }

                if matching.is_empty() {
                    if role == ZoneRole::Caching {
                        if let Ok(rrs) = self.get_and_cache_records(qname, qtype).await {
                            if !rrs.is_empty() {
                                return Answer { rcode: Rcode::NOERROR, aa, ra, answers: rrs, authorities: Vec::new() };
                            }
                        }
                    }
                    return Answer { rcode: Rcode::NXDOMAIN, aa, ra, answers: Vec::new(), authorities: Vec::new() };
                }

                let answers = address_rows_to_rrs(&self.root, pubkey.as_bare(), &matching);
                let authorities = if role == ZoneRole::Caching { Vec::new() } else { vec![soa_rr()] };
                Answer { rcode: Rcode::NOERROR, aa, ra, answers, authorities }
            }
        }
    }
}

fn soa_ttl(soa: &Soa<StoredName>) -> domain::base::Ttl {
    soa.minimum()
}

fn bump_serial(soa: &mut Soa<StoredName>, next: u32) {
    *soa = Soa::new(
        soa.mname().clone(),
        soa.rname().clone(),
        next.into(),
        soa.refresh(),
        soa.retry(),
        soa.expire(),
        soa.minimum(),
    );
}

fn seed_soa(root: &StoredName, config: &ZoneConfig, role: ZoneRole) -> Soa<StoredName> {
    let mname = root.clone();
    let rname = config
        .soa
        .email
        .as_deref()
        .and_then(|e| StoredName::bytes_from_str(&e.replacen('@', ".", 1)).ok())
        .unwrap_or_else(|| root.clone());
    let serial = if role == ZoneRole::Primary { now_unix() } else { 0 };
    Soa::new(
        mname,
        rname,
        serial.into(),
        domain::base::Ttl::from_secs(config.soa.refresh.as_secs() as u32),
        domain::base::Ttl::from_secs(config.soa.retry.as_secs() as u32),
        domain::base::Ttl::from_secs(config.soa.expire.as_secs() as u32),
        domain::base::Ttl::from_secs(config.soa.minimum.as_secs() as u32),
    )
}

fn spawn_timer_loop(zone: Arc<Zone>, mut fire_rx: mpsc::Receiver<&'static str>) {
    tokio::spawn(async move {
        while let Some(which) = fire_rx.recv().await {
            match which {
                "soa" => zone.update_soa().await,
                "expire" => {
                    let role = zone.inner.lock().await.role;
                    if role == ZoneRole::Caching {
                        zone.ttl_sweep().await;
                    } else {
                        zone.on_expire().await;
                    }
                }
                _ => {}
            }
        }
    });
}

/// The owner name `{pubkey}.{root}`.
pub fn owner_name_for(root: &StoredName, pubkey: &str) -> Option<StoredName> {
    StoredName::bytes_from_str(&format!("{pubkey}.{root}")).ok()
}

/// Extract the `PublicKey` from the leftmost label(s) of an owner name
/// served by this zone, stripping the optional `_agora._tcp` service
/// labels a `URI` query carries (spec §4.6).
fn pubkey_label(root: &StoredName, name: &StoredName) -> Option<PublicKey> {
    let name_str = name.to_string();
    let root_str = root.to_string();
    let relative = name_str.strip_suffix(root_str.trim_end_matches('.'))?.trim_end_matches('.');
    let labels: Vec<&str> = relative.split('.').filter(|l| !l.is_empty()).collect();
    let label = match labels.as_slice() {
        [pubkey] => pubkey,
        [first, second, pubkey] if *first == zonedata::URI_SERVICE_LABEL_FIRST && *second == zonedata::URI_SERVICE_LABEL_SECOND => pubkey,
        _ => return None,
    };
    PublicKey::from_label(label).ok()
}

fn group_by_pubkey(root: &StoredName, rrs: &[Rr]) -> std::collections::BTreeMap<String, Vec<AddressRow>> {
    let mut grouped: std::collections::BTreeMap<String, Vec<AddressRow>> = std::collections::BTreeMap::new();
    for rr in rrs {
        if let Some(pubkey) = pubkey_label(root, &rr.owner) {
            grouped
                .entry(pubkey.as_bare().to_owned())
                .or_default()
                .push(rr_to_address_row(pubkey.as_bare(), rr, 0));
        }
    }
    grouped
}

fn rr_to_address_row(pubkey: &str, rr: &Rr, expires: i64) -> AddressRow {
    let address = match &rr.data {
        RData::A(a) => a.addr().to_string(),
        RData::Aaaa(aaaa) => aaaa.addr().to_string(),
        RData::Cname(cname) => cname.cname().to_string(),
        RData::Uri(uri) => String::from_utf8_lossy(uri.target()).into_owned(),
        _ => String::new(),
    };
    AddressRow {
        pubkey: pubkey.to_owned(),
        address,
        rtype: rr.rtype(),
        ttl: rr.ttl.as_secs(),
        expires,
    }
}

fn rrs_to_address_rows(pubkey: &str, rrs: &[Rr], expires: i64) -> Vec<AddressRow> {
    rrs.iter().map(|rr| rr_to_address_row(pubkey, rr, expires)).collect()
}

fn address_rows_to_rrs(root: &StoredName, pubkey: &str, rows: &[AddressRow]) -> Vec<Rr> {
    let Some(owner) = owner_name_for(root, pubkey) else {
        return Vec::new();
    };
    let uri_owner = zonedata::uri_owner_name(&owner);
    rows.iter()
        .filter_map(|row| {
            let ttl = domain::base::Ttl::from_secs(row.ttl);
            let owner = if row.rtype == Rtype::URI { uri_owner.clone() } else { owner.clone() };
            let data = match row.rtype {
                Rtype::A => RData::A(domain::rdata::A::new(row.address.parse().ok()?)),
                Rtype::AAAA => RData::Aaaa(domain::rdata::Aaaa::new(row.address.parse().ok()?)),
                Rtype::CNAME => RData::Cname(domain::rdata::Cname::new(StoredName::bytes_from_str(&row.address).ok()?)),
                Rtype::URI => RData::Uri(domain::rdata::Uri::new(1, 1, row.address.as_bytes().into())),
                _ => return None,
            };
            Some(Rr { owner, ttl, data })
        })
        .collect()
}
