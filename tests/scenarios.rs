//! End-to-end scenarios against the registry dispatcher, driven directly
//! through [`Registry`]/[`Zone`] rather than over real sockets: these are
//! the same longest-suffix dispatch, SOA/AXFR, and TTL-eviction code paths
//! the DNS and HTTP listeners in `main.rs` call into.
//!
//! Background timers are never raced against in real time here. Each test
//! invokes the zone-engine method a timer would eventually call
//! (`update_soa`, `on_expire`, `ttl_sweep`) directly, which exercises the
//! same state machine deterministically. The one exception is TTL
//! expiry itself, which is measured against the wall clock by the store, so
//! that test sleeps briefly past a short TTL.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use domain::base::iana::Rcode;
use domain::base::{Rtype, Ttl};
use domain::rdata::Soa;
use realm_zonedata::{to_rr, AddressEntry, AddressKind, RData, Rr, StoredName};
use realmd::config::{Config, DnsConfig, HttpConfig, LoggingConfig, RealmConfig, SoaConfig, ZoneConfig, ZonesConfig};
use realmd::error::RegistryError;
use realmd::ledger::{Coins, FakeLedger, LedgerAdaptor, Utxo};
use realmd::metrics::MetricsCollection;
use realmd::payload::{RegistrationPayload, Signature};
use realmd::pubkey::PublicKey;
use realmd::resolver::FakeResolver;
use realmd::signature::{AlwaysValid, SignatureVerifier};
use realmd::store::Store;
use realmd::zone::now_unix;
use realmd::Registry;

fn peer() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn key(tag: char) -> PublicKey {
    PublicKey::parse(&tag.to_string().repeat(59)).unwrap()
}

fn make_config(realm_zone: ZoneConfig, validators_zone: ZoneConfig, flash_zone: ZoneConfig) -> Config {
    Config {
        realm: RealmConfig {
            domain: "example".to_string(),
            database: ":memory:".to_string(),
        },
        logging: LoggingConfig::default(),
        http: HttpConfig::default(),
        dns: DnsConfig::default(),
        zones: ZonesConfig {
            realm: realm_zone,
            validators: validators_zone,
            flash: flash_zone,
        },
    }
}

fn primary_zone_config() -> ZoneConfig {
    ZoneConfig {
        authoritative: true,
        soa: SoaConfig {
            email: Some("admin@example".to_string()),
            refresh: Duration::from_secs(3600),
            retry: Duration::from_secs(600),
            expire: Duration::from_secs(604800),
            minimum: Duration::from_secs(60),
        },
        primary: None,
        query_servers: Vec::new(),
        allow_transfer: Vec::new(),
    }
}

fn secondary_zone_config(query_server: &str) -> ZoneConfig {
    ZoneConfig {
        authoritative: true,
        soa: SoaConfig {
            email: None,
            refresh: Duration::from_secs(3600),
            retry: Duration::from_secs(600),
            expire: Duration::from_secs(604800),
            minimum: Duration::from_secs(60),
        },
        primary: None,
        query_servers: vec![query_server.to_string()],
        allow_transfer: Vec::new(),
    }
}

fn caching_zone_config(query_server: Option<&str>) -> ZoneConfig {
    ZoneConfig {
        authoritative: false,
        soa: SoaConfig::default(),
        primary: None,
        query_servers: query_server.map(|s| vec![s.to_string()]).unwrap_or_default(),
        allow_transfer: Vec::new(),
    }
}

fn soa_rr(root: &StoredName, serial: u32) -> Rr {
    let soa = Soa::new(
        root.clone(),
        root.clone(),
        serial.into(),
        Ttl::from_secs(3600),
        Ttl::from_secs(600),
        Ttl::from_secs(604800),
        Ttl::from_secs(60),
    );
    Rr::soa(root.clone(), Ttl::from_secs(60), soa)
}

fn a_rrs_for(root: &StoredName, pubkey: &str, ip: &str, ttl_secs: u32) -> Vec<Rr> {
    let owner = StoredName::bytes_from_str(&format!("{pubkey}.{root}")).unwrap();
    to_rr(
        &owner,
        &[AddressEntry {
            kind: AddressKind::A,
            host: ip.to_string(),
            uri: format!("agora://{ip}:2826"),
        }],
        Ttl::from_secs(ttl_secs),
    )
    .unwrap()
}

fn a_only(rrs: Vec<Rr>) -> Vec<Rr> {
    rrs.into_iter().filter(|rr| rr.rtype() == Rtype::A).collect()
}

#[tokio::test]
async fn primary_register_then_resolve() {
    let k = key('a');
    let config = make_config(caching_zone_config(None), primary_zone_config(), caching_zone_config(None));
    let store = Store::open(&config.realm.database).await.unwrap();
    let resolver = Arc::new(FakeResolver::new());
    let fake_ledger = Arc::new(FakeLedger::new());
    fake_ledger.register_stake(k.clone(), Utxo("utxo-a".to_string()), Coins(100));
    fake_ledger.set_height(10);
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(AlwaysValid);
    let metrics = Arc::new(MetricsCollection::new());
    let registry = Arc::new(Registry::new(&config, store, resolver, fake_ledger.clone(), verifier, metrics));
    registry.start().await;

    let before = now_unix();
    let payload = RegistrationPayload {
        public_key: k.clone(),
        seq: 1,
        addresses: vec!["agora://1.2.3.4:2826".to_string()],
        ttl: 60,
    };
    registry.register_validator(payload.clone(), Signature(vec![1])).await.unwrap();

    let got = registry.get_validator(&k).await.unwrap().unwrap();
    assert_eq!(got.seq, 1);
    assert_eq!(got.addresses, vec!["agora://1.2.3.4:2826".to_string()]);

    let a_name = StoredName::bytes_from_str(&format!("{}.validators.example", k.as_bare())).unwrap();
    let answer = registry.answer(registry.find_zone(&a_name), &a_name, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
    match &answer.answers[0].data {
        RData::A(a) => assert_eq!(a.addr().to_string(), "1.2.3.4"),
        _ => panic!("expected an A record"),
    }

    let uri_name = StoredName::bytes_from_str(&format!("_agora._tcp.{}.validators.example", k.as_bare())).unwrap();
    let answer = registry.answer(registry.find_zone(&uri_name), &uri_name, Rtype::URI, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
    match &answer.answers[0].data {
        RData::Uri(uri) => assert_eq!(String::from_utf8_lossy(uri.target()), "agora://1.2.3.4:2826"),
        _ => panic!("expected a URI record"),
    }

    let zone_name = StoredName::bytes_from_str("validators.example").unwrap();
    let answer = registry.answer(registry.find_zone(&zone_name), &zone_name, Rtype::SOA, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
    match &answer.answers[0].data {
        RData::Soa(soa) => {
            let serial = soa.serial().into_int();
            let after = now_unix();
            assert!(serial >= before && serial <= after);
        }
        _ => panic!("expected a SOA record"),
    }
}

#[tokio::test]
async fn stale_write_is_rejected_and_storage_unchanged() {
    let k = key('b');
    let config = make_config(caching_zone_config(None), primary_zone_config(), caching_zone_config(None));
    let store = Store::open(&config.realm.database).await.unwrap();
    let resolver = Arc::new(FakeResolver::new());
    let fake_ledger = Arc::new(FakeLedger::new());
    fake_ledger.register_stake(k.clone(), Utxo("utxo-b".to_string()), Coins(100));
    fake_ledger.set_height(10);
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(AlwaysValid);
    let metrics = Arc::new(MetricsCollection::new());
    let registry = Arc::new(Registry::new(&config, store, resolver, fake_ledger.clone(), verifier, metrics));
    registry.start().await;

    let payload = RegistrationPayload {
        public_key: k.clone(),
        seq: 1,
        addresses: vec!["agora://1.2.3.4:2826".to_string()],
        ttl: 60,
    };
    registry.register_validator(payload, Signature(vec![1])).await.unwrap();

    let stale = RegistrationPayload {
        public_key: k.clone(),
        seq: 0,
        addresses: vec!["agora://5.6.7.8:2826".to_string()],
        ttl: 60,
    };
    let err = registry.register_validator(stale, Signature(vec![1])).await.unwrap_err();
    assert!(matches!(err, RegistryError::StaleWrite));

    let got = registry.get_validator(&k).await.unwrap().unwrap();
    assert_eq!(got.seq, 1);
    assert_eq!(got.addresses, vec!["agora://1.2.3.4:2826".to_string()]);

    let a_name = StoredName::bytes_from_str(&format!("{}.validators.example", k.as_bare())).unwrap();
    let answer = registry.answer(registry.find_zone(&a_name), &a_name, Rtype::A, peer()).await;
    match &answer.answers[0].data {
        RData::A(a) => assert_eq!(a.addr().to_string(), "1.2.3.4"),
        _ => panic!("expected an A record"),
    }
}

#[tokio::test]
async fn slashing_sweep_removes_validator_and_bumps_serial() {
    let k = key('c');
    let config = make_config(caching_zone_config(None), primary_zone_config(), caching_zone_config(None));
    let store = Store::open(&config.realm.database).await.unwrap();
    let resolver = Arc::new(FakeResolver::new());
    let fake_ledger = Arc::new(FakeLedger::new());
    let utxo = Utxo("utxo-c".to_string());
    fake_ledger.register_stake(k.clone(), utxo.clone(), Coins(100));
    fake_ledger.set_height(10);
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(AlwaysValid);
    let metrics = Arc::new(MetricsCollection::new());
    let registry = Arc::new(Registry::new(&config, store, resolver, fake_ledger.clone(), verifier, metrics));
    registry.start().await;

    let payload = RegistrationPayload {
        public_key: k.clone(),
        seq: 1,
        addresses: vec!["agora://1.2.3.4:2826".to_string()],
        ttl: 60,
    };
    registry.register_validator(payload, Signature(vec![1])).await.unwrap();

    let zone_name = StoredName::bytes_from_str("validators.example").unwrap();
    let answer = registry.answer(registry.find_zone(&zone_name), &zone_name, Rtype::SOA, peer()).await;
    let serial_before = match &answer.answers[0].data {
        RData::Soa(soa) => soa.serial().into_int(),
        _ => panic!("expected a SOA record"),
    };

    fake_ledger.slash(&utxo);
    registry.on_accepted_block().await;

    let a_name = StoredName::bytes_from_str(&format!("{}.validators.example", k.as_bare())).unwrap();
    let answer = registry.answer(registry.find_zone(&a_name), &a_name, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NXDOMAIN);

    let answer = registry.answer(registry.find_zone(&zone_name), &zone_name, Rtype::SOA, peer()).await;
    let serial_after = match &answer.answers[0].data {
        RData::Soa(soa) => soa.serial().into_int(),
        _ => panic!("expected a SOA record"),
    };
    assert!(serial_after > serial_before);
}

#[tokio::test]
async fn secondary_axfr_converges_and_tracks_primary_updates() {
    let root = StoredName::bytes_from_str("validators.example").unwrap();
    let k = key('d');

    let config = make_config(caching_zone_config(None), secondary_zone_config("fake-primary"), caching_zone_config(None));
    let store = Store::open(&config.realm.database).await.unwrap();
    let resolver = Arc::new(FakeResolver::new());
    let ledger: Arc<dyn LedgerAdaptor> = Arc::new(FakeLedger::new());
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(AlwaysValid);
    let metrics = Arc::new(MetricsCollection::new());
    let registry = Arc::new(Registry::new(&config, store, resolver.clone(), ledger, verifier, metrics));
    registry.start().await;

    resolver.set_soa("fake-primary", &root, soa_rr(&root, 100));
    let initial = a_rrs_for(&root, k.as_bare(), "1.2.3.4", 60);
    resolver.set_records("fake-primary", &root, Rtype::AXFR, initial.clone());

    registry.validators.update_soa().await;

    let enumerated = registry.validators.enumerate().await.unwrap();
    assert_eq!(enumerated.len(), initial.len());

    let qname = StoredName::bytes_from_str(&format!("{}.validators.example", k.as_bare())).unwrap();
    let answer = registry.answer(registry.find_zone(&qname), &qname, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
    match &answer.answers[0].data {
        RData::A(a) => assert_eq!(a.addr().to_string(), "1.2.3.4"),
        _ => panic!("expected an A record"),
    }

    resolver.set_soa("fake-primary", &root, soa_rr(&root, 200));
    resolver.set_records("fake-primary", &root, Rtype::AXFR, a_rrs_for(&root, k.as_bare(), "9.9.9.9", 60));
    registry.validators.update_soa().await;

    let answer = registry.answer(registry.find_zone(&qname), &qname, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
    match &answer.answers[0].data {
        RData::A(a) => assert_eq!(a.addr().to_string(), "9.9.9.9"),
        _ => panic!("expected an A record"),
    }
}

#[tokio::test]
async fn secondary_expires_then_recovers() {
    let root = StoredName::bytes_from_str("validators.example").unwrap();
    let k = key('e');

    let config = make_config(caching_zone_config(None), secondary_zone_config("fake-primary"), caching_zone_config(None));
    let store = Store::open(&config.realm.database).await.unwrap();
    let resolver = Arc::new(FakeResolver::new());
    let ledger: Arc<dyn LedgerAdaptor> = Arc::new(FakeLedger::new());
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(AlwaysValid);
    let metrics = Arc::new(MetricsCollection::new());
    let registry = Arc::new(Registry::new(&config, store, resolver.clone(), ledger, verifier, metrics));
    registry.start().await;

    resolver.set_soa("fake-primary", &root, soa_rr(&root, 100));
    resolver.set_records("fake-primary", &root, Rtype::AXFR, a_rrs_for(&root, k.as_bare(), "1.2.3.4", 60));
    registry.validators.update_soa().await;

    let qname = StoredName::bytes_from_str(&format!("{}.validators.example", k.as_bare())).unwrap();
    let answer = registry.answer(registry.find_zone(&qname), &qname, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);

    resolver.set_unreachable(true);
    registry.validators.update_soa().await;
    registry.validators.on_expire().await;

    let answer = registry.answer(registry.find_zone(&qname), &qname, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NXDOMAIN);

    resolver.set_unreachable(false);
    resolver.set_soa("fake-primary", &root, soa_rr(&root, 200));
    resolver.set_records("fake-primary", &root, Rtype::AXFR, a_rrs_for(&root, k.as_bare(), "1.2.3.4", 60));
    registry.validators.update_soa().await;

    let answer = registry.answer(registry.find_zone(&qname), &qname, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
}

#[tokio::test]
async fn caching_zone_serves_then_evicts_on_ttl() {
    let k = key('f');
    let config = make_config(caching_zone_config(None), caching_zone_config(Some("fake-upstream")), caching_zone_config(None));
    let store = Store::open(&config.realm.database).await.unwrap();
    let resolver = Arc::new(FakeResolver::new());
    let ledger: Arc<dyn LedgerAdaptor> = Arc::new(FakeLedger::new());
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(AlwaysValid);
    let metrics = Arc::new(MetricsCollection::new());
    let registry = Arc::new(Registry::new(&config, store, resolver.clone(), ledger, verifier, metrics));
    registry.start().await;

    let root = StoredName::bytes_from_str("validators.example").unwrap();
    let owner = StoredName::bytes_from_str(&format!("{}.validators.example", k.as_bare())).unwrap();
    resolver.set_records("fake-upstream", &owner, Rtype::A, a_only(a_rrs_for(&root, k.as_bare(), "1.2.3.4", 1)));

    let answer = registry.answer(registry.find_zone(&owner), &owner, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
    match &answer.answers[0].data {
        RData::A(a) => assert_eq!(a.addr().to_string(), "1.2.3.4"),
        _ => panic!("expected an A record"),
    }

    resolver.set_records("fake-upstream", &owner, Rtype::A, Vec::new());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    registry.validators.ttl_sweep().await;

    let answer = registry.answer(registry.find_zone(&owner), &owner, Rtype::A, peer()).await;
    assert_eq!(answer.rcode, Rcode::NXDOMAIN);
    assert!(registry.validators.get_payload_addresses(k.as_bare()).await.unwrap().is_empty());
}

/// An `ANY` query (spec §4.5's supported-qtype set includes it) returns the
/// whole RRset at a name regardless of concrete type, not just whichever
/// type happens to match a literal `ANY` comparison (there is none). Also
/// checks the `AA`/`RA` split spec invariant 6 requires: authoritative for
/// the primary zone, recursion-available (not authoritative) for caching.
#[tokio::test]
async fn any_query_returns_full_rrset_with_correct_flags_per_role() {
    let k = key('g');
    let config = make_config(caching_zone_config(None), primary_zone_config(), caching_zone_config(Some("fake-upstream")));
    let store = Store::open(&config.realm.database).await.unwrap();
    let resolver = Arc::new(FakeResolver::new());
    let fake_ledger = Arc::new(FakeLedger::new());
    fake_ledger.register_stake(k.clone(), Utxo("utxo-g".to_string()), Coins(100));
    fake_ledger.set_height(10);
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(AlwaysValid);
    let metrics = Arc::new(MetricsCollection::new());
    let registry = Arc::new(Registry::new(&config, store, resolver.clone(), fake_ledger.clone(), verifier, metrics));
    registry.start().await;

    let payload = RegistrationPayload {
        public_key: k.clone(),
        seq: 1,
        addresses: vec!["agora://5.6.7.8:2826".to_string()],
        ttl: 60,
    };
    registry.register_validator(payload, Signature(vec![1])).await.unwrap();

    let a_name = StoredName::bytes_from_str(&format!("{}.validators.example", k.as_bare())).unwrap();
    let answer = registry.answer(registry.find_zone(&a_name), &a_name, Rtype::ANY, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
    assert!(answer.aa, "primary zone answers are authoritative");
    assert!(!answer.ra);
    assert!(answer.answers.iter().any(|rr| matches!(&rr.data, RData::A(a) if a.addr().to_string() == "5.6.7.8")));
    assert!(answer.answers.iter().any(|rr| matches!(&rr.data, RData::Uri(_))));

    let caching_owner = StoredName::bytes_from_str(&format!("{}.flash.example", k.as_bare())).unwrap();
    resolver.set_records(
        "fake-upstream",
        &caching_owner,
        Rtype::A,
        a_rrs_for(&StoredName::bytes_from_str("flash.example").unwrap(), k.as_bare(), "5.6.7.8", 60),
    );
    // Warm the local cache via a concrete-type query first; an `ANY` fetch
    // straight from upstream isn't this resolver's contract (`query` is
    // keyed by the caller's qtype), but once an entry is cached, `ANY`
    // reads it back like any other stored RRset.
    let warm = registry.answer(registry.find_zone(&caching_owner), &caching_owner, Rtype::A, peer()).await;
    assert_eq!(warm.rcode, Rcode::NOERROR);

    let answer = registry.answer(registry.find_zone(&caching_owner), &caching_owner, Rtype::ANY, peer()).await;
    assert_eq!(answer.rcode, Rcode::NOERROR);
    assert!(!answer.aa, "caching zone answers are not authoritative");
    assert!(answer.ra, "caching zone answers carry recursion-available");
}
