//! The registry dispatcher (spec §4.3): owns the three zones, routes API
//! calls, dispatches DNS queries by longest-suffix match, and hooks
//! `onAcceptedBlock`.

use std::net::IpAddr;
use std::sync::Arc;

use domain::base::Rtype;
use realm_zonedata::StoredName;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{RegistryError, RegistryResult};
use crate::ledger::{find_stake_utxo, LedgerAdaptor, ValidatorCache, ValidatorInfo};
use crate::metrics::{MetricsCollection, RegistrationKind, TransferOutcome};
use crate::payload::{ensure_valid_payload, KnownChannel, RegistrationPayload, Signature, TypedPayload};
use crate::pubkey::PublicKey;
use crate::resolver::UpstreamResolver;
use crate::signature::SignatureVerifier;
use crate::store::{Store, ZoneTag};
use crate::zone::{Zone, ZoneRole};

pub struct Registry {
    pub realm: Arc<Zone>,
    pub validators: Arc<Zone>,
    pub flash: Arc<Zone>,
    ledger: Arc<dyn LedgerAdaptor>,
    validator_cache: ValidatorCache,
    verifier: Arc<dyn SignatureVerifier>,
    http: reqwest::Client,
    validators_primary: Option<String>,
    flash_primary: Option<String>,
    /// Last validator set observed by [`Registry::on_accepted_block`], kept
    /// independently of [`ValidatorCache`] so a secondary zone can detect a
    /// *change* rather than just a refresh (spec §4.3 block hook).
    last_validators: Mutex<Vec<ValidatorInfo>>,
    metrics: Arc<MetricsCollection>,
}

impl Registry {
    pub fn new(
        config: &Config,
        store: Store,
        resolver: Arc<dyn UpstreamResolver>,
        ledger: Arc<dyn LedgerAdaptor>,
        verifier: Arc<dyn SignatureVerifier>,
        metrics: Arc<MetricsCollection>,
    ) -> Registry {
        let names = crate::config::zone_names(&config.realm);
        let realm_root = StoredName::bytes_from_str(&names["realm"]).expect("valid realm domain");
        let validators_root = StoredName::bytes_from_str(&names["validators"]).expect("valid realm domain");
        let flash_root = StoredName::bytes_from_str(&names["flash"]).expect("valid realm domain");

        let realm = Zone::new(
            ZoneTag::Realm,
            realm_root,
            config.zones.realm.clone(),
            store.clone(),
            resolver.clone(),
            metrics.clone(),
        );
        let validators = Zone::new(
            ZoneTag::Validators,
            validators_root,
            config.zones.validators.clone(),
            store.clone(),
            resolver.clone(),
            metrics.clone(),
        );
        let flash = Zone::new(
            ZoneTag::Flash,
            flash_root,
            config.zones.flash.clone(),
            store,
            resolver,
            metrics.clone(),
        );

        Registry {
            realm,
            validators,
            flash,
            validator_cache: ValidatorCache::new(ledger.clone()),
            ledger,
            verifier,
            http: reqwest::Client::new(),
            validators_primary: config.zones.validators.primary.clone(),
            flash_primary: config.zones.flash.primary.clone(),
            last_validators: Mutex::new(Vec::new()),
            metrics,
        }
    }

    pub async fn start(&self) {
        self.realm.start().await;
        self.validators.start().await;
        self.flash.start().await;
    }

    fn zones(&self) -> [&Arc<Zone>; 3] {
        [&self.realm, &self.validators, &self.flash]
    }

    /// `findZone(name)` (spec §4.3): longest-suffix dispatch among the
    /// three zones, tracking whether the match landed on the original
    /// name (`exact`) or a descendant of it (`owns`).
    pub fn find_zone(&self, name: &StoredName) -> Option<(Arc<Zone>, bool)> {
        let target = name.to_string().trim_end_matches('.').to_lowercase();
        let mut candidate = target;
        let mut matches = true;
        loop {
            for zone in self.zones() {
                if zone.root.to_string().trim_end_matches('.').to_lowercase() == candidate {
                    return Some((Arc::clone(zone), matches));
                }
            }
            match candidate.split_once('.') {
                Some((_, rest)) if !rest.is_empty() => {
                    candidate = rest.to_string();
                    matches = false;
                }
                _ => return None,
            }
        }
    }

    //----------- Application API ---------------------------------------------------

    pub async fn get_validator(&self, pubkey: &PublicKey) -> RegistryResult<Option<RegistrationPayload>> {
        self.get_payload(&self.validators, pubkey).await
    }

    pub async fn get_flash_node(&self, pubkey: &PublicKey) -> RegistryResult<Option<RegistrationPayload>> {
        self.get_payload(&self.flash, pubkey).await
    }

    async fn get_payload(&self, zone: &Arc<Zone>, pubkey: &PublicKey) -> RegistryResult<Option<RegistrationPayload>> {
        let Some((seq, _utxo)) = zone.get_utxo(pubkey.as_bare()).await? else {
            let rows = zone.get_payload_addresses(pubkey.as_bare()).await?;
            if rows.is_empty() {
                return Ok(None);
            }
            return Ok(Some(RegistrationPayload {
                public_key: pubkey.clone(),
                seq: 0,
                addresses: rows.iter().filter(|r| r.rtype == Rtype::URI).map(|r| r.address.clone()).collect(),
                ttl: rows.first().map(|r| r.ttl).unwrap_or(0),
            }));
        };
        let rows = zone.get_payload_addresses(pubkey.as_bare()).await?;
        Ok(Some(RegistrationPayload {
            public_key: pubkey.clone(),
            seq,
            addresses: rows.iter().filter(|r| r.rtype == Rtype::URI).map(|r| r.address.clone()).collect(),
            ttl: rows.first().map(|r| r.ttl).unwrap_or(0),
        }))
    }

    /// `registerValidator` (spec §4.8).
    pub async fn register_validator(&self, payload: RegistrationPayload, signature: Signature) -> RegistryResult<()> {
        let result = self.register_validator_inner(payload, signature).await;
        self.metrics.observe_registration(
            RegistrationKind::Validator,
            if result.is_ok() { TransferOutcome::Success } else { TransferOutcome::Failure },
        );
        result
    }

    async fn register_validator_inner(&self, payload: RegistrationPayload, signature: Signature) -> RegistryResult<()> {
        let previous_seq = self.validators.get_utxo(payload.public_key.as_bare()).await?.map(|(seq, _)| seq);
        let previous = previous_seq.map(|seq| RegistrationPayload {
            public_key: payload.public_key.clone(),
            seq,
            addresses: Vec::new(),
            ttl: 0,
        });
        let (kind, addresses) = ensure_valid_payload(&payload, previous.as_ref())?;

        if self.validators.role().await == ZoneRole::Secondary {
            if signature.is_empty() {
                return Err(RegistryError::SignatureInvalid);
            }
            return self.forward_register("validator", &self.validators_primary, &payload, &signature).await;
        }

        if !self.verifier.verify(&payload.public_key, payload.seq, &payload.addresses, &signature.0) {
            return Err(RegistryError::SignatureInvalid);
        }

        let validators = self.validator_cache.get().await?;
        let stakes = self.ledger.get_stakes().await?;
        let utxo = find_stake_utxo(&validators, &stakes, &payload.public_key)
            .await
            .ok_or(RegistryError::NoStake)?;

        let typed = TypedPayload { kind, payload, utxo: Some(utxo) };
        self.validators.store_payload(&typed, &addresses).await
    }

    /// `registerFlashNode` (spec §6).
    pub async fn register_flash_node(
        &self,
        payload: RegistrationPayload,
        signature: Signature,
        channel: KnownChannel,
    ) -> RegistryResult<()> {
        let result = self.register_flash_node_inner(payload, signature, channel).await;
        self.metrics.observe_registration(
            RegistrationKind::FlashNode,
            if result.is_ok() { TransferOutcome::Success } else { TransferOutcome::Failure },
        );
        result
    }

    async fn register_flash_node_inner(
        &self,
        payload: RegistrationPayload,
        signature: Signature,
        channel: KnownChannel,
    ) -> RegistryResult<()> {
        let previous_seq = self.flash.get_utxo(payload.public_key.as_bare()).await?.map(|(seq, _)| seq);
        let previous = previous_seq.map(|seq| RegistrationPayload {
            public_key: payload.public_key.clone(),
            seq,
            addresses: Vec::new(),
            ttl: 0,
        });
        let (kind, addresses) = ensure_valid_payload(&payload, previous.as_ref())?;

        if self.flash.role().await == ZoneRole::Secondary {
            if signature.is_empty() {
                return Err(RegistryError::SignatureInvalid);
            }
            return self.forward_register("flash_node", &self.flash_primary, &payload, &signature).await;
        }

        if !self.verifier.verify(&payload.public_key, payload.seq, &payload.addresses, &signature.0) {
            return Err(RegistryError::SignatureInvalid);
        }

        self.validate_channel(&channel).await?;

        let typed = TypedPayload { kind, payload, utxo: None };
        self.flash.store_payload(&typed, &addresses).await
    }

    async fn validate_channel(&self, channel: &KnownChannel) -> RegistryResult<()> {
        let height = self.ledger.height().await?;
        if height >= channel.height.saturating_add(channel.conf as u64) {
            Ok(())
        } else {
            Err(RegistryError::ChannelInvalid)
        }
    }

    async fn forward_register(
        &self,
        path: &str,
        primary: &Option<String>,
        payload: &RegistrationPayload,
        signature: &Signature,
    ) -> RegistryResult<()> {
        let Some(primary) = primary else {
            return Err(RegistryError::Internal("no redirect-register primary configured".into()));
        };
        let body = serde_json::json!({
            "payload": {
                "public_key": payload.public_key.to_hrp_string(),
                "seq": payload.seq,
                "addresses": payload.addresses,
                "ttl": payload.ttl,
            },
            "signature": signature.0,
        });
        let url = format!("{primary}/{path}");
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistryError::Upstream(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(RegistryError::Upstream(format!("redirect-register returned {}", resp.status())))
        }
    }

    /// `getValidatorInternal` (spec §4.3): on a miss, a caching zone
    /// forwards to its configured upstream registry and installs the
    /// returned payload directly — no signature check, mirroring the DNS
    /// caching path's trust boundary (spec §9).
    pub async fn get_validator_or_fetch(&self, pubkey: &PublicKey) -> RegistryResult<Option<RegistrationPayload>> {
        self.get_or_fetch(&self.validators, &self.validators_primary, "validator", pubkey).await
    }

    pub async fn get_flash_node_or_fetch(&self, pubkey: &PublicKey) -> RegistryResult<Option<RegistrationPayload>> {
        self.get_or_fetch(&self.flash, &self.flash_primary, "flash_node", pubkey).await
    }

    async fn get_or_fetch(
        &self,
        zone: &Arc<Zone>,
        primary: &Option<String>,
        path: &str,
        pubkey: &PublicKey,
    ) -> RegistryResult<Option<RegistrationPayload>> {
        if let Some(payload) = self.get_payload(zone, pubkey).await? {
            return Ok(Some(payload));
        }
        if zone.role().await != ZoneRole::Caching {
            return Ok(None);
        }
        let Some(primary) = primary else {
            return Ok(None);
        };

        #[derive(serde::Deserialize)]
        struct Fetched {
            addresses: Vec<String>,
            ttl: u32,
        }

        let url = format!("{primary}/{path}/{}", pubkey.to_hrp_string());
        let resp = self.http.get(&url).send().await.map_err(|e| RegistryError::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let fetched: Fetched = resp.json().await.map_err(|e| RegistryError::Upstream(e.to_string()))?;
        if fetched.addresses.is_empty() {
            return Ok(None);
        }

        let candidate = RegistrationPayload {
            public_key: pubkey.clone(),
            seq: 0,
            addresses: fetched.addresses,
            ttl: fetched.ttl,
        };
        let (kind, addresses) = ensure_valid_payload(&candidate, None)?;
        let typed = TypedPayload { kind, payload: candidate.clone(), utxo: None };
        zone.store_payload(&typed, &addresses).await?;
        Ok(Some(candidate))
    }

    //----------- DNS dispatch --------------------------------------------------------

    pub async fn answer(
        &self,
        matches_zone: Option<(Arc<Zone>, bool)>,
        qname: &StoredName,
        qtype: Rtype,
        peer: IpAddr,
    ) -> crate::zone::Answer {
        match matches_zone {
            Some((zone, matches)) => {
                let answer = zone.answer(matches, qname, qtype, peer).await;
                self.metrics.observe_query(zone.tag, answer.rcode);
                answer
            }
            None => crate::zone::Answer {
                rcode: domain::base::iana::Rcode::REFUSED,
                aa: false,
                ra: false,
                answers: Vec::new(),
                authorities: Vec::new(),
            },
        }
    }

    //----------- block hook -----------------------------------------------------------

    /// `onAcceptedBlock` (spec §4.3).
    pub async fn on_accepted_block(&self) {
        if self.validators.role().await == ZoneRole::Primary {
            if let Err(err) = self.sweep_slashed_validators().await {
                tracing::warn!(%err, "slashing sweep failed");
            }
        }

        if self.validators.role().await == ZoneRole::Secondary {
            if let Err(err) = self.notify_secondary_on_validator_change().await {
                tracing::warn!(%err, "validator-change NOTIFY-equivalent failed");
            }
        }
    }

    async fn sweep_slashed_validators(&self) -> RegistryResult<()> {
        for (pubkey, utxo) in self.validators.list_utxo_pubkeys().await? {
            let deposit = self.ledger.get_penalty_deposit(&crate::ledger::Utxo(utxo)).await?;
            if deposit.is_zero() {
                let Ok(key) = PublicKey::parse(&pubkey) else {
                    continue;
                };
                self.validators.remove_payload(&key).await?;
                self.metrics.observe_slashing_sweep();
            }
        }
        Ok(())
    }

    async fn notify_secondary_on_validator_change(&self) -> RegistryResult<()> {
        let height = self.ledger.height().await?;
        let latest = self.ledger.get_validators(height).await?;

        let mut last = self.last_validators.lock().await;
        let changed = last.len() != latest.len()
            || last.iter().zip(latest.iter()).any(|(a, b)| a.address != b.address || a.utxo != b.utxo);
        *last = latest;
        drop(last);

        if changed && self.validators.soa_timer_pending() {
            self.validators.stop_soa_timer();
            self.validators.update_soa().await;
        }
        Ok(())
    }
}
