//! The ledger adaptor (spec §4.1).
//!
//! A read-only, consumed interface onto the blockchain's state: chain
//! height, the active validator set, stake outputs, and penalty deposits.
//! Expressed as a trait so the registry can be driven by an in-memory fake
//! in tests instead of a real node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::RegistryResult;
use crate::pubkey::PublicKey;

/// A UTXO reference, opaque to everything but the ledger.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Utxo(pub String);

/// A coin amount. Zero means "fully slashed".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct Coins(pub u64);

impl Coins {
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

#[derive(Clone, Debug)]
pub struct ValidatorInfo {
    pub address: PublicKey,
    pub utxo: Utxo,
}

#[derive(Clone, Debug)]
pub struct StakeOutput {
    pub address: PublicKey,
    pub utxo: Utxo,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub height: u64,
}

/// Read-only view of chain state (spec §4.1).
#[async_trait]
pub trait LedgerAdaptor: Send + Sync {
    async fn height(&self) -> RegistryResult<u64>;
    async fn get_validators(&self, height: u64) -> RegistryResult<Vec<ValidatorInfo>>;
    async fn get_stakes(&self) -> RegistryResult<Vec<StakeOutput>>;
    async fn get_penalty_deposit(&self, utxo: &Utxo) -> RegistryResult<Coins>;
    /// Blocks from `height` (inclusive) to the chain tip.
    async fn get_blocks_from(&self, height: u64) -> RegistryResult<Vec<Block>>;
}

/// Memoises `(height_seen, validators)`, refreshing when the chain has
/// advanced past the last-seen height or the cache is empty (spec §4.1).
pub struct ValidatorCache {
    ledger: Arc<dyn LedgerAdaptor>,
    cached: Mutex<Option<(u64, Vec<ValidatorInfo>)>>,
}

impl ValidatorCache {
    pub fn new(ledger: Arc<dyn LedgerAdaptor>) -> Self {
        Self {
            ledger,
            cached: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> RegistryResult<Vec<ValidatorInfo>> {
        let height = self.ledger.height().await?;
        let needs_refresh = {
            let cached = self.cached.lock().unwrap();
            match &*cached {
                Some((seen, _)) => height + 1 > *seen,
                None => true,
            }
        };
        if needs_refresh {
            let validators = self.ledger.get_validators(height).await?;
            *self.cached.lock().unwrap() = Some((height, validators.clone()));
            Ok(validators)
        } else {
            Ok(self.cached.lock().unwrap().as_ref().unwrap().1.clone())
        }
    }
}

/// Find a stake UTXO for `key`: first among active validators at the
/// current height, then among general stake outputs (spec §4.8 step 3).
pub async fn find_stake_utxo(
    validators: &[ValidatorInfo],
    stakes: &[StakeOutput],
    key: &PublicKey,
) -> Option<Utxo> {
    if let Some(v) = validators.iter().find(|v| &v.address == key) {
        return Some(v.utxo.clone());
    }
    stakes.iter().find(|s| &s.address == key).map(|s| s.utxo.clone())
}

//----------- in-memory fake, for tests --------------------------------------------

/// An in-memory [`LedgerAdaptor`] for tests: a fixed validator/stake set
/// plus a mutable penalty-deposit table.
#[derive(Default)]
pub struct FakeLedger {
    inner: Mutex<FakeLedgerState>,
}

#[derive(Default)]
struct FakeLedgerState {
    height: u64,
    validators: Vec<ValidatorInfo>,
    stakes: Vec<StakeOutput>,
    deposits: HashMap<Utxo, Coins>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_height(&self, height: u64) {
        self.inner.lock().unwrap().height = height;
    }

    pub fn register_stake(&self, address: PublicKey, utxo: Utxo, deposit: Coins) {
        let mut state = self.inner.lock().unwrap();
        state.validators.push(ValidatorInfo {
            address: address.clone(),
            utxo: utxo.clone(),
        });
        state.stakes.push(StakeOutput { address, utxo: utxo.clone() });
        state.deposits.insert(utxo, deposit);
    }

    pub fn slash(&self, utxo: &Utxo) {
        self.inner.lock().unwrap().deposits.insert(utxo.clone(), Coins(0));
    }
}

#[async_trait]
impl LedgerAdaptor for FakeLedger {
    async fn height(&self) -> RegistryResult<u64> {
        Ok(self.inner.lock().unwrap().height)
    }

    async fn get_validators(&self, _height: u64) -> RegistryResult<Vec<ValidatorInfo>> {
        Ok(self.inner.lock().unwrap().validators.clone())
    }

    async fn get_stakes(&self) -> RegistryResult<Vec<StakeOutput>> {
        Ok(self.inner.lock().unwrap().stakes.clone())
    }

    async fn get_penalty_deposit(&self, utxo: &Utxo) -> RegistryResult<Coins> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .deposits
            .get(utxo)
            .copied()
            .unwrap_or_default())
    }

    async fn get_blocks_from(&self, height: u64) -> RegistryResult<Vec<Block>> {
        let tip = self.inner.lock().unwrap().height;
        Ok((height..=tip).map(|height| Block { height }).collect())
    }
}
