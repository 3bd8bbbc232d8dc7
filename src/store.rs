//! The embedded persistent store (spec §3).
//!
//! One `sqlx` SQLite pool is opened once per process and shared across all
//! three zones; each zone only ever touches its own pair of tables
//! (`registry_{zone}_utxo`, `registry_{zone}_addresses`), so there is no
//! cross-zone write interleaving to worry about (spec §5 "shared state").

use domain::base::Rtype;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::error::RegistryResult;

/// The three zones this registry serves. Used only to select a table
/// prefix — never interpolated from user input — so building SQL with
/// `format!` over it is safe.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ZoneTag {
    Realm,
    Validators,
    Flash,
}

impl ZoneTag {
    pub fn all() -> [ZoneTag; 3] {
        [ZoneTag::Realm, ZoneTag::Validators, ZoneTag::Flash]
    }

    fn prefix(self) -> &'static str {
        match self {
            ZoneTag::Realm => "registry_realm",
            ZoneTag::Validators => "registry_validators",
            ZoneTag::Flash => "registry_flash",
        }
    }
}

/// One row of `registry_{zone}_addresses`.
#[derive(Clone, Debug)]
pub struct AddressRow {
    pub pubkey: String,
    pub address: String,
    pub rtype: Rtype,
    pub ttl: u32,
    /// Unix timestamp the row expires at; `0` for primary/secondary zones
    /// (spec §3 invariant 3).
    pub expires: i64,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(database: &str) -> RegistryResult<Store> {
        let url = if database == ":memory:" {
            "sqlite::memory:".to_owned()
        } else {
            format!("sqlite://{database}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new().max_connections(8).connect(&url).await?;
        let store = Store { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> RegistryResult<()> {
        for zone in ZoneTag::all() {
            let prefix = zone.prefix();
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {prefix}_utxo (
                     pubkey TEXT PRIMARY KEY,
                     sequence INTEGER NOT NULL,
                     utxo TEXT NOT NULL
                 )"
            ))
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {prefix}_addresses (
                     pubkey TEXT NOT NULL,
                     address TEXT NOT NULL,
                     type INTEGER NOT NULL,
                     ttl INTEGER NOT NULL,
                     expires INTEGER NOT NULL,
                     PRIMARY KEY (pubkey, address)
                 )"
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// `(sequence, utxo)` for `pubkey`, if registered (primary zones only,
    /// spec §3 invariant 1).
    pub async fn get_utxo(&self, zone: ZoneTag, pubkey: &str) -> RegistryResult<Option<(u64, String)>> {
        let prefix = zone.prefix();
        let row = sqlx::query(&format!("SELECT sequence, utxo FROM {prefix}_utxo WHERE pubkey = ?"))
            .bind(pubkey)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (r.get::<i64, _>(0) as u64, r.get::<String, _>(1))))
    }

    pub async fn put_utxo(&self, zone: ZoneTag, pubkey: &str, sequence: u64, utxo: &str) -> RegistryResult<()> {
        let prefix = zone.prefix();
        sqlx::query(&format!(
            "INSERT INTO {prefix}_utxo (pubkey, sequence, utxo) VALUES (?, ?, ?)
             ON CONFLICT(pubkey) DO UPDATE SET sequence = excluded.sequence, utxo = excluded.utxo"
        ))
        .bind(pubkey)
        .bind(sequence as i64)
        .bind(utxo)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_addresses(&self, zone: ZoneTag, pubkey: &str) -> RegistryResult<Vec<AddressRow>> {
        let prefix = zone.prefix();
        let rows = sqlx::query(&format!(
            "SELECT pubkey, address, type, ttl, expires FROM {prefix}_addresses WHERE pubkey = ?"
        ))
        .bind(pubkey)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_address).collect())
    }

    /// Replace every address row for `pubkey` with `rows`, atomically.
    pub async fn put_addresses(&self, zone: ZoneTag, pubkey: &str, rows: &[AddressRow]) -> RegistryResult<()> {
        let prefix = zone.prefix();
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {prefix}_addresses WHERE pubkey = ?"))
            .bind(pubkey)
            .execute(&mut *tx)
            .await?;
        for row in rows {
            sqlx::query(&format!(
                "INSERT INTO {prefix}_addresses (pubkey, address, type, ttl, expires) VALUES (?, ?, ?, ?, ?)"
            ))
            .bind(&row.pubkey)
            .bind(&row.address)
            .bind(row.rtype.to_int() as i64)
            .bind(row.ttl as i64)
            .bind(row.expires)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_pubkey(&self, zone: ZoneTag, pubkey: &str) -> RegistryResult<()> {
        let prefix = zone.prefix();
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {prefix}_addresses WHERE pubkey = ?"))
            .bind(pubkey)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM {prefix}_utxo WHERE pubkey = ?"))
            .bind(pubkey)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Wipe every address row in `zone` (AXFR clear, or secondary
    /// `disable`).
    pub async fn clear_addresses(&self, zone: ZoneTag) -> RegistryResult<()> {
        let prefix = zone.prefix();
        sqlx::query(&format!("DELETE FROM {prefix}_addresses")).execute(&self.pool).await?;
        Ok(())
    }

    /// Distinct pubkeys with at least one address row, for enumeration
    /// (AXFR, slashing sweep).
    pub async fn list_pubkeys(&self, zone: ZoneTag) -> RegistryResult<Vec<String>> {
        let prefix = zone.prefix();
        let rows = sqlx::query(&format!("SELECT DISTINCT pubkey FROM {prefix}_addresses"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// All pubkeys with a stored UTXO (primary validator zone, for the
    /// block-driven slashing sweep).
    pub async fn list_utxo_pubkeys(&self, zone: ZoneTag) -> RegistryResult<Vec<(String, String)>> {
        let prefix = zone.prefix();
        let rows = sqlx::query(&format!("SELECT pubkey, utxo FROM {prefix}_utxo"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect())
    }

    /// Rows whose `expires` has passed `now` (caching TTL sweep).
    pub async fn get_expired(&self, zone: ZoneTag, now: i64) -> RegistryResult<Vec<AddressRow>> {
        let prefix = zone.prefix();
        let rows = sqlx::query(&format!(
            "SELECT pubkey, address, type, ttl, expires FROM {prefix}_addresses WHERE expires > 0 AND expires <= ?"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_address).collect())
    }

    /// The earliest `expires` among all rows, for rearming `expire_timer`
    /// after a TTL sweep.
    pub async fn earliest_expiry(&self, zone: ZoneTag) -> RegistryResult<Option<i64>> {
        let prefix = zone.prefix();
        let row = sqlx::query(&format!("SELECT MIN(expires) FROM {prefix}_addresses WHERE expires > 0"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0).ok())
    }
}

fn row_to_address(row: sqlx::sqlite::SqliteRow) -> AddressRow {
    AddressRow {
        pubkey: row.get(0),
        address: row.get(1),
        rtype: Rtype::from_int(row.get::<i64, _>(2) as u16),
        ttl: row.get::<i64, _>(3) as u32,
        expires: row.get(4),
    }
}
