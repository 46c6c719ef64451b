//! RocksDB-backed persistent ledger storage.
//!
//! Implements [`LedgerStore`] using RocksDB column families for the ledger
//! singleton, schedule buckets, accounts, and allowances. Every commit is one
//! atomic [`WriteBatch`].
//!
//! Values are bincode-encoded, so `u128` amounts survive a restart bit for
//! bit. Bucket keys are big-endian ids for ordered iteration.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use tracing::debug;

use tranche_core::error::TrancheError;
use tranche_core::store::{AllowanceKey, LedgerSnapshot, LedgerStore, StateDelta};
use tranche_core::types::{Account, AccountId, Amount, BucketId, LedgerMeta, MaturityBucket};

// --- Column family names ---

const CF_META: &str = "meta";
const CF_BUCKETS: &str = "buckets";
const CF_ACCOUNTS: &str = "accounts";
const CF_ALLOWANCES: &str = "allowances";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_META, CF_BUCKETS, CF_ACCOUNTS, CF_ALLOWANCES];

// --- Metadata keys ---

const META_LEDGER: &[u8] = b"ledger";

/// RocksDB-backed persistent ledger storage.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrancheError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| TrancheError::Storage(e.to_string()))?;

        Ok(Self { db })
    }

    /// Whether nothing was ever committed.
    pub fn is_empty(&self) -> Result<bool, TrancheError> {
        let cf = self.cf_handle(CF_META)?;
        Ok(self
            .db
            .get_cf(cf, META_LEDGER)
            .map_err(|e| TrancheError::Storage(e.to_string()))?
            .is_none())
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), TrancheError> {
        self.db
            .flush()
            .map_err(|e| TrancheError::Storage(e.to_string()))
    }

    /// Trigger manual compaction across all column families.
    pub fn compact(&self) -> Result<(), TrancheError> {
        for cf_name in ALL_CFS {
            let cf = self.cf_handle(cf_name)?;
            self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
        }
        Ok(())
    }

    // --- Internal helpers ---

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, TrancheError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| TrancheError::Storage(format!("missing column family: {name}")))
    }

    /// Encode a bucket id as big-endian bytes for ordered iteration.
    fn bucket_key(id: BucketId) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn decode_bucket_key(bytes: &[u8]) -> Result<BucketId, TrancheError> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| TrancheError::Storage("invalid bucket key length".into()))?;
        Ok(BucketId::from_be_bytes(raw))
    }

    fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, TrancheError> {
        bincode::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| TrancheError::Storage(e.to_string()))
    }

    fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, TrancheError> {
        let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| TrancheError::Storage(e.to_string()))?;
        Ok(value)
    }

    /// Decode every entry of a column family with the given key decoder.
    fn scan<K, V: bincode::Decode<()>>(
        &self,
        cf_name: &str,
        decode_key: impl Fn(&[u8]) -> Result<K, TrancheError>,
    ) -> Result<Vec<(K, V)>, TrancheError> {
        let cf = self.cf_handle(cf_name)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| TrancheError::Storage(e.to_string()))?;
            out.push((decode_key(&key)?, Self::decode(&value)?));
        }
        Ok(out)
    }
}

impl LedgerStore for RocksStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>, TrancheError> {
        let cf_meta = self.cf_handle(CF_META)?;
        let Some(meta_bytes) = self
            .db
            .get_cf(cf_meta, META_LEDGER)
            .map_err(|e| TrancheError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };
        let meta: LedgerMeta = Self::decode(&meta_bytes)?;

        let buckets: Vec<(BucketId, MaturityBucket)> =
            self.scan(CF_BUCKETS, Self::decode_bucket_key)?;
        let accounts: Vec<(AccountId, Account)> = self.scan(CF_ACCOUNTS, |key| {
            let id = std::str::from_utf8(key)
                .map_err(|e| TrancheError::Storage(format!("invalid account key: {e}")))?;
            Ok(AccountId::new(id))
        })?;
        let allowances: Vec<(AllowanceKey, Amount)> =
            self.scan(CF_ALLOWANCES, |key| Self::decode(key))?;

        debug!(
            buckets = buckets.len(),
            accounts = accounts.len(),
            allowances = allowances.len(),
            "loaded ledger from rocksdb"
        );
        Ok(Some(LedgerSnapshot {
            meta,
            buckets,
            accounts,
            allowances,
        }))
    }

    fn commit(&mut self, delta: &StateDelta) -> Result<(), TrancheError> {
        let mut batch = WriteBatch::default();

        batch.put_cf(self.cf_handle(CF_META)?, META_LEDGER, Self::encode(&delta.meta)?);

        let cf_buckets = self.cf_handle(CF_BUCKETS)?;
        for (id, bucket) in &delta.buckets {
            batch.put_cf(cf_buckets, Self::bucket_key(*id), Self::encode(bucket)?);
        }

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        for (id, account) in &delta.accounts {
            batch.put_cf(cf_accounts, id.as_bytes(), Self::encode(account)?);
        }

        let cf_allowances = self.cf_handle(CF_ALLOWANCES)?;
        for (key, value) in &delta.allowances {
            batch.put_cf(cf_allowances, Self::encode(key)?, Self::encode(value)?);
        }

        self.db
            .write(batch)
            .map_err(|e| TrancheError::Storage(e.to_string()))
    }
}
