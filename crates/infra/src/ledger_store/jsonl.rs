//! File-backed ledger store.
//!
//! Layout of the data directory:
//!
//! ```text
//! transactions.jsonl   one JSON transaction per line, append-only, fsync'd per append
//! items.json           item snapshots, rewritten via temp file + rename
//! ```
//!
//! A failed append is rolled back by truncating the log to its previous
//! length. If that also fails the store refuses further appends. A crash in
//! the middle of an append leaves a truncated last line, which is reported as
//! `StoreError::Corrupt` on load rather than silently dropped.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, error, warn};

use stockledger_core::{ExpectedVersion, ItemKey};
use stockledger_inventory::{ItemRecord, Transaction};

use super::r#trait::{check_append, LedgerStore, StoreError};

const TRANSACTIONS_FILE: &str = "transactions.jsonl";
const ITEMS_FILE: &str = "items.json";

#[derive(Debug)]
struct Inner {
    last_sequence: u64,
    items: BTreeMap<ItemKey, ItemRecord>,
    /// Set when a failed append could not be rolled back.
    log_damaged: bool,
}

#[derive(Debug)]
pub struct JsonlLedgerStore {
    dir: PathBuf,
    inner: Mutex<Inner>,
    #[cfg(test)]
    faults: Faults,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct Faults {
    syncs: AtomicU32,
    rollbacks: AtomicU32,
}

#[cfg(test)]
impl Faults {
    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl JsonlLedgerStore {
    /// Open (or create) a store in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let transactions = read_transactions(&dir.join(TRANSACTIONS_FILE))?;
        let items = read_items(&dir.join(ITEMS_FILE))?;
        let last_sequence = transactions.last().map(|t| t.sequence).unwrap_or(0);
        debug!(
            dir = %dir.display(),
            transactions = transactions.len(),
            items = items.len(),
            "opened jsonl ledger store"
        );

        Ok(Self {
            dir,
            inner: Mutex::new(Inner {
                last_sequence,
                items,
                log_damaged: false,
            }),
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    /// Make the next `n` appends write their line and then fail to sync.
    #[cfg(test)]
    pub(crate) fn fail_next_syncs(&self, n: u32) {
        self.faults.syncs.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` rollbacks of a failed append fail.
    #[cfg(test)]
    pub(crate) fn fail_next_rollbacks(&self, n: u32) {
        self.faults.rollbacks.store(n, Ordering::SeqCst);
    }

    fn write_line(&self, file: &mut File, line: &[u8]) -> io::Result<()> {
        file.write_all(line)?;
        #[cfg(test)]
        if Faults::take(&self.faults.syncs) {
            return Err(io::Error::other("injected sync failure"));
        }
        file.sync_data()
    }

    fn truncate(&self, file: &File, len: u64) -> io::Result<()> {
        #[cfg(test)]
        if Faults::take(&self.faults.rollbacks) {
            return Err(io::Error::other("injected truncate failure"));
        }
        file.set_len(len)?;
        file.sync_data()
    }
}

impl LedgerStore for JsonlLedgerStore {
    fn load_items(&self) -> Result<BTreeMap<ItemKey, ItemRecord>, StoreError> {
        Ok(self.lock()?.items.clone())
    }

    fn load_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let _guard = self.lock()?;
        read_transactions(&self.dir.join(TRANSACTIONS_FILE))
    }

    fn persist_transaction(
        &self,
        tx: &Transaction,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.log_damaged {
            return Err(StoreError::Unavailable(format!(
                "{TRANSACTIONS_FILE} holds a partial append that could not be rolled back"
            )));
        }
        check_append(inner.last_sequence, tx, expected)?;

        let mut line = serde_json::to_vec(tx)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(TRANSACTIONS_FILE))?;
        let len = file.metadata()?.len();

        if let Err(e) = self.write_line(&mut file, &line) {
            match self.truncate(&file, len) {
                Ok(()) => {
                    warn!(sequence = tx.sequence, error = %e, "transaction append failed; rolled back");
                }
                Err(rollback) => {
                    inner.log_damaged = true;
                    error!(
                        sequence = tx.sequence,
                        error = %e,
                        rollback_error = %rollback,
                        "transaction append failed and could not be rolled back; refusing further appends"
                    );
                }
            }
            return Err(e.into());
        }

        inner.last_sequence = tx.sequence;
        Ok(())
    }

    fn persist_item(&self, item: &ItemRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let mut items = inner.items.clone();
        items.insert(item.item.clone(), item.clone());

        let tmp = self.dir.join(format!("{ITEMS_FILE}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, &items)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.dir.join(ITEMS_FILE))?;

        inner.items = items;
        Ok(())
    }
}

fn read_transactions(path: &Path) -> Result<Vec<Transaction>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut transactions = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tx: Transaction = serde_json::from_str(&line).map_err(|e| {
            StoreError::Corrupt(format!("{TRANSACTIONS_FILE} line {}: {e}", idx + 1))
        })?;
        transactions.push(tx);
    }
    Ok(transactions)
}

fn read_items(path: &Path) -> Result<BTreeMap<ItemKey, ItemRecord>, StoreError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| StoreError::Corrupt(format!("{ITEMS_FILE}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use stockledger_inventory::{ItemDisposed, LedgerEvent};

    fn disposal(sequence: u64) -> Transaction {
        Transaction::new(
            sequence,
            LedgerEvent::ItemDisposed(ItemDisposed {
                item: ItemKey::new("widget").unwrap(),
                quantity: 1,
                unit_cost: Decimal::ONE,
                unit_price: Decimal::TWO,
                amount: Decimal::TWO,
                cost_of_goods: Decimal::ONE,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn transactions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlLedgerStore::open(dir.path()).unwrap();
            store.persist_transaction(&disposal(1), ExpectedVersion::Exact(0)).unwrap();
            store.persist_transaction(&disposal(2), ExpectedVersion::Exact(1)).unwrap();
        }

        let store = JsonlLedgerStore::open(dir.path()).unwrap();
        let loaded = store.load_transactions().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].sequence, 2);

        // The reopened store knows where the log ends.
        let err = store
            .persist_transaction(&disposal(2), ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn item_snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = ItemRecord::new(ItemKey::new("widget").unwrap(), 6, Decimal::ONE, Decimal::TWO)
            .unwrap();
        {
            let store = JsonlLedgerStore::open(dir.path()).unwrap();
            store.persist_item(&record).unwrap();
        }

        let store = JsonlLedgerStore::open(dir.path()).unwrap();
        let items = store.load_items().unwrap();
        assert_eq!(items.get(&record.item), Some(&record));
        assert!(!dir.path().join("items.json.tmp").exists());
    }

    fn line_count(dir: &Path) -> usize {
        fs::read_to_string(dir.join(TRANSACTIONS_FILE))
            .unwrap()
            .lines()
            .count()
    }

    #[test]
    fn failed_append_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlLedgerStore::open(dir.path()).unwrap();
        store.persist_transaction(&disposal(1), ExpectedVersion::Exact(0)).unwrap();

        // The line reaches the file, then the sync fails.
        store.fail_next_syncs(1);
        let err = store
            .persist_transaction(&disposal(2), ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(line_count(dir.path()), 1);

        // Retrying the same sequence leaves a single, contiguous log.
        store.persist_transaction(&disposal(2), ExpectedVersion::Exact(1)).unwrap();
        drop(store);

        let reopened = JsonlLedgerStore::open(dir.path()).unwrap();
        let seqs: Vec<u64> = reopened
            .load_transactions()
            .unwrap()
            .iter()
            .map(|t| t.sequence)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn unrecoverable_append_blocks_further_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlLedgerStore::open(dir.path()).unwrap();
        store.persist_transaction(&disposal(1), ExpectedVersion::Exact(0)).unwrap();

        store.fail_next_syncs(1);
        store.fail_next_rollbacks(1);
        assert!(store
            .persist_transaction(&disposal(2), ExpectedVersion::Exact(1))
            .is_err());

        let err = store
            .persist_transaction(&disposal(2), ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)), "{err:?}");
        // The stray line is left for the operator; no second copy was added.
        assert_eq!(line_count(dir.path()), 2);
    }

    #[test]
    fn truncated_tail_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlLedgerStore::open(dir.path()).unwrap();
            store.persist_transaction(&disposal(1), ExpectedVersion::Exact(0)).unwrap();
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(TRANSACTIONS_FILE))
            .unwrap();
        file.write_all(br#"{"sequence":2,"transaction_"#).unwrap();
        drop(file);

        let err = JsonlLedgerStore::open(dir.path()).unwrap_err();
        match err {
            StoreError::Corrupt(msg) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("expected corrupt store, got {other:?}"),
        }
    }
}
