use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use stockledger_core::{Aggregate, AggregateRoot, DomainError, DomainResult, ItemKey};

use crate::adjustment::{
    AdjustmentBatch, AdjustmentFailure, AdjustmentReport, AppliedAdjustment, StockAdjustment,
};
use crate::command::{AcquireStock, AdjustStock, DisposeStock, LedgerCommand};
use crate::event::{AcquisitionSource, ItemAcquired, ItemAdjusted, ItemDisposed, LedgerEvent};
use crate::item::{
    amount, ensure_non_negative, positive_quantity, weighted_average_cost, ItemRecord,
};
use crate::policy::{LedgerPolicy, SalePricePolicy, UnderflowPolicy};
use crate::report::{InventoryReport, PnlReport, RunningTotals};
use crate::transaction::{ReplayError, Transaction, TransactionLog};

/// Aggregate root: the inventory ledger.
///
/// Holds current stock per item, the transaction log and the running P&L
/// totals. Every mutation goes through `decide` (pure validation producing an
/// event) and is then journaled and applied, so replaying the log from an
/// empty ledger reproduces the exact same state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryLedger {
    items: BTreeMap<ItemKey, ItemRecord>,
    log: TransactionLog,
    totals: RunningTotals,
    policy: LedgerPolicy,
}

impl InventoryLedger {
    pub fn new(policy: LedgerPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Rebuild a ledger by folding a transaction log from empty state.
    ///
    /// Every entry is checked against the state built so far; a log that
    /// could not have been produced by this ledger is rejected.
    pub fn replay(
        policy: LedgerPolicy,
        transactions: impl IntoIterator<Item = Transaction>,
    ) -> Result<Self, ReplayError> {
        let mut ledger = Self::new(policy);
        for tx in transactions {
            ledger.record(tx)?;
        }
        Ok(ledger)
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    pub fn item(&self, item: &ItemKey) -> Option<&ItemRecord> {
        self.items.get(item)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items.values()
    }

    pub fn transactions(&self) -> &TransactionLog {
        &self.log
    }

    pub fn totals(&self) -> RunningTotals {
        self.totals
    }

    pub fn pnl_report(&self) -> PnlReport {
        PnlReport::from_totals(&self.totals)
    }

    pub fn inventory_report(&self) -> InventoryReport {
        InventoryReport::from_records(self.items.values())
    }

    /// Validate a command against current state and return the event it produces.
    pub fn decide(&self, command: &LedgerCommand) -> DomainResult<LedgerEvent> {
        match command {
            LedgerCommand::AcquireStock(cmd) => self.handle_acquire(cmd),
            LedgerCommand::DisposeStock(cmd) => self.handle_dispose(cmd),
            LedgerCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
        }
    }

    /// Wrap an event as the next transaction of this ledger's log.
    pub fn next_transaction(&self, event: LedgerEvent) -> Transaction {
        Transaction::new(self.log.next_sequence(), event)
    }

    /// Journal and apply an already-decided transaction.
    ///
    /// Nothing is applied when the entry is out of order or contradicts the
    /// current state.
    pub fn record(&mut self, tx: Transaction) -> Result<(), ReplayError> {
        self.log.check_next(tx.sequence)?;
        self.check_replayable(&tx.event)
            .map_err(|reason| ReplayError::Inconsistent {
                sequence: tx.sequence,
                reason,
            })?;
        self.commit(tx);
        Ok(())
    }

    /// Decide, hand the transaction to `persist`, then apply it.
    ///
    /// Nothing is applied when either the decision or `persist` fails.
    pub fn execute_with<E, F>(&mut self, command: &LedgerCommand, persist: F) -> Result<Transaction, E>
    where
        E: From<DomainError>,
        F: FnOnce(&Transaction) -> Result<(), E>,
    {
        let event = self.decide(command)?;
        let tx = self.next_transaction(event);
        persist(&tx)?;
        self.commit(tx.clone());
        Ok(tx)
    }

    pub fn acquire(
        &mut self,
        item: &ItemKey,
        quantity: i64,
        cost_price: Decimal,
        sale_price: Decimal,
    ) -> DomainResult<Transaction> {
        let command = LedgerCommand::AcquireStock(AcquireStock {
            item: item.clone(),
            quantity,
            unit_cost: cost_price,
            sale_price,
            source: AcquisitionSource::Purchase,
            occurred_at: Utc::now(),
        });
        self.execute_with(&command, |_| Ok(()))
    }

    pub fn dispose(&mut self, item: &ItemKey, quantity: i64) -> DomainResult<Transaction> {
        let command = LedgerCommand::DisposeStock(DisposeStock {
            item: item.clone(),
            quantity,
            occurred_at: Utc::now(),
        });
        self.execute_with(&command, |_| Ok(()))
    }

    pub fn adjust(
        &mut self,
        item: &ItemKey,
        adjustment: StockAdjustment,
    ) -> DomainResult<Transaction> {
        let command = LedgerCommand::AdjustStock(AdjustStock {
            item: item.clone(),
            adjustment,
            occurred_at: Utc::now(),
        });
        self.execute_with(&command, |_| Ok(()))
    }

    pub fn apply_external_adjustments(&mut self, batch: &AdjustmentBatch) -> AdjustmentReport {
        self.apply_external_adjustments_with(batch, Utc::now(), |_| Ok(()))
    }

    /// Apply a correction batch one item at a time.
    ///
    /// Each entry is decided, persisted and applied on its own; a failing
    /// entry is reported and processing continues with the next one.
    pub fn apply_external_adjustments_with<E, F>(
        &mut self,
        batch: &AdjustmentBatch,
        occurred_at: DateTime<Utc>,
        mut persist: F,
    ) -> AdjustmentReport<E>
    where
        E: From<DomainError>,
        F: FnMut(&Transaction) -> Result<(), E>,
    {
        let mut report = AdjustmentReport::default();
        for (item, adjustment) in batch {
            let command = LedgerCommand::AdjustStock(AdjustStock {
                item: item.clone(),
                adjustment: adjustment.clone(),
                occurred_at,
            });
            match self.execute_with(&command, &mut persist) {
                Ok(transaction) => {
                    let underflow = match &transaction.event {
                        LedgerEvent::ItemAdjusted(e) => e.underflow(),
                        _ => None,
                    };
                    report.applied.push(AppliedAdjustment {
                        item: item.clone(),
                        transaction,
                        underflow,
                    });
                }
                Err(error) => report.failures.push(AdjustmentFailure {
                    item: item.clone(),
                    error,
                }),
            }
        }
        report
    }

    fn commit(&mut self, tx: Transaction) {
        self.apply(&tx.event);
        self.log.push(tx);
    }
}

impl AggregateRoot for InventoryLedger {
    fn version(&self) -> u64 {
        self.log.last_sequence()
    }
}

impl Aggregate for InventoryLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    /// Applies state only; use [`InventoryLedger::record`] to also journal.
    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::ItemAcquired(e) => {
                let record = self
                    .items
                    .entry(e.item.clone())
                    .or_insert_with(|| ItemRecord {
                        item: e.item.clone(),
                        quantity: 0,
                        cost_price: Decimal::ZERO,
                        sale_price: Decimal::ZERO,
                    });
                record.quantity = record.quantity.saturating_add(e.quantity);
                record.cost_price = e.cost_price;
                record.sale_price = e.sale_price;
            }
            LedgerEvent::ItemDisposed(e) => {
                if let Some(record) = self.items.get_mut(&e.item) {
                    record.quantity = record.quantity.saturating_sub(e.quantity);
                }
            }
            LedgerEvent::ItemAdjusted(e) => {
                if let Some(record) = self.items.get_mut(&e.item) {
                    let delta = e.applied_quantity_delta.unsigned_abs();
                    record.quantity = if e.applied_quantity_delta < 0 {
                        record.quantity.saturating_sub(delta)
                    } else {
                        record.quantity.saturating_add(delta)
                    };
                    if let Some(cost_delta) = e.cost_delta {
                        record.cost_price += cost_delta;
                    }
                }
            }
        }
        self.totals.record(event);
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.decide(command).map(|event| vec![event])
    }
}

impl InventoryLedger {
    fn handle_acquire(&self, cmd: &AcquireStock) -> DomainResult<LedgerEvent> {
        let quantity = positive_quantity(cmd.quantity)?;
        ensure_non_negative("cost_price", cmd.unit_cost)?;
        ensure_non_negative("sale_price", cmd.sale_price)?;
        let lot_cost = amount(cmd.unit_cost, quantity)?;

        let (cost_price, sale_price) = match self.items.get(&cmd.item) {
            Some(existing) => {
                if existing.quantity.checked_add(quantity).is_none() {
                    return Err(DomainError::invalid_input("quantity overflow"));
                }
                let cost_price = weighted_average_cost(
                    existing.quantity,
                    existing.cost_price,
                    quantity,
                    cmd.unit_cost,
                )
                .ok_or_else(|| DomainError::invalid_input("average cost overflow"))?;
                (cost_price, self.resolve_sale_price(existing, cmd.sale_price))
            }
            None => (cmd.unit_cost, cmd.sale_price),
        };

        Ok(LedgerEvent::ItemAcquired(ItemAcquired {
            item: cmd.item.clone(),
            quantity,
            unit_cost: cmd.unit_cost,
            amount: lot_cost,
            cost_price,
            sale_price,
            source: cmd.source,
            occurred_at: cmd.occurred_at,
        }))
    }

    /// Whether a persisted event can be applied to the current state.
    fn check_replayable(&self, event: &LedgerEvent) -> Result<(), String> {
        match event {
            LedgerEvent::ItemAcquired(e) => {
                if e.quantity == 0 {
                    return Err(format!("acquisition of {} moves no stock", e.item));
                }
                if e.cost_price < Decimal::ZERO || e.sale_price < Decimal::ZERO {
                    return Err(format!("negative price for {}", e.item));
                }
                let held = self.items.get(&e.item).map_or(0, |r| r.quantity);
                if held.checked_add(e.quantity).is_none() {
                    return Err(format!("quantity overflow for {}", e.item));
                }
            }
            LedgerEvent::ItemDisposed(e) => {
                let record = self
                    .items
                    .get(&e.item)
                    .ok_or_else(|| format!("disposal of unknown item {}", e.item))?;
                if e.quantity == 0 || e.quantity > record.quantity {
                    return Err(format!(
                        "disposal of {} units of {} with {} on hand",
                        e.quantity, e.item, record.quantity
                    ));
                }
                if !self.totals.can_record(e.amount, e.cost_of_goods) {
                    return Err("running totals overflow".to_string());
                }
            }
            LedgerEvent::ItemAdjusted(e) => {
                let record = self
                    .items
                    .get(&e.item)
                    .ok_or_else(|| format!("adjustment of unknown item {}", e.item))?;
                let delta = e.applied_quantity_delta.unsigned_abs();
                let fits = if e.applied_quantity_delta < 0 {
                    delta <= record.quantity
                } else {
                    record.quantity.checked_add(delta).is_some()
                };
                if !fits {
                    return Err(format!(
                        "adjustment of {} by {} with {} on hand",
                        e.item, e.applied_quantity_delta, record.quantity
                    ));
                }
                if let Some(cost_delta) = e.cost_delta {
                    match record.cost_price.checked_add(cost_delta) {
                        Some(cost) if cost >= Decimal::ZERO => {}
                        _ => return Err(format!("adjustment drives cost of {} negative", e.item)),
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_sale_price(&self, existing: &ItemRecord, supplied: Decimal) -> Decimal {
        // A zero price means "not supplied"; an unpriced item takes the first real price.
        if supplied.is_zero() {
            return existing.sale_price;
        }
        match self.policy.sale_price {
            SalePricePolicy::KeepExisting if !existing.sale_price.is_zero() => existing.sale_price,
            _ => supplied,
        }
    }

    fn handle_dispose(&self, cmd: &DisposeStock) -> DomainResult<LedgerEvent> {
        let quantity = positive_quantity(cmd.quantity)?;
        let record = self
            .items
            .get(&cmd.item)
            .ok_or_else(|| DomainError::unknown_item(&cmd.item))?;

        if quantity > record.quantity {
            return Err(DomainError::InsufficientStock {
                item: cmd.item.clone(),
                requested: quantity,
                available: record.quantity,
            });
        }

        let revenue = amount(record.sale_price, quantity)?;
        let cost_of_goods = amount(record.cost_price, quantity)?;
        if !self.totals.can_record(revenue, cost_of_goods) {
            return Err(DomainError::invalid_input("running totals overflow"));
        }

        Ok(LedgerEvent::ItemDisposed(ItemDisposed {
            item: cmd.item.clone(),
            quantity,
            unit_cost: record.cost_price,
            unit_price: record.sale_price,
            amount: revenue,
            cost_of_goods,
            occurred_at: cmd.occurred_at,
        }))
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> DomainResult<LedgerEvent> {
        let adjustment = &cmd.adjustment;
        let Some(record) = self.items.get(&cmd.item) else {
            // Unseen item: created through the acquisition path.
            if adjustment.quantity_adjust <= 0 {
                return Err(DomainError::invalid_input(format!(
                    "adjustment creating {} needs a positive quantity_adjust (got {})",
                    cmd.item, adjustment.quantity_adjust
                )));
            }
            return self.handle_acquire(&AcquireStock {
                item: cmd.item.clone(),
                quantity: adjustment.quantity_adjust,
                unit_cost: adjustment.cost_adjust.unwrap_or_default(),
                sale_price: Decimal::ZERO,
                source: AcquisitionSource::Adjustment,
                occurred_at: cmd.occurred_at,
            });
        };

        if adjustment.is_noop() {
            return Err(DomainError::invalid_input(format!(
                "adjustment for {} changes nothing",
                cmd.item
            )));
        }

        if let Some(cost_delta) = adjustment.cost_adjust {
            let adjusted = record
                .cost_price
                .checked_add(cost_delta)
                .ok_or_else(|| DomainError::invalid_input("cost_price overflow"))?;
            ensure_non_negative("cost_price", adjusted)?;
        }

        let requested = adjustment.quantity_adjust;
        let applied = if requested >= 0 {
            if record.quantity.checked_add(requested.unsigned_abs()).is_none() {
                return Err(DomainError::invalid_input("quantity overflow"));
            }
            requested
        } else if requested.unsigned_abs() <= record.quantity {
            requested
        } else {
            match self.policy.underflow {
                UnderflowPolicy::Clamp => {
                    // |requested| > quantity, so quantity fits in i64.
                    -(record.quantity as i64)
                }
                UnderflowPolicy::Reject => {
                    return Err(DomainError::Underflow {
                        item: cmd.item.clone(),
                        requested,
                        available: record.quantity,
                    });
                }
            }
        };

        Ok(LedgerEvent::ItemAdjusted(ItemAdjusted {
            item: cmd.item.clone(),
            requested_quantity_delta: requested,
            applied_quantity_delta: applied,
            cost_delta: adjustment.cost_adjust.filter(|c| !c.is_zero()),
            occurred_at: cmd.occurred_at,
        }))
    }
}
