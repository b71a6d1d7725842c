use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ItemKey};

/// Current stock position of one item.
///
/// Records are created by the first acquisition (or by an adjustment naming an
/// unseen item) and never removed; a record at zero quantity stays around for
/// reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item: ItemKey,
    pub quantity: u64,
    /// Weighted-average acquisition cost per unit.
    pub cost_price: Decimal,
    pub sale_price: Decimal,
}

impl ItemRecord {
    pub fn new(
        item: ItemKey,
        quantity: u64,
        cost_price: Decimal,
        sale_price: Decimal,
    ) -> DomainResult<Self> {
        ensure_non_negative("cost_price", cost_price)?;
        ensure_non_negative("sale_price", sale_price)?;
        Ok(Self {
            item,
            quantity,
            cost_price,
            sale_price,
        })
    }

    /// Value of the units on hand at average cost.
    pub fn stock_value(&self) -> Decimal {
        self.cost_price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// Quantity-weighted average of an existing position and an incoming lot.
///
/// Returns `None` on decimal overflow. A zero combined quantity yields zero.
pub fn weighted_average_cost(
    held_quantity: u64,
    held_cost: Decimal,
    incoming_quantity: u64,
    incoming_cost: Decimal,
) -> Option<Decimal> {
    let total = held_quantity.checked_add(incoming_quantity)?;
    if total == 0 {
        return Some(Decimal::ZERO);
    }
    let held_value = held_cost.checked_mul(Decimal::from(held_quantity))?;
    let incoming_value = incoming_cost.checked_mul(Decimal::from(incoming_quantity))?;
    held_value
        .checked_add(incoming_value)?
        .checked_div(Decimal::from(total))
}

pub(crate) fn ensure_non_negative(field: &str, value: Decimal) -> DomainResult<()> {
    if value < Decimal::ZERO {
        return Err(DomainError::invalid_input(format!(
            "{field} cannot be negative"
        )));
    }
    Ok(())
}

/// Validate a command quantity: must be strictly positive.
pub(crate) fn positive_quantity(quantity: i64) -> DomainResult<u64> {
    if quantity <= 0 {
        return Err(DomainError::invalid_input(format!(
            "quantity must be positive (got {quantity})"
        )));
    }
    Ok(quantity.unsigned_abs())
}

pub(crate) fn amount(unit: Decimal, quantity: u64) -> DomainResult<Decimal> {
    unit.checked_mul(Decimal::from(quantity))
        .ok_or_else(|| DomainError::invalid_input("monetary amount overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn average_of_two_lots() {
        let avg = weighted_average_cost(10, dec("2.00"), 10, dec("4.00")).unwrap();
        assert_eq!(avg, dec("3.00"));
    }

    #[test]
    fn average_from_empty_position_is_incoming_cost() {
        let avg = weighted_average_cost(0, dec("9.99"), 3, dec("1.50")).unwrap();
        assert_eq!(avg, dec("1.50"));
    }

    #[test]
    fn average_of_nothing_is_zero() {
        assert_eq!(weighted_average_cost(0, dec("5"), 0, dec("7")), Some(Decimal::ZERO));
    }

    #[test]
    fn negative_prices_are_rejected() {
        let item = ItemKey::new("widget").unwrap();
        let err = ItemRecord::new(item, 1, dec("-0.01"), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(msg) if msg.contains("cost_price")));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(positive_quantity(0).is_err());
        assert!(positive_quantity(-3).is_err());
        assert_eq!(positive_quantity(4).unwrap(), 4);
    }

    #[test]
    fn stock_value_is_quantity_times_cost() {
        let item = ItemKey::new("widget").unwrap();
        let record = ItemRecord::new(item, 6, dec("2.50"), dec("5")).unwrap();
        assert_eq!(record.stock_value(), dec("15.00"));
    }
}
