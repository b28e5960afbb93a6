//! Order total calculation.

use crate::config::StoreConfig;
use crate::error::{AppError, Result};
use serde::Serialize;

/// Priced breakdown of an order or cart, in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    /// Sum of unit price × quantity.
    pub subtotal: i64,
    /// Flat fee, waived above the free-shipping threshold.
    pub shipping: i64,
    /// `round(subtotal × tax_rate)`.
    pub tax: i64,
    /// `subtotal + shipping + tax`.
    pub total: i64,
}

impl OrderTotals {
    /// Price a subtotal with the store's shipping and tax rules.
    ///
    /// An empty order (subtotal 0) is charged nothing. Fails when the total
    /// does not fit in an `i64`.
    pub fn compute(subtotal: i64, store: &StoreConfig) -> Result<Self> {
        if subtotal <= 0 {
            return Ok(Self {
                subtotal: 0,
                shipping: 0,
                tax: 0,
                total: 0,
            });
        }

        let shipping = if subtotal > store.free_shipping_threshold {
            0
        } else {
            store.shipping_fee
        };
        let tax = (subtotal as f64 * store.tax_rate).round() as i64;

        let total = subtotal
            .checked_add(shipping)
            .and_then(|sum| sum.checked_add(tax))
            .ok_or_else(|| AppError::Validation("Order amount is too large".to_string()))?;

        Ok(Self {
            subtotal,
            shipping,
            tax,
            total,
        })
    }
}

/// Sum `unit_price × quantity` over lines, failing on overflow.
pub fn subtotal_of<I>(lines: I) -> Result<i64>
where
    I: IntoIterator<Item = (i64, u32)>,
{
    lines
        .into_iter()
        .try_fold(0i64, |acc, (unit_price, quantity)| {
            unit_price
                .checked_mul(i64::from(quantity))
                .and_then(|line| acc.checked_add(line))
        })
        .ok_or_else(|| AppError::Validation("Order amount is too large".to_string()))
}
