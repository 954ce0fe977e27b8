//! Fixed-point money and quantity conversions for the fiscal API.
//!
//! Prices travel as integer minor units (kopecks), quantities as integers
//! scaled by 1000. All intermediate arithmetic is decimal; binary floats
//! never touch money.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::models::checkbox::{GoodItem, ReceiptGood};
use crate::models::deal::PurchaseLine;

/// Currency quantum: two fractional digits.
pub const MONEY_SCALE: u32 = 2;

const QUANTITY_SCALE: i64 = 1000;

/// Lenient decimal parse of a raw CRM field value. Accepts both `.` and `,`
/// as the decimal separator; anything unparseable is `None`.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => {
            let normalized = s.trim().replace(',', ".");
            if normalized.is_empty() {
                return None;
            }
            Decimal::from_str(&normalized).ok()
        }
        _ => None,
    }
}

/// Rounds to the currency quantum and converts to integer minor units.
/// Negative amounts clamp to 0; a malformed amount never aborts a receipt,
/// it degrades to 0 upstream at parse time.
pub fn to_minor_units(amount: Decimal) -> i64 {
    let quantized = amount.round_dp(MONEY_SCALE);
    (quantized * Decimal::ONE_HUNDRED)
        .to_i64()
        .unwrap_or(0)
        .max(0)
}

/// Quantity in the provider's 1/1000 fixed-point encoding, truncated.
pub fn quantity_millis(quantity: Decimal) -> i64 {
    (quantity * Decimal::from(QUANTITY_SCALE))
        .trunc()
        .to_i64()
        .unwrap_or(0)
}

/// Line total in minor units. The scale-truncate-multiply-divide order
/// mirrors the provider's own integer quantity encoding; reordering shifts
/// cent-level rounding for fractional quantities.
pub fn line_total_minor(price_minor: i64, quantity: Decimal) -> i64 {
    if quantity <= Decimal::ZERO {
        return 0;
    }
    let q1000 = quantity_millis(quantity);
    (price_minor * q1000 / QUANTITY_SCALE).max(0)
}

/// Converts purchase lines into fiscal goods entries plus the receipt total.
/// Lines with non-positive price or quantity are omitted entirely.
pub fn build_goods_and_sum(lines: &[PurchaseLine]) -> (Vec<ReceiptGood>, i64) {
    let mut goods = Vec::with_capacity(lines.len());
    let mut total_minor: i64 = 0;
    for (idx, line) in lines.iter().enumerate() {
        let price_minor = to_minor_units(line.price);
        if price_minor <= 0 || line.quantity <= Decimal::ZERO {
            continue;
        }
        total_minor += line_total_minor(price_minor, line.quantity);
        goods.push(ReceiptGood {
            good: GoodItem {
                code: (idx + 1).to_string(),
                name: line.name.clone(),
                price: price_minor,
                tax: vec![8],
            },
            quantity: quantity_millis(line.quantity),
            is_return: false,
        });
    }
    (goods, total_minor)
}
