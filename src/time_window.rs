//! Allowed-hours gate for receipt issuing, in Kyiv local time.
//!
//! Receipts are blocked between the shift-close boundary and the shift-open
//! boundary so that the pipeline never races the nightly maintenance jobs.

use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;

use crate::config::ReceiptWindowConfig;

pub const KYIV_TZ: Tz = chrono_tz::Europe::Kiev;

/// Pure check against an explicit wall-clock time.
pub fn is_receipt_allowed_at(now: NaiveTime, window: &ReceiptWindowConfig) -> bool {
    !(now >= window.close_at || now < window.open_at)
}

pub fn is_receipt_allowed_now(window: &ReceiptWindowConfig) -> bool {
    let now = Utc::now().with_timezone(&KYIV_TZ).time();
    is_receipt_allowed_at(now, window)
}
