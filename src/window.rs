use std::ops::ControlFlow;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::provider::{TransferOrder, TransferRecord};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
pub const DEAD_ADDRESS: &str = "0x000000000000000000000000000000000000dead";

const SECS_PER_DAY: u64 = 86_400;

/// Inclusive `[lookback_limit, start_limit]` range of unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_limit: u64,
    pub lookback_limit: u64,
}

impl TimeWindow {
    pub fn new(start_limit: u64, lookback_limit: u64) -> Self {
        Self { start_limit, lookback_limit }
    }

    /// Window ending `settle_secs` before `now` and reaching back `lookback_days`.
    pub fn lookback(now: u64, lookback_days: u64, settle_secs: u64) -> Self {
        let start_limit = now.saturating_sub(settle_secs);
        let lookback_limit = now.saturating_sub(lookback_days.saturating_mul(SECS_PER_DAY));
        Self::new(start_limit, lookback_limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Count,
    Skip,
    /// Older than the window on a newest-first stream: nothing after this can count.
    Stop,
}

/// Mint and burn legs are transfers from/to the zero or dead address, never sales.
pub fn is_mint_or_burn(record: &TransferRecord) -> bool {
    [&record.from, &record.to].into_iter().flatten().any(|addr| {
        addr.eq_ignore_ascii_case(ZERO_ADDRESS) || addr.eq_ignore_ascii_case(DEAD_ADDRESS)
    })
}

pub fn include_record(record: &TransferRecord, window: &TimeWindow, order: TransferOrder) -> Inclusion {
    let Some(ts) = record.timestamp else {
        return Inclusion::Skip;
    };
    if ts > window.start_limit {
        return Inclusion::Skip;
    }
    if ts < window.lookback_limit {
        return match order {
            TransferOrder::NewestFirst => Inclusion::Stop,
            TransferOrder::Unordered => Inclusion::Skip,
        };
    }
    if is_mint_or_burn(record) || !record.is_sale {
        return Inclusion::Skip;
    }
    Inclusion::Count
}

/// Per-walk filter state: counts sales and checks the provider really is
/// newest-first. A timestamp going backwards drops the walk to `Unordered`,
/// so the rest of the history is filtered instead of cut short.
#[derive(Debug)]
pub struct TransferFilter {
    window: TimeWindow,
    order: TransferOrder,
    label: String,
    last_ts: Option<u64>,
    pub counted: u64,
}

impl TransferFilter {
    pub fn new(window: TimeWindow, order: TransferOrder, label: impl Into<String>) -> Self {
        Self {
            window,
            order,
            label: label.into(),
            last_ts: None,
            counted: 0,
        }
    }

    /// Feed one page. Breaks at the first out-of-window record; the rest of the page is ignored.
    pub fn consume(&mut self, records: Vec<TransferRecord>) -> ControlFlow<()> {
        for record in &records {
            self.check_order(record.timestamp);
            match include_record(record, &self.window, self.order) {
                Inclusion::Count => self.counted += 1,
                Inclusion::Skip => {}
                Inclusion::Stop => return ControlFlow::Break(()),
            }
        }
        ControlFlow::Continue(())
    }

    fn check_order(&mut self, ts: Option<u64>) {
        let Some(ts) = ts else { return };
        if self.order == TransferOrder::NewestFirst {
            if let Some(prev) = self.last_ts {
                if ts > prev {
                    warn!(
                        "{}: transfers not newest-first ({ts} after {prev}), scanning the full history",
                        self.label
                    );
                    self.order = TransferOrder::Unordered;
                }
            }
        }
        self.last_ts = Some(ts);
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Parse an RFC 3339 / ISO 8601 UTC timestamp string to Unix seconds.
/// Fractional seconds and offsets are dropped; dates before 1970 give `None`.
pub fn parse_iso_to_unix_secs(s: &str) -> Option<u64> {
    let s = s.trim();
    if !s.is_ascii() {
        return None;
    }
    let s = s.strip_suffix('Z').unwrap_or(s);
    let s = if let Some(dot) = s.find('.') { &s[..dot] } else { s };
    let s = if s.len() > 19 {
        let b = s.as_bytes()[19];
        if b == b'+' || b == b'-' { &s[..19] } else { s }
    } else {
        s
    };
    let (year, month, day, hour, minute, second): (i64, i64, i64, i64, i64, i64) =
        if s.len() == 10 {
            (s[0..4].parse().ok()?, s[5..7].parse().ok()?, s[8..10].parse().ok()?, 0, 0, 0)
        } else if s.len() >= 19 {
            (s[0..4].parse().ok()?, s[5..7].parse().ok()?, s[8..10].parse().ok()?,
             s[11..13].parse().ok()?, s[14..16].parse().ok()?, s[17..19].parse().ok()?)
        } else {
            return None;
        };

    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    let jdn = day + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32045;
    let unix_days = jdn - 2_440_588;
    u64::try_from(unix_days * 86400 + hour * 3600 + minute * 60 + second).ok()
}
