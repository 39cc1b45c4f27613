//! Date serial arithmetic for the two workbook epochs.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Which day serial 0 counts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateEpoch {
    /// Serial 1 is 1900-01-01, with the phantom 1900-02-29 at serial 60.
    #[default]
    Excel1900,
    /// Serial 0 is 1904-01-01.
    Excel1904,
}

// Largest day offset accepted before chrono would overflow.
const MAX_DAY_SPAN: i64 = 3_000_000;

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Serial number of a calendar date, `None` before the epoch.
pub fn date_to_serial(date: NaiveDate, epoch: DateEpoch) -> Option<f64> {
    let serial = match epoch {
        DateEpoch::Excel1900 => {
            let days = (date - ymd(1899, 12, 30)?).num_days();
            if date < ymd(1900, 3, 1)? {
                days - 1
            } else {
                days
            }
        }
        DateEpoch::Excel1904 => (date - ymd(1904, 1, 1)?).num_days(),
    };
    (serial >= 0).then_some(serial as f64)
}

/// Calendar parts of a serial. Fractions (time of day) are dropped.
pub fn serial_to_ymd(serial: f64, epoch: DateEpoch) -> Option<(i32, u32, u32)> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_DAY_SPAN as f64 {
        return None;
    }
    let day = serial.floor() as i64;
    let date = match epoch {
        DateEpoch::Excel1900 => {
            match day {
                0 => return Some((1900, 1, 0)),
                60 => return Some((1900, 2, 29)),
                _ => {}
            }
            let base = if day < 60 { ymd(1899, 12, 31)? } else { ymd(1899, 12, 30)? };
            base.checked_add_signed(Duration::days(day))?
        }
        DateEpoch::Excel1904 => ymd(1904, 1, 1)?.checked_add_signed(Duration::days(day))?,
    };
    Some((date.year(), date.month(), date.day()))
}

/// `DATE(year, month, day)` with month and day overflow rolled into the
/// neighbouring units. Years below 1900 are offsets from 1900.
pub fn serial_from_parts(year: f64, month: f64, day: f64, epoch: DateEpoch) -> Option<f64> {
    if !(year.is_finite() && month.is_finite() && day.is_finite()) {
        return None;
    }
    let mut year = year.trunc() as i64;
    if (0..1900).contains(&year) {
        year += 1900;
    }
    if !(1900..=9999).contains(&year) {
        return None;
    }
    let month = month.trunc() as i64;
    let day = day.trunc() as i64;
    if month.abs() > MAX_DAY_SPAN || day.abs() > MAX_DAY_SPAN {
        return None;
    }
    let months = year * 12 + month - 1;
    let first = ymd(
        i32::try_from(months.div_euclid(12)).ok()?,
        u32::try_from(months.rem_euclid(12) + 1).ok()?,
        1,
    )?;
    let date = first.checked_add_signed(Duration::days(day - 1))?;
    date_to_serial(date, epoch)
}
