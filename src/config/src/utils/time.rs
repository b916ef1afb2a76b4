// Copyright 2024 Mobstore Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use chrono::{Datelike, Duration, NaiveDate, Utc};

// date keys are encoded into MOB file names as YYYYMMDD
pub const DATE_KEY_FORMAT: &str = "%Y%m%d";

#[inline(always)]
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

#[inline(always)]
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn parse_date_key(s: &str) -> Result<NaiveDate, anyhow::Error> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(anyhow::anyhow!("invalid date key [{s}]"));
    }
    NaiveDate::parse_from_str(s, DATE_KEY_FORMAT)
        .map_err(|_| anyhow::anyhow!("invalid date key [{s}]"))
}

#[inline(always)]
pub fn format_date_key(d: NaiveDate) -> String {
    d.format(DATE_KEY_FORMAT).to_string()
}

// weeks are ISO weeks, Monday is the first day
pub fn first_day_of_week(d: NaiveDate) -> NaiveDate {
    d - Duration::days(d.weekday().num_days_from_monday() as i64)
}

pub fn first_day_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap()
}

#[inline(always)]
pub fn is_same_week(a: NaiveDate, b: NaiveDate) -> bool {
    first_day_of_week(a) == first_day_of_week(b)
}

#[inline(always)]
pub fn is_same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}
