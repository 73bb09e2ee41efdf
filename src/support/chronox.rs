//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mailpat.
//
// Mailpat is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailpat is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailpat. If not, see <http://www.gnu.org/licenses/>.

//! Helper traits which restore non-deprecated panicking methods (with 'x'
//! appended to disambiguate) and non-panicking wrappers for things that are
//! obviously infallible, since Chrono decided to make everything super noisy
//! instead.

use chrono::prelude::*;

pub trait FixedOffsetX {
    fn zero() -> Self;
    fn eastx(secs: i32) -> Self;
}

pub trait NaiveDateX {
    fn from_ymdx(y: i32, m: u32, d: u32) -> Self;
    fn and_hmsx(&self, h: u32, m: u32, s: u32) -> NaiveDateTime;
}

pub trait OffsetX {
    type DateTime;

    fn ymd_hmsx(
        &self,
        y: i32,
        m: u32,
        d: u32,
        h: u32,
        min: u32,
        s: u32,
    ) -> Self::DateTime;
}

/// Conversions between naive local times and epoch seconds in the time zone
/// of some reference time.
pub trait LocalEpochX {
    /// Interpret `naive` as a wall-clock time in the same time zone as
    /// `self` and return the corresponding UNIX timestamp.
    ///
    /// The offset is the one in effect at `naive`, not at `self`. An
    /// ambiguous time resolves to the earlier instant; a time skipped by a
    /// forward transition is moved forward by an hour.
    fn local_epoch(&self, naive: &NaiveDateTime) -> Option<i64>;
}

impl FixedOffsetX for FixedOffset {
    fn zero() -> Self {
        Self::eastx(0)
    }

    fn eastx(secs: i32) -> Self {
        Self::east_opt(secs).unwrap()
    }
}

impl NaiveDateX for NaiveDate {
    fn from_ymdx(y: i32, m: u32, d: u32) -> Self {
        Self::from_ymd_opt(y, m, d).unwrap()
    }

    fn and_hmsx(&self, h: u32, m: u32, s: u32) -> NaiveDateTime {
        self.and_hms_opt(h, m, s).unwrap()
    }
}

impl<T: chrono::TimeZone + chrono::Offset> OffsetX for T {
    type DateTime = DateTime<T>;

    fn ymd_hmsx(
        &self,
        y: i32,
        m: u32,
        d: u32,
        h: u32,
        min: u32,
        s: u32,
    ) -> Self::DateTime {
        self.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }
}

impl<Tz: TimeZone> LocalEpochX for DateTime<Tz> {
    fn local_epoch(&self, naive: &NaiveDateTime) -> Option<i64> {
        let tz = self.timezone();
        tz.from_local_datetime(naive)
            .earliest()
            .or_else(|| {
                let shifted =
                    naive.checked_add_signed(chrono::Duration::hours(1))?;
                tz.from_local_datetime(&shifted).earliest()
            })
            .map(|dt| dt.timestamp())
    }
}

/// Central European time with EU daylight saving rules, for tests which
/// need an offset that changes during the year.
#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CentralEurope;

#[cfg(test)]
impl CentralEurope {
    /// 01:00 UTC on the last Sunday of `month`, when the clocks change.
    fn transition(year: i32, month: u32) -> NaiveDateTime {
        let mut day = NaiveDate::from_ymdx(year, month, 31);
        while Weekday::Sun != day.weekday() {
            day = day.pred_opt().unwrap();
        }
        day.and_hmsx(1, 0, 0)
    }

    fn offset_at(utc: &NaiveDateTime) -> FixedOffset {
        let summer = *utc >= Self::transition(utc.year(), 3)
            && *utc < Self::transition(utc.year(), 10);
        FixedOffset::eastx(if summer { 7200 } else { 3600 })
    }
}

#[cfg(test)]
impl TimeZone for CentralEurope {
    type Offset = FixedOffset;

    fn from_offset(_: &FixedOffset) -> Self {
        CentralEurope
    }

    fn offset_from_local_date(
        &self,
        local: &NaiveDate,
    ) -> chrono::LocalResult<FixedOffset> {
        self.offset_from_local_datetime(&local.and_hmsx(0, 0, 0))
    }

    fn offset_from_local_datetime(
        &self,
        local: &NaiveDateTime,
    ) -> chrono::LocalResult<FixedOffset> {
        let candidates = [FixedOffset::eastx(7200), FixedOffset::eastx(3600)]
            .iter()
            .copied()
            .filter(|off| {
                let utc = *local
                    - chrono::Duration::seconds(i64::from(
                        off.local_minus_utc(),
                    ));
                Self::offset_at(&utc) == *off
            })
            .collect::<Vec<_>>();

        // Summer time is listed first since it is the earlier instant
        match candidates[..] {
            [] => chrono::LocalResult::None,
            [only] => chrono::LocalResult::Single(only),
            [earliest, latest] => {
                chrono::LocalResult::Ambiguous(earliest, latest)
            }
            _ => unreachable!(),
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        Self::offset_at(&utc.and_hmsx(0, 0, 0))
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        Self::offset_at(utc)
    }
}
