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

//! Parsing of date range arguments, as used by `~d` and `~r`.
//!
//! The accepted forms are:
//!
//! - `<N`, `>N`, `=N`: less than, more than, or exactly `N` units ago.
//!
//! - `DD[/MM[/YY]]`: an absolute date, optionally followed by `-DATE` to
//!   give an end date, a bare `-` meaning "until now", or any number of
//!   relative adjustments.
//!
//! - Relative adjustments alone, anchored on today: `-N` moves the start
//!   back, `+N` moves the end forward, `*N` does both.
//!
//! Units are `y`ears, `m`onths, `w`eeks, and `d`ays.

use chrono::prelude::*;
use chrono::Duration;

use super::model::Range;
use super::token::extract_token;
use crate::support::chronox::LocalEpochX;
use crate::support::error::Error;

/// A broken-down wall-clock time whose fields may be out of range until
/// normalised, so that e.g. "31 January plus one month" becomes 2 March.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Tm {
    year: i32,
    /// 0-based.
    mon: i32,
    mday: i32,
    hour: i32,
    min: i32,
    sec: i32,
}

impl Tm {
    /// The earliest time a range can start at. This is 2 January rather
    /// than 1 January so that conversion from a local time east of UTC
    /// stays positive.
    const BASE: Tm = Tm {
        year: 1970,
        mon: 0,
        mday: 2,
        hour: 0,
        min: 0,
        sec: 0,
    };

    fn from_naive(dt: &NaiveDateTime) -> Self {
        Tm {
            year: dt.year(),
            mon: dt.month0() as i32,
            mday: dt.day() as i32,
            hour: dt.hour() as i32,
            min: dt.minute() as i32,
            sec: dt.second() as i32,
        }
    }

    fn to_naive(&self) -> Option<NaiveDateTime> {
        let year = self.year.checked_add(self.mon.div_euclid(12))?;
        let month = self.mon.rem_euclid(12) as u32 + 1;
        let first = NaiveDate::from_ymd_opt(year, month, 1)?
            .and_hms_opt(0, 0, 0)?;
        let offset = Duration::days(i64::from(self.mday) - 1)
            + Duration::hours(i64::from(self.hour))
            + Duration::minutes(i64::from(self.min))
            + Duration::seconds(i64::from(self.sec));
        first.checked_add_signed(offset)
    }

    fn normalized(&self) -> Option<Self> {
        self.to_naive().map(|dt| Tm::from_naive(&dt))
    }

    fn date_key(&self) -> (i32, i32, i32) {
        (self.year, self.mon, self.mday)
    }

    fn start_of_day(mut self) -> Self {
        self.hour = 0;
        self.min = 0;
        self.sec = 0;
        self
    }

    fn end_of_day(mut self) -> Self {
        self.hour = 23;
        self.min = 59;
        self.sec = 59;
        self
    }
}

/// Parse a date range from the start of `input`.
///
/// Relative parts are resolved against `now`, and the resulting wall-clock
/// times are interpreted in `now`'s time zone, each with the offset in
/// effect on its own date. Returns the range and the remaining input.
pub fn eat_date<'a, Tz: TimeZone>(
    input: &'a str,
    now: &DateTime<Tz>,
) -> Result<(Range, &'a str), Error> {
    // `=` would otherwise end the token before it starts
    let (op, body) = match input.chars().next() {
        Some(op @ '<') | Some(op @ '>') | Some(op @ '=') => {
            (Some(op), &input[1..])
        }
        _ => (None, input),
    };

    let (token, rest) = extract_token(body)?;
    let expr = match op {
        Some(op) => format!("{}{}", op, token),
        None => token,
    };
    if expr.is_empty() {
        return Err(Error::EmptyExpression);
    }

    Ok((parse_date(&expr, now)?, rest))
}

fn parse_date<Tz: TimeZone>(
    expr: &str,
    now: &DateTime<Tz>,
) -> Result<Range, Error> {
    let now_tm = Tm::from_naive(&now.naive_local());
    let epoch = |tm: &Tm| {
        tm.to_naive()
            .and_then(|naive| now.local_epoch(&naive))
            .ok_or_else(|| Error::Syntax(format!("Invalid date: {}", expr)))
    };

    if let Some(op) = expr.chars().next().filter(|c| "<>=".contains(*c)) {
        let mut then = if '=' == op {
            now_tm.end_of_day()
        } else {
            now_tm
        };
        let rest = get_offset(&mut then, &expr[1..], -1)
            .ok_or_else(|| invalid_relative(expr))?;
        if !rest.trim().is_empty() {
            return Err(invalid_relative(rest));
        }

        return Ok(match op {
            '<' => Range::new(epoch(&then)?, now.timestamp()),
            '>' => Range::new(epoch(&Tm::BASE)?, epoch(&then)?),
            _ => Range::new(epoch(&then.start_of_day())?, epoch(&then)?),
        });
    }

    let mut pc = expr;
    let mut min = Tm::BASE;
    let have_min = expr.starts_with(|c: char| c.is_ascii_digit());
    if have_min {
        pc = get_date(pc, &mut min, &now_tm)?.trim_start();
        if let Some(after) = pc.strip_prefix('-') {
            if after.trim().is_empty() {
                return Ok(Range::new(epoch(&min)?, Range::UNBOUNDED));
            }
        }
    }

    let base_min = min;
    if !have_min {
        min = now_tm.start_of_day();
    }
    // With no adjustments, the range is the single day `min` falls on
    let mut max = min.end_of_day();

    parse_adjustments(pc, &mut min, &mut max, have_min, base_min, &now_tm)?;

    let (mut min, mut max) = match (min.normalized(), max.normalized()) {
        (Some(min), Some(max)) => (min, max),
        _ => return Err(Error::Syntax(format!("Invalid date: {}", expr))),
    };
    if min.date_key() > max.date_key() {
        std::mem::swap(&mut min, &mut max);
        min = min.start_of_day();
        max = max.end_of_day();
    }

    Ok(Range::new(epoch(&min)?, epoch(&max)?))
}

fn parse_adjustments(
    mut s: &str,
    min: &mut Tm,
    max: &mut Tm,
    have_min: bool,
    base_min: Tm,
    now: &Tm,
) -> Result<(), Error> {
    let mut parsed_any = false;

    while let Some(op) = s.chars().next() {
        let after = s[op.len_utf8()..].trim_start();
        let rest = match op {
            '-' => match get_offset(min, after, -1) {
                Some(rest) => rest,
                None if !parsed_any => {
                    // An absolute end date
                    let rest = get_date(after, max, now)?.trim_start();
                    if !have_min {
                        *min = base_min;
                    }
                    if !rest.is_empty() {
                        return Err(invalid_relative(rest));
                    }
                    return Ok(());
                }
                None => return Err(invalid_relative(s)),
            },
            '+' => get_offset(max, after, 1)
                .ok_or_else(|| invalid_relative(s))?,
            '*' => {
                let rest = get_offset(min, after, -1)
                    .ok_or_else(|| invalid_relative(s))?;
                get_offset(max, after, 1);
                rest
            }
            _ => return Err(invalid_relative(s)),
        };

        parsed_any = true;
        s = rest.trim_start();
    }

    Ok(())
}

fn invalid_relative(at: &str) -> Error {
    Error::Syntax(format!("Invalid relative date: {}", at))
}

/// Parse `DD[/MM[/YY]]` into the date fields of `tm`. Missing fields are
/// taken from `now`.
fn get_date<'a>(s: &'a str, tm: &mut Tm, now: &Tm) -> Result<&'a str, Error> {
    let (mday, rest) = leading_int(s);
    if mday < 1 || mday > 31 {
        return Err(Error::Syntax(format!("Invalid day of month: {}", s)));
    }
    tm.mday = mday;

    let s = match rest.strip_prefix('/') {
        Some(s) => s,
        None => {
            tm.mon = now.mon;
            tm.year = now.year;
            return Ok(rest);
        }
    };

    let (mon, rest) = leading_int(s);
    if mon < 1 || mon > 12 {
        return Err(Error::Syntax(format!("Invalid month: {}", s)));
    }
    tm.mon = mon - 1;

    let s = match rest.strip_prefix('/') {
        Some(s) => s,
        None => {
            tm.year = now.year;
            return Ok(rest);
        }
    };

    let (year, rest) = leading_int(s);
    tm.year = if year < 70 {
        year + 2000
    } else if year > 1900 {
        year
    } else {
        year + 1900
    };
    Ok(rest)
}

/// Parse an offset like `3d` and apply it to `tm`, forcing its sign to
/// that of `sign`.
///
/// Returns the text after the offset, or `None` (leaving `tm` untouched)
/// if `s` does not start with an offset.
fn get_offset<'a>(tm: &mut Tm, s: &'a str, sign: i32) -> Option<&'a str> {
    // Any explicit sign is overridden by `sign`
    let digits = s.strip_prefix(|c: char| '-' == c || '+' == c).unwrap_or(s);
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or_else(|| digits.len());
    if 0 == end {
        return None;
    }

    let magnitude: i32 = digits[..end].parse().ok()?;
    let offset = if sign < 0 { -magnitude } else { magnitude };

    let rest = &digits[end..];
    let mut adjusted = *tm;
    match rest.chars().next()? {
        'y' => adjusted.year = adjusted.year.checked_add(offset)?,
        'm' => adjusted.mon = adjusted.mon.checked_add(offset)?,
        'w' => {
            adjusted.mday = adjusted.mday.checked_add(offset.checked_mul(7)?)?
        }
        'd' => adjusted.mday = adjusted.mday.checked_add(offset)?,
        _ => return None,
    }

    *tm = adjusted.normalized()?;
    Some(&rest[1..])
}

/// Parse the leading decimal digits of `s`. A value too large to represent
/// is saturated so that range checks reject it.
fn leading_int(s: &str) -> (i32, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or_else(|| s.len());
    let value = if 0 == end {
        0
    } else {
        s[..end].parse().unwrap_or(i32::MAX)
    };
    (value, &s[end..])
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;
    use crate::support::chronox::{CentralEurope, FixedOffsetX, OffsetX};

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::zero().ymd_hmsx(2020, 6, 15, 12, 30, 0)
    }

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        FixedOffset::zero().ymd_hmsx(y, mo, d, h, mi, s).timestamp()
    }

    fn date(s: &str) -> Range {
        let (range, rest) = eat_date(s, &now()).unwrap();
        assert_eq!("", rest);
        range
    }

    fn syntax_error(s: &str) -> String {
        match eat_date(s, &now()) {
            Err(Error::Syntax(msg)) => msg,
            r => panic!("Unexpected result for {:?}: {:?}", s, r),
        }
    }

    #[test]
    fn comparison_forms() {
        assert_eq!(
            Range::new(ts(2020, 6, 13, 12, 30, 0), now().timestamp()),
            date("<2d")
        );
        assert_eq!(
            Range::new(ts(1970, 1, 2, 0, 0, 0), ts(2020, 6, 8, 12, 30, 0)),
            date(">1w")
        );
        assert_eq!(
            Range::new(ts(2020, 6, 14, 0, 0, 0), ts(2020, 6, 14, 23, 59, 59)),
            date("=1d")
        );
        assert_eq!(
            Range::new(ts(2019, 6, 15, 12, 30, 0), now().timestamp()),
            date("<1y")
        );
        assert_eq!(
            Range::new(ts(2020, 3, 15, 12, 30, 0), now().timestamp()),
            date("<3m")
        );
    }

    #[test]
    fn exact_age_after_whitespace() {
        let (range, rest) = eat_date("=2w ~N", &now()).unwrap();
        assert_eq!(
            Range::new(ts(2020, 6, 1, 0, 0, 0), ts(2020, 6, 1, 23, 59, 59)),
            range
        );
        assert_eq!("~N", rest);
        assert_eq!("Invalid relative date: =", syntax_error("="));
    }

    #[test]
    fn offset_follows_each_date() {
        let summer = CentralEurope
            .with_ymd_and_hms(2020, 6, 15, 12, 30, 0)
            .unwrap();

        // Midnight CET, not CEST
        let (range, _) = eat_date("1/1/2020", &summer).unwrap();
        assert_eq!(Range::new(1577833200, 1577833200 + 86399), range);

        let (range, _) = eat_date("1/6/2020", &summer).unwrap();
        assert_eq!(
            Range::new(ts(2020, 5, 31, 22, 0, 0), ts(2020, 6, 1, 21, 59, 59)),
            range
        );

        // The range spans the change back to CET
        let (range, _) = eat_date("1/10/2020-1/11/2020", &summer).unwrap();
        assert_eq!(
            Range::new(ts(2020, 9, 30, 22, 0, 0), ts(2020, 11, 1, 22, 59, 59)),
            range
        );
    }

    #[test]
    fn absolute_dates() {
        assert_eq!(
            Range::new(ts(2020, 3, 1, 0, 0, 0), ts(2020, 3, 1, 23, 59, 59)),
            date("1/3/2020")
        );
        assert_eq!(
            Range::new(ts(2020, 6, 5, 0, 0, 0), ts(2020, 6, 5, 23, 59, 59)),
            date("5")
        );
        assert_eq!(
            Range::new(ts(2020, 2, 5, 0, 0, 0), ts(2020, 2, 5, 23, 59, 59)),
            date("5/2")
        );
        assert_eq!(
            Range::new(ts(2020, 3, 1, 0, 0, 0), Range::UNBOUNDED),
            date("1/3/2020-")
        );
        assert_eq!(
            Range::new(ts(2069, 1, 1, 0, 0, 0), ts(2069, 1, 1, 23, 59, 59)),
            date("1/1/69")
        );
        assert_eq!(
            Range::new(ts(1999, 1, 1, 0, 0, 0), ts(1999, 1, 1, 23, 59, 59)),
            date("1/1/99")
        );
    }

    #[test]
    fn absolute_ranges() {
        let year = Range::new(
            ts(2020, 1, 1, 0, 0, 0),
            ts(2020, 12, 31, 23, 59, 59),
        );
        assert_eq!(year, date("1/1/2020-31/12/2020"));
        assert_eq!(year, date("31/12/2020-1/1/2020"));

        assert_eq!(
            Range::new(ts(1970, 1, 2, 0, 0, 0), ts(2020, 1, 1, 23, 59, 59)),
            date("-1/1/2020")
        );
    }

    #[test]
    fn relative_adjustments() {
        assert_eq!(
            Range::new(ts(2020, 6, 12, 0, 0, 0), ts(2020, 6, 15, 23, 59, 59)),
            date("-3d")
        );
        assert_eq!(
            Range::new(ts(2020, 6, 12, 0, 0, 0), ts(2020, 6, 16, 23, 59, 59)),
            date("-3d+1d")
        );
        assert_eq!(
            Range::new(ts(2020, 2, 23, 0, 0, 0), ts(2020, 3, 8, 23, 59, 59)),
            date("1/3/2020*1w")
        );
        assert_eq!(
            Range::new(ts(2020, 3, 1, 0, 0, 0), ts(2020, 3, 3, 23, 59, 59)),
            date("1/3/2020+2d")
        );
    }

    #[test]
    fn month_arithmetic_normalises() {
        assert_eq!(
            Range::new(ts(2020, 1, 31, 0, 0, 0), ts(2020, 3, 2, 23, 59, 59)),
            date("31/1/2020+1m")
        );
    }

    #[test]
    fn remaining_input() {
        let (_, rest) = eat_date("<1d ~N", &now()).unwrap();
        assert_eq!("~N", rest);
        let (_, rest) = eat_date("1/3/2020|~F", &now()).unwrap();
        assert_eq!("|~F", rest);
    }

    #[test]
    fn errors() {
        assert!(syntax_error("32/1/2020").starts_with("Invalid day of month"));
        assert!(syntax_error("0").starts_with("Invalid day of month"));
        assert!(syntax_error("1/13").starts_with("Invalid month"));
        assert_eq!(
            "Invalid relative date: x",
            syntax_error("1/1/2020x")
        );
        assert_eq!("Invalid relative date: <", syntax_error("<"));
        assert_eq!("Invalid relative date: +q", syntax_error("-1d+q"));
        assert_matches!(Err(Error::EmptyExpression), eat_date("", &now()));
        assert_matches!(
            Err(Error::EmptyExpression),
            eat_date("~N", &now())
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        #[test]
        fn windows_are_symmetric(days in 0i64..1000) {
            let range = date(&format!("15/6/2020*{}d", days));
            let day = ts(2020, 6, 15, 0, 0, 0);
            prop_assert_eq!(day - days * 86400, range.min);
            prop_assert_eq!(day + 86399 + days * 86400, range.max);
        }

        #[test]
        fn recent_comparison_contains_now(days in 1i32..5000) {
            let range = date(&format!("<{}d", days));
            prop_assert!(range.contains(now().timestamp()));
            prop_assert!(range.contains(now().timestamp() - 86400));
            prop_assert!(!range.contains(
                now().timestamp() - i64::from(days + 1) * 86400));
        }
    }
}
