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

//! Parsing of numeric range arguments, as used by `~m`, `~n`, `~X` and `~z`.
//!
//! Two grammars are supported, tried in order:
//!
//! - Relative: `LEFT,RIGHT`. Numbers may be negative and are offsets from
//!   the current message.
//!
//! - Absolute: `LEFT-RIGHT`. Numbers are non-negative.
//!
//! Each side is optional and may be `.` (the current message), `^` (the
//! first message), `$` (unbounded), or a decimal or `0x` hexadecimal number
//! with an optional `K` or `M` suffix.

use lazy_static::lazy_static;
use regex::{Match, Regex};

use super::model::Range;
use crate::support::error::Error;

const SLOT_REL: &str =
    r"[ \t]*([.^$]|-?(?:0x[0-9a-fA-F]+|[0-9]+)[MmKk]?)?[ \t]*";
const SLOT_ABS: &str =
    r"[ \t]*([.^$]|(?:0x[0-9a-fA-F]+|[0-9]+)[MmKk]?)?[ \t]*";

const KILO: i64 = 1024;
const MEGA: i64 = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeKind {
    Relative,
    Absolute,
}

impl RangeKind {
    /// Whether a range of this kind whose text is `matched` needs to know
    /// the current message.
    fn needs_context(self, matched: &str) -> bool {
        let trigger: &[char] = match self {
            RangeKind::Relative => {
                &['.', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9']
            }
            RangeKind::Absolute => &['.'],
        };
        matched.contains(trigger)
    }
}

#[derive(Clone, Copy, Debug)]
enum Side {
    Left,
    Right,
}

#[derive(Debug)]
struct RangeSpec {
    kind: RangeKind,
    regex: Regex,
    left: usize,
    right: usize,
}

/// The compiled range grammars.
///
/// These never change, so normally the process-wide instance from
/// `RangeSpecs::shared()` is used.
#[derive(Debug)]
pub struct RangeSpecs {
    specs: Vec<RangeSpec>,
}

lazy_static! {
    static ref SHARED: RangeSpecs =
        RangeSpecs::new().expect("range grammar failed to compile");
}

impl RangeSpecs {
    pub fn new() -> Result<Self, Error> {
        let compile = |kind, slot: &str, sep: &str| {
            let raw = format!("^{}{}{}", slot, sep, slot);
            Regex::new(&raw)
                .map(|regex| RangeSpec {
                    kind,
                    regex,
                    left: 1,
                    right: 2,
                })
                .map_err(|e| Error::Regex {
                    pattern: raw.clone(),
                    message: e.to_string(),
                })
        };

        Ok(RangeSpecs {
            specs: vec![
                compile(RangeKind::Relative, SLOT_REL, ",")?,
                compile(RangeKind::Absolute, SLOT_ABS, "-")?,
            ],
        })
    }

    pub fn shared() -> &'static RangeSpecs {
        &SHARED
    }

    /// Parse a range from the start of `input`.
    ///
    /// `current` is the 1-based number of the current message, if there is
    /// one. Returns the range, with its bounds put in order, and the
    /// remaining input with leading whitespace removed.
    pub fn eat_range<'a>(
        &self,
        input: &'a str,
        current: Option<i64>,
    ) -> Result<(Range, &'a str), Error> {
        // A simple-search template like `~m %s` leaves the range quoted
        let (quoted, s) = match input.strip_prefix('"') {
            Some(s) => (true, s),
            None => (false, input),
        };

        for spec in &self.specs {
            let captures = match spec.regex.captures(s) {
                Some(c) => c,
                None => continue,
            };
            let end = captures.get(0).map_or(0, |m| m.end());

            // A range that parses but lacks context is not retried with the
            // other grammar.
            if current.is_none() && spec.kind.needs_context(&s[..end]) {
                return Err(Error::NoCurrentMessage);
            }

            let min = scan_slot(
                captures.get(spec.left),
                Side::Left,
                spec.kind,
                current,
            )?;
            let max = scan_slot(
                captures.get(spec.right),
                Side::Right,
                spec.kind,
                current,
            )?;

            let mut rest = &s[end..];
            if quoted {
                rest = rest.strip_prefix('"').unwrap_or(rest);
            }
            return Ok((Range::new(min, max).ordered(), rest.trim_start()));
        }

        Err(Error::Syntax(format!(
            "invalid range: {}",
            s.split_whitespace().next().unwrap_or("")
        )))
    }
}

fn scan_slot(
    slot: Option<Match<'_>>,
    side: Side,
    kind: RangeKind,
    current: Option<i64>,
) -> Result<i64, Error> {
    let text = match slot {
        None => {
            return Ok(match side {
                Side::Left => 1,
                Side::Right => Range::UNBOUNDED,
            })
        }
        Some(m) => m.as_str(),
    };

    match text {
        "^" => Ok(1),
        "$" => Ok(Range::UNBOUNDED),
        "." => current.ok_or(Error::NoCurrentMessage),
        _ => {
            let overflow =
                || Error::Syntax(format!("invalid range: {}", text));

            let mut num = parse_number(text).ok_or_else(overflow)?;
            if RangeKind::Relative == kind {
                num = current
                    .ok_or(Error::NoCurrentMessage)?
                    .checked_add(num)
                    .ok_or_else(overflow)?;
            }
            Ok(num)
        }
    }
}

/// Parse a number matched by the slot grammar, applying any `K`/`M` suffix.
fn parse_number(text: &str) -> Option<i64> {
    let (text, multiplier) = match text.as_bytes().last() {
        Some(b'k') | Some(b'K') => (&text[..text.len() - 1], KILO),
        Some(b'm') | Some(b'M') => (&text[..text.len() - 1], MEGA),
        _ => (text, 1),
    };
    let (negative, text) = match text.strip_prefix('-') {
        Some(t) => (true, t),
        None => (false, text),
    };

    let magnitude = if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        text.parse::<i64>().ok()?
    };

    let num = magnitude.checked_mul(multiplier)?;
    Some(if negative { -num } else { num })
}
