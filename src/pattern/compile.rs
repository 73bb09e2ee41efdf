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

//! The pattern compiler.
//!
//! Patterns are parsed left-to-right in a single pass. Terms accumulate in a
//! flat list which is folded into an `And` or `Or` node whenever the
//! operator changes, so that adjacency binds tighter than `|` and both are
//! left-associative:
//!
//! ```text
//! A B|C  =>  (or (and A B) C)
//! A|B C  =>  (and (or A B) C)
//! ```

use chrono::prelude::*;
use log::debug;
use regex::RegexBuilder;

use super::date::eat_date;
use super::model::*;
use super::range::RangeSpecs;
use super::token::extract_token;
use crate::support::error::Error;

/// Everything outside the pattern text which affects how it compiles.
#[derive(Clone, Debug)]
pub struct CompileContext<Tz: TimeZone = Local> {
    /// The predicate classes which may be used.
    pub capabilities: Capabilities,
    /// The time relative dates are resolved against. Absolute dates are
    /// taken to be in its time zone.
    pub now: DateTime<Tz>,
    /// The 1-based number of the current message, needed for relative
    /// message ranges.
    pub current_message: Option<i64>,
}

impl CompileContext {
    pub fn new(capabilities: Capabilities) -> Self {
        CompileContext {
            capabilities,
            now: Local::now(),
            current_message: None,
        }
    }
}

impl<Tz: TimeZone> CompileContext<Tz> {
    pub fn with_current_message(mut self, current: Option<i64>) -> Self {
        self.current_message = current;
        self
    }
}

/// Compile `text` into a pattern.
pub fn compile<Tz: TimeZone>(
    text: &str,
    ctx: &CompileContext<Tz>,
) -> Result<Pattern, Error> {
    let compiler = Compiler {
        ctx,
        ranges: RangeSpecs::shared(),
    };
    let pattern = compiler.parse(text)?;
    debug!("Compiled {:?} into {}", text, pattern);
    Ok(pattern)
}

struct Compiler<'a, Tz: TimeZone> {
    ctx: &'a CompileContext<Tz>,
    ranges: &'a RangeSpecs,
}

/// Modifiers (`!`, `^`, `@`) seen since the last term.
#[derive(Clone, Copy, Debug, Default)]
struct Modifiers {
    negate: bool,
    all_addresses: bool,
    via_alias: bool,
}

impl Modifiers {
    fn apply(self, pattern: &mut Pattern) {
        pattern.negate ^= self.negate;
        pattern.all_addresses |= self.all_addresses;
        pattern.via_alias |= self.via_alias;
    }
}

struct Fold {
    terms: Vec<Pattern>,
    /// Whether the pending terms are joined by `|`.
    or: bool,
    /// Whether the next term is joined to the previous one by adjacency.
    implicit: bool,
}

impl Fold {
    fn new() -> Self {
        Fold {
            terms: Vec::new(),
            or: false,
            implicit: true,
        }
    }

    fn push(&mut self, term: Pattern) {
        if self.implicit && self.or {
            // A|B C == (A|B) C
            self.collapse(Node::Or);
            self.or = false;
        }

        self.terms.push(term);
        self.implicit = true;
    }

    /// Handle a `|`. `at` is the remaining input, for error reporting.
    fn bar(&mut self, at: &str) -> Result<(), Error> {
        if !self.or {
            if self.terms.is_empty() {
                return Err(Error::BadPattern(at.to_owned()));
            }

            // A B|C == (A B)|C
            self.collapse(Node::And);
            self.or = true;
        }

        self.implicit = false;
        Ok(())
    }

    fn collapse(&mut self, combine: fn(Vec<Pattern>) -> Node) {
        if self.terms.len() > 1 {
            let terms = std::mem::replace(&mut self.terms, Vec::new());
            self.terms.push(Pattern::new(combine(terms)));
        }
    }

    fn finish(mut self) -> Result<Pattern, Error> {
        if self.terms.len() > 1 {
            let node = if self.or {
                Node::Or(self.terms)
            } else {
                Node::And(self.terms)
            };
            Ok(Pattern::new(node))
        } else {
            self.terms.pop().ok_or(Error::EmptyPattern)
        }
    }
}

/// Split `s`, which starts with `(`, into the text within the parentheses
/// and the text after the matching `)`.
fn split_group(s: &str) -> Option<(&str, &str)> {
    let mut level = 0;
    for (ix, ch) in s.char_indices() {
        match ch {
            '(' => level += 1,
            ')' => {
                level -= 1;
                if 0 == level {
                    return Some((&s[1..ix], &s[ix + 1..]));
                }
            }
            _ => (),
        }
    }

    None
}

impl<Tz: TimeZone> Compiler<'_, Tz> {
    fn parse(&self, text: &str) -> Result<Pattern, Error> {
        let mut fold = Fold::new();
        let mut mods = Modifiers::default();
        let mut s = text;

        loop {
            s = s.trim_start();
            let ch = match s.chars().next() {
                Some(ch) => ch,
                None => break,
            };

            match ch {
                '^' => {
                    mods.all_addresses = !mods.all_addresses;
                    s = &s[1..];
                }
                '!' => {
                    mods.negate = !mods.negate;
                    s = &s[1..];
                }
                '@' => {
                    mods.via_alias = !mods.via_alias;
                    s = &s[1..];
                }
                '|' => {
                    fold.bar(s)?;
                    mods = Modifiers::default();
                    s = &s[1..];
                }
                '~' | '=' | '%' => {
                    let after = &s[1..];
                    if after.is_empty() {
                        return Err(Error::MissingPattern(s.to_owned()));
                    }

                    let (mut term, rest) = if after.starts_with('(') {
                        let (inner, rest) =
                            split_group(after).ok_or_else(|| {
                                Error::MismatchedBrackets(after.to_owned())
                            })?;
                        let sub = self.parse(inner)?;
                        (Pattern::new(Node::Thread(Box::new(sub))), rest)
                    } else {
                        self.parse_predicate(ch, after)?
                    };

                    mods.apply(&mut term);
                    mods = Modifiers::default();
                    fold.push(term);
                    s = rest;
                }
                '(' => {
                    let (inner, rest) = split_group(s)
                        .ok_or_else(|| Error::MismatchedParens(s.to_owned()))?;
                    let mut group = self.parse(inner)?;
                    mods.apply(&mut group);
                    mods = Modifiers::default();
                    fold.push(group);
                    s = rest;
                }
                _ => return Err(Error::BadPattern(s.to_owned())),
            }
        }

        fold.finish()
    }

    /// Parse the predicate introduced by `marker`. `s` starts with the tag
    /// character.
    fn parse_predicate<'s>(
        &self,
        marker: char,
        s: &'s str,
    ) -> Result<(Pattern, &'s str), Error> {
        let tag = s.chars().next().ok_or(Error::MissingParameter)?;
        let entry = lookup_tag(tag).ok_or(Error::InvalidTag(tag))?;
        if !entry.class.is_empty()
            && !self.ctx.capabilities.intersects(entry.class)
        {
            return Err(Error::Capability(tag));
        }

        let s = s[tag.len_utf8()..].trim_start();
        if ArgKind::None != entry.arg && s.is_empty() {
            return Err(Error::MissingParameter);
        }

        let (operand, rest) = match entry.arg {
            ArgKind::None => (Operand::None, s),
            ArgKind::Text => {
                let (text, rest) = eat_text(marker, s)?;
                (Operand::Text(text), rest)
            }
            ArgKind::Range => {
                let (range, rest) =
                    self.ranges.eat_range(s, self.ctx.current_message)?;
                (Operand::Range(range), rest)
            }
            ArgKind::Date => {
                let (range, rest) = eat_date(s, &self.ctx.now)?;
                (Operand::Range(range), rest)
            }
        };

        Ok((Pattern::predicate(entry.kind, operand), rest))
    }
}

/// Parse the text argument of a predicate. How it is matched depends on
/// the marker which introduced the predicate: `=` for a plain substring,
/// `%` for an address group, `~` for a regular expression.
///
/// Matching is case-insensitive unless the argument contains an upper-case
/// letter.
fn eat_text(marker: char, s: &str) -> Result<(TextMatch, &str), Error> {
    let (text, rest) = extract_token(s)?;
    if text.is_empty() {
        return Err(Error::EmptyExpression);
    }

    let ignore_case = !text.chars().any(char::is_uppercase);
    let text_match = match marker {
        '=' => TextMatch::Substring {
            needle: if ignore_case { text.to_lowercase() } else { text },
            ignore_case,
        },
        '%' => TextMatch::Group(text),
        _ => {
            let regex = RegexBuilder::new(&text)
                .case_insensitive(ignore_case)
                .multi_line(true)
                .build()
                .map_err(|e| Error::Regex {
                    pattern: text.clone(),
                    message: e.to_string(),
                })?;
            TextMatch::Regex(regex)
        }
    };

    Ok((text_match, rest))
}
