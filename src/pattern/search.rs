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

//! Incremental searching through the visible messages of a view.
//!
//! A `SearchSession` keeps the last search pattern between commands, so
//! that "search next" and "search opposite" can reuse it, and remembers
//! which messages have already been evaluated against it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::TimeZone;
use log::info;

use super::compile::{compile, CompileContext};
use super::eval;
use super::model::Pattern;
use super::simple::expand_simple;
use super::view::MessageView;
use crate::support::config::PatternConfig;
use crate::support::error::Error;
use crate::support::small_bitset::SmallBitset;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchOp {
    /// Search forward for a new pattern.
    Search,
    /// Search backward for a new pattern.
    ReverseSearch,
    /// Search again in the last direction.
    Next,
    /// Search again against the last direction.
    Opposite,
}

/// How a search crossed the edge of the view before finding a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrapped {
    ToTop,
    ToBottom,
}

impl fmt::Display for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Wrapped::ToTop => write!(f, "Search wrapped to top."),
            Wrapped::ToBottom => write!(f, "Search wrapped to bottom."),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchHit {
    /// The position of the match within the visible messages.
    pub position: usize,
    /// Set if the search wrapped around; the caller should show this as a
    /// notice.
    pub wrapped: Option<Wrapped>,
}

#[derive(Debug)]
pub struct SearchSession {
    config: PatternConfig,
    last_search: String,
    last_expanded: String,
    pattern: Option<Pattern>,
    reverse: bool,
    /// Set when `searched` and `matched` no longer reflect `pattern`.
    invalid: bool,
    searched: SmallBitset,
    matched: SmallBitset,
}

impl SearchSession {
    pub fn new(config: PatternConfig) -> Self {
        SearchSession {
            config,
            last_search: String::new(),
            last_expanded: String::new(),
            pattern: None,
            reverse: false,
            invalid: false,
            searched: SmallBitset::new(),
            matched: SmallBitset::new(),
        }
    }

    /// The text of the last search, as the user typed it.
    pub fn last_search(&self) -> &str {
        &self.last_search
    }

    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Forget all cached results, e.g. because the mailbox was reloaded.
    pub fn invalidate(&mut self) {
        self.invalid = true;
    }

    /// Search for the next matching message after the one at position
    /// `current` in the view.
    ///
    /// `query` is required for `Search` and `ReverseSearch`, and for the
    /// other operations if there has not yet been a search. If it (after
    /// simple-search expansion) differs from the last pattern, it is
    /// recompiled; if compilation fails, the session is left unchanged.
    ///
    /// If `interrupt` becomes set during the scan, it is cleared and the
    /// search fails with `Error::Interrupted`.
    pub fn search<V: MessageView + ?Sized, Tz: TimeZone>(
        &mut self,
        view: &V,
        current: usize,
        op: SearchOp,
        query: Option<&str>,
        ctx: &CompileContext<Tz>,
        interrupt: &AtomicBool,
    ) -> Result<SearchHit, Error> {
        let needs_query = self.last_search.is_empty()
            || matches!(op, SearchOp::Search | SearchOp::ReverseSearch);
        if needs_query {
            let query = query
                .filter(|q| !q.is_empty())
                .ok_or(Error::NoSearchPattern)?;
            self.set_query(query, op, ctx)?;
        }

        let pattern = self.pattern.as_ref().ok_or(Error::NoSearchPattern)?;
        if self.invalid {
            self.searched.clear();
            self.matched.clear();
            self.invalid = false;
        }

        let mut incr: isize = if self.reverse { -1 } else { 1 };
        if SearchOp::Opposite == op {
            incr = -incr;
        }

        let flags = self.config.match_flags();
        let vcount = view.visible_count() as isize;
        let mut wrapped = None;
        let mut pos = current as isize + incr;

        for _ in 0..vcount {
            if pos > vcount - 1 {
                if !self.config.wrap_search {
                    return Err(Error::HitBottom);
                }
                pos = 0;
                wrapped = Some(Wrapped::ToTop);
            } else if pos < 0 {
                if !self.config.wrap_search {
                    return Err(Error::HitTop);
                }
                pos = vcount - 1;
                wrapped = Some(Wrapped::ToBottom);
            }

            let ix = view.visible_message(pos as usize);
            let hit = if self.searched.contains(ix) {
                self.matched.contains(ix)
            } else {
                self.searched.insert(ix);
                let hit = eval::matches(pattern, flags, view, ix);
                if hit {
                    self.matched.insert(ix);
                }
                hit
            };

            if hit {
                if let Some(wrapped) = wrapped {
                    info!("{}", wrapped);
                }
                return Ok(SearchHit {
                    position: pos as usize,
                    wrapped,
                });
            }

            if interrupt.swap(false, Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }

            pos += incr;
        }

        Err(Error::NotFound)
    }

    fn set_query<Tz: TimeZone>(
        &mut self,
        query: &str,
        op: SearchOp,
        ctx: &CompileContext<Tz>,
    ) -> Result<(), Error> {
        // Compare the expanded text so that a change to the simple search
        // template is noticed.
        let expanded = expand_simple(query, &self.config.simple_search);
        if self.pattern.is_none() || expanded != self.last_expanded {
            info!("Compiling search pattern {:?}", expanded);
            let pattern = compile(&expanded, ctx)?;
            self.pattern = Some(pattern);
            self.last_expanded = expanded;
            self.invalid = true;
        }

        self.last_search = query.to_owned();
        self.reverse = !matches!(op, SearchOp::Search | SearchOp::Next);
        Ok(())
    }
}
