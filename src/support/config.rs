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

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pattern::model::{Capabilities, MatchFlags};
use crate::support::error::Error;

/// The default template used to turn a "simple search" into a real pattern.
pub const DEFAULT_SIMPLE_SEARCH: &str = "~f %s | ~s %s";

/// Options which control how patterns are compiled and searched.
///
/// This is stored in a file typically named `mailpat.toml`. Every field is
/// optional.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PatternConfig {
    /// The template a simple search (one with none of `~`, `=`, or `%`) is
    /// substituted into. Each `%s` is replaced by the quoted query text; if
    /// there is no `%s`, the query is appended after a space.
    pub simple_search: String,

    /// If true, incremental searches which run off either end of the view
    /// continue from the opposite end instead of failing.
    pub wrap_search: bool,

    /// If true, full-text searches (`~b`, `~B`, `~h`) run against decoded
    /// content rather than the raw message.
    pub thorough_search: bool,

    /// If true, the cryptographic predicates (`~g`, `~G`, `~k`, `~V`) are
    /// available.
    pub crypto: bool,

    /// If true, address predicates also match against the personal name
    /// and not just the mailbox.
    pub match_full_address: bool,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            simple_search: DEFAULT_SIMPLE_SEARCH.to_owned(),
            wrap_search: true,
            thorough_search: true,
            crypto: true,
            match_full_address: true,
        }
    }
}

impl PatternConfig {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| {
            Error::Config(format!(
                "Error in config file at '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// The capability classes available to patterns compiled for a
    /// fully-loaded mailbox under this configuration.
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::FULL_MSG;
        if self.crypto {
            caps |= Capabilities::CRYPTO;
        }
        caps
    }

    pub fn match_flags(&self) -> MatchFlags {
        let mut flags = MatchFlags::empty();
        if self.match_full_address {
            flags |= MatchFlags::FULL_ADDRESS;
        }
        if self.thorough_search {
            flags |= MatchFlags::THOROUGH;
        }
        flags
    }
}
