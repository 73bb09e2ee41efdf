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

use std::io;

use thiserror::Error;

/// The default size of the buffer in which error messages are reported to
/// interactive callers.
pub const MESSAGE_BUFFER_LEN: usize = 256;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed argument text, e.g. a bad date or range.
    #[error("{0}")]
    Syntax(String),
    #[error("error in pattern at: {0}")]
    BadPattern(String),
    #[error("{0}: invalid pattern modifier")]
    InvalidTag(char),
    #[error("missing pattern: {0}")]
    MissingPattern(String),
    #[error("missing parameter")]
    MissingParameter,
    #[error("mismatched parenthesis: {0}")]
    MismatchedParens(String),
    #[error("mismatched brackets: {0}")]
    MismatchedBrackets(String),
    #[error("Empty expression")]
    EmptyExpression,
    #[error("empty pattern")]
    EmptyPattern,
    #[error("{0}: not supported in this mode")]
    Capability(char),
    #[error("No current message")]
    NoCurrentMessage,
    #[error("'{pattern}': {message}")]
    Regex { pattern: String, message: String },
    #[error("No search pattern.")]
    NoSearchPattern,
    #[error("Search interrupted.")]
    Interrupted,
    #[error("Not found.")]
    NotFound,
    #[error("Search hit top without finding match")]
    HitTop,
    #[error("Search hit bottom without finding match")]
    HitBottom,
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The broad category an `Error` falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Syntax,
    Capability,
    Context,
    Library,
    Interrupted,
    NotFound,
    Io,
    Config,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match *self {
            Error::Syntax(..)
            | Error::BadPattern(..)
            | Error::InvalidTag(..)
            | Error::MissingPattern(..)
            | Error::MissingParameter
            | Error::MismatchedParens(..)
            | Error::MismatchedBrackets(..)
            | Error::EmptyExpression
            | Error::EmptyPattern
            | Error::NoSearchPattern => ErrorClass::Syntax,
            Error::Capability(..) => ErrorClass::Capability,
            Error::NoCurrentMessage => ErrorClass::Context,
            Error::Regex { .. } => ErrorClass::Library,
            Error::Interrupted => ErrorClass::Interrupted,
            Error::NotFound | Error::HitTop | Error::HitBottom => {
                ErrorClass::NotFound
            }
            Error::Config(..) => ErrorClass::Config,
            Error::Io(..) => ErrorClass::Io,
        }
    }

    /// Render the error as it would appear in a message buffer of `limit`
    /// bytes, including room for a terminator.
    pub fn to_bounded_string(&self, limit: usize) -> String {
        let mut s = self.to_string();
        let max = limit.saturating_sub(1);
        if s.len() > max {
            let mut end = max;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            s.truncate(end);
        }
        s
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(ErrorClass::Syntax, Error::EmptyPattern.class());
        assert_eq!(ErrorClass::Capability, Error::Capability('b').class());
        assert_eq!(ErrorClass::Context, Error::NoCurrentMessage.class());
        assert_eq!(
            ErrorClass::Library,
            Error::Regex {
                pattern: "(".to_owned(),
                message: "unclosed group".to_owned(),
            }
            .class()
        );
        assert_eq!(ErrorClass::NotFound, Error::HitBottom.class());
        assert_eq!(ErrorClass::Interrupted, Error::Interrupted.class());
    }

    #[test]
    fn messages() {
        assert_eq!(
            "b: not supported in this mode",
            Error::Capability('b').to_string()
        );
        assert_eq!(
            "j: invalid pattern modifier",
            Error::InvalidTag('j').to_string()
        );
        assert_eq!(
            "'(': unclosed group",
            Error::Regex {
                pattern: "(".to_owned(),
                message: "unclosed group".to_owned(),
            }
            .to_string()
        );
    }

    #[test]
    fn bounded_string_truncates_on_char_boundary() {
        let err = Error::BadPattern("ééééé".to_owned());
        let full = err.to_string();
        assert_eq!(full, err.to_bounded_string(MESSAGE_BUFFER_LEN));

        let short = err.to_bounded_string(25);
        assert!(short.len() <= 24);
        assert!(full.starts_with(&short));
        assert_eq!("error in pattern at: é", short);
    }
}
