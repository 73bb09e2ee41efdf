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

//! The compiled form of a pattern.
//!
//! A `Pattern` is an exclusively-owned tree. Leaves are `Node::Predicate`s
//! which test one property of a message; `And` and `Or` own an ordered list
//! of children and `Thread` owns the single sub-pattern it applies to the
//! rest of the message's thread.

use std::fmt;

use bitflags::bitflags;
use regex::Regex;

use super::view::AddressBook;

bitflags! {
    /// Classes of predicates which are only available in some contexts.
    ///
    /// A tag whose class is non-empty can only be compiled if at least one
    /// of its classes is enabled.
    pub struct Capabilities: u32 {
        /// The full message (not just the summary) can be read.
        const FULL_MSG = 1 << 0;
        /// Cryptographic status of messages is known.
        const CRYPTO = 1 << 1;
    }
}

bitflags! {
    /// Options passed to the evaluator.
    pub struct MatchFlags: u32 {
        /// Address predicates also test the personal name.
        const FULL_ADDRESS = 1 << 0;
        /// Full-text predicates read decoded content.
        const THOROUGH = 1 << 1;
    }
}

/// The property tested by a leaf predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    All,
    Body,
    WholeMessage,
    Cc,
    Recipient,
    DateSent,
    Deleted,
    Sender,
    Expired,
    From,
    Flagged,
    Signed,
    Encrypted,
    Header,
    Spam,
    MessageId,
    PgpKey,
    KnownList,
    Address,
    MessageNumber,
    Score,
    New,
    Old,
    PersonalRecipient,
    PersonalFrom,
    Replied,
    DateReceived,
    Read,
    Subject,
    Superseded,
    To,
    Tagged,
    SubscribedList,
    Unread,
    Collapsed,
    Verified,
    Newsgroups,
    Reference,
    Attachments,
    Label,
    Size,
    Duplicated,
    Unreferenced,
}

/// The kind of argument a tag consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgKind {
    None,
    Text,
    Range,
    Date,
}

#[derive(Debug)]
pub struct TagEntry {
    pub tag: char,
    pub kind: Kind,
    pub class: Capabilities,
    pub arg: ArgKind,
}

const fn tag(
    tag: char,
    kind: Kind,
    class: Capabilities,
    arg: ArgKind,
) -> TagEntry {
    TagEntry {
        tag,
        kind,
        class,
        arg,
    }
}

const ANY: Capabilities = Capabilities::empty();
const FULL: Capabilities = Capabilities::FULL_MSG;
const CRYPTO: Capabilities = Capabilities::CRYPTO;

static TAGS: &[TagEntry] = &[
    tag('A', Kind::All, ANY, ArgKind::None),
    tag('b', Kind::Body, FULL, ArgKind::Text),
    tag('B', Kind::WholeMessage, FULL, ArgKind::Text),
    tag('c', Kind::Cc, ANY, ArgKind::Text),
    tag('C', Kind::Recipient, ANY, ArgKind::Text),
    tag('d', Kind::DateSent, ANY, ArgKind::Date),
    tag('D', Kind::Deleted, ANY, ArgKind::None),
    tag('e', Kind::Sender, ANY, ArgKind::Text),
    tag('E', Kind::Expired, ANY, ArgKind::None),
    tag('f', Kind::From, ANY, ArgKind::Text),
    tag('F', Kind::Flagged, ANY, ArgKind::None),
    tag('g', Kind::Signed, CRYPTO, ArgKind::None),
    tag('G', Kind::Encrypted, CRYPTO, ArgKind::None),
    tag('h', Kind::Header, FULL, ArgKind::Text),
    tag('H', Kind::Spam, ANY, ArgKind::Text),
    tag('i', Kind::MessageId, ANY, ArgKind::Text),
    tag('k', Kind::PgpKey, CRYPTO, ArgKind::None),
    tag('l', Kind::KnownList, ANY, ArgKind::None),
    tag('L', Kind::Address, ANY, ArgKind::Text),
    tag('m', Kind::MessageNumber, ANY, ArgKind::Range),
    tag('n', Kind::Score, ANY, ArgKind::Range),
    tag('N', Kind::New, ANY, ArgKind::None),
    tag('O', Kind::Old, ANY, ArgKind::None),
    tag('p', Kind::PersonalRecipient, ANY, ArgKind::None),
    tag('P', Kind::PersonalFrom, ANY, ArgKind::None),
    tag('Q', Kind::Replied, ANY, ArgKind::None),
    tag('r', Kind::DateReceived, ANY, ArgKind::Date),
    tag('R', Kind::Read, ANY, ArgKind::None),
    tag('s', Kind::Subject, ANY, ArgKind::Text),
    tag('S', Kind::Superseded, ANY, ArgKind::None),
    tag('t', Kind::To, ANY, ArgKind::Text),
    tag('T', Kind::Tagged, ANY, ArgKind::None),
    tag('u', Kind::SubscribedList, ANY, ArgKind::None),
    tag('U', Kind::Unread, ANY, ArgKind::None),
    tag('v', Kind::Collapsed, ANY, ArgKind::None),
    tag('V', Kind::Verified, CRYPTO, ArgKind::None),
    tag('w', Kind::Newsgroups, ANY, ArgKind::Text),
    tag('x', Kind::Reference, ANY, ArgKind::Text),
    tag('X', Kind::Attachments, ANY, ArgKind::Range),
    tag('y', Kind::Label, ANY, ArgKind::Text),
    tag('z', Kind::Size, ANY, ArgKind::Range),
    tag('=', Kind::Duplicated, ANY, ArgKind::None),
    tag('$', Kind::Unreferenced, ANY, ArgKind::None),
];

/// Look up the table entry for the tag character following a `~`.
pub fn lookup_tag(tag: char) -> Option<&'static TagEntry> {
    TAGS.iter().find(|e| e.tag == tag)
}

impl Kind {
    /// The tag character which compiles to this kind.
    pub fn tag(self) -> char {
        TAGS.iter()
            .find(|e| e.kind == self)
            .map(|e| e.tag)
            .unwrap_or('?')
    }
}

/// An inclusive range of integers or UNIX timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub min: i64,
    pub max: i64,
}

impl Range {
    /// Upper bound meaning "no upper bound".
    pub const UNBOUNDED: i64 = i64::MAX;

    pub fn new(min: i64, max: i64) -> Self {
        Range { min, max }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Swap the bounds if they are backwards, unless the upper bound is
    /// unbounded.
    pub fn ordered(self) -> Self {
        if self.max == Self::UNBOUNDED || self.min <= self.max {
            self
        } else {
            Range {
                min: self.max,
                max: self.min,
            }
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if Self::UNBOUNDED == self.max {
            write!(f, "{}-", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// How a text predicate compares its argument to message text.
#[derive(Debug)]
pub enum TextMatch {
    /// Plain substring search (from the `=` marker). If `ignore_case`,
    /// `needle` has already been lower-cased.
    Substring { needle: String, ignore_case: bool },
    /// Membership in a named address group (from the `%` marker).
    Group(String),
    Regex(Regex),
}

impl TextMatch {
    pub fn is_match(&self, text: &str, addresses: &dyn AddressBook) -> bool {
        match *self {
            TextMatch::Substring {
                ref needle,
                ignore_case: true,
            } => text.to_lowercase().contains(needle.as_str()),
            TextMatch::Substring {
                ref needle,
                ignore_case: false,
            } => text.contains(needle.as_str()),
            TextMatch::Group(ref group) => addresses.group_matches(group, text),
            TextMatch::Regex(ref regex) => regex.is_match(text),
        }
    }
}

impl PartialEq for TextMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                &TextMatch::Substring {
                    needle: ref a,
                    ignore_case: ai,
                },
                &TextMatch::Substring {
                    needle: ref b,
                    ignore_case: bi,
                },
            ) => a == b && ai == bi,
            (&TextMatch::Group(ref a), &TextMatch::Group(ref b)) => a == b,
            (&TextMatch::Regex(ref a), &TextMatch::Regex(ref b)) => {
                a.as_str() == b.as_str()
            }
            _ => false,
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TextMatch::Substring { ref needle, .. } => {
                write!(f, "{:?}", needle)
            }
            TextMatch::Group(ref group) => write!(f, "%{}", group),
            TextMatch::Regex(ref regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// The argument of a leaf predicate.
#[derive(Debug, PartialEq)]
pub enum Operand {
    None,
    Text(TextMatch),
    Range(Range),
}

#[derive(Debug, PartialEq)]
pub enum Node {
    And(Vec<Pattern>),
    Or(Vec<Pattern>),
    Thread(Box<Pattern>),
    Predicate(Kind, Operand),
}

#[derive(Debug, PartialEq)]
pub struct Pattern {
    pub node: Node,
    /// Invert the result of this node.
    pub negate: bool,
    /// Address predicates require every address to match instead of any.
    pub all_addresses: bool,
    /// Address predicates only consider addresses with a known alias.
    pub via_alias: bool,
}

impl Pattern {
    pub fn new(node: Node) -> Self {
        Pattern {
            node,
            negate: false,
            all_addresses: false,
            via_alias: false,
        }
    }

    pub fn predicate(kind: Kind, operand: Operand) -> Self {
        Self::new(Node::Predicate(kind, operand))
    }

    pub fn children(&self) -> &[Pattern] {
        match self.node {
            Node::And(ref c) | Node::Or(ref c) => c,
            Node::Thread(ref c) => std::slice::from_ref(&**c),
            Node::Predicate(..) => &[],
        }
    }
}

/// Formats the pattern as a compact s-expression, e.g.
/// `(or (and ~N ~F) !~D)`.
impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.negate {
            write!(f, "!")?;
        }
        if self.all_addresses {
            write!(f, "^")?;
        }
        if self.via_alias {
            write!(f, "@")?;
        }

        let (name, children) = match self.node {
            Node::And(ref c) => ("and", &c[..]),
            Node::Or(ref c) => ("or", &c[..]),
            Node::Thread(ref c) => {
                return write!(f, "(thread {})", c);
            }
            Node::Predicate(kind, ref operand) => {
                write!(f, "~{}", kind.tag())?;
                return match *operand {
                    Operand::None => Ok(()),
                    Operand::Text(ref t) => write!(f, " {}", t),
                    Operand::Range(ref r) => write!(f, " {}", r),
                };
            }
        };

        write!(f, "({}", name)?;
        for child in children {
            write!(f, " {}", child)?;
        }
        write!(f, ")")
    }
}
