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

//! The interface between the pattern engine and the mail store.
//!
//! The store owns the messages; the evaluator only ever sees them through
//! `MessageView`, which exposes the per-message summary (`MessageRecord`),
//! thread links, and a line-oriented reader over message content.

use std::io::{self, BufRead};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Status flags of a message.
    pub struct MessageFlags: u32 {
        const OLD = 1 << 0;
        const READ = 1 << 1;
        const FLAGGED = 1 << 2;
        const DELETED = 1 << 3;
        const TAGGED = 1 << 4;
        const REPLIED = 1 << 5;
        const EXPIRED = 1 << 6;
        const SUPERSEDED = 1 << 7;
        const COLLAPSED = 1 << 8;
        /// Marked for removal along with `DELETED`.
        const PURGE = 1 << 9;
    }
}

bitflags! {
    /// Cryptographic status of a message.
    pub struct Security: u32 {
        const SIGN = 1 << 0;
        const GOOD_SIGN = 1 << 1;
        const ENCRYPT = 1 << 2;
        const PGP_KEY = 1 << 3;
        const APPLICATION_PGP = 1 << 4;
    }
}

impl Default for MessageFlags {
    fn default() -> Self {
        MessageFlags::empty()
    }
}

impl Default for Security {
    fn default() -> Self {
        Security::empty()
    }
}

/// One entry in an address list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Address {
    /// The display name, e.g. `John Doe`.
    #[serde(default)]
    pub personal: Option<String>,
    /// The address proper, e.g. `jdoe@example.com`.
    #[serde(default)]
    pub mailbox: Option<String>,
}

impl Address {
    pub fn new(personal: Option<&str>, mailbox: &str) -> Self {
        Address {
            personal: personal.map(str::to_owned),
            mailbox: Some(mailbox.to_owned()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub references: Vec<String>,
    pub in_reply_to: Vec<String>,
    pub labels: Vec<String>,
    pub spam: Option<String>,
    pub newsgroups: Option<String>,
}

/// The summary of a message which record predicates are evaluated against.
#[derive(Clone, Debug, Default)]
pub struct MessageRecord {
    pub flags: MessageFlags,
    pub security: Security,
    pub score: i64,
    /// Length of the body in bytes.
    pub size: i64,
    /// UNIX timestamp from the `Date` header.
    pub date_sent: i64,
    /// UNIX timestamp of delivery.
    pub received: i64,
    pub envelope: Envelope,
    /// Number of messages hidden under this one when its thread is
    /// collapsed.
    pub num_hidden: usize,
    /// Whether the message duplicates another in its thread.
    pub duplicate_thread: bool,
}

/// Which portion of a message a full-text predicate reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentPart {
    Header,
    Body,
    Whole,
}

/// Address resolution supplied by the surrounding mail client.
pub trait AddressBook {
    /// Whether `addr` is a known mailing list, subscribed or not.
    fn is_mail_list(&self, addr: &Address) -> bool;
    fn is_subscribed_list(&self, addr: &Address) -> bool;
    /// Whether `addr` is one of the user's own addresses.
    fn is_user(&self, addr: &Address) -> bool;
    /// Whether `addr` has an alias defined for it.
    fn has_alias(&self, addr: &Address) -> bool;
    /// Whether `text` matches a member of the named address group.
    fn group_matches(&self, group: &str, text: &str) -> bool;
}

/// Read-only access to a mailbox.
///
/// Messages are identified by their index (`ix`) in the whole mailbox. The
/// "view" is the subset of messages currently visible, for example after a
/// limit; `visible_message` maps a position in the view to an index.
pub trait MessageView {
    fn message_count(&self) -> usize;
    fn visible_count(&self) -> usize;
    fn visible_message(&self, vix: usize) -> usize;

    fn record(&self, ix: usize) -> &MessageRecord;

    fn thread_parent(&self, ix: usize) -> Option<usize>;
    fn thread_first_child(&self, ix: usize) -> Option<usize>;
    fn thread_next_sibling(&self, ix: usize) -> Option<usize>;
    fn thread_prev_sibling(&self, ix: usize) -> Option<usize>;

    /// Count the MIME parts of the message which are attachments.
    fn attachment_count(&self, ix: usize) -> io::Result<usize>;

    /// Open a reader over part of the message, decoding transfer encodings
    /// and character sets if `decode` is true.
    fn open_content(
        &self,
        ix: usize,
        part: ContentPart,
        decode: bool,
    ) -> io::Result<Box<dyn BufRead + '_>>;

    fn address_book(&self) -> &dyn AddressBook;
}

/// Mutation of a mailbox by bulk pattern operations.
pub trait MessageViewMut: MessageView {
    fn set_flags(&mut self, ix: usize, flags: MessageFlags, on: bool);

    /// Replace the set of visible messages and uncollapse every thread.
    /// `pattern` is the query which produced the new view, if it is a real
    /// restriction.
    fn set_limit(&mut self, visible: Vec<usize>, pattern: Option<String>);
}
