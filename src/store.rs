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

//! A simple in-memory mail store.
//!
//! `Mailbox` holds fully-decoded messages in memory and implements the view
//! traits the pattern engine works against. It can be loaded from a TOML
//! description, which is what the command-line tool operates on.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::Path;

use serde::Deserialize;

use crate::pattern::view::*;
use crate::support::error::Error;

/// An address book backed by fixed lists of mailboxes.
///
/// All comparisons are case-insensitive.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StaticAddressBook {
    /// Mailing lists the user is not subscribed to.
    pub lists: Vec<String>,
    pub subscribed: Vec<String>,
    /// The user's own addresses.
    pub user: Vec<String>,
    /// Addresses which have an alias.
    pub aliases: Vec<String>,
    /// Named groups of addresses.
    pub groups: HashMap<String, Vec<String>>,
}

fn contains_mailbox(list: &[String], addr: &Address) -> bool {
    addr.mailbox.as_ref().map_or(false, |mailbox| {
        list.iter().any(|m| m.eq_ignore_ascii_case(mailbox))
    })
}

impl AddressBook for StaticAddressBook {
    fn is_mail_list(&self, addr: &Address) -> bool {
        contains_mailbox(&self.lists, addr)
            || contains_mailbox(&self.subscribed, addr)
    }

    fn is_subscribed_list(&self, addr: &Address) -> bool {
        contains_mailbox(&self.subscribed, addr)
    }

    fn is_user(&self, addr: &Address) -> bool {
        contains_mailbox(&self.user, addr)
    }

    fn has_alias(&self, addr: &Address) -> bool {
        contains_mailbox(&self.aliases, addr)
    }

    fn group_matches(&self, group: &str, text: &str) -> bool {
        self.groups.get(group).map_or(false, |members| {
            members.iter().any(|m| m.eq_ignore_ascii_case(text))
        })
    }
}

#[derive(Clone, Debug, Default)]
struct Entry {
    record: MessageRecord,
    parent: Option<usize>,
    children: Vec<usize>,
    header: String,
    body: String,
    attachments: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Mailbox {
    entries: Vec<Entry>,
    /// Messages without a parent, in order.
    roots: Vec<usize>,
    visible: Vec<usize>,
    limit_pattern: Option<String>,
    address_book: StaticAddressBook,
}

impl Mailbox {
    pub fn new(address_book: StaticAddressBook) -> Self {
        Mailbox {
            address_book,
            ..Mailbox::default()
        }
    }

    /// Add a message which starts a new thread, returning its index.
    ///
    /// The new message is visible.
    pub fn push(&mut self, record: MessageRecord) -> usize {
        let ix = self.push_entry(record, None);
        self.roots.push(ix);
        ix
    }

    /// Add a message as the last reply to `parent`, returning its index.
    ///
    /// Panics if `parent` is not a valid index.
    pub fn push_reply(
        &mut self,
        parent: usize,
        record: MessageRecord,
    ) -> usize {
        let ix = self.push_entry(record, Some(parent));
        self.entries[parent].children.push(ix);
        ix
    }

    fn push_entry(
        &mut self,
        record: MessageRecord,
        parent: Option<usize>,
    ) -> usize {
        let ix = self.entries.len();
        self.entries.push(Entry {
            record,
            parent,
            ..Entry::default()
        });
        self.visible.push(ix);
        ix
    }

    /// Set the header block and body returned for full-text searches.
    pub fn set_content(&mut self, ix: usize, header: &str, body: &str) {
        let entry = &mut self.entries[ix];
        entry.header = header.to_owned();
        entry.body = body.to_owned();
    }

    pub fn set_attachments(&mut self, ix: usize, count: usize) {
        self.entries[ix].attachments = count;
    }

    /// The query of the current limit, if any.
    pub fn limit_pattern(&self) -> Option<&str> {
        self.limit_pattern.as_deref()
    }

    /// Parse a mailbox from its TOML description.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let file: MailboxFile =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;

        let mut mbox = Mailbox::new(file.address_book);
        for (ix, message) in file.message.into_iter().enumerate() {
            let parent = match message.parent {
                None => None,
                Some(n) if n >= 1 && n <= ix => Some(n - 1),
                Some(n) => {
                    return Err(Error::Config(format!(
                        "Message {} has invalid parent {}",
                        ix + 1,
                        n
                    )));
                }
            };

            let (record, header, body, attachments) = message.into_parts();
            let ix = match parent {
                None => mbox.push(record),
                Some(parent) => mbox.push_reply(parent, record),
            };
            mbox.set_content(ix, &header, &body);
            mbox.set_attachments(ix, attachments);
        }

        Ok(mbox)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| {
            Error::Config(format!(
                "Error in mailbox file at '{}': {}",
                path.display(),
                e
            ))
        })
    }

    fn siblings(&self, ix: usize) -> &[usize] {
        match self.entries[ix].parent {
            Some(parent) => &self.entries[parent].children,
            None => &self.roots,
        }
    }

    fn sibling_offset(&self, ix: usize, offset: isize) -> Option<usize> {
        let siblings = self.siblings(ix);
        let pos = siblings.iter().position(|&s| s == ix)? as isize;
        let target = pos + offset;
        if target < 0 {
            None
        } else {
            siblings.get(target as usize).copied()
        }
    }
}

impl MessageView for Mailbox {
    fn message_count(&self) -> usize {
        self.entries.len()
    }

    fn visible_count(&self) -> usize {
        self.visible.len()
    }

    fn visible_message(&self, vix: usize) -> usize {
        self.visible[vix]
    }

    fn record(&self, ix: usize) -> &MessageRecord {
        &self.entries[ix].record
    }

    fn thread_parent(&self, ix: usize) -> Option<usize> {
        self.entries[ix].parent
    }

    fn thread_first_child(&self, ix: usize) -> Option<usize> {
        self.entries[ix].children.first().copied()
    }

    fn thread_next_sibling(&self, ix: usize) -> Option<usize> {
        self.sibling_offset(ix, 1)
    }

    fn thread_prev_sibling(&self, ix: usize) -> Option<usize> {
        self.sibling_offset(ix, -1)
    }

    fn attachment_count(&self, ix: usize) -> io::Result<usize> {
        Ok(self.entries[ix].attachments)
    }

    /// Content is held already decoded, so `decode` has no effect.
    fn open_content(
        &self,
        ix: usize,
        part: ContentPart,
        _decode: bool,
    ) -> io::Result<Box<dyn BufRead + '_>> {
        let entry = &self.entries[ix];
        let reader: Box<dyn BufRead + '_> = match part {
            ContentPart::Header => Box::new(entry.header.as_bytes()),
            ContentPart::Body => Box::new(entry.body.as_bytes()),
            ContentPart::Whole => Box::new(
                entry
                    .header
                    .as_bytes()
                    .chain(&b"\n"[..])
                    .chain(entry.body.as_bytes()),
            ),
        };
        Ok(reader)
    }

    fn address_book(&self) -> &dyn AddressBook {
        &self.address_book
    }
}

impl MessageViewMut for Mailbox {
    fn set_flags(&mut self, ix: usize, flags: MessageFlags, on: bool) {
        self.entries[ix].record.flags.set(flags, on);
    }

    fn set_limit(&mut self, visible: Vec<usize>, pattern: Option<String>) {
        for entry in &mut self.entries {
            entry.record.flags.remove(MessageFlags::COLLAPSED);
            entry.record.num_hidden = 0;
        }
        self.visible = visible;
        self.limit_pattern = pattern;
    }
}

/// The root of a mailbox TOML file.
#[derive(Deserialize, Default)]
#[serde(default)]
struct MailboxFile {
    address_book: StaticAddressBook,
    message: Vec<MessageFile>,
}

#[derive(Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "snake_case")]
enum FlagName {
    Old,
    Read,
    Flagged,
    Deleted,
    Tagged,
    Replied,
    Expired,
    Superseded,
    Collapsed,
    Purge,
}

impl FlagName {
    fn flag(self) -> MessageFlags {
        match self {
            FlagName::Old => MessageFlags::OLD,
            FlagName::Read => MessageFlags::READ,
            FlagName::Flagged => MessageFlags::FLAGGED,
            FlagName::Deleted => MessageFlags::DELETED,
            FlagName::Tagged => MessageFlags::TAGGED,
            FlagName::Replied => MessageFlags::REPLIED,
            FlagName::Expired => MessageFlags::EXPIRED,
            FlagName::Superseded => MessageFlags::SUPERSEDED,
            FlagName::Collapsed => MessageFlags::COLLAPSED,
            FlagName::Purge => MessageFlags::PURGE,
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "snake_case")]
enum SecurityName {
    Sign,
    GoodSign,
    Encrypt,
    PgpKey,
    ApplicationPgp,
}

impl SecurityName {
    fn flag(self) -> Security {
        match self {
            SecurityName::Sign => Security::SIGN,
            SecurityName::GoodSign => Security::GOOD_SIGN,
            SecurityName::Encrypt => Security::ENCRYPT,
            SecurityName::PgpKey => Security::PGP_KEY,
            SecurityName::ApplicationPgp => Security::APPLICATION_PGP,
        }
    }
}

mod rfc3339 {
    use chrono::DateTime;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'a, D: Deserializer<'a>>(
        de: D,
    ) -> Result<i64, D::Error> {
        use serde::de::Error;
        String::deserialize(de).and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.timestamp())
                .map_err(|err| Error::custom(format!("{}: {}", s, err)))
        })
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MessageFile {
    /// 1-based number of the message this one replies to, which must come
    /// earlier in the file.
    parent: Option<usize>,
    flags: Vec<FlagName>,
    security: Vec<SecurityName>,
    score: i64,
    size: Option<i64>,
    #[serde(deserialize_with = "rfc3339::deserialize")]
    date: i64,
    #[serde(deserialize_with = "rfc3339::deserialize")]
    received: i64,
    from: Vec<Address>,
    sender: Vec<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    subject: Option<String>,
    message_id: Option<String>,
    references: Vec<String>,
    in_reply_to: Vec<String>,
    labels: Vec<String>,
    spam: Option<String>,
    newsgroups: Option<String>,
    num_hidden: usize,
    duplicate_thread: bool,
    header: String,
    body: String,
    attachments: usize,
}

impl MessageFile {
    fn into_parts(self) -> (MessageRecord, String, String, usize) {
        let record = MessageRecord {
            flags: self
                .flags
                .iter()
                .fold(MessageFlags::empty(), |acc, f| acc | f.flag()),
            security: self
                .security
                .iter()
                .fold(Security::empty(), |acc, f| acc | f.flag()),
            score: self.score,
            size: self.size.unwrap_or(self.body.len() as i64),
            date_sent: self.date,
            received: if 0 == self.received {
                self.date
            } else {
                self.received
            },
            envelope: Envelope {
                from: self.from,
                sender: self.sender,
                to: self.to,
                cc: self.cc,
                subject: self.subject,
                message_id: self.message_id,
                references: self.references,
                in_reply_to: self.in_reply_to,
                labels: self.labels,
                spam: self.spam,
                newsgroups: self.newsgroups,
            },
            num_hidden: self.num_hidden,
            duplicate_thread: self.duplicate_thread,
        };

        (record, self.header, self.body, self.attachments)
    }
}

/// Wraps a mailbox and counts calls to `record`.
#[cfg(test)]
pub struct CountingView<'a> {
    inner: &'a Mailbox,
    reads: std::cell::Cell<usize>,
}

#[cfg(test)]
impl<'a> CountingView<'a> {
    pub fn new(inner: &'a Mailbox) -> Self {
        CountingView {
            inner,
            reads: std::cell::Cell::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn reset(&self) {
        self.reads.set(0);
    }
}

#[cfg(test)]
impl MessageView for CountingView<'_> {
    fn message_count(&self) -> usize {
        self.inner.message_count()
    }

    fn visible_count(&self) -> usize {
        self.inner.visible_count()
    }

    fn visible_message(&self, vix: usize) -> usize {
        self.inner.visible_message(vix)
    }

    fn record(&self, ix: usize) -> &MessageRecord {
        self.reads.set(self.reads.get() + 1);
        self.inner.record(ix)
    }

    fn thread_parent(&self, ix: usize) -> Option<usize> {
        self.inner.thread_parent(ix)
    }

    fn thread_first_child(&self, ix: usize) -> Option<usize> {
        self.inner.thread_first_child(ix)
    }

    fn thread_next_sibling(&self, ix: usize) -> Option<usize> {
        self.inner.thread_next_sibling(ix)
    }

    fn thread_prev_sibling(&self, ix: usize) -> Option<usize> {
        self.inner.thread_prev_sibling(ix)
    }

    fn attachment_count(&self, ix: usize) -> io::Result<usize> {
        self.inner.attachment_count(ix)
    }

    fn open_content(
        &self,
        ix: usize,
        part: ContentPart,
        decode: bool,
    ) -> io::Result<Box<dyn BufRead + '_>> {
        self.inner.open_content(ix, part, decode)
    }

    fn address_book(&self) -> &dyn AddressBook {
        self.inner.address_book()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"
[address_book]
user = ["me@example.com"]
lists = ["dev@lists.example.com"]

[address_book.groups]
team = ["alice@example.com", "bob@example.com"]

[[message]]
flags = ["read", "flagged"]
date = "2020-03-04T05:06:07+00:00"
from = [{ personal = "Alice", mailbox = "alice@example.com" }]
to = [{ mailbox = "dev@lists.example.com" }]
subject = "Release plans"
header = "Subject: Release plans\n"
body = "Let's ship it.\n"

[[message]]
parent = 1
security = ["sign", "good_sign"]
date = "2020-03-05T00:00:00+01:00"
received = "2020-03-05T00:00:10+01:00"
subject = "Re: Release plans"
attachments = 2
"#;

    fn read_all(mut r: Box<dyn BufRead + '_>) -> String {
        let mut s = String::new();
        r.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn load_from_toml() {
        let mbox = Mailbox::from_toml_str(SAMPLE).unwrap();
        assert_eq!(2, mbox.message_count());
        assert_eq!(2, mbox.visible_count());

        let first = mbox.record(0);
        assert_eq!(MessageFlags::READ | MessageFlags::FLAGGED, first.flags);
        assert_eq!(1583298367, first.date_sent);
        assert_eq!(first.date_sent, first.received);
        assert_eq!(15, first.size);
        assert_eq!(
            vec![Address::new(Some("Alice"), "alice@example.com")],
            first.envelope.from
        );

        let second = mbox.record(1);
        assert_eq!(Security::SIGN | Security::GOOD_SIGN, second.security);
        assert_eq!(1583362800, second.date_sent);
        assert_eq!(1583362810, second.received);
        assert_eq!(Some(0), mbox.thread_parent(1));
        assert_eq!(Some(1), mbox.thread_first_child(0));
        assert_eq!(2, mbox.attachment_count(1).unwrap());

        let book = mbox.address_book();
        assert!(book.is_user(&Address::new(None, "Me@Example.com")));
        assert!(book.is_mail_list(&first.envelope.to[0]));
        assert!(!book.is_subscribed_list(&first.envelope.to[0]));
        assert!(book.group_matches("team", "BOB@example.com"));
        assert!(!book.group_matches("team", "eve@example.com"));
        assert!(!book.group_matches("nobody", "bob@example.com"));
    }

    #[test]
    fn bad_files() {
        assert_matches!(
            Err(Error::Config(..)),
            Mailbox::from_toml_str("[[message]]\nflags = [\"shiny\"]\n")
        );
        assert_matches!(
            Err(Error::Config(..)),
            Mailbox::from_toml_str("[[message]]\ndate = \"yesterday\"\n")
        );
        assert_matches!(
            Err(Error::Config(..)),
            Mailbox::from_toml_str("[[message]]\nparent = 1\n")
        );
    }

    #[test]
    fn content_parts() {
        let mut mbox = Mailbox::default();
        let ix = mbox.push(MessageRecord::default());
        mbox.set_content(ix, "Subject: x\n", "body\n");

        assert_eq!(
            "Subject: x\n",
            read_all(mbox.open_content(ix, ContentPart::Header, true).unwrap())
        );
        assert_eq!(
            "body\n",
            read_all(mbox.open_content(ix, ContentPart::Body, false).unwrap())
        );
        assert_eq!(
            "Subject: x\n\nbody\n",
            read_all(mbox.open_content(ix, ContentPart::Whole, true).unwrap())
        );
    }

    #[test]
    fn siblings() {
        let mut mbox = Mailbox::default();
        let a = mbox.push(MessageRecord::default());
        let b = mbox.push(MessageRecord::default());
        let a1 = mbox.push_reply(a, MessageRecord::default());
        let a2 = mbox.push_reply(a, MessageRecord::default());

        assert_eq!(Some(b), mbox.thread_next_sibling(a));
        assert_eq!(None, mbox.thread_prev_sibling(a));
        assert_eq!(Some(a2), mbox.thread_next_sibling(a1));
        assert_eq!(Some(a1), mbox.thread_prev_sibling(a2));
        assert_eq!(None, mbox.thread_next_sibling(a2));
        assert_eq!(None, mbox.thread_first_child(b));
    }

    #[test]
    fn limit_uncollapses() {
        let mut mbox = Mailbox::default();
        let mut record = MessageRecord::default();
        record.flags = MessageFlags::COLLAPSED | MessageFlags::READ;
        record.num_hidden = 3;
        mbox.push(record);
        mbox.push(MessageRecord::default());

        mbox.set_limit(vec![1], Some("~N".to_owned()));
        assert_eq!(1, mbox.visible_count());
        assert_eq!(1, mbox.visible_message(0));
        assert_eq!(MessageFlags::READ, mbox.record(0).flags);
        assert_eq!(0, mbox.record(0).num_hidden);
        assert_eq!(Some("~N"), mbox.limit_pattern());
    }
}
