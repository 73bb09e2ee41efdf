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

//! The pattern evaluator.
//!
//! Evaluation is a direct walk over the pattern tree. Record predicates are
//! total functions of the message summary; only the full-text predicates
//! touch message content, and a failure to read it counts as a non-match.

use std::io::{self, BufRead};

use bitflags::bitflags;
use log::warn;

use super::model::*;
use super::view::*;
use crate::support::small_bitset::SmallBitset;

/// Whether message `ix` of `view` matches `pattern`.
pub fn matches<V: MessageView + ?Sized>(
    pattern: &Pattern,
    flags: MatchFlags,
    view: &V,
    ix: usize,
) -> bool {
    let result = match pattern.node {
        Node::And(ref children) => {
            children.iter().all(|c| matches(c, flags, view, ix))
        }
        Node::Or(ref children) => {
            children.iter().any(|c| matches(c, flags, view, ix))
        }
        Node::Thread(ref sub) => matches_in_thread(sub, flags, view, ix),
        Node::Predicate(kind, ref operand) => {
            matches_predicate(pattern, kind, operand, flags, view, ix)
        }
    };

    pattern.negate ^ result
}

bitflags! {
    /// Directions a thread walk may continue in from a given message.
    struct Walk: u8 {
        const LEFT = 1 << 0;
        const UP = 1 << 1;
        const RIGHT = 1 << 2;
        const DOWN = 1 << 3;
    }
}

/// Whether any message in the thread of `start` matches `sub`.
///
/// From the starting message the walk goes up through every ancestor, and
/// from each message reached it fans out to siblings and descendants. The
/// allowed directions shrink as it goes so that no path doubles back.
fn matches_in_thread<V: MessageView + ?Sized>(
    sub: &Pattern,
    flags: MatchFlags,
    view: &V,
    start: usize,
) -> bool {
    let mut queued = SmallBitset::new();
    let mut work = vec![(start, Walk::all())];
    queued.insert(start);

    while let Some((ix, walk)) = work.pop() {
        if matches(sub, flags, view, ix) {
            return true;
        }

        let has_parent = view.thread_parent(ix).is_some();
        // Pushed in reverse so ancestors are visited first, then right
        // siblings, left siblings, and finally children.
        let steps = [
            (
                walk.contains(Walk::DOWN),
                view.thread_first_child(ix),
                Walk::LEFT | Walk::RIGHT | Walk::DOWN,
            ),
            (
                has_parent && walk.contains(Walk::LEFT),
                view.thread_prev_sibling(ix),
                Walk::LEFT | Walk::DOWN,
            ),
            (
                has_parent && walk.contains(Walk::RIGHT),
                view.thread_next_sibling(ix),
                Walk::RIGHT | Walk::DOWN,
            ),
            (
                walk.contains(Walk::UP),
                view.thread_parent(ix),
                Walk::LEFT | Walk::UP | Walk::RIGHT,
            ),
        ];

        for &(allowed, next, dirs) in &steps {
            if let (true, Some(next)) = (allowed, next) {
                if queued.insert(next) {
                    work.push((next, dirs));
                }
            }
        }
    }

    false
}

fn matches_predicate<V: MessageView + ?Sized>(
    pattern: &Pattern,
    kind: Kind,
    operand: &Operand,
    flags: MatchFlags,
    view: &V,
    ix: usize,
) -> bool {
    let record = view.record(ix);
    let f = record.flags;
    let sec = record.security;
    let env = &record.envelope;
    let book = view.address_book();

    let in_range = |value: i64| match *operand {
        Operand::Range(ref range) => range.contains(value),
        _ => false,
    };
    let text = match *operand {
        Operand::Text(ref text) => Some(text),
        _ => None,
    };
    let text_matches = |s: Option<&str>| match (text, s) {
        (Some(text), Some(s)) => text.is_match(s, book),
        _ => false,
    };
    let addresses = |lists: &[&[Address]]| match text {
        Some(text) => match_addresses(pattern, text, flags, book, lists),
        None => false,
    };
    let all = pattern.all_addresses;
    let from: &[Address] = &env.from;
    let sender: &[Address] = &env.sender;
    let to: &[Address] = &env.to;
    let cc: &[Address] = &env.cc;

    match kind {
        Kind::All => true,

        Kind::New => !f.intersects(MessageFlags::OLD | MessageFlags::READ),
        Kind::Old => {
            f.contains(MessageFlags::OLD) && !f.contains(MessageFlags::READ)
        }
        Kind::Read => f.contains(MessageFlags::READ),
        Kind::Unread => !f.contains(MessageFlags::READ),
        Kind::Deleted => f.contains(MessageFlags::DELETED),
        Kind::Expired => f.contains(MessageFlags::EXPIRED),
        Kind::Flagged => f.contains(MessageFlags::FLAGGED),
        Kind::Replied => f.contains(MessageFlags::REPLIED),
        Kind::Superseded => f.contains(MessageFlags::SUPERSEDED),
        Kind::Tagged => f.contains(MessageFlags::TAGGED),
        Kind::Collapsed => {
            f.contains(MessageFlags::COLLAPSED) && record.num_hidden > 1
        }
        Kind::Duplicated => record.duplicate_thread,
        Kind::Unreferenced => view.thread_first_child(ix).is_none(),

        Kind::Signed => sec.contains(Security::SIGN),
        Kind::Verified => sec.contains(Security::GOOD_SIGN),
        Kind::Encrypted => sec.contains(Security::ENCRYPT),
        Kind::PgpKey => {
            sec.contains(Security::APPLICATION_PGP | Security::PGP_KEY)
        }

        Kind::MessageNumber => in_range(ix as i64 + 1),
        Kind::Score => in_range(record.score),
        Kind::Size => in_range(record.size),
        Kind::DateSent => in_range(record.date_sent),
        Kind::DateReceived => in_range(record.received),
        Kind::Attachments => match view.attachment_count(ix) {
            Ok(count) => in_range(count as i64),
            Err(e) => {
                warn!("Failed to count attachments of {}: {}", ix + 1, e);
                false
            }
        },

        Kind::Subject => text_matches(env.subject.as_deref()),
        Kind::MessageId => text_matches(env.message_id.as_deref()),
        Kind::Spam => text_matches(env.spam.as_deref()),
        Kind::Newsgroups => text_matches(env.newsgroups.as_deref()),
        Kind::Reference => env
            .references
            .iter()
            .chain(&env.in_reply_to)
            .any(|r| text_matches(Some(r.as_str()))),
        Kind::Label => {
            env.labels.iter().any(|l| text_matches(Some(l.as_str())))
        }

        Kind::From => addresses(&[from]),
        Kind::To => addresses(&[to]),
        Kind::Cc => addresses(&[cc]),
        Kind::Sender => addresses(&[sender]),
        Kind::Recipient => addresses(&[to, cc]),
        Kind::Address => addresses(&[from, sender, to, cc]),

        Kind::KnownList => quantify(all, &[to, cc], |a| book.is_mail_list(a)),
        Kind::SubscribedList => {
            quantify(all, &[to, cc], |a| book.is_subscribed_list(a))
        }
        Kind::PersonalRecipient => {
            quantify(all, &[to, cc], |a| book.is_user(a))
        }
        Kind::PersonalFrom => quantify(all, &[from], |a| book.is_user(a)),

        Kind::Body | Kind::WholeMessage | Kind::Header => {
            let part = match kind {
                Kind::Body => ContentPart::Body,
                Kind::Header => ContentPart::Header,
                _ => ContentPart::Whole,
            };
            text.map_or(false, |text| {
                matches_content(text, part, flags, view, ix)
            })
        }
    }
}

/// Apply `test` to every address in `lists`.
///
/// If `all` is false, true if any address passes. If `all` is true, true
/// if every address passes, including when there are none.
fn quantify(
    all: bool,
    lists: &[&[Address]],
    mut test: impl FnMut(&Address) -> bool,
) -> bool {
    for addr in lists.iter().flat_map(|list| list.iter()) {
        if all ^ test(addr) {
            return !all;
        }
    }

    all
}

fn match_addresses(
    pattern: &Pattern,
    text: &TextMatch,
    flags: MatchFlags,
    book: &dyn AddressBook,
    lists: &[&[Address]],
) -> bool {
    let full = flags.contains(MatchFlags::FULL_ADDRESS);
    quantify(pattern.all_addresses, lists, |addr| {
        let field_matches = |field: &Option<String>| {
            field.as_deref().map_or(false, |s| text.is_match(s, book))
        };

        (!pattern.via_alias || book.has_alias(addr))
            && (field_matches(&addr.mailbox)
                || (full && field_matches(&addr.personal)))
    })
}

fn matches_content<V: MessageView + ?Sized>(
    text: &TextMatch,
    part: ContentPart,
    flags: MatchFlags,
    view: &V,
    ix: usize,
) -> bool {
    let result = view
        .open_content(ix, part, flags.contains(MatchFlags::THOROUGH))
        .and_then(|reader| {
            search_lines(
                reader,
                ContentPart::Header == part,
                text,
                view.address_book(),
            )
        });

    match result {
        Ok(found) => found,
        Err(e) => {
            warn!("Failed to search content of {}: {}", ix + 1, e);
            false
        }
    }
}

/// Search `reader` line by line for `text`.
///
/// If `header` is true, continuation lines are unfolded into the field they
/// continue and the search stops at the first blank line.
fn search_lines(
    mut reader: impl BufRead,
    header: bool,
    text: &TextMatch,
    book: &dyn AddressBook,
) -> io::Result<bool> {
    let mut raw = Vec::new();
    let mut field: Option<String> = None;

    loop {
        raw.clear();
        if 0 == reader.read_until(b'\n', &mut raw)? {
            break;
        }

        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(|c: char| '\n' == c || '\r' == c);

        if !header {
            if text.is_match(line, book) {
                return Ok(true);
            }
            continue;
        }

        if line.is_empty() {
            break;
        }

        if line.starts_with(|c: char| ' ' == c || '\t' == c) {
            if let Some(ref mut field) = field {
                field.push(' ');
                field.push_str(line.trim_start());
                continue;
            }
        }

        if let Some(complete) = field.take() {
            if text.is_match(&complete, book) {
                return Ok(true);
            }
        }
        field = Some(line.to_owned());
    }

    Ok(field.map_or(false, |f| text.is_match(&f, book)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pattern::compile::{compile, CompileContext};
    use crate::store::{CountingView, Mailbox, StaticAddressBook};

    fn pattern(text: &str) -> Pattern {
        compile(text, &CompileContext::new(Capabilities::all())).unwrap()
    }

    fn with_flags(flags: MessageFlags) -> MessageRecord {
        MessageRecord {
            flags,
            ..MessageRecord::default()
        }
    }

    fn with_to(to: &[&str]) -> MessageRecord {
        let mut record = MessageRecord::default();
        record.envelope.to =
            to.iter().map(|a| Address::new(None, a)).collect();
        record
    }

    /// Every matching message, as 1-based numbers.
    fn matching(mbox: &Mailbox, text: &str) -> Vec<usize> {
        let pat = pattern(text);
        (0..mbox.message_count())
            .filter(|&ix| matches(&pat, MatchFlags::all(), mbox, ix))
            .map(|ix| ix + 1)
            .collect()
    }

    #[test]
    fn all_and_nothing() {
        let mut mbox = Mailbox::default();
        mbox.push(MessageRecord::default());
        mbox.push(with_flags(MessageFlags::all()));
        mbox.push(with_to(&["a@example.com"]));

        assert_eq!(vec![1, 2, 3], matching(&mbox, "~A"));
        assert!(matching(&mbox, "!~A").is_empty());
    }

    #[test]
    fn status_flags() {
        let mut mbox = Mailbox::default();
        mbox.push(MessageRecord::default());
        mbox.push(with_flags(MessageFlags::OLD));
        mbox.push(with_flags(MessageFlags::READ));
        mbox.push(with_flags(MessageFlags::OLD | MessageFlags::READ));
        mbox.push(with_flags(MessageFlags::FLAGGED | MessageFlags::DELETED));
        let mut collapsed = with_flags(MessageFlags::COLLAPSED);
        collapsed.num_hidden = 1;
        mbox.push(collapsed.clone());
        collapsed.num_hidden = 2;
        mbox.push(collapsed);

        assert_eq!(vec![1, 5, 6, 7], matching(&mbox, "~N"));
        assert_eq!(vec![2], matching(&mbox, "~O"));
        assert_eq!(vec![3, 4], matching(&mbox, "~R"));
        assert_eq!(vec![1, 2, 5, 6, 7], matching(&mbox, "~U"));
        assert_eq!(vec![5], matching(&mbox, "~F ~D"));
        assert_eq!(vec![7], matching(&mbox, "~v"));
    }

    #[test]
    fn precedence_and_negation() {
        let mut mbox = Mailbox::default();
        mbox.push(with_flags(MessageFlags::FLAGGED));
        mbox.push(with_flags(MessageFlags::DELETED | MessageFlags::READ));
        mbox.push(MessageRecord::default());
        mbox.push(with_flags(MessageFlags::READ));

        // New and flagged, or deleted
        assert_eq!(vec![1, 2], matching(&mbox, "~N ~F|~D"));
        // Not both new and flagged
        assert_eq!(vec![2, 3, 4], matching(&mbox, "!(~N ~F)"));
    }

    #[test]
    fn numeric_ranges() {
        let mut mbox = Mailbox::default();
        for (size, score) in &[(50, -3), (100, 0), (300, 5), (500, 10)] {
            let mut record = MessageRecord::default();
            record.size = *size;
            record.score = *score;
            mbox.push(record);
        }

        assert_eq!(vec![2, 3, 4], matching(&mbox, "~z 500-100"));
        assert_eq!(vec![3, 4], matching(&mbox, "~z 101-"));
        assert_eq!(vec![2, 3], matching(&mbox, "~n 0-5"));
        assert_eq!(vec![2, 3], matching(&mbox, "~m 2-3"));
    }

    #[test]
    fn dates() {
        let ctx = CompileContext::new(Capabilities::all());
        let now = ctx.now.timestamp();
        let pat = compile("~d <2d", &ctx).unwrap();

        let mut mbox = Mailbox::default();
        for &age in &[1, 3] {
            let mut record = MessageRecord::default();
            record.date_sent = now - age * 86400;
            mbox.push(record);
        }

        assert!(matches(&pat, MatchFlags::empty(), &mbox, 0));
        assert!(!matches(&pat, MatchFlags::empty(), &mbox, 1));
    }

    #[test]
    fn address_quantification() {
        let mut mbox = Mailbox::default();
        mbox.push(with_to(&["alice@example.com", "bob@example.com"]));
        mbox.push(with_to(&["alice@example.com", "carol@example.org"]));
        mbox.push(with_to(&[]));

        assert_eq!(vec![1, 2], matching(&mbox, "~t example\\.com"));
        assert_eq!(vec![1, 3], matching(&mbox, "^~t example\\.com"));
        assert_eq!(vec![3], matching(&mbox, "!~t example"));
        assert_eq!(vec![2], matching(&mbox, "~t carol"));
        assert_eq!(vec![1, 2], matching(&mbox, "~C alice"));
        assert_eq!(vec![1, 2], matching(&mbox, "~L alice"));
        assert!(matching(&mbox, "~f alice").is_empty());
    }

    #[test]
    fn personal_names() {
        let mut mbox = Mailbox::default();
        let mut record = MessageRecord::default();
        record.envelope.from =
            vec![Address::new(Some("Alice Liddell"), "al@example.com")];
        mbox.push(record);

        let pat = pattern("~f liddell");
        assert!(matches(&pat, MatchFlags::FULL_ADDRESS, &mbox, 0));
        assert!(!matches(&pat, MatchFlags::empty(), &mbox, 0));
    }

    #[test]
    fn address_book_predicates() {
        let book = StaticAddressBook {
            lists: vec!["dev@lists.example.com".to_owned()],
            subscribed: vec!["announce@lists.example.com".to_owned()],
            user: vec!["me@example.com".to_owned()],
            aliases: vec!["friend@example.com".to_owned()],
            ..StaticAddressBook::default()
        };
        let mut mbox = Mailbox::new(book);
        mbox.push(with_to(&["dev@lists.example.com"]));
        mbox.push(with_to(&["announce@lists.example.com"]));
        mbox.push(with_to(&["me@example.com", "friend@example.com"]));
        let mut from_me = MessageRecord::default();
        from_me.envelope.from = vec![Address::new(None, "ME@example.com")];
        mbox.push(from_me);

        assert_eq!(vec![1, 2], matching(&mbox, "~l"));
        assert_eq!(vec![2], matching(&mbox, "~u"));
        assert_eq!(vec![3], matching(&mbox, "~p"));
        assert_eq!(vec![4], matching(&mbox, "~P"));
        assert_eq!(vec![3], matching(&mbox, "~t @example"));
        assert_eq!(vec![3], matching(&mbox, "@~t friend"));
        assert!(matching(&mbox, "@~t me").is_empty());
        assert_eq!(vec![4], matching(&mbox, "^~p"));
    }

    #[test]
    fn envelope_text() {
        let mut mbox = Mailbox::default();
        let mut record = MessageRecord::default();
        record.envelope.subject = Some("Quarterly Report".to_owned());
        record.envelope.message_id = Some("<abc@host>".to_owned());
        record.envelope.in_reply_to = vec!["<parent@host>".to_owned()];
        record.envelope.labels = vec!["work".to_owned(), "urgent".to_owned()];
        record.envelope.spam = Some("spam score 9".to_owned());
        mbox.push(record);
        mbox.push(MessageRecord::default());

        assert_eq!(vec![1], matching(&mbox, "~s report"));
        assert!(matching(&mbox, "~s REPORT").is_empty());
        assert_eq!(vec![1], matching(&mbox, "=s Report"));
        assert_eq!(vec![1], matching(&mbox, "~i abc@"));
        assert_eq!(vec![1], matching(&mbox, "~x parent"));
        assert_eq!(vec![1], matching(&mbox, "~y ^urgent$"));
        assert_eq!(vec![1], matching(&mbox, "~H 'score 9'"));
        assert_eq!(vec![2], matching(&mbox, "!~s ."));
    }

    #[test]
    fn address_groups() {
        let mut book = StaticAddressBook::default();
        book.groups.insert(
            "friends".to_owned(),
            vec!["bob@example.com".to_owned()],
        );
        let mut mbox = Mailbox::new(book);
        mbox.push(with_to(&["bob@example.com"]));
        mbox.push(with_to(&["eve@example.com"]));

        assert_eq!(vec![1], matching(&mbox, "%t friends"));
    }

    #[test]
    fn security() {
        let mut mbox = Mailbox::default();
        let mut record = MessageRecord::default();
        record.security = Security::SIGN | Security::GOOD_SIGN;
        mbox.push(record.clone());
        record.security = Security::ENCRYPT | Security::PGP_KEY;
        mbox.push(record.clone());
        record.security =
            Security::ENCRYPT | Security::PGP_KEY | Security::APPLICATION_PGP;
        mbox.push(record);

        assert_eq!(vec![1], matching(&mbox, "~g ~V"));
        assert_eq!(vec![2, 3], matching(&mbox, "~G"));
        assert_eq!(vec![3], matching(&mbox, "~k"));
    }

    #[test]
    fn full_text() {
        let mut mbox = Mailbox::default();
        let ix = mbox.push(MessageRecord::default());
        mbox.set_content(
            ix,
            "From: someone\nSubject: a long\n  folded subject\n\nX-Fake: no\n",
            "Hello there\r\nGeneral Kenobi\n",
        );
        mbox.set_attachments(ix, 2);
        mbox.push(MessageRecord::default());

        assert_eq!(vec![1], matching(&mbox, "~h 'long folded'"));
        assert_eq!(vec![1], matching(&mbox, "~h ^subject:"));
        assert!(matching(&mbox, "~h fake").is_empty());
        assert_eq!(vec![1], matching(&mbox, "~b kenobi$"));
        assert!(matching(&mbox, "~b someone").is_empty());
        assert_eq!(vec![1], matching(&mbox, "~B someone"));
        assert_eq!(vec![1], matching(&mbox, "~B kenobi"));
        assert_eq!(vec![1], matching(&mbox, "~X 1-"));
        assert_eq!(vec![2], matching(&mbox, "~X 0-0"));
    }

    #[test]
    fn threads() {
        // 1
        // +-2
        // | +-3
        // +-4
        //   +-5
        // 6
        let mut mbox = Mailbox::default();
        let root = mbox.push(MessageRecord::default());
        let a = mbox.push_reply(root, with_flags(MessageFlags::READ));
        mbox.push_reply(a, with_flags(MessageFlags::READ));
        let b = mbox.push_reply(root, with_flags(MessageFlags::READ));
        mbox.push_reply(b, with_flags(MessageFlags::FLAGGED));
        mbox.push(with_flags(MessageFlags::READ));

        assert_eq!(vec![1, 2, 3, 4, 5], matching(&mbox, "~(~F)"));
        assert_eq!(vec![6], matching(&mbox, "!~(~N)"));
        assert_eq!(vec![3, 5, 6], matching(&mbox, "~$"));
        assert_eq!(vec![2, 3, 4], matching(&mbox, "~R ~(~F)"));
    }

    #[test]
    fn combinators_short_circuit() {
        let mut mbox = Mailbox::default();
        mbox.push(MessageRecord::default());
        let view = CountingView::new(&mbox);

        let flags = MatchFlags::empty();
        assert!(!matches(&pattern("~D ~N ~N"), flags, &view, 0));
        assert_eq!(1, view.reads());

        view.reset();
        assert!(matches(&pattern("~N|~D|~F"), flags, &view, 0));
        assert_eq!(1, view.reads());
    }
}
