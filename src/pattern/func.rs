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

//! Operations applied to every message matching a pattern.

use chrono::TimeZone;
use log::{debug, warn};

use super::compile::{compile, CompileContext};
use super::eval;
use super::model::Capabilities;
use super::simple::expand_simple;
use super::view::{MessageFlags, MessageView, MessageViewMut};
use crate::support::config::PatternConfig;
use crate::support::error::Error;

/// Notice given when a limit leaves a non-empty mailbox with no visible
/// messages.
pub const NO_MESSAGES_MATCHED: &str = "No messages matched criteria.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkOp {
    /// Show only the matching messages.
    Limit,
    Tag,
    Untag,
    Delete,
    /// Clear the deleted and purge flags.
    Undelete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkOutcome {
    /// The number of messages the pattern matched.
    pub matched: usize,
    /// A soft notice for the user, if any.
    pub notice: Option<&'static str>,
}

/// Compile `query` and apply `op` to every matching message of `view`.
///
/// `Limit` considers every message in the mailbox; the other operations
/// only consider those currently visible. The query is compiled with at
/// least the full-message capability regardless of `ctx`.
pub fn pattern_func<V: MessageViewMut + ?Sized, Tz: TimeZone>(
    view: &mut V,
    op: BulkOp,
    query: &str,
    config: &PatternConfig,
    ctx: &CompileContext<Tz>,
) -> Result<BulkOutcome, Error> {
    if query.is_empty() {
        return Err(Error::EmptyPattern);
    }

    let expanded = expand_simple(query, &config.simple_search);
    let mut ctx = ctx.clone();
    ctx.capabilities |= Capabilities::FULL_MSG;
    let pattern = compile(&expanded, &ctx)?;
    let flags = config.match_flags();

    let candidates: Vec<usize> = if BulkOp::Limit == op {
        (0..view.message_count()).collect()
    } else {
        (0..view.visible_count())
            .map(|vix| view.visible_message(vix))
            .collect()
    };
    let hits: Vec<usize> = candidates
        .into_iter()
        .filter(|&ix| eval::matches(&pattern, flags, &*view, ix))
        .collect();
    debug!("{:?} {} matched {} messages", op, pattern, hits.len());

    let matched = hits.len();
    let mut notice = None;
    match op {
        BulkOp::Limit => {
            if view.message_count() > 0 && hits.is_empty() {
                warn!("{}", NO_MESSAGES_MATCHED);
                notice = Some(NO_MESSAGES_MATCHED);
            }

            let limit = if "~A" == expanded {
                None
            } else {
                Some(query.to_owned())
            };
            view.set_limit(hits, limit);
        }
        BulkOp::Tag | BulkOp::Untag => {
            for ix in hits {
                view.set_flags(ix, MessageFlags::TAGGED, BulkOp::Tag == op);
            }
        }
        BulkOp::Delete => {
            for ix in hits {
                view.set_flags(ix, MessageFlags::DELETED, true);
            }
        }
        BulkOp::Undelete => {
            for ix in hits {
                view.set_flags(
                    ix,
                    MessageFlags::DELETED | MessageFlags::PURGE,
                    false,
                );
            }
        }
    }

    Ok(BulkOutcome { matched, notice })
}

fn thread_root<V: MessageView + ?Sized>(view: &V, mut ix: usize) -> usize {
    while let Some(parent) = view.thread_parent(ix) {
        ix = parent;
    }
    ix
}

/// Restrict the view to the thread containing message `current`.
///
/// Returns the number of messages now visible.
pub fn limit_current_thread<V: MessageViewMut + ?Sized>(
    view: &mut V,
    current: usize,
) -> usize {
    let root = thread_root(&*view, current);
    let visible: Vec<usize> = (0..view.message_count())
        .filter(|&ix| thread_root(&*view, ix) == root)
        .collect();
    let count = visible.len();
    view.set_limit(visible, None);
    count
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pattern::view::MessageRecord;
    use crate::store::Mailbox;

    fn with_flags(flags: MessageFlags) -> MessageRecord {
        let mut record = MessageRecord::default();
        record.flags = flags;
        record
    }

    fn visible(mbox: &Mailbox) -> Vec<usize> {
        (0..mbox.visible_count())
            .map(|vix| mbox.visible_message(vix))
            .collect()
    }

    fn run(
        mbox: &mut Mailbox,
        op: BulkOp,
        query: &str,
    ) -> Result<BulkOutcome, Error> {
        pattern_func(
            mbox,
            op,
            query,
            &PatternConfig::default(),
            &CompileContext::new(Capabilities::empty()),
        )
    }

    fn sample() -> Mailbox {
        let mut mbox = Mailbox::default();
        mbox.push(with_flags(MessageFlags::READ));
        mbox.push(with_flags(MessageFlags::FLAGGED));
        mbox.push(with_flags(MessageFlags::READ | MessageFlags::FLAGGED));
        mbox.push(with_flags(MessageFlags::DELETED | MessageFlags::PURGE));
        mbox
    }

    #[test]
    fn limit() {
        let mut mbox = sample();
        let outcome = run(&mut mbox, BulkOp::Limit, "~F").unwrap();
        assert_eq!(
            BulkOutcome {
                matched: 2,
                notice: None
            },
            outcome
        );
        assert_eq!(vec![1, 2], visible(&mbox));
        assert_eq!(Some("~F"), mbox.limit_pattern());

        // Limit considers hidden messages too
        run(&mut mbox, BulkOp::Limit, "~D").unwrap();
        assert_eq!(vec![3], visible(&mbox));

        run(&mut mbox, BulkOp::Limit, "all").unwrap();
        assert_eq!(vec![0, 1, 2, 3], visible(&mbox));
        assert_eq!(None, mbox.limit_pattern());
    }

    #[test]
    fn limit_without_matches() {
        let mut mbox = sample();
        let outcome = run(&mut mbox, BulkOp::Limit, "~T").unwrap();
        assert_eq!(0, outcome.matched);
        assert_eq!(Some(NO_MESSAGES_MATCHED), outcome.notice);
        assert!(visible(&mbox).is_empty());

        let mut empty = Mailbox::default();
        let outcome = run(&mut empty, BulkOp::Limit, "~T").unwrap();
        assert_eq!(None, outcome.notice);
    }

    #[test]
    fn tag_and_delete_only_visible() {
        let mut mbox = sample();
        run(&mut mbox, BulkOp::Limit, "~R").unwrap();

        assert_eq!(2, run(&mut mbox, BulkOp::Tag, "~A").unwrap().matched);
        let tagged: Vec<bool> = (0..4)
            .map(|ix| mbox.record(ix).flags.contains(MessageFlags::TAGGED))
            .collect();
        assert_eq!(vec![true, false, true, false], tagged);

        run(&mut mbox, BulkOp::Untag, "~F").unwrap();
        assert!(mbox.record(0).flags.contains(MessageFlags::TAGGED));
        assert!(!mbox.record(2).flags.contains(MessageFlags::TAGGED));

        run(&mut mbox, BulkOp::Delete, "~T").unwrap();
        assert!(mbox.record(0).flags.contains(MessageFlags::DELETED));
        assert!(!mbox.record(1).flags.contains(MessageFlags::DELETED));
    }

    #[test]
    fn undelete_clears_purge() {
        let mut mbox = sample();
        run(&mut mbox, BulkOp::Undelete, "~D").unwrap();
        assert_eq!(MessageFlags::empty(), mbox.record(3).flags);
    }

    #[test]
    fn full_message_capability_is_implied() {
        let mut mbox = Mailbox::default();
        let ix = mbox.push(MessageRecord::default());
        mbox.set_content(ix, "Subject: hi", "secret plans");
        mbox.push(MessageRecord::default());

        let outcome = run(&mut mbox, BulkOp::Tag, "~b secret").unwrap();
        assert_eq!(1, outcome.matched);
        assert!(mbox.record(ix).flags.contains(MessageFlags::TAGGED));
    }

    #[test]
    fn errors_leave_view_alone() {
        let mut mbox = sample();
        assert_matches!(
            Err(Error::EmptyPattern),
            run(&mut mbox, BulkOp::Limit, "")
        );
        assert_matches!(
            Err(Error::MismatchedParens(..)),
            run(&mut mbox, BulkOp::Limit, "(~F")
        );
        assert_eq!(vec![0, 1, 2, 3], visible(&mbox));
    }

    #[test]
    fn current_thread() {
        let mut mbox = Mailbox::default();
        let a = mbox.push(MessageRecord::default());
        let b = mbox.push(MessageRecord::default());
        let a1 = mbox.push_reply(a, MessageRecord::default());
        let a2 = mbox.push_reply(a1, MessageRecord::default());
        mbox.push_reply(b, MessageRecord::default());

        assert_eq!(3, limit_current_thread(&mut mbox, a2));
        assert_eq!(vec![a, a1, a2], visible(&mbox));
        assert_eq!(None, mbox.limit_pattern());
    }
}
