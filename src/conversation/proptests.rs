//! Property-based tests for the conversation log
//!
//! Invariants checked:
//! - `count()` tracks appends, ignoring `None`
//! - `last()` is always the most recent append
//! - `append_once` never stores the same message twice
//! - conditional and plain removals only touch the log when they remove
//! - role counts always add up to the total

use super::Conversation;
use crate::message::{Message, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_TOOL, ROLE_USER};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_role() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(ROLE_USER),
        Just(ROLE_ASSISTANT),
        Just(ROLE_TOOL),
        Just(ROLE_SYSTEM),
    ]
}

fn arb_message() -> impl Strategy<Value = Message> {
    (arb_role(), "[a-zA-Z0-9 _.!?,]{0,40}").prop_map(|(role, text)| Message::new(role, text))
}

/// Messages interleaved with `None` entries
fn arb_appends() -> impl Strategy<Value = Vec<Option<Message>>> {
    proptest::collection::vec(proptest::option::weighted(0.8, arb_message()), 0..30)
}

fn build(appends: &[Option<Message>]) -> Conversation {
    let mut chat = Conversation::new("prop");
    for message in appends {
        chat.append(message.clone());
    }
    chat
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn count_matches_non_none_appends(appends in arb_appends()) {
        let chat = build(&appends);
        let expected = appends.iter().filter(|m| m.is_some()).count();
        prop_assert_eq!(chat.count(), expected);
    }

    #[test]
    fn last_is_most_recent_append(appends in arb_appends()) {
        let chat = build(&appends);
        let expected = appends.iter().rev().find_map(Option::as_ref).map(Message::identity);
        prop_assert_eq!(chat.last().map(Message::identity), expected);
    }

    #[test]
    fn append_once_is_idempotent(messages in proptest::collection::vec(arb_message(), 1..10), repeats in 1usize..4) {
        let mut chat = Conversation::new("prop");
        for _ in 0..repeats {
            for message in &messages {
                chat.append_once(message.clone());
            }
        }
        prop_assert_eq!(chat.count(), messages.len());
    }

    #[test]
    fn pop_last_if_role_only_pops_matching(appends in arb_appends(), role in arb_role()) {
        let mut chat = build(&appends);
        let before = chat.count();
        let last_role = chat.last_role().map(str::to_string);

        let popped = chat.pop_last_if_role(role);
        if last_role.as_deref() == Some(role) {
            prop_assert!(popped.is_some());
            prop_assert_eq!(chat.count(), before - 1);
        } else {
            prop_assert!(popped.is_none());
            prop_assert_eq!(chat.count(), before);
        }
    }

    #[test]
    fn role_counts_sum_to_total(appends in arb_appends()) {
        let chat = build(&appends);
        let total: usize = [ROLE_USER, ROLE_ASSISTANT, ROLE_TOOL, ROLE_SYSTEM]
            .iter()
            .map(|role| chat.count_by_role(role))
            .sum();
        prop_assert_eq!(total, chat.count());
    }

    #[test]
    fn last_by_role_matches_linear_scan(appends in arb_appends(), role in arb_role()) {
        let chat = build(&appends);
        let expected = appends
            .iter()
            .flatten()
            .filter(|m| m.role == role)
            .last()
            .map(Message::identity);
        prop_assert_eq!(chat.last_by_role(role).map(Message::identity), expected);
    }

    #[test]
    fn set_system_content_is_idempotent(appends in arb_appends(), text in "[a-z ]{0,20}") {
        let mut once = build(&appends);
        once.set_system_content(text.as_str());

        let mut twice = once.clone();
        twice.set_system_content(text.as_str());

        prop_assert_eq!(once.count(), twice.count());
        prop_assert_eq!(twice.messages()[0].role.as_str(), ROLE_SYSTEM);
        prop_assert_eq!(twice.messages()[0].content_str(), Some(text.as_str()));
        prop_assert!(twice.last_updated >= once.last_updated);
    }

    #[test]
    fn drain_from_both_ends_empties_log(appends in arb_appends()) {
        let mut chat = build(&appends);
        let mut removed = 0;
        loop {
            let next = if removed % 2 == 0 { chat.shift_first() } else { chat.remove_last() };
            if next.is_none() {
                break;
            }
            removed += 1;
        }
        prop_assert_eq!(removed, appends.iter().flatten().count());
        prop_assert!(chat.is_empty());
    }
}
