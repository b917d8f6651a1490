//! Context Budget Enforcement
//!
//! Keeps the conversation log under a cumulative character budget by
//! dropping the oldest messages first. The budget counts characters of
//! content, not tokens; it is an approximation and stays one.

use std::collections::VecDeque;

use crate::messages::Message;

/// Front-trims a message log to a character budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextTrimmer {
    budget: usize,
}

impl ContextTrimmer {
    /// Create a trimmer for `budget` characters
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    /// Configured budget in characters
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Drop messages from the front while the total content length exceeds
    /// the budget and more than one message remains
    ///
    /// Never empties a non-empty log: the last remaining message is kept
    /// even when it alone is over budget. Returns how many were removed.
    pub fn trim(&self, messages: &mut VecDeque<Message>) -> usize {
        let mut total: usize = messages.iter().map(Message::char_len).sum();
        let mut removed = 0;

        while total > self.budget && messages.len() > 1 {
            if let Some(oldest) = messages.pop_front() {
                total -= oldest.char_len();
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(
                removed = removed,
                remaining = messages.len(),
                chars = total,
                budget = self.budget,
                "Trimmed conversation to fit context budget"
            );
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(contents: &[&str]) -> VecDeque<Message> {
        contents.iter().map(|c| Message::user(*c)).collect()
    }

    fn total(messages: &VecDeque<Message>) -> usize {
        messages.iter().map(Message::char_len).sum()
    }

    #[test]
    fn test_under_budget_is_untouched() {
        let mut messages = log(&["short", "also short"]);
        assert_eq!(ContextTrimmer::new(100).trim(&mut messages), 0);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_exactly_at_budget_is_untouched() {
        let mut messages = log(&["12345", "67890"]);
        assert_eq!(ContextTrimmer::new(10).trim(&mut messages), 0);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_removes_oldest_first() {
        let mut messages = log(&["AAAAAAAAAA", "BBBBBBBBBB", "CCCCCCCCCC"]);
        let removed = ContextTrimmer::new(20).trim(&mut messages);

        assert_eq!(removed, 1);
        assert_eq!(messages[0].content(), "BBBBBBBBBB");
        assert_eq!(messages[1].content(), "CCCCCCCCCC");
    }

    #[test]
    fn test_keeps_last_message_even_over_budget() {
        let mut messages = log(&["short", "this is a very long message"]);
        let removed = ContextTrimmer::new(20).trim(&mut messages);

        assert_eq!(removed, 1);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content(), "this is a very long message");
    }

    #[test]
    fn test_empty_log_stays_empty() {
        let mut messages = VecDeque::new();
        assert_eq!(ContextTrimmer::new(0).trim(&mut messages), 0);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_postcondition_holds_across_budgets() {
        let contents = ["alpha", "", "a much longer entry here", "mid size", "z"];
        for budget in 0..50 {
            let mut messages = log(&contents);
            ContextTrimmer::new(budget).trim(&mut messages);
            assert!(
                total(&messages) <= budget || messages.len() == 1,
                "budget {budget} left {} messages totalling {}",
                messages.len(),
                total(&messages)
            );
        }
    }
}
