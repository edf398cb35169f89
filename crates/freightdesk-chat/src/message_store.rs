//! Per-thread message log.
//!
//! Messages arrive from history pages, live events and local send echoes in
//! any interleaving. [`merge`] folds them into one deduplicated, totally
//! ordered sequence so every replica of the same input set reads the same.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u64>,
}

impl Message {
    /// Timestamp as epoch milliseconds; unparsable values read as 0.
    pub fn timestamp_millis(&self) -> i64 {
        parse_timestamp_millis(&self.timestamp)
    }
}

/// Parse RFC 3339, a zone-less ISO 8601 date-time (read as UTC), or raw
/// epoch milliseconds. Anything else is 0 so it sorts first.
pub fn parse_timestamp_millis(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_millis();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc().timestamp_millis();
    }
    raw.parse::<i64>().unwrap_or(0)
}

/// Pairwise message order: sequence index when both carry one, otherwise
/// timestamp; ties fall back to the id.
pub fn compare_messages(a: &Message, b: &Message) -> Ordering {
    let primary = match (a.sequence_index, b.sequence_index) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.timestamp_millis().cmp(&b.timestamp_millis()),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

/// Merge `incoming` into `existing`, deduplicating by id (last write wins).
///
/// [`compare_messages`] alone is not transitive once sequenced and
/// unsequenced messages mix, so the two groups are sorted separately (each
/// group is totally ordered by it) and then interleaved by timestamp. The
/// output depends only on the set of messages, never on call order.
pub fn merge<I>(existing: &[Message], incoming: I) -> Vec<Message>
where
    I: IntoIterator<Item = Message>,
{
    let mut by_id: HashMap<String, Message> = existing
        .iter()
        .map(|m| (m.id.clone(), m.clone()))
        .collect();
    for message in incoming {
        by_id.insert(message.id.clone(), message);
    }

    let (mut sequenced, mut loose): (Vec<Message>, Vec<Message>) = by_id
        .into_values()
        .partition(|m| m.sequence_index.is_some());
    sequenced.sort_by(compare_messages);
    loose.sort_by(compare_messages);

    let mut merged = Vec::with_capacity(sequenced.len() + loose.len());
    let mut sequenced = sequenced.into_iter().peekable();
    let mut loose = loose.into_iter().peekable();
    loop {
        let take_loose = match (sequenced.peek(), loose.peek()) {
            (Some(s), Some(l)) => compare_messages(l, s) == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_loose {
            loose.next()
        } else {
            sequenced.next()
        };
        merged.extend(next);
    }
    merged
}

/// In-memory message logs keyed by thread id.
#[derive(Debug, Default)]
pub struct MessageStore {
    threads: HashMap<String, Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge messages into a thread's log. Returns the resulting length.
    pub fn merge_into<I>(&mut self, thread_id: &str, incoming: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let log = self.threads.entry(thread_id.to_string()).or_default();
        *log = merge(log, incoming);
        log.len()
    }

    /// All messages of a thread, oldest first.
    pub fn messages(&self, thread_id: &str) -> &[Message] {
        self.threads
            .get(thread_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_entries(&self, thread_id: &str) -> bool {
        self.threads
            .get(thread_id)
            .is_some_and(|log| !log.is_empty())
    }

    pub fn clear_thread(&mut self, thread_id: &str) {
        self.threads.remove(thread_id);
    }

    pub fn clear_all(&mut self) {
        self.threads.clear();
    }

    /// Total number of stored messages across all threads.
    pub fn total_messages(&self) -> usize {
        self.threads.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, ts: &str, seq: Option<u64>) -> Message {
        Message {
            id: id.into(),
            body: format!("body of {id}"),
            author_id: "user-1".into(),
            timestamp: ts.into(),
            sequence_index: seq,
        }
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    fn sample() -> Vec<Message> {
        vec![
            msg("m3", "2024-05-01T10:00:03Z", Some(3)),
            msg("m1", "2024-05-01T10:00:01Z", Some(1)),
            msg("x", "2024-05-01T10:00:02.500Z", None),
            msg("m2", "2024-05-01T10:00:02Z", Some(2)),
            msg("bad", "not a date", None),
        ]
    }

    #[test]
    fn merge_orders_by_sequence_then_timestamp() {
        let merged = merge(&[], sample());
        assert_eq!(ids(&merged), vec!["bad", "m1", "m2", "x", "m3"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let once = merge(&[], sample());
        let twice = merge(&once, sample());
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_is_order_independent() {
        let expected = merge(&[], sample());
        let mut input = sample();
        for rotation in 0..input.len() {
            input.rotate_left(1);
            assert_eq!(merge(&[], input.clone()), expected, "rotation {rotation}");
            let mut reversed = input.clone();
            reversed.reverse();
            assert_eq!(merge(&[], reversed), expected, "reversed rotation {rotation}");
        }
    }

    #[test]
    fn merge_split_across_calls_matches_single_merge() {
        let all = sample();
        let expected = merge(&[], all.clone());
        let first = merge(&[], all[3..].to_vec());
        let second = merge(&first, all[..3].to_vec());
        assert_eq!(second, expected);
    }

    #[test]
    fn duplicate_id_last_write_wins() {
        let original = msg("m1", "2024-05-01T10:00:01Z", Some(1));
        let mut edited = original.clone();
        edited.body = "edited".into();

        let merged = merge(&[original], vec![edited]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].body, "edited");
    }

    #[test]
    fn timestamp_ties_break_by_id() {
        let merged = merge(
            &[],
            vec![
                msg("b", "2024-05-01T10:00:00Z", None),
                msg("a", "2024-05-01T10:00:00Z", None),
            ],
        );
        assert_eq!(ids(&merged), vec!["a", "b"]);
    }

    #[test]
    fn sequence_wins_over_timestamp_when_both_sequenced() {
        let merged = merge(
            &[],
            vec![
                msg("late-clock", "2024-05-01T12:00:00Z", Some(1)),
                msg("early-clock", "2024-05-01T09:00:00Z", Some(2)),
            ],
        );
        assert_eq!(ids(&merged), vec!["late-clock", "early-clock"]);
    }

    #[test]
    fn parse_timestamp_variants() {
        assert_eq!(parse_timestamp_millis("1970-01-01T00:00:01Z"), 1000);
        assert_eq!(parse_timestamp_millis("1970-01-01T00:00:02"), 2000);
        assert_eq!(parse_timestamp_millis("1714557600000"), 1_714_557_600_000);
        assert_eq!(parse_timestamp_millis(""), 0);
        assert_eq!(parse_timestamp_millis("yesterday"), 0);
    }

    #[test]
    fn store_keeps_threads_separate() {
        let mut store = MessageStore::new();
        assert!(!store.has_entries("T1"));

        store.merge_into("T1", vec![msg("a", "2024-05-01T10:00:00Z", None)]);
        store.merge_into("T2", vec![msg("b", "2024-05-01T10:00:00Z", None)]);
        let len = store.merge_into("T1", vec![msg("c", "2024-05-01T11:00:00Z", None)]);

        assert_eq!(len, 2);
        assert_eq!(ids(store.messages("T1")), vec!["a", "c"]);
        assert_eq!(store.total_messages(), 3);
        assert!(store.messages("missing").is_empty());

        store.clear_thread("T2");
        assert!(!store.has_entries("T2"));
        store.clear_all();
        assert_eq!(store.total_messages(), 0);
    }
}
