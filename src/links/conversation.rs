//! Conversation windows: when a subcluster or cluster was recently active.
//!
//! A window is a closed time interval. Windows separated by less than the
//! configured conversation threshold describe one continuous conversation and
//! get merged; windows further apart stay separate.

use serde::{Deserialize, Serialize};

use super::types::Timestamp;

/// One activity interval. `duration` is always `end - start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConversationRecord")]
pub struct Conversation {
    #[serde(rename = "start_time")]
    start: Timestamp,
    #[serde(rename = "end_time")]
    end: Timestamp,
    duration: f64,
}

/// Serialized form of a window. The duration is recomputed, never read.
#[derive(Deserialize)]
struct ConversationRecord {
    start_time: Timestamp,
    end_time: Timestamp,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Conversation::new(record.start_time, record.end_time)
    }
}

impl Conversation {
    /// Build a window from two instants, in either order.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        Self {
            start,
            end,
            duration: end - start,
        }
    }

    /// A zero-length window at a single instant.
    pub fn at(instant: Timestamp) -> Self {
        Self::new(instant, instant)
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Gap from the end of `self` to the start of `later`.
    ///
    /// Negative when the windows overlap.
    pub fn gap_to(&self, later: &Conversation) -> f64 {
        later.start - self.end
    }

    /// Whether two windows overlap or sit closer than `threshold`.
    pub fn is_continuous_with(&self, other: &Conversation, threshold: f64) -> bool {
        let (first, second) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        first.gap_to(second) < threshold
    }

    /// Smallest window covering both.
    pub fn span(&self, other: &Conversation) -> Conversation {
        Conversation::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Grow the window so it covers `instant`.
    pub fn extend_to(&mut self, instant: Timestamp) {
        *self = Conversation::new(self.start.min(instant), self.end.max(instant));
    }
}

/// Order windows by start time.
pub(crate) fn sort_by_start(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        a.start
            .total_cmp(&b.start)
            .then_with(|| a.end.total_cmp(&b.end))
    });
}

/// Insert a closed window into a start-sorted history, keeping it sorted.
pub(crate) fn insert_sorted(history: &mut Vec<Conversation>, conversation: Conversation) {
    let position = history.partition_point(|c| c.start <= conversation.start);
    history.insert(position, conversation);
}

/// Fold an observation at `instant` into a subcluster's temporal state.
///
/// An instant inside the open window, or past it by less than `threshold`,
/// extends it. A later instant closes the open window into `history` and
/// opens a new one. An instant that arrives before the open window starts
/// either stretches the window back (absorbing history it now touches) or is
/// coalesced into `history`; windows never end up overlapping.
pub(crate) fn record_activity(
    current: &mut Option<Conversation>,
    history: &mut Vec<Conversation>,
    instant: Timestamp,
    threshold: f64,
) {
    let Some(window) = current.as_mut() else {
        *current = Some(Conversation::at(instant));
        return;
    };

    if instant >= window.start {
        if instant - window.end < threshold {
            window.extend_to(instant);
        } else {
            let closed = std::mem::replace(window, Conversation::at(instant));
            insert_sorted(history, closed);
        }
        return;
    }

    // Out of order: earlier than the open window
    let late = Conversation::at(instant);
    if late.is_continuous_with(window, threshold) {
        window.extend_to(instant);
        while let Some(&last) = history.last() {
            if !last.is_continuous_with(window, threshold) {
                break;
            }
            *window = window.span(&last);
            history.pop();
        }
    } else {
        let earlier = std::mem::take(history);
        *history = merge_conversation_list(earlier.into_iter().chain(std::iter::once(late)), threshold);
    }
}

/// Combine the temporal state of two subclusters being merged.
///
/// Open windows that overlap or sit closer than `threshold` become one
/// window. Otherwise the later-ending window stays open and the other one
/// joins the history. Histories are concatenated and re-sorted by start; no
/// coalescing happens here, see [`merge_conversation_list`] for that.
pub(crate) fn merge_temporal_state(
    current: Option<Conversation>,
    history: Vec<Conversation>,
    other_current: Option<Conversation>,
    other_history: Vec<Conversation>,
    threshold: f64,
) -> (Option<Conversation>, Vec<Conversation>) {
    let mut merged_history = history;
    merged_history.extend(other_history);

    let merged_current = match (current, other_current) {
        (Some(a), Some(b)) if a.is_continuous_with(&b, threshold) => Some(a.span(&b)),
        (Some(a), Some(b)) => {
            let (earlier, later) = if b.end >= a.end { (a, b) } else { (b, a) };
            merged_history.push(earlier);
            Some(later)
        }
        (Some(a), None) | (None, Some(a)) => Some(a),
        (None, None) => None,
    };

    sort_by_start(&mut merged_history);
    (merged_current, merged_history)
}

/// Merge a collection of windows into a canonical, gap-respecting sequence.
///
/// The result is sorted by start and every consecutive pair satisfies
/// `next.start >= prev.end + threshold`.
pub fn merge_conversation_list(
    conversations: impl IntoIterator<Item = Conversation>,
    threshold: f64,
) -> Vec<Conversation> {
    let mut sorted: Vec<Conversation> = conversations.into_iter().collect();
    sort_by_start(&mut sorted);

    let mut merged: Vec<Conversation> = Vec::with_capacity(sorted.len());
    for conversation in sorted {
        match merged.last_mut() {
            Some(last) if last.gap_to(&conversation) < threshold => {
                *last = last.span(&conversation);
            }
            _ => merged.push(conversation),
        }
    }
    merged
}
