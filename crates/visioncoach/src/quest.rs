//! Quest progress interface
//!
//! The quest/challenge tracker lives outside this crate. The coach only tells
//! it which challenge a session belongs to and adds one unit of progress per
//! counted rep; completion, rewards and per-day idempotency are the tracker's
//! business.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeId(String);

impl ChallengeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Narrow view of the external quest tracker
pub trait QuestTracker: Send + Sync {
    fn start_tracking(&self, challenge: &ChallengeId);

    fn add_manual_progress(&self, amount: NonZeroU32, challenge: &ChallengeId);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestEvent {
    Started(ChallengeId),
    Progress(ChallengeId, u32),
}

/// Records every call. Useful for tests and offline replays.
#[derive(Debug, Default)]
pub struct MemoryQuestTracker {
    events: Mutex<Vec<QuestEvent>>,
}

impl MemoryQuestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QuestEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Sum of progress added to `challenge`
    pub fn progress(&self, challenge: &ChallengeId) -> u32 {
        self.events()
            .iter()
            .filter_map(|e| match e {
                QuestEvent::Progress(id, amount) if id == challenge => Some(*amount),
                _ => None,
            })
            .sum()
    }

    fn record(&self, event: QuestEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl QuestTracker for MemoryQuestTracker {
    fn start_tracking(&self, challenge: &ChallengeId) {
        self.record(QuestEvent::Started(challenge.clone()));
    }

    fn add_manual_progress(&self, amount: NonZeroU32, challenge: &ChallengeId) {
        self.record(QuestEvent::Progress(challenge.clone(), amount.get()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_tracker_sums_progress() {
        let tracker = MemoryQuestTracker::new();
        let pushups = ChallengeId::new("pushups");
        let other = ChallengeId::new("squats");

        tracker.start_tracking(&pushups);
        tracker.add_manual_progress(NonZeroU32::MIN, &pushups);
        tracker.add_manual_progress(NonZeroU32::MIN, &pushups);
        tracker.add_manual_progress(NonZeroU32::MIN, &other);

        assert_eq!(tracker.progress(&pushups), 2);
        assert_eq!(tracker.progress(&other), 1);
        assert_eq!(tracker.events()[0], QuestEvent::Started(pushups));
    }
}
