//! A process-wide publish/subscribe registry keyed by event tag
//! (§4.8).
//!
//! Subscribers are invoked synchronously on the publishing thread,
//! outside any lock held at publish time: the handler list for a tag
//! is copied out (as cheaply-cloneable `Arc`s) under the lock, then
//! called after the lock is dropped. This mirrors the teacher's own
//! command/event channel texture (`PlayerCommand`/`PlayerEvent` in
//! `src/player/mod.rs`) at the dispatch layer, generalized from a
//! single fixed channel to arbitrary tag-keyed subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Event tags a subscriber can register against (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    PlayPause,
    Next,
    Prev,
    ClearQueue,
    SeekForward,
    SeekBackward,
    VolumeUp,
    VolumeDown,
    RepeatToggle,
    ShuffleToggle,
    AddTrackToQueue,
}

/// Payload delivered to subscribers. Most tags carry no data; a few
/// carry an index or delta.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub tag: Option<EventTag>,
    /// Track index, for `AddTrackToQueue`.
    pub index: Option<usize>,
    /// Seek amount in seconds, for `SeekForward`/`SeekBackward`.
    pub seek_seconds: Option<i64>,
    /// Volume delta in percentage points, for `VolumeUp`/`VolumeDown`.
    pub volume_delta: Option<i32>,
}

impl Event {
    pub fn simple(tag: EventTag) -> Self {
        Self {
            tag: Some(tag),
            ..Default::default()
        }
    }
}

pub type SubscriptionId = u64;
type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

/// A tag-keyed pub/sub registry. Unsubscribing by ID is O(N) in that
/// tag's subscriber list (§4.8).
pub struct EventBus {
    subscribers: Mutex<HashMap<EventTag, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` for `tag`, returning an ID usable with
    /// [`EventBus::unsubscribe`].
    pub fn subscribe<F>(&self, tag: EventTag, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .entry(tag)
            .or_default()
            .push(Subscription {
                id,
                handler: Arc::new(handler),
            });
        tracing::debug!(target: "events", id, ?tag, "subscribed");
        id
    }

    /// Remove a subscription by ID, from whichever tag it was
    /// registered under. O(N) in the number of subscribers on that tag.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscribers = self.subscribers.lock();
        for subs in subscribers.values_mut() {
            subs.retain(|sub| sub.id != id);
        }
        tracing::debug!(target: "events", id, "unsubscribed");
    }

    /// Publish `event` to every subscriber of its tag. Handlers are
    /// copied out of the registry (cheap `Arc` clones) before the lock
    /// is released, then invoked with no lock held.
    pub fn publish(&self, event: Event) {
        let Some(tag) = event.tag else {
            return;
        };
        tracing::debug!(target: "events", ?tag, "publishing");

        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .get(&tag)
                .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            handler(&event);
        }
    }

    /// Number of subscribers currently registered for `tag`. Mostly
    /// useful for tests and diagnostics.
    pub fn subscriber_count(&self, tag: EventTag) -> usize {
        self.subscribers.lock().get(&tag).map(Vec::len).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribers_are_invoked_on_publish() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_handler = Arc::clone(&count);
        bus.subscribe(EventTag::PlayPause, move |_| {
            count_for_handler.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::simple(EventTag::PlayPause));
        bus.publish(Event::simple(EventTag::PlayPause));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribers_only_hear_their_own_tag() {
        let bus = EventBus::new();
        let play_pause_count = Arc::new(AtomicUsize::new(0));
        let next_count = Arc::new(AtomicUsize::new(0));

        let pp = Arc::clone(&play_pause_count);
        bus.subscribe(EventTag::PlayPause, move |_| {
            pp.fetch_add(1, Ordering::SeqCst);
        });
        let nx = Arc::clone(&next_count);
        bus.subscribe(EventTag::Next, move |_| {
            nx.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::simple(EventTag::Next));

        assert_eq!(play_pause_count.load(Ordering::SeqCst), 0);
        assert_eq!(next_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_further_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_handler = Arc::clone(&count);
        let id = bus.subscribe(EventTag::ShuffleToggle, move |_| {
            count_for_handler.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::simple(EventTag::ShuffleToggle));
        bus.unsubscribe(id);
        bus.publish(Event::simple(EventTag::ShuffleToggle));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn add_track_to_queue_carries_its_index_payload() {
        let bus = EventBus::new();
        let seen_index = Arc::new(Mutex::new(None));
        let seen_for_handler = Arc::clone(&seen_index);
        bus.subscribe(EventTag::AddTrackToQueue, move |event| {
            *seen_for_handler.lock() = event.index;
        });

        bus.publish(Event {
            tag: Some(EventTag::AddTrackToQueue),
            index: Some(42),
            ..Default::default()
        });

        assert_eq!(*seen_index.lock(), Some(42));
    }

    #[test]
    fn publishing_an_untagged_event_is_a_no_op() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_handler = Arc::clone(&count);
        bus.subscribe(EventTag::PlayPause, move |_| {
            count_for_handler.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::default());

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscriber_count_reflects_registrations_and_removals() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(EventTag::VolumeUp), 0);
        let id = bus.subscribe(EventTag::VolumeUp, |_| {});
        assert_eq!(bus.subscriber_count(EventTag::VolumeUp), 1);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(EventTag::VolumeUp), 0);
    }
}
