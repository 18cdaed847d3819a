//! Cross-task event queue.
//!
//! Events are produced from several tasks at once — the MQTT poll task,
//! the Wi-Fi link watcher and the health monitor's recovery bridge — and
//! consumed by the supervisory loop in `main`. The queue is a
//! fixed-capacity deque behind a mutex held only for the push or pop
//! itself, so producers on the MQTT client's event task are delayed by
//! at most one queue operation and never allocate.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ mqtt poll    │────▶│              │     │                  │
//! │ link watcher │────▶│  Event Queue │────▶│ supervisory loop │
//! │ health       │────▶│ (fixed-size) │     │    (consumer)    │
//! └──────────────┘     └──────────────┘     └──────────────────┘
//! ```
//!
//! Payloads never cross the queue; command data is dispatched inline by
//! the MQTT task and only discriminants travel here.

use std::sync::Mutex;

use heapless::Deque;

/// Maximum number of pending events. The consumer drains every 100 ms,
/// so the queue only fills if the supervisory loop has stalled — at
/// which point dropping an event is the right call.
const EVENT_QUEUE_CAP: usize = 32;

/// System event types, ordered by rough priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // ── Recovery (highest priority) ───────────────────────
    /// Reboot the node.
    RebootRequested,
    /// Tear down and re-establish Wi-Fi.
    RecoverWifi,
    /// Restart the MQTT client.
    RestartMqtt,

    // ── Connectivity changes ──────────────────────────────
    /// Wi-Fi got an IP.
    WifiUp,
    /// Wi-Fi link dropped.
    WifiDown,
    /// MQTT session established.
    MqttUp,
    /// MQTT session lost.
    MqttDown,

    // ── Housekeeping ──────────────────────────────────────
    /// A command was applied; persistence may be dirty.
    StateDirty,
}

// Kept in a static so callback contexts can reach it without a handle.
static QUEUE: Mutex<Deque<Event, EVENT_QUEUE_CAP>> = Mutex::new(Deque::new());

fn queue() -> std::sync::MutexGuard<'static, Deque<Event, EVENT_QUEUE_CAP>> {
    // A producer panicking mid-push cannot leave the deque torn, so a
    // poisoned lock is still safe to reuse.
    QUEUE.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Push an event. Safe from any task.
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    queue().push_back(event).is_ok()
}

/// Pop the next event. Returns `None` if the queue is empty.
pub fn pop_event() -> Option<Event> {
    queue().pop_front()
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

pub fn queue_is_empty() -> bool {
    queue().is_empty()
}

pub fn queue_len() -> usize {
    queue().len()
}
