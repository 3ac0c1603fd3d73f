use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::codec::Key;
use crate::error::{HiveError, Result};
use crate::value::Value;

/// One mutation applied to a box.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// The mutated key.
    pub key: Key,
    /// The new value, absent for deletions.
    pub value: Option<Value>,
    /// Whether the key was deleted.
    pub deleted: bool,
}

struct Subscriber {
    sender: Sender<ChangeEvent>,
    filter: Option<Key>,
}

/// Broadcasts change events to any number of watchers.
///
/// Each watcher gets its own unbounded channel, so a slow consumer buffers
/// instead of blocking writers. Watchers that dropped their receiver are
/// pruned on the next notification.
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<Subscriber>>,
    closed: AtomicBool,
}

impl ChangeNotifier {
    /// Creates a notifier with no subscribers.
    pub fn new() -> ChangeNotifier {
        ChangeNotifier::default()
    }

    /// Subscribes to change events, optionally only for `filter`.
    ///
    /// # Errors
    ///
    /// [`HiveError::BoxClosed`] after [`close`](ChangeNotifier::close).
    pub fn watch(&self, filter: Option<Key>) -> Result<Receiver<ChangeEvent>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HiveError::BoxClosed);
        }
        let (sender, receiver) = unbounded();
        self.subscribers
            .lock()
            .expect("notifier lock poisoned")
            .push(Subscriber { sender, filter });
        Ok(receiver)
    }

    /// Delivers `event` to every matching subscriber.
    pub fn notify(&self, event: &ChangeEvent) {
        let mut subscribers = self.subscribers.lock().expect("notifier lock poisoned");
        subscribers.retain(|subscriber| {
            if let Some(filter) = &subscriber.filter {
                if *filter != event.key {
                    return true;
                }
            }
            // A send only fails when the receiver is gone; drop the
            // subscriber and keep going.
            subscriber.sender.send(event.clone()).is_ok()
        });
    }

    /// Ends every stream and rejects future watch calls.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers
            .lock()
            .expect("notifier lock poisoned")
            .clear();
    }
}
