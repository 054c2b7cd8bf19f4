// Session state and notification handler registry

use crate::client::message::{Notification, NotificationKind};
use crate::error::Result;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Debugger pause state as last reported by the remote
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub paused: bool,
    pub reason: Option<String>,
    pub call_frames: Vec<Value>,
}

impl SessionState {
    /// Fold a notification into the state; other kinds are ignored
    pub fn apply(&mut self, notification: &Notification) {
        match notification.kind {
            NotificationKind::DebuggerPaused => {
                if self.paused {
                    tracing::warn!("Debugger.paused received while already paused");
                }
                self.paused = true;
                self.reason = notification
                    .params
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.call_frames = notification
                    .params
                    .get("callFrames")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
            }
            NotificationKind::DebuggerResumed => {
                if !self.paused {
                    tracing::warn!("Debugger.resumed received while not paused");
                }
                self.paused = false;
                self.reason = None;
                self.call_frames.clear();
            }
            _ => {}
        }
    }
}

/// Registration handle returned by `on_notification`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub(crate) type Handler = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

struct Registration {
    id: HandlerId,
    kind: NotificationKind,
    handler: Handler,
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl HandlerRegistry {
    pub fn register(&self, kind: NotificationKind, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.lock().push(Registration { id, kind, handler });
        id
    }

    pub fn remove(&self, id: HandlerId) -> bool {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Run every handler for the notification's kind in registration order
    ///
    /// The registry lock is released before handlers run, so a handler may
    /// register or remove handlers itself.
    pub fn dispatch(&self, notification: &Notification) {
        let matching: Vec<Handler> = self
            .registrations
            .lock()
            .iter()
            .filter(|r| r.kind == notification.kind)
            .map(|r| Arc::clone(&r.handler))
            .collect();

        for handler in matching {
            if let Err(e) = handler(&notification.params) {
                tracing::warn!(
                    method = notification.kind.method(),
                    error = %e,
                    "notification handler failed"
                );
            }
        }
    }
}
