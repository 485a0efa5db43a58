// ── Callback registry ──
//
// Caller-supplied handlers, set once when the manager is spawned and
// invoked on the manager task in the order events arrive. Each call is
// wrapped in `catch_unwind`: a panicking handler is logged and the
// manager keeps running.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use carelink_api::{MessageId, ThreadId, ThreadMessage, ThreadSummary};

type NewMessageFn = Box<dyn FnMut(ThreadMessage) + Send>;
type ThreadUpdateFn = Box<dyn FnMut(ThreadId, ThreadSummary) + Send>;
type MessageReadFn = Box<dyn FnMut(ThreadId, MessageId) + Send>;
type ErrorFn = Box<dyn FnMut(String) + Send>;

/// Handlers for dispatched events. All are optional.
///
/// ```rust,ignore
/// let callbacks = Callbacks::new()
///     .on_new_message(|msg| println!("new message {}", msg.id))
///     .on_message_read(|thread, msg| println!("{thread}: {msg} read"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    new_message: Option<NewMessageFn>,
    thread_update: Option<ThreadUpdateFn>,
    message_read: Option<MessageReadFn>,
    error: Option<ErrorFn>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("new_message", &self.new_message.is_some())
            .field("thread_update", &self.thread_update.is_some())
            .field("message_read", &self.message_read.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with every `new_message` item.
    pub fn on_new_message(mut self, f: impl FnMut(ThreadMessage) + Send + 'static) -> Self {
        self.new_message = Some(Box::new(f));
        self
    }

    /// Called with `(thread_id, summary)` for every `thread_update`.
    pub fn on_thread_update(
        mut self,
        f: impl FnMut(ThreadId, ThreadSummary) + Send + 'static,
    ) -> Self {
        self.thread_update = Some(Box::new(f));
        self
    }

    /// Called with `(thread_id, message_id)` for every `message_read`.
    pub fn on_message_read(mut self, f: impl FnMut(ThreadId, MessageId) + Send + 'static) -> Self {
        self.message_read = Some(Box::new(f));
        self
    }

    /// Called with the message of every server-reported `error` event.
    pub fn on_error(mut self, f: impl FnMut(String) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub(crate) fn new_message(&mut self, message: ThreadMessage) {
        if let Some(f) = self.new_message.as_mut() {
            isolate("on_new_message", || f(message));
        }
    }

    pub(crate) fn thread_update(&mut self, thread_id: ThreadId, thread: ThreadSummary) {
        if let Some(f) = self.thread_update.as_mut() {
            isolate("on_thread_update", || f(thread_id, thread));
        }
    }

    pub(crate) fn message_read(&mut self, thread_id: ThreadId, message_id: MessageId) {
        if let Some(f) = self.message_read.as_mut() {
            isolate("on_message_read", || f(thread_id, message_id));
        }
    }

    pub(crate) fn error(&mut self, message: String) {
        if let Some(f) = self.error.as_mut() {
            isolate("on_error", || f(message));
        }
    }
}

fn isolate(name: &'static str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(callback = name, panic = panic_message(&*payload), "callback panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
