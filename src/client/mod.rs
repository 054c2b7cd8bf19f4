// Inspector protocol client
//
// One dispatch task reads the inbound queue in order. Responses are routed to
// the caller suspended on the matching id; notifications update the session
// state and then run registered handlers inline, so handlers observe
// notifications in arrival order. Many commands may be outstanding at once.
//
// Dropping the last client handle drops the outbound sender, which closes the
// websocket; the reader then ends the inbound queue and the dispatch task
// fails whatever is still pending.

mod capture;
mod discovery;
mod domains;
mod message;
mod pending;
mod state;
mod transport;

pub use discovery::{list_targets, select_target, RuntimeKind, TargetInfo};
pub use domains::{Breakpoint, Location, PauseOnExceptions};
pub use message::{Notification, NotificationKind};
pub use pending::PendingReply;
pub use state::HandlerId;
pub use transport::{open_websocket, Channel};

use crate::config::ClientConfig;
use crate::error::{InspectError, Result};
use message::{parse_inbound, CommandEnvelope, Inbound};
use parking_lot::{Mutex, RwLock};
use pending::PendingTable;
use serde_json::Value;
use state::{HandlerRegistry, SessionState};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// State shared between client handles and the dispatch task
#[derive(Default)]
struct Session {
    pending: Arc<PendingTable>,
    handlers: HandlerRegistry,
    state: RwLock<SessionState>,
}

impl Session {
    fn handle_inbound(&self, text: &str) {
        match parse_inbound(text) {
            Ok(Inbound::Response { id, outcome }) => {
                if !self.pending.complete(id, outcome) {
                    tracing::debug!(id, "discarding response with no pending command");
                }
            }
            Ok(Inbound::Notification(notification)) => {
                tracing::trace!(method = notification.kind.method(), "notification");
                self.state.write().apply(&notification);
                self.handlers.dispatch(&notification);
            }
            Err(e) => tracing::warn!(error = %e, "dropping inbound message"),
        }
    }
}

async fn dispatch(session: Arc<Session>, mut inbound: UnboundedReceiver<String>) {
    while let Some(text) = inbound.recv().await {
        session.handle_inbound(&text);
    }

    let failed = session.pending.fail_all();
    if failed > 0 {
        tracing::warn!(failed, "inspector channel closed with commands outstanding");
    } else {
        tracing::debug!("inspector channel closed");
    }
}

struct ClientInner {
    config: ClientConfig,
    target: Option<TargetInfo>,
    runtime: RuntimeKind,
    next_id: AtomicU64,
    outbound: Mutex<Option<UnboundedSender<String>>>,
    session: Arc<Session>,
}

/// Handle to one inspector session; clones share the session
#[derive(Clone)]
pub struct InspectorClient {
    inner: Arc<ClientInner>,
}

impl InspectorClient {
    /// Discover a target, open its websocket and attach
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let targets = list_targets(&config).await?;
        let target = select_target(&targets, &config.target)?.clone();
        let url = target.web_socket_debugger_url.clone().ok_or_else(|| {
            InspectError::Connection(format!("target {} has no websocket URL", target.id))
        })?;

        let channel = open_websocket(&url).await?;
        tracing::debug!(target_id = %target.id, title = %target.title, "attached to inspector target");
        Ok(Self::start(channel, config, Some(target)))
    }

    /// Attach to an already-open channel
    ///
    /// Spawns the dispatch task, so it must run inside a tokio runtime.
    pub fn attach(channel: Channel, config: ClientConfig) -> Self {
        Self::start(channel, config, None)
    }

    fn start(channel: Channel, config: ClientConfig, target: Option<TargetInfo>) -> Self {
        let runtime = target
            .as_ref()
            .map_or(RuntimeKind::Unknown, RuntimeKind::detect);
        let session = Arc::new(Session::default());
        tokio::spawn(dispatch(Arc::clone(&session), channel.inbound));

        Self {
            inner: Arc::new(ClientInner {
                config,
                target,
                runtime,
                next_id: AtomicU64::new(1),
                outbound: Mutex::new(Some(channel.outbound)),
                session,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Descriptor of the target chosen by `connect`
    pub fn target(&self) -> Option<&TargetInfo> {
        self.inner.target.as_ref()
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.inner.runtime
    }

    /// Send a command without waiting for its reply
    pub fn issue_command(&self, method: &str, params: Option<Value>) -> Result<PendingReply> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = serde_json::to_string(&CommandEnvelope {
            id,
            method,
            params: params.as_ref(),
        })?;

        let pending = &self.inner.session.pending;
        let rx = pending.register(id)?;
        let reply = PendingReply::new(
            id,
            method,
            self.inner.config.command_timeout(),
            rx,
            Arc::clone(pending),
        );

        let sent = match &*self.inner.outbound.lock() {
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        };
        if !sent {
            // Dropping the reply removes the pending entry
            return Err(InspectError::ConnectionLost);
        }

        tracing::debug!(id, method, "command sent");
        Ok(reply)
    }

    /// Send a command and wait for its reply within the command timeout
    pub async fn send_command(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.issue_command(method, params)?.wait().await
    }

    /// Register a handler for one notification kind
    ///
    /// Handlers run on the dispatch task in registration order. An error
    /// returned by a handler is logged and does not affect other handlers.
    pub fn on_notification<F>(&self, kind: NotificationKind, handler: F) -> HandlerId
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.session.handlers.register(kind, Arc::new(handler))
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.session.handlers.remove(id)
    }

    pub fn handler_count(&self) -> usize {
        self.inner.session.handlers.len()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.session.state.read().paused
    }

    /// Reason from the last `Debugger.paused`, while paused
    pub fn pause_reason(&self) -> Option<String> {
        self.inner.session.state.read().reason.clone()
    }

    /// Call frames from the last `Debugger.paused`; empty while running
    pub fn call_frames(&self) -> Vec<Value> {
        self.inner.session.state.read().call_frames.clone()
    }

    /// Commands still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.inner.session.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.session.pending.is_closed()
    }

    /// Stop sending; the channel closes once the remote side winds down
    pub fn close(&self) {
        if self.inner.outbound.lock().take().is_some() {
            tracing::debug!("inspector client closed");
        }
    }
}

impl fmt::Debug for InspectorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InspectorClient")
            .field("target", &self.inner.target.as_ref().map(|t| &t.id))
            .field("runtime", &self.inner.runtime)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
