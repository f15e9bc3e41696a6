//! Session & Message Processor (C6, §4.6).
//!
//! Per-connection state machine: conversation authentication, request
//! dispatch, the per-session unfinished-request table, and keep-alive
//! enforcement. Grounded on the teacher's `session::session_manager`
//! (state/status/timeout bookkeeping) and `pool::connection::core`
//! (bounded table + guard-style resource accounting), generalized from a
//! SQL-session model to the conversation state machine of §4.6.

pub mod registry;

mod conversation;
mod dispatch;
mod handlers;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::framing;
use crate::identity::ServerIdentity;
use crate::images::ImageManager;
use crate::lifecycle::Shutdown;
use crate::net::role::{MessageIdGenerator, Role, RoleConfig};
use crate::protocol::{Envelope, MessageId, Payload, Request, Response};
use crate::store::Store;
use dashmap::DashMap;
use registry::OnlineRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

/// Capacity of the per-session unfinished-request table (§4.6); the next
/// send fails once this is reached.
pub const UNFINISHED_REQUEST_CAPACITY: usize = 20;

/// Default timeout waiting for a response to a server-initiated request
/// on an otherwise-healthy connection (not specified numerically by the
/// protocol; bounded so a wedged peer cannot leak an unfinished slot
/// forever).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared, read-only dependencies handed to every session and to the
/// neighborhood processor's outbound client connections.
pub struct SessionContext {
    pub settings: Arc<Settings>,
    pub store: Arc<Store>,
    pub images: Arc<ImageManager>,
    pub identity: Arc<ServerIdentity>,
    pub registry: Arc<OnlineRegistry>,
    pub id_generators: RoleIdGenerators,
    next_session_id: AtomicU64,
    active_sessions: AtomicU64,
}

impl SessionContext {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<Store>,
        images: Arc<ImageManager>,
        identity: Arc<ServerIdentity>,
    ) -> Self {
        SessionContext {
            settings,
            store,
            images,
            identity,
            registry: Arc::new(OnlineRegistry::new()),
            id_generators: RoleIdGenerators::new(),
            next_session_id: AtomicU64::new(1),
            active_sessions: AtomicU64::new(0),
        }
    }

    fn allocate_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Live session count across every role, polled by the fabric during
    /// shutdown to wait for a drain grace period (§4.5).
    pub fn active_session_count(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }
}

pub struct RoleIdGenerators {
    pub primary: Arc<MessageIdGenerator>,
    pub server_neighbor: Arc<MessageIdGenerator>,
    pub client_non_customer: Arc<MessageIdGenerator>,
    pub client_customer: Arc<MessageIdGenerator>,
    pub client_app_service: Arc<MessageIdGenerator>,
}

impl RoleIdGenerators {
    fn new() -> Self {
        RoleIdGenerators {
            primary: Arc::new(MessageIdGenerator::new(Role::Primary)),
            server_neighbor: Arc::new(MessageIdGenerator::new(Role::ServerNeighbor)),
            client_non_customer: Arc::new(MessageIdGenerator::new(Role::ClientNonCustomer)),
            client_customer: Arc::new(MessageIdGenerator::new(Role::ClientCustomer)),
            client_app_service: Arc::new(MessageIdGenerator::new(Role::ClientAppService)),
        }
    }

    pub fn for_role(&self, role: Role) -> Arc<MessageIdGenerator> {
        match role {
            Role::Primary => self.primary.clone(),
            Role::ServerNeighbor => self.server_neighbor.clone(),
            Role::ClientNonCustomer => self.client_non_customer.clone(),
            Role::ClientCustomer => self.client_customer.clone(),
            Role::ClientAppService => self.client_app_service.clone(),
        }
    }
}

/// Connection plumbing shared between the reader loop and any background
/// task pushing server-initiated requests on the same socket (e.g. the
/// neighborhood-initialization profile pump).
pub struct Connection<W> {
    writer: Arc<AsyncMutex<W>>,
    unfinished: Arc<DashMap<MessageId, oneshot::Sender<Response>>>,
    id_gen: Arc<MessageIdGenerator>,
}

impl<W> Clone for Connection<W> {
    fn clone(&self) -> Self {
        Connection {
            writer: self.writer.clone(),
            unfinished: self.unfinished.clone(),
            id_gen: self.id_gen.clone(),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> Connection<W> {
    /// Sends a server-initiated `Request` and awaits the matching
    /// `Response` by id. Fails without writing if the unfinished-request
    /// table is already at capacity (§4.6, §8 boundary behavior).
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        if self.unfinished.len() >= UNFINISHED_REQUEST_CAPACITY {
            return Err(Error::ResourceExhausted("unfinished-request table full".into()));
        }
        let id = self.id_gen.next_id();
        let (tx, rx) = oneshot::channel();
        self.unfinished.insert(id, tx);

        let envelope = Envelope { id, payload: Payload::Request(request) };
        if let Err(e) = self.write(&envelope).await {
            self.unfinished.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Internal("response channel dropped".into())),
            Err(_) => {
                self.unfinished.remove(&id);
                Err(Error::Network("timed out waiting for response".into()))
            }
        }
    }

    pub async fn send_response(&self, id: MessageId, response: Response) -> Result<()> {
        self.write(&Envelope { id, payload: Payload::Response(response) }).await
    }

    async fn write(&self, envelope: &Envelope) -> Result<()> {
        let mut w = self.writer.lock().await;
        framing::write_message(&mut *w, envelope).await
    }

    /// Routes an inbound `Response` to whichever local call is awaiting
    /// it; unmatched ids are logged and dropped (§4.6: "receivers are not
    /// required to check" id uniqueness, but we do track our own).
    fn complete(&self, id: MessageId, response: Response) {
        if let Some((_, tx)) = self.unfinished.remove(&id) {
            let _ = tx.send(response);
        } else {
            debug!(id, "response for unknown or already-completed request id");
        }
    }
}

/// Peer identity established via the conversation state machine (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityState {
    Anonymous,
    Authenticated { network_id: crate::common::NetworkId, public_key: [u8; 32] },
}

/// Role-specific mutable context (§4.6).
#[derive(Default)]
pub struct RoleContext {
    pub search_cache: Vec<crate::protocol::SearchResultItem>,
    pub exposed_app_services: Vec<String>,
    pub neighborhood_init: NeighborhoodInitStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NeighborhoodInitStatus {
    #[default]
    NotStarted,
    InProgress,
    Finished,
}

pub struct SessionState {
    pub conversation: conversation::ConversationState,
    pub identity: IdentityState,
    pub role_ctx: RoleContext,
    pub keep_alive_deadline: Instant,
}

pub struct Session<S> {
    pub id: u64,
    pub role: Role,
    pub keep_alive: Duration,
    pub ctx: Arc<SessionContext>,
    pub conn: Connection<WriteHalf<S>>,
    pub close_signal: Arc<Notify>,
    pub state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub async fn run(stream: S, config: RoleConfig, ctx: Arc<SessionContext>, shutdown: Shutdown) -> Result<()> {
        let (mut reader, writer) = split(stream);
        let id = ctx.allocate_session_id();
        let conn = Connection {
            writer: Arc::new(AsyncMutex::new(writer)),
            unfinished: Arc::new(DashMap::new()),
            id_gen: ctx.id_generators.for_role(config.role),
        };

        let mut session = Session {
            id,
            role: config.role,
            keep_alive: config.keep_alive,
            ctx,
            conn,
            close_signal: Arc::new(Notify::new()),
            state: SessionState {
                conversation: conversation::ConversationState::None,
                identity: IdentityState::Anonymous,
                role_ctx: RoleContext::default(),
                keep_alive_deadline: Instant::now() + config.keep_alive,
            },
        };

        session.ctx.active_sessions.fetch_add(1, Ordering::Relaxed);
        let result = session.drive(&mut reader, shutdown).await;
        session.on_close().await;
        session.ctx.active_sessions.fetch_sub(1, Ordering::Relaxed);
        result
    }

    async fn drive<R: AsyncRead + Unpin>(&mut self, reader: &mut R, shutdown: Shutdown) -> Result<()> {
        loop {
            let sleep = tokio::time::sleep_until(self.state.keep_alive_deadline);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(session = self.id, "session observed shutdown signal");
                    return Ok(());
                }
                _ = self.close_signal.notified() => {
                    info!(session = self.id, "session closed: superseded by newer authentication");
                    return Ok(());
                }
                _ = sleep => {
                    info!(session = self.id, "session closed: keep-alive deadline elapsed");
                    return Ok(());
                }
                read = framing::read_message(reader) => {
                    let envelope = match read {
                        Ok(envelope) => envelope,
                        Err(_) => return Ok(()), // peer closed or malformed frame terminates the connection
                    };
                    self.state.keep_alive_deadline = Instant::now() + self.keep_alive;
                    if !self.handle_envelope(envelope).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Returns `Ok(false)` when the session should terminate (protocol
    /// violation or an explicit `Disconnect` from a handler).
    async fn handle_envelope(&mut self, envelope: Envelope) -> Result<bool> {
        match envelope.payload {
            Payload::Response(response) => {
                self.conn.complete(envelope.id, response);
                Ok(true)
            }
            Payload::Request(request) => {
                let outcome = dispatch::handle(self, &request).await;
                match outcome {
                    dispatch::Outcome::Reply(response, flow) => {
                        self.conn.send_response(envelope.id, response).await?;
                        Ok(matches!(flow, dispatch::Flow::Continue))
                    }
                    dispatch::Outcome::NoReply(flow) => Ok(matches!(flow, dispatch::Flow::Continue)),
                }
            }
        }
    }

    async fn on_close(&mut self) {
        if let IdentityState::Authenticated { network_id, .. } = self.state.identity {
            self.ctx.registry.remove_if_current(network_id, self.id);
            if matches!(self.role, Role::ClientCustomer | Role::ClientNonCustomer) {
                self.schedule_expiration_if_still_hosted(network_id).await;
            }
        }
        let mut writer = self.conn.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// A hosted identity's `expiration_date` is null while a session is
    /// live (§3); on disconnect it is given a grace period before Cron
    /// (C9) may reclaim it, unless it was already cancelled.
    async fn schedule_expiration_if_still_hosted(&self, network_id: crate::common::NetworkId) {
        let identity = match self.ctx.store.get_hosted_identity(network_id).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to look up hosted identity at session close");
                return;
            }
        };
        if identity.cancelled {
            return;
        }
        let expires_at = handlers::now_unix() + self.ctx.settings.hosting_grace_period().as_secs() as i64;
        if let Err(e) = self.ctx.store.set_expiration(network_id, Some(expires_at)).await {
            tracing::warn!(error = %e, "failed to schedule hosting expiration at session close");
        }
    }
}

pub use conversation::ConversationState;
pub use dispatch::{Flow, Outcome};
