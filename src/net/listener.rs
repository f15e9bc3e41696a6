//! Role Server Fabric (C5, §4.5).
//!
//! One TCP listener per configured role: a producer task accepts and
//! enqueues clients into a bounded queue, a dispatcher task drains the
//! queue and spawns a per-connection session task. Grounded on the
//! teacher's `network::server::Server` accept loop, split into two tasks
//! so a slow dispatcher cannot stall the kernel accept backlog, and with
//! an explicit bound on the handoff queue instead of the teacher's
//! unbounded `tokio::spawn` per accept.

use super::role::RoleConfig;
use super::tls::build_acceptor;
use crate::error::Result;
use crate::lifecycle::{Component, Shutdown};
use crate::session::{Session, SessionContext};
use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Bound on the producer -> dispatcher handoff queue; a full queue simply
/// stalls new accepts rather than spawning unbounded session tasks.
const ACCEPT_QUEUE_CAPACITY: usize = 256;

pub struct RoleListener {
    config: RoleConfig,
    ctx: Arc<SessionContext>,
    tls_acceptor: Option<TlsAcceptor>,
}

impl RoleListener {
    pub fn new(config: RoleConfig, ctx: Arc<SessionContext>, tls_cert_path: Option<&std::path::Path>) -> Result<Self> {
        let tls_acceptor = if config.tls {
            Some(build_acceptor(tls_cert_path.expect("TLS role requires a certificate path"))?)
        } else {
            None
        };
        Ok(RoleListener { config, ctx, tls_acceptor })
    }
}

#[async_trait]
impl Component for RoleListener {
    fn name(&self) -> &'static str {
        "role_listener"
    }

    async fn init(&self, shutdown: Shutdown) -> Result<()> {
        let bind_addr = format!("{}:{}", self.ctx.settings.bind_to_interface, self.config.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(role = ?self.config.role, addr = %bind_addr, "role listener bound");

        let (tx, rx) = mpsc::channel::<TcpStream>(ACCEPT_QUEUE_CAPACITY);

        let producer_shutdown = shutdown.child();
        tokio::spawn(accept_loop(listener, tx, producer_shutdown, self.config.role));

        let dispatcher_shutdown = shutdown.child();
        let ctx = self.ctx.clone();
        let tls_acceptor = self.tls_acceptor.clone();
        let config = self.config.clone();
        tokio::spawn(dispatch_loop(rx, ctx, tls_acceptor, config, dispatcher_shutdown));

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        // Signalled via the component's own `Shutdown` child passed to
        // `init`; the accept/dispatch loops observe it directly and the
        // in-flight grace period is enforced by the caller (`net::fabric`).
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<TcpStream>, shutdown: Shutdown, role: super::role::Role) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(?role, "accept loop observed shutdown");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = tune_socket(&stream) {
                            warn!(?role, %peer, error = %e, "failed to tune accepted socket");
                        }
                        if tx.send(stream).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(?role, error = %e, "accept failed");
                    }
                }
            }
        }
    }
    // Draining the queue contents on shutdown happens implicitly: `rx`
    // closes when `tx` drops here, and the dispatcher's own select! exits
    // on its queue closing or on its own shutdown signal.
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<TcpStream>,
    ctx: Arc<SessionContext>,
    tls_acceptor: Option<TlsAcceptor>,
    config: RoleConfig,
    shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                while let Ok(stream) = rx.try_recv() {
                    drop(stream);
                }
                break;
            }
            next = rx.recv() => {
                match next {
                    Some(stream) => {
                        let ctx = ctx.clone();
                        let tls_acceptor = tls_acceptor.clone();
                        let config = config.clone();
                        let session_shutdown = shutdown.child();
                        tokio::spawn(async move {
                            if let Err(e) = run_session(stream, ctx, tls_acceptor, config, session_shutdown).await {
                                error!(error = %e, "session terminated with error");
                            }
                        });
                    }
                    None => break,
                }
            }
        }
    }
}

async fn run_session(
    stream: TcpStream,
    ctx: Arc<SessionContext>,
    tls_acceptor: Option<TlsAcceptor>,
    config: RoleConfig,
    shutdown: Shutdown,
) -> Result<()> {
    match tls_acceptor {
        Some(acceptor) => {
            let tls_stream = acceptor.accept(stream).await.map_err(|e| crate::error::Error::Tls(e.to_string()))?;
            Session::run(tls_stream, config, ctx, shutdown).await
        }
        None => Session::run(stream, config, ctx, shutdown).await,
    }
}

fn tune_socket(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let sock_ref = SockRef::from(stream);
    sock_ref.set_linger(Some(Duration::from_secs(0)))?;
    let _ = sock_ref.set_tcp_keepalive(&TcpKeepalive::new().with_time(Duration::from_secs(30)));
    Ok(())
}
