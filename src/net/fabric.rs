//! Role Server Fabric (C5, §4.5): one [`RoleListener`] per configured
//! role, started and torn down together as a single [`Component`].
//!
//! Grounded on the teacher's top-level `Server` component that owns a set
//! of per-protocol listeners; generalized here from one listener to five,
//! one per [`Role`](super::role::Role).

use super::listener::RoleListener;
use super::role::RoleConfig;
use crate::error::Result;
use crate::lifecycle::{Component, Shutdown};
use crate::session::SessionContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on how long shutdown waits for in-flight sessions to drain
/// once the shutdown signal has been triggered (§4.5).
const DRAIN_GRACE_PERIOD: Duration = Duration::from_secs(5);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct RoleFabric {
    ctx: Arc<SessionContext>,
    listeners: Vec<Arc<RoleListener>>,
}

impl RoleFabric {
    pub fn new(ctx: Arc<SessionContext>, tls_cert_path: Option<std::path::PathBuf>) -> Result<Self> {
        let configs = RoleConfig::from_settings(&ctx.settings);
        RoleConfig::validate_no_conflicts(&configs)?;

        let mut listeners = Vec::with_capacity(configs.len());
        for config in configs {
            let listener = RoleListener::new(config, ctx.clone(), tls_cert_path.as_deref())?;
            listeners.push(Arc::new(listener));
        }
        Ok(RoleFabric { ctx, listeners })
    }
}

#[async_trait]
impl Component for RoleFabric {
    fn name(&self) -> &'static str {
        "role_fabric"
    }

    async fn init(&self, shutdown: Shutdown) -> Result<()> {
        for listener in &self.listeners {
            listener.init(shutdown.child()).await?;
        }
        Ok(())
    }

    /// The shutdown signal itself is observed directly by each listener's
    /// accept/dispatch loops and every live session (it is a descendant of
    /// the process-wide signal the supervisor triggers before calling
    /// this). This only waits out a short grace period for sessions to
    /// finish tearing down before returning, so log lines from their
    /// close paths land before the process exits.
    async fn shutdown(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + DRAIN_GRACE_PERIOD;
        loop {
            let remaining = self.ctx.active_session_count();
            if remaining == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(remaining, "role fabric shutdown grace period elapsed with sessions still open");
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        info!("role fabric drained");
        Ok(())
    }
}
