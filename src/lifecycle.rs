//! Component lifecycle (C1): ordered init/shutdown and the process-wide
//! shutdown signal.
//!
//! Grounded on the teacher's `common::Component` trait (synchronous
//! init/shutdown/health_check), generalized to async because our
//! components own tokio tasks and sockets rather than in-process state
//! only.

use crate::common::HealthStatus;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// A shutdown signal observable by any number of tasks. Cancelling a
/// parent signal cancels every child derived from it via [`Shutdown::child`],
/// but a child can also be cancelled independently without affecting its
/// parent or siblings (§4.1, §5).
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

struct ShutdownInner {
    triggered: AtomicBool,
    notify: Notify,
    parent: Option<Shutdown>,
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown {
            inner: Arc::new(ShutdownInner {
                triggered: AtomicBool::new(false),
                notify: Notify::new(),
                parent: None,
            }),
        }
    }

    pub fn child(&self) -> Shutdown {
        Shutdown {
            inner: Arc::new(ShutdownInner {
                triggered: AtomicBool::new(false),
                notify: Notify::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn trigger(&self) {
        if !self.inner.triggered.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
            || self
                .inner
                .parent
                .as_ref()
                .map(Shutdown::is_triggered)
                .unwrap_or(false)
    }

    /// Resolves when either this signal or any ancestor is triggered.
    pub async fn cancelled(&self) {
        if self.is_triggered() {
            return;
        }
        match &self.inner.parent {
            Some(parent) => {
                tokio::select! {
                    _ = self.inner.notify.notified() => {},
                    _ = parent.cancelled() => {},
                }
            }
            None => {
                self.inner.notify.notified().await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A process component with idempotent, at-most-once init/shutdown.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &'static str;

    async fn init(&self, shutdown: Shutdown) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;

    fn health(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

/// Drives a fixed-order set of components: init in order, tear down the
/// successfully-initialized prefix in reverse order on first failure.
pub struct Supervisor {
    shutdown: Shutdown,
    started: Vec<Arc<dyn Component>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Supervisor {
            shutdown: Shutdown::new(),
            started: Vec::new(),
        }
    }

    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Initializes `component`, recording it for ordered teardown. On
    /// failure the already-started components are shut down in reverse
    /// order before the error is propagated.
    pub async fn start(&mut self, component: Arc<dyn Component>) -> Result<()> {
        info!(component = component.name(), "initializing component");
        let child = self.shutdown.child();
        match component.init(child).await {
            Ok(()) => {
                self.started.push(component);
                Ok(())
            }
            Err(e) => {
                error!(component = component.name(), error = %e, "component init failed, rolling back");
                self.shutdown_all().await;
                Err(e)
            }
        }
    }

    /// Signals global shutdown and tears down every started component in
    /// reverse init order.
    pub async fn shutdown_all(&mut self) {
        self.shutdown.trigger();
        for component in self.started.drain(..).rev() {
            info!(component = component.name(), "shutting down component");
            if let Err(e) = component.shutdown().await {
                warn!(component = component.name(), error = %e, "component shutdown failed");
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
