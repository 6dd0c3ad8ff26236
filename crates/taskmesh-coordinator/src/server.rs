//! Coordinator server lifecycle.
//!
//! `start` binds the listener and runs until cancelled: both sweep loops plus
//! the HTTP server. On cancellation the HTTP server gets `shutdown_timeout` to
//! drain before it is aborted.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use taskmesh_core::{Event, EventType};

use crate::config::Config;
use crate::error::ServerError;
use crate::http::create_router;
use crate::state::AppState;

/// The coordination service: shared state plus its HTTP facade.
pub struct Server {
    state: Arc<AppState>,
    stopped: AtomicBool,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self::with_state(AppState::new(config))
    }

    /// Serve an existing state, e.g. one a test pre-populated.
    pub fn with_state(state: Arc<AppState>) -> Self {
        Self {
            state,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Bind the configured address and serve until `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        let addr = self.state.config.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, cancel).await
    }

    /// Serve on an already-bound listener until `cancel` fires.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        let local_addr: SocketAddr = listener.local_addr()?;
        let config = &self.state.config;
        if !config.auth_enabled() {
            warn!("No auth tokens configured, API is unauthenticated");
        }

        let shutdown = self.state.shutdown.clone();
        let link = {
            let cancel = cancel.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                shutdown.cancel();
            })
        };

        let node_sweep = {
            let state = self.state.clone();
            self.state.registry.start_cleanup_with(
                shutdown.child_token(),
                config.offline_threshold,
                move |nodes| {
                    for node in &nodes {
                        state.emit(Event::for_node(EventType::NodeOffline, node));
                    }
                },
            )
        };
        let claim_sweep = {
            let state = self.state.clone();
            self.state.tasks.start_cleanup_with(
                shutdown.child_token(),
                config.claim_timeout,
                move |tasks| {
                    for task in &tasks {
                        state.emit(Event::for_task(EventType::TaskOrphaned, task));
                    }
                },
            )
        };

        info!(addr = %local_addr, auth = config.auth_enabled(), "TaskMesh coordinator listening");

        let graceful = shutdown.clone();
        let mut http = tokio::spawn(
            axum::serve(listener, self.router())
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .into_future(),
        );

        let result = tokio::select! {
            joined = &mut http => flatten(joined),
            _ = shutdown.cancelled() => {
                info!("Shutting down coordinator");
                match tokio::time::timeout(config.shutdown_timeout, &mut http).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => {
                        warn!(
                            timeout_secs = config.shutdown_timeout.as_secs(),
                            "Graceful shutdown timed out, aborting HTTP server"
                        );
                        http.abort();
                        Ok(())
                    }
                }
            }
        };

        shutdown.cancel();
        link.abort();
        for sweep in [node_sweep, claim_sweep] {
            if let Err(e) = sweep.await {
                error!(error = %e, "Sweep task failed");
            }
        }
        self.stopped.store(true, Ordering::SeqCst);
        info!("Coordinator stopped");
        result
    }

    /// Begin shutdown. Safe to call more than once.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stop requested");
        self.state.shutdown.cancel();
    }
}

fn flatten(joined: Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<(), ServerError> {
    match joined {
        Ok(result) => result.map_err(ServerError::from),
        Err(e) => Err(ServerError::Task(e.to_string())),
    }
}
