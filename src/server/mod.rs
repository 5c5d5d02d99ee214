//! TCP front end: one task per connection, each driving a [`Session`].

mod session;
mod stats;

pub use session::Session;
pub use stats::{ConnectionGuard, Stats, StatsSnapshot, StatsTask};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::index::SortedIndex;
use crate::scheduler::Scheduler;

/// Stops a [`Server`] from outside [`Server::run`].
///
/// Shutdown is sticky: requested before `run` starts, `run` returns without
/// accepting anything.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct Server<I> {
    index: Arc<I>,
    config: ServerConfig,
    listener: TcpListener,
    stats: Arc<Stats>,
    shutdown: CancellationToken,
}

impl<I> Server<I>
where
    I: SortedIndex + 'static,
{
    /// Binds the listening socket. Nothing is accepted until [`Server::run`].
    pub async fn bind(index: Arc<I>, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await.map_err(|e| {
            Error::Server(format!("failed to bind {}: {}", config.listen_addr, e))
        })?;
        Ok(Self {
            index,
            config,
            listener,
            stats: Arc::new(Stats::default()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections until shutdown, then waits for every session to
    /// close. Sessions drop a response still being written at shutdown.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, index = ?self.config.index, "Listening");

        let mut scheduler = Scheduler::new(self.shutdown.child_token());
        scheduler.spawn(Arc::new(StatsTask::new(
            Arc::clone(&self.stats),
            Arc::clone(&self.index),
            self.config.stats_interval,
        )));

        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    debug!(%peer, "Accepted connection");

                    let session = Session::new(Arc::clone(&self.index), Arc::clone(&self.stats), peer);
                    let limits = self.config.limits;
                    let shutdown = self.shutdown.clone();
                    sessions.spawn(async move {
                        if let Err(e) = session.run(stream, limits, shutdown).await {
                            warn!(%peer, error = %e, "Session ended with error");
                        }
                    });
                }
                // Reap finished sessions so the set does not grow unbounded.
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Session task failed");
                    }
                }
            }
        }

        drop(self.listener);
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Session task failed");
            }
        }
        scheduler.shutdown().await?;

        let stats = self.stats.snapshot();
        info!(
            connections = stats.connections_total,
            scans = stats.scans,
            "Server stopped"
        );
        Ok(())
    }
}
