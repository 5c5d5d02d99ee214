use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::stats::Stats;
use crate::config::ProtocolLimits;
use crate::error::Result;
use crate::format::Raw;
use crate::index::{Entry, SortedIndex};
use crate::protocol::{Command, Response, ServerCodec};
use crate::query::scan;

/// Serves one connection: read a request, answer it in full, repeat.
pub struct Session<I> {
    index: Arc<I>,
    stats: Arc<Stats>,
    peer: SocketAddr,
}

impl<I> Session<I>
where
    I: SortedIndex,
{
    pub fn new(index: Arc<I>, stats: Arc<Stats>, peer: SocketAddr) -> Self {
        Self { index, stats, peer }
    }

    /// Runs until the peer hangs up, sends `quit`, sends a malformed request
    /// or `shutdown` is cancelled.
    ///
    /// A malformed request is answered with `CLIENT_ERROR` and then returned
    /// as the session's error. Shutdown also abandons a response that is
    /// still being written to a peer that stopped reading.
    pub async fn run<S>(
        self,
        stream: S,
        limits: ProtocolLimits,
        shutdown: CancellationToken,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _guard = self.stats.connection_opened();
        let mut framed = Framed::new(stream, ServerCodec::new(limits));

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(peer = %self.peer, "Closing session for shutdown");
                    return Ok(());
                }
                frame = framed.next() => frame,
            };

            let command = match frame {
                Some(Ok(command)) => command,
                Some(Err(e)) if e.is_protocol() => {
                    self.stats.record_protocol_error();
                    warn!(peer = %self.peer, error = %e, "Malformed request");
                    self.reply(&mut framed, Response::ClientError(e.to_string()), &shutdown)
                        .await?;
                    return Err(e);
                }
                Some(Err(e)) => return Err(e),
                None => {
                    debug!(peer = %self.peer, "Peer closed connection");
                    return Ok(());
                }
            };

            let Some(response) = self.execute(command) else {
                debug!(peer = %self.peer, "Peer quit");
                return Ok(());
            };
            if !self.reply(&mut framed, response, &shutdown).await? {
                return Ok(());
            }
        }
    }

    /// Writes `response` unless shutdown comes first. Returns whether it was
    /// written.
    async fn reply<S>(
        &self,
        framed: &mut Framed<S, ServerCodec>,
        response: Response,
        shutdown: &CancellationToken,
    ) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(peer = %self.peer, "Abandoning response for shutdown");
                Ok(false)
            }
            sent = framed.send(response) => sent.map(|()| true),
        }
    }

    /// Answers one command. Returns `None` when the session should end.
    ///
    /// Runs synchronously: the whole result is materialised before anything
    /// is written, so no index access overlaps socket I/O.
    pub fn execute(&self, command: Command) -> Option<Response> {
        let response = match command {
            Command::Rget(desc) => {
                let entries: Vec<Entry> = scan(&*self.index, &desc).collect();
                self.stats.record_scan(entries.len());
                trace!(
                    peer = %self.peer,
                    left = %Raw(&desc.left_key),
                    right = %Raw(&desc.right_key),
                    left_open = desc.left_open,
                    right_open = desc.right_open,
                    max_results = desc.max_results,
                    count = entries.len(),
                    "rget"
                );
                Response::Values(entries)
            }
            Command::Get(keys) => Response::Values(
                keys.into_iter()
                    .filter_map(|key| {
                        let value = self.index.get(&key)?;
                        Some(Entry { key, value })
                    })
                    .collect(),
            ),
            Command::Set { key, value } => {
                trace!(peer = %self.peer, key = %Raw(&key), len = value.data.len(), "set");
                self.index.insert(key, value);
                self.stats.record_mutation();
                Response::Stored
            }
            Command::Delete(key) => {
                if self.index.remove(&key) {
                    self.stats.record_mutation();
                    Response::Deleted
                } else {
                    Response::NotFound
                }
            }
            Command::Quit => return None,
            Command::Unknown(name) => {
                debug!(peer = %self.peer, command = %name, "Unknown command");
                Response::Error
            }
        };
        Some(response)
    }
}
