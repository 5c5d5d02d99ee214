//! Async client for the text protocol.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::config::ProtocolLimits;
use crate::error::{Error, ProtocolError, Result};
use crate::index::{Entry, ValueRecord};
use crate::protocol::{ClientCodec, Command, Response};
use crate::query::RangeDescriptor;

/// One connection; requests are answered strictly in order.
pub struct Client<S = TcpStream> {
    framed: Framed<S, ClientCodec>,
}

impl Client<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_limits(stream, ProtocolLimits::default())
    }

    pub fn with_limits(stream: S, limits: ProtocolLimits) -> Self {
        Self {
            framed: Framed::new(stream, ClientCodec::new(limits)),
        }
    }

    /// Sends one command and waits for its reply.
    pub async fn call(&mut self, command: Command) -> Result<Response> {
        self.framed.send(command).await?;
        match self.framed.next().await {
            Some(response) => response,
            None => Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into())),
        }
    }

    /// One `rget` round trip.
    pub async fn rget(&mut self, desc: &RangeDescriptor) -> Result<Vec<Entry>> {
        match self.call(Command::Rget(desc.clone())).await? {
            Response::Values(entries) => Ok(entries),
            other => Err(reply_error(other)),
        }
    }

    /// Every entry in `desc`, fetched `page_size` at a time.
    ///
    /// Each page after the first starts just past the last key received, so
    /// no key is returned twice. `desc.max_results` is ignored.
    pub async fn scan_all(
        &mut self,
        desc: &RangeDescriptor,
        page_size: usize,
    ) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        if page_size == 0 {
            return Ok(entries);
        }

        let mut desc = desc.clone().max_results(page_size);
        loop {
            let page = self.rget(&desc).await?;
            let full = page.len() == page_size;
            if let Some(last) = page.last() {
                desc = desc.next_page(last.key.clone());
            }
            entries.extend(page);
            if !full {
                return Ok(entries);
            }
        }
    }

    pub async fn get(&mut self, key: impl Into<Bytes>) -> Result<Option<ValueRecord>> {
        let key = key.into();
        let entries = self.get_many(vec![key.clone()]).await?;
        Ok(entries
            .into_iter()
            .find(|entry| entry.key == key)
            .map(|entry| (*entry.value).clone()))
    }

    pub async fn get_many(&mut self, keys: Vec<Bytes>) -> Result<Vec<Entry>> {
        match self.call(Command::Get(keys)).await? {
            Response::Values(entries) => Ok(entries),
            other => Err(reply_error(other)),
        }
    }

    pub async fn set(&mut self, key: impl Into<Bytes>, value: ValueRecord) -> Result<()> {
        let command = Command::Set {
            key: key.into(),
            value,
        };
        match self.call(command).await? {
            Response::Stored => Ok(()),
            other => Err(reply_error(other)),
        }
    }

    /// Returns whether the key existed.
    pub async fn delete(&mut self, key: impl Into<Bytes>) -> Result<bool> {
        match self.call(Command::Delete(key.into())).await? {
            Response::Deleted => Ok(true),
            Response::NotFound => Ok(false),
            other => Err(reply_error(other)),
        }
    }

    /// Asks the server to close the connection and waits until it does.
    pub async fn quit(mut self) -> Result<()> {
        self.framed.send(Command::Quit).await?;
        match self.framed.next().await {
            None => Ok(()),
            Some(Ok(response)) => Err(reply_error(response)),
            Some(Err(e)) => Err(e),
        }
    }
}

fn reply_error(response: Response) -> Error {
    match response {
        Response::Error => Error::Server("ERROR".to_string()),
        Response::ClientError(msg) => Error::Server(format!("CLIENT_ERROR {msg}")),
        Response::ServerError(msg) => Error::Server(format!("SERVER_ERROR {msg}")),
        other => ProtocolError::UnexpectedReply(format!("{other:?}")).into(),
    }
}
