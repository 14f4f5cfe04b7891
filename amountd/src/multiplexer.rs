use crate::{
    config::ServerConfig,
    handler::{self, Reply},
    store::Store,
};
use amount_codecs::{contains_keyword, MessageCodec};
use anyhow::Context;
use bytes::Bytes;
use futures::{
    future::BoxFuture,
    stream::{self, BoxStream, FuturesUnordered},
    FutureExt, SinkExt, StreamExt,
};
use std::{collections::HashMap, io, net::IpAddr, net::SocketAddr};
use tokio::net::{tcp::OwnedWriteHalf, TcpListener, TcpStream};
use tokio_stream::{wrappers::TcpListenerStream, StreamMap};
use tokio_util::codec::{FramedRead, FramedWrite};

pub type ConnectionId = u64;

type Writer = FramedWrite<OwnedWriteHalf, MessageCodec>;

#[derive(Debug)]
enum Inbound {
    Message(anyhow::Result<Bytes>),
    Closed,
}

/// A write that ran to completion, handing the writer back to the loop.
struct Flushed {
    id: ConnectionId,
    writer: Writer,
    closing: bool,
    result: anyhow::Result<()>,
}

enum Event {
    Accepted(SocketAddr, io::Result<TcpStream>),
    Inbound(ConnectionId, Inbound),
    Flushed(Flushed),
}

struct Session {
    /// `None` while a write is in flight.
    writer: Option<Writer>,
    /// Holds the reader while its response is in flight.
    parked: Option<BoxStream<'static, Inbound>>,
    peer: SocketAddr,
    local: SocketAddr,
}

/// Serves every endpoint and every connection from one task.
///
/// The store lives here and is only touched between two polls of the
/// readiness `select!`, so no insert is ever observed half-applied. Writes
/// are polled by the same `select!`: a peer that stops reading only stalls
/// its own connection, which is not read from again until its response is
/// out.
pub struct Multiplexer {
    endpoints: StreamMap<SocketAddr, TcpListenerStream>,
    connections: StreamMap<ConnectionId, BoxStream<'static, Inbound>>,
    flushes: FuturesUnordered<BoxFuture<'static, Flushed>>,
    sessions: HashMap<ConnectionId, Session>,
    next_id: ConnectionId,
    codec: MessageCodec,
    halt_keyword: String,
    placeholder: String,
    store: Store,
}

impl Multiplexer {
    /// Binds one endpoint per (address, port) pair. Surplus ports or
    /// addresses are left unused.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let addresses = resolve(&config.main_host).await?;
        if addresses.len() != config.ports.len() {
            tracing::debug!(
                "{} resolves to {} addresses for {} ports, binding {}",
                config.main_host,
                addresses.len(),
                config.ports.len(),
                addresses.len().min(config.ports.len())
            );
        }

        let mut endpoints = StreamMap::new();
        for (ip, port) in addresses.into_iter().zip(config.ports.iter().copied()) {
            let addr = SocketAddr::new(ip, port);
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind endpoint {addr}"))?;
            let local = listener.local_addr()?;
            tracing::info!("Endpoint bound on {local}");
            endpoints.insert(local, TcpListenerStream::new(listener));
        }

        Ok(Self {
            endpoints,
            connections: StreamMap::new(),
            flushes: FuturesUnordered::new(),
            sessions: HashMap::new(),
            next_id: 0,
            codec: MessageCodec::with_capacity(config.buffer_capacity),
            halt_keyword: config.app_terminator,
            placeholder: config.temporary_message,
            store: Store::default(),
        })
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.endpoints.keys().copied().collect()
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(
            "Server listening for connections on {:?}",
            self.local_addrs()
        );
        loop {
            let event = tokio::select! {
                Some((endpoint, accepted)) = self.endpoints.next() => {
                    Event::Accepted(endpoint, accepted)
                }
                Some((id, inbound)) = self.connections.next() => {
                    Event::Inbound(id, inbound)
                }
                Some(flushed) = self.flushes.next() => {
                    Event::Flushed(flushed)
                }
                else => break,
            };
            match event {
                Event::Accepted(_, Ok(socket)) => self.register(socket),
                Event::Accepted(endpoint, Err(e)) => {
                    tracing::warn!("Failed to accept connection on {endpoint}: {e}");
                }
                Event::Inbound(id, Inbound::Message(Ok(bytes))) => {
                    self.handle_message(id, &bytes);
                }
                Event::Inbound(id, Inbound::Message(Err(e))) => {
                    tracing::warn!("Read failed on connection {id}: {e:#}");
                    self.close(id);
                }
                Event::Inbound(id, Inbound::Closed) => {
                    tracing::info!("Connection {id} closed by peer");
                    self.close(id);
                }
                Event::Flushed(flushed) => self.flushed(flushed),
            }
        }
        tracing::info!("No endpoints left, stopping");
        Ok(())
    }

    fn register(&mut self, socket: TcpStream) {
        let (peer, local) = match (socket.peer_addr(), socket.local_addr()) {
            (Ok(peer), Ok(local)) => (peer, local),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Dropping connection without addresses: {e}");
                return;
            }
        };
        let id = self.next_id;
        self.next_id += 1;

        let (reader, writer) = socket.into_split();
        let reader = FramedRead::new(reader, self.codec)
            .map(Inbound::Message)
            .chain(stream::once(async { Inbound::Closed }))
            .boxed();
        let writer = FramedWrite::new(writer, self.codec);

        self.connections.insert(id, reader);
        self.sessions.insert(
            id,
            Session {
                writer: Some(writer),
                parked: None,
                peer,
                local,
            },
        );
        tracing::info!("Connection {id} accepted from {peer} on {local}");
    }

    fn handle_message(&mut self, id: ConnectionId, bytes: &[u8]) {
        let content = String::from_utf8_lossy(bytes);
        let content = content.trim();
        let Some(session) = self.sessions.get_mut(&id) else {
            tracing::warn!("Message for unknown connection {id}");
            return;
        };
        tracing::info!(
            "Message received on port {} from {}: {content}",
            session.local.port(),
            session.peer
        );

        let (response, halt) = match handler::process(content, &self.halt_keyword, &mut self.store)
        {
            Ok(Reply { response, halt }) => (
                response
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| self.placeholder.clone()),
                halt,
            ),
            Err(e) => {
                tracing::warn!("Discarding message from {}: {e:#}", session.peer);
                (
                    self.placeholder.clone(),
                    contains_keyword(content, &self.halt_keyword),
                )
            }
        };

        let Some(writer) = session.writer.take() else {
            tracing::warn!("Connection {id} still has a response in flight");
            return;
        };
        let reader = self.connections.remove(&id);
        if halt {
            tracing::info!(
                "Client {} on port {} shut down on request, server keeps running",
                session.peer,
                session.local.port()
            );
        } else {
            session.parked = reader;
        }
        tracing::debug!("Responding to {}: {response}", session.peer);
        self.flushes.push(flush(id, writer, Some(response), halt));
    }

    fn flushed(&mut self, flushed: Flushed) {
        let Flushed {
            id,
            writer,
            closing,
            result,
        } = flushed;
        match result {
            Err(e) if closing => tracing::debug!("Shutdown of connection {id} failed: {e:#}"),
            Err(e) => tracing::warn!("Write failed on connection {id}: {e:#}"),
            Ok(()) if closing => tracing::debug!("Connection {id} shut down"),
            Ok(()) => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.writer = Some(writer);
                    if let Some(reader) = session.parked.take() {
                        self.connections.insert(id, reader);
                    }
                }
                return;
            }
        }
        self.connections.remove(&id);
        self.sessions.remove(&id);
    }

    fn close(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
        if let Some(Session {
            writer: Some(writer),
            ..
        }) = self.sessions.remove(&id)
        {
            self.flushes.push(flush(id, writer, None, true));
        }
    }
}

/// Writes `response` if any, then shuts the write half down when `closing`.
fn flush(
    id: ConnectionId,
    mut writer: Writer,
    response: Option<String>,
    closing: bool,
) -> BoxFuture<'static, Flushed> {
    async move {
        let result: anyhow::Result<()> = async {
            if let Some(response) = response {
                writer.send(response).await?;
            }
            if closing {
                writer.close().await?;
            }
            Ok(())
        }
        .await;
        Flushed {
            id,
            writer,
            closing,
            result,
        }
    }
    .boxed()
}

async fn resolve(host: &str) -> anyhow::Result<Vec<IpAddr>> {
    let mut addresses: Vec<IpAddr> = Vec::new();
    for addr in tokio::net::lookup_host((host, 0))
        .await
        .with_context(|| format!("Failed to resolve host {host}"))?
    {
        if !addresses.contains(&addr.ip()) {
            addresses.push(addr.ip());
        }
    }
    anyhow::ensure!(!addresses.is_empty(), "Host {host} resolves to no addresses");
    Ok(addresses)
}
