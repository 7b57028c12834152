//! In-process transports between a client and a [`ConfigServer`].

use confsync_client::{
    ChannelEvent, ClientError, ClientResult, HttpResponse, LoopbackServer, PushChannel,
};
use confsync_protocol::{ClientMessage, PushEnvelope};
use confsync_server::{ChannelSink, ConfigServer, ConnectionId};
use parking_lot::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Serves loopback HTTP requests from a shared server.
#[derive(Clone)]
pub struct ServerLoopback(pub Arc<ConfigServer>);

impl LoopbackServer for ServerLoopback {
    fn handle_get(&self, path: &str) -> HttpResponse {
        let reply = self.0.handle_get(path);
        HttpResponse {
            status: reply.status,
            body: reply.body,
        }
    }
}

/// A push channel backed by a server connection and an in-process sink.
///
/// Messages sent by the client go straight to the server's message handler.
/// The connection is closed when the channel is dropped.
pub struct ChannelPushChannel {
    server: Arc<ConfigServer>,
    connection: ConnectionId,
    inbox: Mutex<Receiver<PushEnvelope>>,
}

impl ChannelPushChannel {
    /// Accepts a new connection on `server`.
    pub fn connect(server: Arc<ConfigServer>) -> Self {
        let (sink, inbox) = ChannelSink::pair();
        let connection = server.accept(Arc::new(sink));
        Self {
            server,
            connection,
            inbox: Mutex::new(inbox),
        }
    }

    /// Returns the server-side connection id.
    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }
}

impl PushChannel for ChannelPushChannel {
    fn send(&self, message: &ClientMessage) -> ClientResult<()> {
        self.server
            .handle_client_message(&self.connection, message.clone())
            .map_err(|e| ClientError::transport(e.to_string()))
    }

    fn recv_timeout(&self, timeout: Duration) -> ChannelEvent {
        match self.inbox.lock().recv_timeout(timeout) {
            Ok(envelope) => ChannelEvent::Envelope(envelope),
            Err(RecvTimeoutError::Timeout) => ChannelEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => ChannelEvent::Closed,
        }
    }
}

impl Drop for ChannelPushChannel {
    fn drop(&mut self) {
        self.server.close(&self.connection);
    }
}
