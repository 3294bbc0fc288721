//! Websocket connection per channel session.
//!
//! Each session gets its own connection task. Outbound frames go through
//! [`SocketConnection::send`]; everything the task observes is reported as a
//! [`SessionEvent`] through the `on_event` callback. Dropping the
//! [`SocketConnection`] closes the socket gracefully.

use futures_util::{SinkExt, StreamExt};
use phx_react_proto::ChannelMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::SessionEvent;

/// Handle to a running socket task.
#[derive(Debug)]
pub struct SocketConnection {
    to_server: mpsc::UnboundedSender<ChannelMessage>,
}

impl SocketConnection {
    /// Queue a frame for sending.
    ///
    /// Returns `false` if the connection task has already exited.
    pub fn send(&self, message: ChannelMessage) -> bool {
        self.to_server.send(message).is_ok()
    }
}

/// Open a websocket to `url` and spawn its connection task.
///
/// Must be called within a tokio runtime. Connection failures are reported
/// through `on_event` as [`SessionEvent::TransportError`].
pub fn open<F>(url: String, on_event: F) -> SocketConnection
where
    F: Fn(SessionEvent) + Send + 'static,
{
    let (to_server, from_client) = mpsc::unbounded_channel();
    tokio::spawn(run_socket(url, from_client, on_event));
    SocketConnection { to_server }
}

/// Run the connection, bridging between the channel and the websocket.
async fn run_socket<F>(url: String, mut from_client: mpsc::UnboundedReceiver<ChannelMessage>, on_event: F)
where
    F: Fn(SessionEvent) + Send + 'static,
{
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(%url, error = %e, "websocket connect failed");
            on_event(SessionEvent::TransportError { reason: e.to_string() });
            return;
        },
    };
    tracing::debug!(%url, "websocket open");
    on_event(SessionEvent::TransportOpened);

    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            outbound = from_client.recv() => {
                let Some(message) = outbound else {
                    // Owner dropped the handle: close without reporting.
                    let _ = sink.send(Message::Close(None)).await;
                    tracing::debug!(%url, "websocket closed by owner");
                    return;
                };
                let text = match message.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, event = %message.event, "frame encode failed");
                        continue;
                    },
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    on_event(SessionEvent::TransportError { reason: e.to_string() });
                    return;
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => match ChannelMessage::decode(&text) {
                    Ok(message) => on_event(SessionEvent::MessageReceived(message)),
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    on_event(SessionEvent::TransportClosed);
                    return;
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    on_event(SessionEvent::TransportError { reason: e.to_string() });
                    return;
                },
            },
        }
    }
}
