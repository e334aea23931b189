use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension, TypedHeader,
};
use futures::{sink::Sink, stream::Stream, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::registry::{Subscriber, SubscriberId, SubscriberRegistry, WireMessage};

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(registry): Extension<SubscriberRegistry>,
) -> impl IntoResponse {
    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` connected", user_agent.as_str());
    }

    ws.on_upgrade(move |socket| {
        let span = info_span!("Subscriber", %addr);

        handle_websocket(socket, addr, registry).instrument(span)
    })
}

/// Unregisters the subscriber when dropped,
/// so that cleanup happens however the connection handling ends.
struct Registration {
    registry: SubscriberRegistry,
    id: SubscriberId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

/// Wait for the client to go away.
/// Anything the client sends is ignored.
pub(crate) async fn read<S>(mut receiver: S)
where
    S: Unpin,
    S: Stream<Item = Result<Message, axum::Error>>,
{
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                trace!(%text, "ignoring client text");
            }
            Ok(Message::Binary(_)) => {
                debug!("client sent binary data");
            }
            Ok(Message::Ping(_)) => {
                debug!("socket ping");
            }
            Ok(Message::Pong(_)) => {
                debug!("socket pong");
            }
            Ok(Message::Close(_)) => {
                debug!("client disconnected");
                break;
            }
            Err(e) => {
                debug!(%e, "socket error");
                break;
            }
        }
    }
}

/// Put whatever arrives in the outbox on the wire.
///
/// Returning drops the outbox, which makes further deliveries to this subscriber fail.
pub(crate) async fn write(
    mut sender: impl Sink<Message> + Unpin,
    mut outbox: mpsc::UnboundedReceiver<WireMessage>,
) {
    while let Some(message) = outbox.recv().await {
        if sender.send(Message::Text(message.to_string())).await.is_err() {
            debug!("client disconnected");
            return;
        }
        trace!("Sample flushed");
    }
}

pub(crate) async fn handle_websocket(
    websocket: WebSocket,
    addr: SocketAddr,
    registry: SubscriberRegistry,
) {
    let (stream_sender, stream_receiver) = websocket.split();

    let (subscriber, outbox) = Subscriber::new(&addr.to_string());
    let id = subscriber.id();

    registry.register(subscriber);
    let _registration = Registration { registry, id };

    info!(%id, "Subscribed");

    let write_handle = tokio::spawn(write(stream_sender, outbox).instrument(info_span!("Write")));

    read(stream_receiver).instrument(info_span!("Read")).await;

    debug!("Aborting write task");
    // This ensures the underlying TCP connection gets closed,
    // which signals the peer that the session is over.
    write_handle.abort();

    match write_handle.await {
        Ok(()) => debug!("Write task joined"),
        Err(e) if e.is_cancelled() => trace!("Write task cancelled"),
        Err(e) => warn!("Write task join error: {e:?}"),
    }

    info!(%id, "Unsubscribed");
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc as futures_mpsc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn registration_unregisters_on_drop() {
        let registry = SubscriberRegistry::new();
        let (subscriber, _outbox) = Subscriber::new("guarded");
        let id = subscriber.id();

        registry.register(subscriber);

        {
            let _registration = Registration {
                registry: registry.clone(),
                id,
            };
            assert_eq!(registry.len(), 1);
        }

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn read_stops_on_close() {
        let stream = futures::stream::iter(vec![
            Ok(Message::Text("ignored".into())),
            Ok(Message::Close(None)),
            Ok(Message::Text("never looked at".into())),
        ]);

        read(stream).await;
    }

    #[tokio::test]
    async fn write_forwards_outbox() {
        let (sink, mut wire) = futures_mpsc::unbounded::<Message>();
        let (subscriber, outbox) = Subscriber::new("writer");

        subscriber.send("one".into()).unwrap();
        subscriber.send("two".into()).unwrap();
        drop(subscriber);

        write(sink, outbox).await;

        assert_eq!(wire.next().await, Some(Message::Text("one".into())));
        assert_eq!(wire.next().await, Some(Message::Text("two".into())));
    }

    #[tokio::test]
    async fn failed_write_makes_delivery_fail() {
        let (sink, wire) = futures_mpsc::unbounded::<Message>();
        drop(wire);

        let (subscriber, outbox) = Subscriber::new("broken");
        subscriber.send("lost".into()).unwrap();

        write(sink, outbox).await;

        assert!(subscriber.send("after".into()).is_err());
    }
}
