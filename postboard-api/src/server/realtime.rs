//! Fan-out of post changes to websocket clients on `/socket`.

use crate::server::{ServerRouter, ServerState};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::event::{POSTS_CHANNEL, PostEvent};
use serde::Serialize;
use tokio::sync::broadcast::{self, Receiver, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Clone, Debug)]
pub struct PostEvents {
    sender: broadcast::Sender<PostEvent>,
}

impl PostEvents {
    /// Clients lagging more than `capacity` events behind skip the missed ones.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of clients the event was handed to.
    pub fn publish(&self, event: PostEvent) -> usize {
        let post_id = event.post_id();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(%post_id, receivers, "Published post event");
                receivers
            }
            Err(_) => {
                debug!(%post_id, "No socket clients to notify");
                0
            }
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> Receiver<PostEvent> {
        self.sender.subscribe()
    }
}

#[derive(Serialize)]
struct ChannelMessage<'a> {
    event: &'static str,
    data: &'a PostEvent,
}

fn encode_event(event: &PostEvent) -> serde_json::Result<String> {
    serde_json::to_string(&ChannelMessage {
        event: POSTS_CHANNEL,
        data: event,
    })
}

#[derive(TypedPath)]
#[typed_path("/socket")]
pub struct SocketPath;

pub fn routes() -> ServerRouter {
    Router::new().typed_get(socket)
}

#[axum::debug_handler(state = ServerState)]
async fn socket(
    _: SocketPath,
    upgrade: WebSocketUpgrade,
    State(events): State<PostEvents>,
    State(shutdown): State<CancellationToken>,
) -> Response {
    let receiver = events.subscribe();
    upgrade.on_upgrade(move |socket| forward_events(socket, receiver, shutdown))
}

async fn forward_events(
    mut socket: WebSocket,
    mut events: Receiver<PostEvent>,
    shutdown: CancellationToken,
) {
    debug!("Socket client connected");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            incoming = socket.recv() => match incoming {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                // Clients only listen.
                Some(Ok(_)) => {}
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let text = match encode_event(&event) {
                        Ok(text) => text,
                        Err(err) => {
                            error!(error = %err, "Could not encode post event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Socket client lagged behind post events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    debug!("Socket client disconnected");
}

#[cfg(test)]
mod tests {
    use crate::server::realtime::{PostEvents, encode_event};
    use postboard_common::model::{Id, event::PostEvent};
    use serde_json::json;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn publishing_without_clients() {
        let events = PostEvents::new(4);

        assert_eq!(events.publish(PostEvent::Delete(Id::from(1_u64))), 0);
    }

    #[test]
    fn every_client_receives_events() {
        let events = PostEvents::new(4);
        let mut first = events.subscribe();
        let mut second = events.subscribe();

        assert_eq!(events.publish(PostEvent::Delete(Id::from(1_u64))), 2);
        assert_eq!(first.try_recv().unwrap(), PostEvent::Delete(Id::from(1_u64)));
        assert_eq!(second.try_recv().unwrap(), PostEvent::Delete(Id::from(1_u64)));
        assert_eq!(first.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn lagging_clients_skip_events() {
        let events = PostEvents::new(1);
        let mut receiver = events.subscribe();

        events.publish(PostEvent::Delete(Id::from(1_u64)));
        events.publish(PostEvent::Delete(Id::from(2_u64)));

        assert_eq!(receiver.recv().await, Err(RecvError::Lagged(1)));
        assert_eq!(receiver.recv().await, Ok(PostEvent::Delete(Id::from(2_u64))));
    }

    #[test]
    fn wire_format() {
        let encoded = encode_event(&PostEvent::Delete(Id::from(42_u64))).unwrap();

        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&encoded).unwrap(),
            json!({ "event": "posts", "data": { "action": "delete", "post": 42 } })
        );
    }
}
