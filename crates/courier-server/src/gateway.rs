//! WebSocket gateway.
//!
//! Each accepted connection gets a process-unique id and an outbound event
//! queue.  A writer task drains the queue into JSON text frames while the
//! read loop parses inbound [`ClientEvent`]s and dispatches them.  Every
//! handler catches its own failures and converts them to a sender-directed
//! error event; nothing that happens in here crashes the connection or the
//! process.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use courier_shared::protocol::{ClientEvent, ServerEvent};

use crate::api::AppState;
use crate::error::RelayError;
use crate::registry::ConnectionHandle;
use crate::router::Delivery;

/// `GET /ws` -- upgrade to the event protocol.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Drive a single connection from accept to close.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let handle = ConnectionHandle::new(connection_id, tx);

    state.registry.attach_session(handle.clone()).await;
    info!(connection = %connection_id, "client connected");

    let (mut sink, mut stream) = socket.split();

    // Writer task: serialize queued events into text frames.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.to_json() {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to serialize outbound event");
                }
            }
        }
    });

    // Read loop: per-connection event order is preserved because frames are
    // handled one at a time.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_frame(&state, &handle, &text).await,
            Message::Close(_) => break,
            // Ping/pong are answered by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    // Teardown is idempotent: the identity binding may already have been
    // overwritten by a re-registration on another connection.
    let identity = state.registry.unregister_by_connection(connection_id).await;
    state.registry.detach_session(connection_id).await;
    state.registry.broadcast_online().await;
    writer.abort();

    info!(
        connection = %connection_id,
        identity = identity.as_deref().unwrap_or("<unregistered>"),
        "client disconnected"
    );
}

/// Parse one text frame and route it.
///
/// Most missing fields parse as empty strings and are answered by the
/// handlers' own validation; frames that still fail to parse (a non-UUID
/// group id, a payload of the wrong shape) are answered by
/// [`reject_malformed`] rather than dropped silently.
async fn handle_frame(state: &AppState, handle: &ConnectionHandle, text: &str) {
    match ClientEvent::from_json(text) {
        Ok(event) => dispatch(state, handle, event).await,
        Err(e) => {
            debug!(connection = %handle.id(), error = %e, "malformed frame");
            reject_malformed(state, handle, text);
        }
    }
}

/// Answer an unparseable frame that still names a known event.
///
/// Events whose reply channel is `message-status` get a failed status; an
/// unusable group id means the group cannot exist, so that is reported as
/// not found.  Frames with no recognizable event name stay unanswered.
fn reject_malformed(state: &AppState, handle: &ConnectionHandle, text: &str) {
    let Ok(frame) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };

    match frame.get("event").and_then(|e| e.as_str()) {
        Some("send-message") | Some("send-file") => {
            state.router.deliver_status(
                handle,
                &Delivery::NotDelivered {
                    reason: "Missing fields".to_string(),
                },
            );
        }
        Some("send-group-message") => {
            state.router.deliver_status(
                handle,
                &Delivery::NotDelivered {
                    reason: "Group not found".to_string(),
                },
            );
        }
        _ => {}
    }
}

/// Route one inbound event to its handler.
async fn dispatch(state: &AppState, handle: &ConnectionHandle, event: ClientEvent) {
    match event {
        ClientEvent::RegisterUser(email) => {
            state.registry.register(&email, handle.clone()).await;
            info!(identity = %email, connection = %handle.id(), "user registered");

            // Clients without a stored email send a placeholder; keep it
            // out of the durable user table.
            if email != "No email found" {
                let db = state.store.lock().await;
                if let Err(e) = db.upsert_user(&email, &handle.id().to_string()) {
                    warn!(identity = %email, error = %e, "failed to persist registration");
                }
            }

            state.registry.broadcast_online().await;
        }

        ClientEvent::SendMessage {
            selected,
            message,
            from,
        } => {
            if selected.is_empty() || message.is_empty() || from.is_empty() {
                state.router.deliver_status(
                    handle,
                    &Delivery::NotDelivered {
                        reason: "Missing fields".to_string(),
                    },
                );
                return;
            }

            let delivery = state
                .router
                .deliver_to_one(&selected, ServerEvent::ReceiveMessage { from, message })
                .await;
            state.router.deliver_status(handle, &delivery);
        }

        ClientEvent::CreateGroup {
            name,
            description,
            participants,
            admin,
        } => {
            if let Err(e) = state
                .groups
                .create(&name, &description, participants, &admin)
                .await
            {
                send_group_error(handle, e, "Failed to create group");
            }
        }

        ClientEvent::GetUserGroups(email) => match state.groups.groups_for(&email).await {
            Ok(groups) => {
                handle.send(ServerEvent::UserGroups(groups));
            }
            Err(e) => send_group_error(handle, e, "Failed to fetch groups"),
        },

        ClientEvent::SendGroupMessage {
            group_id,
            message,
            from,
        } => {
            if message.is_empty() || from.is_empty() {
                state.router.deliver_status(
                    handle,
                    &Delivery::NotDelivered {
                        reason: "Missing fields".to_string(),
                    },
                );
                return;
            }

            match state.groups.send_message(group_id, &from, &message).await {
                Ok(_) => state.router.deliver_status(handle, &Delivery::Sent),
                Err(e) => {
                    let reason = match e {
                        RelayError::Storage(err) => {
                            error!(group = %group_id, error = %err, "group message storage failure");
                            "Server error".to_string()
                        }
                        other => other.to_string(),
                    };
                    state
                        .router
                        .deliver_status(handle, &Delivery::NotDelivered { reason });
                }
            }
        }

        ClientEvent::GetGroupMessages(group_id) => {
            match state.groups.fetch_messages(group_id).await {
                Ok(messages) => {
                    handle.send(ServerEvent::GroupMessages { group_id, messages });
                }
                Err(e) => send_group_error(handle, e, "Failed to fetch messages"),
            }
        }

        ClientEvent::AddGroupMembers {
            group_id,
            new_members,
            admin_email,
        } => {
            if let Err(e) = state
                .groups
                .add_members(group_id, new_members, &admin_email)
                .await
            {
                send_group_error(handle, e, "Failed to add members");
            }
        }

        ClientEvent::RemoveGroupMember {
            group_id,
            member_to_remove,
            admin_email,
        } => {
            if let Err(e) = state
                .groups
                .remove_member(group_id, &member_to_remove, &admin_email)
                .await
            {
                send_group_error(handle, e, "Failed to remove member");
            }
        }

        ClientEvent::UpdateGroup {
            group_id,
            name,
            description,
            admin_email,
        } => {
            if let Err(e) = state
                .groups
                .update(group_id, &name, &description, &admin_email)
                .await
            {
                send_group_error(handle, e, "Failed to update group");
            }
        }

        ClientEvent::DeleteGroup {
            group_id,
            admin_email,
        } => {
            if let Err(e) = state.groups.delete(group_id, &admin_email).await {
                send_group_error(handle, e, "Failed to delete group");
            }
        }

        ClientEvent::LeaveGroup {
            group_id,
            member_email,
        } => {
            if let Err(e) = state.groups.leave(group_id, &member_email).await {
                send_group_error(handle, e, "Failed to leave group");
            }
        }

        ClientEvent::SendFile {
            selected,
            file_info,
            from,
            to,
        } => {
            let descriptor = match file_info {
                Some(descriptor) if !selected.is_empty() && !from.is_empty() => descriptor,
                _ => {
                    state.router.deliver_status(
                        handle,
                        &Delivery::NotDelivered {
                            reason: "Missing fields".to_string(),
                        },
                    );
                    return;
                }
            };

            let delivery = state
                .router
                .deliver_to_one(
                    &selected,
                    ServerEvent::ReceiveFile {
                        from,
                        file_info: descriptor,
                        to,
                    },
                )
                .await;
            state.router.deliver_status(handle, &delivery);
        }
    }
}

/// Convert an operation failure into a `group-error` event for the acting
/// client.  Storage failures are logged and reported with the operation's
/// generic message instead of internal detail.
fn send_group_error(handle: &ConnectionHandle, err: RelayError, storage_message: &str) {
    let message = match err {
        RelayError::Storage(e) => {
            error!(error = %e, "storage failure");
            storage_message.to_string()
        }
        other => other.to_string(),
    };
    handle.send(ServerEvent::GroupError { message });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;
    use tokio::sync::Mutex;

    use courier_store::Database;

    use crate::config::ServerConfig;
    use crate::files::FileStore;
    use crate::groups::GroupManager;
    use crate::registry::Registry;
    use crate::router::Router;

    async fn test_state(dir: &TempDir) -> AppState {
        let registry = Arc::new(Registry::new());
        let router = Router::new(registry.clone());
        let store = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let groups = Arc::new(GroupManager::new(store.clone(), router.clone()));
        let files = Arc::new(
            FileStore::new(dir.path().to_path_buf(), 1024)
                .await
                .unwrap(),
        );

        AppState {
            registry,
            router,
            groups,
            store,
            files,
            config: Arc::new(ServerConfig::default()),
        }
    }

    async fn connect(
        state: &AppState,
    ) -> (
        ConnectionHandle,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(Uuid::new_v4(), tx);
        state.registry.attach_session(handle.clone()).await;
        (handle, rx)
    }

    #[tokio::test]
    async fn register_broadcasts_online_set() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;

        dispatch(&state, &a, ClientEvent::RegisterUser("a@x.com".to_string())).await;
        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::OnlineUsers(vec!["a@x.com".to_string()])
        );
        // Unregistered sessions see the broadcast too.
        assert_eq!(
            rx_b.try_recv().unwrap(),
            ServerEvent::OnlineUsers(vec!["a@x.com".to_string()])
        );

        dispatch(&state, &b, ClientEvent::RegisterUser("b@x.com".to_string())).await;
        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::OnlineUsers(vec!["a@x.com".to_string(), "b@x.com".to_string()])
        );

        // Registration also upserts the durable last-known handle.
        let db = state.store.lock().await;
        let pairs = db.user_socket_map().unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[tokio::test]
    async fn direct_message_to_online_recipient() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;

        dispatch(&state, &a, ClientEvent::RegisterUser("a@x.com".to_string())).await;
        dispatch(&state, &b, ClientEvent::RegisterUser("b@x.com".to_string())).await;
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        dispatch(
            &state,
            &a,
            ClientEvent::SendMessage {
                selected: "b@x.com".to_string(),
                message: "hi".to_string(),
                from: "a@x.com".to_string(),
            },
        )
        .await;

        assert_eq!(
            rx_b.try_recv().unwrap(),
            ServerEvent::ReceiveMessage {
                from: "a@x.com".to_string(),
                message: "hi".to_string(),
            }
        );
        // Exactly one delivery.
        assert!(rx_b.try_recv().is_err());

        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::MessageStatus {
                status: "sent".to_string(),
                reason: None,
            }
        );
    }

    #[tokio::test]
    async fn direct_message_to_offline_recipient_fails() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;

        dispatch(&state, &a, ClientEvent::RegisterUser("a@x.com".to_string())).await;
        while rx_a.try_recv().is_ok() {}

        // c@x.com never registered.
        dispatch(
            &state,
            &a,
            ClientEvent::SendMessage {
                selected: "c@x.com".to_string(),
                message: "hi".to_string(),
                from: "a@x.com".to_string(),
            },
        )
        .await;

        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::MessageStatus {
                status: "failed".to_string(),
                reason: Some("Recipient not online".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn direct_message_with_missing_fields_fails() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;

        dispatch(
            &state,
            &a,
            ClientEvent::SendMessage {
                selected: String::new(),
                message: "hi".to_string(),
                from: "a@x.com".to_string(),
            },
        )
        .await;

        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::MessageStatus {
                status: "failed".to_string(),
                reason: Some("Missing fields".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn frame_without_selected_field_fails() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;

        // The key is absent entirely, not present-but-empty.
        let frame = r#"{"event":"send-message","data":{"message":"hi","from":"a@x.com"}}"#;
        handle_frame(&state, &a, frame).await;

        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::MessageStatus {
                status: "failed".to_string(),
                reason: Some("Missing fields".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn file_frame_without_descriptor_fails() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;

        let frame = r#"{"event":"send-file","data":{"selected":"b@x.com","from":"a@x.com"}}"#;
        handle_frame(&state, &a, frame).await;

        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::MessageStatus {
                status: "failed".to_string(),
                reason: Some("Missing fields".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn group_message_with_invalid_group_id_fails() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;

        let frame = r#"{"event":"send-group-message","data":{"groupId":"not-a-uuid","message":"hi","from":"a@x.com"}}"#;
        handle_frame(&state, &a, frame).await;

        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::MessageStatus {
                status: "failed".to_string(),
                reason: Some("Group not found".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn unrecognizable_frame_is_dropped() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;

        handle_frame(&state, &a, "not json at all").await;
        handle_frame(&state, &a, r#"{"event":"no-such-event","data":{}}"#).await;

        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn group_error_goes_to_acting_client_only() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;

        dispatch(&state, &a, ClientEvent::RegisterUser("a@x.com".to_string())).await;
        dispatch(&state, &b, ClientEvent::RegisterUser("b@x.com".to_string())).await;
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        dispatch(
            &state,
            &a,
            ClientEvent::DeleteGroup {
                group_id: Uuid::new_v4(),
                admin_email: "a@x.com".to_string(),
            },
        )
        .await;

        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::GroupError {
                message: "Group not found".to_string(),
            }
        );
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_file_relays_descriptor() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (a, mut rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;

        dispatch(&state, &a, ClientEvent::RegisterUser("a@x.com".to_string())).await;
        dispatch(&state, &b, ClientEvent::RegisterUser("b@x.com".to_string())).await;
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        let file_info = courier_shared::types::FileDescriptor {
            url: "http://localhost:5000/uploads/x.png".to_string(),
            original_name: "x.png".to_string(),
            size: 42,
            mime_type: "image/png".to_string(),
        };

        dispatch(
            &state,
            &a,
            ClientEvent::SendFile {
                selected: "b@x.com".to_string(),
                file_info: Some(file_info.clone()),
                from: "a@x.com".to_string(),
                to: Some("b@x.com".to_string()),
            },
        )
        .await;

        assert_eq!(
            rx_b.try_recv().unwrap(),
            ServerEvent::ReceiveFile {
                from: "a@x.com".to_string(),
                file_info,
                to: Some("b@x.com".to_string()),
            }
        );
        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::MessageStatus {
                status: "sent".to_string(),
                reason: None,
            }
        );
    }
}
