use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade, ws},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::events::{ClientCommand, ServerEvent};
use crate::registry::ConnectionSender;
use crate::{AppResult, AppState, db, session};

use super::{membership, msg, typing};

/// WebSocket entry point. Unauthenticated callers are rejected before the
/// upgrade; each accepted socket becomes one live connection for the
/// session's user.
#[debug_handler]
pub async fn connect_ws(
    State(state): State<AppState>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user_id = session::current_user_id(&session).await?;
    Ok(ws.on_upgrade(move |socket| run_connection(state, user_id, socket)))
}

/// Registers a connection and subscribes it to every room its user is a
/// member of. Separate from the socket loop so tests can drive the
/// lifecycle with a bare channel in place of a real socket.
pub async fn attach_connection(
    state: &AppState,
    user_id: Uuid,
    conn_id: Uuid,
    tx: ConnectionSender,
) {
    state.registry.add(user_id, conn_id, tx.clone());

    if let Err(err) = db::set_online(&state.db_pool, user_id, true).await {
        tracing::warn!(error = %err, %user_id, "could not mark user online");
    }

    match membership::rooms_for(&state.db_pool, user_id).await {
        Ok(rooms) => {
            for room_id in rooms {
                state.router.subscribe(room_id, conn_id, user_id, tx.clone());
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, %user_id, "initial room subscription failed");
        }
    }
}

/// Tears one connection down. Subscriptions go implicitly (no `user.left`
/// broadcast on mere disconnect, unlike an explicit leave) and the last
/// connection gone marks the user offline.
pub async fn detach_connection(state: &AppState, user_id: Uuid, conn_id: Uuid) {
    state.router.drop_connection(conn_id);
    if state.registry.remove(user_id, conn_id) {
        if let Err(err) = db::set_online(&state.db_pool, user_id, false).await {
            tracing::warn!(error = %err, %user_id, "could not mark user offline");
        }
    }
}

async fn run_connection(state: AppState, user_id: Uuid, socket: ws::WebSocket) {
    let conn_id = Uuid::now_v7();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ws::Message>();

    attach_connection(&state, user_id, conn_id, tx.clone()).await;
    tracing::info!(%user_id, %conn_id, "connection opened");

    // Writer task owns the sink; everything else pushes through the channel.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            incoming = stream.next() => {
                let Some(Ok(frame)) = incoming else { break };
                let ws::Message::Text(text) = frame else { continue };

                let command = match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => command,
                    Err(err) => {
                        send_error(&tx, "validation_failed", &format!("bad command: {err}"));
                        continue;
                    }
                };

                // a failed command rejects only itself, never the connection
                if let Err(err) = dispatch(&state, user_id, command).await {
                    send_error(&tx, err.code(), &err.to_string());
                }
            }
        }
    }

    writer.abort();
    detach_connection(&state, user_id, conn_id).await;
    tracing::info!(%user_id, %conn_id, "connection closed");
}

async fn dispatch(state: &AppState, user_id: Uuid, command: ClientCommand) -> AppResult<()> {
    match command {
        ClientCommand::Send { room_id, content } => {
            msg::send_message(state, user_id, room_id, &content).await?;
        }
        ClientCommand::Typing { room_id } => {
            typing::signal_typing(state, user_id, room_id).await?;
        }
        ClientCommand::MarkRead { message_id } => {
            msg::mark_read(state, user_id, message_id).await?;
        }
        ClientCommand::Join { room_id } => {
            super::join_room(state, user_id, room_id).await?;
        }
        ClientCommand::Leave { room_id } => {
            super::leave_room(state, user_id, room_id).await?;
        }
    }
    Ok(())
}

fn send_error(tx: &ConnectionSender, code: &str, message: &str) {
    let event = ServerEvent::Error {
        code: code.to_owned(),
        message: message.to_owned(),
    };
    if let Some(frame) = event.to_ws_message() {
        let _ = tx.send(frame);
    }
}
