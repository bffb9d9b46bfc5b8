//! WebSocket connection lifecycle, command dispatch, and room fan-out.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        session::SessionSnapshot,
        ws::{ClientCommand, ErrorNotice, JoinSessionPayload, PlayerJoinedNotice, ServerMessage},
    },
    error::ServiceError,
    services::session_service,
    state::{SharedState, connections::ConnectionBinding, session::Session},
};

/// Handle the full lifecycle of one client WebSocket connection.
///
/// The connection is anonymous until its first `join_session`; commands carry
/// the session key themselves, so they are processed either way. Every failed
/// command answers the caller with an explicit `error` event — a client that
/// hears nothing can safely blame the transport.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    info!(%connection_id, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientCommand::from_json_str(&text) {
                Ok(command) => {
                    let key = command.session_key().to_string();
                    if let Err(err) = dispatch(&state, connection_id, &outbound_tx, command) {
                        warn!(%connection_id, session_key = %key, error = %err, "command rejected");
                        send_error(&outbound_tx, &err);
                    }
                }
                Err(err) => {
                    warn!(%connection_id, error = %err, "failed to parse or validate command");
                    send_error(&outbound_tx, &err);
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.connections().remove(connection_id);
    info!(%connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Route one parsed command to its handler.
fn dispatch(
    state: &SharedState,
    connection_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    command: ClientCommand,
) -> Result<(), ServiceError> {
    match command {
        ClientCommand::JoinSession(payload) => handle_join(state, connection_id, tx, payload),
        ClientCommand::RequestSnapshot(payload) => {
            let session = session_service::request_snapshot(state, &payload.session_id);
            send_message(tx, &snapshot_message(&session));
            Ok(())
        }
        ClientCommand::StartGame(payload) => {
            let session = session_service::start_game(state, &payload.session_id)?;
            answer_and_broadcast(state, connection_id, tx, &session);
            Ok(())
        }
        ClientCommand::StartRound(payload) => {
            let session =
                session_service::start_round(state, &payload.session_id, payload.duration_secs)?;
            answer_and_broadcast(state, connection_id, tx, &session);
            Ok(())
        }
        ClientCommand::SubmitResponse(payload) => {
            let session = session_service::submit_response(state, &payload)?;
            answer_and_broadcast(state, connection_id, tx, &session);
            Ok(())
        }
        ClientCommand::SetTeamRoundScore(payload) => {
            let session = session_service::set_team_round_score(state, &payload)?;
            answer_and_broadcast(state, connection_id, tx, &session);
            Ok(())
        }
        ClientCommand::AdvanceRound(payload) => {
            let session = session_service::advance_round(state, &payload.session_id)?;
            answer_and_broadcast(state, connection_id, tx, &session);
            Ok(())
        }
        ClientCommand::EndGame(payload) => {
            let session = session_service::end_game(state, &payload.session_id)?;
            answer_and_broadcast(state, connection_id, tx, &session);
            Ok(())
        }
        ClientCommand::UpdatePlayerSelection(payload) => {
            let session = session_service::update_player_selection(state, &payload)?;
            answer_and_broadcast(state, connection_id, tx, &session);
            Ok(())
        }
    }
}

/// Bind the connection to the session, answer with the full snapshot, and
/// notify the rest of the room with a lightweight joined notice.
fn handle_join(
    state: &SharedState,
    connection_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    payload: JoinSessionPayload,
) -> Result<(), ServiceError> {
    let (session, role) = session_service::join(state, &payload);

    // Replaces any previous binding, so a reconnecting client that re-emits
    // join lands in the room exactly once.
    state.connections().bind(ConnectionBinding {
        id: connection_id,
        session_id: session.id.clone(),
        role,
        player_name: payload.player_name.clone(),
        team_id: payload.team_id.clone(),
        tx: tx.clone(),
    });

    info!(
        %connection_id,
        session_id = %session.id,
        player = %payload.player_name,
        ?role,
        "joined session"
    );

    send_message(tx, &snapshot_message(&session));

    let notice = ServerMessage::PlayerJoined(PlayerJoinedNotice {
        player_name: payload.player_name,
        team_id: payload.team_id,
        icon: payload.icon,
    });
    send_to_room_except(state, &session.id, connection_id, &notice);

    Ok(())
}

/// Broadcast the post-command snapshot to the whole room; a caller that never
/// joined this room still gets the snapshot directly, so every successful
/// command is answered.
fn answer_and_broadcast(
    state: &SharedState,
    connection_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    session: &Session,
) {
    broadcast_snapshot(state, session);
    if !state.connections().is_in_room(connection_id, &session.id) {
        send_message(tx, &snapshot_message(session));
    }
}

/// Send the full snapshot to every connection bound to the session.
///
/// Fan-out is fire-and-forget and unordered across connections, but each
/// outgoing frame carries the complete state produced by one mutation, so no
/// client can observe a partial update.
pub fn broadcast_snapshot(state: &SharedState, session: &Session) {
    let message = snapshot_message(session);
    let Some(payload) = serialize(&message) else {
        return;
    };
    for (_, tx) in state.connections().room_senders(&session.id) {
        let _ = tx.send(Message::Text(payload.clone().into()));
    }
}

/// Send an event to everyone in the room except `excluded`.
fn send_to_room_except(
    state: &SharedState,
    session_id: &str,
    excluded: Uuid,
    message: &ServerMessage,
) {
    let Some(payload) = serialize(message) else {
        return;
    };
    for (id, tx) in state.connections().room_senders(session_id) {
        if id != excluded {
            let _ = tx.send(Message::Text(payload.clone().into()));
        }
    }
}

fn snapshot_message(session: &Session) -> ServerMessage {
    ServerMessage::Snapshot(SessionSnapshot::from(session))
}

/// Serialize an outbound event, logging instead of propagating on failure
/// (a serialization failure is a bug, not a client condition).
fn serialize(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message");
            None
        }
    }
}

/// Queue an event for one connection's writer task.
fn send_message(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    if let Some(payload) = serialize(message) {
        let _ = tx.send(Message::Text(payload.into()));
    }
}

/// Queue an explicit error event for the caller only.
fn send_error(tx: &mpsc::UnboundedSender<Message>, err: &ServiceError) {
    send_message(tx, &ServerMessage::Error(ErrorNotice::from(err)));
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dto::ws::SessionKeyPayload, state::AppState};
    use serde_json::Value;

    fn connect(
        state: &SharedState,
        session_id: &str,
        player: &str,
        team: Option<&str>,
    ) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        handle_join(
            state,
            connection_id,
            &tx,
            JoinSessionPayload {
                session_id: session_id.into(),
                player_name: player.into(),
                team_id: team.map(Into::into),
                icon: None,
                is_admin: team.is_none(),
            },
        )
        .unwrap();
        (connection_id, rx)
    }

    fn next_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        match rx.try_recv().expect("expected a queued message") {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) {
        while rx.try_recv().is_ok() {}
    }

    #[test]
    fn join_answers_joiner_and_notifies_the_room() {
        let state = AppState::new(AppConfig::default());
        let (_ana, mut ana_rx) = connect(&state, "abc123000042", "Ana", Some("red"));
        let ana_snapshot = next_json(&mut ana_rx);
        assert_eq!(ana_snapshot["type"], "snapshot");

        let (_luis, mut luis_rx) = connect(&state, "000042", "Luis", Some("blue"));
        // Luis gets the full snapshot; Ana only a lightweight notice.
        assert_eq!(next_json(&mut luis_rx)["type"], "snapshot");
        let notice = next_json(&mut ana_rx);
        assert_eq!(notice["type"], "player_joined");
        assert_eq!(notice["playerName"], "Luis");
        assert!(luis_rx.try_recv().is_err());
    }

    #[test]
    fn command_broadcasts_strictly_increasing_last_update_to_the_room() {
        let state = AppState::new(AppConfig::default());
        let (ana, mut ana_rx) = connect(&state, "abc123000042", "Ana", Some("red"));
        let (_luis, mut luis_rx) = connect(&state, "abc123000042", "Luis", Some("blue"));
        drain(&mut ana_rx);
        drain(&mut luis_rx);

        let (tx, _caller_rx) = mpsc::unbounded_channel();
        dispatch(
            &state,
            ana,
            &tx,
            ClientCommand::StartGame(SessionKeyPayload {
                session_id: "000042".into(),
            }),
        )
        .unwrap();

        let to_ana = next_json(&mut ana_rx);
        let to_luis = next_json(&mut luis_rx);
        assert_eq!(to_ana["type"], "snapshot");
        assert_eq!(to_ana["lastUpdate"], to_luis["lastUpdate"]);

        let first_update = to_ana["lastUpdate"].as_u64().unwrap();
        dispatch(
            &state,
            ana,
            &tx,
            ClientCommand::EndGame(SessionKeyPayload {
                session_id: "abc123000042".into(),
            }),
        )
        .unwrap();
        let second = next_json(&mut ana_rx)["lastUpdate"].as_u64().unwrap();
        assert!(second > first_update);
    }

    #[test]
    fn unbound_caller_still_receives_the_snapshot() {
        let state = AppState::new(AppConfig::default());
        let (_ana, mut ana_rx) = connect(&state, "abc123000042", "Ana", Some("red"));
        drain(&mut ana_rx);

        let (tx, mut caller_rx) = mpsc::unbounded_channel();
        dispatch(
            &state,
            Uuid::new_v4(),
            &tx,
            ClientCommand::StartGame(SessionKeyPayload {
                session_id: "abc123000042".into(),
            }),
        )
        .unwrap();

        assert_eq!(next_json(&mut caller_rx)["type"], "snapshot");
        assert_eq!(next_json(&mut ana_rx)["type"], "snapshot");
    }

    #[test]
    fn command_against_unknown_session_yields_error_event_shape() {
        let err = ServiceError::NotFound("session `nope` not found".into());
        let message = ServerMessage::Error(ErrorNotice::from(&err));
        let json: Value = serde_json::from_str(&serialize(&message).unwrap()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "not_found");
    }
}
