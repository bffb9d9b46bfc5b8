//! WebSocket command and event vocabulary.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{dto::session::SessionSnapshot, error::ServiceError};

/// Commands accepted from WebSocket clients. Every variant carries the
/// session key (full id or short code) under `sessionId`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Attach this connection to a session, creating it if unknown.
    JoinSession(JoinSessionPayload),
    /// Re-send the full snapshot to the caller only (reconnect/resync path).
    RequestSnapshot(SessionKeyPayload),
    /// Leave the lobby: round 1, first prompt, phase `playing`.
    StartGame(SessionKeyPayload),
    /// Begin the timed round: countdown reset, responses cleared, timer live.
    StartRound(StartRoundPayload),
    /// Submit a team's answer for the current round.
    SubmitResponse(SubmitResponsePayload),
    /// Write the (team, round) score, replacing any prior write.
    SetTeamRoundScore(SetTeamRoundScorePayload),
    /// Move to the next round's prompt, stopping any running timer first.
    AdvanceRound(SessionKeyPayload),
    /// End the session and show the final scoreboard.
    EndGame(SessionKeyPayload),
    /// Upsert a player's in-flight prompt selection and draft answer.
    UpdatePlayerSelection(UpdatePlayerSelectionPayload),
}

impl ClientCommand {
    /// Parse and validate a command from a raw text frame.
    ///
    /// Both parse failures and validation failures surface as
    /// [`ServiceError::InvalidCommand`], so the caller can answer with a
    /// single explicit error event instead of dropping the frame.
    pub fn from_json_str(payload: &str) -> Result<Self, ServiceError> {
        let command: Self = serde_json::from_str(payload)
            .map_err(|err| ServiceError::InvalidCommand(format!("malformed command: {err}")))?;
        command.validate_payload()?;
        Ok(command)
    }

    fn validate_payload(&self) -> Result<(), ServiceError> {
        match self {
            Self::JoinSession(payload) => payload.validate()?,
            Self::RequestSnapshot(payload)
            | Self::StartGame(payload)
            | Self::AdvanceRound(payload)
            | Self::EndGame(payload) => payload.validate()?,
            Self::StartRound(payload) => payload.validate()?,
            Self::SubmitResponse(payload) => payload.validate()?,
            Self::SetTeamRoundScore(payload) => payload.validate()?,
            Self::UpdatePlayerSelection(payload) => payload.validate()?,
        }
        Ok(())
    }

    /// Session key the command targets.
    pub fn session_key(&self) -> &str {
        match self {
            Self::JoinSession(payload) => &payload.session_id,
            Self::RequestSnapshot(payload)
            | Self::StartGame(payload)
            | Self::AdvanceRound(payload)
            | Self::EndGame(payload) => &payload.session_id,
            Self::StartRound(payload) => &payload.session_id,
            Self::SubmitResponse(payload) => &payload.session_id,
            Self::SetTeamRoundScore(payload) => &payload.session_id,
            Self::UpdatePlayerSelection(payload) => &payload.session_id,
        }
    }
}

/// Minimal payload for commands that only carry the session key.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyPayload {
    /// Full session id or short code.
    #[validate(length(min = 1))]
    pub session_id: String,
}

/// Payload of [`ClientCommand::JoinSession`].
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionPayload {
    /// Full session id or short code.
    #[validate(length(min = 1))]
    pub session_id: String,
    /// Display name announced to the room.
    #[validate(length(min = 1))]
    pub player_name: String,
    /// Team to join or create; omitted for admins and spectators.
    #[serde(default)]
    pub team_id: Option<String>,
    /// Emoji for a newly created team.
    #[serde(default)]
    pub icon: Option<String>,
    /// Caller-supplied admin flag (no further authentication by design).
    #[serde(default)]
    pub is_admin: bool,
}

/// Payload of [`ClientCommand::StartRound`].
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartRoundPayload {
    /// Full session id or short code.
    #[validate(length(min = 1))]
    pub session_id: String,
    /// Countdown duration override; configured default when omitted.
    #[serde(default)]
    #[validate(range(min = 1, max = 3600))]
    pub duration_secs: Option<u32>,
}

/// Payload of [`ClientCommand::SubmitResponse`].
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponsePayload {
    /// Full session id or short code.
    #[validate(length(min = 1))]
    pub session_id: String,
    /// Submitting team.
    #[validate(length(min = 1))]
    pub team_id: String,
    /// Submitting player.
    #[validate(length(min = 1))]
    pub player_name: String,
    /// Prompt the answer refers to, if the client tracks one.
    #[serde(default)]
    pub prompt_id: Option<u32>,
    /// Free-text answer.
    pub text: String,
}

/// Payload of [`ClientCommand::SetTeamRoundScore`].
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetTeamRoundScorePayload {
    /// Full session id or short code.
    #[validate(length(min = 1))]
    pub session_id: String,
    /// Scored team.
    #[validate(length(min = 1))]
    pub team_id: String,
    /// Scored round (1-based).
    #[validate(range(min = 1))]
    pub round_number: u32,
    /// Speed component; accepted range 0..=1000000, so the derived per-round
    /// total can never overflow.
    #[validate(range(min = 0, max = 1_000_000))]
    pub speed_score: i32,
    /// Quality component; accepted range 0..=1000000.
    #[validate(range(min = 0, max = 1_000_000))]
    pub quality_score: i32,
    /// Optional bonus flag.
    #[serde(default)]
    pub bonus: Option<bool>,
}

/// Payload of [`ClientCommand::UpdatePlayerSelection`].
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayerSelectionPayload {
    /// Full session id or short code.
    #[validate(length(min = 1))]
    pub session_id: String,
    /// Player whose selection is updated.
    #[validate(length(min = 1))]
    pub player_name: String,
    /// Selected prompt, if any.
    #[serde(default)]
    pub selected_prompt: Option<u32>,
    /// Draft answer text.
    #[serde(default)]
    pub draft_response: Option<String>,
}

/// Events pushed to WebSocket clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state of the session: clients replace their local view with it.
    Snapshot(SessionSnapshot),
    /// Lightweight notice that someone joined, sent to the rest of the room.
    PlayerJoined(PlayerJoinedNotice),
    /// Explicit rejection of the caller's last command.
    Error(ErrorNotice),
}

/// Body of [`ServerMessage::PlayerJoined`].
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedNotice {
    /// Display name of the joiner.
    pub player_name: String,
    /// Team the joiner declared, if any.
    pub team_id: Option<String>,
    /// Icon the joiner declared, if any.
    pub icon: Option<String>,
}

/// Body of [`ServerMessage::Error`].
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    /// Stable machine-readable rejection code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl From<&ServiceError> for ErrorNotice {
    fn from(err: &ServiceError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
