//! Projections of the session aggregate exposed to REST and WebSocket clients.

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::format_epoch_ms,
    state::session::{PlayerSelection, Response, Session, SessionPhase, Team, TeamRoundScore},
};

/// Wire representation of the session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PhaseDto {
    /// Waiting for teams.
    Lobby,
    /// Between rounds.
    Playing,
    /// Timed round in progress.
    Round,
    /// Final scoreboard.
    Results,
}

impl From<SessionPhase> for PhaseDto {
    fn from(phase: SessionPhase) -> Self {
        match phase {
            SessionPhase::Lobby => Self::Lobby,
            SessionPhase::Playing => Self::Playing,
            SessionPhase::Round => Self::Round,
            SessionPhase::Results => Self::Results,
        }
    }
}

/// Public projection of a team.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    /// Team identifier, doubling as its display name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Assigned hex color.
    pub color: String,
    /// Assigned emoji.
    pub icon: String,
    /// Member display names.
    pub players: Vec<String>,
    /// Running total across all rounds.
    pub total_score: i32,
}

impl From<(&String, &Team)> for TeamSummary {
    fn from((id, team): (&String, &Team)) -> Self {
        Self {
            id: id.clone(),
            name: team.name.clone(),
            color: team.color.clone(),
            icon: team.icon.clone(),
            players: team.players.clone(),
            total_score: team.total_score,
        }
    }
}

/// One submitted response as carried inside snapshots.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDto {
    /// Submitting team.
    pub team_id: String,
    /// Prompt the response answers, if one was selected.
    pub prompt_id: Option<u32>,
    /// Free-text answer.
    pub text: String,
    /// Submitting player's name.
    pub player_name: String,
    /// Round the response belongs to.
    pub round: u32,
    /// Submission timestamp (ms since epoch).
    pub submitted_at: u64,
    /// Speed sub-score.
    pub speed_score: i32,
    /// Quality sub-score.
    pub quality_score: i32,
}

impl From<&Response> for ResponseDto {
    fn from(response: &Response) -> Self {
        Self {
            team_id: response.team_id.clone(),
            prompt_id: response.prompt_id,
            text: response.text.clone(),
            player_name: response.player_name.clone(),
            round: response.round,
            submitted_at: response.submitted_at,
            speed_score: response.speed_score,
            quality_score: response.quality_score,
        }
    }
}

/// One (team, round) score entry as carried inside snapshots.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamRoundScoreDto {
    /// Scored team.
    pub team_id: String,
    /// Scored round.
    pub round_number: u32,
    /// Speed component.
    pub speed_score: i32,
    /// Quality component.
    pub quality_score: i32,
    /// Bonus flag.
    pub bonus: bool,
    /// Derived total.
    pub total_score: i32,
}

impl From<&TeamRoundScore> for TeamRoundScoreDto {
    fn from(score: &TeamRoundScore) -> Self {
        Self {
            team_id: score.team_id.clone(),
            round_number: score.round,
            speed_score: score.speed,
            quality_score: score.quality,
            bonus: score.bonus,
            total_score: score.total,
        }
    }
}

/// One player's pre-submission selection state.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSelectionDto {
    /// Selected prompt, if any.
    pub selected_prompt: Option<u32>,
    /// Draft answer being composed.
    pub draft_response: Option<String>,
}

impl From<&PlayerSelection> for PlayerSelectionDto {
    fn from(selection: &PlayerSelection) -> Self {
        Self {
            selected_prompt: selection.prompt_id,
            draft_response: selection.draft.clone(),
        }
    }
}

/// Full state of one session, sent to clients after every mutation.
///
/// Clients replace their entire local view with each snapshot rather than
/// patching it, so this is always the complete aggregate.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Canonical session identifier.
    pub id: String,
    /// Human-enterable short code.
    pub short_code: String,
    /// Current phase.
    pub phase: PhaseDto,
    /// Current round (0 = not started).
    pub current_round: u32,
    /// Teams in join order.
    pub teams: Vec<TeamSummary>,
    /// Responses of the current round.
    pub responses: Vec<ResponseDto>,
    /// Score table across all rounds.
    pub round_scores: Vec<TeamRoundScoreDto>,
    /// Prompt of the active round.
    pub current_prompt: Option<String>,
    /// Remaining countdown seconds.
    pub countdown: u32,
    /// Timestamp of the last countdown tick (ms since epoch).
    pub last_tick_at: u64,
    /// Per-player selections.
    pub player_selections: IndexMap<String, PlayerSelectionDto>,
    /// Creation timestamp (ms since epoch).
    pub created_at: u64,
    /// Monotonic mutation stamp; strictly greater after every change.
    pub last_update: u64,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            short_code: session.short_code.clone(),
            phase: session.phase.into(),
            current_round: session.current_round,
            teams: session.teams.iter().map(TeamSummary::from).collect(),
            responses: session.responses.iter().map(ResponseDto::from).collect(),
            round_scores: session
                .round_scores
                .iter()
                .map(TeamRoundScoreDto::from)
                .collect(),
            current_prompt: session.current_prompt.clone(),
            countdown: session.countdown,
            last_tick_at: session.last_tick_at,
            player_selections: session
                .player_selections
                .iter()
                .map(|(player, selection)| (player.clone(), PlayerSelectionDto::from(selection)))
                .collect(),
            created_at: session.created_at,
            last_update: session.last_update,
        }
    }
}

/// Compact listing entry for the read-only session index.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Canonical session identifier.
    pub id: String,
    /// Human-enterable short code.
    pub short_code: String,
    /// Current phase.
    pub phase: PhaseDto,
    /// Current round.
    pub current_round: u32,
    /// Teams in join order.
    pub teams: Vec<TeamSummary>,
    /// Creation time, RFC3339.
    pub created_at: String,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            short_code: session.short_code.clone(),
            phase: session.phase.into(),
            current_round: session.current_round,
            teams: session.teams.iter().map(TeamSummary::from).collect(),
            created_at: format_epoch_ms(session.created_at),
        }
    }
}
