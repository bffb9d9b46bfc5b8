//! Command handlers mutating sessions through the store.
//!
//! Every mutation here goes through [`SessionStore::apply`] or
//! [`SessionStore::mutate`], so each read-modify-write is serialized against
//! concurrent commands and timer ticks for the same session.
//!
//! [`SessionStore::apply`]: crate::state::store::SessionStore::apply
//! [`SessionStore::mutate`]: crate::state::store::SessionStore::mutate

use tracing::info;

use crate::{
    config::DEFAULT_TEAM_ICON,
    dto::{
        session::{SessionSnapshot, SessionSummary},
        ws::{
            JoinSessionPayload, SetTeamRoundScorePayload, SubmitResponsePayload,
            UpdatePlayerSelectionPayload,
        },
    },
    error::ServiceError,
    services::round_timer,
    state::{
        SharedState,
        connections::ConnectionRole,
        session::{
            PlayerSelection, Response, Session, SessionPatch, SessionPhase, Team, TeamRoundScore,
            is_reserved_team_id, now_ms,
        },
    },
};

/// Resolve the session for `key`, creating it lazily when unknown.
///
/// First-time keys are common: clients generate the identifier themselves
/// and the first join or snapshot request materializes the session.
fn resolve_or_create(state: &SharedState, key: &str) -> Session {
    if let Some(session) = state.store().resolve(key) {
        return session;
    }
    let config = state.config();
    let session = state
        .store()
        .create(key, config.deck_len(), config.round_duration_secs());
    info!(session_id = %session.id, short_code = %session.short_code, "session created");
    session
}

/// Attach a caller to a session, creating session and team as needed.
///
/// Idempotent: re-joining with the same (team, name) neither duplicates the
/// member nor creates a second team. Admin and spectator roles, as well as
/// reserved team ids, never touch the teams collection.
pub fn join(state: &SharedState, payload: &JoinSessionPayload) -> (Session, ConnectionRole) {
    let role = ConnectionRole::from_join(payload.is_admin, payload.team_id.as_deref());
    let session = resolve_or_create(state, &payload.session_id);

    if role != ConnectionRole::Player {
        return (session, role);
    }
    let Some(team_id) = payload.team_id.as_deref().filter(|id| !is_reserved_team_id(id)) else {
        return (session, role);
    };

    let session = state
        .store()
        .mutate(&session.id, |session| {
            let changed = ensure_membership(
                state,
                session,
                team_id,
                &payload.player_name,
                payload.icon.as_deref(),
            );
            if changed {
                session.touch();
            }
            session.clone()
        })
        .unwrap_or(session);

    (session, role)
}

/// Make sure `player_name` appears exactly once in `team_id`, creating the
/// team with a fresh palette color when it does not exist yet.
fn ensure_membership(
    state: &SharedState,
    session: &mut Session,
    team_id: &str,
    player_name: &str,
    icon: Option<&str>,
) -> bool {
    if let Some(team) = session.teams.get_mut(team_id) {
        if team.players.iter().any(|existing| existing == player_name) {
            return false;
        }
        team.players.push(player_name.to_string());
        return true;
    }

    let used: Vec<&str> = session.teams.values().map(|team| team.color.as_str()).collect();
    let color = state.config().first_unused_color(&used);
    let icon = icon.unwrap_or(DEFAULT_TEAM_ICON).to_string();
    session.teams.insert(
        team_id.to_string(),
        Team::new(team_id.to_string(), color, icon, player_name.to_string()),
    );
    true
}

/// Return the full session for a resync request, creating it when unknown.
pub fn request_snapshot(state: &SharedState, key: &str) -> Session {
    resolve_or_create(state, key)
}

/// Leave the lobby: round 1, the session's first prompt, phase `playing`.
pub fn start_game(state: &SharedState, key: &str) -> Result<Session, ServiceError> {
    let config = state.config();
    state
        .store()
        .mutate(key, |session| {
            session.phase = SessionPhase::Playing;
            session.current_round = 1;
            session.current_prompt = Some(config.prompt_for_round(&session.prompt_order, 1));
            session.countdown = config.round_duration_secs();
            session.last_tick_at = now_ms();
            session.touch();
            session.clone()
        })
        .ok_or_else(|| not_found(key))
}

/// Begin the timed round: reset the countdown, clear responses and
/// selections, and hand the session to a fresh countdown timer.
///
/// The timer slot is claimed *before* the reset mutation, so a previous
/// round's timer is already superseded by the time the new countdown value
/// lands; invoking this twice leaves exactly one live timer and the second
/// call's duration in place.
pub fn start_round(
    state: &SharedState,
    key: &str,
    duration_secs: Option<u32>,
) -> Result<Session, ServiceError> {
    let id = state.store().canonical_id(key).ok_or_else(|| not_found(key))?;
    let duration = duration_secs.unwrap_or_else(|| state.config().round_duration_secs());

    let generation = state.timers().begin(&id);
    let Some(session) = state.store().mutate(&id, |session| {
        session.phase = SessionPhase::Round;
        session.countdown = duration;
        session.last_tick_at = now_ms();
        session.responses.clear();
        session.player_selections.clear();
        session.touch();
        session.clone()
    }) else {
        state.timers().finish(&id, generation);
        return Err(not_found(key));
    };

    round_timer::spawn(state.clone(), id, generation);
    info!(session_id = %session.id, duration, "round started");
    Ok(session)
}

/// Store a team's answer for the current round.
///
/// Rejected as stale when no round is running or the countdown already hit
/// zero, so the submitting client gets an explicit reason instead of a
/// silent no-op.
pub fn submit_response(
    state: &SharedState,
    payload: &SubmitResponsePayload,
) -> Result<Session, ServiceError> {
    state
        .store()
        .mutate(&payload.session_id, |session| {
            if session.phase != SessionPhase::Round {
                return Err(ServiceError::Stale("no round is in progress".into()));
            }
            if session.countdown == 0 {
                return Err(ServiceError::Stale(
                    "the round countdown has reached zero".into(),
                ));
            }

            session.responses.push(Response {
                team_id: payload.team_id.clone(),
                prompt_id: payload.prompt_id,
                text: payload.text.clone(),
                player_name: payload.player_name.clone(),
                round: session.current_round,
                submitted_at: now_ms(),
                speed_score: 0,
                quality_score: 0,
            });
            session.touch();
            Ok(session.clone())
        })
        .ok_or_else(|| not_found(&payload.session_id))?
}

/// Write a (team, round) score, replacing any earlier write for the same
/// composite, and refresh the team's running total.
pub fn set_team_round_score(
    state: &SharedState,
    payload: &SetTeamRoundScorePayload,
) -> Result<Session, ServiceError> {
    state
        .store()
        .mutate(&payload.session_id, |session| {
            session.record_score(TeamRoundScore {
                team_id: payload.team_id.clone(),
                round: payload.round_number,
                speed: payload.speed_score,
                quality: payload.quality_score,
                bonus: payload.bonus.unwrap_or(false),
                total: payload.speed_score + payload.quality_score,
            });
            session.touch();
            session.clone()
        })
        .ok_or_else(|| not_found(&payload.session_id))
}

/// Move the session to the next round's prompt.
///
/// Any running timer is cancelled before the mutation, so a cancelled tick
/// observes the phase change inside the entry lock and stops without ever
/// decrementing the new round.
pub fn advance_round(state: &SharedState, key: &str) -> Result<Session, ServiceError> {
    let id = state.store().canonical_id(key).ok_or_else(|| not_found(key))?;
    state.timers().cancel(&id);

    let config = state.config();
    state
        .store()
        .mutate(&id, |session| {
            let next_round = session.current_round + 1;
            session.current_round = next_round;
            session.current_prompt =
                Some(config.prompt_for_round(&session.prompt_order, next_round));
            session.phase = SessionPhase::Playing;
            session.responses.clear();
            session.player_selections.clear();
            session.countdown = config.round_duration_secs();
            session.last_tick_at = now_ms();
            session.touch();
            session.clone()
        })
        .ok_or_else(|| not_found(key))
}

/// End the session: stop any running timer and show the final scoreboard.
pub fn end_game(state: &SharedState, key: &str) -> Result<Session, ServiceError> {
    let id = state.store().canonical_id(key).ok_or_else(|| not_found(key))?;
    state.timers().cancel(&id);

    state
        .store()
        .apply(
            &id,
            SessionPatch {
                phase: Some(SessionPhase::Results),
                ..Default::default()
            },
        )
        .ok_or_else(|| not_found(key))
}

/// Upsert one player's in-flight prompt selection and draft answer.
pub fn update_player_selection(
    state: &SharedState,
    payload: &UpdatePlayerSelectionPayload,
) -> Result<Session, ServiceError> {
    state
        .store()
        .mutate(&payload.session_id, |session| {
            session.player_selections.insert(
                payload.player_name.clone(),
                PlayerSelection {
                    prompt_id: payload.selected_prompt,
                    draft: payload.draft_response.clone(),
                },
            );
            session.touch();
            session.clone()
        })
        .ok_or_else(|| not_found(&payload.session_id))
}

/// All live sessions as listing entries, oldest first.
pub fn list_sessions(state: &SharedState) -> Vec<SessionSummary> {
    state
        .store()
        .list()
        .iter()
        .map(SessionSummary::from)
        .collect()
}

/// Full snapshot of one session by id or short code.
pub fn get_session(state: &SharedState, key: &str) -> Result<SessionSnapshot, ServiceError> {
    state
        .store()
        .resolve(key)
        .map(|session| SessionSnapshot::from(&session))
        .ok_or_else(|| not_found(key))
}

fn not_found(key: &str) -> ServiceError {
    ServiceError::NotFound(format!("session `{key}` not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    fn shared_state() -> SharedState {
        AppState::new(AppConfig::default())
    }

    fn join_payload(session: &str, player: &str, team: Option<&str>, admin: bool) -> JoinSessionPayload {
        JoinSessionPayload {
            session_id: session.into(),
            player_name: player.into(),
            team_id: team.map(Into::into),
            icon: None,
            is_admin: admin,
        }
    }

    #[test]
    fn admin_join_then_start_game_reaches_round_one() {
        let state = shared_state();
        let (session, role) = join(&state, &join_payload("abc123000042", "Host", None, true));
        assert_eq!(role, ConnectionRole::Admin);
        assert_eq!(session.phase, SessionPhase::Lobby);
        assert!(session.teams.is_empty());

        let started = start_game(&state, "abc123000042").unwrap();
        assert_eq!(started.phase, SessionPhase::Playing);
        assert_eq!(started.current_round, 1);
        let prompt = started.current_prompt.expect("first round prompt");
        assert!(!prompt.is_empty());
    }

    #[test]
    fn two_players_share_one_team_created_once() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        let (session, _) = join(&state, &join_payload("000042", "Luis", Some("red"), false));

        assert_eq!(session.teams.len(), 1);
        let team = &session.teams["red"];
        assert_eq!(team.players, vec!["Ana".to_string(), "Luis".to_string()]);
    }

    #[test]
    fn rejoin_never_duplicates_a_member() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        let before = state.store().resolve("abc123000042").unwrap().last_update;

        let (session, _) = join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        assert_eq!(session.teams["red"].players, vec!["Ana".to_string()]);
        // An idempotent re-join changes nothing, so it does not stamp either.
        assert_eq!(session.last_update, before);
    }

    #[test]
    fn reserved_team_ids_never_become_teams() {
        let state = shared_state();
        let (session, role) =
            join(&state, &join_payload("abc123000042", "Watcher", Some("viewer"), false));
        assert_eq!(role, ConnectionRole::Spectator);
        assert!(session.teams.is_empty());
    }

    #[test]
    fn teams_get_distinct_palette_colors() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        let (session, _) = join(&state, &join_payload("abc123000042", "Bo", Some("blue"), false));

        let colors: Vec<&str> = session.teams.values().map(|team| team.color.as_str()).collect();
        assert_eq!(colors.len(), 2);
        assert_ne!(colors[0], colors[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_after_countdown_zero_is_rejected_and_unrecorded() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        start_game(&state, "abc123000042").unwrap();
        start_round(&state, "abc123000042", Some(1)).unwrap();

        // Let the single countdown second elapse and the timer finish.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let session = state.store().resolve("abc123000042").unwrap();
        assert_eq!(session.countdown, 0);

        let err = submit_response(
            &state,
            &SubmitResponsePayload {
                session_id: "abc123000042".into(),
                team_id: "red".into(),
                player_name: "Ana".into(),
                prompt_id: Some(1),
                text: "late answer".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "stale_command");

        let session = state.store().resolve("abc123000042").unwrap();
        assert!(session.responses.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_during_round_is_stored_with_round_number() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        start_game(&state, "abc123000042").unwrap();
        start_round(&state, "abc123000042", Some(60)).unwrap();

        let session = submit_response(
            &state,
            &SubmitResponsePayload {
                session_id: "000042".into(),
                team_id: "red".into(),
                player_name: "Ana".into(),
                prompt_id: None,
                text: "our answer".into(),
            },
        )
        .unwrap();

        assert_eq!(session.responses.len(), 1);
        assert_eq!(session.responses[0].round, 1);
        assert_eq!(session.responses[0].team_id, "red");
    }

    #[test]
    fn submit_outside_round_phase_is_stale() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        start_game(&state, "abc123000042").unwrap();

        let err = submit_response(
            &state,
            &SubmitResponsePayload {
                session_id: "abc123000042".into(),
                team_id: "red".into(),
                player_name: "Ana".into(),
                prompt_id: None,
                text: "too early".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "stale_command");
    }

    #[test]
    fn score_rewrite_replaces_and_updates_standing() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));

        let score = |speed, quality| SetTeamRoundScorePayload {
            session_id: "abc123000042".into(),
            team_id: "red".into(),
            round_number: 1,
            speed_score: speed,
            quality_score: quality,
            bonus: None,
        };
        set_team_round_score(&state, &score(3, 4)).unwrap();
        let session = set_team_round_score(&state, &score(5, 5)).unwrap();

        assert_eq!(session.round_scores.len(), 1);
        assert_eq!(session.round_scores[0].total, 10);
        assert_eq!(session.teams["red"].total_score, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn advance_round_stops_timer_and_moves_the_prompt() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        let started = start_game(&state, "abc123000042").unwrap();
        let first_prompt = started.current_prompt.clone().unwrap();
        start_round(&state, "abc123000042", None).unwrap();
        assert!(state.timers().is_running("abc123000042"));

        let session = advance_round(&state, "000042").unwrap();
        assert!(!state.timers().is_running("abc123000042"));
        assert_eq!(session.current_round, 2);
        assert_eq!(session.phase, SessionPhase::Playing);
        assert!(session.responses.is_empty());
        assert_ne!(session.current_prompt.as_deref(), Some(first_prompt.as_str()));
        assert_eq!(session.countdown, state.config().round_duration_secs());
    }

    #[tokio::test(start_paused = true)]
    async fn end_game_stops_timer_and_shows_results() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));
        start_game(&state, "abc123000042").unwrap();
        start_round(&state, "abc123000042", None).unwrap();

        let session = end_game(&state, "abc123000042").unwrap();
        assert_eq!(session.phase, SessionPhase::Results);
        assert!(!state.timers().is_running("abc123000042"));
    }

    #[test]
    fn commands_against_unknown_sessions_are_not_found() {
        let state = shared_state();
        assert_eq!(start_game(&state, "missing").unwrap_err().code(), "not_found");
        assert_eq!(advance_round(&state, "missing").unwrap_err().code(), "not_found");
        assert_eq!(end_game(&state, "missing").unwrap_err().code(), "not_found");
        assert_eq!(get_session(&state, "missing").unwrap_err().code(), "not_found");
    }

    #[test]
    fn selection_upsert_replaces_previous_entry() {
        let state = shared_state();
        join(&state, &join_payload("abc123000042", "Ana", Some("red"), false));

        let select = |prompt| UpdatePlayerSelectionPayload {
            session_id: "abc123000042".into(),
            player_name: "Ana".into(),
            selected_prompt: Some(prompt),
            draft_response: None,
        };
        update_player_selection(&state, &select(1)).unwrap();
        let session = update_player_selection(&state, &select(4)).unwrap();

        assert_eq!(session.player_selections.len(), 1);
        assert_eq!(session.player_selections["Ana"].prompt_id, Some(4));
    }
}
