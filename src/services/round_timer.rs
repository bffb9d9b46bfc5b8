//! Per-session countdown task: decrement once per second, broadcast, stop.

use std::time::Duration;

use tokio::time::interval;
use tracing::debug;

use crate::{
    services::websocket_service::broadcast_snapshot,
    state::{
        SharedState,
        session::{Session, SessionPhase, now_ms},
    },
};

/// Result of one tick's locked read-modify-write.
enum TickOutcome {
    /// Countdown decremented; keep ticking.
    Ticked(Session),
    /// Countdown reached zero this tick; broadcast the final snapshot and stop.
    Finished(Session),
    /// Superseded, phase drifted, or countdown already at zero; stop silently
    /// (whatever changed the session already broadcast its own snapshot).
    Stopped,
}

/// Spawn the countdown task for a session.
///
/// `generation` must come from [`TimerRegistry::begin`]; the task stops
/// silently the moment it is no longer the session's current timer, and the
/// generation is re-checked inside the store entry lock so a superseded task
/// can never decrement the session, even when cancellation races a tick.
///
/// [`TimerRegistry::begin`]: crate::state::timers::TimerRegistry::begin
pub fn spawn(state: SharedState, session_id: String, generation: u64) {
    tokio::spawn(run(state, session_id, generation));
}

async fn run(state: SharedState, session_id: String, generation: u64) {
    let mut ticker = interval(Duration::from_secs(1));
    // The first interval tick completes immediately; consume it so the first
    // decrement lands a full second after the round started.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let outcome = state.store().mutate(&session_id, |session| {
            if !state.timers().is_current(&session_id, generation) {
                return TickOutcome::Stopped;
            }
            if session.phase != SessionPhase::Round {
                return TickOutcome::Stopped;
            }
            if session.countdown == 0 {
                return TickOutcome::Stopped;
            }

            session.countdown -= 1;
            session.last_tick_at = now_ms();
            session.touch();
            if session.countdown == 0 {
                TickOutcome::Finished(session.clone())
            } else {
                TickOutcome::Ticked(session.clone())
            }
        });

        match outcome {
            Some(TickOutcome::Ticked(session)) => broadcast_snapshot(&state, &session),
            Some(TickOutcome::Finished(session)) => {
                broadcast_snapshot(&state, &session);
                debug!(session_id = %session.id, "round countdown finished");
                break;
            }
            Some(TickOutcome::Stopped) | None => break,
        }
    }

    state.timers().finish(&session_id, generation);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        services::session_service,
        state::{AppState, session::SessionPatch},
    };

    fn playing_session(state: &SharedState, id: &str) {
        state.store().create(
            id,
            state.config().deck_len(),
            state.config().round_duration_secs(),
        );
        session_service::start_game(state, id).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_clamps_at_zero_and_timer_stops() {
        let state = AppState::new(AppConfig::default());
        playing_session(&state, "abc123000042");
        session_service::start_round(&state, "abc123000042", Some(180)).unwrap();

        tokio::time::sleep(Duration::from_secs(181)).await;

        let session = state.store().resolve("abc123000042").unwrap();
        assert_eq!(session.countdown, 0);
        assert!(!state.timers().is_running("abc123000042"));
        // The timer stops on its own; ending the round is the admin's call.
        assert_eq!(session.phase, SessionPhase::Round);
    }

    #[tokio::test(start_paused = true)]
    async fn each_tick_decrements_and_stamps() {
        let state = AppState::new(AppConfig::default());
        playing_session(&state, "abc123000042");
        let started = session_service::start_round(&state, "abc123000042", Some(120)).unwrap();

        tokio::time::sleep(Duration::from_millis(5500)).await;

        let session = state.store().resolve("abc123000042").unwrap();
        assert_eq!(session.countdown, 115);
        assert!(session.last_update > started.last_update);
        assert!(state.timers().is_running("abc123000042"));
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_leaves_one_timer_and_second_duration_wins() {
        let state = AppState::new(AppConfig::default());
        playing_session(&state, "abc123000042");
        session_service::start_round(&state, "abc123000042", Some(180)).unwrap();
        session_service::start_round(&state, "abc123000042", Some(60)).unwrap();

        assert_eq!(state.timers().active_count(), 1);

        tokio::time::sleep(Duration::from_millis(5500)).await;

        // A double-decrement race would leave the countdown below 55.
        let session = state.store().resolve("abc123000042").unwrap();
        assert_eq!(session.countdown, 55);
        assert_eq!(state.timers().active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn phase_drift_stops_the_timer_without_mutation() {
        let state = AppState::new(AppConfig::default());
        playing_session(&state, "abc123000042");
        session_service::start_round(&state, "abc123000042", Some(120)).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // An external command moves the session out of the round phase
        // without going through advance_round/end_game.
        let drifted = state
            .store()
            .apply(
                "abc123000042",
                SessionPatch {
                    phase: Some(SessionPhase::Playing),
                    ..Default::default()
                },
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;

        let session = state.store().resolve("abc123000042").unwrap();
        assert_eq!(session.countdown, 118);
        assert_eq!(session.last_update, drifted.last_update);
        assert!(!state.timers().is_running("abc123000042"));
    }

    #[tokio::test(start_paused = true)]
    async fn timers_on_two_sessions_run_independently() {
        let state = AppState::new(AppConfig::default());
        playing_session(&state, "aaa-000001");
        playing_session(&state, "bbb-000002");
        session_service::start_round(&state, "aaa-000001", Some(100)).unwrap();
        session_service::start_round(&state, "bbb-000002", Some(10)).unwrap();

        tokio::time::sleep(Duration::from_millis(11500)).await;

        assert_eq!(state.store().resolve("aaa-000001").unwrap().countdown, 89);
        assert_eq!(state.store().resolve("bbb-000002").unwrap().countdown, 0);
        assert!(state.timers().is_running("aaa-000001"));
        assert!(!state.timers().is_running("bbb-000002"));
    }
}
