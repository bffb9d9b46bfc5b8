//! Session aggregate and the partial-update patch applied through the store.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::seq::SliceRandom;

/// Team identifiers that act as roles rather than playable teams.
///
/// Connections declaring one of these never create a team entry, accumulate
/// members, or score.
pub const RESERVED_TEAM_IDS: [&str; 2] = ["admin", "viewer"];

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for teams to assemble; nothing has started yet.
    Lobby,
    /// Game started, between rounds (prompt visible, countdown idle).
    Playing,
    /// A timed round is in progress.
    Round,
    /// Final scoreboard; no further rounds.
    Results,
}

impl SessionPhase {
    /// Wire/display name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Playing => "playing",
            Self::Round => "round",
            Self::Results => "results",
        }
    }
}

/// A named group of players sharing one response and one score per round.
#[derive(Debug, Clone)]
pub struct Team {
    /// Display name; identical to the team id chosen by the first joiner.
    pub name: String,
    /// Hex color assigned at creation from the configured palette.
    pub color: String,
    /// Emoji shown next to the team name.
    pub icon: String,
    /// Member display names, each present exactly once.
    pub players: Vec<String>,
    /// Running total across all rounds, maintained by score writes.
    pub total_score: i32,
}

impl Team {
    /// Build a fresh team with a single founding member.
    pub fn new(name: String, color: String, icon: String, founder: String) -> Self {
        Self {
            name,
            color,
            icon,
            players: vec![founder],
            total_score: 0,
        }
    }
}

/// One answer submitted by a team during a round.
#[derive(Debug, Clone)]
pub struct Response {
    /// Team the response belongs to.
    pub team_id: String,
    /// Prompt the team chose to answer, if any.
    pub prompt_id: Option<u32>,
    /// Free-text answer.
    pub text: String,
    /// Name of the submitting player.
    pub player_name: String,
    /// Round the response was submitted in.
    pub round: u32,
    /// Submission timestamp (ms since epoch).
    pub submitted_at: u64,
    /// Speed sub-score, assigned later by the scorer.
    pub speed_score: i32,
    /// Quality sub-score, assigned later by the scorer.
    pub quality_score: i32,
}

/// Score for one (team, round) composite. Writing the same composite replaces.
#[derive(Debug, Clone)]
pub struct TeamRoundScore {
    /// Scored team.
    pub team_id: String,
    /// Scored round.
    pub round: u32,
    /// Speed component.
    pub speed: i32,
    /// Quality component.
    pub quality: i32,
    /// Whether a bonus was awarded on top of the components.
    pub bonus: bool,
    /// Derived total for this round.
    pub total: i32,
}

/// A player's in-flight prompt selection and draft answer, pre-submission.
#[derive(Debug, Clone, Default)]
pub struct PlayerSelection {
    /// Prompt currently selected by the player.
    pub prompt_id: Option<u32>,
    /// Draft answer text being composed.
    pub draft: Option<String>,
}

/// Aggregate root for one play-through. Mutated exclusively through
/// [`SessionStore`](super::store::SessionStore) operations.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque canonical identifier (caller supplied on first reference).
    pub id: String,
    /// Fixed-length suffix of `id`, used for human entry.
    pub short_code: String,
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Round number; 0 means the game has not started.
    pub current_round: u32,
    /// Participating teams, in join order, keyed by team id.
    pub teams: IndexMap<String, Team>,
    /// Responses submitted in the current round; cleared on round start.
    pub responses: Vec<Response>,
    /// Per-(team, round) score table across the whole session.
    pub round_scores: Vec<TeamRoundScore>,
    /// Prompt for the active round.
    pub current_prompt: Option<String>,
    /// Shuffled indices into the prompt deck, fixed at session creation.
    pub prompt_order: Vec<usize>,
    /// Remaining seconds of the active round's countdown.
    pub countdown: u32,
    /// Timestamp of the last countdown tick (ms since epoch).
    pub last_tick_at: u64,
    /// Per-player pre-submission selections; cleared on round start.
    pub player_selections: IndexMap<String, PlayerSelection>,
    /// Creation timestamp (ms since epoch).
    pub created_at: u64,
    /// Monotonic mutation stamp; strictly increases on every applied change.
    pub last_update: u64,
}

impl Session {
    /// Build a new session in the lobby state.
    ///
    /// The prompt order is shuffled once here so each session walks the deck
    /// in its own sequence while the deck itself stays shared and immutable.
    pub fn new(id: &str, code_len: usize, deck_len: usize, round_duration: u32) -> Self {
        let now = now_ms();
        let mut prompt_order: Vec<usize> = (0..deck_len).collect();
        if prompt_order.len() > 1 {
            prompt_order.shuffle(&mut rand::rng());
        }

        Self {
            id: id.to_string(),
            short_code: short_code_of(id, code_len),
            phase: SessionPhase::Lobby,
            current_round: 0,
            teams: IndexMap::new(),
            responses: Vec::new(),
            round_scores: Vec::new(),
            current_prompt: None,
            prompt_order,
            countdown: round_duration,
            last_tick_at: now,
            player_selections: IndexMap::new(),
            created_at: now,
            last_update: now,
        }
    }

    /// Stamp a new `last_update`, strictly greater than the previous one even
    /// when the wall clock has not advanced a full millisecond.
    pub fn touch(&mut self) {
        self.last_update = now_ms().max(self.last_update + 1);
    }

    /// Record a (team, round) score, replacing any prior write for the same
    /// composite, and refresh the team's running total.
    pub fn record_score(&mut self, score: TeamRoundScore) {
        let team_id = score.team_id.clone();
        match self
            .round_scores
            .iter_mut()
            .find(|existing| existing.team_id == score.team_id && existing.round == score.round)
        {
            Some(slot) => *slot = score,
            None => self.round_scores.push(score),
        }

        let standing = self.team_standing(&team_id);
        if let Some(team) = self.teams.get_mut(&team_id) {
            team.total_score = standing;
        }
    }

    /// Overall standing for a team: sum of its per-round totals.
    pub fn team_standing(&self, team_id: &str) -> i32 {
        self.round_scores
            .iter()
            .filter(|score| score.team_id == team_id)
            .map(|score| score.total)
            .sum()
    }
}

/// Partial update merged into a session by [`SessionStore::apply`].
///
/// Shallow-merge semantics: a present field replaces the prior value
/// wholesale, an absent field is untouched. `current_prompt` is doubly
/// optional so a patch can distinguish "leave as is" from "clear".
///
/// [`SessionStore::apply`]: super::store::SessionStore::apply
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New phase.
    pub phase: Option<SessionPhase>,
    /// New round number.
    pub current_round: Option<u32>,
    /// Replacement teams collection.
    pub teams: Option<IndexMap<String, Team>>,
    /// Replacement responses list.
    pub responses: Option<Vec<Response>>,
    /// Replacement score table.
    pub round_scores: Option<Vec<TeamRoundScore>>,
    /// New active prompt (`Some(None)` clears it).
    pub current_prompt: Option<Option<String>>,
    /// New countdown value.
    pub countdown: Option<u32>,
    /// New last-tick timestamp.
    pub last_tick_at: Option<u64>,
    /// Replacement player selections map.
    pub player_selections: Option<IndexMap<String, PlayerSelection>>,
}

impl SessionPatch {
    /// Merge this patch into `session`. Does not stamp `last_update`; the
    /// store does that once per applied mutation.
    pub fn merge_into(self, session: &mut Session) {
        if let Some(phase) = self.phase {
            session.phase = phase;
        }
        if let Some(round) = self.current_round {
            session.current_round = round;
        }
        if let Some(teams) = self.teams {
            session.teams = teams;
        }
        if let Some(responses) = self.responses {
            session.responses = responses;
        }
        if let Some(scores) = self.round_scores {
            session.round_scores = scores;
        }
        if let Some(prompt) = self.current_prompt {
            session.current_prompt = prompt;
        }
        if let Some(countdown) = self.countdown {
            session.countdown = countdown;
        }
        if let Some(tick) = self.last_tick_at {
            session.last_tick_at = tick;
        }
        if let Some(selections) = self.player_selections {
            session.player_selections = selections;
        }
    }
}

/// Derive the human-enterable short code: the last `len` characters of the
/// identifier (the whole identifier when it is shorter than that).
pub fn short_code_of(id: &str, len: usize) -> String {
    let chars: Vec<char> = id.chars().collect();
    let start = chars.len().saturating_sub(len);
    chars[start..].iter().collect()
}

/// Whether a declared team id is a role marker rather than a real team.
pub fn is_reserved_team_id(team_id: &str) -> bool {
    RESERVED_TEAM_IDS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(team_id))
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
