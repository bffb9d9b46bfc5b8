//! In-memory session registry with a derived short-code fallback lookup.

use dashmap::DashMap;

use crate::state::session::{Session, SessionPatch};

/// Single source of truth for session data. No I/O, no timers.
///
/// Sessions are keyed by their full identifier; short-code resolution scans
/// the map, which is fine at the tens-of-sessions scale this server targets.
/// Entries are never removed: sessions live until the process exits, a
/// documented limitation of the in-memory registry.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    code_len: usize,
}

impl SessionStore {
    /// Build an empty store deriving short codes of `code_len` characters.
    pub fn new(code_len: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            code_len,
        }
    }

    /// Register a new lobby-state session under `id`, or return the existing
    /// one. Creation is atomic with the existence check, so two first joins
    /// racing on a brand-new id land in the same session.
    ///
    /// When a session with a colliding short code already exists, the newer
    /// session wins code lookups (codes are derived, not chosen, so
    /// last-writer-wins is the documented collision policy).
    pub fn create(&self, id: &str, deck_len: usize, round_duration: u32) -> Session {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id, self.code_len, deck_len, round_duration))
            .clone()
    }

    /// Resolve `key` as an exact identifier first, then as a short code.
    ///
    /// Returns a clone of the session, or `None` for unknown keys; callers
    /// treat `None` as a normal outcome since sessions are created lazily.
    pub fn resolve(&self, key: &str) -> Option<Session> {
        let id = self.canonical_id(key)?;
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Map an id-or-code key to the full session identifier.
    ///
    /// Code matches prefer the most recently created session, so a rare
    /// collision between two live sessions resolves to the newer one.
    pub fn canonical_id(&self, key: &str) -> Option<String> {
        if self.sessions.contains_key(key) {
            return Some(key.to_string());
        }
        self.sessions
            .iter()
            .filter(|entry| entry.value().short_code == key)
            .max_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone())
    }

    /// Shallow-merge `patch` into the session resolved from `key` and stamp a
    /// fresh `last_update`. Returns the updated session, or `None` when the
    /// key does not resolve.
    pub fn apply(&self, key: &str, patch: SessionPatch) -> Option<Session> {
        let id = self.canonical_id(key)?;
        let mut entry = self.sessions.get_mut(&id)?;
        patch.merge_into(entry.value_mut());
        entry.value_mut().touch();
        Some(entry.value().clone())
    }

    /// Run `mutate` against the session resolved from `key` while holding its
    /// map entry lock, serializing the read-modify-write against concurrent
    /// commands and timer ticks.
    ///
    /// The closure must call [`Session::touch`] itself when it changes the
    /// session, so rejected operations do not bump `last_update`.
    pub fn mutate<T>(&self, key: &str, mutate: impl FnOnce(&mut Session) -> T) -> Option<T> {
        let id = self.canonical_id(key)?;
        let mut entry = self.sessions.get_mut(&id)?;
        Some(mutate(entry.value_mut()))
    }

    /// Clone every live session, ordered by creation time.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|session| session.created_at);
        sessions
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session has been created yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::{SessionPhase, Team};

    fn store() -> SessionStore {
        SessionStore::new(6)
    }

    #[test]
    fn resolve_by_id_and_code_hit_the_same_session() {
        let store = store();
        store.create("abc123000042", 8, 150);

        let by_id = store.resolve("abc123000042").expect("by id");
        let by_code = store.resolve("000042").expect("by code");
        assert_eq!(by_id.id, by_code.id);
        assert_eq!(by_code.short_code, "000042");
    }

    #[test]
    fn unknown_key_is_a_none_sentinel() {
        let store = store();
        assert!(store.resolve("missing").is_none());
        assert!(store.apply("missing", SessionPatch::default()).is_none());
        assert!(store.mutate("missing", |_| ()).is_none());
    }

    #[test]
    fn racing_create_keeps_the_first_session() {
        let store = store();
        store.create("abc123000042", 4, 150);
        store
            .mutate("abc123000042", |session| {
                session.teams.insert(
                    "red".into(),
                    Team::new("red".into(), "#ff0000".into(), "❓".into(), "Ana".into()),
                );
                session.touch();
            })
            .unwrap();

        // A second joiner that lost the resolve/create race must land in the
        // session the first joiner already populated.
        let raced = store.create("abc123000042", 4, 150);
        assert_eq!(raced.teams.len(), 1);
        assert_eq!(raced.teams["red"].players, vec!["Ana".to_string()]);
    }

    #[test]
    fn code_collision_resolves_to_newest_session() {
        let store = store();
        let first = store.create("aaa-000042", 0, 150);
        // Force distinct creation stamps without sleeping.
        store
            .mutate("aaa-000042", |session| session.created_at = first.created_at.saturating_sub(10))
            .unwrap();
        store.create("bbb-000042", 0, 150);

        let resolved = store.resolve("000042").expect("collision resolves");
        assert_eq!(resolved.id, "bbb-000042");
        // Exact ids still resolve to their own session.
        assert_eq!(store.resolve("aaa-000042").unwrap().id, "aaa-000042");
    }

    #[test]
    fn apply_merges_and_bumps_last_update() {
        let store = store();
        let created = store.create("abc123000042", 4, 150);

        let updated = store
            .apply(
                "000042",
                SessionPatch {
                    phase: Some(SessionPhase::Playing),
                    current_round: Some(1),
                    ..Default::default()
                },
            )
            .expect("apply by code");

        assert_eq!(updated.phase, SessionPhase::Playing);
        assert_eq!(updated.current_round, 1);
        assert!(updated.last_update > created.last_update);
        // Fields absent from the patch are untouched.
        assert_eq!(updated.countdown, created.countdown);
        assert_eq!(updated.prompt_order, created.prompt_order);
    }

    #[test]
    fn list_orders_by_creation() {
        let store = store();
        let a = store.create("first-000001", 0, 150);
        store
            .mutate("first-000001", |session| {
                session.created_at = a.created_at.saturating_sub(5)
            })
            .unwrap();
        store.create("second-000002", 0, 150);

        let ids: Vec<String> = store.list().into_iter().map(|session| session.id).collect();
        assert_eq!(ids, vec!["first-000001", "second-000002"]);
    }
}
