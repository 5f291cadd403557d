//! Registry of live dialog sessions.
//!
//! Each session sits behind its own lock so that requests for the same
//! session id run one at a time while different sessions proceed
//! independently. The map lock is never held while waiting on a session
//! lock.

use crate::dialog::CompletedSession;
use crate::{DialogState, Error, Result, Session};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct SessionEntry {
    /// `None` once the session was removed or replaced
    session: Option<Session>,
    created_at: DateTime<Utc>,
    last_touched: DateTime<Utc>,
}

type Slot = Arc<Mutex<SessionEntry>>;

/// Result of [`SessionRegistry::update`]
#[derive(Debug)]
pub struct Update<T> {
    pub value: T,
    /// Set when the update answered the last question; the session has
    /// already been removed from the registry
    pub completed: Option<CompletedSession>,
}

/// Keyed storage of active sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Slot>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::State("session registry lock poisoned".into()))
}

fn session_not_found(session_id: &str) -> Error {
    Error::SessionNotFound(session_id.to_string())
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` under its id, replacing any session already there
    pub fn create(&self, session: Session) -> Result<()> {
        let now = Utc::now();
        let session_id = session.session_id.clone();
        let slot = Arc::new(Mutex::new(SessionEntry {
            session: Some(session),
            created_at: now,
            last_touched: now,
        }));

        let replaced = lock(&self.sessions)?.insert(session_id.clone(), slot);

        if let Some(old) = replaced {
            // Requests still waiting on the old session must see it as gone
            lock(&old)?.session = None;
            tracing::warn!("Session '{}' replaced by a new conversation", session_id);
        } else {
            tracing::debug!("Created session '{}'", session_id);
        }
        Ok(())
    }

    /// Snapshot of a live session
    pub fn get(&self, session_id: &str) -> Result<Session> {
        let slot = self.slot(session_id)?;
        let mut entry = lock(&slot)?;
        entry.last_touched = Utc::now();
        entry
            .session
            .clone()
            .ok_or_else(|| session_not_found(session_id))
    }

    /// Remove a session, returning it if it was live
    pub fn remove(&self, session_id: &str) -> Result<Option<Session>> {
        let slot = lock(&self.sessions)?.remove(session_id);
        match slot {
            Some(slot) => {
                let session = lock(&slot)?.session.take();
                tracing::debug!("Removed session '{}'", session_id);
                Ok(session)
            }
            None => Ok(None),
        }
    }

    /// Run `f` on a session while holding its lock
    ///
    /// If `f` fails the session is left as `f` left it; [`Session`]'s own
    /// operations guarantee that is unchanged. A session that reaches
    /// [`DialogState::Complete`] is removed before the lock is released and
    /// returned in [`Update::completed`].
    pub fn update<T, F>(&self, session_id: &str, f: F) -> Result<Update<T>>
    where
        F: FnOnce(&mut Session) -> Result<T>,
    {
        let slot = self.slot(session_id)?;
        let mut entry = lock(&slot)?;
        entry.last_touched = Utc::now();

        let session = entry
            .session
            .as_mut()
            .ok_or_else(|| session_not_found(session_id))?;
        let value = f(session)?;

        if session.state() != DialogState::Complete {
            return Ok(Update {
                value,
                completed: None,
            });
        }

        {
            let mut sessions = lock(&self.sessions)?;
            // Only drop the map entry if it is still ours
            if sessions
                .get(session_id)
                .is_some_and(|current| Arc::ptr_eq(current, &slot))
            {
                sessions.remove(session_id);
            }
        }

        let completed = match entry.session.take() {
            Some(session) => Some(session.finish()?),
            None => None,
        };
        tracing::debug!("Session '{}' completed and removed", session_id);
        Ok(Update { value, completed })
    }

    /// Remove sessions untouched for longer than `max_idle` as of `now`
    ///
    /// Sessions busy in another request are skipped. Returns how many were
    /// evicted.
    pub fn evict_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> Result<usize> {
        let mut evicted = Vec::new();
        {
            let mut sessions = lock(&self.sessions)?;
            sessions.retain(|id, slot| {
                let Ok(mut entry) = slot.try_lock() else {
                    return true;
                };
                if now - entry.last_touched <= max_idle {
                    return true;
                }
                tracing::debug!(
                    "Evicting session '{}' (created {}, idle since {})",
                    id,
                    entry.created_at,
                    entry.last_touched
                );
                entry.session = None;
                evicted.push(id.clone());
                false
            });
        }

        if !evicted.is_empty() {
            tracing::info!("Evicted {} idle sessions", evicted.len());
        }
        Ok(evicted.len())
    }

    /// Number of live sessions
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.sessions)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn slot(&self, session_id: &str) -> Result<Slot> {
        lock(&self.sessions)?
            .get(session_id)
            .cloned()
            .ok_or_else(|| session_not_found(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_default_catalog, NextStep};
    use std::thread;

    fn start(id: &str, problem: &str) -> Session {
        let catalog = build_default_catalog();
        Session::start(&catalog, id, problem).unwrap().0
    }

    #[test]
    fn test_create_and_get() {
        let registry = SessionRegistry::new();
        registry.create(start("s1", "headache")).unwrap();

        let session = registry.get("s1").unwrap();
        assert_eq!(session.problem_id, "headache");
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let registry = SessionRegistry::new();
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(ref id) if id == "nope"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_create_overwrites() {
        let registry = SessionRegistry::new();
        registry.create(start("s1", "headache")).unwrap();
        registry.update("s1", |s| s.answer(0)).unwrap();

        registry.create(start("s1", "fever")).unwrap();
        let session = registry.get("s1").unwrap();
        assert_eq!(session.problem_id, "fever");
        assert_eq!(session.cursor(), 0);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = SessionRegistry::new();
        registry.create(start("s1", "headache")).unwrap();

        assert!(registry.remove("s1").unwrap().is_some());
        assert!(registry.get("s1").is_err());
        assert!(registry.remove("s1").unwrap().is_none());
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_update_removes_completed_session() {
        let registry = SessionRegistry::new();
        registry.create(start("s1", "cough")).unwrap();

        let update = registry.update("s1", |s| s.answer(2)).unwrap();
        assert_eq!(update.value, NextStep::Complete);
        let completed = update.completed.unwrap();
        assert_eq!(completed.problem_id, "cough");
        assert_eq!(completed.answers.len(), 1);

        assert!(registry.get("s1").is_err());
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_failed_update_keeps_session() {
        let registry = SessionRegistry::new();
        registry.create(start("s1", "cough")).unwrap();

        let result = registry.update("s1", |s| s.answer(9));
        assert!(matches!(result, Err(Error::InvalidIndex { .. })));

        let session = registry.get("s1").unwrap();
        assert_eq!(session.cursor(), 0);
        assert!(session.answers().is_empty());
    }

    #[test]
    fn test_update_missing_session() {
        let registry = SessionRegistry::new();
        let result = registry.update("ghost", |s| s.answer(0));
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_evict_idle() {
        let registry = SessionRegistry::new();
        registry.create(start("s1", "headache")).unwrap();
        registry.create(start("s2", "fever")).unwrap();

        let evicted = registry.evict_idle(Utc::now(), Duration::minutes(30)).unwrap();
        assert_eq!(evicted, 0);

        let later = Utc::now() + Duration::hours(1);
        let evicted = registry.evict_idle(later, Duration::minutes(30)).unwrap();
        assert_eq!(evicted, 2);
        assert!(registry.get("s1").is_err());
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_concurrent_answers_are_serialized() {
        let registry = Arc::new(SessionRegistry::new());
        registry.create(start("shared", "fever")).unwrap();

        // Every thread submits an answer for question 1; exactly one wins
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.update("shared", |s| s.answer_at(0, 0)).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);

        let session = registry.get("shared").unwrap();
        assert_eq!(session.cursor(), 1);
        assert_eq!(session.answers().len(), 1);
    }

    #[test]
    fn test_independent_sessions_in_parallel() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let id = format!("s{}", i);
                    registry.create(start(&id, "headache")).unwrap();
                    registry.update(&id, |s| s.answer(0)).unwrap();
                    registry.update(&id, |s| s.answer(1)).unwrap().completed
                })
            })
            .collect();

        for handle in handles {
            let completed = handle.join().unwrap().unwrap();
            assert_eq!(completed.answers.len(), 2);
        }
        assert!(registry.is_empty().unwrap());
    }
}
