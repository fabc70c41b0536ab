//! Round state machine: creation, convergence on "is this round new to me",
//! the per-user result view and the identity reveal merge.

use crate::error::{SessionError, SessionResult};
use crate::store::{RoundRow, SessionStore};
use crate::types::{Participant, RoundIdentity, RoundPayload, SessionCode};
use crate::words;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How long the secret word stays visible after a peek before re-hiding.
/// Local presentation behavior, never persisted.
pub const WORD_PEEK_REHIDE: Duration = Duration::from_secs(2);

/// What the current user gets to see for the active round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundView {
    /// This user is the impostor; they never see the secret word.
    Impostor { category: String },
    Word { category: String, element: String },
}

/// Outcome of a round refresh, in increasing order of consequence.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundUpdate {
    /// No active round row exists.
    NoRound,
    /// Same round, same payload: a no-op render.
    Unchanged,
    /// Same round, but the reveal map changed (someone revealed).
    RevealsChanged(RoundRow),
    /// A round this user has not been shown yet.
    NewRound(RoundRow),
}

/// Per-page round state. The "already shown" tracking lives only in memory:
/// a page reload re-shows the active round once, by design.
pub struct RoundEngine {
    store: Arc<SessionStore>,
    code: SessionCode,
    user_name: String,
    current: Option<RoundRow>,
    last_shown: Option<RoundIdentity>,
}

impl RoundEngine {
    pub fn new(store: Arc<SessionStore>, code: SessionCode, user_name: String) -> RoundEngine {
        RoundEngine {
            store,
            code,
            user_name,
            current: None,
            last_shown: None,
        }
    }

    pub fn current(&self) -> Option<&RoundRow> {
        self.current.as_ref()
    }

    pub fn has_active_round(&self) -> bool {
        self.current.as_ref().is_some_and(|r| r.payload.active)
    }

    /// Whether this user already revealed in the current round.
    pub fn has_revealed_self(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|r| r.payload.has_revealed(&self.user_name))
    }

    /// The personalized result for the current round, if one is active.
    pub fn personal_view(&self) -> Option<RoundView> {
        let round = self.current.as_ref().filter(|r| r.payload.active)?;
        Some(Self::view_for(&round.payload, &self.user_name))
    }

    fn view_for(payload: &RoundPayload, user: &str) -> RoundView {
        if payload.impostor == user {
            RoundView::Impostor {
                category: payload.category.clone(),
            }
        } else {
            RoundView::Word {
                category: payload.category.clone(),
                element: payload.element.clone(),
            }
        }
    }

    /// Fetch the latest round row and classify it against what this page
    /// has already shown. Fetching the same unmodified row twice yields
    /// `Unchanged` and must not re-trigger the reveal flow.
    pub async fn refresh(&mut self) -> SessionResult<RoundUpdate> {
        let Some(fresh) = self.store.latest_round(self.code).await? else {
            self.current = None;
            return Ok(RoundUpdate::NoRound);
        };
        if !fresh.payload.active {
            self.current = None;
            return Ok(RoundUpdate::NoRound);
        }

        let identity = RoundIdentity::of(&fresh.payload);
        if self.last_shown.as_ref() == Some(&identity) {
            let changed = self
                .current
                .as_ref()
                .map(|c| c.payload != fresh.payload)
                .unwrap_or(true);
            self.current = Some(fresh.clone());
            if changed {
                return Ok(RoundUpdate::RevealsChanged(fresh));
            }
            return Ok(RoundUpdate::Unchanged);
        }

        self.last_shown = Some(identity);
        self.current = Some(fresh.clone());
        Ok(RoundUpdate::NewRound(fresh))
    }

    /// Start a new round: pick one element uniformly from the category and
    /// one impostor uniformly from the roster, then append a new round row.
    ///
    /// Nothing transitions locally on failure; the new round reaches every
    /// client (this one included) through the normal refresh path.
    pub async fn start(
        &mut self,
        roster: &[Participant],
        category_name: &str,
    ) -> SessionResult<RoundRow> {
        let category = words::category(category_name)
            .filter(|c| !c.words.is_empty())
            .ok_or_else(|| SessionError::EmptyCategory(category_name.to_string()))?;
        if roster.is_empty() {
            return Err(SessionError::NotEnoughParticipants {
                have: 0,
                need: crate::roster::MIN_PARTICIPANTS,
            });
        }

        let (element, impostor) = {
            let mut rng = rand::rng();
            let element = category.words[rng.random_range(0..category.words.len())];
            let impostor = &roster[rng.random_range(0..roster.len())].display_name;
            (element, impostor)
        };

        let payload = RoundPayload {
            active: true,
            started_at: Utc::now().timestamp_millis(),
            category: category.name.to_string(),
            element: element.to_string(),
            impostor: impostor.clone(),
            revealed_identities: Default::default(),
        };
        let row = self.store.insert_round(self.code, &payload).await?;
        tracing::info!(
            code = self.code,
            category = category.name,
            started_at = payload.started_at,
            "round started"
        );
        Ok(row)
    }

    /// Record this user's identity reveal.
    ///
    /// Reads the round's current payload from the store and merges into it
    /// rather than writing back the local copy, so concurrent reveals by
    /// other users are never clobbered. Revealing twice is a no-op.
    pub async fn reveal_identity(&mut self) -> SessionResult<RoundPayload> {
        let fresh = self
            .store
            .latest_round(self.code)
            .await?
            .filter(|r| r.payload.active)
            .ok_or(SessionError::NoRound)?;

        let mut merged = fresh.payload.clone();
        merged
            .revealed_identities
            .insert(self.user_name.clone(), true);
        self.store.update_round(fresh.row_id, &merged).await?;

        self.current = Some(RoundRow {
            row_id: fresh.row_id,
            payload: merged.clone(),
        });
        tracing::info!(code = self.code, user = %self.user_name, "identity revealed");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use crate::types::Role;
    use chrono::Utc;

    fn store() -> Arc<SessionStore> {
        Arc::new(SessionStore::new(
            Arc::new(MemoryStore::new()),
            &Config::default(),
        ))
    }

    fn roster(names: &[&str]) -> Vec<Participant> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Participant {
                display_name: name.to_string(),
                role: if i == 0 { Role::Admin } else { Role::Guest },
                icon: "👤".to_string(),
                joined_at: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn start_draws_from_category_and_roster() {
        let store = store();
        let mut engine = RoundEngine::new(store, 2025121234, "Ana".into());
        let roster = roster(&["Ana", "Luis", "Eva"]);

        let row = engine.start(&roster, "Animales").await.unwrap();
        assert!(row.payload.active);
        assert!(row.payload.revealed_identities.is_empty());
        assert!(words::category("Animales")
            .unwrap()
            .words
            .contains(&row.payload.element.as_str()));
        assert!(["Ana", "Luis", "Eva"].contains(&row.payload.impostor.as_str()));
    }

    #[tokio::test]
    async fn start_rejects_unknown_category() {
        let store = store();
        let mut engine = RoundEngine::new(store, 2025121234, "Ana".into());
        let err = engine
            .start(&roster(&["Ana", "Luis", "Eva"]), "Dinosaurios")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyCategory(_)));
        // No partial round became visible.
        assert_eq!(engine.refresh().await.unwrap(), RoundUpdate::NoRound);
    }

    #[tokio::test]
    async fn refresh_shows_a_round_exactly_once() {
        let store = store();
        let code = 2025121234;
        let mut admin = RoundEngine::new(store.clone(), code, "Ana".into());
        admin
            .start(&roster(&["Ana", "Luis", "Eva"]), "Animales")
            .await
            .unwrap();

        let mut guest = RoundEngine::new(store, code, "Luis".into());
        assert!(matches!(
            guest.refresh().await.unwrap(),
            RoundUpdate::NewRound(_)
        ));
        // Re-fetching the unmodified row is a no-op, not a second reveal.
        assert_eq!(guest.refresh().await.unwrap(), RoundUpdate::Unchanged);
        assert_eq!(guest.refresh().await.unwrap(), RoundUpdate::Unchanged);
    }

    #[tokio::test]
    async fn restart_supersedes_without_deleting_history() {
        let store = store();
        let code = 2025121234;
        let names = roster(&["Ana", "Luis", "Eva"]);
        let mut admin = RoundEngine::new(store.clone(), code, "Ana".into());
        let first = admin.start(&names, "Animales").await.unwrap();
        admin.refresh().await.unwrap();
        let second = admin.start(&names, "Deportes").await.unwrap();

        assert_ne!(first.row_id, second.row_id);
        match admin.refresh().await.unwrap() {
            RoundUpdate::NewRound(row) => assert_eq!(row.row_id, second.row_id),
            other => panic!("expected a new round, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn personal_views_split_impostor_and_word() {
        let store = store();
        let code = 2025121234;
        let mut admin = RoundEngine::new(store.clone(), code, "Ana".into());
        let row = admin
            .start(&roster(&["Ana", "Luis", "Eva"]), "Países")
            .await
            .unwrap();
        let impostor = row.payload.impostor.clone();

        for name in ["Ana", "Luis", "Eva"] {
            let mut engine = RoundEngine::new(store.clone(), code, name.into());
            engine.refresh().await.unwrap();
            let view = engine.personal_view().unwrap();
            if name == impostor {
                assert_eq!(
                    view,
                    RoundView::Impostor {
                        category: "Países".into()
                    }
                );
            } else {
                assert_eq!(
                    view,
                    RoundView::Word {
                        category: "Países".into(),
                        element: row.payload.element.clone(),
                    }
                );
            }
        }
    }

    #[tokio::test]
    async fn reveal_merges_into_current_store_state() {
        let store = store();
        let code = 2025121234;
        let names = roster(&["Ana", "Luis", "Eva"]);
        let mut admin = RoundEngine::new(store.clone(), code, "Ana".into());
        admin.start(&names, "Animales").await.unwrap();

        // Two clients reveal concurrently; each merges into the freshest
        // stored payload, so neither reveal is lost.
        let mut luis = RoundEngine::new(store.clone(), code, "Luis".into());
        let mut eva = RoundEngine::new(store.clone(), code, "Eva".into());
        luis.refresh().await.unwrap();
        eva.refresh().await.unwrap();

        luis.reveal_identity().await.unwrap();
        let merged = eva.reveal_identity().await.unwrap();

        assert!(merged.has_revealed("Luis"));
        assert!(merged.has_revealed("Eva"));
        assert!(!merged.has_revealed("Ana"));
    }

    #[tokio::test]
    async fn reveal_is_idempotent() {
        let store = store();
        let code = 2025121234;
        let mut admin = RoundEngine::new(store.clone(), code, "Ana".into());
        admin
            .start(&roster(&["Ana", "Luis", "Eva"]), "Animales")
            .await
            .unwrap();

        let mut luis = RoundEngine::new(store, code, "Luis".into());
        luis.refresh().await.unwrap();
        luis.reveal_identity().await.unwrap();
        let merged = luis.reveal_identity().await.unwrap();

        let revealed: Vec<_> = merged.revealed_identities.keys().collect();
        assert_eq!(revealed, ["Luis"]);
        assert!(luis.has_revealed_self());
    }

    #[tokio::test]
    async fn reveal_by_peer_is_not_a_new_round() {
        let store = store();
        let code = 2025121234;
        let mut admin = RoundEngine::new(store.clone(), code, "Ana".into());
        admin
            .start(&roster(&["Ana", "Luis", "Eva"]), "Animales")
            .await
            .unwrap();
        admin.refresh().await.unwrap();

        let mut luis = RoundEngine::new(store, code, "Luis".into());
        luis.refresh().await.unwrap();
        luis.reveal_identity().await.unwrap();

        match admin.refresh().await.unwrap() {
            RoundUpdate::RevealsChanged(row) => assert!(row.payload.has_revealed("Luis")),
            other => panic!("expected a reveal change, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reveal_without_round_fails() {
        let store = store();
        let mut engine = RoundEngine::new(store, 2025121234, "Ana".into());
        assert!(matches!(
            engine.reveal_identity().await,
            Err(SessionError::NoRound)
        ));
    }
}
