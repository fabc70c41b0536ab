//! Participant roster: validation, the authoritative local view of who is
//! in the session, badge computation and the start-round gating rule.

use crate::error::{SessionError, SessionResult};
use crate::store::SessionStore;
use crate::types::{Participant, Role, RoundPayload, SessionCode};
use serde::Serialize;
use std::sync::Arc;

/// A round cannot start with fewer participants than this.
pub const MIN_PARTICIPANTS: usize = 3;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;

/// Validate and normalize a display name: trimmed, 2-50 characters,
/// letters/digits plus space, underscore, hyphen and dot.
pub fn validate_display_name(raw: &str) -> SessionResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SessionError::validation("please enter your name"));
    }
    let length = name.chars().count();
    if length < NAME_MIN {
        return Err(SessionError::validation(format!(
            "the name must have at least {NAME_MIN} characters"
        )));
    }
    if length > NAME_MAX {
        return Err(SessionError::validation(format!(
            "the name must have at most {NAME_MAX} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.'))
    {
        return Err(SessionError::validation(
            "the name may only contain letters, digits, spaces, '_', '-' and '.'",
        ));
    }
    Ok(name.to_string())
}

/// Identity badge shown next to a participant once they revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityBadge {
    Impostor,
    NotImpostor,
}

/// One rendered roster entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantView {
    pub display_name: String,
    pub icon: String,
    pub is_admin: bool,
    /// Present only when this participant revealed in the current round.
    pub identity: Option<IdentityBadge>,
}

/// Combine the roster with the current round's reveal state into the badge
/// rows the presentation layer renders.
pub fn badge_views(roster: &[Participant], round: Option<&RoundPayload>) -> Vec<ParticipantView> {
    roster
        .iter()
        .map(|p| {
            let identity = round.and_then(|r| {
                if r.has_revealed(&p.display_name) {
                    if r.impostor == p.display_name {
                        Some(IdentityBadge::Impostor)
                    } else {
                        Some(IdentityBadge::NotImpostor)
                    }
                } else {
                    None
                }
            });
            ParticipantView {
                display_name: p.display_name.clone(),
                icon: p.icon.clone(),
                is_admin: p.role == Role::Admin,
                identity,
            }
        })
        .collect()
}

/// Whether the start-round affordance is available: admin only, and only
/// once the roster reaches the minimum. Re-evaluated on every roster or
/// round change, not just at page load.
pub fn can_start_round(roster: &[Participant], role: Role) -> bool {
    role == Role::Admin && roster.len() >= MIN_PARTICIPANTS
}

/// Maintains the local roster view for one session.
pub struct RosterSync {
    store: Arc<SessionStore>,
    code: SessionCode,
    roster: Vec<Participant>,
}

impl RosterSync {
    pub fn new(store: Arc<SessionStore>, code: SessionCode) -> RosterSync {
        RosterSync {
            store,
            code,
            roster: Vec::new(),
        }
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// Re-fetch the roster. Returns true if the local view changed, so
    /// redundant refresh triggers collapse into no-op renders.
    pub async fn refresh(&mut self) -> SessionResult<bool> {
        let fresh = self.store.roster(self.code).await?;
        if fresh == self.roster {
            return Ok(false);
        }
        self.roster = fresh;
        Ok(true)
    }
}
