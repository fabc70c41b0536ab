//! Presentation seam. The sync engine never touches rendering directly; it
//! calls this interface and the page glue (DOM, modals, notifications)
//! implements it.

use crate::roster::ParticipantView;
use crate::round::RoundView;
use std::sync::{Arc, Mutex};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Info,
    Warning,
    Error,
}

/// State of the admin's start-round affordance.
#[derive(Debug, Clone, PartialEq)]
pub enum StartControl {
    /// Guests never see the control.
    Hidden,
    /// Admin, but below the participant threshold: show a waiting message.
    Waiting { have: usize, need: usize },
    Enabled,
}

/// State of the user's own identity-reveal button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealControl {
    Ready,
    /// Write in flight; the button is disabled.
    Revealing,
    /// Revealed successfully; disabled for the rest of the round.
    Revealed,
    /// The write failed; re-enabled so the user can retry.
    Retry,
}

/// Confirmation dialogs the engine requires before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPrompt {
    /// Starting a fresh round while one is active supersedes it.
    NewRoundWhileActive,
    RevealIdentity,
    LeaveSession,
}

/// Everything the engine needs from the presentation layer.
pub trait SessionUi: Send + Sync {
    fn render_roster(&self, views: &[ParticipantView]);
    fn set_start_control(&self, control: StartControl);
    /// Show this user's personalized round result. The word itself stays
    /// behind a peek control that re-hides after
    /// [`crate::round::WORD_PEEK_REHIDE`].
    fn show_round(&self, view: &RoundView);
    fn set_reveal_control(&self, control: RevealControl);
    fn notify(&self, level: Notice, message: &str);
    fn confirm(&self, prompt: ConfirmPrompt) -> bool;
}

/// Everything a [`RecordingUi`] observed, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Roster(Vec<ParticipantView>),
    Start(StartControl),
    Round(RoundView),
    Reveal(RevealControl),
    Notice(Notice, String),
    Confirmed(ConfirmPrompt),
}

/// Recording implementation used by the tests and the demo binary: stores
/// every call and answers confirmations with a preset response.
#[derive(Clone)]
pub struct RecordingUi {
    events: Arc<Mutex<Vec<UiEvent>>>,
    confirm_response: bool,
}

impl RecordingUi {
    pub fn new() -> RecordingUi {
        RecordingUi {
            events: Arc::new(Mutex::new(Vec::new())),
            confirm_response: true,
        }
    }

    pub fn declining() -> RecordingUi {
        RecordingUi {
            confirm_response: false,
            ..RecordingUi::new()
        }
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().expect("ui poisoned").clone()
    }

    pub fn last_roster(&self) -> Option<Vec<ParticipantView>> {
        self.events()
            .into_iter()
            .rev()
            .find_map(|e| match e {
                UiEvent::Roster(views) => Some(views),
                _ => None,
            })
    }

    pub fn last_start_control(&self) -> Option<StartControl> {
        self.events()
            .into_iter()
            .rev()
            .find_map(|e| match e {
                UiEvent::Start(control) => Some(control),
                _ => None,
            })
    }

    pub fn shown_rounds(&self) -> Vec<RoundView> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Round(view) => Some(view),
                _ => None,
            })
            .collect()
    }

    pub fn last_reveal_control(&self) -> Option<RevealControl> {
        self.events()
            .into_iter()
            .rev()
            .find_map(|e| match e {
                UiEvent::Reveal(control) => Some(control),
                _ => None,
            })
    }

    fn record(&self, event: UiEvent) {
        self.events.lock().expect("ui poisoned").push(event);
    }
}

impl Default for RecordingUi {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionUi for RecordingUi {
    fn render_roster(&self, views: &[ParticipantView]) {
        self.record(UiEvent::Roster(views.to_vec()));
    }

    fn set_start_control(&self, control: StartControl) {
        self.record(UiEvent::Start(control));
    }

    fn show_round(&self, view: &RoundView) {
        self.record(UiEvent::Round(view.clone()));
    }

    fn set_reveal_control(&self, control: RevealControl) {
        self.record(UiEvent::Reveal(control));
    }

    fn notify(&self, level: Notice, message: &str) {
        self.record(UiEvent::Notice(level, message.to_string()));
    }

    fn confirm(&self, prompt: ConfirmPrompt) -> bool {
        self.record(UiEvent::Confirmed(prompt));
        self.confirm_response
    }
}
