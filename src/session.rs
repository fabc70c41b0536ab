//! The per-page session context: one instance per browser tab, owning the
//! roster view, the round engine and the dual-channel watchers. No ambient
//! state; everything a page needs lives here and dies with it.
//!
//! Both refresh triggers (push, poll) and user actions are drained by one
//! sequential loop ([`SessionPage::run`]), so local state is only ever
//! mutated between complete fetch-and-render steps.

use crate::codes;
use crate::config::Config;
use crate::device::{self, DeviceStore, Profile};
use crate::error::{SessionError, SessionResult};
use crate::roster::{badge_views, can_start_round, validate_display_name, RosterSync, MIN_PARTICIPANTS};
use crate::round::{RoundEngine, RoundUpdate};
use crate::store::SessionStore;
use crate::types::{Role, SessionCode};
use crate::ui::{ConfirmPrompt, Notice, RevealControl, SessionUi, StartControl};
use crate::watch::{DualChannel, Refresh, WatchOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Retry delay for the initial round fetch: the row may have been written
/// moments before this page loaded.
const INITIAL_ROUND_RETRY: Duration = Duration::from_secs(1);

/// Actions forwarded from the presentation layer into the page loop.
#[derive(Debug, Clone)]
pub enum UserAction {
    StartRound { category: String },
    RevealIdentity,
    Leave,
}

/// Cloneable handle the presentation glue keeps after spawning
/// [`SessionPage::run`].
#[derive(Clone)]
pub struct SessionHandle {
    actions: mpsc::Sender<UserAction>,
    visibility: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    pub async fn start_round(&self, category: &str) {
        let _ = self
            .actions
            .send(UserAction::StartRound {
                category: category.to_string(),
            })
            .await;
    }

    pub async fn reveal_identity(&self) {
        let _ = self.actions.send(UserAction::RevealIdentity).await;
    }

    pub async fn leave(&self) {
        let _ = self.actions.send(UserAction::Leave).await;
    }

    /// Page visibility: polling pauses while hidden and resumes on return.
    pub fn set_visible(&self, visible: bool) {
        let _ = self.visibility.send(visible);
    }
}

pub struct SessionPage {
    client_id: String,
    config: Config,
    store: Arc<SessionStore>,
    device: Arc<dyn DeviceStore>,
    ui: Arc<dyn SessionUi>,
    code: SessionCode,
    user_name: String,
    role: Role,
    roster: RosterSync,
    engine: RoundEngine,
    actions_tx: mpsc::Sender<UserAction>,
    actions_rx: mpsc::Receiver<UserAction>,
    refresh_tx: mpsc::Sender<Refresh>,
    refresh_rx: mpsc::Receiver<Refresh>,
    visibility_tx: Arc<watch::Sender<bool>>,
    visibility_rx: watch::Receiver<bool>,
    watchers: Vec<DualChannel>,
}

impl std::fmt::Debug for SessionPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPage")
            .field("client_id", &self.client_id)
            .field("code", &self.code)
            .field("user_name", &self.user_name)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl SessionPage {
    /// Create a fresh session: allocate a collision-checked code and join
    /// it as admin.
    pub async fn create_session(
        store: Arc<SessionStore>,
        device: Arc<dyn DeviceStore>,
        ui: Arc<dyn SessionUi>,
        config: Config,
        name: &str,
        icon: &str,
    ) -> SessionResult<SessionPage> {
        let name = validate_display_name(name)?;
        let code = codes::generate(&store).await?;
        store
            .insert_participant(code, &name, Role::Admin, icon)
            .await?;
        tracing::info!(code, user = %name, "session created");

        let profile = Profile {
            name: name.clone(),
            icon: icon.to_string(),
        };
        device::store_profile(device.as_ref(), &profile);
        device::store_session(device.as_ref(), code, Role::Admin);

        Ok(Self::build(store, device, ui, config, code, name, Role::Admin))
    }

    /// Join an existing session by its 4-digit short code.
    pub async fn join_session(
        store: Arc<SessionStore>,
        device: Arc<dyn DeviceStore>,
        ui: Arc<dyn SessionUi>,
        config: Config,
        name: &str,
        icon: &str,
        short_code: &str,
    ) -> SessionResult<SessionPage> {
        let name = validate_display_name(name)?;
        let code = codes::resolve_short_code(&store, short_code).await?;

        // Check-then-insert: two simultaneous joins with the same name can
        // both pass this check. The store does not enforce the invariant;
        // the accepted outcome of losing that race is a duplicate entry.
        if store.participant_exists(code, &name).await? {
            return Err(SessionError::NameTaken(name));
        }
        store
            .insert_participant(code, &name, Role::Guest, icon)
            .await?;
        tracing::info!(code, user = %name, "joined session");

        let profile = Profile {
            name: name.clone(),
            icon: icon.to_string(),
        };
        device::store_profile(device.as_ref(), &profile);
        device::store_session(device.as_ref(), code, Role::Guest);

        Ok(Self::build(store, device, ui, config, code, name, Role::Guest))
    }

    /// Re-enter the session remembered on this device. Fails (and forgets
    /// the stored session) when the code no longer resolves.
    pub async fn resume(
        store: Arc<SessionStore>,
        device: Arc<dyn DeviceStore>,
        ui: Arc<dyn SessionUi>,
        config: Config,
    ) -> SessionResult<SessionPage> {
        let Some((code, role)) = device::load_session(device.as_ref()) else {
            return Err(SessionError::validation("no session stored on this device"));
        };
        let Some(profile) = device::load_profile(device.as_ref()) else {
            return Err(SessionError::validation("no profile stored on this device"));
        };
        if !store.code_exists(code).await? {
            device::clear_session(device.as_ref());
            return Err(SessionError::UnknownCode(code));
        }
        Ok(Self::build(store, device, ui, config, code, profile.name, role))
    }

    fn build(
        store: Arc<SessionStore>,
        device: Arc<dyn DeviceStore>,
        ui: Arc<dyn SessionUi>,
        config: Config,
        code: SessionCode,
        user_name: String,
        role: Role,
    ) -> SessionPage {
        let (actions_tx, actions_rx) = mpsc::channel(32);
        let (refresh_tx, refresh_rx) = mpsc::channel(64);
        let (visibility_tx, visibility_rx) = watch::channel(true);
        SessionPage {
            client_id: ulid::Ulid::new().to_string(),
            roster: RosterSync::new(store.clone(), code),
            engine: RoundEngine::new(store.clone(), code, user_name.clone()),
            config,
            store,
            device,
            ui,
            code,
            user_name,
            role,
            actions_tx,
            actions_rx,
            refresh_tx,
            refresh_rx,
            visibility_tx: Arc::new(visibility_tx),
            visibility_rx,
            watchers: Vec::new(),
        }
    }

    pub fn code(&self) -> SessionCode {
        self.code
    }

    pub fn short_code(&self) -> String {
        codes::short_code(self.code)
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            actions: self.actions_tx.clone(),
            visibility: self.visibility_tx.clone(),
        }
    }

    /// Load the initial roster and round state, render it, and start the
    /// dual-channel watchers.
    pub async fn enter(&mut self) -> SessionResult<()> {
        self.roster.refresh().await?;
        self.render_roster_and_gating();

        let mut update = self.engine.refresh().await?;
        if update == RoundUpdate::NoRound {
            // The round row may have been written moments ago.
            tokio::time::sleep(INITIAL_ROUND_RETRY).await;
            update = self.engine.refresh().await?;
        }
        self.apply_round_update(update);

        self.watchers = vec![
            DualChannel::spawn(
                self.store.clone(),
                self.code,
                Refresh::Roster,
                self.refresh_tx.clone(),
                self.visibility_rx.clone(),
                WatchOptions {
                    poll_interval: self.config.roster_poll_interval,
                    watchdog: self.config.subscribe_watchdog,
                },
            ),
            DualChannel::spawn(
                self.store.clone(),
                self.code,
                Refresh::Round,
                self.refresh_tx.clone(),
                self.visibility_rx.clone(),
                WatchOptions {
                    poll_interval: self.config.round_poll_interval,
                    watchdog: self.config.subscribe_watchdog,
                },
            ),
        ];
        tracing::debug!(
            code = self.code,
            client = %self.client_id,
            "session page entered"
        );
        Ok(())
    }

    /// Drive the page until the user leaves. One sequential consumer for
    /// both refresh triggers and user actions; whichever source fires last
    /// with the freshest data wins, redundant triggers collapse into no-op
    /// renders.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(kind) = self.refresh_rx.recv() => {
                    self.on_refresh(kind).await;
                }
                action = self.actions_rx.recv() => {
                    match action {
                        Some(UserAction::StartRound { category }) => {
                            self.on_start_round(&category).await;
                        }
                        Some(UserAction::RevealIdentity) => {
                            self.on_reveal_identity().await;
                        }
                        Some(UserAction::Leave) | None => {
                            if self.ui.confirm(ConfirmPrompt::LeaveSession) {
                                break;
                            }
                        }
                    }
                }
            }
        }
        // Tear down feeds and timers before the page goes away.
        self.watchers.clear();
        device::clear_session(self.device.as_ref());
        tracing::debug!(code = self.code, client = %self.client_id, "session page left");
    }

    /// Handle one refresh trigger. Failures are logged and swallowed: a
    /// failed poll tick or push fetch must not stop the watchers.
    async fn on_refresh(&mut self, kind: Refresh) {
        match kind {
            Refresh::Roster => match self.roster.refresh().await {
                Ok(true) => self.render_roster_and_gating(),
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(code = self.code, %error, "roster refresh failed");
                }
            },
            Refresh::Round => match self.engine.refresh().await {
                Ok(update) => self.apply_round_update(update),
                Err(error) => {
                    tracing::warn!(code = self.code, %error, "round refresh failed");
                }
            },
        }
    }

    fn apply_round_update(&mut self, update: RoundUpdate) {
        match update {
            RoundUpdate::NewRound(_) => {
                if let Some(view) = self.engine.personal_view() {
                    self.ui.show_round(&view);
                }
                let control = if self.engine.has_revealed_self() {
                    RevealControl::Revealed
                } else {
                    RevealControl::Ready
                };
                self.ui.set_reveal_control(control);
                self.render_roster_and_gating();
            }
            RoundUpdate::RevealsChanged(_) => {
                if self.engine.has_revealed_self() {
                    self.ui.set_reveal_control(RevealControl::Revealed);
                }
                self.render_roster_and_gating();
            }
            RoundUpdate::Unchanged | RoundUpdate::NoRound => {}
        }
    }

    /// Re-render the roster badges and re-evaluate the start-round gate.
    /// Both depend on the roster and the current round, so every change to
    /// either funnels through here.
    fn render_roster_and_gating(&self) {
        let payload = self
            .engine
            .current()
            .filter(|r| r.payload.active)
            .map(|r| &r.payload);
        self.ui
            .render_roster(&badge_views(self.roster.roster(), payload));

        let control = if self.role != Role::Admin {
            StartControl::Hidden
        } else if can_start_round(self.roster.roster(), self.role) {
            StartControl::Enabled
        } else {
            StartControl::Waiting {
                have: self.roster.roster().len(),
                need: MIN_PARTICIPANTS,
            }
        };
        self.ui.set_start_control(control);
    }

    async fn on_start_round(&mut self, category: &str) {
        if self.role != Role::Admin {
            self.ui
                .notify(Notice::Error, &SessionError::NotAdmin.to_string());
            return;
        }
        if !can_start_round(self.roster.roster(), self.role) {
            self.ui.notify(
                Notice::Warning,
                &SessionError::NotEnoughParticipants {
                    have: self.roster.roster().len(),
                    need: MIN_PARTICIPANTS,
                }
                .to_string(),
            );
            return;
        }
        // Superseding an active round needs an explicit confirmation; the
        // very first round starts without one.
        if self.engine.has_active_round()
            && !self.ui.confirm(ConfirmPrompt::NewRoundWhileActive)
        {
            return;
        }

        match self.engine.start(self.roster.roster(), category).await {
            Ok(_) => {
                // Converge immediately instead of waiting for a push/poll.
                if let Ok(update) = self.engine.refresh().await {
                    self.apply_round_update(update);
                }
            }
            Err(error) => {
                tracing::warn!(code = self.code, %error, "round creation failed");
                self.ui.notify(Notice::Error, &error.to_string());
            }
        }
    }

    async fn on_reveal_identity(&mut self) {
        // Already revealed: the control is disabled, repeat taps are no-ops.
        if self.engine.has_revealed_self() {
            return;
        }
        if !self.ui.confirm(ConfirmPrompt::RevealIdentity) {
            return;
        }
        self.ui.set_reveal_control(RevealControl::Revealing);
        match self.engine.reveal_identity().await {
            Ok(_) => {
                self.ui.set_reveal_control(RevealControl::Revealed);
                self.render_roster_and_gating();
            }
            Err(error) => {
                tracing::warn!(code = self.code, %error, "identity reveal failed");
                self.ui.set_reveal_control(RevealControl::Retry);
                self.ui.notify(
                    Notice::Error,
                    "could not record your reveal, please try again",
                );
            }
        }
    }
}
