use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use impostor::config::Config;
use impostor::device::MemoryDevice;
use impostor::round::RoundView;
use impostor::session::SessionPage;
use impostor::store::{MemoryStore, RestStore, RowStore, SessionStore};
use impostor::ui::{ConfirmPrompt, Notice, RevealControl, SessionUi, StartControl};
use impostor::{roster::ParticipantView, words};

/// Renders every page callback through tracing, prefixed with the player it
/// belongs to.
struct LogUi {
    player: String,
}

impl SessionUi for LogUi {
    fn render_roster(&self, views: &[ParticipantView]) {
        let names: Vec<&str> = views.iter().map(|v| v.display_name.as_str()).collect();
        tracing::info!(player = %self.player, roster = ?names, "roster");
    }

    fn set_start_control(&self, control: StartControl) {
        tracing::info!(player = %self.player, ?control, "start control");
    }

    fn show_round(&self, view: &RoundView) {
        match view {
            RoundView::Impostor { category } => {
                tracing::info!(player = %self.player, category, "you are the impostor");
            }
            RoundView::Word { category, element } => {
                tracing::info!(player = %self.player, category, element, "your word");
            }
        }
    }

    fn set_reveal_control(&self, control: RevealControl) {
        tracing::info!(player = %self.player, ?control, "reveal control");
    }

    fn notify(&self, level: Notice, message: &str) {
        match level {
            Notice::Info => tracing::info!(player = %self.player, message),
            Notice::Warning => tracing::warn!(player = %self.player, message),
            Notice::Error => tracing::error!(player = %self.player, message),
        }
    }

    fn confirm(&self, prompt: ConfirmPrompt) -> bool {
        tracing::info!(player = %self.player, ?prompt, "confirmed");
        true
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "impostor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting impostor sync engine demo...");

    let config = Config::from_env();
    let backend: Arc<dyn RowStore> = if config.is_remote() {
        match RestStore::new(&config) {
            Ok(store) => {
                tracing::info!("using remote row store");
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!("remote store unavailable: {}", e);
                return;
            }
        }
    } else {
        tracing::warn!("no remote store configured, running against an in-memory store");
        Arc::new(MemoryStore::new())
    };
    let store = Arc::new(SessionStore::new(backend, &config));

    if let Err(e) = demo(store, config).await {
        tracing::error!("demo failed: {}", e);
    }
}

/// Scripted walkthrough: an admin creates a session, two guests join by
/// short code, the admin starts a round and one guest reveals themselves.
async fn demo(
    store: Arc<SessionStore>,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let page = |name: &str| {
        (
            Arc::new(MemoryDevice::new()),
            Arc::new(LogUi {
                player: name.to_string(),
            }),
        )
    };

    let (ana_device, ana_ui) = page("Ana");
    let mut ana = SessionPage::create_session(
        store.clone(),
        ana_device,
        ana_ui,
        config.clone(),
        "Ana",
        "🦊",
    )
    .await?;
    let short = ana.short_code();
    tracing::info!(code = ana.code(), short, "session open");

    let (luis_device, luis_ui) = page("Luis");
    let mut luis = SessionPage::join_session(
        store.clone(),
        luis_device,
        luis_ui,
        config.clone(),
        "Luis",
        "🐻",
        &short,
    )
    .await?;
    let (eva_device, eva_ui) = page("Eva");
    let mut eva = SessionPage::join_session(
        store.clone(),
        eva_device,
        eva_ui,
        config.clone(),
        "Eva",
        "🦉",
        &short,
    )
    .await?;

    ana.enter().await?;
    luis.enter().await?;
    eva.enter().await?;

    let admin = ana.handle();
    let guest = luis.handle();
    let bystander = eva.handle();
    let pages = vec![
        tokio::spawn(ana.run()),
        tokio::spawn(luis.run()),
        tokio::spawn(eva.run()),
    ];

    let category = words::category_names()
        .next()
        .expect("category list is never empty");
    admin.start_round(category).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    guest.reveal_identity().await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    admin.leave().await;
    guest.leave().await;
    bystander.leave().await;
    for page in pages {
        page.await?;
    }
    tracing::info!("demo finished");
    Ok(())
}
