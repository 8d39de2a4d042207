//! # DriverBot: driver feedback and announcement bot
//!
//! Usage:
//!   driverbot                        # Telegram listener + scheduler + admin API
//!   driverbot --port 8080            # Custom admin API port
//!   driverbot --no-listener          # Scheduler + admin API only
//!   driverbot tick                   # Run one broadcast cycle and exit
//!   driverbot show-state             # Print the normalized document

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use driverbot_channels::{TelegramChannel, TelegramSender, deep_link};
use driverbot_core::config::DriverBotConfig;
use driverbot_core::types::LinkButton;
use driverbot_core::ChatTransport;
use driverbot_scheduler::{
    CampaignClock, CampaignContent, Coordinator, DocumentWriter, Evaluator, PollDriver,
    SnapshotCache,
};
use driverbot_survey::Inbox;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "driverbot",
    version,
    about = "🚚 DriverBot — driver feedback and announcement bot"
)]
struct Cli {
    /// Config file (default: ~/.driverbot/config.toml, or $DRIVERBOT_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Admin API port (overrides [gateway].port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not poll Telegram for incoming messages
    #[arg(long)]
    no_listener: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one evaluation cycle, print the outcome and exit
    Tick,
    /// Print the normalized document and exit
    ShowState,
}

fn load_config(explicit: Option<PathBuf>) -> Result<DriverBotConfig> {
    let explicit = explicit.or_else(|| std::env::var("DRIVERBOT_CONFIG").ok().map(PathBuf::from));
    let mut config = match explicit {
        Some(path) => DriverBotConfig::load_from(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DriverBotConfig::load()?,
    };
    config.apply_env();
    Ok(config)
}

/// Campaign text plus the deep link into the questionnaire. The bot username
/// comes from config, or from `getMe` when left empty.
async fn campaign_content(config: &DriverBotConfig, sender: &TelegramSender) -> CampaignContent {
    let mut username = config.telegram.bot_username.trim().to_string();
    if username.is_empty() {
        match sender.get_me().await {
            Ok(me) => username = me.username.unwrap_or_default(),
            Err(e) => tracing::warn!("⚠️ Could not resolve bot username: {e}"),
        }
    }
    let link = (!username.is_empty()).then(|| LinkButton {
        label: config.campaign.button_label.clone(),
        url: deep_link(&username, &config.campaign.start_payload),
    });
    if link.is_none() {
        tracing::warn!("⚠️ No bot username, campaign messages go out without a link");
    }
    CampaignContent {
        message: config.campaign.message.clone(),
        link,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "driverbot=debug,driverbot_core=debug,driverbot_store=debug,driverbot_channels=debug,driverbot_scheduler=debug,driverbot_survey=debug,driverbot_gateway=debug,tower_http=debug"
    } else {
        "driverbot=info,driverbot_core=info,driverbot_store=info,driverbot_channels=info,driverbot_scheduler=info,driverbot_survey=info,driverbot_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = load_config(cli.config)?;
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let store = driverbot_store::from_config(&config.store)?;

    if let Some(Command::ShowState) = cli.command {
        let doc = store.load().await?;
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if config.telegram.bot_token.trim().is_empty() {
        anyhow::bail!("Telegram bot token not configured (set [telegram].bot_token or DRIVERBOT_BOT_TOKEN)");
    }
    let sender = TelegramSender::new(config.telegram.clone());
    let transport: Arc<dyn ChatTransport> = Arc::new(sender.clone());

    let snapshot = Arc::new(SnapshotCache::default());
    let writer = Arc::new(DocumentWriter::new(store.clone(), snapshot));
    let evaluator = Evaluator::new(
        CampaignClock::from_config(&config.campaign),
        config.scheduler.early_fire_secs,
    );
    let coordinator = Arc::new(Coordinator::new(
        writer.clone(),
        transport.clone(),
        evaluator,
        campaign_content(&config, &sender).await,
    ));

    if let Some(Command::Tick) = cli.command {
        let outcome = coordinator.evaluate_and_dispatch(chrono::Utc::now()).await;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let driver = Arc::new(PollDriver::new(
        coordinator,
        config.scheduler.poll_interval_secs,
    ));
    let poll_handle = driver.spawn();

    let listener = if cli.no_listener {
        tracing::info!("🔇 Telegram listener disabled");
        None
    } else {
        let inbox = Inbox::new(writer, transport);
        let mut updates = TelegramChannel::new(config.telegram.clone()).start_polling();
        Some(tokio::spawn(async move {
            tracing::info!("📱 Telegram listener started");
            while let Some(msg) = updates.next().await {
                inbox.handle(&msg).await;
            }
        }))
    };

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let server_shutdown = shutdown.clone();
    let state = driverbot_gateway::AppState::new(config.gateway.clone(), driver.clone());
    let mut server = tokio::spawn(driverbot_gateway::start(state, async move {
        server_shutdown.notified().await;
    }));

    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("🛑 Ctrl-C received, shutting down");
            None
        }
        exited = &mut server => Some(exited),
    };

    driver.shutdown();
    shutdown.notify_one();
    if let Some(handle) = listener {
        handle.abort();
    }
    // Let an in-flight cycle finish.
    if let Err(e) = poll_handle.await {
        tracing::warn!("⚠️ Scheduler task ended abnormally: {e}");
    }

    match server_result {
        Some(exited) => exited?,
        None => server.await?,
    }
}
