//! Breeze Bot
//!
//! A sample bot wiring the Breeze runtime with a handful of handlers.
//!
//! # Handlers
//!
//! Registered in this order, and dispatched in this order:
//!
//! - `log`: logs every message
//! - `switch`: per-group module switches (`switch`, `switch echo`, `复制开关`)
//! - `ping`, `help`, `info`: simple commands
//! - `echo`: `/echo <text>`, only in groups where the `echo` switch is on
//! - `login`: `/login`, calls `get_login_info` from a background task
//! - `fail`: `/fail`, always errors so the diagnostic reply can be seen
//! - `clock`: meta events only, logs the local time every few heartbeats
//!
//! # Usage
//!
//! ```bash
//! cargo run --package breeze-bot -- --config breeze.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use breeze::core::{MetaEventType, SwitchStore};
use breeze::prelude::*;
use breeze::runtime::ConfigLoader;
use clap::Parser;
use serde_json::json;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "breeze-bot", about = "A sample OneBot bot built on Breeze")]
struct Args {
    /// Configuration file. Searched for in the working directory if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. "production".
    #[arg(short, long)]
    profile: Option<String>,

    /// Where per-group module switches are stored.
    #[arg(long, default_value = "data/switches.json")]
    switches: PathBuf,
}

// ============================================================================
// Handler Functions
// ============================================================================

/// Logs every message.
async fn log_message(_bot: Bot, event: Event) -> HandlerResult {
    let Some(msg) = event.as_message() else {
        return Ok(());
    };
    let name = msg.sender.display_name().unwrap_or("Unknown");

    match msg.group_id {
        Some(group_id) if msg.is_group() => {
            info!("[Group {}] {} ({}): {}", group_id, name, msg.user_id, msg.plain_text());
        }
        _ => info!("[Private] {} ({}): {}", name, msg.user_id, msg.plain_text()),
    }
    Ok(())
}

/// Responds with Pong!
async fn ping(bot: Bot, event: Event) -> HandlerResult {
    if let Some(msg) = event.as_message()
        && msg.plain_text().trim() == "/ping"
    {
        bot.reply(msg, "Pong!").await?;
    }
    Ok(())
}

/// Sends the text back.
async fn echo(bot: Bot, event: Event) -> HandlerResult {
    if let Some(msg) = event.as_message()
        && let Some(content) = msg.plain_text().strip_prefix("/echo ")
        && let Some(chat) = msg.chat()
    {
        bot.send_to(chat, content).await?;
    }
    Ok(())
}

async fn help(bot: Bot, event: Event) -> HandlerResult {
    if let Some(msg) = event.as_message()
        && msg.plain_text().trim() == "/help"
    {
        let help_text = "Breeze Bot - Commands\n\
            /echo <text> - Echo text (needs the echo switch)\n\
            /ping        - Pong!\n\
            /info        - Message info\n\
            /login       - Account the bot is logged in as\n\
            /fail        - Fail on purpose\n\
            switch [module] - List or toggle group modules";
        bot.reply(msg, help_text).await?;
    }
    Ok(())
}

/// Describes the message it was sent in.
async fn message_info(bot: Bot, event: Event) -> HandlerResult {
    let Some(msg) = event.as_message() else {
        return Ok(());
    };
    if msg.plain_text().trim() != "/info" {
        return Ok(());
    }

    let name = msg.sender.display_name().unwrap_or("Unknown");
    let info_text = match msg.group_id {
        Some(group_id) if msg.is_group() => format!(
            "Message Info\n\
            • Type: Group\n\
            • From: {} ({})\n\
            • Group: {}\n\
            • Message ID: {}\n\
            • Sub Type: {}",
            name, msg.user_id, group_id, msg.message_id, msg.sub_type
        ),
        _ => format!(
            "Message Info\n\
            • Type: Private\n\
            • From: {} ({})\n\
            • Message ID: {}\n\
            • Sub Type: {}",
            name, msg.user_id, msg.message_id, msg.sub_type
        ),
    };
    bot.reply(msg, &info_text).await?;
    Ok(())
}

/// Looks up the logged-in account.
///
/// `Bot::call` waits for a response that only the worker can deliver, so
/// the call runs in a background task.
async fn login(bot: Bot, event: Event) -> HandlerResult {
    let Some(msg) = event.as_message() else {
        return Ok(());
    };
    if msg.plain_text().trim() != "/login" {
        return Ok(());
    }
    let Some(chat) = msg.chat() else {
        return Ok(());
    };

    let worker = bot.clone();
    bot.spawn("login_info", async move {
        let info = worker.call("get_login_info", json!({})).await?;
        let text = format!(
            "Logged in as {} ({})",
            info["nickname"].as_str().unwrap_or("?"),
            info["user_id"]
        );
        worker.send_to(chat, text).await?;
        Ok(())
    });
    Ok(())
}

async fn fail(_bot: Bot, event: Event) -> HandlerResult {
    match event.as_message() {
        Some(msg) if msg.plain_text().trim() == "/fail" => {
            Err(HandlerError::failed("failing as requested"))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Heartbeat clock
// ============================================================================

/// Logs the local time every `every` heartbeats.
struct HeartbeatClock {
    beats: AtomicU64,
    every: u64,
}

impl HeartbeatClock {
    fn new(every: u64) -> Self {
        Self {
            beats: AtomicU64::new(0),
            every: every.max(1),
        }
    }
}

#[async_trait]
impl Handler for HeartbeatClock {
    fn name(&self) -> &str {
        "clock"
    }

    fn accepts(&self, route: Route) -> bool {
        route == Route::Meta
    }

    async fn handle(&self, _bot: &Bot, event: &Event) -> HandlerResult {
        if !event
            .as_meta()
            .is_some_and(|meta| meta.meta_event_type == MetaEventType::Heartbeat)
        {
            return Ok(());
        }

        let beats = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        if beats % self.every == 0 {
            let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
            let at = now
                .format(format_description!(
                    "[year]-[month]-[day] [hour]:[minute]:[second]"
                ))
                .unwrap_or_default();
            info!(beats, at = %at, "Heartbeat clock");
        }
        Ok(())
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile.clone());
    }
    let config = loader.load()?;
    let operators = config.bot.operators.clone();

    let store: Arc<dyn SwitchStore> = Arc::new(JsonFileSwitchStore::open(args.switches.clone())?);

    let runtime = Runtime::builder()
        .config(config)
        .handler(handler_fn("log", log_message))
        .handler(SwitchCommand::new(Arc::clone(&store), operators))
        .handler(handler_fn("ping", ping))
        .handler(handler_fn("help", help))
        .handler(handler_fn("info", message_info))
        .handler(Switched::new("echo", handler_fn("echo", echo), Arc::clone(&store)))
        .handler(handler_fn("login", login))
        .handler(handler_fn("fail", fail))
        .handler(HeartbeatClock::new(10))
        .notifier(LogNotifier)
        .build()?;

    info!(
        switches = %args.switches.display(),
        handlers = runtime.dispatcher().handler_count(),
        "Breeze bot starting"
    );

    runtime.run().await?;

    Ok(())
}
