//! hhbridge - native messaging host bridging HH.ru and Bitrix24.
//!
//! Run without arguments (as the browser does) to serve native messaging on
//! stdin/stdout. The other commands are for setup and troubleshooting.

mod native_messaging;
mod sign_in;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hhbridge_core::auth::{FileTokenStore, KeyringTokenStore, TokenStore};
use hhbridge_core::config::{self, Config, ConfigOverrides, ConfigStore, JsonFileConfigStore};
use hhbridge_core::{BitrixClient, Dispatcher, HhClient};

use sign_in::LoopbackSignIn;

/// Selects the session file instead of the OS keychain
const TOKEN_STORE_ENV: &str = "HHBRIDGE_TOKEN_STORE";

const USAGE: &str = "\
Usage: hhbridge [COMMAND]

Commands:
  serve                  Native messaging host on stdin/stdout (default)
  login                  Sign in to HH and store the token
  logout                 Forget the stored token
  status                 Show sign-in state
  config show            Print effective settings
  config set KEY VALUE   Override one setting
  config reset           Drop all overrides
  call JSON              Dispatch one message and print the reply";

/// Initialize the tracing subscriber for logging.
///
/// In serve mode stdout carries the protocol, so logs go to a daily file
/// in the cache directory.
fn init_tracing(serve: bool) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if serve {
        let log_dir = config::cache_dir()?.join("logs");
        std::fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let appender = tracing_appender::rolling::daily(log_dir, "hhbridge.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .with(filter)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr))
            .with(filter)
            .init();
        Ok(None)
    }
}

fn token_store() -> Result<Arc<dyn TokenStore>> {
    match std::env::var(TOKEN_STORE_ENV).as_deref() {
        Ok("file") => Ok(Arc::new(FileTokenStore::new(config::cache_dir()?))),
        _ => Ok(Arc::new(KeyringTokenStore::new())),
    }
}

struct App {
    config: Arc<dyn ConfigStore>,
    hh: HhClient,
    dispatcher: Dispatcher,
}

impl App {
    fn new() -> Result<Self> {
        let config: Arc<dyn ConfigStore> =
            Arc::new(JsonFileConfigStore::open_default(Config::from_env())?);
        let redirect_uri = config.get()?.hh_redirect_uri;
        let launcher = Arc::new(LoopbackSignIn::new(&redirect_uri)?);

        let hh = HhClient::builder().build(config.clone(), token_store()?, launcher)?;
        let bitrix = BitrixClient::new(config.clone())?;
        let dispatcher = Dispatcher::new(hh.clone(), bitrix, config.clone());

        Ok(Self {
            config,
            hh,
            dispatcher,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    // Browsers start the host with the extension origin as first argument
    let command = match args.first().map(String::as_str) {
        None => "serve",
        Some(arg) if arg.starts_with("chrome-extension://") => "serve",
        Some(arg) => arg,
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let _guard = init_tracing(command == "serve")?;
    let app = App::new()?;

    match command {
        "serve" => {
            info!("hhbridge starting");
            native_messaging::serve(app.dispatcher, tokio::io::stdin(), tokio::io::stdout()).await?;
            info!("hhbridge shutting down");
        }
        "login" => {
            app.hh.sign_out()?;
            app.hh.login().await?;
            println!("Signed in");
        }
        "logout" => {
            app.hh.sign_out()?;
            println!("Signed out");
        }
        "status" => match app.hh.stored_credential()? {
            Some(credential) => println!(
                "Signed in ({} minutes ago)",
                credential.age_minutes()
            ),
            None => println!("Not signed in"),
        },
        "config" => run_config(&*app.config, &args[1..])?,
        "call" => {
            let raw = args.get(1).context("call needs a JSON message")?;
            let message = serde_json::from_str(raw).context("Message is not valid JSON")?;
            let reply = app.dispatcher.handle(message).await;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn run_config(store: &dyn ConfigStore, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str).unwrap_or("show") {
        "show" => {}
        "set" => {
            let (key, value) = match (args.get(1), args.get(2)) {
                (Some(key), Some(value)) => (key, value),
                _ => anyhow::bail!("config set needs KEY and VALUE"),
            };
            store.set(ConfigOverrides::from_pair(key, value)?)?;
        }
        "reset" => store.reset()?,
        other => anyhow::bail!("Unknown config command: {}", other),
    }
    println!("{}", serde_json::to_string_pretty(&store.get()?)?);
    Ok(())
}
