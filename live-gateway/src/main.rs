use anyhow::Context;
use live_gateway::config::{load_config, load_default_config};
use live_gateway::{Identity, ListenerFilter, LiveUpdates};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn print_help() {
    eprintln!(
        r#"Live Gateway - real-time order status listener

USAGE:
    live-gateway [OPTIONS] [ORDER_ID...]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --help              Print this help message

ENVIRONMENT VARIABLES:
    LIVE_USER_ID        User whose orders are followed (required)
    LIVE_TOKEN          Bearer token passed on CONNECT
    RUST_LOG            Log level filter

EXAMPLES:
    # Follow every order of user 17
    LIVE_USER_ID=17 live-gateway

    # Also follow orders 42 and 43 explicitly
    LIVE_USER_ID=17 live-gateway --config live.json 42 43
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("live_gateway=info".parse()?))
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut order_ids: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            order_id => order_ids.push(order_id.to_string()),
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            load_config(path).with_context(|| format!("loading {}", path))?
        }
        None => load_default_config()?,
    };

    let user_id = std::env::var("LIVE_USER_ID").context("LIVE_USER_ID is not set")?;
    let mut identity = Identity::new(user_id);
    if let Ok(token) = std::env::var("LIVE_TOKEN") {
        identity = identity.with_token(token);
    }

    tracing::info!(
        url = %config.endpoint.url,
        history = config.history.capacity,
        "Starting live gateway"
    );

    let live = LiveUpdates::websocket(&config)?;

    live.add_listener(ListenerFilter::All, |delivery| {
        tracing::info!(
            channel = %delivery.channel,
            order_id = %delivery.update.order_id,
            status = %delivery.update.status,
            timestamp = %delivery.update.timestamp,
            "Order update"
        );
    });

    let mut handles = Vec::with_capacity(order_ids.len());
    for order_id in &order_ids {
        handles.push(live.subscribe_order(order_id)?);
    }

    let mut state = live.watch_state();
    live.login(identity);

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let info = live.connection_info();
                tracing::info!(
                    state = %info.state,
                    retries = info.retry_count,
                    last_error = info.last_error.as_deref().unwrap_or("-"),
                    "Connection state"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    for handle in &handles {
        live.unsubscribe(handle);
    }
    live.logout();

    Ok(())
}
