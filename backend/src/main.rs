// Skybridge server: vehicle command and telemetry bridge with video fan-out and relay triggers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use vehicle_core::session::SessionState;

use skybridge_server::app::AppState;
use skybridge_server::config::Config;
use skybridge_server::constants::{ACTION_QUEUE, TELEMETRY_WINDOW_MS};
use skybridge_server::dispatch::Dispatcher;
use skybridge_server::error::{Error, Result};
use skybridge_server::http;
use skybridge_server::relay::RelayClient;
use skybridge_server::shutdown::{panic_notifier, shutdown_signal};
use skybridge_server::udp::{CommandChannel, TelemetryChannel};
use skybridge_server::video::VideoRelay;
use skybridge_server::ws::BroadcastHub;

type TaskResult = (&'static str, Result<()>);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(err) = run(Config::from_env()).await {
        error!(%err, "server stopped");
        std::process::exit(1);
    }
    info!("server stopped");
}

async fn run(config: Config) -> Result<()> {
    let panicked = panic_notifier();

    let commands =
        Arc::new(CommandChannel::bind(config.command_bind(), config.vehicle_command_addr()).await?);
    commands.enter_sdk_mode().await;

    let telemetry = TelemetryChannel::bind(
        config.state_bind(),
        Duration::from_millis(TELEMETRY_WINDOW_MS),
    )
    .await?;
    let telemetry_rx = telemetry.subscribe();

    let hub = Arc::new(BroadcastHub::default());

    // The ingest route has to be reachable before the transcoder starts pushing.
    let listener = http::bind_listener(config.http_addr)?;
    info!(addr = %config.http_addr, "http listener bound");

    let video = VideoRelay::start(&config.transcoder(), config.restart_policy)?;
    let dispatcher = Dispatcher::new(commands.clone(), &config.local_api_base())?;

    let mut tasks: JoinSet<TaskResult> = JoinSet::new();

    let reply_commands = commands.clone();
    tasks.spawn(async move { ("command replies", reply_commands.listen_replies().await) });
    tasks.spawn(async move { ("telemetry", telemetry.run().await) });

    let relay_state = match config.relay() {
        Some(relay_config) => {
            let (action_tx, action_rx) = mpsc::channel(ACTION_QUEUE);
            let client = RelayClient::new(relay_config, action_tx);
            let relay_state = client.subscribe_state();
            tasks.spawn(async move { ("relay", client.run().await) });

            let relay_dispatcher = dispatcher.clone();
            tasks.spawn(async move {
                relay_dispatcher.run(action_rx).await;
                ("dispatcher", Ok(()))
            });
            relay_state
        }
        None => {
            warn!("RELAY_KEY or RELAY_SECRET not set, relay triggers disabled");
            watch::channel(SessionState::Disconnected).1
        }
    };

    let app_state = AppState {
        commands,
        dispatcher,
        hub,
        telemetry: telemetry_rx,
        relay_state,
        transcoder: video.status(),
    };

    info!(addr = %config.http_addr, "starting server");
    let outcome = tokio::select! {
        served = http::serve(listener, app_state) => served,
        _ = shutdown_signal() => Ok(()),
        _ = panicked.notified() => Err(Error::Panicked),
        Some(joined) = tasks.join_next() => match joined {
            Ok((name, Ok(()))) => Err(Error::TaskExited(name)),
            Ok((name, Err(err))) => {
                error!(task = name, %err, "background task failed");
                Err(err)
            }
            Err(err) => Err(Error::TaskFailed(err.to_string())),
        },
    };

    info!("shutting down");
    tasks.abort_all();
    video.shutdown().await;
    outcome
}
