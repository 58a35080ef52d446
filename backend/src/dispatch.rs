// Trigger dispatch: turns local or relayed actions into vehicle commands.
// Invariants: `streamon` always goes through the public command route; empty actions are ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::constants::{SELF_CALL_TIMEOUT_MS, STREAMON_COMMAND};
use crate::error::Result;
use crate::http::CommandRequest;
use crate::udp::CommandChannel;

#[derive(Clone, Debug)]
pub struct Dispatcher {
    commands: Arc<CommandChannel>,
    http: reqwest::Client,
    command_url: String,
}

impl Dispatcher {
    /// `api_base` is this server's own address, e.g. `http://127.0.0.1:6767`.
    pub fn new(commands: Arc<CommandChannel>, api_base: &str) -> Result<Self> {
        // Loopback only: proxies from the environment must not see this call.
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_millis(SELF_CALL_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            commands,
            http,
            command_url: format!("{}/command", api_base.trim_end_matches('/')),
        })
    }

    pub async fn dispatch(&self, action: &str) {
        if action.is_empty() {
            return;
        }
        if action == STREAMON_COMMAND {
            self.loop_back(action).await;
            return;
        }
        self.commands.send(action).await;
    }

    async fn loop_back(&self, command: &str) {
        let request = CommandRequest {
            command: command.to_string(),
        };
        match self.http.post(&self.command_url).json(&request).send().await {
            Ok(response) if response.status().is_success() => {
                info!(command, url = %self.command_url, "command looped back through local api");
            }
            Ok(response) => {
                warn!(command, status = %response.status(), "local command api rejected request");
            }
            Err(err) => warn!(%err, command, "local command api unreachable"),
        }
    }

    /// Drains relay actions in arrival order until every sender is gone.
    pub async fn run(self, mut actions: mpsc::Receiver<String>) {
        while let Some(action) = actions.recv().await {
            info!(%action, "dispatching relay action");
            self.dispatch(&action).await;
        }
    }
}
