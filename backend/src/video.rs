// Transcoder subprocess supervision.
// Invariants: at most one transcoder process alive; shutdown kills and reaps it before returning.

use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::constants::{
    TRANSCODER_BIN, TRANSCODER_BITRATE, TRANSCODER_CODEC, TRANSCODER_FORMAT, TRANSCODER_FPS,
    TRANSCODER_SIZE,
};
use crate::error::{Error, Result};

const STDERR_FLUSH: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscoderConfig {
    pub program: String,
    pub input_url: String,
    pub sink_url: String,
    pub format: String,
    pub codec: String,
    pub size: String,
    pub bitrate: String,
    pub frame_rate: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: TRANSCODER_BIN.to_string(),
            input_url: String::new(),
            sink_url: String::new(),
            format: TRANSCODER_FORMAT.to_string(),
            codec: TRANSCODER_CODEC.to_string(),
            size: TRANSCODER_SIZE.to_string(),
            bitrate: TRANSCODER_BITRATE.to_string(),
            frame_rate: TRANSCODER_FPS,
        }
    }
}

impl TranscoderConfig {
    /// Low-latency MPEG-TS with no B-frames, pushed to the ingest route.
    pub fn args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-i".to_string(),
            self.input_url.clone(),
            "-f".to_string(),
            self.format.clone(),
            "-codec:v".to_string(),
            self.codec.clone(),
            "-s".to_string(),
            self.size.clone(),
            "-b:v".to_string(),
            self.bitrate.clone(),
            "-bf".to_string(),
            "0".to_string(),
            "-r".to_string(),
            self.frame_rate.to_string(),
            self.sink_url.clone(),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    Never,
    Limited { max_restarts: u32, delay: Duration },
}

impl RestartPolicy {
    /// Delay before restart number `restarts + 1`, if one is allowed.
    pub fn next_delay(&self, restarts: u32) -> Option<Duration> {
        match *self {
            RestartPolicy::Never => None,
            RestartPolicy::Limited { max_restarts, delay } if restarts < max_restarts => Some(delay),
            RestartPolicy::Limited { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TranscoderStatus {
    Starting,
    Running { pid: Option<u32> },
    Exited { code: Option<i32>, restarts: u32 },
    Stopped,
}

#[derive(Debug)]
pub struct VideoRelay {
    shutdown: Option<oneshot::Sender<()>>,
    supervisor: JoinHandle<()>,
    status: watch::Receiver<TranscoderStatus>,
}

impl VideoRelay {
    pub fn start(config: &TranscoderConfig, policy: RestartPolicy) -> Result<Self> {
        Self::spawn(config.program.clone(), config.args(), policy)
    }

    pub fn spawn(program: String, args: Vec<String>, policy: RestartPolicy) -> Result<Self> {
        let child = spawn_child(&program, &args).map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;
        info!(program = %program, pid = ?child.id(), "transcoder started");

        let (status_tx, status) = watch::channel(TranscoderStatus::Starting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(
            child,
            program,
            args,
            policy,
            shutdown_rx,
            status_tx,
        ));

        Ok(Self {
            shutdown: Some(shutdown_tx),
            supervisor,
            status,
        })
    }

    pub fn status(&self) -> watch::Receiver<TranscoderStatus> {
        self.status.clone()
    }

    /// Stops log draining, kills the transcoder and waits until it is reaped.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.supervisor).await {
            warn!(?err, "transcoder supervisor failed");
        }
    }
}

fn spawn_child(program: &str, args: &[String]) -> std::io::Result<Child> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

fn drain_stderr(child: &mut Child) -> Option<JoinHandle<()>> {
    let stderr = child.stderr.take()?;
    Some(tokio::spawn(async move {
        // ffmpeg ends progress updates with '\r' and everything else with '\n'.
        let mut records = BufReader::new(stderr).split(b'\r');
        loop {
            match records.next_segment().await {
                Ok(Some(record)) => {
                    for line in stderr_lines(&record) {
                        info!(target: "transcoder", "stderr: {}", line);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(?err, "transcoder stderr read failed");
                    break;
                }
            }
        }
    }))
}

fn stderr_lines(record: &[u8]) -> impl Iterator<Item = String> + '_ {
    record
        .split(|byte| *byte == b'\n')
        .map(|line| String::from_utf8_lossy(line).trim_end().to_string())
        .filter(|line| !line.is_empty())
}

async fn supervise(
    mut child: Child,
    program: String,
    args: Vec<String>,
    policy: RestartPolicy,
    mut shutdown_rx: oneshot::Receiver<()>,
    status_tx: watch::Sender<TranscoderStatus>,
) {
    let mut restarts = 0u32;
    loop {
        let drain = drain_stderr(&mut child);
        status_tx.send_replace(TranscoderStatus::Running { pid: child.id() });

        tokio::select! {
            exit = child.wait() => {
                let code = match exit {
                    Ok(status) => status.code(),
                    Err(err) => {
                        warn!(?err, "failed to wait on transcoder");
                        None
                    }
                };
                if let Some(drain) = drain {
                    // Let the tail of stderr reach the log, but never hang on an inherited pipe.
                    if tokio::time::timeout(STDERR_FLUSH, drain).await.is_err() {
                        warn!("transcoder stderr still open after exit");
                    }
                }
                warn!(?code, restarts, "transcoder exited");
                status_tx.send_replace(TranscoderStatus::Exited { code, restarts });

                let Some(delay) = policy.next_delay(restarts) else {
                    return;
                };
                restarts += 1;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut shutdown_rx => {
                        status_tx.send_replace(TranscoderStatus::Stopped);
                        return;
                    }
                }
                match spawn_child(&program, &args) {
                    Ok(next) => {
                        info!(restarts, pid = ?next.id(), "transcoder restarted");
                        child = next;
                    }
                    Err(err) => {
                        warn!(?err, restarts, "transcoder restart failed");
                        return;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                if let Some(drain) = drain {
                    drain.abort();
                }
                if let Err(err) = child.kill().await {
                    warn!(?err, "failed to kill transcoder");
                }
                status_tx.send_replace(TranscoderStatus::Stopped);
                info!("transcoder stopped");
                return;
            }
        }
    }
}
