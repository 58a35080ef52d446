// Server error taxonomy.

use std::net::SocketAddr;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind {what} socket on {addr}: {source}")]
    Bind {
        what: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("udp transport error: {0}")]
    Transport(#[source] std::io::Error),
    #[error("relay connection error: {0}")]
    Connection(#[from] tungstenite::Error),
    #[error("failed to encode relay request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to start transcoder {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("http server error: {0}")]
    Server(String),
    #[error("{0} task exited")]
    TaskExited(&'static str),
    #[error("background task failed: {0}")]
    TaskFailed(String),
    #[error("a handler or task panicked")]
    Panicked,
}

pub type Result<T> = std::result::Result<T, Error>;
