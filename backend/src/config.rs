// Startup configuration resolved from environment variables.
// Invariants: unparseable values fall back to defaults; read once at startup.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_HTTP_PORT, INGEST_PATH, RELAY_BUCKET, RELAY_RECONNECT_MS, RELAY_URL, TRANSCODER_BIN,
    TRANSCODER_RESTART_DELAY_MS, VEHICLE_COMMAND_PORT, VEHICLE_HOST, VEHICLE_STATE_PORT,
    VEHICLE_VIDEO_PORT,
};
use crate::relay::RelayConfig;
use crate::utils::loopback_for;
use crate::video::{RestartPolicy, TranscoderConfig};

#[derive(Clone, Debug)]
pub struct Config {
    pub http_addr: SocketAddr,
    pub udp_bind: IpAddr,
    pub vehicle_host: IpAddr,
    pub command_port: u16,
    pub state_port: u16,
    pub video_port: u16,
    pub relay_url: String,
    pub relay_key: Option<String>,
    pub relay_secret: Option<String>,
    pub relay_bucket: String,
    pub ffmpeg_bin: String,
    pub restart_policy: RestartPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let bind: IpAddr = parse_var(&lookup, "HTTP_BIND").unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let port: u16 = parse_var(&lookup, "HTTP_PORT").unwrap_or(DEFAULT_HTTP_PORT);

        let max_restarts: u32 = parse_var(&lookup, "TRANSCODER_MAX_RESTARTS").unwrap_or(0);
        let restart_delay_ms: u64 =
            parse_var(&lookup, "TRANSCODER_RESTART_DELAY_MS").unwrap_or(TRANSCODER_RESTART_DELAY_MS);
        let restart_policy = if max_restarts == 0 {
            RestartPolicy::Never
        } else {
            RestartPolicy::Limited {
                max_restarts,
                delay: Duration::from_millis(restart_delay_ms),
            }
        };

        Self {
            http_addr: SocketAddr::new(bind, port),
            udp_bind: parse_var(&lookup, "UDP_BIND").unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            vehicle_host: parse_var(&lookup, "VEHICLE_HOST").unwrap_or(IpAddr::V4(VEHICLE_HOST)),
            command_port: parse_var(&lookup, "VEHICLE_COMMAND_PORT").unwrap_or(VEHICLE_COMMAND_PORT),
            state_port: parse_var(&lookup, "VEHICLE_STATE_PORT").unwrap_or(VEHICLE_STATE_PORT),
            video_port: parse_var(&lookup, "VEHICLE_VIDEO_PORT").unwrap_or(VEHICLE_VIDEO_PORT),
            relay_url: text("RELAY_URL").unwrap_or_else(|| RELAY_URL.to_string()),
            relay_key: text("RELAY_KEY"),
            relay_secret: text("RELAY_SECRET"),
            relay_bucket: text("RELAY_BUCKET").unwrap_or_else(|| RELAY_BUCKET.to_string()),
            ffmpeg_bin: text("FFMPEG_BIN").unwrap_or_else(|| TRANSCODER_BIN.to_string()),
            restart_policy,
        }
    }

    /// Local port the command socket binds; replies arrive here.
    pub fn command_bind(&self) -> SocketAddr {
        SocketAddr::new(self.udp_bind, self.command_port)
    }

    pub fn vehicle_command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.vehicle_host, self.command_port)
    }

    pub fn state_bind(&self) -> SocketAddr {
        SocketAddr::new(self.udp_bind, self.state_port)
    }

    /// Base URL other components use to call this server's own API.
    pub fn local_api_base(&self) -> String {
        format!("http://{}", loopback_for(self.http_addr))
    }

    pub fn transcoder(&self) -> TranscoderConfig {
        TranscoderConfig {
            program: self.ffmpeg_bin.clone(),
            input_url: format!("udp://{}:{}", self.vehicle_host, self.video_port),
            sink_url: format!("{}{}", self.local_api_base(), INGEST_PATH),
            ..TranscoderConfig::default()
        }
    }

    /// `None` when either credential is missing.
    pub fn relay(&self) -> Option<RelayConfig> {
        let key = self.relay_key.clone()?;
        let secret = self.relay_secret.clone()?;
        Some(RelayConfig {
            url: self.relay_url.clone(),
            key,
            secret,
            buckets: vec![self.relay_bucket.clone()],
            reconnect_delay: Duration::from_millis(RELAY_RECONNECT_MS),
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|value| value.trim().parse().ok())
}
