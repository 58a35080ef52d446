// Shared constants for vehicle ports, timing, and transcoding.

use std::net::Ipv4Addr;

pub const DEFAULT_HTTP_PORT: u16 = 6767;
pub const VEHICLE_HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 1);
pub const VEHICLE_COMMAND_PORT: u16 = 8889;
pub const VEHICLE_STATE_PORT: u16 = 8890;
pub const VEHICLE_VIDEO_PORT: u16 = 11111;
pub const SDK_ENABLE_COMMAND: &str = "command";
pub const STREAMON_COMMAND: &str = "streamon";
pub const STREAMOFF_COMMAND: &str = "streamoff";

pub const TELEMETRY_WINDOW_MS: u64 = 100;
pub const UDP_RECV_BUF: usize = 2048;

pub const RELAY_URL: &str = "wss://my.webhookrelay.com/v1/socket";
pub const RELAY_BUCKET: &str = "gactions";
pub const RELAY_RECONNECT_MS: u64 = 3_000;
pub const ACTION_QUEUE: usize = 32;
pub const SELF_CALL_TIMEOUT_MS: u64 = 2_000;

pub const INGEST_PATH: &str = "/tellostream";
pub const VIEWER_BUFFER_CHUNKS: usize = 64;

pub const TRANSCODER_BIN: &str = "ffmpeg";
pub const TRANSCODER_FORMAT: &str = "mpegts";
pub const TRANSCODER_CODEC: &str = "mpeg1video";
pub const TRANSCODER_SIZE: &str = "640x480";
pub const TRANSCODER_BITRATE: &str = "800k";
pub const TRANSCODER_FPS: u32 = 20;
pub const TRANSCODER_RESTART_DELAY_MS: u64 = 2_000;
