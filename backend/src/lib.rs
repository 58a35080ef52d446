// Crate root for the Skybridge vehicle bridge server modules.

pub mod app;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod relay;
pub mod shutdown;
pub mod udp;
pub mod utils;
pub mod video;
pub mod ws;
