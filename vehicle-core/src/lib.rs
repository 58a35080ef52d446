// Shared vehicle protocol parsing and relay session logic.

pub mod model;
pub mod parser;
pub mod session;
pub mod throttle;
