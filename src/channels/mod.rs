//! Channel abstraction for activity I/O.

pub mod channel;
pub mod cli;
pub mod http;

pub use channel::*;
pub use cli::CliChannel;
pub use http::http_routes;
