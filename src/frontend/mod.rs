//! Frontend components
//!
//! Configuration, class schemas and the CLI that ties them to the proxy factory.

pub mod cli;
pub mod config;
pub mod schema;

pub use cli::main as cli_main;
pub use config::ProxyConfig;
pub use schema::Schema;
