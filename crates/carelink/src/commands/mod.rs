//! Command handlers: bridge CLI args to the channel manager and output.

pub mod config_cmd;
pub mod listen;
