//! Core client for the VK Bots Long Poll API.
//!
//! This crate knows nothing about HTTP libraries or runtimes beyond tokio's
//! timer. The secured GET lives behind [`ports::Transport`] and is
//! implemented in an adapter crate.

pub mod api;
pub mod bot;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod poll;
pub mod ports;
pub mod sender;
pub mod session;
pub mod utils;

#[cfg(test)]
mod testing;

pub use bot::VkBot;
pub use errors::{Error, Result};
