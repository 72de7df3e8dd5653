//! The chat application.
//!
//! This module provides the chat view and the pieces of the interactive
//! terminal client built around it:
//!
//! - [`view`]: the mounted view, its draft and submission state
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: slash command parsing

mod commands;
mod config;
pub mod view;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use view::{ChatView, ScrollTarget, TailCursor, ViewState};
