//! Output rendering for the chat front-end.
//!
//! This module provides a trait-based rendering abstraction so the chat view
//! can be drawn to a styled terminal, a plain pipe, or a test buffer.

use std::io::{self, Write};

use time::OffsetDateTime;
use time::macros::format_description;

use crate::api::chat::ChatMessage;

/// ANSI escape code for bold text (used for the header and own name).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (used for timestamps).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for our own messages).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for other users).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print the banner shown once at startup.
    fn print_header(&mut self, name: &str);

    /// Print one chat message.  `mine` marks messages sent under our name.
    fn print_message(&mut self, message: &ChatMessage, mine: bool);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(Box::new(io::stdout()), use_color)
    }

    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: Box<dyn Write + Send>, use_color: bool) -> Self {
        Self { out, use_color }
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        // Output is best effort; a closed terminal is not a chat error.
        let _ = self.out.write_fmt(text);
        let _ = self.out.write_all(b"\n");
        let _ = self.out.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a platform creation time (milliseconds since the epoch) as UTC
/// `HH:MM`.
pub fn format_timestamp(millis: f64) -> Option<String> {
    if !millis.is_finite() {
        return None;
    }
    let nanos = (millis * 1_000_000.0) as i128;
    let at = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    at.format(format_description!("[hour]:[minute]")).ok()
}

impl Renderer for PlainTextRenderer {
    fn print_header(&mut self, name: &str) {
        if self.use_color {
            self.line(format_args!("{ANSI_BOLD}Convex Chat{ANSI_RESET}"));
            self.line(format_args!(
                "Connected as {ANSI_BOLD}{ANSI_CYAN}{name}{ANSI_RESET}"
            ));
        } else {
            self.line(format_args!("Convex Chat"));
            self.line(format_args!("Connected as {name}"));
        }
    }

    fn print_message(&mut self, message: &ChatMessage, mine: bool) {
        let stamp = message
            .creation_time
            .and_then(format_timestamp)
            .map(|t| format!("[{t}] "))
            .unwrap_or_default();
        let ChatMessage { user, body, .. } = message;
        if self.use_color {
            let color = if mine { ANSI_CYAN } else { ANSI_YELLOW };
            let weight = if mine { ANSI_BOLD } else { "" };
            self.line(format_args!(
                "{ANSI_DIM}{stamp}{ANSI_RESET}{weight}{color}{user}{ANSI_RESET}: {body}"
            ));
        } else if mine {
            self.line(format_args!("{stamp}{user} (you): {body}"));
        } else {
            self.line(format_args!("{stamp}{user}: {body}"));
        }
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            self.line(format_args!("{ANSI_RED}Error: {error}{ANSI_RESET}"));
        } else {
            self.line(format_args!("Error: {error}"));
        }
    }

    fn print_info(&mut self, info: &str) {
        self.line(format_args!("{info}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn plain_output_marks_own_messages() {
        let buffer = Buffer::default();
        let mut renderer = PlainTextRenderer::with_writer(Box::new(buffer.clone()), false);
        renderer.print_header("Ann");
        renderer.print_message(&ChatMessage::new("Ann", "hi"), true);
        renderer.print_message(&ChatMessage::new("Bo", "yo"), false);
        renderer.print_error("offline");
        assert_eq!(
            buffer.text(),
            "Convex Chat\nConnected as Ann\nAnn (you): hi\nBo: yo\nError: offline\n"
        );
    }

    #[test]
    fn timestamps_are_utc_hours_and_minutes() {
        // 2023-11-14T22:13:20Z
        assert_eq!(format_timestamp(1_700_000_000_000.0).as_deref(), Some("22:13"));
        assert_eq!(format_timestamp(f64::NAN), None);

        let buffer = Buffer::default();
        let mut renderer = PlainTextRenderer::with_writer(Box::new(buffer.clone()), false);
        let mut message = ChatMessage::new("Bo", "yo");
        message.creation_time = Some(1_700_000_000_000.0);
        renderer.print_message(&message, false);
        assert_eq!(buffer.text(), "[22:13] Bo: yo\n");
    }
}
