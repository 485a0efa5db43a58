//! Event rendering: plain lines or one JSON object per line.
//!
//! Events go to stdout; connection status goes to stderr so piping
//! `--output json` into another tool only ever sees events.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::json;

use carelink_core::{ChannelState, MessageId, ThreadId, ThreadMessage, ThreadSummary};

use crate::cli::{ColorMode, OutputFormat};

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Formats dispatched events. Cheap to clone: one copy per callback.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
    color: bool,
}

impl Printer {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    pub fn new_message(self, message: &ThreadMessage) {
        let line = match self.format {
            OutputFormat::Json => json!({ "event": "new_message", "message": message }).to_string(),
            OutputFormat::Plain => {
                let thread = message
                    .thread_id
                    .map_or_else(|| "?".to_string(), |t| t.to_string());
                format!(
                    "{} thread={thread} id={} {}",
                    self.tag("message"),
                    message.id,
                    message.content.as_deref().unwrap_or("")
                )
            }
        };
        emit(&line);
    }

    pub fn message_read(self, thread_id: ThreadId, message_id: MessageId) {
        let line = match self.format {
            OutputFormat::Json => json!({
                "event": "message_read",
                "thread_id": thread_id,
                "message_id": message_id,
            })
            .to_string(),
            OutputFormat::Plain => {
                format!("{} thread={thread_id} id={message_id}", self.tag("read"))
            }
        };
        emit(&line);
    }

    pub fn thread_update(self, thread_id: ThreadId, thread: &ThreadSummary) {
        let line = match self.format {
            OutputFormat::Json => json!({
                "event": "thread_update",
                "thread_id": thread_id,
                "thread": thread,
            })
            .to_string(),
            OutputFormat::Plain => {
                let mut line = format!("{} thread={thread_id}", self.tag("thread"));
                if let Some(ref subject) = thread.subject {
                    line.push_str(&format!(" subject={subject:?}"));
                }
                if let Some(unread) = thread.unread_count {
                    line.push_str(&format!(" unread={unread}"));
                }
                line
            }
        };
        emit(&line);
    }

    pub fn server_error(self, message: &str) {
        let line = match self.format {
            OutputFormat::Json => json!({ "event": "error", "message": message }).to_string(),
            OutputFormat::Plain => format!("{} {message}", self.tag("error")),
        };
        emit(&line);
    }

    /// Connection status line on stderr.
    pub fn status(self, state: &ChannelState) {
        let label = format!("[{state}]");
        if !self.color {
            eprintln!("{label}");
            return;
        }
        match state {
            ChannelState::Open => eprintln!("{}", label.green()),
            ChannelState::Rejected { .. } | ChannelState::Failed { .. } => {
                eprintln!("{}", label.red().bold());
            }
            ChannelState::ReconnectWait { .. } => eprintln!("{}", label.yellow()),
            _ => eprintln!("{}", label.dimmed()),
        }
    }

    fn tag(self, name: &str) -> String {
        let tag = format!("{name:<7}");
        if !self.color {
            return tag;
        }
        match name {
            "message" => tag.cyan().to_string(),
            "error" => tag.red().to_string(),
            _ => tag.blue().to_string(),
        }
    }
}

/// Write one line to stdout. A closed pipe is not an error worth a panic.
fn emit(line: &str) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tags_are_padded_without_color() {
        let printer = Printer::new(OutputFormat::Plain, false);
        assert_eq!(printer.tag("read"), "read   ");
        assert_eq!(printer.tag("message"), "message");
    }
}
