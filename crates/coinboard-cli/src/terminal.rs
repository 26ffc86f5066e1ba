//! Line-oriented presenter.
//!
//! Prints new chat lines as they arrive, older pages under a marker, and
//! connection changes and notices as status lines. Each message is one row,
//! so the reported content extent is the buffer length.

use std::{collections::VecDeque, io::Write};

use coinboard_chat::ChatNotice;
use coinboard_client::transport::Presenter;
use coinboard_core::{ConnectionSnapshot, ConnectionState};
use coinboard_proto::{ChatMessage, Message};

/// Writes the session to a line sink.
#[derive(Debug)]
pub struct TerminalPresenter<W> {
    out: W,
    oldest: Option<ChatMessage>,
    shown: usize,
}

impl<W: Write + Send> TerminalPresenter<W> {
    /// Presenter over `out`.
    pub fn new(out: W) -> Self {
        Self { out, oldest: None, shown: 0 }
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            tracing::debug!(error = %e, "output closed");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn format_message(message: &ChatMessage) -> String {
    let sender = [&message.sender_name, &message.sender_id]
        .into_iter()
        .find(|s| !s.is_empty())
        .map_or("anonymous", String::as_str);
    format!("{sender}: {}", message.content)
}

impl<W: Write + Send> Presenter for TerminalPresenter<W> {
    fn render(&mut self, messages: &VecDeque<ChatMessage>) -> Option<u32> {
        // Older pages are prepended: the previous oldest moved down
        let prepended = match &self.oldest {
            Some(oldest) => messages.iter().position(|m| m == oldest).unwrap_or(0),
            None => 0,
        };
        if prepended > 0 {
            self.line("-- older --");
            for message in messages.iter().take(prepended) {
                self.line(&format_message(message));
            }
            self.line("-- end of older --");
        }

        for message in messages.iter().skip(prepended + self.shown) {
            self.line(&format_message(message));
        }

        self.shown = messages.len();
        self.oldest = messages.front().cloned();
        let _ = self.out.flush();
        Some(messages.len() as u32)
    }

    fn notify(&mut self, notice: &ChatNotice) {
        self.line(&format!("! {notice}"));
    }

    fn connection_changed(&mut self, snapshot: &ConnectionSnapshot) {
        let status = match (&snapshot.state, &snapshot.last_error) {
            (ConnectionState::Disconnected, Some(error)) if error.requires_refresh() => {
                format!("* disconnected: {error} (use /reconnect)")
            },
            (state, Some(error)) => format!("* {state}: {error}"),
            (state, None) => format!("* {state}"),
        };
        self.line(&status);
    }

    fn topic_message(&mut self, message: &Message) {
        self.line(&format!("[{}] {}", message.destination, message.body));
    }
}

#[cfg(test)]
mod tests {
    use coinboard_core::SessionError;

    use super::*;

    fn chat(name: &str, content: &str) -> ChatMessage {
        ChatMessage {
            sender_name: name.to_string(),
            content: content.to_string(),
            ..ChatMessage::default()
        }
    }

    fn output(presenter: TerminalPresenter<Vec<u8>>) -> String {
        String::from_utf8(presenter.into_inner()).unwrap()
    }

    #[test]
    fn only_new_messages_are_printed() {
        let mut presenter = TerminalPresenter::new(Vec::new());
        let mut messages = VecDeque::from([chat("alice", "gm")]);

        assert_eq!(presenter.render(&messages), Some(1));
        messages.push_back(chat("bob", "wagmi"));
        assert_eq!(presenter.render(&messages), Some(2));

        assert_eq!(output(presenter), "alice: gm\nbob: wagmi\n");
    }

    #[test]
    fn older_pages_print_under_a_marker() {
        let mut presenter = TerminalPresenter::new(Vec::new());
        let mut messages = VecDeque::from([chat("alice", "new")]);
        presenter.render(&messages);

        messages.push_front(chat("carol", "old"));
        presenter.render(&messages);

        assert_eq!(
            output(presenter),
            "alice: new\n-- older --\ncarol: old\n-- end of older --\n"
        );
    }

    #[test]
    fn anonymous_sender_fallback() {
        assert_eq!(format_message(&chat("", "hi")), "anonymous: hi");
    }

    #[test]
    fn terminal_errors_suggest_reconnect() {
        let mut presenter = TerminalPresenter::new(Vec::new());
        presenter.connection_changed(&ConnectionSnapshot {
            state: ConnectionState::Disconnected,
            last_error: Some(SessionError::Terminal { failures: 11 }),
        });

        assert!(output(presenter).contains("/reconnect"));
    }
}
