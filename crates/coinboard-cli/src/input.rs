//! Line input mapping.

use coinboard_client::DriverEvent;

/// Map one line of user input to a runtime event.
///
/// Slash commands control the session; anything else is a chat message.
/// Blank lines are submitted too, so the empty-message notice shows.
pub fn parse_line(line: &str) -> DriverEvent {
    match line.trim() {
        "/quit" | "/exit" => DriverEvent::Quit,
        "/older" => DriverEvent::ScrolledToTop,
        "/reconnect" => DriverEvent::Reconnect,
        _ => DriverEvent::Submit(line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_recognized() {
        assert_eq!(parse_line("/quit"), DriverEvent::Quit);
        assert_eq!(parse_line("  /older "), DriverEvent::ScrolledToTop);
        assert_eq!(parse_line("/reconnect"), DriverEvent::Reconnect);
    }

    #[test]
    fn other_text_is_submitted_verbatim() {
        assert_eq!(parse_line("gm /quit"), DriverEvent::Submit("gm /quit".to_string()));
        assert_eq!(parse_line(""), DriverEvent::Submit(String::new()));
    }
}
