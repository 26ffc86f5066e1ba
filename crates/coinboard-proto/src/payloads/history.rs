//! Chat history page request and response.
//!
//! Page 0 is the newest page; each page is ordered oldest-first.

use serde::{Deserialize, Serialize};

use crate::{errors::Result, payloads::ChatMessage};

/// Request for one history page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Page index, 0 = newest.
    pub page: u32,
    /// Page size.
    pub size: u32,
}

impl HistoryRequest {
    /// Query-string pairs for the HTTP request.
    pub fn query(&self) -> [(&'static str, String); 2] {
        [("page", self.page.to_string()), ("size", self.size.to_string())]
    }
}

/// Response body: a bare list, or a paged object with a `content` list.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryBody {
    List(Vec<ChatMessage>),
    Paged { content: Vec<ChatMessage> },
}

/// Parse a history response body into messages, oldest first.
pub fn decode_page(body: &str) -> Result<Vec<ChatMessage>> {
    let messages = match serde_json::from_str::<HistoryBody>(body)? {
        HistoryBody::List(messages) | HistoryBody::Paged { content: messages } => messages,
    };
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_bare_list() {
        let page = decode_page(r#"[{"content": "a"}, {"content": "b"}]"#).unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a", "b"]);
    }

    #[test]
    fn decode_paged_object() {
        let page = decode_page(r#"{"content": [{"content": "a"}], "last": false}"#).unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn query_pairs() {
        let request = HistoryRequest { page: 2, size: 30 };
        assert_eq!(request.query(), [("page", "2".to_string()), ("size", "30".to_string())]);
    }
}
