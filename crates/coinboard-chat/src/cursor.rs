//! History pagination cursor.

use coinboard_proto::HistoryRequest;

/// Default number of messages per history page.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// Position in the chat history.
///
/// `page_index` is the next page to fetch; page 0 is the newest. At most
/// one fetch is in flight. Once a short page arrives, `has_more` is false
/// for the rest of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    page_index: u32,
    page_size: u32,
    has_more: bool,
    in_flight: Option<u32>,
}

impl PaginationCursor {
    /// Cursor at page 0.
    pub fn new(page_size: u32) -> Self {
        Self { page_index: 0, page_size, has_more: true, in_flight: None }
    }

    /// Next page to fetch.
    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    /// Messages per page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// False once a page came back short.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Page currently being fetched.
    pub fn in_flight(&self) -> Option<u32> {
        self.in_flight
    }

    /// Start fetching the next page.
    ///
    /// Returns `None` while a fetch is in flight or when history is
    /// exhausted.
    pub fn begin(&mut self) -> Option<HistoryRequest> {
        if !self.has_more || self.in_flight.is_some() {
            return None;
        }
        self.in_flight = Some(self.page_index);
        Some(HistoryRequest { page: self.page_index, size: self.page_size })
    }

    /// Record a successful fetch of `page` returning `count` messages.
    ///
    /// Returns false (and changes nothing) if `page` is not in flight.
    pub fn complete(&mut self, page: u32, count: usize) -> bool {
        if self.in_flight != Some(page) {
            return false;
        }
        self.in_flight = None;
        self.page_index += 1;
        if count < self.page_size as usize {
            self.has_more = false;
        }
        true
    }

    /// Record a failed fetch of `page`. The position is unchanged so the
    /// same page can be retried.
    pub fn fail(&mut self, page: u32) -> bool {
        if self.in_flight != Some(page) {
            return false;
        }
        self.in_flight = None;
        true
    }
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}
