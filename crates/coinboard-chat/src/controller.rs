//! Chat stream state machine.
//!
//! Binds one chat session to a topic on the shared connection. Merges three
//! sources into one ordered buffer: the initial history page, older pages
//! loaded on scroll-to-top, and live pushes. Older pages go on the front,
//! live messages on the back, so the two never interleave.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  mount   ┌───────────────────────┐  page 0   ┌──────┐
//! │ Idle │─────────>│ LoadingInitialHistory │──────────>│ Live │──┐ scrolled_to_top
//! └──────┘          └───────────────────────┘           └──────┘<─┘ (older page in flight)
//!    ^                                                      │
//!    └──────────────────────── unmount ─────────────────────┘
//! ```

use std::{collections::VecDeque, time::Duration};

use coinboard_core::{Denial, RateLimitConfig, RateLimiter, Timestamp};
use coinboard_proto::{ChatMessage, ChatOutbound, HistoryRequest, MAX_BODY_SIZE, Message};
use thiserror::Error;

use crate::{
    cursor::{DEFAULT_PAGE_SIZE, PaginationCursor},
    scroll::{Anchor, DEFAULT_BOTTOM_THRESHOLD, Viewport},
};

/// Interval between chat-level heartbeat publishes while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before the single retry of a send made while disconnected.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_500);

/// Chat session configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat room identifier carried in outbound payloads.
    pub chat_id: String,
    /// Topic inbound messages are pushed to.
    pub topic: String,
    /// Destination outbound messages and heartbeats are sent to.
    pub destination: String,
    /// Messages per history page.
    pub page_size: u32,
    /// Heartbeat publish interval.
    pub heartbeat_interval: Duration,
    /// Delay before retrying a send made while disconnected.
    pub retry_delay: Duration,
    /// Distance from the bottom that still auto-scrolls on new messages.
    pub bottom_threshold: u32,
    /// Whether the user is logged in.
    pub authenticated: bool,
    /// Send throttling.
    pub rate_limit: RateLimitConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            chat_id: "global".to_string(),
            topic: "/topic/chat".to_string(),
            destination: "/app/chat.send".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            bottom_threshold: DEFAULT_BOTTOM_THRESHOLD,
            authenticated: false,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// User-facing outcome the UI should surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatNotice {
    /// Send refused by the rate limiter or for empty content.
    #[error("{0}")]
    Denied(Denial),

    /// History page could not be loaded; scrolling up again retries.
    #[error("could not load chat history: {0}")]
    HistoryFailed(String),

    /// Message is too large to fit in one frame; nothing was sent.
    #[error("message too large ({size} bytes, limit {max})")]
    TooLarge {
        /// Encoded size in bytes
        size: usize,
        /// Frame body limit
        max: usize,
    },

    /// Send failed after its reconnect-and-retry, or the connection refused it.
    #[error("message not sent, connection unavailable")]
    SendFailed,
}

/// Actions returned by the chat controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Subscribe to the chat topic on the shared connection
    Subscribe {
        /// Topic to subscribe to
        topic: String,
    },

    /// Unsubscribe from the chat topic
    Unsubscribe {
        /// Topic to unsubscribe from
        topic: String,
    },

    /// Fetch a history page over HTTP, report via
    /// [`ChatStreamController::handle_history`]
    FetchHistory(HistoryRequest),

    /// Publish a JSON body on the shared connection
    Publish {
        /// Destination to publish to
        destination: String,
        /// JSON body
        body: String,
    },

    /// Ask the connection manager to connect
    Reconnect,

    /// Move the viewport to this offset
    ScrollTo(u32),

    /// Show this notice to the user
    Notify(ChatNotice),

    /// Buffer changed; re-render and report the new extent via
    /// [`ChatStreamController::handle_layout`]
    Render,
}

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    /// Not mounted.
    Idle,
    /// Waiting for history page 0.
    LoadingInitialHistory,
    /// Steady state. An older page may be in flight.
    Live,
}

#[derive(Debug, Clone)]
struct PendingSend<I> {
    body: String,
    deadline: I,
}

/// Chat stream controller.
///
/// Pure state machine: takes events and time, returns [`ChatAction`]s.
#[derive(Debug)]
pub struct ChatStreamController<I> {
    config: ChatConfig,
    phase: ChatPhase,
    messages: VecDeque<ChatMessage>,
    cursor: PaginationCursor,
    limiter: RateLimiter<I>,
    viewport: Viewport,
    anchor: Option<Anchor>,
    pending_send: Option<PendingSend<I>>,
    last_heartbeat: Option<I>,
}

impl<I: Timestamp> ChatStreamController<I> {
    /// Unmounted controller with an empty buffer.
    pub fn new(config: ChatConfig) -> Self {
        Self {
            cursor: PaginationCursor::new(config.page_size),
            limiter: RateLimiter::new(config.rate_limit),
            config,
            phase: ChatPhase::Idle,
            messages: VecDeque::new(),
            viewport: Viewport::default(),
            anchor: None,
            pending_send: None,
            last_heartbeat: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    /// Buffered messages, oldest first.
    pub fn messages(&self) -> &VecDeque<ChatMessage> {
        &self.messages
    }

    /// History position.
    pub fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    /// Last known viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Chat configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// True while an older page is being fetched after the initial load.
    pub fn is_loading_more(&self) -> bool {
        self.phase == ChatPhase::Live && self.cursor.in_flight().is_some()
    }

    /// True while a send made during a disconnect waits for its retry.
    pub fn has_pending_send(&self) -> bool {
        self.pending_send.is_some()
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        let retry = self.pending_send.as_ref().map(|p| p.deadline);
        let heartbeat = self.last_heartbeat.map(|last| last + self.config.heartbeat_interval);
        match (retry, heartbeat) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Start the session: subscribe and fetch the newest history page.
    pub fn mount(&mut self, now: I) -> Vec<ChatAction> {
        if self.phase != ChatPhase::Idle {
            return vec![];
        }

        tracing::debug!(topic = %self.config.topic, "chat mounted");
        self.phase = ChatPhase::LoadingInitialHistory;
        self.last_heartbeat = Some(now);

        let mut actions = vec![ChatAction::Subscribe { topic: self.config.topic.clone() }];
        actions.extend(self.cursor.begin().map(ChatAction::FetchHistory));
        actions
    }

    /// End the session. The buffer and history position are discarded.
    pub fn unmount(&mut self) -> Vec<ChatAction> {
        if self.phase == ChatPhase::Idle {
            return vec![];
        }

        tracing::debug!(topic = %self.config.topic, "chat unmounted");
        self.phase = ChatPhase::Idle;
        self.messages.clear();
        self.cursor = PaginationCursor::new(self.config.page_size);
        self.anchor = None;
        self.pending_send = None;
        self.last_heartbeat = None;
        vec![ChatAction::Unsubscribe { topic: self.config.topic.clone() }]
    }

    /// Result of a [`ChatAction::FetchHistory`].
    ///
    /// Responses for pages not in flight are dropped. A failure clears the
    /// in-flight flag and leaves the position unchanged so the user can
    /// retry.
    pub fn handle_history(
        &mut self,
        page: u32,
        result: Result<Vec<ChatMessage>, String>,
    ) -> Vec<ChatAction> {
        if self.phase == ChatPhase::Idle {
            tracing::debug!(page, "history for unmounted chat dropped");
            return vec![];
        }
        let initial = self.phase == ChatPhase::LoadingInitialHistory;

        let history = match result {
            Ok(history) => history,
            Err(detail) => {
                if !self.cursor.fail(page) {
                    tracing::debug!(page, "stale history failure dropped");
                    return vec![];
                }
                tracing::warn!(page, %detail, "history fetch failed");
                self.phase = ChatPhase::Live;
                return vec![ChatAction::Notify(ChatNotice::HistoryFailed(detail))];
            },
        };

        if !self.cursor.complete(page, history.len()) {
            tracing::debug!(page, "stale history page dropped");
            return vec![];
        }

        let before = self.viewport;
        let count = history.len();
        for message in history.into_iter().rev().filter(|m| !m.is_heartbeat) {
            self.messages.push_front(message);
        }
        tracing::debug!(page, count, has_more = self.cursor.has_more(), "history page prepended");

        if initial {
            self.phase = ChatPhase::Live;
            self.anchor = Some(Anchor::StickToBottom);
        } else {
            let stick = self.anchor == Some(Anchor::StickToBottom)
                && before.is_near_bottom(self.config.bottom_threshold);
            if !stick {
                self.anchor = Some(Anchor::KeepOffset {
                    before_extent: before.content_extent,
                    before_offset: before.offset,
                });
            }
        }

        vec![ChatAction::Render]
    }

    /// Message pushed on the chat topic.
    ///
    /// Heartbeats are discarded. Others are appended; the view follows
    /// only if it was near the bottom.
    pub fn handle_message(&mut self, message: &Message) -> Vec<ChatAction> {
        if self.phase == ChatPhase::Idle {
            return vec![];
        }

        let chat = match ChatMessage::from_json(&message.body) {
            Ok(chat) => chat,
            Err(e) => {
                tracing::warn!(destination = %message.destination, error = %e, "malformed chat message dropped");
                return vec![];
            },
        };
        if chat.is_heartbeat {
            return vec![];
        }

        if self.viewport.is_near_bottom(self.config.bottom_threshold) {
            self.anchor = Some(Anchor::StickToBottom);
        }
        self.messages.push_back(chat);
        vec![ChatAction::Render]
    }

    /// Viewport moved or resized.
    pub fn handle_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Renderer measured the content after a [`ChatAction::Render`].
    ///
    /// Resolves the pending anchor, if any, into one scroll.
    pub fn handle_layout(&mut self, content_extent: u32) -> Vec<ChatAction> {
        self.viewport.content_extent = content_extent;
        let Some(anchor) = self.anchor.take() else {
            return vec![];
        };

        let offset = anchor.resolve(content_extent, self.viewport.viewport_extent);
        self.viewport.offset = offset;
        vec![ChatAction::ScrollTo(offset)]
    }

    /// User reached the top of the list: load the next older page.
    ///
    /// No-op before the initial load completes, while a fetch is in flight,
    /// or once history is exhausted.
    pub fn scrolled_to_top(&mut self) -> Vec<ChatAction> {
        if self.phase != ChatPhase::Live {
            return vec![];
        }
        match self.cursor.begin() {
            Some(request) => {
                tracing::debug!(page = request.page, "loading older history");
                vec![ChatAction::FetchHistory(request)]
            },
            None => vec![],
        }
    }

    /// User submitted `content`.
    ///
    /// Oversized messages are refused before the rate limiter counts them.
    /// Then throttled. While disconnected, asks for a reconnect and keeps a
    /// single retry; a further submit during that window fails at once.
    pub fn submit(&mut self, content: &str, now: I, connected: bool) -> Vec<ChatAction> {
        if self.phase == ChatPhase::Idle {
            return vec![];
        }

        let outbound =
            ChatOutbound::message(&self.config.chat_id, content.trim(), self.config.authenticated);
        let body = match outbound.to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "chat message could not be encoded");
                return vec![ChatAction::Notify(ChatNotice::SendFailed)];
            },
        };
        if body.len() > MAX_BODY_SIZE {
            tracing::warn!(size = body.len(), "chat message too large");
            return vec![ChatAction::Notify(ChatNotice::TooLarge {
                size: body.len(),
                max: MAX_BODY_SIZE,
            })];
        }

        if let Err(denial) = self.limiter.check_send(content, now) {
            return vec![ChatAction::Notify(ChatNotice::Denied(denial))];
        }

        if connected {
            return self.publish_own(body);
        }

        if self.pending_send.is_some() {
            tracing::warn!("send while a retry is pending and still disconnected");
            return vec![ChatAction::Notify(ChatNotice::SendFailed)];
        }

        tracing::info!(delay = ?self.config.retry_delay, "send while disconnected, reconnecting");
        self.pending_send = Some(PendingSend { body, deadline: now + self.config.retry_delay });
        vec![ChatAction::Reconnect]
    }

    /// Periodic maintenance: the pending send retry and heartbeats.
    pub fn tick(&mut self, now: I, connected: bool) -> Vec<ChatAction> {
        if self.phase == ChatPhase::Idle {
            return vec![];
        }
        let mut actions = Vec::new();

        if self.pending_send.as_ref().is_some_and(|p| now >= p.deadline) {
            if let Some(pending) = self.pending_send.take() {
                if connected {
                    actions.extend(self.publish_own(pending.body));
                } else {
                    tracing::warn!("send retry failed, still disconnected");
                    actions.push(ChatAction::Notify(ChatNotice::SendFailed));
                }
            }
        }

        if connected {
            let due = self
                .last_heartbeat
                .is_none_or(|last| now - last >= self.config.heartbeat_interval);
            if due {
                self.last_heartbeat = Some(now);
                match ChatOutbound::heartbeat(&self.config.chat_id, self.config.authenticated)
                    .to_json()
                {
                    Ok(body) => actions.push(ChatAction::Publish {
                        destination: self.config.destination.clone(),
                        body,
                    }),
                    Err(e) => tracing::warn!(error = %e, "heartbeat could not be encoded"),
                }
            }
        }

        actions
    }

    fn publish_own(&mut self, body: String) -> Vec<ChatAction> {
        let bottom = self.viewport.max_offset();
        self.viewport.offset = bottom;
        self.anchor = Some(Anchor::StickToBottom);
        vec![
            ChatAction::Publish { destination: self.config.destination.clone(), body },
            ChatAction::ScrollTo(bottom),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn chat(n: usize) -> ChatMessage {
        ChatMessage {
            sender_id: format!("u{n}"),
            sender_name: format!("user {n}"),
            content: format!("message {n}"),
            sent_at_millis: n as i64,
            ..ChatMessage::default()
        }
    }

    fn page(range: std::ops::Range<usize>) -> Vec<ChatMessage> {
        range.map(chat).collect()
    }

    fn push(n: usize) -> Message {
        let body = format!(
            r#"{{"senderId":"u{n}","senderName":"user {n}","content":"message {n}","sentAt":{n}}}"#
        );
        Message::new("/topic/chat", body)
    }

    fn contents(controller: &ChatStreamController<Instant>) -> Vec<String> {
        controller.messages().iter().map(|m| m.content.clone()).collect()
    }

    /// Mounted controller with a full page 0 (messages 100..130) loaded.
    fn live(t0: Instant) -> ChatStreamController<Instant> {
        let mut controller = ChatStreamController::new(ChatConfig::default());
        controller.mount(t0);
        controller.handle_history(0, Ok(page(100..130)));
        controller.handle_viewport(Viewport {
            offset: 2_500,
            content_extent: 3_000,
            viewport_extent: 500,
        });
        controller.handle_layout(3_000);
        controller
    }

    #[test]
    fn mount_subscribes_and_fetches_first_page() {
        let mut controller = ChatStreamController::new(ChatConfig::default());
        let actions = controller.mount(Instant::now());

        assert_eq!(actions, vec![
            ChatAction::Subscribe { topic: "/topic/chat".to_string() },
            ChatAction::FetchHistory(HistoryRequest { page: 0, size: 30 }),
        ]);
        assert_eq!(controller.phase(), ChatPhase::LoadingInitialHistory);
        assert_eq!(controller.mount(Instant::now()), vec![]);
    }

    #[test]
    fn initial_load_scrolls_to_bottom_once() {
        let mut controller = ChatStreamController::new(ChatConfig::default());
        controller.mount(Instant::now());
        controller.handle_viewport(Viewport { offset: 0, content_extent: 0, viewport_extent: 500 });

        assert_eq!(controller.handle_history(0, Ok(page(0..30))), vec![ChatAction::Render]);
        assert_eq!(controller.phase(), ChatPhase::Live);
        assert_eq!(controller.handle_layout(3_000), vec![ChatAction::ScrollTo(2_500)]);
        assert_eq!(controller.handle_layout(3_000), vec![]);
    }

    #[test]
    fn older_page_keeps_anchor() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        controller.handle_viewport(Viewport { offset: 0, content_extent: 3_000, viewport_extent: 500 });

        assert_eq!(controller.scrolled_to_top(), vec![ChatAction::FetchHistory(HistoryRequest {
            page: 1,
            size: 30
        })]);
        assert!(controller.is_loading_more());
        assert_eq!(controller.scrolled_to_top(), vec![]);

        controller.handle_history(1, Ok(page(70..100)));
        assert_eq!(controller.handle_layout(6_000), vec![ChatAction::ScrollTo(3_000)]);
        assert_eq!(contents(&controller).first().map(String::as_str), Some("message 70"));
        assert_eq!(controller.messages().len(), 60);
    }

    #[test]
    fn short_page_ends_history() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        controller.scrolled_to_top();
        controller.handle_history(1, Ok(page(90..100)));

        assert!(!controller.cursor().has_more());
        assert_eq!(controller.scrolled_to_top(), vec![]);
    }

    #[test]
    fn history_failure_notifies_and_allows_retry() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        controller.scrolled_to_top();

        let actions = controller.handle_history(1, Err("502 Bad Gateway".to_string()));
        assert_eq!(actions, vec![ChatAction::Notify(ChatNotice::HistoryFailed(
            "502 Bad Gateway".to_string()
        ))]);
        assert!(controller.cursor().has_more());
        assert!(!controller.is_loading_more());
        assert_eq!(controller.scrolled_to_top(), vec![ChatAction::FetchHistory(HistoryRequest {
            page: 1,
            size: 30
        })]);
    }

    #[test]
    fn stale_history_dropped() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        assert_eq!(controller.handle_history(0, Ok(page(0..30))), vec![]);
        assert_eq!(controller.messages().len(), 30);
    }

    #[test]
    fn live_append_follows_only_near_bottom() {
        let t0 = Instant::now();
        let mut controller = live(t0);

        assert_eq!(controller.handle_message(&push(130)), vec![ChatAction::Render]);
        assert_eq!(controller.handle_layout(3_100), vec![ChatAction::ScrollTo(2_600)]);

        controller.handle_viewport(Viewport { offset: 1_000, content_extent: 3_100, viewport_extent: 500 });
        controller.handle_message(&push(131));
        assert_eq!(controller.handle_layout(3_200), vec![]);
        assert_eq!(controller.viewport().offset, 1_000);
    }

    #[test]
    fn live_append_during_fetch_stays_at_tail() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        controller.handle_viewport(Viewport { offset: 0, content_extent: 3_000, viewport_extent: 500 });
        controller.scrolled_to_top();

        controller.handle_message(&push(130));
        controller.handle_history(1, Ok(page(70..100)));

        let contents = contents(&controller);
        assert_eq!(contents.len(), 61);
        assert_eq!(contents[0], "message 70");
        assert_eq!(contents[60], "message 130");
    }

    #[test]
    fn heartbeats_and_garbage_are_not_buffered() {
        let t0 = Instant::now();
        let mut controller = live(t0);

        let ping = Message::new("/topic/chat", r#"{"ping":true,"chatId":"global","content":""}"#);
        assert_eq!(controller.handle_message(&ping), vec![]);
        assert_eq!(controller.handle_message(&Message::new("/topic/chat", "not json")), vec![]);
        assert_eq!(controller.messages().len(), 30);
    }

    #[test]
    fn connected_send_publishes_and_scrolls() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        controller.handle_viewport(Viewport { offset: 100, content_extent: 3_000, viewport_extent: 500 });

        let actions = controller.submit("  hello  ", t0, true);
        assert_eq!(actions.len(), 2);
        let ChatAction::Publish { destination, body } = &actions[0] else {
            panic!("expected publish, got {actions:?}");
        };
        assert_eq!(destination, "/app/chat.send");
        assert_eq!(
            body,
            r#"{"ping":false,"chatId":"global","content":"hello","authenticated":false}"#
        );
        assert_eq!(actions[1], ChatAction::ScrollTo(2_500));
    }

    #[test]
    fn denied_sends_surface_reason() {
        let t0 = Instant::now();
        let mut controller = live(t0);

        assert_eq!(controller.submit(" ", t0, true), vec![ChatAction::Notify(ChatNotice::Denied(
            Denial::Empty
        ))]);
        for _ in 0..5 {
            controller.submit("spam", t0, true);
        }
        assert_eq!(controller.submit("spam", t0, true), vec![ChatAction::Notify(
            ChatNotice::Denied(Denial::RateExceeded { cooldown_secs: 5 })
        )]);
    }

    #[test]
    fn oversized_send_is_refused_without_counting() {
        let t0 = Instant::now();
        let mut controller = live(t0);

        let actions = controller.submit(&"x".repeat(MAX_BODY_SIZE), t0, true);
        assert!(matches!(
            actions.as_slice(),
            [ChatAction::Notify(ChatNotice::TooLarge { max: MAX_BODY_SIZE, .. })]
        ));

        // The refused send did not use up the window
        for _ in 0..5 {
            assert!(matches!(controller.submit("ok", t0, true)[0], ChatAction::Publish { .. }));
        }
    }

    #[test]
    fn disconnected_send_retries_once() {
        let t0 = Instant::now();
        let mut controller = live(t0);

        assert_eq!(controller.submit("hello", t0, false), vec![ChatAction::Reconnect]);
        assert!(controller.has_pending_send());
        assert_eq!(controller.tick(t0 + Duration::from_millis(1_000), false), vec![]);

        let actions = controller.tick(t0 + Duration::from_millis(1_500), true);
        assert!(matches!(actions[0], ChatAction::Publish { .. }));
        assert!(!controller.has_pending_send());
    }

    #[test]
    fn retry_still_disconnected_fails() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        controller.submit("hello", t0, false);

        let actions = controller.tick(t0 + Duration::from_secs(2), false);
        assert_eq!(actions, vec![ChatAction::Notify(ChatNotice::SendFailed)]);
    }

    #[test]
    fn second_send_during_retry_fails_immediately() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        controller.submit("one", t0, false);

        let actions = controller.submit("two", t0 + Duration::from_millis(200), false);
        assert_eq!(actions, vec![ChatAction::Notify(ChatNotice::SendFailed)]);
        assert!(controller.has_pending_send());
    }

    #[test]
    fn heartbeat_only_while_connected() {
        let t0 = Instant::now();
        let mut controller = live(t0);

        assert_eq!(controller.tick(t0 + Duration::from_secs(29), true), vec![]);
        assert_eq!(controller.tick(t0 + Duration::from_secs(31), false), vec![]);

        let actions = controller.tick(t0 + Duration::from_secs(31), true);
        let [ChatAction::Publish { body, .. }] = actions.as_slice() else {
            panic!("expected heartbeat, got {actions:?}");
        };
        assert!(body.contains(r#""ping":true"#));
        assert_eq!(controller.next_deadline(), Some(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn unmount_unsubscribes_and_resets() {
        let t0 = Instant::now();
        let mut controller = live(t0);
        controller.submit("hello", t0, false);

        assert_eq!(controller.unmount(), vec![ChatAction::Unsubscribe {
            topic: "/topic/chat".to_string()
        }]);
        assert_eq!(controller.phase(), ChatPhase::Idle);
        assert!(controller.messages().is_empty());
        assert!(!controller.has_pending_send());
        assert_eq!(controller.tick(t0 + Duration::from_secs(60), true), vec![]);
    }
}
