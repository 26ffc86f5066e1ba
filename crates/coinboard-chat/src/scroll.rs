//! Scroll anchoring.
//!
//! Pure viewport arithmetic. A buffer mutation records an [`Anchor`]; once
//! the renderer reports the new content extent the anchor resolves into a
//! single offset. All math is in whole pixels and saturates.

/// Distance from the bottom, in pixels, that still counts as "at the bottom".
pub const DEFAULT_BOTTOM_THRESHOLD: u32 = 80;

/// Scroll position of the message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Distance scrolled from the top.
    pub offset: u32,
    /// Height of all rendered content.
    pub content_extent: u32,
    /// Height of the visible area.
    pub viewport_extent: u32,
}

impl Viewport {
    /// Largest valid offset (scrolled fully to the bottom).
    pub fn max_offset(&self) -> u32 {
        self.content_extent.saturating_sub(self.viewport_extent)
    }

    /// Pixels between the visible bottom edge and the end of the content.
    pub fn distance_from_bottom(&self) -> u32 {
        self.max_offset().saturating_sub(self.offset)
    }

    /// Whether the view is within `threshold` pixels of the bottom.
    pub fn is_near_bottom(&self, threshold: u32) -> bool {
        self.distance_from_bottom() <= threshold
    }
}

/// Pending viewport adjustment, resolved after the next layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Content was inserted above; keep what the user sees in place.
    KeepOffset {
        /// Content extent before the insertion.
        before_extent: u32,
        /// Offset before the insertion.
        before_offset: u32,
    },
    /// Follow the end of the content.
    StickToBottom,
}

impl Anchor {
    /// Offset to scroll to once the content measures `content_extent`.
    pub fn resolve(self, content_extent: u32, viewport_extent: u32) -> u32 {
        let max = content_extent.saturating_sub(viewport_extent);
        match self {
            Self::KeepOffset { before_extent, before_offset } => {
                anchored_offset(before_offset, before_extent, content_extent).min(max)
            },
            Self::StickToBottom => max,
        }
    }
}

/// Offset that keeps content below an insertion point visually fixed.
///
/// The inserted height is the growth in extent; it is added to the old
/// offset. A shrinking extent leaves the offset unchanged.
pub fn anchored_offset(before_offset: u32, before_extent: u32, after_extent: u32) -> u32 {
    before_offset.saturating_add(after_extent.saturating_sub(before_extent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_bottom_threshold() {
        let viewport = Viewport { offset: 420, content_extent: 1_000, viewport_extent: 500 };
        assert_eq!(viewport.distance_from_bottom(), 80);
        assert!(viewport.is_near_bottom(80));
        assert!(!viewport.is_near_bottom(79));
    }

    #[test]
    fn short_content_is_always_at_bottom() {
        let viewport = Viewport { offset: 0, content_extent: 200, viewport_extent: 500 };
        assert_eq!(viewport.max_offset(), 0);
        assert!(viewport.is_near_bottom(0));
    }

    #[test]
    fn keep_offset_adds_inserted_height() {
        let anchor = Anchor::KeepOffset { before_extent: 1_000, before_offset: 0 };
        assert_eq!(anchor.resolve(1_600, 500), 600);
    }

    #[test]
    fn keep_offset_clamps_to_content() {
        let anchor = Anchor::KeepOffset { before_extent: 1_000, before_offset: 500 };
        assert_eq!(anchor.resolve(900, 500), 400);
    }

    #[test]
    fn stick_to_bottom() {
        assert_eq!(Anchor::StickToBottom.resolve(1_600, 500), 1_100);
        assert_eq!(Anchor::StickToBottom.resolve(100, 500), 0);
    }

    #[test]
    fn saturates() {
        assert_eq!(anchored_offset(u32::MAX, 0, 10), u32::MAX);
        assert_eq!(anchored_offset(10, 50, 20), 10);
    }
}
