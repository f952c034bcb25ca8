//! Viewer adapter boundary
//!
//! The flip widget is handed one entry per spread. Only spreads near the
//! current one carry page slots; the rest stay empty so the widget can
//! paginate without holding every bitmap.

use std::sync::Arc;

use super::types::{Bitmap, spread_count, spread_of};

/// Spreads on either side of the current one that receive page slots
pub const SPREAD_WINDOW: usize = 2;

/// What the viewer should draw for one page
#[derive(Clone, Debug, Default)]
pub enum PageSlot {
    /// Rendered and cached
    Ready(Arc<Bitmap>),
    /// Visible page still rendering
    Loading,
    /// Visible page whose render failed; shown as a placeholder
    Failed,
    /// Nothing to draw
    #[default]
    Empty,
}

impl PageSlot {
    #[must_use]
    pub fn bitmap(&self) -> Option<&Arc<Bitmap>> {
        match self {
            Self::Ready(bitmap) => Some(bitmap),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// One-word label for text front ends
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Loading => "loading",
            Self::Failed => "failed",
            Self::Empty => "-",
        }
    }
}

/// A pair of facing pages
#[derive(Clone, Debug)]
pub struct Spread {
    /// 0-based spread number
    pub index: usize,
    /// 1-based page number of the left page
    pub left_page: usize,
    /// 1-based page number of the right page, `None` past the last page
    pub right_page: Option<usize>,
    pub left: PageSlot,
    pub right: PageSlot,
    /// True for the spread on screen
    pub is_visible: bool,
}

/// Consumer of the renderable set
pub trait ViewerAdapter {
    /// Called with every spread of the document after the set changes
    fn present(&mut self, spreads: &[Spread], current_spread: usize);
}

/// Build every spread of a `page_count` document around 0-based `current_index`.
///
/// `slot_for(page, visible)` resolves the slot of a 1-based page; it is only
/// called for pages within [`SPREAD_WINDOW`] spreads of the current one.
pub fn build_spreads(
    page_count: usize,
    current_index: usize,
    mut slot_for: impl FnMut(usize, bool) -> PageSlot,
) -> Vec<Spread> {
    let current = spread_of(current_index);
    (0..spread_count(page_count))
        .map(|index| {
            let is_visible = index == current;
            let left_page = index * 2 + 1;
            let right_page = (left_page < page_count).then_some(left_page + 1);
            let (left, right) = if index.abs_diff(current) > SPREAD_WINDOW {
                (PageSlot::Empty, PageSlot::Empty)
            } else {
                (
                    slot_for(left_page, is_visible),
                    right_page.map_or(PageSlot::Empty, |page| slot_for(page, is_visible)),
                )
            };
            Spread {
                index,
                left_page,
                right_page,
                left,
                right,
                is_visible,
            }
        })
        .collect()
}
