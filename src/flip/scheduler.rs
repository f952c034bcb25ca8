//! Prefetch planning
//!
//! Turns the current position and direction of travel into tiers of pages
//! to render. Planning is pure: filtering out cached and in-flight pages and
//! dispatching renders is the session's job.

/// Pages beyond the next spread fetched in the direction of travel
pub const DIRECTIONAL_RUN: usize = 4;

/// Direction of the last movement
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    /// Direction after moving from `last_index` to `current_index`.
    /// No movement keeps `previous`.
    #[must_use]
    pub fn after_move(previous: Self, last_index: usize, current_index: usize) -> Self {
        match current_index.cmp(&last_index) {
            std::cmp::Ordering::Greater => Self::Forward,
            std::cmp::Ordering::Less => Self::Backward,
            std::cmp::Ordering::Equal => previous,
        }
    }
}

/// Priority class of a prefetch candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// The spread on screen; awaited before a schedule call returns
    Visible = 1,
    /// The next spread plus the directional run
    Next = 2,
    /// The previous spread
    Previous = 3,
}

/// Candidate pages (1-based) for one position, grouped by tier
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefetchPlan {
    pub visible: Vec<usize>,
    pub next: Vec<usize>,
    pub previous: Vec<usize>,
}

impl PrefetchPlan {
    /// Union of all tiers in priority order, each page listed once
    #[must_use]
    pub fn ordered(&self) -> Vec<(usize, Tier)> {
        let mut out: Vec<(usize, Tier)> = Vec::new();
        let tiers = [
            (Tier::Visible, &self.visible),
            (Tier::Next, &self.next),
            (Tier::Previous, &self.previous),
        ];
        for (tier, pages) in tiers {
            for &page in pages {
                if !out.iter().any(|&(p, _)| p == page) {
                    out.push((page, tier));
                }
            }
        }
        out
    }

    /// Highest-priority tier a page belongs to
    #[must_use]
    pub fn tier_of(&self, page: usize) -> Option<Tier> {
        self.ordered()
            .into_iter()
            .find(|&(p, _)| p == page)
            .map(|(_, tier)| tier)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.next.is_empty() && self.previous.is_empty()
    }
}

/// 1-based pages of the spread holding 0-based `current_index`, clipped to the document
#[must_use]
pub fn current_spread(current_index: usize, total_pages: usize) -> Vec<usize> {
    let start = spread_start(current_index);
    pages_in(start..start + 2, total_pages)
}

/// Plan the pages to render for a position.
///
/// `current_index` is 0-based; returned page numbers are 1-based and never
/// exceed `total_pages`.
#[must_use]
pub fn schedule(current_index: usize, total_pages: usize, direction: Direction) -> PrefetchPlan {
    if total_pages == 0 {
        return PrefetchPlan::default();
    }

    let start = spread_start(current_index);
    let next_start = start + 2;

    let visible = pages_in(start..start + 2, total_pages);

    let mut next = pages_in(next_start..next_start + 2, total_pages);
    match direction {
        Direction::Forward => {
            let run_start = next_start + 2;
            next.extend(pages_in(run_start..run_start + DIRECTIONAL_RUN, total_pages));
        }
        Direction::Backward => {
            if let Some(prev_start) = start.checked_sub(2) {
                let run_start = prev_start.saturating_sub(DIRECTIONAL_RUN);
                next.extend(pages_in(run_start..prev_start, total_pages));
            }
        }
    }

    let previous = match start.checked_sub(2) {
        Some(prev_start) => pages_in(prev_start..start, total_pages),
        None => Vec::new(),
    };

    PrefetchPlan {
        visible,
        next,
        previous,
    }
}

fn spread_start(index: usize) -> usize {
    (index / 2) * 2
}

/// 1-based page numbers for a range of 0-based indices, clipped to the document
fn pages_in(indices: std::ops::Range<usize>, total_pages: usize) -> Vec<usize> {
    indices.filter(|&i| i < total_pages).map(|i| i + 1).collect()
}
