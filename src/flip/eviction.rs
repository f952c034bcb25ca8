//! Direction-aware eviction
//!
//! Pages behind the direction of travel are treated as further away than
//! they are, so the cache keeps more of what the reader is heading into.

use super::scheduler::Direction;

/// Extra distance charged to pages on the wrong side of the current page
pub const WRONG_SIDE_PENALTY: usize = 10;

/// True if `page` lies behind `current` relative to the direction of travel
#[must_use]
pub fn is_wrong_side(page: usize, current: usize, direction: Direction) -> bool {
    match direction {
        Direction::Forward => page < current,
        Direction::Backward => page > current,
    }
}

/// `|page - current|` plus the wrong-side penalty
#[must_use]
pub fn weighted_distance(page: usize, current: usize, direction: Direction) -> usize {
    let penalty = if is_wrong_side(page, current, direction) {
        WRONG_SIDE_PENALTY
    } else {
        0
    };
    page.abs_diff(current) + penalty
}

/// Choose which cached pages to drop so at most `buffer_size` remain.
///
/// `current` is the 1-based current page number. Pages in `protected` (the
/// visible spread) are never chosen, even if that leaves the cache above
/// `buffer_size`. Victims come back furthest first; ties go to the
/// wrong-side page, then to the higher page number.
#[must_use]
pub fn select_victims(
    cached: &[usize],
    buffer_size: usize,
    current: usize,
    direction: Direction,
    protected: &[usize],
) -> Vec<usize> {
    let excess = cached.len().saturating_sub(buffer_size);
    if excess == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(usize, bool, usize)> = cached
        .iter()
        .copied()
        .filter(|page| !protected.contains(page))
        .map(|page| {
            (
                weighted_distance(page, current, direction),
                is_wrong_side(page, current, direction),
                page,
            )
        })
        .collect();

    ranked.sort_unstable_by(|a, b| b.cmp(a));
    ranked.into_iter().take(excess).map(|(_, _, page)| page).collect()
}
