//! Document-length buckets for cache size, initial burst and render quality

/// Settings chosen once per document load from its page count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizingPolicy {
    /// Maximum number of rendered pages kept after an eviction pass
    pub buffer_size: usize,
    /// Number of leading pages rendered before the session becomes ready
    pub initial_burst: usize,
    /// Encoding quality in (0, 1]
    pub quality: f32,
}

impl SizingPolicy {
    pub const SMALL: Self = Self::bucket(20, 6, 0.8);
    pub const MEDIUM: Self = Self::bucket(10, 4, 0.7);
    pub const LARGE: Self = Self::bucket(6, 2, 0.6);
    pub const VERY_LARGE: Self = Self::bucket(4, 2, 0.5);

    const fn bucket(buffer_size: usize, initial_burst: usize, quality: f32) -> Self {
        Self {
            buffer_size,
            initial_burst,
            quality,
        }
    }

    /// Pick the bucket for a document of `page_count` pages
    #[must_use]
    pub fn for_page_count(page_count: usize) -> Self {
        match page_count {
            0..=50 => Self::SMALL,
            51..=200 => Self::MEDIUM,
            201..=500 => Self::LARGE,
            _ => Self::VERY_LARGE,
        }
    }
}

/// Shorthand for [`SizingPolicy::for_page_count`]
#[must_use]
pub fn size(page_count: usize) -> SizingPolicy {
    SizingPolicy::for_page_count(page_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries() {
        assert_eq!(size(0), SizingPolicy::SMALL);
        assert_eq!(size(50), SizingPolicy::SMALL);
        assert_eq!(size(51), SizingPolicy::MEDIUM);
        assert_eq!(size(200), SizingPolicy::MEDIUM);
        assert_eq!(size(201), SizingPolicy::LARGE);
        assert_eq!(size(500), SizingPolicy::LARGE);
        assert_eq!(size(501), SizingPolicy::VERY_LARGE);
    }

    #[test]
    fn very_large_document_settings() {
        let policy = size(600);
        assert_eq!(policy.buffer_size, 4);
        assert_eq!(policy.initial_burst, 2);
        assert!((policy.quality - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn buffer_size_never_grows_with_page_count() {
        let mut previous = usize::MAX;
        for n in 0..2_000 {
            let buffer = size(n).buffer_size;
            assert!(buffer <= previous, "buffer grew at n={n}");
            previous = buffer;
        }
    }

    #[test]
    fn quality_stays_in_unit_interval() {
        for n in [1, 50, 51, 200, 201, 500, 501, 10_000] {
            let q = size(n).quality;
            assert!(q > 0.0 && q <= 1.0);
        }
    }
}
