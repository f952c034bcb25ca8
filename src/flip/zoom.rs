//! Zoom state for page rasterization
//!
//! The zoom factor multiplies the base rasterization scale. Any effective
//! change makes every cached bitmap stale.

/// Zoom state for flip-book viewing
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Zoom {
    /// Current zoom factor (1.0 = 100%)
    factor: f32,
}

impl Default for Zoom {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl Zoom {
    /// Zoom change per step
    pub const STEP: f32 = 0.25;
    /// Minimum allowed zoom factor
    pub const MIN_FACTOR: f32 = 0.5;
    /// Maximum allowed zoom factor
    pub const MAX_FACTOR: f32 = 3.0;
    /// Rasterization scale at 100% zoom
    pub const BASE_SCALE: f32 = 1.5;

    /// Zoom at a given factor, clamped to the allowed range
    #[must_use]
    pub fn with_factor(factor: f32) -> Self {
        Self {
            factor: Self::clamp_factor(factor),
        }
    }

    /// Returns the current zoom factor
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Rasterization scale for a base scale at this zoom
    pub fn scale(&self, base_scale: f32) -> f32 {
        base_scale * self.factor
    }

    /// Zoom in by one step. Returns true if the factor changed.
    pub fn step_in(&mut self) -> bool {
        self.set(self.factor + Self::STEP)
    }

    /// Zoom out by one step. Returns true if the factor changed.
    pub fn step_out(&mut self) -> bool {
        self.set(self.factor - Self::STEP)
    }

    /// Back to 100%. Returns true if the factor changed.
    pub fn reset(&mut self) -> bool {
        self.set(1.0)
    }

    /// Set the factor, clamped. Returns true if the factor changed.
    pub fn set(&mut self, factor: f32) -> bool {
        let clamped = Self::clamp_factor(factor);
        if (self.factor - clamped).abs() > f32::EPSILON {
            self.factor = clamped;
            true
        } else {
            false
        }
    }

    /// Whole-percent label, e.g. `125%`
    pub fn percent(&self) -> u32 {
        (self.factor * 100.0).round() as u32
    }

    fn clamp_factor(factor: f32) -> f32 {
        if factor.is_nan() {
            return 1.0;
        }
        factor.clamp(Self::MIN_FACTOR, Self::MAX_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_quarter_increments() {
        let mut zoom = Zoom::default();
        assert!(zoom.step_in());
        assert_eq!(zoom.percent(), 125);
        assert!(zoom.step_out());
        assert!(zoom.step_out());
        assert_eq!(zoom.percent(), 75);
    }

    #[test]
    fn clamps_at_bounds() {
        let mut zoom = Zoom::with_factor(3.0);
        assert!(!zoom.step_in());
        assert_eq!(zoom.factor(), 3.0);

        let mut zoom = Zoom::with_factor(0.1);
        assert_eq!(zoom.factor(), 0.5);
        assert!(!zoom.step_out());
    }

    #[test]
    fn reset_reports_change_only_when_needed() {
        let mut zoom = Zoom::default();
        assert!(!zoom.reset());
        zoom.step_in();
        assert!(zoom.reset());
        assert_eq!(zoom.factor(), 1.0);
    }

    #[test]
    fn scale_multiplies_base() {
        let zoom = Zoom::with_factor(2.0);
        assert!((zoom.scale(Zoom::BASE_SCALE) - 3.0).abs() < f32::EPSILON);
    }
}
