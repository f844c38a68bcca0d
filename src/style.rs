//! Marker color and radius mapping.
//!
//! Thresholds are evaluated top-down, lower bound inclusive.

use serde::Serialize;

use crate::filters::ColorMode;
use crate::models::Event;

/// Smallest marker radius in pixels.
pub const MIN_RADIUS: f64 = 4.0;

/// Largest marker radius in pixels.
pub const MAX_RADIUS: f64 = 40.0;

/// Pixels of radius per unit of magnitude.
const RADIUS_PER_MAGNITUDE: f64 = 4.0;

/// A display color tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorToken {
    // Severity tiers, least to most severe
    Minor,
    Light,
    Moderate,
    Strong,
    Major,
    // Depth tiers, shallow to deep
    Shallow,
    Intermediate,
    Deep,
    VeryDeep,
}

impl ColorToken {
    /// Hex color for map markers.
    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Minor => "#6b7280",
            Self::Light => "#10b981",
            Self::Moderate => "#eab308",
            Self::Strong => "#f97316",
            Self::Major => "#ef4444",
            Self::Shallow => "#93c5fd",
            Self::Intermediate => "#3b82f6",
            Self::Deep => "#1d4ed8",
            Self::VeryDeep => "#1e1b4b",
        }
    }

    /// ANSI foreground color for terminal output.
    #[must_use]
    pub const fn ansi(self) -> &'static str {
        match self {
            Self::Minor => "\x1b[97m",
            Self::Light => "\x1b[92m",
            Self::Moderate => "\x1b[93m",
            Self::Strong => "\x1b[38;5;208m",
            Self::Major => "\x1b[91m",
            Self::Shallow => "\x1b[96m",
            Self::Intermediate => "\x1b[94m",
            Self::Deep => "\x1b[34m",
            Self::VeryDeep => "\x1b[35m",
        }
    }

    /// Short uppercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Minor => "MINOR",
            Self::Light => "LIGHT",
            Self::Moderate => "MODERATE",
            Self::Strong => "STRONG",
            Self::Major => "MAJOR",
            Self::Shallow => "SHALLOW",
            Self::Intermediate => "MID",
            Self::Deep => "DEEP",
            Self::VeryDeep => "V.DEEP",
        }
    }
}

/// Color tier for an event under the given mode.
#[must_use]
pub fn color_for(event: &Event, mode: ColorMode) -> ColorToken {
    match mode {
        ColorMode::Severity => severity_color(event.magnitude),
        ColorMode::Depth => depth_color(event.depth_km),
    }
}

fn severity_color(mag: f64) -> ColorToken {
    match mag {
        m if m >= 6.0 => ColorToken::Major,
        m if m >= 5.0 => ColorToken::Strong,
        m if m >= 4.0 => ColorToken::Moderate,
        m if m >= 3.0 => ColorToken::Light,
        _ => ColorToken::Minor,
    }
}

fn depth_color(depth_km: f64) -> ColorToken {
    match depth_km {
        d if d >= 300.0 => ColorToken::VeryDeep,
        d if d >= 100.0 => ColorToken::Deep,
        d if d >= 50.0 => ColorToken::Intermediate,
        _ => ColorToken::Shallow,
    }
}

/// Marker radius for a magnitude, never below [`MIN_RADIUS`] nor above
/// [`MAX_RADIUS`].
#[must_use]
pub fn radius_for(magnitude: f64) -> f64 {
    // NaN fails the comparison below and would survive clamp
    if magnitude.is_nan() || magnitude <= 0.0 {
        return MIN_RADIUS;
    }
    (magnitude * RADIUS_PER_MAGNITUDE).clamp(MIN_RADIUS, MAX_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::event;

    fn with_mag(mag: f64) -> Event {
        event("x", mag, "somewhere")
    }

    fn with_depth(depth: f64) -> Event {
        Event {
            depth_km: depth,
            ..event("x", 1.0, "somewhere")
        }
    }

    #[test]
    fn test_severity_boundaries_inclusive() {
        let cases = [
            (6.0, ColorToken::Major),
            (5.99, ColorToken::Strong),
            (5.0, ColorToken::Strong),
            (4.0, ColorToken::Moderate),
            (3.0, ColorToken::Light),
            (2.99, ColorToken::Minor),
            (0.0, ColorToken::Minor),
            (-1.0, ColorToken::Minor),
            (9.1, ColorToken::Major),
        ];
        for (mag, expected) in cases {
            assert_eq!(color_for(&with_mag(mag), ColorMode::Severity), expected, "mag {mag}");
        }
    }

    #[test]
    fn test_depth_boundaries_inclusive() {
        let cases = [
            (300.0, ColorToken::VeryDeep),
            (299.9, ColorToken::Deep),
            (100.0, ColorToken::Deep),
            (50.0, ColorToken::Intermediate),
            (49.9, ColorToken::Shallow),
            (-2.0, ColorToken::Shallow),
        ];
        for (depth, expected) in cases {
            assert_eq!(color_for(&with_depth(depth), ColorMode::Depth), expected, "depth {depth}");
        }
    }

    #[test]
    fn test_mode_selects_attribute() {
        let e = Event {
            depth_km: 400.0,
            ..event("x", 6.5, "somewhere")
        };
        assert_eq!(color_for(&e, ColorMode::Severity), ColorToken::Major);
        assert_eq!(color_for(&e, ColorMode::Depth), ColorToken::VeryDeep);
    }

    #[test]
    fn test_radius_examples() {
        assert!((radius_for(0.0) - MIN_RADIUS).abs() < f64::EPSILON);
        assert!((radius_for(-3.0) - MIN_RADIUS).abs() < f64::EPSILON);
        assert!((radius_for(0.5) - MIN_RADIUS).abs() < f64::EPSILON);
        assert!((radius_for(2.5) - 10.0).abs() < f64::EPSILON);
        assert!((radius_for(10.0) - MAX_RADIUS).abs() < f64::EPSILON);
        assert!((radius_for(f64::INFINITY) - MAX_RADIUS).abs() < f64::EPSILON);
        assert!((radius_for(f64::NAN) - MIN_RADIUS).abs() < f64::EPSILON);
    }

    #[test]
    fn test_radius_bounded_and_monotonic() {
        let mut prev = 0.0;
        for step in -100..=150 {
            let mag = f64::from(step) * 0.1;
            let r = radius_for(mag);
            assert!((MIN_RADIUS..=MAX_RADIUS).contains(&r), "mag {mag} -> {r}");
            if mag > 0.0 {
                assert!(r >= prev, "radius decreased at mag {mag}");
            }
            prev = r;
        }
    }

    #[test]
    fn test_hex_colors_are_distinct() {
        let tokens = [
            ColorToken::Minor,
            ColorToken::Light,
            ColorToken::Moderate,
            ColorToken::Strong,
            ColorToken::Major,
            ColorToken::Shallow,
            ColorToken::Intermediate,
            ColorToken::Deep,
            ColorToken::VeryDeep,
        ];
        let mut hexes: Vec<&str> = tokens.iter().map(|t| t.hex()).collect();
        hexes.sort_unstable();
        hexes.dedup();
        assert_eq!(hexes.len(), tokens.len());
    }
}
