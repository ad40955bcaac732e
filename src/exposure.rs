//! Exposure sampling: how much of an element is visible right now.
use tokio::time::Instant;

use crate::{
    element::ElementSnapshot,
    geometry::{clamped_area, intersection, union_area, Rect},
};

/// Exposure of an element at one instant. Produced fresh on every poll and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureSample {
    /// Fraction of the element's area that is on screen and unobstructed, in `[0, 1]`.
    pub factor: f64,
    /// Part of the element that is inside the surface and every ancestor clip.
    pub visible_rect: Rect,
    /// Whether content drawn above the element covers part of the visible rectangle.
    pub is_occluded: bool,
    /// When the sample was taken.
    pub sampled_at: Instant,
}

impl ExposureSample {
    /// A sample for an element that is not visible at all.
    pub fn hidden(sampled_at: Instant) -> ExposureSample {
        ExposureSample {
            factor: 0.0,
            visible_rect: Rect::ZERO,
            is_occluded: false,
            sampled_at,
        }
    }

    /// A sample reporting the whole `frame` as visible.
    pub fn fully_visible(frame: Rect, sampled_at: Instant) -> ExposureSample {
        ExposureSample {
            factor: 1.0,
            visible_rect: frame,
            is_occluded: false,
            sampled_at,
        }
    }

    /// Whether any part of the element is exposed.
    pub fn is_exposed(&self) -> bool {
        self.factor > 0.0
    }
}

/// Computes the exposure of `element` inside a surface with `surface_bounds`.
///
/// The element frame is intersected with the surface bounds and with every ancestor's clip
/// bounds, obstructing content is subtracted, and the remaining area is divided by the element's
/// own area. Hidden, fully transparent or detached elements (or ones with a hidden ancestor)
/// report zero, as do zero-area elements.
pub fn sample(element: &ElementSnapshot, surface_bounds: Rect, sampled_at: Instant) -> ExposureSample {
    let own_area = clamped_area(element.frame);
    if own_area == 0.0 || !element.is_attached || !element.is_visible() {
        return ExposureSample::hidden(sampled_at);
    }

    let clipped = element
        .ancestors
        .iter()
        .filter_map(|ancestor| ancestor.clip)
        .try_fold(element.frame, intersection);
    let Some(visible_rect) = clipped.and_then(|rect| intersection(rect, surface_bounds)) else {
        return ExposureSample::hidden(sampled_at);
    };

    let obstructions: Vec<Rect> = element
        .obstructions
        .iter()
        .filter_map(|o| intersection(*o, visible_rect))
        .collect();
    let obstructed_area = union_area(&obstructions);
    let visible_area = (clamped_area(visible_rect) - obstructed_area).max(0.0);

    ExposureSample {
        factor: (visible_area / own_area).clamp(0.0, 1.0),
        visible_rect,
        is_occluded: obstructed_area > 0.0,
        sampled_at,
    }
}
