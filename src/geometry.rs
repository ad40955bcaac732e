//! Rectangle helpers on top of [`kurbo::Rect`].
//!
//! All rectangles are expressed in the coordinate space of the bounding surface. Intersections
//! follow half-open interval semantics, so rectangles that merely share an edge do not overlap.

pub use kurbo::Rect;

/// Area of `rect`, treating inverted (negative width or height) rectangles as empty.
pub fn clamped_area(rect: Rect) -> f64 {
    let width = rect.width();
    let height = rect.height();
    if width <= 0.0 || height <= 0.0 || !width.is_finite() || !height.is_finite() {
        0.0
    } else {
        width * height
    }
}

/// Intersection of two rectangles, or `None` when they do not overlap.
pub fn intersection(a: Rect, b: Rect) -> Option<Rect> {
    let r = Rect::new(a.x0.max(b.x0), a.y0.max(b.y0), a.x1.min(b.x1), a.y1.min(b.y1));
    (clamped_area(r) > 0.0).then_some(r)
}

/// Area covered by the union of `rects`.
///
/// Uses coordinate compression: the plane is cut along every rectangle edge and each resulting
/// cell is counted once if any rectangle covers it. Quadratic in the number of edges, which is
/// fine for the handful of obstructions a view hierarchy reports.
pub fn union_area(rects: &[Rect]) -> f64 {
    let rects: Vec<Rect> = rects
        .iter()
        .map(|r| r.abs())
        .filter(|r| clamped_area(*r) > 0.0)
        .collect();
    if rects.is_empty() {
        return 0.0;
    }

    let mut xs: Vec<f64> = rects.iter().flat_map(|r| [r.x0, r.x1]).collect();
    let mut ys: Vec<f64> = rects.iter().flat_map(|r| [r.y0, r.y1]).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();
    ys.sort_by(f64::total_cmp);
    ys.dedup();

    let mut area = 0.0;
    for xw in xs.windows(2) {
        for yw in ys.windows(2) {
            let (cx, cy) = ((xw[0] + xw[1]) / 2.0, (yw[0] + yw[1]) / 2.0);
            let covered = rects
                .iter()
                .any(|r| r.x0 <= cx && cx < r.x1 && r.y0 <= cy && cy < r.y1);
            if covered {
                area += (xw[1] - xw[0]) * (yw[1] - yw[0]);
            }
        }
    }
    area
}
