//! Geometric primitives for document elements.
//!
//! Every element, cell, and char in a DIR carries an axis-aligned rectangle
//! serialized as `[left, top, right, bottom]` in page coordinates (top-left
//! origin, y growing downward). All geometric queries in the reader reduce
//! to the pure functions here: overlap ratios, center containment, reading
//! order, bounding boxes, and display-line splitting.
//!
//! Out-of-domain inputs (empty boxes, zero base areas) return 0 or empty —
//! these functions never fail.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in page coordinates.
///
/// Serialized as a `[left, top, right, bottom]` array, matching the DIR
/// wire form.
///
/// # Examples
///
/// ```
/// use dir_insight::geometry::Outline;
///
/// let outline = Outline::new(10.0, 20.0, 110.0, 40.0);
/// assert_eq!(outline.width(), 100.0);
/// assert_eq!(outline.height(), 20.0);
/// assert_eq!(outline.area(), 2000.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Outline {
    /// Left edge
    pub left: f64,
    /// Top edge
    pub top: f64,
    /// Right edge
    pub right: f64,
    /// Bottom edge
    pub bottom: f64,
}

impl From<[f64; 4]> for Outline {
    fn from(v: [f64; 4]) -> Self {
        Outline {
            left: v[0],
            top: v[1],
            right: v[2],
            bottom: v[3],
        }
    }
}

impl From<Outline> for [f64; 4] {
    fn from(o: Outline) -> Self {
        [o.left, o.top, o.right, o.bottom]
    }
}

impl Outline {
    /// Create an outline from its four edges.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Outline {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width of the rectangle (0 when degenerate).
    pub fn width(&self) -> f64 {
        (self.right - self.left).max(0.0)
    }

    /// Height of the rectangle (0 when degenerate).
    pub fn height(&self) -> f64 {
        (self.bottom - self.top).max(0.0)
    }

    /// Area of the rectangle.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// True when the rectangle has no interior.
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Center point `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Whether a point lies inside the rectangle, edges inclusive.
    ///
    /// One containment convention is used everywhere: closed intervals on
    /// both axes.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.left <= x && x <= self.right && self.top <= y && y <= self.bottom
    }

    /// Intersection with another outline, or `None` when disjoint.
    pub fn intersection(&self, other: &Outline) -> Option<Outline> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Outline::new(left, top, right, bottom))
    }

    /// Smallest rectangle containing both outlines.
    pub fn union(&self, other: &Outline) -> Outline {
        Outline::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }
}

/// Which area the intersection is divided by in [`overlap_pct`] and
/// [`edge_overlap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapBase {
    /// Area (or edges) of the first box.
    First,
    /// Area (or edges) of the second box.
    Second,
    /// The smaller of the two areas, per axis for edges.
    Min,
    /// The larger of the two areas, per axis for edges.
    Max,
}

/// Intersection area of `a` and `b` divided by the base area.
///
/// Returns 0 for empty boxes, disjoint boxes, or a zero base. With
/// `OverlapBase::Min`/`Max` the result is symmetric in `a` and `b` and lies
/// in `[0, 1]`.
///
/// # Examples
///
/// ```
/// use dir_insight::geometry::{overlap_pct, Outline, OverlapBase};
///
/// let a = Outline::new(0.0, 0.0, 10.0, 10.0);
/// let b = Outline::new(5.0, 0.0, 15.0, 10.0);
/// assert_eq!(overlap_pct(&a, &b, OverlapBase::Min), 0.5);
/// assert_eq!(overlap_pct(&a, &b, OverlapBase::First), 0.5);
/// ```
pub fn overlap_pct(a: &Outline, b: &Outline, base: OverlapBase) -> f64 {
    let inter = match a.intersection(b) {
        Some(i) => i.area(),
        None => return 0.0,
    };
    let denom = match base {
        OverlapBase::First => a.area(),
        OverlapBase::Second => b.area(),
        OverlapBase::Min => a.area().min(b.area()),
        OverlapBase::Max => a.area().max(b.area()),
    };
    if denom <= 0.0 {
        return 0.0;
    }
    (inter / denom).min(1.0)
}

/// Per-axis interval overlap of `a` and `b` over the base's edge lengths,
/// returned as `(horizontal, vertical)`. Zero on a zero base.
pub fn edge_overlap(a: &Outline, b: &Outline, base: OverlapBase) -> (f64, f64) {
    let h_inter = (a.right.min(b.right) - a.left.max(b.left)).max(0.0);
    let v_inter = (a.bottom.min(b.bottom) - a.top.max(b.top)).max(0.0);
    let h_base = match base {
        OverlapBase::First => a.width(),
        OverlapBase::Second => b.width(),
        OverlapBase::Min => a.width().min(b.width()),
        OverlapBase::Max => a.width().max(b.width()),
    };
    let v_base = match base {
        OverlapBase::First => a.height(),
        OverlapBase::Second => b.height(),
        OverlapBase::Min => a.height().min(b.height()),
        OverlapBase::Max => a.height().max(b.height()),
    };
    let h = if h_base > 0.0 { h_inter / h_base } else { 0.0 };
    let v = if v_base > 0.0 { v_inter / v_base } else { 0.0 };
    (h, v)
}

/// Whether the inner box's center point lies inside the outer rectangle,
/// edges inclusive.
///
/// # Examples
///
/// ```
/// use dir_insight::geometry::{box_in_box_by_center, Outline};
///
/// let outline = Outline::new(0.0, 0.0, 10.0, 10.0);
/// assert!(box_in_box_by_center(&outline, &outline));
/// ```
pub fn box_in_box_by_center(inner: &Outline, outer: &Outline) -> bool {
    let (cx, cy) = inner.center();
    outer.contains_point(cx, cy)
}

/// Reading order: `a` comes before `b` when its center is above `b`'s, or on
/// the same line and to its left.
pub fn box_before_box(a: &Outline, b: &Outline) -> bool {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    if ay != by {
        return ay < by;
    }
    ax < bx
}

/// Elementwise bounding box of a collection of outlines; `None` when empty.
pub fn bounding_box<'a, I>(outlines: I) -> Option<Outline>
where
    I: IntoIterator<Item = &'a Outline>,
{
    outlines
        .into_iter()
        .copied()
        .reduce(|acc, o| acc.union(&o))
}

/// Split an ordered char sequence into display lines.
///
/// A new line starts when the page changes, when a char's top edge falls at
/// or below the current line's bottom (vertical break), or when the
/// horizontal gap to the previous char exceeds `interval` (column break).
/// Returns index ranges into the input slice; concatenating the ranges
/// reproduces the input, so the split is lossless.
///
/// The `key` closure extracts `(page, outline)` so the function works for
/// any char-like record.
pub fn split_chars<T, F>(items: &[T], key: F, interval: f64) -> Vec<std::ops::Range<usize>>
where
    F: Fn(&T) -> (i64, Outline),
{
    let mut lines = Vec::new();
    if items.is_empty() {
        return lines;
    }
    let mut start = 0usize;
    let (mut page, mut prev) = key(&items[0]);
    let mut line_bottom = prev.bottom;
    for (i, item) in items.iter().enumerate().skip(1) {
        let (p, outline) = key(item);
        let new_page = p != page;
        let new_row = outline.top >= line_bottom;
        let gap = outline.left - prev.right;
        let new_col = gap > interval || outline.right < prev.left;
        if new_page || new_row || new_col {
            lines.push(start..i);
            start = i;
            line_bottom = outline.bottom;
        } else {
            line_bottom = line_bottom.max(outline.bottom);
        }
        page = p;
        prev = outline;
    }
    lines.push(start..items.len());
    lines
}

/// Fuse chars into per-line rectangles, grouped by page.
///
/// Returns one `(page, bounding box)` pair per display line, in input
/// order.
pub fn merge_char_rects<T, F>(items: &[T], key: F, interval: f64) -> Vec<(i64, Outline)>
where
    F: Fn(&T) -> (i64, Outline),
{
    split_chars(items, &key, interval)
        .into_iter()
        .filter_map(|range| {
            let (page, first) = key(&items[range.start]);
            let outline = items[range.clone()]
                .iter()
                .map(|i| key(i).1)
                .fold(first, |acc, o| acc.union(&o));
            if outline.is_empty() {
                return None;
            }
            Some((page, outline))
        })
        .collect()
}
