//! Remote video tiling.
//!
//! Tiles keep their source aspect ratio and are centered in the region they
//! are given. One tile gets the whole container. Two or more tiles split the
//! container in two, trying a vertical divider (side by side) and a
//! horizontal divider (stacked) and keeping whichever renders more video
//! area; ties keep the vertical divider. With more than two tiles the first
//! half of the tiles (rounded up) gets a proportional share of the container
//! and each side is laid out the same way, recursively.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Splits at `share` of the width (vertical divider) or height
    /// (horizontal divider). `share` is the first part's fraction.
    pub fn split(&self, split: Split, share: f64) -> (Rect, Rect) {
        match split {
            Split::Vertical => {
                let first = self.width * share;
                (
                    Rect::new(self.x, self.y, first, self.height),
                    Rect::new(self.x + first, self.y, self.width - first, self.height),
                )
            }
            Split::Horizontal => {
                let first = self.height * share;
                (
                    Rect::new(self.x, self.y, self.width, first),
                    Rect::new(self.x, self.y + first, self.width, self.height - first),
                )
            }
        }
    }
}

/// Orientation of the divider between two halves
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Vertical divider, halves side by side
    Vertical,
    /// Horizontal divider, halves stacked
    Horizontal,
}

/// Largest rectangle of `aspect` (width / height) inside `bounds`,
/// centered on both axes.
pub fn fit_and_center(bounds: Rect, aspect: f64) -> Rect {
    if !(aspect.is_finite() && aspect > 0.0) {
        return bounds;
    }

    let mut fitted = bounds;
    if bounds.height < bounds.width / aspect {
        fitted.width = bounds.height * aspect;
        fitted.x += (bounds.width - fitted.width) / 2.0;
    } else {
        fitted.height = bounds.width / aspect;
        fitted.y += (bounds.height - fitted.height) / 2.0;
    }
    fitted
}

/// Computed placement for a set of tiles
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayout {
    /// One rectangle per input tile, in input order
    pub tiles: Vec<Rect>,
    /// Total rendered video area
    pub area: f64,
    /// Top-level divider, `None` for zero or one tile
    pub split: Option<Split>,
}

/// Lays out tiles with the given source aspect ratios inside `container`
pub fn layout_tiles(container: Rect, aspects: &[f64]) -> TileLayout {
    plan(container, aspects)
}

/// Rendered area when `aspects` are placed with a forced top-level `split`
pub fn split_area(container: Rect, aspects: &[f64], split: Split) -> f64 {
    if aspects.len() < 2 {
        return plan(container, aspects).area;
    }
    plan_split(container, aspects, split).area
}

fn plan(bounds: Rect, aspects: &[f64]) -> TileLayout {
    match aspects {
        [] => TileLayout {
            tiles: Vec::new(),
            area: 0.0,
            split: None,
        },
        [aspect] => {
            let tile = fit_and_center(bounds, *aspect);
            TileLayout {
                area: tile.area(),
                tiles: vec![tile],
                split: None,
            }
        }
        _ => {
            let vertical = plan_split(bounds, aspects, Split::Vertical);
            let horizontal = plan_split(bounds, aspects, Split::Horizontal);
            if vertical.area >= horizontal.area {
                vertical
            } else {
                horizontal
            }
        }
    }
}

fn plan_split(bounds: Rect, aspects: &[f64], split: Split) -> TileLayout {
    let first_count = aspects.len().div_ceil(2);
    let share = first_count as f64 / aspects.len() as f64;
    let (first_bounds, second_bounds) = bounds.split(split, share);

    let first = plan(first_bounds, &aspects[..first_count]);
    let second = plan(second_bounds, &aspects[first_count..]);

    let mut tiles = first.tiles;
    tiles.extend(second.tiles);
    TileLayout {
        tiles,
        area: first.area + second.area,
        split: Some(split),
    }
}
