//! Image overlays in viewer space
//!
//! An overlay is a raster image placed on a page of the on-screen viewer.
//! Positions and sizes are viewer pixels with a top-left origin; they are
//! converted to PDF points (bottom-left origin) only at export time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Smallest width or height an overlay may have, in viewer pixels
pub const MIN_SIZE: f64 = 20.0;

/// Where a freshly added overlay is placed and how wide it starts
pub const INITIAL_POSITION: (f64, f64) = (50.0, 50.0);
pub const INITIAL_WIDTH: f64 = 150.0;

/// Page width used by the viewer on wide windows
pub const DEFAULT_VIEWER_WIDTH: f64 = 800.0;

/// Windows narrower than this shrink the viewer to a fraction of their width
const NARROW_WINDOW: f64 = 850.0;
const NARROW_FRACTION: f64 = 0.9;

/// Opaque overlay identity; ids increase in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the eight resize grips on an overlay's bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl Handle {
    pub fn is_corner(self) -> bool {
        matches!(self, Handle::NE | Handle::NW | Handle::SE | Handle::SW)
    }

    /// Dragging this handle moves the left edge
    pub fn moves_left_edge(self) -> bool {
        matches!(self, Handle::W | Handle::NW | Handle::SW)
    }

    /// Dragging this handle moves the top edge
    pub fn moves_top_edge(self) -> bool {
        matches!(self, Handle::N | Handle::NE | Handle::NW)
    }
}

impl FromStr for Handle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" => Ok(Handle::N),
            "s" => Ok(Handle::S),
            "e" => Ok(Handle::E),
            "w" => Ok(Handle::W),
            "ne" => Ok(Handle::NE),
            "nw" => Ok(Handle::NW),
            "se" => Ok(Handle::SE),
            "sw" => Ok(Handle::SW),
            other => Err(format!("Unknown resize handle: {}", other)),
        }
    }
}

/// A raster image placed on a page
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub id: OverlayId,
    /// 1-based page number
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Encoded image bytes (PNG, JPEG, WebP)
    pub image: Arc<[u8]>,
    /// Natural width / height, when the image has a usable one
    pub aspect_ratio: Option<f64>,
}

impl Overlay {
    /// Place a new overlay at the default position, 150 px wide with the
    /// image's natural proportions.
    pub fn new(
        id: OverlayId,
        page: u32,
        image: Arc<[u8]>,
        natural_width: u32,
        natural_height: u32,
    ) -> Self {
        let aspect_ratio = aspect_ratio(natural_width, natural_height);
        let height = match aspect_ratio {
            Some(ratio) => INITIAL_WIDTH / ratio,
            None => INITIAL_WIDTH,
        };

        Overlay {
            id,
            page,
            x: INITIAL_POSITION.0,
            y: INITIAL_POSITION.1,
            width: INITIAL_WIDTH.max(MIN_SIZE),
            height: height.max(MIN_SIZE),
            image,
            aspect_ratio,
        }
    }

    /// Move to `(x, y)`. Keeping the overlay inside the page is up to the viewer.
    pub fn reposition(&self, x: f64, y: f64) -> Overlay {
        Overlay {
            x,
            y,
            ..self.clone()
        }
    }

    /// Apply a resize gesture from `handle`.
    ///
    /// Corner handles keep the aspect ratio, driven by whichever axis moved
    /// more. The edge or corner opposite the handle stays fixed.
    pub fn resize(&self, requested_width: f64, requested_height: f64, handle: Handle) -> Overlay {
        let keep_ratio = self.aspect_ratio.filter(|_| handle.is_corner());

        let mut width = requested_width;
        let mut height = requested_height;

        if let Some(ratio) = keep_ratio {
            let delta_width = (width - self.width).abs();
            let delta_height = (height - self.height).abs();
            if delta_height * ratio > delta_width {
                width = height * ratio;
            } else {
                height = width / ratio;
            }
        }

        if width < MIN_SIZE {
            width = MIN_SIZE;
            if let Some(ratio) = keep_ratio {
                height = width / ratio;
            }
        }
        if height < MIN_SIZE {
            height = MIN_SIZE;
            if let Some(ratio) = keep_ratio {
                width = height * ratio;
            }
        }

        let x = if handle.moves_left_edge() {
            self.x + self.width - width
        } else {
            self.x
        };
        let y = if handle.moves_top_edge() {
            self.y + self.height - height
        } else {
            self.y
        };

        Overlay {
            x,
            y,
            width,
            height,
            ..self.clone()
        }
    }

    /// Map this overlay into the PDF point space of its page
    pub fn to_document_space(
        &self,
        viewer_width: f64,
        page_width_points: f64,
        page_height_points: f64,
    ) -> DocumentRect {
        let scale = page_width_points / viewer_width;
        let width = self.width * scale;
        let height = self.height * scale;

        DocumentRect {
            x: self.x * scale,
            y: page_height_points - self.y * scale - height,
            width,
            height,
        }
    }
}

fn aspect_ratio(natural_width: u32, natural_height: u32) -> Option<f64> {
    let ratio = f64::from(natural_width) / f64::from(natural_height);
    (ratio.is_finite() && ratio > 0.0).then_some(ratio)
}

/// Rectangle in PDF points, origin at the bottom-left of the page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// How wide the viewer draws a page, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerGeometry {
    pub page_width: f64,
}

impl Default for ViewerGeometry {
    fn default() -> Self {
        Self {
            page_width: DEFAULT_VIEWER_WIDTH,
        }
    }
}

impl ViewerGeometry {
    pub fn new(page_width: f64) -> Self {
        Self { page_width }
    }

    /// Geometry the viewer uses inside a window `window_width` pixels wide
    pub fn for_window(window_width: f64) -> Self {
        if window_width < NARROW_WINDOW {
            Self::new(window_width * NARROW_FRACTION)
        } else {
            Self::default()
        }
    }

    /// Points per viewer pixel for a page `page_width_points` wide
    pub fn scale(&self, page_width_points: f64) -> f64 {
        page_width_points / self.page_width
    }

    pub fn to_document_space(
        &self,
        overlay: &Overlay,
        page_width_points: f64,
        page_height_points: f64,
    ) -> DocumentRect {
        overlay.to_document_space(self.page_width, page_width_points, page_height_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn overlay(x: f64, y: f64, width: f64, height: f64, ratio: Option<f64>) -> Overlay {
        Overlay {
            id: OverlayId(1),
            page: 1,
            x,
            y,
            width,
            height,
            image: Arc::from(&b"img"[..]),
            aspect_ratio: ratio,
        }
    }

    #[test]
    fn test_handle_parses_all_directions() {
        for (text, handle) in [
            ("n", Handle::N),
            ("s", Handle::S),
            ("e", Handle::E),
            ("w", Handle::W),
            ("ne", Handle::NE),
            ("nw", Handle::NW),
            ("se", Handle::SE),
            ("SW", Handle::SW),
        ] {
            assert_eq!(text.parse::<Handle>().unwrap(), handle);
        }
        assert!("north".parse::<Handle>().is_err());
    }

    #[test]
    fn test_new_overlay_uses_natural_proportions() {
        let o = Overlay::new(OverlayId(3), 2, Arc::from(&b"img"[..]), 300, 100);
        assert_eq!((o.x, o.y, o.width, o.height), (50.0, 50.0, 150.0, 50.0));
        assert_eq!(o.aspect_ratio, Some(3.0));
        assert_eq!(o.page, 2);
    }

    #[test]
    fn test_new_overlay_without_ratio() {
        let o = Overlay::new(OverlayId(1), 1, Arc::from(&b"img"[..]), 40, 0);
        assert_eq!(o.aspect_ratio, None);
        assert_eq!((o.width, o.height), (150.0, 150.0));
    }

    #[test]
    fn test_new_overlay_respects_min_size() {
        let o = Overlay::new(OverlayId(1), 1, Arc::from(&b"img"[..]), 1000, 10);
        assert_eq!(o.height, MIN_SIZE);
    }

    #[test]
    fn test_reposition_is_idempotent() {
        let o = overlay(10.0, 10.0, 100.0, 100.0, None);
        let once = o.reposition(70.0, 35.0);
        let twice = once.reposition(70.0, 35.0);
        assert_eq!(once, twice);
        assert_eq!((once.x, once.y), (70.0, 35.0));
        assert_eq!((once.width, once.height), (100.0, 100.0));
    }

    #[test]
    fn test_corner_resize_width_driven() {
        let o = overlay(0.0, 0.0, 100.0, 50.0, Some(2.0));
        let r = o.resize(140.0, 50.0, Handle::SE);
        assert_eq!((r.x, r.y, r.width, r.height), (0.0, 0.0, 140.0, 70.0));
    }

    #[test]
    fn test_corner_resize_height_driven() {
        let o = overlay(0.0, 0.0, 100.0, 50.0, Some(2.0));
        let r = o.resize(105.0, 80.0, Handle::SE);
        assert_eq!((r.width, r.height), (160.0, 80.0));
    }

    #[test]
    fn test_nw_resize_clamps_and_anchors_opposite_corner() {
        let o = overlay(50.0, 50.0, 100.0, 100.0, Some(1.0));
        let r = o.resize(10.0, 10.0, Handle::NW);
        assert_eq!((r.x, r.y, r.width, r.height), (130.0, 130.0, 20.0, 20.0));
    }

    #[test]
    fn test_ne_resize_moves_top_edge_only() {
        let o = overlay(10.0, 20.0, 100.0, 50.0, Some(2.0));
        let r = o.resize(140.0, 50.0, Handle::NE);
        assert_eq!((r.x, r.y, r.width, r.height), (10.0, 0.0, 140.0, 70.0));
    }

    #[test]
    fn test_sw_resize_moves_left_edge_only() {
        let o = overlay(10.0, 20.0, 100.0, 50.0, None);
        let r = o.resize(60.0, 30.0, Handle::SW);
        assert_eq!((r.x, r.y, r.width, r.height), (50.0, 20.0, 60.0, 30.0));
    }

    #[test]
    fn test_corner_clamp_on_height_recomputes_width() {
        // ratio 4: width 40 gives height 10, which is then raised to 20
        let o = overlay(0.0, 0.0, 200.0, 50.0, Some(4.0));
        let r = o.resize(40.0, 50.0, Handle::SE);
        assert_eq!((r.width, r.height), (80.0, 20.0));
    }

    #[test]
    fn test_edge_resize_is_free_form() {
        let o = overlay(10.0, 20.0, 100.0, 50.0, Some(2.0));
        let r = o.resize(130.0, 50.0, Handle::E);
        assert_eq!((r.x, r.y, r.width, r.height), (10.0, 20.0, 130.0, 50.0));
    }

    #[test]
    fn test_west_resize_moves_left_edge() {
        let o = overlay(10.0, 20.0, 100.0, 50.0, None);
        let r = o.resize(60.0, 50.0, Handle::W);
        assert_eq!((r.x, r.y, r.width, r.height), (50.0, 20.0, 60.0, 50.0));
    }

    #[test]
    fn test_north_resize_moves_top_edge() {
        let o = overlay(10.0, 20.0, 100.0, 50.0, None);
        let r = o.resize(100.0, 5.0, Handle::N);
        assert_eq!((r.x, r.y, r.width, r.height), (10.0, 50.0, 100.0, 20.0));
    }

    #[test]
    fn test_corner_without_ratio_is_free_form() {
        let o = overlay(0.0, 0.0, 100.0, 50.0, None);
        let r = o.resize(140.0, 90.0, Handle::SE);
        assert_eq!((r.width, r.height), (140.0, 90.0));
    }

    #[test]
    fn test_resize_keeps_identity_and_page() {
        let o = overlay(0.0, 0.0, 100.0, 50.0, Some(2.0));
        let r = o.resize(300.0, 50.0, Handle::SW);
        assert_eq!((r.x, r.y, r.width, r.height), (-200.0, 0.0, 300.0, 150.0));
        assert_eq!(r.id, o.id);
        assert_eq!(r.page, o.page);
        assert_eq!(r.aspect_ratio, o.aspect_ratio);
    }

    #[test]
    fn test_to_document_space() {
        let o = overlay(50.0, 50.0, 150.0, 100.0, None);
        let rect = o.to_document_space(800.0, 600.0, 800.0);
        assert_eq!(
            rect,
            DocumentRect {
                x: 37.5,
                y: 687.5,
                width: 112.5,
                height: 75.0,
            }
        );
    }

    #[test]
    fn test_to_document_space_identity_scale() {
        let o = overlay(0.0, 0.0, 100.0, 40.0, None);
        let rect = ViewerGeometry::new(612.0).to_document_space(&o, 612.0, 792.0);
        assert_eq!((rect.x, rect.y), (0.0, 752.0));
    }

    #[test]
    fn test_viewer_geometry_for_window() {
        assert_eq!(ViewerGeometry::for_window(1200.0).page_width, 800.0);
        assert_eq!(ViewerGeometry::for_window(850.0).page_width, 800.0);
        assert_eq!(ViewerGeometry::for_window(500.0).page_width, 450.0);
        assert_eq!(ViewerGeometry::default().scale(600.0), 0.75);
    }
}
