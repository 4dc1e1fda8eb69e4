//! JSON overlay layouts
//!
//! A layout lists overlays the way the viewer would have produced them:
//! viewer-pixel positions and sizes on 1-based pages, at a given viewer width.
//!
//! ```json
//! { "viewer_width": 800, "overlays": [
//!     { "page": 1, "x": 50, "y": 50, "width": 150, "image": "sig.png" }
//! ] }
//! ```

use crate::error::StampError;
use crate::overlay::{Handle, ViewerGeometry, INITIAL_POSITION};
use crate::session::{update, Action, EditorState};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Layout {
    /// Page width in the viewer the positions were taken from
    #[serde(default)]
    pub viewer_width: Option<f64>,
    pub overlays: Vec<LayoutOverlay>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayoutOverlay {
    /// 1-based page number
    pub page: u32,
    #[serde(default = "default_x")]
    pub x: f64,
    #[serde(default = "default_y")]
    pub y: f64,
    /// Omitted: the default insertion width
    #[serde(default)]
    pub width: Option<f64>,
    /// Omitted: follows the image's proportions
    #[serde(default)]
    pub height: Option<f64>,
    /// Image file, relative to the layout file
    pub image: PathBuf,
}

fn default_x() -> f64 {
    INITIAL_POSITION.0
}

fn default_y() -> f64 {
    INITIAL_POSITION.1
}

impl Layout {
    pub fn from_json(text: &str) -> Result<Self, StampError> {
        serde_json::from_str(text).map_err(|e| StampError::Layout(e.to_string()))
    }

    pub fn geometry(&self) -> ViewerGeometry {
        self.viewer_width
            .map(ViewerGeometry::new)
            .unwrap_or_default()
    }

    /// Replay the layout as editor actions on `state`, which must have a
    /// document open. `images[i]` holds the bytes of `overlays[i].image`.
    ///
    /// Going through the editor keeps the same size rules as interactive
    /// editing: sizes below the minimum are raised, and a width without a
    /// height keeps the image's proportions.
    pub fn apply(
        &self,
        mut state: EditorState,
        images: Vec<Arc<[u8]>>,
    ) -> Result<EditorState, StampError> {
        if images.len() != self.overlays.len() {
            return Err(StampError::Layout(format!(
                "{} overlays but {} images",
                self.overlays.len(),
                images.len()
            )));
        }
        if state.document.is_none() {
            return Err(StampError::Layout("No document open".into()));
        }

        state.geometry = self.geometry();

        for (entry, image) in self.overlays.iter().zip(images) {
            let (natural_width, natural_height) = crate::image_dimensions(&image)
                .map_err(|e| StampError::Layout(format!("{}: {}", entry.image.display(), e)))?;

            let offset = i64::from(entry.page) - i64::from(state.current_page);
            state = update(state, Action::ChangePage(offset));
            if state.current_page != entry.page {
                log::warn!(
                    "Skipping layout overlay {}: page {} is not in the {}-page document",
                    entry.image.display(),
                    entry.page,
                    state.page_count()
                );
                continue;
            }

            let id = state.next_overlay_id();
            state = update(
                state,
                Action::AddOverlay {
                    image,
                    natural_width,
                    natural_height,
                },
            );

            state = update(
                state,
                Action::MoveOverlay {
                    id,
                    x: entry.x,
                    y: entry.y,
                },
            );

            if entry.width.is_some() || entry.height.is_some() {
                let Some(current) = state.overlay(id) else {
                    continue;
                };
                let width = entry.width.unwrap_or(current.width);
                let height = entry.height.unwrap_or(current.height);
                // A lone width or height drags the corner and keeps the
                // proportions; both together resize freely from an edge.
                let handle = match (entry.width, entry.height) {
                    (Some(_), Some(_)) => Handle::S,
                    _ => Handle::SE,
                };
                state = update(
                    state,
                    Action::ResizeOverlay {
                        id,
                        width,
                        height,
                        handle,
                    },
                );
            }
        }

        Ok(state)
    }
}
