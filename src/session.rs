//! Editor state and the update function that drives it
//!
//! Every user action is an [`Action`] fed through [`update`], which consumes
//! the current [`EditorState`] and returns the next one. Exports read the
//! state but never change it; their outcome comes back as
//! [`Action::ExportFinished`].

use crate::error::StampError;
use crate::export::{extract_pages_bytes, stamp_pdf_bytes, ExportOptions, StampResult};
use crate::overlay::{Handle, Overlay, OverlayId, ViewerGeometry};
use crate::page_range::{parse_page_range, PageSelection};
use serde::Serialize;
use std::sync::Arc;

pub const STAMPED_MESSAGE: &str = "All images have been saved";
pub const EXTRACTED_MESSAGE: &str = "Selected pages have been extracted";
pub const STAMP_FAILED_MESSAGE: &str = "Saving failed";
pub const EXTRACT_FAILED_MESSAGE: &str = "Extracting pages failed";

/// Which screen the editor is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Step {
    #[default]
    Upload,
    Edit,
}

/// Tool shown on the edit screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Stamp,
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// A transient message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
}

/// Which export an outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Stamped,
    Extracted,
}

/// The PDF being edited
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub name: String,
    pub bytes: Arc<[u8]>,
    pub page_count: u32,
}

/// Everything the editor shows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditorState {
    pub document: Option<LoadedDocument>,
    pub step: Step,
    pub mode: Mode,
    /// 1-based page shown in the stamp view
    pub current_page: u32,
    /// In creation order
    pub overlays: Vec<Overlay>,
    pub selection: PageSelection,
    pub page_input: String,
    pub geometry: ViewerGeometry,
    pub notice: Option<Notice>,
    next_id: u64,
}

/// A single user action
#[derive(Debug, Clone)]
pub enum Action {
    Open {
        name: String,
        bytes: Arc<[u8]>,
        page_count: u32,
    },
    AddOverlay {
        image: Arc<[u8]>,
        natural_width: u32,
        natural_height: u32,
    },
    MoveOverlay {
        id: OverlayId,
        x: f64,
        y: f64,
    },
    ResizeOverlay {
        id: OverlayId,
        width: f64,
        height: f64,
        handle: Handle,
    },
    ChangePage(i64),
    SetMode(Mode),
    SetPageInput(String),
    TogglePage(u32),
    SelectAll,
    DeselectAll,
    WindowResized(f64),
    ExportFinished {
        kind: ExportKind,
        succeeded: bool,
    },
    DismissNotice,
    Reset,
}

/// Bytes ready for download
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl EditorState {
    pub fn new() -> Self {
        Self {
            current_page: 1,
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |d| d.page_count)
    }

    pub fn overlays_on_page(&self, page: u32) -> impl Iterator<Item = &Overlay> {
        self.overlays.iter().filter(move |o| o.page == page)
    }

    pub fn current_overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays_on_page(self.current_page)
    }

    pub fn overlay(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.id == id)
    }

    /// The id the next added overlay will get
    pub fn next_overlay_id(&self) -> OverlayId {
        OverlayId(self.next_id.max(1))
    }

    pub fn can_export_stamped(&self) -> bool {
        self.document.is_some() && !self.overlays.is_empty()
    }

    pub fn can_export_selection(&self) -> bool {
        self.document.is_some() && !self.selection.is_empty()
    }

    /// Replace the overlay with `id` by `f(overlay)`; unknown ids change nothing
    fn map_overlay(self, id: OverlayId, f: impl Fn(&Overlay) -> Overlay) -> Self {
        if self.overlay(id).is_none() {
            return self;
        }
        let overlays = self
            .overlays
            .iter()
            .map(|o| if o.id == id { f(o) } else { o.clone() })
            .collect();
        Self { overlays, ..self }
    }
}

/// Apply `action` to `state`
pub fn update(state: EditorState, action: Action) -> EditorState {
    match action {
        Action::Open {
            name,
            bytes,
            page_count,
        } => {
            log::debug!("Opened {} ({} pages)", name, page_count);
            EditorState {
                document: Some(LoadedDocument {
                    name,
                    bytes,
                    page_count,
                }),
                step: Step::Edit,
                selection: PageSelection::new(page_count),
                geometry: state.geometry,
                next_id: state.next_id,
                ..EditorState::new()
            }
        }
        Action::AddOverlay {
            image,
            natural_width,
            natural_height,
        } => {
            if state.document.is_none() {
                return state;
            }
            let id = state.next_overlay_id();
            let overlay = Overlay::new(
                id,
                state.current_page,
                image,
                natural_width,
                natural_height,
            );
            let mut overlays = state.overlays.clone();
            overlays.push(overlay);
            EditorState {
                overlays,
                next_id: id.0 + 1,
                ..state
            }
        }
        Action::MoveOverlay { id, x, y } => state.map_overlay(id, |o| o.reposition(x, y)),
        Action::ResizeOverlay {
            id,
            width,
            height,
            handle,
        } => state.map_overlay(id, |o| o.resize(width, height, handle)),
        Action::ChangePage(offset) => {
            let last = i64::from(state.page_count().max(1));
            let page = (i64::from(state.current_page) + offset).clamp(1, last);
            EditorState {
                current_page: page as u32,
                ..state
            }
        }
        Action::SetMode(mode) => EditorState { mode, ..state },
        Action::SetPageInput(text) => {
            let mut selection = state.selection.clone();
            if !text.trim().is_empty() {
                selection.replace_with(parse_page_range(&text, state.page_count()));
            } else if text.is_empty() {
                selection.clear();
            }
            EditorState {
                selection,
                page_input: text,
                ..state
            }
        }
        Action::TogglePage(index) => {
            let mut selection = state.selection.clone();
            selection.toggle(index);
            EditorState { selection, ..state }
        }
        Action::SelectAll => {
            let mut selection = state.selection.clone();
            selection.select_all();
            EditorState { selection, ..state }
        }
        Action::DeselectAll => {
            let mut selection = state.selection.clone();
            selection.clear();
            EditorState {
                selection,
                page_input: String::new(),
                ..state
            }
        }
        Action::WindowResized(width) => EditorState {
            geometry: ViewerGeometry::for_window(width),
            ..state
        },
        Action::ExportFinished { kind, succeeded } => {
            let (message, notice_kind) = match (kind, succeeded) {
                (ExportKind::Stamped, true) => (STAMPED_MESSAGE, NoticeKind::Success),
                (ExportKind::Extracted, true) => (EXTRACTED_MESSAGE, NoticeKind::Success),
                (ExportKind::Stamped, false) => (STAMP_FAILED_MESSAGE, NoticeKind::Error),
                (ExportKind::Extracted, false) => (EXTRACT_FAILED_MESSAGE, NoticeKind::Error),
            };
            EditorState {
                notice: Some(Notice {
                    message: message.to_string(),
                    kind: notice_kind,
                }),
                ..state
            }
        }
        Action::DismissNotice => EditorState {
            notice: None,
            ..state
        },
        Action::Reset => EditorState {
            geometry: state.geometry,
            next_id: state.next_id,
            ..EditorState::new()
        },
    }
}

/// Render the overlays onto the open document.
///
/// `Ok(None)` when there is nothing to export; the document is not touched.
pub fn export_stamped(
    state: &EditorState,
    options: &ExportOptions,
) -> Result<Option<(Download, StampResult)>, StampError> {
    let Some(document) = state.document.as_ref().filter(|_| state.can_export_stamped()) else {
        return Ok(None);
    };

    let (bytes, result) =
        stamp_pdf_bytes(&document.bytes, &state.overlays, state.geometry, options)?;
    Ok(Some((
        Download {
            file_name: format!("Edited_{}", document.name),
            bytes,
        },
        result,
    )))
}

/// Extract the selected pages of the open document.
///
/// `Ok(None)` when no pages are selected; the document is not touched.
pub fn export_selection(
    state: &EditorState,
    options: &ExportOptions,
) -> Result<Option<Download>, StampError> {
    let Some(document) = state.document.as_ref().filter(|_| state.can_export_selection()) else {
        return Ok(None);
    };

    let bytes = extract_pages_bytes(&document.bytes, &state.selection.indices(), options)?;
    Ok(Some(Download {
        file_name: format!("split_{}", document.name),
        bytes,
    }))
}
