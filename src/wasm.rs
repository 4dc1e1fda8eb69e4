//! WebAssembly bindings for the PDF Image Stamper
//!
//! `EditorSession` holds the editor state for one browser tab. Each method
//! maps to one user action; the page itself is rendered by pdf.js.

use crate::session::{
    export_selection, export_stamped, update, Action, EditorState, ExportKind, Mode,
};
use crate::{image_dimensions, page_count, page_sizes, ExportOptions, Handle, OverlayId};
use std::sync::Arc;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Editor state for one open PDF
#[wasm_bindgen]
pub struct EditorSession {
    state: EditorState,
    options: ExportOptions,
}

impl EditorSession {
    fn apply(&mut self, action: Action) {
        let state = std::mem::take(&mut self.state);
        self.state = update(state, action);
    }
}

#[wasm_bindgen]
impl EditorSession {
    /// Open a PDF
    ///
    /// # Arguments
    /// * `name` - File name, used for download names
    /// * `pdf_bytes` - The PDF file as a byte array
    #[wasm_bindgen(constructor)]
    pub fn new(name: &str, pdf_bytes: &[u8]) -> Result<EditorSession, JsError> {
        let page_count = page_count(pdf_bytes).map_err(|e| JsError::new(&e.to_string()))?;

        let state = update(
            EditorState::new(),
            Action::Open {
                name: name.to_string(),
                bytes: Arc::from(pdf_bytes),
                page_count,
            },
        );

        Ok(EditorSession {
            state,
            options: ExportOptions::default(),
        })
    }

    /// Get the number of pages in the document
    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.state.page_count()
    }

    /// Get the 1-based page shown in the stamp view
    #[wasm_bindgen(getter, js_name = currentPage)]
    pub fn current_page(&self) -> u32 {
        self.state.current_page
    }

    /// Get the page width the viewer should render at
    #[wasm_bindgen(getter, js_name = viewerWidth)]
    pub fn viewer_width(&self) -> f64 {
        self.state.geometry.page_width
    }

    /// Get the active tool: "stamp" or "split"
    #[wasm_bindgen(getter)]
    pub fn mode(&self) -> String {
        match self.state.mode {
            Mode::Stamp => "stamp".to_string(),
            Mode::Split => "split".to_string(),
        }
    }

    /// Get document bytes for pdf.js rendering
    #[wasm_bindgen(js_name = documentBytes)]
    pub fn document_bytes(&self) -> js_sys::Uint8Array {
        let bytes: &[u8] = self
            .state
            .document
            .as_ref()
            .map(|d| &d.bytes[..])
            .unwrap_or_default();
        let array = js_sys::Uint8Array::new_with_length(bytes.len() as u32);
        array.copy_from(bytes);
        array
    }

    /// Get page sizes in points as a JSON array of `{width, height}`
    #[wasm_bindgen(js_name = pageSizesJson)]
    pub fn page_sizes_json(&self) -> Result<String, JsError> {
        let bytes = match &self.state.document {
            Some(document) => document.bytes.clone(),
            None => return Ok("[]".to_string()),
        };
        let sizes = page_sizes(&bytes).map_err(|e| JsError::new(&e.to_string()))?;
        serde_json::to_string(&sizes).map_err(|e| JsError::new(&e.to_string()))
    }

    /// Get the overlays on the current page as a JSON array
    #[wasm_bindgen(js_name = currentOverlaysJson)]
    pub fn current_overlays_json(&self) -> String {
        let overlays: Vec<serde_json::Value> = self
            .state
            .current_overlays()
            .map(|o| {
                serde_json::json!({
                    "id": o.id.0,
                    "page": o.page,
                    "x": o.x,
                    "y": o.y,
                    "width": o.width,
                    "height": o.height,
                })
            })
            .collect();
        serde_json::to_string(&overlays).unwrap_or_else(|_| "[]".to_string())
    }

    /// Get the total number of overlays across all pages
    #[wasm_bindgen(getter, js_name = overlayCount)]
    pub fn overlay_count(&self) -> usize {
        self.state.overlays.len()
    }

    /// Get the selected pages (zero-based, ascending)
    #[wasm_bindgen(getter, js_name = selectedPages)]
    pub fn selected_pages(&self) -> Vec<u32> {
        self.state.selection.indices()
    }

    /// Get the page range text as typed
    #[wasm_bindgen(getter, js_name = pageInput)]
    pub fn page_input(&self) -> String {
        self.state.page_input.clone()
    }

    /// Get the pending notice as JSON `{message, kind}`, or null
    #[wasm_bindgen(getter)]
    pub fn notice(&self) -> Option<String> {
        self.state
            .notice
            .as_ref()
            .and_then(|n| serde_json::to_string(n).ok())
    }

    /// Add an image overlay on the current page and return its id
    #[wasm_bindgen(js_name = addOverlay)]
    pub fn add_overlay(&mut self, image_bytes: &[u8]) -> Result<f64, JsError> {
        let (natural_width, natural_height) =
            image_dimensions(image_bytes).map_err(|e| JsError::new(&e.to_string()))?;
        let id = self.state.next_overlay_id();
        self.apply(Action::AddOverlay {
            image: Arc::from(image_bytes),
            natural_width,
            natural_height,
        });
        Ok(id.0 as f64)
    }

    /// Move an overlay after a drag
    #[wasm_bindgen(js_name = moveOverlay)]
    pub fn move_overlay(&mut self, id: f64, x: f64, y: f64) {
        self.apply(Action::MoveOverlay {
            id: OverlayId(id as u64),
            x,
            y,
        });
    }

    /// Resize an overlay; `handle` is one of n, s, e, w, ne, nw, se, sw
    #[wasm_bindgen(js_name = resizeOverlay)]
    pub fn resize_overlay(
        &mut self,
        id: f64,
        width: f64,
        height: f64,
        handle: &str,
    ) -> Result<(), JsError> {
        let handle: Handle = handle.parse().map_err(|e: String| JsError::new(&e))?;
        self.apply(Action::ResizeOverlay {
            id: OverlayId(id as u64),
            width,
            height,
            handle,
        });
        Ok(())
    }

    /// Move the stamp view by `offset` pages
    #[wasm_bindgen(js_name = changePage)]
    pub fn change_page(&mut self, offset: i32) {
        self.apply(Action::ChangePage(i64::from(offset)));
    }

    /// Switch between "stamp" and "split"
    #[wasm_bindgen(js_name = setMode)]
    pub fn set_mode(&mut self, mode: &str) -> Result<(), JsError> {
        let mode = match mode {
            "stamp" => Mode::Stamp,
            "split" => Mode::Split,
            other => return Err(JsError::new(&format!("Unknown mode: {}", other))),
        };
        self.apply(Action::SetMode(mode));
        Ok(())
    }

    /// Update the page range text box
    #[wasm_bindgen(js_name = setPageInput)]
    pub fn set_page_input(&mut self, text: &str) {
        self.apply(Action::SetPageInput(text.to_string()));
    }

    /// Toggle a page (zero-based) in the selection
    #[wasm_bindgen(js_name = togglePage)]
    pub fn toggle_page(&mut self, index: u32) {
        self.apply(Action::TogglePage(index));
    }

    #[wasm_bindgen(js_name = selectAll)]
    pub fn select_all(&mut self) {
        self.apply(Action::SelectAll);
    }

    #[wasm_bindgen(js_name = deselectAll)]
    pub fn deselect_all(&mut self) {
        self.apply(Action::DeselectAll);
    }

    /// Report the browser window width so the viewer can resize
    #[wasm_bindgen(js_name = windowResized)]
    pub fn window_resized(&mut self, width: f64) {
        self.apply(Action::WindowResized(width));
    }

    #[wasm_bindgen(js_name = dismissNotice)]
    pub fn dismiss_notice(&mut self) {
        self.apply(Action::DismissNotice);
    }

    /// Drop the document and every overlay
    pub fn reset(&mut self) {
        self.apply(Action::Reset);
    }

    /// Re-encode opaque non-JPEG overlays as JPEG at `quality`, or store them
    /// losslessly when `quality` is undefined
    #[wasm_bindgen(js_name = setJpegQuality)]
    pub fn set_jpeg_quality(&mut self, quality: Option<u8>) {
        self.options.jpeg_quality = quality;
    }

    /// Render the overlays onto the PDF
    ///
    /// # Returns
    /// An `ExportResultJs`, or undefined when there are no overlays. Throws on
    /// failure; the outcome is also recorded as the notice.
    #[wasm_bindgen(js_name = exportStamped)]
    pub fn export_stamped(&mut self) -> Result<Option<ExportResultJs>, JsError> {
        let outcome = export_stamped(&self.state, &self.options);
        let download = self.finish(ExportKind::Stamped, outcome)?;
        Ok(download.map(|(download, result)| ExportResultJs {
            file_name: download.file_name,
            pdf_bytes: download.bytes,
            stamped_overlays: result.stamped_overlays,
            skipped_overlays: result.skipped_overlays,
        }))
    }

    /// Extract the selected pages into a new PDF
    ///
    /// # Returns
    /// An `ExportResultJs`, or undefined when no pages are selected. Throws on
    /// failure; the outcome is also recorded as the notice.
    #[wasm_bindgen(js_name = exportSelection)]
    pub fn export_selection(&mut self) -> Result<Option<ExportResultJs>, JsError> {
        let outcome = export_selection(&self.state, &self.options);
        let download = self.finish(ExportKind::Extracted, outcome)?;
        Ok(download.map(|download| ExportResultJs {
            file_name: download.file_name,
            pdf_bytes: download.bytes,
            stamped_overlays: 0,
            skipped_overlays: 0,
        }))
    }
}

/// Output of an export, ready to offer as a download
#[wasm_bindgen]
pub struct ExportResultJs {
    file_name: String,
    pdf_bytes: Vec<u8>,
    stamped_overlays: usize,
    skipped_overlays: usize,
}

#[wasm_bindgen]
impl ExportResultJs {
    /// Get the download name: "Edited_<name>" or "split_<name>"
    #[wasm_bindgen(getter, js_name = fileName)]
    pub fn file_name(&self) -> String {
        self.file_name.clone()
    }

    /// Get the output PDF bytes
    #[wasm_bindgen(getter, js_name = pdfBytes)]
    pub fn pdf_bytes(&self) -> Vec<u8> {
        self.pdf_bytes.clone()
    }

    /// Get the number of overlays drawn (zero for page extraction)
    #[wasm_bindgen(getter, js_name = stampedOverlays)]
    pub fn stamped_overlays(&self) -> usize {
        self.stamped_overlays
    }

    /// Get the number of overlays whose page does not exist
    #[wasm_bindgen(getter, js_name = skippedOverlays)]
    pub fn skipped_overlays(&self) -> usize {
        self.skipped_overlays
    }
}

impl EditorSession {
    /// Record an export outcome as a notice and pass it on
    fn finish<T>(
        &mut self,
        kind: ExportKind,
        outcome: Result<Option<T>, crate::StampError>,
    ) -> Result<Option<T>, JsError> {
        match outcome {
            Ok(None) => Ok(None),
            Ok(Some(value)) => {
                self.apply(Action::ExportFinished {
                    kind,
                    succeeded: true,
                });
                Ok(Some(value))
            }
            Err(e) => {
                web_sys::console::error_1(&JsValue::from_str(&e.to_string()));
                self.apply(Action::ExportFinished {
                    kind,
                    succeeded: false,
                });
                Err(JsError::new(&e.to_string()))
            }
        }
    }
}
