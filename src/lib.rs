//! PDF Image Stamper Library
//!
//! Core logic for placing raster images (signatures, stamps) on PDF pages and
//! extracting page subsets. Shared between CLI and WASM targets.
//!
//! The page range parser, overlay geometry and editor state are pure and have
//! no PDF dependency; `embed` and `export` do the PDF work with lopdf.

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub mod embed;
pub mod error;
pub mod export;
pub mod layout;
pub mod overlay;
pub mod page_range;
pub mod session;

pub use embed::{embed_image, EmbeddedImage};
pub use error::StampError;
#[cfg(not(target_arch = "wasm32"))]
pub use export::file_ops;
pub use export::{
    extract_pages_bytes, page_count, page_sizes, stamp_pdf_bytes, ExportOptions, PageSize,
    StampResult,
};
pub use layout::{Layout, LayoutOverlay};
pub use overlay::{DocumentRect, Handle, Overlay, OverlayId, ViewerGeometry, MIN_SIZE};
pub use page_range::{parse_page_range, PageSelection};
pub use session::{
    export_selection, export_stamped, update, Action, Download, EditorState, ExportKind, Mode,
    Notice, NoticeKind, Step,
};

/// Pixel dimensions of an encoded image, without decoding the pixel data
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), StampError> {
    image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| StampError::Image(e.to_string()))?
        .into_dimensions()
        .map_err(|e| StampError::Image(e.to_string()))
}
