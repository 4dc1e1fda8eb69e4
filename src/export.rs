//! PDF output: drawing overlays onto pages and extracting page subsets
//!
//! Overlays are drawn as image XObjects appended to the page content.
//! Extraction builds a document holding only the selected pages, in
//! document order.

use crate::embed::embed_image;
use crate::error::StampError;
use crate::overlay::{Overlay, ViewerGeometry};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Page size used when neither a page nor its ancestors carry a MediaBox
pub const FALLBACK_PAGE_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// Options for writing output PDFs
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Compress PDF streams (reduces file size)
    pub compress_streams: bool,
    /// Re-encode opaque non-JPEG overlay images as JPEG at this quality (1-100)
    pub jpeg_quality: Option<u8>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            compress_streams: true,
            jpeg_quality: None,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<(), StampError> {
        match self.jpeg_quality {
            Some(q) if q == 0 || q > 100 => Err(StampError::InvalidQuality),
            _ => Ok(()),
        }
    }
}

/// Result of a stamping run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StampResult {
    pub page_count: u32,
    pub stamped_overlays: usize,
    /// Overlays whose page does not exist in the document
    pub skipped_overlays: usize,
}

/// Page dimensions in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

fn load(bytes: &[u8]) -> Result<Document, StampError> {
    Document::load_mem(bytes).map_err(|e| StampError::Load(e.to_string()))
}

fn save(doc: &mut Document) -> Result<Vec<u8>, StampError> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| StampError::Save(e.to_string()))?;
    Ok(output)
}

fn processing(e: lopdf::Error) -> StampError {
    StampError::Processing(e.to_string())
}

/// Number of pages in a PDF
pub fn page_count(bytes: &[u8]) -> Result<u32, StampError> {
    Ok(load(bytes)?.get_pages().len() as u32)
}

/// Size of every page, in page order
pub fn page_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, StampError> {
    let doc = load(bytes)?;
    Ok(doc
        .get_pages()
        .values()
        .map(|&page_id| page_size(&doc, page_id))
        .collect())
}

/// Draw `overlays` onto a PDF and return the new PDF bytes.
///
/// Overlay coordinates are viewer pixels under `geometry`; each page's own
/// width sets the conversion to points.
pub fn stamp_pdf_bytes(
    input_bytes: &[u8],
    overlays: &[Overlay],
    geometry: ViewerGeometry,
    options: &ExportOptions,
) -> Result<(Vec<u8>, StampResult), StampError> {
    options.validate()?;
    let mut doc = load(input_bytes)?;

    let result = stamp_document(&mut doc, overlays, geometry, options)?;

    if options.compress_streams {
        doc.compress();
    }

    let output = save(&mut doc)?;
    log::info!(
        "Stamped {} overlays ({} skipped), {} bytes written",
        result.stamped_overlays,
        result.skipped_overlays,
        output.len()
    );
    Ok((output, result))
}

/// Build a PDF holding only the pages at `indices` (zero-based)
pub fn extract_pages_bytes(
    input_bytes: &[u8],
    indices: &[u32],
    options: &ExportOptions,
) -> Result<Vec<u8>, StampError> {
    let doc = load(input_bytes)?;
    let mut extracted = extract_from_document(doc, indices, options)?;
    let output = save(&mut extracted)?;
    log::info!(
        "Extracted {} pages, {} bytes written",
        indices.len(),
        output.len()
    );
    Ok(output)
}

fn stamp_document(
    doc: &mut Document,
    overlays: &[Overlay],
    geometry: ViewerGeometry,
    options: &ExportOptions,
) -> Result<StampResult, StampError> {
    if !(geometry.page_width.is_finite() && geometry.page_width > 0.0) {
        return Err(StampError::Processing(format!(
            "Viewer width must be positive, got {}",
            geometry.page_width
        )));
    }

    let pages = doc.get_pages();
    let mut result = StampResult {
        page_count: pages.len() as u32,
        ..Default::default()
    };
    let mut wrapped_pages = HashSet::new();

    for overlay in overlays {
        let Some(&page_id) = pages.get(&overlay.page) else {
            log::warn!(
                "Skipping overlay {} on page {}: document has {} pages",
                overlay.id,
                overlay.page,
                result.page_count
            );
            result.skipped_overlays += 1;
            continue;
        };

        let size = page_size(doc, page_id);
        let rect = geometry.to_document_space(overlay, size.width, size.height);
        log::debug!(
            "Overlay {} on page {}: {:.1}x{:.1} px -> {:.2}x{:.2} pt at ({:.2}, {:.2})",
            overlay.id,
            overlay.page,
            overlay.width,
            overlay.height,
            rect.width,
            rect.height,
            rect.x,
            rect.y
        );

        let image = embed_image(doc, &overlay.image, options.jpeg_quality)?;
        let name = register_xobject(doc, page_id, image.id)?;

        if wrapped_pages.insert(page_id) {
            isolate_page_content(doc, page_id)?;
        }

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(rect.width as f32),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(rect.height as f32),
                        Object::Real(rect.x as f32),
                        Object::Real(rect.y as f32),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name)]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content.encode().map_err(processing)?;
        doc.add_page_contents(page_id, encoded).map_err(processing)?;

        result.stamped_overlays += 1;
    }

    Ok(result)
}

fn extract_from_document(
    mut doc: Document,
    indices: &[u32],
    options: &ExportOptions,
) -> Result<Document, StampError> {
    if indices.is_empty() {
        return Err(StampError::InvalidSelection("No pages specified".into()));
    }

    let page_count = doc.get_pages().len() as u32;
    let keep: BTreeSet<u32> = indices.iter().copied().collect();
    if let Some(&last) = keep.last() {
        if last >= page_count {
            return Err(StampError::InvalidSelection(format!(
                "Page {} does not exist (document has {} pages)",
                last + 1,
                page_count
            )));
        }
    }

    // delete_pages works on 1-based page numbers
    let delete: Vec<u32> = (1..=page_count)
        .filter(|page| !keep.contains(&(page - 1)))
        .collect();
    doc.delete_pages(&delete);
    drop_document_structures(&mut doc);
    doc.prune_objects();

    if options.compress_streams {
        doc.compress();
    }

    Ok(doc)
}

/// Catalog entries that can point at pages; an extract starts without them
const DOCUMENT_STRUCTURES: &[&[u8]] = &[
    b"Outlines",
    b"Dests",
    b"Names",
    b"AcroForm",
    b"StructTreeRoot",
    b"OpenAction",
    b"PageLabels",
];

fn drop_document_structures(doc: &mut Document) {
    let Ok(root_id) = doc.trailer.get(b"Root").and_then(Object::as_reference) else {
        return;
    };
    if let Ok(catalog) = doc.get_dictionary_mut(root_id) {
        for key in DOCUMENT_STRUCTURES {
            if catalog.remove(key).is_some() {
                log::debug!("Dropped /{} from extracted document", String::from_utf8_lossy(key));
            }
        }
    }
}

/// MediaBox size of a page, inherited through the page tree
fn page_size(doc: &Document, page_id: ObjectId) -> PageSize {
    let mut visited = HashSet::new();
    let mut current = Some(page_id);
    while let Some(id) = current {
        if !visited.insert(id) {
            log::warn!("Page tree cycle at {:?}", id);
            break;
        }
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Some([llx, lly, urx, ury]) = media_box(doc, dict) {
            return PageSize {
                width: (urx - llx).abs(),
                height: (ury - lly).abs(),
            };
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    log::warn!("Page {:?} has no MediaBox, assuming US Letter", page_id);
    FALLBACK_PAGE_SIZE
}

fn media_box(doc: &Document, dict: &Dictionary) -> Option<[f64; 4]> {
    let raw = dict.get(b"MediaBox").ok()?;
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let values = resolved.as_array().ok()?;
    if values.len() != 4 {
        return None;
    }

    let mut out = [0.0; 4];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = match value {
            Object::Integer(n) => *n as f64,
            Object::Real(r) => *r as f64,
            _ => return None,
        };
    }
    Some(out)
}

/// Where the resources dictionary that applies to a page lives
enum ResourcesLocation {
    /// Inline in the given page or page tree node
    Inline(ObjectId),
    /// A separate object
    Indirect(ObjectId),
}

fn locate_resources(
    doc: &mut Document,
    page_id: ObjectId,
) -> Result<ResourcesLocation, StampError> {
    let mut visited = HashSet::new();
    let mut current = Some(page_id);
    while let Some(id) = current {
        if !visited.insert(id) {
            log::warn!("Page tree cycle at {:?}", id);
            break;
        }
        let dict = doc.get_dictionary(id).map_err(processing)?;
        match dict.get(b"Resources") {
            Ok(Object::Reference(res_id)) => return Ok(ResourcesLocation::Indirect(*res_id)),
            Ok(Object::Dictionary(_)) => return Ok(ResourcesLocation::Inline(id)),
            _ => {}
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    // Nothing to inherit: give the page its own
    doc.get_dictionary_mut(page_id)
        .map_err(processing)?
        .set("Resources", Dictionary::new());
    Ok(ResourcesLocation::Inline(page_id))
}

fn resources_mut<'a>(
    doc: &'a mut Document,
    location: &ResourcesLocation,
) -> Result<&'a mut Dictionary, StampError> {
    match *location {
        ResourcesLocation::Inline(owner) => doc
            .get_dictionary_mut(owner)
            .and_then(|d| d.get_mut(b"Resources"))
            .and_then(Object::as_dict_mut)
            .map_err(processing),
        ResourcesLocation::Indirect(id) => doc.get_dictionary_mut(id).map_err(processing),
    }
}

/// Add `image_id` to the XObject resources of a page under a fresh name
fn register_xobject(
    doc: &mut Document,
    page_id: ObjectId,
    image_id: ObjectId,
) -> Result<Vec<u8>, StampError> {
    let location = locate_resources(doc, page_id)?;

    let indirect_xobjects = resources_mut(doc, &location)?
        .get(b"XObject")
        .and_then(Object::as_reference)
        .ok();

    let xobjects = match indirect_xobjects {
        Some(id) => doc.get_dictionary_mut(id).map_err(processing)?,
        None => {
            let resources = resources_mut(doc, &location)?;
            if !matches!(resources.get(b"XObject"), Ok(Object::Dictionary(_))) {
                resources.set("XObject", Dictionary::new());
            }
            resources
                .get_mut(b"XObject")
                .and_then(Object::as_dict_mut)
                .map_err(processing)?
        }
    };

    let mut n = 1;
    let name = loop {
        let candidate = format!("Stamp{}", n).into_bytes();
        if !xobjects.has(&candidate) {
            break candidate;
        }
        n += 1;
    };
    xobjects.set(name.clone(), Object::Reference(image_id));
    Ok(name)
}

/// Wrap a page's existing content in `q`/`Q` so whatever graphics state it
/// leaves behind does not leak into content appended afterwards.
fn isolate_page_content(doc: &mut Document, page_id: ObjectId) -> Result<(), StampError> {
    let existing = doc
        .get_dictionary(page_id)
        .map_err(processing)?
        .get(b"Contents")
        .ok()
        .cloned();

    let streams = match existing {
        None => return Ok(()),
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(items)) => items,
        Some(other) => {
            return Err(StampError::Processing(format!(
                "Unexpected page Contents: {:?}",
                other
            )))
        }
    };
    if streams.is_empty() {
        return Ok(());
    }

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let close_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));

    let mut contents = Vec::with_capacity(streams.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(streams);
    contents.push(Object::Reference(close_id));

    doc.get_dictionary_mut(page_id)
        .map_err(processing)?
        .set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub mod file_ops {
    use super::*;
    use std::path::Path;

    /// Stamp overlays onto a PDF on disk
    pub fn stamp_pdf_file(
        input_path: &Path,
        output_path: &Path,
        overlays: &[Overlay],
        geometry: ViewerGeometry,
        options: &ExportOptions,
    ) -> Result<StampResult, StampError> {
        options.validate()?;
        let mut doc = Document::load(input_path)
            .map_err(|e| StampError::Load(format!("{:?}: {}", input_path, e)))?;

        let result = stamp_document(&mut doc, overlays, geometry, options)?;

        if options.compress_streams {
            doc.compress();
        }

        doc.save(output_path)
            .map_err(|e| StampError::Save(format!("{:?}: {}", output_path, e)))?;

        Ok(result)
    }

    /// Write the pages at `indices` (zero-based) of a PDF on disk to a new file
    pub fn extract_pages_file(
        input_path: &Path,
        output_path: &Path,
        indices: &[u32],
        options: &ExportOptions,
    ) -> Result<(), StampError> {
        let doc = Document::load(input_path)
            .map_err(|e| StampError::Load(format!("{:?}: {}", input_path, e)))?;

        let mut extracted = extract_from_document(doc, indices, options)?;

        extracted
            .save(output_path)
            .map_err(|e| StampError::Save(format!("{:?}: {}", output_path, e)))?;

        Ok(())
    }
}
