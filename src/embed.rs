//! Image XObject construction
//!
//! Overlay images arrive as encoded bytes. JPEG data is embedded untouched
//! with `DCTDecode`; everything else is decoded and stored as Flate-compressed
//! samples, with the alpha channel split out into a soft mask.

use crate::error::StampError;
use image::{DynamicImage, ImageFormat};
use lopdf::{Document, Object, ObjectId, Stream};

/// An image XObject added to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Basic JPEG frame header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegFrame {
    bits_per_component: u8,
    width: u32,
    height: u32,
    components: u8,
}

/// Add `bytes` to `doc` as an image XObject.
///
/// With `jpeg_quality` set, opaque images that are not already JPEG are
/// re-encoded as JPEG at that quality instead of being stored losslessly.
pub fn embed_image(
    doc: &mut Document,
    bytes: &[u8],
    jpeg_quality: Option<u8>,
) -> Result<EmbeddedImage, StampError> {
    let format = image::guess_format(bytes).map_err(|e| StampError::Image(e.to_string()))?;

    if format == ImageFormat::Jpeg {
        if let Some(frame) = jpeg_frame(bytes).filter(|f| f.width > 0 && f.height > 0) {
            if let Some(stream) = jpeg_passthrough_stream(bytes, &frame) {
                let id = doc.add_object(stream);
                return Ok(EmbeddedImage {
                    id,
                    width: frame.width,
                    height: frame.height,
                });
            }
        }
        log::debug!("JPEG frame header not usable, re-encoding overlay image");
    }

    let img = image::load_from_memory(bytes).map_err(|e| StampError::Image(e.to_string()))?;
    let (width, height) = (img.width(), img.height());

    let id = if has_alpha(&img) {
        let (mut main, smask) = encode_with_alpha_stream(&img).map_err(StampError::Image)?;
        let smask_id = doc.add_object(smask);
        main.dict.set("SMask", Object::Reference(smask_id));
        doc.add_object(main)
    } else if let Some(quality) = jpeg_quality {
        let stream = encode_as_jpeg_stream(&img, quality).map_err(StampError::Image)?;
        doc.add_object(stream)
    } else {
        let stream = encode_flate_stream(&img).map_err(StampError::Image)?;
        doc.add_object(stream)
    };

    Ok(EmbeddedImage { id, width, height })
}

/// Find the first start-of-frame segment of a JPEG stream
fn jpeg_frame(data: &[u8]) -> Option<JpegFrame> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];

        // Fill bytes and standalone markers carry no length
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            pos += 2;
            continue;
        }
        if marker == 0xD9 || marker == 0xDA {
            return None;
        }

        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let is_frame = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let segment = data.get(pos + 4..pos + 2 + length)?;
            if segment.len() < 6 {
                return None;
            }
            return Some(JpegFrame {
                bits_per_component: segment[0],
                height: u16::from_be_bytes([segment[1], segment[2]]) as u32,
                width: u16::from_be_bytes([segment[3], segment[4]]) as u32,
                components: segment[5],
            });
        }

        pos += 2 + length;
    }

    None
}

/// Wrap JPEG bytes as a `DCTDecode` image stream without decoding them
fn jpeg_passthrough_stream(bytes: &[u8], frame: &JpegFrame) -> Option<Stream> {
    let color_space = match frame.components {
        1 => "DeviceGray",
        3 => "DeviceRGB",
        4 => "DeviceCMYK",
        _ => return None,
    };

    let mut dict = lopdf::Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(frame.width as i64));
    dict.set("Height", Object::Integer(frame.height as i64));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set(
        "BitsPerComponent",
        Object::Integer(frame.bits_per_component as i64),
    );
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    dict.set("Length", Object::Integer(bytes.len() as i64));
    if frame.components == 4 {
        // Adobe CMYK JPEGs store inverted samples
        dict.set(
            "Decode",
            Object::Array(
                [1, 0, 1, 0, 1, 0, 1, 0]
                    .iter()
                    .map(|&v| Object::Integer(v))
                    .collect(),
            ),
        );
    }

    let mut stream = Stream::new(dict, bytes.to_vec());
    stream.allows_compression = false;
    Some(stream)
}

/// Compress samples with zlib at the best ratio
fn deflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
    std::io::Write::write_all(&mut encoder, data)
        .map_err(|e| format!("Failed to compress image data: {}", e))?;
    encoder
        .finish()
        .map_err(|e| format!("Failed to finish compression: {}", e))
}

fn flate_image_dict(
    width: u32,
    height: u32,
    color_space: &str,
    length: usize,
) -> lopdf::Dictionary {
    let mut dict = lopdf::Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    dict.set("Length", Object::Integer(length as i64));
    dict
}

/// Store an opaque image losslessly
fn encode_flate_stream(img: &DynamicImage) -> Result<Stream, String> {
    let (width, height) = (img.width(), img.height());

    let (samples, color_space) = if img.color().has_color() {
        (img.to_rgb8().into_raw(), "DeviceRGB")
    } else {
        (img.to_luma8().into_raw(), "DeviceGray")
    };

    let compressed = deflate(&samples)?;
    let dict = flate_image_dict(width, height, color_space, compressed.len());
    Ok(Stream::new(dict, compressed))
}

/// Encode an image as JPEG and create a PDF stream
fn encode_as_jpeg_stream(img: &DynamicImage, quality: u8) -> Result<Stream, String> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let (w16, h16) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(format!("Image too large for JPEG: {}x{}", width, height)),
    };

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality);
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder
        .encode(rgb.as_raw(), w16, h16, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| format!("Failed to encode JPEG: {}", e))?;

    let mut dict = lopdf::Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    dict.set("Length", Object::Integer(jpeg_bytes.len() as i64));

    let mut stream = Stream::new(dict, jpeg_bytes);
    stream.allows_compression = false;
    Ok(stream)
}

/// Encode an image with alpha as RGB samples plus a grey soft mask
fn encode_with_alpha_stream(img: &DynamicImage) -> Result<(Stream, Stream), String> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let raw_data = rgba.into_raw();

    // Separate RGB and Alpha channels
    let mut rgb_data = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha_data = Vec::with_capacity((width * height) as usize);

    for chunk in raw_data.chunks(4) {
        rgb_data.extend_from_slice(&chunk[..3]);
        alpha_data.push(chunk[3]);
    }

    let compressed_rgb = deflate(&rgb_data)?;
    let compressed_alpha = deflate(&alpha_data)?;

    let main_dict = flate_image_dict(width, height, "DeviceRGB", compressed_rgb.len());
    let smask_dict = flate_image_dict(width, height, "DeviceGray", compressed_alpha.len());

    Ok((
        Stream::new(main_dict, compressed_rgb),
        Stream::new(smask_dict, compressed_alpha),
    ))
}

/// Check if an image has any pixel that is not fully opaque
fn has_alpha(img: &DynamicImage) -> bool {
    match img {
        DynamicImage::ImageRgba8(rgba) => rgba.pixels().any(|p| p.0[3] < 255),
        DynamicImage::ImageLumaA8(la) => la.pixels().any(|p| p.0[1] < 255),
        other if other.color().has_alpha() => other.to_rgba8().pixels().any(|p| p.0[3] < 255),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn jpeg_bytes(
        width: u16,
        height: u16,
        color: jpeg_encoder::ColorType,
        channels: usize,
    ) -> Vec<u8> {
        let pixels = vec![128u8; width as usize * height as usize * channels];
        let mut out = Vec::new();
        jpeg_encoder::Encoder::new(&mut out, 90)
            .encode(&pixels, width, height, color)
            .unwrap();
        out
    }

    fn image_dict(doc: &Document, id: ObjectId) -> lopdf::Dictionary {
        match doc.get_object(id).unwrap() {
            Object::Stream(stream) => stream.dict.clone(),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    fn name(dict: &lopdf::Dictionary, key: &[u8]) -> String {
        String::from_utf8_lossy(dict.get(key).unwrap().as_name().unwrap()).to_string()
    }

    #[test]
    fn test_jpeg_frame_reads_header() {
        let data = jpeg_bytes(12, 7, jpeg_encoder::ColorType::Rgb, 3);
        let frame = jpeg_frame(&data).unwrap();
        assert_eq!((frame.width, frame.height), (12, 7));
        assert_eq!(frame.components, 3);
        assert_eq!(frame.bits_per_component, 8);
    }

    #[test]
    fn test_jpeg_frame_rejects_non_jpeg() {
        assert!(jpeg_frame(b"\x89PNG\r\n\x1a\n").is_none());
        assert!(jpeg_frame(&[0xFF, 0xD8]).is_none());
    }

    #[test]
    fn test_rgb_jpeg_is_passed_through() {
        let data = jpeg_bytes(8, 4, jpeg_encoder::ColorType::Rgb, 3);
        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &data, None).unwrap();
        assert_eq!((embedded.width, embedded.height), (8, 4));

        let dict = image_dict(&doc, embedded.id);
        assert_eq!(name(&dict, b"Filter"), "DCTDecode");
        assert_eq!(name(&dict, b"ColorSpace"), "DeviceRGB");
        match doc.get_object(embedded.id).unwrap() {
            Object::Stream(stream) => assert_eq!(stream.content, data),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_gray_jpeg_uses_device_gray() {
        let data = jpeg_bytes(5, 5, jpeg_encoder::ColorType::Luma, 1);
        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &data, None).unwrap();
        assert_eq!(name(&image_dict(&doc, embedded.id), b"ColorSpace"), "DeviceGray");
    }

    #[test]
    fn test_transparent_png_gets_soft_mask() {
        let mut img = RgbaImage::from_pixel(6, 3, Rgba([10, 20, 30, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let data = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &data, None).unwrap();
        let dict = image_dict(&doc, embedded.id);
        assert_eq!(name(&dict, b"Filter"), "FlateDecode");

        let smask_id = dict.get(b"SMask").unwrap().as_reference().unwrap();
        let smask = image_dict(&doc, smask_id);
        assert_eq!(name(&smask, b"ColorSpace"), "DeviceGray");
        assert_eq!(smask.get(b"Width").unwrap().as_i64().unwrap(), 6);
    }

    #[test]
    fn test_opaque_png_has_no_soft_mask() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255]));
        let data = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &data, None).unwrap();
        let dict = image_dict(&doc, embedded.id);
        assert!(dict.get(b"SMask").is_err());
        assert_eq!(name(&dict, b"ColorSpace"), "DeviceRGB");
    }

    #[test]
    fn test_gray_png_stays_gray() {
        let img = GrayImage::from_pixel(3, 3, Luma([90]));
        let data = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);

        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &data, None).unwrap();
        assert_eq!(name(&image_dict(&doc, embedded.id), b"ColorSpace"), "DeviceGray");
    }

    #[test]
    fn test_quality_reencodes_opaque_png_as_jpeg() {
        let img = RgbImage::from_pixel(16, 16, Rgb([0, 120, 240]));
        let data = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &data, Some(60)).unwrap();
        assert_eq!(name(&image_dict(&doc, embedded.id), b"Filter"), "DCTDecode");
    }

    #[test]
    fn test_garbage_bytes_fail() {
        let mut doc = Document::with_version("1.7");
        let result = embed_image(&mut doc, b"definitely not an image", None);
        assert!(matches!(result, Err(StampError::Image(_))));
    }
}
