//! Embedded image extraction from PDF documents
//!
//! Extraction is best effort. A document that cannot be parsed fails the
//! whole operation; an embedded image that cannot be decoded is skipped and
//! listed in the [`ExtractionReport`].

use crate::{
    error::{PipelineError, Result},
    services::io::ImageIOService,
    types::ExtractionReport,
};
use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Maximum depth followed through `Parent` links and nested forms
const MAX_NESTING: usize = 32;

/// Decoded form of one embedded image
#[derive(Debug)]
enum EmbeddedImage {
    /// JPEG data, written verbatim
    Jpeg(Vec<u8>),
    /// Raw samples decoded into pixels, written as PNG
    Pixels(DynamicImage),
}

impl EmbeddedImage {
    fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg(_) => "jpeg",
            Self::Pixels(_) => "png",
        }
    }

    fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Jpeg(bytes) => Ok(bytes),
            Self::Pixels(image) => ImageIOService::encode_png(&image),
        }
    }
}

pub struct PdfImageExtractor;

impl PdfImageExtractor {
    /// Extract every embedded raster image of `pdf_path` into `output_dir`
    ///
    /// Files are named `page_{page}_img_{index}.{ext}` with 1-based page and
    /// per-page image numbers.
    ///
    /// # Errors
    /// - `PipelineError::Io` when the document cannot be read or a file cannot be written
    /// - `PipelineError::Format` when the document cannot be parsed
    pub fn extract(pdf_path: &Path, output_dir: &Path) -> Result<ExtractionReport> {
        let data = std::fs::read(pdf_path)
            .map_err(|e| PipelineError::file_io_error("read PDF document", pdf_path, &e))?;
        Self::extract_from_bytes(&data, output_dir)
    }

    /// Extract from an in-memory document
    ///
    /// # Errors
    /// - `PipelineError::Io` when a file cannot be written
    /// - `PipelineError::Format` when the document cannot be parsed
    pub fn extract_from_bytes(data: &[u8], output_dir: &Path) -> Result<ExtractionReport> {
        let doc = Document::load_mem(data)
            .map_err(|e| PipelineError::format(format!("Failed to parse PDF document: {}", e)))?;

        std::fs::create_dir_all(output_dir)
            .map_err(|e| PipelineError::file_io_error("create output directory", output_dir, &e))?;

        let mut report = ExtractionReport::default();

        for (page_number, page_id) in doc.get_pages() {
            for (position, image_id) in collect_page_images(&doc, page_id).into_iter().enumerate() {
                let file_stem = format!("page_{}_img_{}", page_number, position + 1);

                let decoded = match doc.get_object(image_id) {
                    Ok(Object::Stream(stream)) => decode_image(&doc, stream),
                    _ => Err("image object is not a stream".to_string()),
                };

                match decoded {
                    Ok(image) => {
                        let file_name = format!("{}.{}", file_stem, image.extension());
                        let bytes = image.into_bytes()?;
                        let path = ImageIOService::write_atomic(output_dir, &file_name, &bytes)?;
                        debug!(path = %path.display(), "Extracted image");
                        report.extracted.push(path);
                    },
                    Err(reason) => {
                        warn!(image = %file_stem, reason = %reason, "Skipping embedded image");
                        report.skipped.push(format!("{}: {}", file_stem, reason));
                    },
                }
            }
        }

        info!(
            extracted = report.extracted_count(),
            skipped = report.skipped.len(),
            "PDF image extraction finished"
        );
        Ok(report)
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn name_of(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

fn integer(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match dict.get(key).ok()? {
        Object::Integer(value) => Some(*value),
        _ => None,
    }
}

/// Resources of a page, following inherited `Parent` entries
fn page_resources<'a>(doc: &'a Document, page_id: ObjectId) -> Option<&'a Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_NESTING {
        if let Ok(resources) = current.get(b"Resources") {
            return match resolve(doc, resources)? {
                Object::Dictionary(dict) => Some(dict),
                _ => None,
            };
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Image XObjects reachable from a page, in resource order
fn collect_page_images(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();
    if let Some(resources) = page_resources(doc, page_id) {
        collect_from_resources(doc, resources, &mut images, &mut seen, 0);
    }
    images
}

fn collect_from_resources(
    doc: &Document,
    resources: &Dictionary,
    images: &mut Vec<ObjectId>,
    seen: &mut HashSet<ObjectId>,
    depth: usize,
) {
    if depth > MAX_NESTING {
        return;
    }
    let xobjects = resources.get(b"XObject").ok().and_then(|x| resolve(doc, x));
    let Some(Object::Dictionary(xobjects)) = xobjects else {
        return;
    };

    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(id) else {
            continue;
        };

        match stream.dict.get(b"Subtype").ok().and_then(name_of) {
            Some(b"Image") => images.push(id),
            Some(b"Form") => {
                if let Some(Object::Dictionary(form_resources)) =
                    stream.dict.get(b"Resources").ok().and_then(|r| resolve(doc, r))
                {
                    collect_from_resources(doc, form_resources, images, seen, depth + 1);
                }
            },
            _ => {},
        }
    }
}

fn filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items.iter().filter_map(name_of).map(<[u8]>::to_vec).collect(),
        _ => Vec::new(),
    }
}

fn inflate(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut decoded = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| format!("corrupt Flate data: {}", e))?;
    Ok(decoded)
}

fn decode_image(doc: &Document, stream: &Stream) -> std::result::Result<EmbeddedImage, String> {
    if stream.dict.get(b"ImageMask").ok().and_then(|m| m.as_bool().ok()) == Some(true) {
        return Err("stencil masks are not extracted".to_string());
    }

    let filters = filters(stream);
    let mut data = stream.content.clone();

    for (position, filter) in filters.iter().enumerate() {
        match filter.as_slice() {
            b"FlateDecode" | b"Fl" => data = inflate(&data)?,
            b"DCTDecode" | b"DCT" if position + 1 == filters.len() => {
                image::load_from_memory_with_format(&data, image::ImageFormat::Jpeg)
                    .map_err(|e| format!("corrupt JPEG data: {}", e))?;
                return Ok(EmbeddedImage::Jpeg(data));
            },
            other => {
                return Err(format!(
                    "unsupported filter {}",
                    String::from_utf8_lossy(other)
                ))
            },
        }
    }

    if filters.iter().any(|f| f == b"FlateDecode" || f == b"Fl") {
        data = apply_predictor(stream, data)?;
    }

    decode_samples(doc, stream, &data).map(EmbeddedImage::Pixels)
}

fn decode_params(stream: &Stream) -> Option<&Dictionary> {
    match stream.dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(dict) => Some(dict),
        Object::Array(items) => items.iter().find_map(|item| item.as_dict().ok()),
        _ => None,
    }
}

/// Undo PNG row prediction (predictor values 10 and above)
fn apply_predictor(stream: &Stream, data: Vec<u8>) -> std::result::Result<Vec<u8>, String> {
    let Some(params) = decode_params(stream) else {
        return Ok(data);
    };
    let predictor = integer(params, b"Predictor").unwrap_or(1);
    if predictor < 10 {
        if predictor == 2 {
            return Err("TIFF predictor is not supported".to_string());
        }
        return Ok(data);
    }

    let width = integer(&stream.dict, b"Width").ok_or("missing width")?;
    let columns = integer(params, b"Columns").unwrap_or(width);
    if columns != width {
        return Err(format!(
            "predictor columns {} do not match image width {}",
            columns, width
        ));
    }
    let colors = positive(integer(params, b"Colors").unwrap_or(1), "predictor colors")?;
    let bits = positive(
        integer(params, b"BitsPerComponent").unwrap_or(8),
        "predictor bits per component",
    )?;
    let columns = positive(columns, "predictor columns")?;

    let bits_per_pixel = colors
        .checked_mul(bits)
        .ok_or("predictor pixel size overflows")?;
    let bpp = bits_per_pixel.div_ceil(8).max(1);
    let row_len = columns
        .checked_mul(bits_per_pixel)
        .ok_or("predictor row size overflows")?
        .div_ceil(8);
    if row_len.checked_add(1).map_or(true, |stride| stride > data.len()) {
        return Err(format!(
            "predicted data too short for {}-byte rows ({} bytes)",
            row_len,
            data.len()
        ));
    }

    let mut out = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < row_len + 1 {
            break;
        }
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let upper_left = if i >= bpp { previous[i - bpp] } else { 0 };
            let predicted = match filter_type {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, upper_left),
                other => return Err(format!("invalid PNG predictor row type {}", other)),
            };
            row[i] = row[i].wrapping_add(predicted);
        }
        out.extend_from_slice(&row);
        previous = row;
    }
    Ok(out)
}

/// Convert a dictionary integer to a positive size
fn positive(value: i64, what: &str) -> std::result::Result<usize, String> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("invalid {} {}", what, value))
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Number of color components of an image's color space
fn components(doc: &Document, color_space: &Object) -> Option<usize> {
    match resolve(doc, color_space)? {
        Object::Name(name) => match name.as_slice() {
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(3),
            b"DeviceGray" | b"G" | b"CalGray" => Some(1),
            b"DeviceCMYK" | b"CMYK" => Some(4),
            _ => None,
        },
        Object::Array(items) => match items.first().and_then(name_of) {
            Some(b"ICCBased") => match resolve(doc, items.get(1)?)? {
                Object::Stream(profile) => {
                    integer(&profile.dict, b"N").and_then(|n| usize::try_from(n).ok())
                },
                _ => None,
            },
            Some(b"CalRGB") => Some(3),
            Some(b"CalGray") => Some(1),
            _ => None,
        },
        _ => None,
    }
}

/// Read `Width` or `Height` as a positive `u32`
fn dimension(dict: &Dictionary, key: &[u8]) -> std::result::Result<u32, String> {
    let name = String::from_utf8_lossy(key);
    let value = integer(dict, key).ok_or_else(|| format!("missing {}", name.to_lowercase()))?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("invalid {} {}", name.to_lowercase(), value))
}

fn decode_samples(
    doc: &Document,
    stream: &Stream,
    data: &[u8],
) -> std::result::Result<DynamicImage, String> {
    let width = dimension(&stream.dict, b"Width")?;
    let height = dimension(&stream.dict, b"Height")?;
    let bits = integer(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return Err(format!("{} bits per component is not supported", bits));
    }

    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .map_err(|_| "missing color space".to_string())?;
    let channels = components(doc, color_space).ok_or("unsupported color space")?;

    let needed = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or("image dimensions overflow")?;
    if data.len() < needed {
        return Err(format!(
            "truncated sample data ({} of {} bytes)",
            data.len(),
            needed
        ));
    }
    let samples = data[..needed].to_vec();

    let image = match channels {
        1 => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        4 => {
            let rgb = samples
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = 255 - u16::from(cmyk[3]);
                    [0, 1, 2].map(|i| ((255 - u16::from(cmyk[i])) * k / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        },
        n => return Err(format!("{} color components are not supported", n)),
    };

    image.ok_or_else(|| "sample data does not match dimensions".to_string())
}
