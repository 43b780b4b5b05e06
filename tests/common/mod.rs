//! Shared helpers for integration tests

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::io::Cursor;
use std::path::Path;

/// Encode a solid-color opaque image in the given format
pub fn solid_image(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .expect("encode test image");
    buffer
}

/// PNG cut-out whose left half is opaque red and right half fully transparent
pub fn half_transparent_png(width: u32, height: u32) -> Vec<u8> {
    let mut image = RgbaImage::new(width, height);
    for (x, _, pixel) in image.enumerate_pixels_mut() {
        *pixel = if x < width / 2 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        };
    }
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("encode cut-out");
    buffer
}

/// Write a record table with the required header row
pub fn write_table(path: &Path, rows: &[(&str, &str)]) {
    let mut content = String::from("Image link,Image Name\n");
    for (link, name) in rows {
        content.push_str(&format!("{link},{name}\n"));
    }
    std::fs::write(path, content).expect("write table");
}

/// Sorted entry names of a ZIP archive
pub fn archive_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("open archive");
    let archive = zip::ZipArchive::new(file).expect("read archive");
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

/// Single-page PDF holding one DCT (JPEG) image and one unfiltered gray image
pub fn pdf_with_two_images(jpeg: Vec<u8>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let jpeg_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 8i64,
            "Height" => 8i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));
    let gray_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 2i64,
            "Height" => 1i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8i64,
        },
        vec![0, 255],
    ));

    let mut xobjects = Dictionary::new();
    xobjects.set("Im1", jpeg_id);
    xobjects.set("Im2", gray_id);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => dictionary! { "XObject" => xobjects },
        "MediaBox" => vec![0i64.into(), 0i64.into(), 100i64.into(), 100i64.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}
