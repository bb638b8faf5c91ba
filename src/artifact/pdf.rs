//! PDF output: one page per image, page size equal to the image's pixel size.
//!
//! RGB and grayscale JPEGs are embedded untouched (DCTDecode); everything else is re-encoded to an
//! RGB JPEG first.

use super::{ArtifactError, PageInfo};
use crate::model::{PageImage, Volume};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const JPEG_QUALITY: u8 = 90;
const IMAGE_NAME: &[u8] = b"Im0";

struct EmbeddedImage {
    data: Vec<u8>,
    color_space: &'static str,
}

pub(super) fn write(path: &Path, volume: &Volume, infos: &[PageInfo]) -> Result<(), ArtifactError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(infos.len());

    for ((chapter, page), info) in volume.pages().zip(infos) {
        let embedded = embed(page, info).map_err(|reason| ArtifactError::Conversion {
            volume: volume.name.clone(),
            chapter: chapter.chapter.ordinal,
            page: page.number,
            reason,
        })?;
        let width = i64::from(info.width);
        let height = i64::from(info.height);

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => embedded.color_space,
                "BitsPerComponent" => 8i64,
                "Filter" => "DCTDecode",
            },
            embedded.data,
        ));
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(height),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(volume.name.as_str()),
        "Producer" => Object::string_literal("mangascrape"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let file = File::create(path).map_err(|e| ArtifactError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut out = BufWriter::new(file);
    doc.save_to(&mut out)
        .map_err(|e| ArtifactError::Pdf(e.into()))?;
    out.flush().map_err(|e| ArtifactError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn embed(page: &PageImage, info: &PageInfo) -> Result<EmbeddedImage, String> {
    if info.format == ImageFormat::Jpeg {
        match jpeg_components(&page.bytes) {
            Some(3) => {
                return Ok(EmbeddedImage {
                    data: page.bytes.clone(),
                    color_space: "DeviceRGB",
                })
            }
            Some(1) => {
                return Ok(EmbeddedImage {
                    data: page.bytes.clone(),
                    color_space: "DeviceGray",
                })
            }
            _ => {}
        }
    }
    let decoded = image::load_from_memory_with_format(&page.bytes, info.format)
        .map_err(|e| e.to_string())?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut data = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY);
    rgb.write_with_encoder(encoder).map_err(|e| e.to_string())?;
    Ok(EmbeddedImage {
        data,
        color_space: "DeviceRGB",
    })
}

/// Component count from the JPEG frame header (SOFn), if the data is a readable JPEG.
fn jpeg_components(data: &[u8]) -> Option<u8> {
    if data.get(0..2)? != [0xFF, 0xD8] {
        return None;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        // SOF0..SOF15, except DHT (C4), JPG (C8) and DAC (CC)
        if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            return data.get(i + 9).copied();
        }
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        i += 2 + len;
    }
    None
}
