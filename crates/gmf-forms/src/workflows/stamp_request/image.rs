use std::io::Write as _;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported signature image format '{extension}'; expected .png, .jpg, or .jpeg")]
    UnsupportedFormat { extension: String },
    #[error("could not read signature image: {0}")]
    Read(#[from] std::io::Error),
    #[error("could not decode signature image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("signature image has zero dimensions")]
    EmptyImage,
}

/// An image copied into the document's object graph, ready to be drawn.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedImage {
    pub xobject: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Decode a signature file into an image XObject inside `doc`. The decode
/// path is chosen strictly by extension, case-insensitively; anything but
/// PNG/JPEG is rejected before the file is even opened.
pub(crate) fn embed_from_path(doc: &mut Document, path: &Path) -> Result<EmbeddedImage, ImageError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let format = match extension.as_str() {
        "png" => image::ImageFormat::Png,
        "jpg" | "jpeg" => image::ImageFormat::Jpeg,
        _ => {
            return Err(ImageError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{extension}")
                },
            })
        }
    };

    let file = std::fs::File::open(path)?;
    let rgba = image::load(std::io::BufReader::new(file), format)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::EmptyImage);
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let mut xobject = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    // JPEG signatures are fully opaque; only wire a soft mask when the
    // raster actually carries transparency.
    if alpha.iter().any(|&a| a < u8::MAX) {
        let smask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        ));
        xobject.set("SMask", Object::Reference(smask_id));
    }

    let xobject_id = doc.add_object(Stream::new(xobject, deflate(&rgb)?));

    Ok(EmbeddedImage {
        xobject: xobject_id,
        width,
        height,
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
