//! Signature raster decoding into PDF image XObjects

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, ObjectId, Stream};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
}

impl ColorSpace {
    fn pdf_name(&self) -> &'static str {
        match self {
            ColorSpace::Gray => "DeviceGray",
            ColorSpace::Rgb => "DeviceRGB",
        }
    }
}

/// 8-bit samples with an optional separate alpha plane
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub color: ColorSpace,
    pub samples: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

/// Decode a PNG, normalising palette, sub-byte and 16-bit images to 8 bits per sample.
///
/// A fully opaque alpha channel is dropped.
pub fn decode_png(bytes: &[u8]) -> Result<DecodedImage, String> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(|e| e.to_string())?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).map_err(|e| e.to_string())?;
    buf.truncate(frame.buffer_size());

    if frame.bit_depth != png::BitDepth::Eight {
        return Err(format!("unsupported bit depth {:?}", frame.bit_depth));
    }

    let (color, channels, has_alpha) = match frame.color_type {
        png::ColorType::Grayscale => (ColorSpace::Gray, 1, false),
        png::ColorType::GrayscaleAlpha => (ColorSpace::Gray, 2, true),
        png::ColorType::Rgb => (ColorSpace::Rgb, 3, false),
        png::ColorType::Rgba => (ColorSpace::Rgb, 4, true),
        other => return Err(format!("unsupported color type {:?}", other)),
    };

    let row = frame.width as usize * channels;
    let mut samples = Vec::with_capacity(frame.width as usize * frame.height as usize * channels);
    let mut alpha = Vec::new();
    for line in buf.chunks(frame.line_size).take(frame.height as usize) {
        let pixels = line.get(..row).ok_or("truncated image data")?;
        if has_alpha {
            for pixel in pixels.chunks_exact(channels) {
                let (color_part, a) = pixel.split_at(channels - 1);
                samples.extend_from_slice(color_part);
                alpha.push(a[0]);
            }
        } else {
            samples.extend_from_slice(pixels);
        }
    }

    let alpha = (has_alpha && alpha.iter().any(|&a| a != 255)).then_some(alpha);
    Ok(DecodedImage {
        width: frame.width,
        height: frame.height,
        color,
        samples,
        alpha,
    })
}

fn flate_compress(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(|e| e.to_string())?;
    encoder.finish().map_err(|e| e.to_string())
}

/// Add the image (and its soft mask) to `doc`, returning the image XObject id
pub fn add_image_xobject(doc: &mut Document, image: &DecodedImage) -> Result<ObjectId, String> {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => image.color.pdf_name(),
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if let Some(alpha) = &image.alpha {
        let smask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            flate_compress(alpha)?,
        );
        let smask_id = doc.add_object(smask);
        dict.set("SMask", smask_id);
    }

    let stream = Stream::new(dict, flate_compress(&image.samples)?);
    Ok(doc.add_object(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::encode_png;
    use lopdf::Object;

    #[test]
    fn test_rgba_splits_alpha() {
        let png = encode_png(2, 1, png::ColorType::Rgba, &[255, 0, 0, 128, 0, 0, 255, 255]);
        let image = decode_png(&png).unwrap();
        assert_eq!(image.color, ColorSpace::Rgb);
        assert_eq!(image.samples, vec![255, 0, 0, 0, 0, 255]);
        assert_eq!(image.alpha, Some(vec![128, 255]));
    }

    #[test]
    fn test_opaque_alpha_is_dropped() {
        let png = encode_png(1, 1, png::ColorType::GrayscaleAlpha, &[40, 255]);
        let image = decode_png(&png).unwrap();
        assert_eq!(image.color, ColorSpace::Gray);
        assert_eq!(image.samples, vec![40]);
        assert_eq!(image.alpha, None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_png(b"definitely not a png").is_err());
    }

    #[test]
    fn test_xobject_has_smask_only_with_alpha() {
        let mut doc = Document::with_version("1.7");
        let png = encode_png(1, 1, png::ColorType::Rgba, &[0, 0, 0, 0]);
        let id = add_image_xobject(&mut doc, &decode_png(&png).unwrap()).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(matches!(stream.dict.get(b"SMask"), Ok(Object::Reference(_))));
        assert_eq!(stream.decompressed_content().unwrap(), vec![0, 0, 0]);

        let png = encode_png(1, 1, png::ColorType::Rgb, &[1, 2, 3]);
        let id = add_image_xobject(&mut doc, &decode_png(&png).unwrap()).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"SMask").is_err());
    }
}
