//! Capture fixtures shared by unit tests

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// Baseline JPEG with a deterministic gradient and no metadata
pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let pixels = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });

    let mut data = Vec::new();
    pixels
        .write_with_encoder(JpegEncoder::new_with_quality(&mut data, 95))
        .expect("encode fixture jpeg");
    data
}

/// Insert an APP1 EXIF segment carrying `Make` and `Orientation` right after SOI
pub fn with_exif(jpeg: &[u8], make: &str, orientation: u16) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "fixture must start with SOI");

    let tiff = tiff_block(make, orientation);
    let segment_len = (2 + 6 + tiff.len()) as u16;

    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Little-endian TIFF header with one IFD: Make (0x010F) and Orientation (0x0112)
fn tiff_block(make: &str, orientation: u16) -> Vec<u8> {
    let mut make_bytes = make.as_bytes().to_vec();
    make_bytes.push(0);

    const IFD_OFFSET: u32 = 8;
    const ENTRY_COUNT: u16 = 2;
    let data_offset = IFD_OFFSET + 2 + ENTRY_COUNT as u32 * 12 + 4;

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&IFD_OFFSET.to_le_bytes());

    tiff.extend_from_slice(&ENTRY_COUNT.to_le_bytes());

    // Make, ASCII
    tiff.extend_from_slice(&0x010Fu16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&(make_bytes.len() as u32).to_le_bytes());
    if make_bytes.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..make_bytes.len()].copy_from_slice(&make_bytes);
        tiff.extend_from_slice(&inline);
    } else {
        tiff.extend_from_slice(&data_offset.to_le_bytes());
    }

    // Orientation, SHORT
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&orientation.to_le_bytes());
    tiff.extend_from_slice(&[0, 0]);

    // no next IFD
    tiff.extend_from_slice(&0u32.to_le_bytes());

    if make_bytes.len() > 4 {
        tiff.extend_from_slice(&make_bytes);
    }
    tiff
}
