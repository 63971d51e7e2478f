use super::fixtures::{png, png_base64};
use super::*;

fn gif(width: u16, height: u16) -> Vec<u8> {
    let mut bytes = b"GIF89a".to_vec();
    bytes.extend_from_slice(&width.to_le_bytes());
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0]);
    bytes
}

fn jpeg(width: u16, height: u16) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    // APP0 segment with a 16-byte body (length includes itself).
    bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    bytes.extend_from_slice(b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
    // SOF0: length, precision, height, width, components.
    bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&[0x03; 10]);
    bytes
}

fn webp_vp8x(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"RIFF\0\0\0\0WEBPVP8X".to_vec();
    bytes.extend_from_slice(&[10, 0, 0, 0, 0, 0, 0, 0]);
    bytes.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
    bytes.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
    bytes
}

#[test]
fn strip_data_url_keeps_payload() {
    assert_eq!(strip_data_url("data:image/png;base64,QUJD"), "QUJD");
    assert_eq!(strip_data_url("QUJD"), "QUJD");
}

#[test]
fn decode_handles_data_url_and_whitespace() {
    assert_eq!(decode_payload("data:image/png;base64,QU\nJD").unwrap(), b"ABC");
}

#[test]
fn decode_rejects_garbage() {
    assert!(matches!(decode_payload("%%%not-base64"), Err(ImageError::InvalidBase64(_))));
    assert!(matches!(decode_payload("data:image/png;base64,"), Err(ImageError::InvalidBase64(_))));
}

#[test]
fn hash_is_sha256_hex() {
    assert_eq!(image_hash(b"abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
}

#[test]
fn sniffs_each_supported_format() {
    assert_eq!(sniff_format(&png(1, 1)), Some(ImageFormat::Png));
    assert_eq!(sniff_format(&jpeg(1, 1)), Some(ImageFormat::Jpeg));
    assert_eq!(sniff_format(&gif(1, 1)), Some(ImageFormat::Gif));
    assert_eq!(sniff_format(&webp_vp8x(1, 1)), Some(ImageFormat::Webp));
    assert_eq!(sniff_format(b"BM\0\0"), None);
}

#[test]
fn reads_dimensions_from_headers() {
    let info = inspect(&png(720, 1600)).unwrap();
    assert_eq!((info.width, info.height), (720, 1600));
    let info = inspect(&jpeg(1080, 2340)).unwrap();
    assert_eq!((info.width, info.height), (1080, 2340));
    let info = inspect(&gif(300, 400)).unwrap();
    assert_eq!((info.width, info.height), (300, 400));
    let info = inspect(&webp_vp8x(640, 1280)).unwrap();
    assert_eq!((info.width, info.height), (640, 1280));
}

#[test]
fn validate_accepts_phone_screenshot() {
    let info = validate(&png(1080, 2400)).unwrap();
    assert_eq!(info.format, ImageFormat::Png);
    assert_eq!(info.format.mime_type(), "image/png");
}

#[test]
fn validate_rejects_tiny_image() {
    let err = validate(&png(50, 400)).unwrap_err();
    assert_eq!(err, ImageError::TooSmall { width: 50, height: 400 });
    assert!(err.to_string().contains("50x400"));
}

#[test]
fn validate_rejects_huge_dimensions() {
    assert_eq!(validate(&png(5000, 1000)).unwrap_err(), ImageError::TooLarge { width: 5000, height: 1000 });
}

#[test]
fn validate_rejects_oversized_file() {
    let mut bytes = png(1000, 1000);
    bytes.resize(MAX_FILE_BYTES + 1, 0);
    let err = validate(&bytes).unwrap_err();
    assert!(matches!(err, ImageError::FileTooLarge { .. }));
    assert!(err.to_string().contains("max 10MB"));
}

#[test]
fn validate_rejects_unknown_format() {
    assert_eq!(validate(b"%PDF-1.7 not an image").unwrap_err(), ImageError::UnsupportedFormat);
}

#[test]
fn wide_aspect_ratio_only_warns() {
    assert!(validate(&png(4000, 200)).is_ok());
}

#[test]
fn truncated_png_has_unreadable_dimensions() {
    let bytes = &png(500, 500)[..14];
    assert_eq!(inspect(bytes).unwrap_err(), ImageError::UnreadableDimensions(ImageFormat::Png));
}

#[test]
fn fixture_round_trips_through_decode() {
    let bytes = decode_payload(&png_base64(200, 300)).unwrap();
    assert_eq!(inspect(&bytes).unwrap().height, 300);
}
