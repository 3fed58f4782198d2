// metadata.rs - EXIF extraction from source images and re-attachment to JPEG output

use image::{ImageDecoder, ImageReader};
use std::io::Cursor;
use tracing::{debug, warn};

const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

/// Raw EXIF payload (TIFF header onwards) carried by a JPEG, PNG or WebP
/// source. Only the container headers are read, not the pixel data.
pub fn extract_exif(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_decoder()
        .ok()?;

    match decoder.exif_metadata() {
        Ok(exif) => exif.map(strip_exif_header).filter(|exif| !exif.is_empty()),
        Err(e) => {
            debug!(error = %e, "Could not read EXIF block");
            None
        }
    }
}

// Some writers keep the APP1 identifier in front of the TIFF header
fn strip_exif_header(mut exif: Vec<u8>) -> Vec<u8> {
    if exif.starts_with(EXIF_HEADER) {
        exif.drain(..EXIF_HEADER.len());
    }
    exif
}

/// Writes `exif` into an encoded JPEG as an APP1 segment, replacing any
/// existing one. Returns false when the JPEG is malformed or the payload
/// does not fit in a single segment.
pub fn embed_exif_jpeg(jpeg: &mut Vec<u8>, exif: &[u8]) -> bool {
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
        return false;
    }
    let segment_len = EXIF_HEADER.len() + exif.len() + 2;
    if segment_len > u16::MAX as usize {
        warn!(bytes = exif.len(), "EXIF payload too large for an APP1 segment, dropping it");
        return false;
    }

    remove_exif_segment(jpeg);

    // After any leading APPn segments (JFIF first)
    let mut insert_pos = 2;
    while insert_pos + 4 <= jpeg.len() && jpeg[insert_pos] == 0xFF {
        let marker = jpeg[insert_pos + 1];
        if !(0xE0..=0xEF).contains(&marker) {
            break;
        }
        let len = u16::from_be_bytes([jpeg[insert_pos + 2], jpeg[insert_pos + 3]]) as usize;
        if len < 2 {
            break;
        }
        insert_pos += 2 + len;
    }
    let insert_pos = insert_pos.min(jpeg.len());

    let mut segment = Vec::with_capacity(segment_len + 2);
    segment.extend_from_slice(&[0xFF, 0xE1]);
    segment.extend_from_slice(&(segment_len as u16).to_be_bytes());
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(exif);
    jpeg.splice(insert_pos..insert_pos, segment);
    true
}

fn remove_exif_segment(jpeg: &mut Vec<u8>) {
    let mut scan = 2;
    while scan + 4 <= jpeg.len() && jpeg[scan] == 0xFF {
        let marker = jpeg[scan + 1];
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            scan += 2;
            continue;
        }
        let len = u16::from_be_bytes([jpeg[scan + 2], jpeg[scan + 3]]) as usize;
        if len < 2 {
            break;
        }
        let end = (scan + 2 + len).min(jpeg.len());
        if marker == 0xE1 && jpeg[scan + 4..end].starts_with(EXIF_HEADER) {
            jpeg.drain(scan..end);
            return;
        }
        scan += 2 + len;
    }
}
