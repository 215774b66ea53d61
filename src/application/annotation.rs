use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};

use crate::domain::{
    detection::Detection,
    errors::{DomainError, DomainResult},
};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_BG: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const GLYPH_ADVANCE: i32 = 6;
const GLYPH_HEIGHT: i32 = 7;

/// Dibuja cajas y etiquetas `"<clase> <conf>"` sobre el frame.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    for det in detections {
        let b = det.bbox;
        for t in 0..BOX_THICKNESS {
            draw_rectangle(image, b.x1 + t, b.y1 + t, b.x2 - t, b.y2 - t, BOX_COLOR);
        }
    }
    for det in detections {
        let text = det.label();
        let x = det.bbox.x1;
        // Encima de la caja; si no cabe, pegada al borde superior.
        let y = (det.bbox.y1 - 10).max(0);
        let width = text.chars().count() as i32 * GLYPH_ADVANCE;
        fill_rect(image, x - 1, y - 1, x + width, y + GLYPH_HEIGHT, LABEL_BG);
        draw_label(image, x, y, &text, BOX_COLOR);
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> DomainResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| DomainError::OperationFailed(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if right < left || bottom < top || right < 0 || bottom < 0 || left >= w || top >= h {
        return;
    }
    let (l, r) = (left.clamp(0, w - 1), right.clamp(0, w - 1));
    let (t, b) = (top.clamp(0, h - 1), bottom.clamp(0, h - 1));

    for x in l..=r {
        if top >= 0 {
            image.put_pixel(x as u32, t as u32, color);
        }
        if bottom < h {
            image.put_pixel(x as u32, b as u32, color);
        }
    }
    for y in t..=b {
        if left >= 0 {
            image.put_pixel(l as u32, y as u32, color);
        }
        if right < w {
            image.put_pixel(r as u32, y as u32, color);
        }
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    for y in top.max(0)..=bottom.min(h - 1) {
        for x in left.max(0)..=right.min(w - 1) {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= h {
                    continue;
                }
                for col in 0..5 {
                    let px = x + col;
                    if (pattern >> (4 - col)) & 1 == 1 && px >= 0 && px < w {
                        image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let g = match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x1E, 0x10, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x1E, 0x10, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x0E, 0x01, 0x01, 0x11, 0x0E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1E, 0x01, 0x01, 0x0E, 0x01, 0x01, 0x1E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0, 0, 0, 0, 0, 0x0C, 0x0C],
        '-' => [0, 0, 0, 0x1F, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0x1F],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::BoundingBox;

    fn det(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection { class: "fox".into(), confidence: 0.91, bbox: BoundingBox { x1, y1, x2, y2 } }
    }

    #[test]
    fn box_edges_are_painted() {
        let mut img = RgbImage::new(100, 100);
        draw_detections(&mut img, &[det(20, 30, 60, 80)]);
        assert_eq!(*img.get_pixel(40, 80), BOX_COLOR);
        assert_eq!(*img.get_pixel(20, 50), BOX_COLOR);
        assert_eq!(*img.get_pixel(21, 50), BOX_COLOR);
        assert_eq!(*img.get_pixel(40, 55), Rgb([0, 0, 0]));
    }

    #[test]
    fn out_of_frame_boxes_do_not_panic() {
        let mut img = RgbImage::new(32, 32);
        draw_detections(&mut img, &[det(-50, -50, 500, 500), det(100, 100, 200, 200), det(10, 10, 5, 5)]);
        draw_detections(&mut RgbImage::new(0, 0), &[det(0, 0, 1, 1)]);
    }

    #[test]
    fn encodes_valid_jpeg() {
        let jpeg = encode_jpeg(&RgbImage::new(16, 16), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
