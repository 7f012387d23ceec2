//! Capture backend reading the most recent decoded frame.
//!
//! If no frame has ever been delivered, or the slot holds an invalid
//! buffer, the backend degrades to a clearly labeled placeholder image
//! instead of failing, so the operator always gets a file to inspect.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, Rgba};
use std::io::Cursor;
use tracing::{debug, warn};

use crate::capture::{CaptureArtifact, CaptureBackend, CaptureRequest};
use crate::error::CaptureError;
use crate::naming::ImageFormat;
use crate::player::FrameStore;

/// Fixed size of the placeholder image.
const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 360;
/// Placeholder fill color.
const PLACEHOLDER_FILL: Rgba<u8> = Rgba([30, 30, 38, 255]);
/// Placeholder text color.
const PLACEHOLDER_INK: Rgba<u8> = Rgba([235, 235, 235, 255]);

/// Backend that encodes the rendering surface's most recent decoded frame.
pub struct BufferBackend {
    frames: FrameStore,
    jpeg_quality: u8,
}

impl BufferBackend {
    pub fn new(frames: FrameStore) -> Self {
        Self {
            frames,
            jpeg_quality: 90,
        }
    }

    /// Override the JPEG encode quality (1-100).
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    fn encode(
        &self,
        image: ImageBuffer<Rgba<u8>, Vec<u8>>,
        format: ImageFormat,
    ) -> Result<Vec<u8>, CaptureError> {
        let mut cursor = Cursor::new(Vec::new());
        match format {
            ImageFormat::Jpeg => {
                // The JPEG encoder takes no alpha channel.
                let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
                let encoder = JpegEncoder::new_with_quality(&mut cursor, self.jpeg_quality);
                rgb.write_with_encoder(encoder)?;
            }
            other => {
                DynamicImage::ImageRgba8(image).write_to(&mut cursor, other.to_image_format())?;
            }
        }
        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl CaptureBackend for BufferBackend {
    fn name(&self) -> &'static str {
        "buffer"
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureArtifact, CaptureError> {
        let image = match self
            .frames
            .snapshot()
            .filter(|frame| frame.is_valid())
            .and_then(|frame| {
                ImageBuffer::from_raw(frame.width, frame.height, frame.pixels)
            }) {
            Some(image) => {
                debug!(
                    "Capturing {}x{} frame from buffer at {}ms",
                    image.width(),
                    image.height(),
                    request.position_ms
                );
                image
            }
            None => {
                warn!(
                    "No valid decoded frame available, writing placeholder for {}ms",
                    request.position_ms
                );
                placeholder_image(request.position_ms)
            }
        };

        let (width, height) = (image.width(), image.height());
        let data = self.encode(image, request.format)?;
        Ok(CaptureArtifact::Encoded {
            data,
            width,
            height,
        })
    }
}

/// Render the diagnostic placeholder: solid fill with the requested
/// position overlaid in a builtin bitmap font.
fn placeholder_image(position_ms: u64) -> ImageBuffer<Rgba<u8>, Vec<u8>> {
    let mut image = ImageBuffer::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, PLACEHOLDER_FILL);
    let text = format!("NO FRAME @ {} MS", position_ms);
    draw_text(&mut image, &text, 24, 24, 4);
    draw_text(&mut image, "FRAME BUFFER UNAVAILABLE", 24, 72, 2);
    image
}

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// 5x7 bitmap glyphs for the handful of characters the placeholder needs.
/// Each row is a 5-bit mask, bit 4 leftmost.
fn glyph_rows(c: char) -> [u8; 7] {
    match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        '@' => [0b01110, 0b10001, 0b10111, 0b10101, 0b10111, 0b10000, 0b01110],
        _ => [0; 7],
    }
}

fn draw_text(image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>, text: &str, x: u32, y: u32, scale: u32) {
    let mut pen_x = x;
    for c in text.chars() {
        let rows = glyph_rows(c);
        for (row, mask) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if mask & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = pen_x + col * scale + dx;
                        let py = y + row as u32 * scale + dy;
                        if px < image.width() && py < image.height() {
                            image.put_pixel(px, py, PLACEHOLDER_INK);
                        }
                    }
                }
            }
        }
        pen_x += (GLYPH_WIDTH + 1) * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::FrameBuffer;
    use std::path::PathBuf;

    fn request(format: ImageFormat) -> CaptureRequest {
        CaptureRequest {
            position_ms: 12_345,
            prefix: "clip".to_string(),
            format,
            output_dir: PathBuf::from("/tmp"),
            video_path: PathBuf::from("/videos/clip.mp4"),
        }
    }

    fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> FrameBuffer {
        FrameBuffer {
            width,
            height,
            pixels: rgba
                .iter()
                .copied()
                .cycle()
                .take((width * height * 4) as usize)
                .collect(),
        }
    }

    #[tokio::test]
    async fn captures_current_frame_from_store() {
        let store = FrameStore::new();
        store.publish(solid_frame(64, 48, [200, 10, 10, 255]));
        let backend = BufferBackend::new(store);

        let artifact = backend.capture(&request(ImageFormat::Png)).await.unwrap();
        let CaptureArtifact::Encoded { data, width, height } = artifact else {
            panic!("buffer backend must return encoded bytes");
        };
        assert_eq!((width, height), (64, 48));

        let decoded = image::load_from_memory(&data).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(10, 10), &Rgba([200, 10, 10, 255]));
    }

    #[tokio::test]
    async fn empty_store_degrades_to_placeholder() {
        let backend = BufferBackend::new(FrameStore::new());

        let artifact = backend.capture(&request(ImageFormat::Png)).await.unwrap();
        let CaptureArtifact::Encoded { data, width, height } = artifact else {
            panic!("buffer backend must return encoded bytes");
        };
        assert_eq!((width, height), (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT));

        // The diagnostic text must be visible over the fill.
        let decoded = image::load_from_memory(&data).unwrap().to_rgba8();
        let inked = decoded.pixels().filter(|p| **p == PLACEHOLDER_INK).count();
        assert!(inked > 100, "expected overlay text pixels, found {}", inked);
    }

    #[tokio::test]
    async fn invalid_buffer_degrades_to_placeholder() {
        let store = FrameStore::new();
        store.publish(FrameBuffer {
            width: 64,
            height: 48,
            pixels: vec![0; 7],
        });
        let backend = BufferBackend::new(store);

        let artifact = backend.capture(&request(ImageFormat::Png)).await.unwrap();
        let CaptureArtifact::Encoded { width, height, .. } = artifact else {
            panic!("buffer backend must return encoded bytes");
        };
        assert_eq!((width, height), (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT));
    }

    #[tokio::test]
    async fn jpeg_encoding_drops_alpha() {
        let store = FrameStore::new();
        store.publish(solid_frame(32, 32, [0, 128, 255, 255]));
        let backend = BufferBackend::new(store);

        let artifact = backend.capture(&request(ImageFormat::Jpeg)).await.unwrap();
        let CaptureArtifact::Encoded { data, .. } = artifact else {
            panic!("buffer backend must return encoded bytes");
        };
        assert_eq!(
            image::guess_format(&data).unwrap(),
            image::ImageFormat::Jpeg
        );
    }
}
