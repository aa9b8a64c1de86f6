//! Side-by-side rendering of the two canonical face crops.
//!
//! Optional visual aid for operators; the registration decision never
//! depends on it.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::matcher::FaceMatch;

const PANEL_SIZE: u32 = 250;
const BORDER: u32 = 6;
const MATCH_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const MISMATCH_COLOR: Rgb<u8> = Rgb([220, 0, 0]);

/// ID face on the left, selfie on the right, framed green on a match and
/// red otherwise.
pub fn comparison_image(face: &FaceMatch) -> RgbImage {
    let color = if face.decision.verified { MATCH_COLOR } else { MISMATCH_COLOR };
    let width = PANEL_SIZE * 2 + BORDER * 3;
    let mut canvas = RgbImage::from_pixel(width, PANEL_SIZE + BORDER * 2, color);

    for (slot, crop) in [&face.id_face, &face.selfie_face].into_iter().enumerate() {
        let panel = imageops::resize(crop.pixels(), PANEL_SIZE, PANEL_SIZE, FilterType::Triangle);
        let x = BORDER + slot as u32 * (PANEL_SIZE + BORDER);
        imageops::replace(&mut canvas, &panel, x as i64, BORDER as i64);
    }

    canvas
}

pub fn save_comparison(face: &FaceMatch, path: &Path) -> Result<(), image::ImageError> {
    comparison_image(face).save(path)?;
    tracing::info!(path = %path.display(), "comparison image written");
    Ok(())
}
