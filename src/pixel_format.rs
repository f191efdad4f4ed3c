//! Hardware channel order applied to RGB frames before they go on the wire.

use std::str::FromStr;

use anyhow::{bail, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelOrder {
    #[default]
    Rgb,
    Grb,
    Bgr,
    /// RGB plus a white channel extracted from the common component
    Rgbw,
    Grbw,
}

impl PixelOrder {
    /// Output bytes per pixel
    pub fn stride(self) -> usize {
        match self {
            PixelOrder::Rgbw | PixelOrder::Grbw => 4,
            _ => 3,
        }
    }

    /// Reorder an RGB frame (3 bytes per pixel) for the hardware
    pub fn apply(self, rgb: Vec<u8>) -> Vec<u8> {
        match self {
            PixelOrder::Rgb => rgb,
            PixelOrder::Grb => swap_channels(rgb, 0, 1),
            PixelOrder::Bgr => swap_channels(rgb, 0, 2),
            PixelOrder::Rgbw => extract_white(&rgb, |r, g, b, w| [r, g, b, w]),
            PixelOrder::Grbw => extract_white(&rgb, |r, g, b, w| [g, r, b, w]),
        }
    }
}

impl FromStr for PixelOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RGB" => Ok(PixelOrder::Rgb),
            "GRB" => Ok(PixelOrder::Grb),
            "BGR" => Ok(PixelOrder::Bgr),
            "RGBW" => Ok(PixelOrder::Rgbw),
            "GRBW" => Ok(PixelOrder::Grbw),
            other => bail!("Unknown pixel format: {}", other),
        }
    }
}

fn swap_channels(mut data: Vec<u8>, a: usize, b: usize) -> Vec<u8> {
    for pixel in data.chunks_exact_mut(3) {
        pixel.swap(a, b);
    }
    data
}

/// White is the minimum of the three channels, subtracted from each
fn extract_white(data: &[u8], arrange: impl Fn(u8, u8, u8, u8) -> [u8; 4]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() / 3 * 4);

    for pixel in data.chunks_exact(3) {
        let (r, g, b) = (pixel[0], pixel[1], pixel[2]);
        let w = r.min(g).min(b);
        result.extend_from_slice(&arrange(r - w, g - w, b - w, w));
    }

    result
}
