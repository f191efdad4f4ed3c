//! Serial framing for LED controller firmware.

use std::str::FromStr;

use anyhow::{bail, Error};

mod adalight;
mod awa;

pub use adalight::build_adalight_frame;
pub use awa::build_awa_frame;

/// Longest strand a frame header can describe (AWA sends count - 1 in 16 bits)
pub const MAX_LEDS: usize = u16::MAX as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProtocol {
    /// HyperSerial AWA framing with Fletcher checksums
    Awa,
    Adalight,
}

impl FrameProtocol {
    /// Largest LED count this protocol's header can carry
    pub fn max_leds(self) -> usize {
        match self {
            FrameProtocol::Awa => MAX_LEDS,
            FrameProtocol::Adalight => u16::MAX as usize,
        }
    }

    /// Wrap already-ordered pixel bytes in this protocol's frame
    pub fn frame(self, pixel_data: &[u8], stride: usize) -> Vec<u8> {
        match self {
            FrameProtocol::Awa => build_awa_frame(pixel_data, stride),
            FrameProtocol::Adalight => build_adalight_frame(pixel_data, stride),
        }
    }
}

impl FromStr for FrameProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "awa" => Ok(FrameProtocol::Awa),
            "adalight" => Ok(FrameProtocol::Adalight),
            other => bail!("Unknown protocol: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_protocol() {
        assert_eq!("awa".parse::<FrameProtocol>().unwrap(), FrameProtocol::Awa);
        assert_eq!("Adalight".parse::<FrameProtocol>().unwrap(), FrameProtocol::Adalight);
        assert!("tpm2".parse::<FrameProtocol>().is_err());
    }

    #[test]
    fn test_max_leds() {
        assert_eq!(FrameProtocol::Awa.max_leds(), 65_536);
        assert_eq!(FrameProtocol::Adalight.max_leds(), 65_535);
    }

    #[test]
    fn test_frame_dispatch() {
        let pixels = [1, 2, 3];
        assert_eq!(&FrameProtocol::Awa.frame(&pixels, 3)[..3], b"Awa");
        assert_eq!(&FrameProtocol::Adalight.frame(&pixels, 3)[..3], b"Ada");
    }
}
