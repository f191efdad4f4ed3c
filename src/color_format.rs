//! Channel/bit-width color format, e.g. `R8G8B8` or `R5G6B5`.

use std::fmt;
use std::str::FromStr;

use crate::codec::decode_int;
use crate::error::FormatError;

const MAX_CHANNEL_BITS: u32 = 16;
const MAX_TOTAL_BITS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
    White,
}

impl Channel {
    fn from_letter(ch: char) -> Option<Self> {
        match ch.to_ascii_lowercase() {
            'r' => Some(Channel::Red),
            'g' => Some(Channel::Green),
            'b' => Some(Channel::Blue),
            'w' => Some(Channel::White),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Channel::Red => 'R',
            Channel::Green => 'G',
            Channel::Blue => 'B',
            Channel::White => 'W',
        }
    }
}

/// Ordered channel -> bit width mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorFormat {
    channels: Vec<(Channel, u32)>,
    bytes_per_color: usize,
}

impl ColorFormat {
    /// Parse a spec string (case-insensitive, `(letter digit+)+`)
    pub fn parse(spec: &str) -> Result<Self, FormatError> {
        if spec.is_empty() {
            return Err(FormatError::Empty);
        }

        // (channel, digit run)
        let mut entries: Vec<(Channel, String)> = Vec::new();

        for (position, ch) in spec.chars().enumerate() {
            if let Some(channel) = Channel::from_letter(ch) {
                if entries.iter().any(|(c, _)| *c == channel) {
                    return Err(FormatError::DuplicateChannel { channel: channel.letter() });
                }
                entries.push((channel, String::new()));
            } else if ch.is_ascii_digit() {
                match entries.last_mut() {
                    Some((_, digits)) => digits.push(ch),
                    None => return Err(FormatError::MissingChannel { position }),
                }
            } else {
                return Err(FormatError::InvalidCharacter { ch, position });
            }
        }

        let mut channels = Vec::with_capacity(entries.len());
        for (channel, digits) in entries {
            if digits.is_empty() {
                return Err(FormatError::MissingBits { channel: channel.letter() });
            }
            let bits = digits
                .parse::<u32>()
                .ok()
                .filter(|bits| (1..=MAX_CHANNEL_BITS).contains(bits))
                .ok_or_else(|| FormatError::InvalidBitWidth {
                    channel: channel.letter(),
                    bits: digits.clone(),
                })?;
            channels.push((channel, bits));
        }

        let total_bits: u32 = channels.iter().map(|(_, bits)| bits).sum();
        if total_bits > MAX_TOTAL_BITS {
            return Err(FormatError::TooWide(total_bits));
        }

        Ok(ColorFormat {
            channels,
            bytes_per_color: total_bits.div_ceil(8) as usize,
        })
    }

    #[allow(dead_code)]
    pub fn channels(&self) -> &[(Channel, u32)] {
        &self.channels
    }

    pub fn bytes_per_color(&self) -> usize {
        self.bytes_per_color
    }

    /// Per-channel bit widths in declaration order (Resolution characteristic)
    pub fn resolution(&self) -> Vec<u8> {
        self.channels.iter().map(|&(_, bits)| bits as u8).collect()
    }

    /// Split a packed color into raw channel values.
    ///
    /// The first declared channel holds the least-significant bits.
    pub fn unpack(&self, color: &[u8]) -> Vec<(Channel, u32)> {
        let packed = decode_int(color, false) as u128;
        let mut shift = 0;

        self.channels
            .iter()
            .map(|&(channel, bits)| {
                let mask = (1u128 << bits) - 1;
                let value = (packed >> shift) & mask;
                shift += bits;
                (channel, value as u32)
            })
            .collect()
    }

    /// Convert a packed color into 8-bit RGB, folding white into each channel
    pub fn to_rgb8(&self, color: &[u8]) -> [u8; 3] {
        let mut rgb = [0u8; 3];
        let mut white = 0u8;

        for ((channel, value), &(_, bits)) in self.unpack(color).into_iter().zip(&self.channels) {
            let max = (1u32 << bits) - 1;
            let scaled = ((value * 255 + max / 2) / max) as u8;
            match channel {
                Channel::Red => rgb[0] = scaled,
                Channel::Green => rgb[1] = scaled,
                Channel::Blue => rgb[2] = scaled,
                Channel::White => white = scaled,
            }
        }

        rgb.map(|c| c.saturating_add(white))
    }
}

impl fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (channel, bits) in &self.channels {
            write!(f, "{}{}", channel.letter(), bits)?;
        }
        Ok(())
    }
}

impl FromStr for ColorFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorFormat::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rgb888() {
        let format = ColorFormat::parse("R8G8B8").unwrap();
        assert_eq!(
            format.channels(),
            &[(Channel::Red, 8), (Channel::Green, 8), (Channel::Blue, 8)]
        );
        assert_eq!(format.bytes_per_color(), 3);
    }

    #[test]
    fn test_parse_preserves_order_and_case() {
        let format = ColorFormat::parse("g8r8b8w8").unwrap();
        assert_eq!(
            format.channels(),
            &[(Channel::Green, 8), (Channel::Red, 8), (Channel::Blue, 8), (Channel::White, 8)]
        );
        assert_eq!(format.bytes_per_color(), 4);
        assert_eq!(format.to_string(), "G8R8B8W8");
    }

    #[test]
    fn test_bytes_per_color_rounds_up() {
        assert_eq!(ColorFormat::parse("R5G6B5").unwrap().bytes_per_color(), 2);
        assert_eq!(ColorFormat::parse("R1").unwrap().bytes_per_color(), 1);
        assert_eq!(ColorFormat::parse("R3G3B3").unwrap().bytes_per_color(), 2);
        assert_eq!(ColorFormat::parse("R012").unwrap().bytes_per_color(), 2);
    }

    #[test]
    fn test_parse_rejects_malformed_specs() {
        assert_eq!(ColorFormat::parse(""), Err(FormatError::Empty));
        assert_eq!(
            ColorFormat::parse("R8X8"),
            Err(FormatError::InvalidCharacter { ch: 'X', position: 2 })
        );
        assert_eq!(
            ColorFormat::parse("R8 G8"),
            Err(FormatError::InvalidCharacter { ch: ' ', position: 2 })
        );
        assert_eq!(ColorFormat::parse("8R8"), Err(FormatError::MissingChannel { position: 0 }));
        assert_eq!(ColorFormat::parse("R8G"), Err(FormatError::MissingBits { channel: 'G' }));
        assert_eq!(ColorFormat::parse("RG8"), Err(FormatError::MissingBits { channel: 'R' }));
        assert_eq!(
            ColorFormat::parse("R8r8"),
            Err(FormatError::DuplicateChannel { channel: 'R' })
        );
        assert!(matches!(ColorFormat::parse("R0"), Err(FormatError::InvalidBitWidth { .. })));
        assert!(matches!(ColorFormat::parse("R17"), Err(FormatError::InvalidBitWidth { .. })));
        assert!(matches!(
            ColorFormat::parse("R99999999999"),
            Err(FormatError::InvalidBitWidth { .. })
        ));
        assert_eq!(ColorFormat::parse("R16G16B16W16").unwrap().bytes_per_color(), 8);
    }

    #[test]
    fn test_rendering_reparses_to_same_format() {
        for spec in ["R8G8B8", "r5g6b5", "W8", "B4G4R4W4", "r08g8"] {
            let format = ColorFormat::parse(spec).unwrap();
            let reparsed: ColorFormat = format.to_string().parse().unwrap();
            assert_eq!(reparsed, format);
            assert_eq!(reparsed.to_string(), format.to_string());
        }
    }

    #[test]
    fn test_resolution() {
        assert_eq!(ColorFormat::parse("R5G6B5").unwrap().resolution(), vec![5, 6, 5]);
    }

    #[test]
    fn test_unpack_first_channel_in_low_bits() {
        let format = ColorFormat::parse("R8G8B8").unwrap();
        assert_eq!(
            format.unpack(&[10, 20, 30]),
            vec![(Channel::Red, 10), (Channel::Green, 20), (Channel::Blue, 30)]
        );

        // R5G6B5: r=31, g=0, b=31 -> 0b11111_000000_11111
        let format = ColorFormat::parse("R5G6B5").unwrap();
        let packed: u16 = 31 | (31 << 11);
        assert_eq!(
            format.unpack(&packed.to_le_bytes()),
            vec![(Channel::Red, 31), (Channel::Green, 0), (Channel::Blue, 31)]
        );
    }

    #[test]
    fn test_to_rgb8_scales_and_folds_white() {
        let format = ColorFormat::parse("R8G8B8").unwrap();
        assert_eq!(format.to_rgb8(&[10, 20, 30]), [10, 20, 30]);

        let format = ColorFormat::parse("R5G6B5").unwrap();
        let packed: u16 = 31 | (63 << 5);
        assert_eq!(format.to_rgb8(&packed.to_le_bytes()), [255, 255, 0]);

        let format = ColorFormat::parse("R8G8B8W8").unwrap();
        assert_eq!(format.to_rgb8(&[100, 0, 200, 100]), [200, 100, 255]);
    }
}
