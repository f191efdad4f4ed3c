/// Build an AWA frame (HyperSerialPico): `Awa`, LED count - 1, CRC, pixels,
/// then three Fletcher checksum bytes
pub fn build_awa_frame(pixel_data: &[u8], stride: usize) -> Vec<u8> {
    let last_led = (pixel_data.len() / stride).saturating_sub(1) as u16;
    let [count_hi, count_lo] = last_led.to_be_bytes();

    let mut frame = Vec::with_capacity(6 + pixel_data.len() + 3);
    frame.extend_from_slice(b"Awa");
    frame.extend_from_slice(&[count_hi, count_lo, count_hi ^ count_lo ^ 0x55]);
    frame.extend_from_slice(pixel_data);
    frame.extend_from_slice(&fletcher(pixel_data));

    frame
}

/// Fletcher checksums as HyperSerialPico computes them
fn fletcher(pixel_data: &[u8]) -> [u8; 3] {
    let mut fletcher1: u16 = 0;
    let mut fletcher2: u16 = 0;
    let mut fletcher_ext: u16 = 0;

    for (position, &byte) in pixel_data.iter().enumerate() {
        fletcher1 = (fletcher1 + byte as u16) % 255;
        fletcher2 = (fletcher2 + fletcher1) % 255;
        fletcher_ext = (fletcher_ext + ((byte as u16) ^ (position as u16))) % 255;
    }

    // 'A' would look like the start of a new frame
    if fletcher_ext == 0x41 {
        fletcher_ext = 0xaa;
    }

    [fletcher1 as u8, fletcher2 as u8, fletcher_ext as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_awa_header_counts_from_zero() {
        let frame = build_awa_frame(&[10, 20, 30, 40, 50, 60], 3);
        assert_eq!(&frame[..6], &[b'A', b'w', b'a', 0x00, 0x01, 0x01 ^ 0x55]);
        assert_eq!(&frame[6..12], &[10, 20, 30, 40, 50, 60]);
        assert_eq!(frame.len(), 6 + 6 + 3);
    }

    #[test]
    fn test_fletcher_checksums() {
        // ext: 10^0 = 10, + 20^1 = 31, + 30^2 = 59
        assert_eq!(fletcher(&[10, 20, 30]), [60, 100, 59]);
    }

    #[test]
    fn test_empty_strand() {
        let frame = build_awa_frame(&[], 3);
        assert_eq!(frame.len(), 9);
    }
}
