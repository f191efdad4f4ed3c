/// Build an Adalight frame: `Ada`, LED count (big-endian), checksum, pixels
pub fn build_adalight_frame(pixel_data: &[u8], stride: usize) -> Vec<u8> {
    let led_count = (pixel_data.len() / stride) as u16;
    let [count_hi, count_lo] = led_count.to_be_bytes();

    let mut frame = Vec::with_capacity(6 + pixel_data.len());
    frame.extend_from_slice(b"Ada");
    frame.extend_from_slice(&[count_hi, count_lo, count_hi ^ count_lo ^ 0x55]);
    frame.extend_from_slice(pixel_data);

    frame
}
