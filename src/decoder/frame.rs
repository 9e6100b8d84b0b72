/// Bytes per pixel of a display-ready canvas (packed RGB24).
pub const BYTES_PER_PIXEL: usize = 3;

/// One decoded, display-ready frame: packed RGB24 plus its dimensions.
///
/// A frame is exclusively owned by whichever side currently holds it.
/// Ownership moves through the frame queue; the decode and render threads
/// never touch the same buffer at the same time.
#[derive(Clone, Debug)]
pub struct FrameData {
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl FrameData {
    /// # Panics
    ///
    /// Panics if `buffer` is not exactly `width * height * 3` bytes.
    pub fn new(buffer: Vec<u8>, width: u32, height: u32) -> Self {
        assert_eq!(
            buffer.len(),
            Self::expected_len(width, height),
            "RGB24 buffer length mismatch for {width}x{height}"
        );
        Self {
            buffer,
            width,
            height,
        }
    }

    /// Byte length of a packed RGB24 canvas of the given size.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_length_matches_dimensions() {
        let frame = FrameData::new(vec![0; 2 * 3 * 3], 2, 3);
        assert_eq!(frame.buffer.len(), FrameData::expected_len(2, 3));
        assert_eq!(frame.width, 2);
        assert_eq!(frame.height, 3);
    }

    #[test]
    #[should_panic(expected = "RGB24 buffer length mismatch")]
    fn short_buffer_is_rejected() {
        let _ = FrameData::new(vec![0; 5], 2, 3);
    }
}
