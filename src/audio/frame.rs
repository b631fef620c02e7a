/// One slice of raw audio exactly as the transport or synthesizer delivered it
///
/// No framing is implied beyond the byte boundaries of the payload. Frames
/// are moved into the queue that receives them and never shared afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for AudioFrame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Interpret bytes as little-endian signed 16-bit PCM
///
/// Returns the decoded samples and whether a trailing odd byte was dropped.
pub fn pcm16_le_samples(bytes: &[u8]) -> (Vec<i16>, bool) {
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    (samples, bytes.len() % 2 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_decoding() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80];
        let (samples, truncated) = pcm16_le_samples(&bytes);
        assert_eq!(samples, vec![1, -1, i16::MIN]);
        assert!(!truncated);
    }

    #[test]
    fn test_pcm16_odd_length_drops_tail() {
        let (samples, truncated) = pcm16_le_samples(&[0x10, 0x00, 0x7f]);
        assert_eq!(samples, vec![16]);
        assert!(truncated);
    }
}
