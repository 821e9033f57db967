/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use super::AudioDecoder;
use crate::{JitterError, Result};

/// Uncompressed 16-bit linear PCM in network byte order (RTP "L16").
///
/// Useful for links that carry raw audio and as a deterministic codec in
/// tests. Samples beyond the frame capacity are ignored.
///
/// A payload with an odd byte count is treated as corrupt: `decode` returns
/// [`JitterError::DecoderError`] and none of its samples are used, so the
/// jitter buffer counts a decoder error for that packet.
#[derive(Debug, Clone)]
pub struct Pcm16Decoder {
    sample_rate: u32,
    channels: u8,
}

impl Pcm16Decoder {
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self> {
        if sample_rate == 0 {
            return Err(JitterError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(JitterError::InvalidChannelCount(channels));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Encode float samples into an L16 payload
    pub fn encode(samples: &[f32]) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|s| {
                let value = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                value.to_be_bytes()
            })
            .collect()
    }
}

impl AudioDecoder for Pcm16Decoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn decode(&mut self, payload: &[u8], frame: &mut [f32]) -> Result<usize> {
        if payload.len() % 2 != 0 {
            return Err(JitterError::DecoderError(format!(
                "L16 payload has odd length {}",
                payload.len()
            )));
        }

        let mut written = 0;
        for (dst, bytes) in frame.iter_mut().zip(payload.chunks_exact(2)) {
            *dst = i16::from_be_bytes([bytes[0], bytes[1]]) as f32 / i16::MAX as f32;
            written += 1;
        }

        if written < payload.len() / 2 {
            log::trace!(
                "L16 payload truncated: {} samples, frame holds {}",
                payload.len() / 2,
                frame.len()
            );
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let mut decoder = Pcm16Decoder::new(8000, 1).unwrap();
        let payload = Pcm16Decoder::encode(&[0.0, 0.5, -0.5, 1.0]);
        assert_eq!(payload.len(), 8);

        let mut frame = [0.0f32; 4];
        assert_eq!(decoder.decode(&payload, &mut frame).unwrap(), 4);
        for (decoded, expected) in frame.iter().zip([0.0, 0.5, -0.5, 1.0]) {
            assert!((decoded - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_short_payload_reports_short_count() {
        let mut decoder = Pcm16Decoder::new(8000, 1).unwrap();
        let mut frame = [9.0f32; 4];
        let written = decoder
            .decode(&Pcm16Decoder::encode(&[0.25, 0.25]), &mut frame)
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(frame[2], 9.0);
    }

    #[test]
    fn test_long_payload_is_truncated_to_frame() {
        let mut decoder = Pcm16Decoder::new(8000, 1).unwrap();
        let mut frame = [0.0f32; 2];
        let written = decoder
            .decode(&Pcm16Decoder::encode(&[0.1; 5]), &mut frame)
            .unwrap();
        assert_eq!(written, 2);
    }

    #[test]
    fn test_odd_payload_is_an_error() {
        let mut decoder = Pcm16Decoder::new(8000, 1).unwrap();
        let mut frame = [0.0f32; 4];
        let mut payload = Pcm16Decoder::encode(&[0.5, 0.5]);
        payload.push(0);
        assert!(matches!(
            decoder.decode(&payload, &mut frame),
            Err(JitterError::DecoderError(_))
        ));
        // Whole samples ahead of the stray byte are not written either
        assert_eq!(frame, [0.0; 4]);
    }

    #[test]
    fn test_default_conceal_is_silence() {
        let mut decoder = Pcm16Decoder::new(8000, 1).unwrap();
        let mut frame = [0.7f32; 4];
        assert_eq!(decoder.conceal(None, &mut frame).unwrap(), 4);
        assert_eq!(frame, [0.0; 4]);
    }

    #[test]
    fn test_invalid_construction() {
        assert_eq!(
            Pcm16Decoder::new(0, 1).unwrap_err(),
            JitterError::InvalidSampleRate(0)
        );
        assert_eq!(
            Pcm16Decoder::new(8000, 0).unwrap_err(),
            JitterError::InvalidChannelCount(0)
        );
    }
}
