use crate::{JitterError, Result};
use opus::{Channels, Decoder as OpusInner};

use super::AudioDecoder;

/// Wrapper around libopus via the `opus` crate (native targets).
///
/// Loss concealment uses libopus PLC, or in-band FEC when the packet after
/// the missing one is already buffered.
pub struct OpusDecoder {
    inner: OpusInner,
    sample_rate: u32,
    channels: u8,
}

impl std::fmt::Debug for OpusDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpusDecoder")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self> {
        let ch_enum = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => return Err(JitterError::InvalidChannelCount(channels)),
        };
        let inner = OpusInner::new(sample_rate, ch_enum)
            .map_err(|e| JitterError::DecoderError(format!("Opus init: {e}")))?;
        Ok(Self {
            inner,
            sample_rate,
            channels,
        })
    }
}

impl AudioDecoder for OpusDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn decode(&mut self, payload: &[u8], frame: &mut [f32]) -> Result<usize> {
        let samples_per_channel = self
            .inner
            .decode_float(payload, frame, false)
            .map_err(|e| JitterError::DecoderError(format!("Opus decode: {e}")))?;
        Ok(samples_per_channel * self.channels as usize)
    }

    fn conceal(&mut self, next_payload: Option<&[u8]>, frame: &mut [f32]) -> Result<usize> {
        let (input, fec) = match next_payload {
            Some(payload) => (payload, true),
            None => (&[][..], false),
        };
        let samples_per_channel = self
            .inner
            .decode_float(input, frame, fec)
            .map_err(|e| JitterError::DecoderError(format!("Opus PLC: {e}")))?;
        Ok(samples_per_channel * self.channels as usize)
    }
}
