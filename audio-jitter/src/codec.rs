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

//! Audio codec support for the jitter buffer.

use crate::Result;

/// Trait for audio decoders.
///
/// Decoders write straight into a ring frame. A frame holds one codec frame
/// of interleaved samples; a decoder must never report more samples than the
/// frame can hold.
pub trait AudioDecoder {
    /// Returns the sample rate of the decoder.
    fn sample_rate(&self) -> u32;

    /// Returns the number of channels.
    fn channels(&self) -> u8;

    /// Decodes one packet into `frame`, returning the number of samples written.
    fn decode(&mut self, payload: &[u8], frame: &mut [f32]) -> Result<usize>;

    /// Synthesizes audio for a packet that never arrived.
    ///
    /// `next_payload` is the packet that follows the missing one, when it is
    /// already buffered; codecs with in-band FEC can rebuild the lost frame
    /// from it. The default writes a frame of silence.
    fn conceal(&mut self, next_payload: Option<&[u8]>, frame: &mut [f32]) -> Result<usize> {
        let _ = next_payload;
        frame.fill(0.0);
        Ok(frame.len())
    }
}

impl<D: AudioDecoder + ?Sized> AudioDecoder for Box<D> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn channels(&self) -> u8 {
        (**self).channels()
    }

    fn decode(&mut self, payload: &[u8], frame: &mut [f32]) -> Result<usize> {
        (**self).decode(payload, frame)
    }

    fn conceal(&mut self, next_payload: Option<&[u8]>, frame: &mut [f32]) -> Result<usize> {
        (**self).conceal(next_payload, frame)
    }
}

#[cfg(feature = "native")]
mod native_opus;
mod pcm16;

#[cfg(feature = "native")]
pub use native_opus::OpusDecoder;
pub use pcm16::Pcm16Decoder;
