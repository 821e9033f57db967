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

use thiserror::Error;

/// Result type for jitter buffer operations
pub type Result<T> = std::result::Result<T, JitterError>;

/// Errors that can occur while setting up or decoding into the jitter buffer.
///
/// Runtime conditions on the audio path (stale packets, underruns, a full
/// ring) are not errors; they are counted in [`crate::JitterStatistics`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JitterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(u8),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),

    #[error("Decoder error: {0}")]
    DecoderError(String),

    #[error("Failed to start decode worker: {0}")]
    WorkerSpawn(String),
}
