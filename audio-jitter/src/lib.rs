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

//! # audio-jitter
//!
//! A jitter buffer for real-time voice playback. Compressed audio packets
//! arrive from the network in any order; they are held by sequence number,
//! decoded on demand into a fixed ring of frames, and handed to the playback
//! callback in exactly the block size it asks for. When there is nothing to
//! play the callback gets silence instead of an underrun.
//!
//! ```rust
//! use audio_jitter::codec::Pcm16Decoder;
//! use audio_jitter::{JitterBuffer, JitterBufferConfig};
//!
//! let config = JitterBufferConfig {
//!     sample_rate: 8000,
//!     frame_size: 4,
//!     ..Default::default()
//! };
//! let decoder = Pcm16Decoder::new(8000, 1).unwrap();
//! let mut jitter = JitterBuffer::new(config, decoder).unwrap();
//!
//! jitter.add_encoded_packet(0, Pcm16Decoder::encode(&[0.5, 0.5, 0.5, 0.5]));
//!
//! let mut out = [1.0f32; 6];
//! let produced = jitter.read(&mut out, 0, 6);
//! assert_eq!(produced, 4);
//! assert_eq!(&out[4..], &[0.0, 0.0]);
//! ```

pub mod codec;
pub mod error;
pub mod jitter;
pub mod packet;
pub mod ring;
pub mod shared;
pub mod statistics;
pub mod store;

pub use codec::AudioDecoder;
pub use error::{JitterError, Result};
pub use jitter::{DecodeMode, JitterBuffer, JitterBufferConfig};
pub use packet::EncodedPacket;
pub use shared::{packet_queue, DecodeWorker, PacketReceiver, PacketSender, SharedJitterBuffer};
pub use statistics::JitterStatistics;
pub use store::{InsertResult, PacketStore};
