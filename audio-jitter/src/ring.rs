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

//! Fixed ring of decoded audio frames.
//!
//! The ring owns `num_frames` slots of `frame_samples` samples each. A writer
//! claims the slot under the write cursor, the codec fills it, and the writer
//! commits how many samples the codec actually produced. The reader walks the
//! committed slots in order and never crosses a slot boundary in one copy, so
//! every copy comes from exactly one decode.
//!
//! Overflow policy: a slot is only handed out while it holds no unread audio.
//! When every slot is occupied [`DecodedRing::allocate_write_frame`] returns
//! `None` and the caller keeps its packet until the reader frees a slot.

#[derive(Debug, Default, Clone)]
struct Frame {
    /// Empty until the slot is first written, `frame_samples` long after
    samples: Vec<f32>,
    /// Number of valid samples from the last commit
    len: usize,
}

/// Ring of decoded frames with independent write and read cursors
#[derive(Debug)]
pub struct DecodedRing {
    frames: Vec<Frame>,
    frame_samples: usize,
    write_frame: usize,
    read_frame: usize,
    read_offset: usize,
    /// Slots holding committed, not fully read audio
    occupied: usize,
    available: usize,
    /// Slot handed out by `allocate_write_frame` and not committed yet
    pending: Option<usize>,
}

impl DecodedRing {
    /// Create a ring of `num_frames` slots holding `frame_samples` each.
    ///
    /// Slot storage is allocated lazily on first write.
    pub fn new(num_frames: usize, frame_samples: usize) -> Self {
        let num_frames = num_frames.max(1);
        Self {
            frames: vec![Frame::default(); num_frames],
            frame_samples,
            write_frame: 0,
            read_frame: 0,
            read_offset: 0,
            occupied: 0,
            available: 0,
            pending: None,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Total samples the ring can hold
    pub fn capacity(&self) -> usize {
        self.frames.len() * self.frame_samples
    }

    /// Decoded samples not yet read
    pub fn available_samples(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Slots that can take a new decode right now
    pub fn free_frames(&self) -> usize {
        self.frames.len() - self.occupied - usize::from(self.pending.is_some())
    }

    /// Index of the slot the next decode goes into
    pub fn write_cursor(&self) -> usize {
        self.write_frame
    }

    /// Sample offset of the reader within the ring's total capacity
    pub fn read_cursor(&self) -> usize {
        self.read_frame * self.frame_samples + self.read_offset
    }

    /// Claim the slot under the write cursor and advance the cursor.
    ///
    /// Returns `None` when no slot is free. The returned slice is always
    /// `frame_samples` long; its previous contents are unspecified.
    pub fn allocate_write_frame(&mut self) -> Option<&mut [f32]> {
        // An allocation that was never committed is abandoned
        if let Some(abandoned) = self.pending.take() {
            self.write_frame = abandoned;
        }
        if self.free_frames() == 0 {
            return None;
        }

        let index = self.write_frame;
        self.write_frame = (self.write_frame + 1) % self.frames.len();
        self.pending = Some(index);

        let frame = &mut self.frames[index];
        if frame.samples.len() != self.frame_samples {
            frame.samples.resize(self.frame_samples, 0.0);
        }
        frame.len = 0;
        Some(frame.samples.as_mut_slice())
    }

    /// Record how many samples were written into the last allocated frame.
    ///
    /// Counts above `frame_samples` are clamped. A commit of zero releases the
    /// slot and rewinds the write cursor so empty decodes leave no hole.
    pub fn commit_decoded(&mut self, samples: usize) {
        let Some(index) = self.pending.take() else {
            log::warn!("commit_decoded({samples}) without an allocated frame");
            return;
        };

        let samples = samples.min(self.frame_samples);
        if samples == 0 {
            self.write_frame = index;
            return;
        }

        self.frames[index].len = samples;
        self.occupied += 1;
        self.available += samples;
    }

    /// Copy decoded audio into `dst`, staying within the current frame.
    ///
    /// Copies `min(dst.len(), samples left in the current frame)` and returns
    /// the count. Call repeatedly to drain several frames.
    pub fn read_into(&mut self, dst: &mut [f32]) -> usize {
        if self.available == 0 || dst.is_empty() {
            return 0;
        }

        let frame = &self.frames[self.read_frame];
        let remaining = frame.len - self.read_offset;
        let count = remaining.min(dst.len());
        dst[..count].copy_from_slice(&frame.samples[self.read_offset..self.read_offset + count]);

        self.read_offset += count;
        self.available -= count;

        if self.read_offset == frame.len {
            self.read_offset = 0;
            self.read_frame = (self.read_frame + 1) % self.frames.len();
            self.occupied -= 1;
        }

        count
    }

    /// Drop all decoded audio and rewind both cursors
    pub fn clear(&mut self) {
        for frame in &mut self.frames {
            frame.len = 0;
        }
        self.write_frame = 0;
        self.read_frame = 0;
        self.read_offset = 0;
        self.occupied = 0;
        self.available = 0;
        self.pending = None;
    }
}
