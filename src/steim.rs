//! Steim1 and Steim2 compression and decompression.
//!
//! These are differential integer compression schemes used in seismological
//! data (SEED/miniSEED format). See Appendix B of the SEED Manual v2.4.
//!
//! A record's first difference refers to the last sample of the previous
//! record and is ignored on decode; the first sample is the forward
//! integration constant X₀ stored in frame 0.

use log::warn;

use crate::types::ByteOrder;
use crate::{MseedError, Result};

pub(crate) const FRAME_SIZE: usize = 64; // 16 x 32-bit words
const WORDS_PER_FRAME: usize = 16;

fn read_u32(data: &[u8], offset: usize, byte_order: ByteOrder) -> u32 {
    let bytes = [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ];
    match byte_order {
        ByteOrder::Big => u32::from_be_bytes(bytes),
        ByteOrder::Little => u32::from_le_bytes(bytes),
    }
}

fn extract_nibble(control_word: u32, word_index: usize) -> u8 {
    let shift = 30 - (word_index * 2);
    ((control_word >> shift) & 0x03) as u8
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    (value as i32).wrapping_shl(shift).wrapping_shr(shift)
}

/// Integrates differences into samples, seeded by X₀.
struct Integrator {
    x0: i32,
    acc: i32,
    samples: Vec<i32>,
    limit: usize,
}

impl Integrator {
    fn new(x0: i32, limit: usize) -> Self {
        Self {
            x0,
            acc: x0,
            samples: Vec::with_capacity(limit),
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.samples.len() >= self.limit
    }

    fn push(&mut self, diff: i32) {
        if self.is_full() {
            return;
        }
        if self.samples.is_empty() {
            self.acc = self.x0;
        } else {
            self.acc = self.acc.wrapping_add(diff);
        }
        self.samples.push(self.acc);
    }

    /// Push `count` right-aligned fields of `bits` width, most significant first.
    fn push_fields(&mut self, word: u32, count: u32, bits: u32) {
        let mask = (1u32 << bits) - 1;
        for i in 0..count {
            let shift = (count - 1 - i) * bits;
            self.push(sign_extend((word >> shift) & mask, bits));
        }
    }

    fn finish(self, xn: i32, codec: &str) -> Vec<i32> {
        if self.samples.len() == self.limit {
            if let Some(&last) = self.samples.last() {
                if last != xn {
                    warn!("{codec}: last sample {last} differs from reverse integration constant {xn}");
                }
            }
        }
        self.samples
    }
}

fn frame_count(data: &[u8]) -> Result<usize> {
    let num_frames = data.len() / FRAME_SIZE;
    if num_frames == 0 {
        return Err(MseedError::SteimDecode(format!(
            "data length {} holds no complete frame",
            data.len()
        )));
    }
    Ok(num_frames)
}

/// Walk every data word of every frame, handing (word, nibble) to `apply`.
fn walk_frames<F>(
    data: &[u8],
    byte_order: ByteOrder,
    integrator: &mut Integrator,
    mut apply: F,
) -> Result<()>
where
    F: FnMut(u32, u8, &mut Integrator) -> Result<()>,
{
    let num_frames = frame_count(data)?;
    for frame_idx in 0..num_frames {
        let frame_offset = frame_idx * FRAME_SIZE;
        let control_word = read_u32(data, frame_offset, byte_order);

        for word_idx in 1..WORDS_PER_FRAME {
            if integrator.is_full() {
                return Ok(());
            }
            // Skip X₀ and Xₙ words in frame 0
            if frame_idx == 0 && (word_idx == 1 || word_idx == 2) {
                continue;
            }
            let word = read_u32(data, frame_offset + word_idx * 4, byte_order);
            apply(word, extract_nibble(control_word, word_idx), integrator)?;
        }
    }
    Ok(())
}

/// Decode Steim1 compressed data into at most `num_samples` i32 samples.
///
/// Trailing bytes that do not form a whole frame are ignored. A short
/// result is returned as-is; the caller decides how to report it.
pub fn decode_steim1(data: &[u8], num_samples: usize, byte_order: ByteOrder) -> Result<Vec<i32>> {
    frame_count(data)?;
    let x0 = read_u32(data, 4, byte_order) as i32;
    let xn = read_u32(data, 8, byte_order) as i32;
    let mut integrator = Integrator::new(x0, num_samples);

    walk_frames(data, byte_order, &mut integrator, |word, nibble, out| {
        match nibble {
            0b00 => {} // no data
            0b01 => out.push_fields(word, 4, 8),
            0b10 => out.push_fields(word, 2, 16),
            _ => out.push(word as i32),
        }
        Ok(())
    })?;

    Ok(integrator.finish(xn, "steim1"))
}

/// Decode Steim2 compressed data into at most `num_samples` i32 samples.
///
/// Extends Steim1 with additional packing formats using "dnib" (bits 31-30 of data word).
pub fn decode_steim2(data: &[u8], num_samples: usize, byte_order: ByteOrder) -> Result<Vec<i32>> {
    frame_count(data)?;
    let x0 = read_u32(data, 4, byte_order) as i32;
    let xn = read_u32(data, 8, byte_order) as i32;
    let mut integrator = Integrator::new(x0, num_samples);

    walk_frames(data, byte_order, &mut integrator, |word, nibble, out| {
        let dnib = ((word >> 30) & 0x03) as u8;
        match (nibble, dnib) {
            (0b00, _) => {}
            (0b01, _) => out.push_fields(word, 4, 8),
            (0b10, 0b01) => out.push_fields(word, 1, 30),
            (0b10, 0b10) => out.push_fields(word, 2, 15),
            (0b10, 0b11) => out.push_fields(word, 3, 10),
            (0b11, 0b00) => out.push_fields(word, 5, 6),
            (0b11, 0b01) => out.push_fields(word, 6, 5),
            (0b11, 0b10) => out.push_fields(word, 7, 4),
            _ => {
                return Err(MseedError::SteimDecode(format!(
                    "steim2 nibble={nibble:02b} invalid dnib={dnib:02b}"
                )));
            }
        }
        Ok(())
    })?;

    Ok(integrator.finish(xn, "steim2"))
}

type PackFn = fn(&[i32]) -> Result<(u32, u8, usize)>;

/// Pack as many samples as fit into `max_frames` frames.
///
/// Returns the frame bytes (a multiple of 64) and the number of samples packed.
fn pack_frames(
    samples: &[i32],
    max_frames: usize,
    byte_order: ByteOrder,
    pack_word: PackFn,
) -> Result<(Vec<u8>, usize)> {
    if samples.is_empty() {
        return Err(MseedError::EncodeError("no samples to encode".into()));
    }
    if max_frames == 0 {
        return Err(MseedError::EncodeError(
            "payload too small for a single Steim frame".into(),
        ));
    }

    // d₀ is ignored by decoders; leave it zero
    let mut diffs = Vec::with_capacity(samples.len());
    diffs.push(0i32);
    diffs.extend(samples.windows(2).map(|w| w[1].wrapping_sub(w[0])));

    let mut frames: Vec<[u32; WORDS_PER_FRAME]> = Vec::new();
    let mut diff_idx = 0;

    while diff_idx < diffs.len() && frames.len() < max_frames {
        let is_first_frame = frames.is_empty();
        let mut frame = [0u32; WORDS_PER_FRAME];
        let mut control: u32 = 0;
        let start_word = if is_first_frame { 3 } else { 1 };

        #[allow(clippy::needless_range_loop)]
        for word_idx in start_word..WORDS_PER_FRAME {
            if diff_idx >= diffs.len() {
                break;
            }
            let (packed_word, nibble, consumed) = pack_word(&diffs[diff_idx..])?;
            frame[word_idx] = packed_word;
            control |= (nibble as u32) << (30 - word_idx * 2);
            diff_idx += consumed;
        }

        frame[0] = control;
        frames.push(frame);
    }

    let packed = diff_idx;
    frames[0][1] = samples[0] as u32;
    frames[0][2] = samples[packed - 1] as u32;

    let mut output = Vec::with_capacity(frames.len() * FRAME_SIZE);
    for frame in &frames {
        for &word in frame {
            match byte_order {
                ByteOrder::Big => output.extend_from_slice(&word.to_be_bytes()),
                ByteOrder::Little => output.extend_from_slice(&word.to_le_bytes()),
            }
        }
    }

    Ok((output, packed))
}

/// Steim1-encode a prefix of `samples` into at most `max_frames` frames.
pub fn encode_steim1(
    samples: &[i32],
    max_frames: usize,
    byte_order: ByteOrder,
) -> Result<(Vec<u8>, usize)> {
    pack_frames(samples, max_frames, byte_order, steim1_pack_diffs)
}

/// Steim2-encode a prefix of `samples` into at most `max_frames` frames.
pub fn encode_steim2(
    samples: &[i32],
    max_frames: usize,
    byte_order: ByteOrder,
) -> Result<(Vec<u8>, usize)> {
    pack_frames(samples, max_frames, byte_order, steim2_pack_diffs)
}

/// Pack consecutive diffs into a single Steim1 word.
/// Returns (packed_word, nibble, num_consumed).
fn steim1_pack_diffs(diffs: &[i32]) -> Result<(u32, u8, usize)> {
    // Try four 8-bit diffs
    if diffs.len() >= 4 && diffs[..4].iter().all(|&d| (-128..=127).contains(&d)) {
        let word = ((diffs[0] as u8 as u32) << 24)
            | ((diffs[1] as u8 as u32) << 16)
            | ((diffs[2] as u8 as u32) << 8)
            | (diffs[3] as u8 as u32);
        return Ok((word, 0b01, 4));
    }

    // Try two 16-bit diffs
    if diffs.len() >= 2 && diffs[..2].iter().all(|&d| (-32768..=32767).contains(&d)) {
        let word = ((diffs[0] as u16 as u32) << 16) | (diffs[1] as u16 as u32);
        return Ok((word, 0b10, 2));
    }

    // Fallback: one 32-bit diff
    Ok((diffs[0] as u32, 0b11, 1))
}

/// Pack consecutive diffs into a single Steim2 word.
/// Returns (packed_word, nibble, num_consumed).
fn steim2_pack_diffs(diffs: &[i32]) -> Result<(u32, u8, usize)> {
    fn fits(diffs: &[i32], n: usize, bits: u32) -> bool {
        let lo = -(1i32 << (bits - 1));
        let hi = (1i32 << (bits - 1)) - 1;
        diffs.len() >= n && diffs[..n].iter().all(|&d| (lo..=hi).contains(&d))
    }

    fn pack(diffs: &[i32], n: usize, bits: u32, dnib: u32) -> u32 {
        let mask = (1u32 << bits) - 1;
        let mut word = dnib << 30;
        for (i, &d) in diffs[..n].iter().enumerate() {
            word |= ((d as u32) & mask) << ((n - 1 - i) as u32 * bits);
        }
        word
    }

    if fits(diffs, 7, 4) {
        return Ok((pack(diffs, 7, 4, 0b10), 0b11, 7));
    }
    if fits(diffs, 6, 5) {
        return Ok((pack(diffs, 6, 5, 0b01), 0b11, 6));
    }
    if fits(diffs, 5, 6) {
        return Ok((pack(diffs, 5, 6, 0b00), 0b11, 5));
    }
    if fits(diffs, 4, 8) {
        return Ok((pack(diffs, 4, 8, 0b00), 0b01, 4));
    }
    if fits(diffs, 3, 10) {
        return Ok((pack(diffs, 3, 10, 0b11), 0b10, 3));
    }
    if fits(diffs, 2, 15) {
        return Ok((pack(diffs, 2, 15, 0b10), 0b10, 2));
    }
    if fits(diffs, 1, 30) {
        return Ok((pack(diffs, 1, 30, 0b01), 0b10, 1));
    }
    Err(MseedError::EncodeError(format!(
        "difference {} exceeds the 30-bit Steim2 range",
        diffs[0]
    )))
}
