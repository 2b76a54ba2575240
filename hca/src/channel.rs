//! Per-channel decode state and the four bit-level decode stages.
//!
//! Each block is decoded in five stages per channel (the fifth, MDCT
//! synthesis, lives in [`crate::dsp`]):
//!
//! 1. scale factors, intensity indices, and per-bin resolution selection
//! 2. quantized spectral coefficients
//! 3. high-frequency reconstruction from the base band
//! 4. intensity-stereo recovery between paired channels
//!
//! Quantization works on an exponential lattice with a step of `2^(53/128)`
//! per scale-factor increment; the dequantizer gain for a bin is the lattice
//! value for its scale factor times the step size of its resolution class.

use crate::bitstream::BitReader;
use crate::dsp::Imdct;
use crate::{Result, SAMPLES_PER_SUBFRAME, SUBFRAMES_PER_BLOCK};

/// Exponent step of the scale-factor lattice.
const LATTICE_STEP: f32 = 53.0 / 128.0;

/// Bits read for one coefficient, per resolution class. Classes 1..=7 use
/// prefix codes (the read is maximal and partially rewound); classes 8..=15
/// are plain sign-magnitude fields.
const QUANT_MAX_BITS: [u32; 16] = [0, 2, 3, 3, 4, 4, 4, 4, 5, 6, 7, 8, 9, 10, 11, 12];

/// Largest coefficient magnitude per resolution class.
const QUANT_MAX_VALUE: [u32; 16] = [
    0, 1, 2, 3, 4, 5, 6, 7, 15, 31, 63, 127, 255, 511, 1023, 2047,
];

/// Actual code lengths for the prefix-coded classes, 16 entries per class
/// (indexed by the maximal-length peek value).
#[rustfmt::skip]
const QUANT_CODE_BITS: [u8; 128] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    1, 1, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    2, 2, 2, 2, 2, 2, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0,
    2, 2, 3, 3, 3, 3, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4,
    3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
];

/// Decoded coefficient values for the prefix-coded classes, matching
/// `QUANT_CODE_BITS`.
#[rustfmt::skip]
const QUANT_CODE_VALUE: [f32; 128] = [
    0.0, 0.0, 0.0, 0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0,
    0.0, 0.0, 1.0,-1.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0,
    0.0, 0.0, 1.0, 1.0,-1.0, -1.0, 2.0, -2.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0,
    0.0, 0.0, 1.0,-1.0, 2.0, -2.0, 3.0, -3.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0, 0.0,  0.0,
    0.0, 0.0, 1.0, 1.0,-1.0, -1.0, 2.0,  2.0,-2.0, -2.0, 3.0,  3.0,-3.0, -3.0, 4.0, -4.0,
    0.0, 0.0, 1.0, 1.0,-1.0, -1.0, 2.0,  2.0,-2.0, -2.0, 3.0, -3.0, 4.0, -4.0, 5.0, -5.0,
    0.0, 0.0, 1.0, 1.0,-1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0, 5.0, -5.0, 6.0, -6.0,
    0.0, 0.0, 1.0, 1.0,-1.0,  2.0,-2.0,  3.0,-3.0,  4.0,-4.0,  5.0,-5.0,  6.0,-6.0,  7.0,
];

/// Resolution class chosen from the noise-level expression; indices at or
/// above 0x39 clamp before the lookup.
#[rustfmt::skip]
const RESOLUTION_TABLE: [u8; 0x39] = [
    0x0E, 0x0E, 0x0E, 0x0E, 0x0E, 0x0E, 0x0D, 0x0D,
    0x0D, 0x0D, 0x0D, 0x0D, 0x0C, 0x0C, 0x0C, 0x0C,
    0x0C, 0x0C, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B,
    0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x09,
    0x09, 0x09, 0x09, 0x09, 0x09, 0x08, 0x08, 0x08,
    0x08, 0x08, 0x08, 0x07, 0x06, 0x06, 0x05, 0x04,
    0x04, 0x04, 0x03, 0x03, 0x03, 0x02, 0x02, 0x02,
    0x02,
];

/// Stereo role assigned by the channel layout (`0` discrete, `1` primary of
/// an intensity pair, `2` secondary of an intensity pair).
pub(crate) const STEREO_PRIMARY: u8 = 1;
pub(crate) const STEREO_SECONDARY: u8 = 2;

pub(crate) struct Channel {
    /// Stereo role: 0, [`STEREO_PRIMARY`], or [`STEREO_SECONDARY`].
    pub role: u8,

    /// Scale factors per bin; the high-frequency group scales are stored
    /// from `hfr_base` upwards.
    pub scalefactors: [u8; SAMPLES_PER_SUBFRAME],

    /// Intensity index per sub-frame (secondary channels only).
    pub intensity: [u8; SUBFRAMES_PER_BLOCK],

    /// Index of the first high-frequency group scale inside `scalefactors`.
    pub hfr_base: usize,

    /// Coded bins for this channel.
    pub count: usize,

    /// Resolution class per bin.
    resolution: [u8; SAMPLES_PER_SUBFRAME],

    /// Dequantizer gain per bin.
    gain: [f32; SAMPLES_PER_SUBFRAME],

    /// Spectral coefficients for the current sub-frame.
    pub spectra: [f32; SAMPLES_PER_SUBFRAME],

    /// Second half of the previous sub-frame's MDCT output.
    overlap: [f32; SAMPLES_PER_SUBFRAME],

    /// Synthesized samples, one row per sub-frame.
    pub wave: [[f32; SAMPLES_PER_SUBFRAME]; SUBFRAMES_PER_BLOCK],
}

impl Channel {
    pub fn new(role: u8, hfr_base: usize, count: usize) -> Self {
        Self {
            role,
            scalefactors: [0; SAMPLES_PER_SUBFRAME],
            intensity: [0; SUBFRAMES_PER_BLOCK],
            hfr_base,
            count,
            resolution: [0; SAMPLES_PER_SUBFRAME],
            gain: [0.0; SAMPLES_PER_SUBFRAME],
            spectra: [0.0; SAMPLES_PER_SUBFRAME],
            overlap: [0.0; SAMPLES_PER_SUBFRAME],
            wave: [[0.0; SAMPLES_PER_SUBFRAME]; SUBFRAMES_PER_BLOCK],
        }
    }

    /// Stage 1: unpack scale factors and either intensity indices
    /// (secondary channels) or high-frequency group scales, then derive the
    /// per-bin resolution classes and dequantizer gains.
    ///
    /// `packed_noise_level` is the block-level allocation value
    /// `(9 bits << 8) - 7 bits`; `ath` biases it per bin.
    pub fn unpack_scalefactors(
        &mut self,
        bits: &mut BitReader<'_>,
        hfr_group_count: usize,
        packed_noise_level: i32,
        ath: &[u8; SAMPLES_PER_SUBFRAME],
    ) -> Result<()> {
        if self.count > 0 {
            let delta_bits = bits.read(3)?;
            if delta_bits >= 6 {
                for i in 0..self.count {
                    self.scalefactors[i] = bits.read(6)? as u8;
                }
            } else if delta_bits > 0 {
                // Delta-coded: a full 6-bit value, then deltas; the all-ones
                // delta escapes back to a full value.
                let escape = (1i32 << delta_bits) - 1;
                let half = escape >> 1;
                let mut value = bits.read(6)? as i32;
                self.scalefactors[0] = value as u8;
                for i in 1..self.count {
                    let delta = bits.read(delta_bits)? as i32;
                    if delta != escape {
                        value = (value + delta - half) & 0x3F;
                    } else {
                        value = bits.read(6)? as i32;
                    }
                    self.scalefactors[i] = value as u8;
                }
            } else {
                self.scalefactors[..self.count].fill(0);
            }
        }

        if self.role == STEREO_SECONDARY {
            let first = bits.peek(4)?;
            self.intensity[0] = first as u8;
            if first < 15 {
                for i in 0..SUBFRAMES_PER_BLOCK {
                    self.intensity[i] = bits.read(4)? as u8;
                }
            }
        } else {
            for i in 0..hfr_group_count {
                self.scalefactors[self.hfr_base + i] = bits.read(6)? as u8;
            }
        }

        if self.count > 0 {
            for i in 0..self.count {
                let sf = i32::from(self.scalefactors[i]);
                let mut class = 0u8;
                if sf > 0 {
                    let level = i32::from(ath[i]) + ((packed_noise_level + i as i32) >> 8)
                        - ((sf * 5) >> 1)
                        + 1;
                    class = if level < 0 {
                        15
                    } else if level >= 0x39 {
                        1
                    } else {
                        RESOLUTION_TABLE[level as usize]
                    };
                }
                self.resolution[i] = class;
            }
            self.resolution[self.count..].fill(0);

            for i in 0..self.count {
                self.gain[i] = lattice_scale(self.scalefactors[i])
                    * resolution_step(self.resolution[i]);
            }
        }

        Ok(())
    }

    /// Stage 2: read one sub-frame of quantized coefficients and dequantize
    /// them through the per-bin gains.
    pub fn read_spectra(&mut self, bits: &mut BitReader<'_>) -> Result<()> {
        for i in 0..self.count {
            let class = self.resolution[i] as usize;
            let max_bits = QUANT_MAX_BITS[class];
            let raw = bits.read(max_bits)?;
            let coefficient = if class < 8 {
                let index = (class << 4) + raw as usize;
                bits.advance(i32::from(QUANT_CODE_BITS[index]) - max_bits as i32);
                QUANT_CODE_VALUE[index]
            } else {
                // Sign-magnitude; a zero magnitude has no sign bit, so give
                // one back.
                let magnitude = (raw >> 1) as f32;
                if magnitude == 0.0 {
                    bits.advance(-1);
                }
                if raw & 1 == 1 {
                    -magnitude
                } else {
                    magnitude
                }
            };
            self.spectra[i] = self.gain[i] * coefficient;
        }
        self.spectra[self.count..].fill(0.0);
        Ok(())
    }

    /// Stage 3: rebuild the high-frequency bins by mirroring base-band
    /// coefficients, rescaled by the difference between the group scale and
    /// the source bin's scale factor.
    pub fn reconstruct_high_frequency(
        &mut self,
        hfr_group_count: usize,
        bands_per_group: usize,
        base_band_count: usize,
        total_band_count: usize,
    ) {
        if self.role == STEREO_SECONDARY || bands_per_group == 0 || base_band_count == 0 {
            return;
        }

        let mut dst = base_band_count;
        let mut src = base_band_count - 1;
        for group in 0..hfr_group_count {
            let group_scale = self.scalefactors[self.hfr_base + group];
            for _ in 0..bands_per_group {
                if dst >= total_band_count {
                    break;
                }
                let delta =
                    i32::from(group_scale) - i32::from(self.scalefactors[src]) + 64;
                self.spectra[dst] = scale_conversion(delta) * self.spectra[src];
                dst += 1;
                src = src.saturating_sub(1);
            }
        }
        self.spectra[SAMPLES_PER_SUBFRAME - 1] = 0.0;
    }

    /// Stage 4: recover the secondary channel of an intensity pair from the
    /// primary, using the secondary's per-sub-frame intensity index.
    pub fn apply_intensity_stereo(
        primary: &mut Channel,
        secondary: &mut Channel,
        subframe: usize,
        band_count: usize,
        base_band: usize,
        stereo_band_count: usize,
    ) {
        if primary.role != STEREO_PRIMARY || stereo_band_count == 0 {
            return;
        }
        let ratio = intensity_ratio(secondary.intensity[subframe]);
        for i in base_band..base_band + band_count {
            let sample = primary.spectra[i];
            secondary.spectra[i] = sample * (ratio - 2.0);
            primary.spectra[i] = sample * ratio;
        }
    }

    /// Stage 5: inverse MDCT with overlap-add into the sub-frame's PCM row.
    pub fn synthesize(&mut self, subframe: usize, imdct: &Imdct) {
        let (spectra, overlap, wave) = (&self.spectra, &mut self.overlap, &mut self.wave);
        imdct.run(spectra, overlap, &mut wave[subframe]);
    }
}

/// Lattice value for a scale factor: `2^((sf - 63) · 53/128 + 3.5)`.
fn lattice_scale(scalefactor: u8) -> f32 {
    ((f32::from(scalefactor) - 63.0) * LATTICE_STEP + 3.5).exp2()
}

/// Quantizer step size for a resolution class.
fn resolution_step(class: u8) -> f32 {
    let max = QUANT_MAX_VALUE[class as usize];
    if max == 0 {
        0.0
    } else {
        2.0 / (2.0 * max as f32 + 1.0)
    }
}

/// Rescale factor between two scale factors `delta = a - b + 64`; pinned to
/// zero at both ends of the range so out-of-range deltas mute the bin.
fn scale_conversion(delta: i32) -> f32 {
    if (1..=126).contains(&delta) {
        ((delta as f32 - 64.0) * LATTICE_STEP).exp2()
    } else {
        0.0
    }
}

/// Intensity ratio per index: 2.0 down to 0.0 in fourteen steps; index 15
/// (an unread sentinel) mutes the pair.
fn intensity_ratio(index: u8) -> f32 {
    if index < 15 {
        f32::from(14 - index) / 7.0
    } else {
        0.0
    }
}
