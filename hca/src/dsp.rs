//! 128-band inverse MDCT synthesis.
//!
//! Each sub-frame carries 128 spectral coefficients; synthesis produces a
//! 256-sample lapped transform output whose first half is windowed and
//! overlap-added with the previous sub-frame's tail to yield 128 PCM
//! samples. Twiddle and window tables are derived once per decoder.

use crate::SAMPLES_PER_SUBFRAME;

const BANDS: usize = SAMPLES_PER_SUBFRAME;
const FRAME: usize = 2 * BANDS;

pub(crate) struct Imdct {
    /// `(2/N) · cos(π/N · (n + ½ + N/2)(k + ½))`, row-major over `n`.
    twiddle: Vec<f32>,
    /// Sine window over the full 256-sample frame.
    window: [f32; FRAME],
}

impl Imdct {
    pub fn new() -> Self {
        let n = BANDS as f64;
        let mut twiddle = vec![0.0f32; FRAME * BANDS];
        for (row, chunk) in twiddle.chunks_exact_mut(BANDS).enumerate() {
            let phase = row as f64 + 0.5 + n / 2.0;
            for (k, t) in chunk.iter_mut().enumerate() {
                let angle = std::f64::consts::PI / n * phase * (k as f64 + 0.5);
                *t = (2.0 / n * angle.cos()) as f32;
            }
        }

        let mut window = [0.0f32; FRAME];
        for (i, w) in window.iter_mut().enumerate() {
            *w = ((i as f64 + 0.5) * std::f64::consts::PI / FRAME as f64).sin() as f32;
        }

        Self { twiddle, window }
    }

    /// Transform `spectra` into `out`, folding the previous sub-frame's tail
    /// in from `overlap` and leaving this sub-frame's tail there.
    pub fn run(
        &self,
        spectra: &[f32; BANDS],
        overlap: &mut [f32; BANDS],
        out: &mut [f32; BANDS],
    ) {
        for i in 0..FRAME {
            let row = &self.twiddle[i * BANDS..(i + 1) * BANDS];
            let mut acc = 0.0f32;
            for (t, s) in row.iter().zip(spectra.iter()) {
                acc += t * s;
            }
            let windowed = acc * self.window[i];
            if i < BANDS {
                out[i] = windowed + overlap[i];
            } else {
                overlap[i - BANDS] = windowed;
            }
        }
    }
}
