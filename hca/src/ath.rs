//! Absolute-threshold-of-hearing table.
//!
//! The block decoder biases its per-bin resolution selection with a 128-entry
//! byte table. Type 0 disables the bias (all zeros); type 1 samples a fixed
//! hearing-threshold curve, stepping through it at the stream's sampling
//! rate so each spectral bin lands on the frequency it actually carries.

use crate::{Error, Result};

/// Entries in the sampled table, one per spectral bin.
const TABLE_LEN: usize = 0x80;

/// Length of the base curve; each step covers 32 Hz, ending near 21 kHz.
const CURVE_LEN: u32 = 0x28E;

pub(crate) struct AthTable {
    table: [u8; TABLE_LEN],
}

impl AthTable {
    pub fn new(ath_type: u16, sampling_rate: u32) -> Result<Self> {
        match ath_type {
            0 => Ok(Self {
                table: [0u8; TABLE_LEN],
            }),
            1 => Ok(Self::init_curve(sampling_rate)),
            other => Err(Error::UnsupportedAthType(other)),
        }
    }

    fn init_curve(sampling_rate: u32) -> Self {
        let mut table = [0u8; TABLE_LEN];
        let mut acc = 0u32;
        for i in 0..TABLE_LEN {
            let index = acc >> 13;
            if index >= CURVE_LEN {
                // Past the audible range; mask the remaining bins entirely.
                for entry in table.iter_mut().skip(i) {
                    *entry = 0xFF;
                }
                break;
            }
            table[i] = base_curve(index);
            acc += sampling_rate;
        }
        Self { table }
    }

    pub fn table(&self) -> &[u8; TABLE_LEN] {
        &self.table
    }
}

/// Threshold-in-quiet approximation (Painter & Spanias), evaluated at the
/// curve step's center frequency and clamped to the byte range.
fn base_curve(index: u32) -> u8 {
    let f = (f64::from(index) * 32.0).max(12.8) / 1000.0;
    let db = 3.64 * f.powf(-0.8) - 6.5 * (-0.6 * (f - 3.3) * (f - 3.3)).exp() + 1e-3 * f.powi(4);
    db.clamp(0.0, 255.0) as u8
}
