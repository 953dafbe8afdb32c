//! Recovery of real intensities from the obfuscated sample words of a data package.
//!
//! Every package carries its own exposure time, sensor serial and an opaque 64 bit value
//! (`ex_info`). Those three are mixed into two 16 bit keys: the first half of the samples is
//! XORed with `key_a`, the second half with `key_b`. Result is divided by a power of ten,
//! which is transmitted byte swapped and masked.

/// Constant mixed into the transmitted exponent
const EXPONENT_MASK: u16 = 8848;

/// Per package pair of XOR keys
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct DescrambleKeys {
    pub key_a: u16,
    pub key_b: u16,
}

impl DescrambleKeys {
    /// Derives keys from exposure time in milliseconds, sensor serial and `ex_info`.
    /// Keys are only valid for the package these values came from.
    pub fn derive(exposure_time_ms: f32, serial: u32, ex_info: u64) -> Self {
        let t_le = u64::from(exposure_time_ms.to_bits());
        let t_be = u64::from(exposure_time_ms.to_bits().swap_bytes());
        let serial = u64::from(serial);

        let common = t_be ^ (ex_info >> 16);
        let key_a = (common ^ ((t_le ^ serial) >> 16) ^ serial ^ ex_info) & 0xFFFF;
        let key_b = ((common >> 16) ^ t_le ^ serial) & 0xFFFF;

        DescrambleKeys {
            key_a: key_a as u16,
            key_b: key_b as u16,
        }
    }

    fn for_index(&self, idx: usize, midpoint: usize) -> u16 {
        if idx < midpoint {
            self.key_a
        } else {
            self.key_b
        }
    }
}

/// Device reports exposure in whole microseconds, keys are derived from milliseconds as f32
pub fn exposure_time_ms(exposure_time_us: u32) -> f32 {
    (f64::from(exposure_time_us) / 1000.0) as f32
}

pub fn decode_exponent(encoded_exponent: u16) -> u16 {
    encoded_exponent.swap_bytes() ^ EXPONENT_MASK
}

/// Inverse of [`decode_exponent`], used by anything that has to produce packages
pub fn encode_exponent(exponent: u16) -> u16 {
    (exponent ^ EXPONENT_MASK).swap_bytes()
}

/// Decodes raw sample words into intensities
pub fn descramble(
    samples: &[u16],
    encoded_exponent: u16,
    exposure_time_ms: f32,
    serial: u32,
    ex_info: u64,
) -> Vec<f64> {
    let keys = DescrambleKeys::derive(exposure_time_ms, serial, ex_info);
    // Anything above 308 overflows to infinity, which correctly yields zeros
    let scale = 10f64.powi(i32::from(decode_exponent(encoded_exponent)));
    let midpoint = samples.len() / 2;

    samples
        .iter()
        .enumerate()
        .map(|(idx, sample)| f64::from(sample ^ keys.for_index(idx, midpoint)) / scale)
        .collect()
}

/// Inverse of [`descramble`] for values that are whole multiples of `10^-exponent`
pub fn scramble(
    values: &[u16],
    exposure_time_ms: f32,
    serial: u32,
    ex_info: u64,
) -> Vec<u16> {
    let keys = DescrambleKeys::derive(exposure_time_ms, serial, ex_info);
    let midpoint = values.len() / 2;
    values
        .iter()
        .enumerate()
        .map(|(idx, value)| value ^ keys.for_index(idx, midpoint))
        .collect()
}
