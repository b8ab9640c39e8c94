//! x87 80-bit extended precision, as carried by `longdouble` on the binary wire.
//!
//! Layout (little-endian, padded to 16 bytes):
//! [mantissa u64, explicit integer bit at 63][sign(1) | exponent(15) u16][pad 6]
//!
//! Values are held as `f64` in memory; f64 -> f80 is exact, f80 -> f64 rounds.

use byteorder::{ByteOrder as _, LittleEndian};

pub const WIRE_SIZE: usize = 16;

const F80_BIAS: i32 = 16383;
const F64_BIAS: i32 = 1023;

/// Encode into the little-endian 16-byte wire form.
pub fn to_le_bytes(v: f64) -> [u8; WIRE_SIZE] {
    let bits = v.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let exp = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & ((1u64 << 52) - 1);

    let (e80, mant): (u16, u64) = if exp == 0x7ff {
        let m = if frac == 0 {
            1u64 << 63
        } else {
            (1u64 << 63) | (1u64 << 62) | (frac << 11)
        };
        (0x7fff, m)
    } else if exp == 0 {
        if frac == 0 {
            (0, 0)
        } else {
            // subnormal f64: normalise into the explicit-bit mantissa
            let lz = frac.leading_zeros() as i32;
            let e = F80_BIAS + 63 - 1074 - lz;
            (e as u16, frac << lz)
        }
    } else {
        let e = exp - F64_BIAS + F80_BIAS;
        (e as u16, (1u64 << 63) | (frac << 11))
    };

    let mut out = [0u8; WIRE_SIZE];
    LittleEndian::write_u64(&mut out[0..8], mant);
    LittleEndian::write_u16(&mut out[8..10], sign | e80);
    out
}

/// Decode from the little-endian 16-byte wire form.
pub fn from_le_bytes(b: &[u8]) -> f64 {
    let mant = LittleEndian::read_u64(&b[0..8]);
    let se = LittleEndian::read_u16(&b[8..10]);
    let negative = se & 0x8000 != 0;
    let e = (se & 0x7fff) as i32;

    let mag = if e == 0x7fff {
        if mant << 1 == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else if mant == 0 {
        0.0
    } else {
        let shift = e - F80_BIAS - 63;
        let half = shift / 2;
        (mant as f64) * 2f64.powi(half) * 2f64.powi(shift - half)
    };
    if negative {
        -mag
    } else {
        mag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_round_trip() {
        let samples = [
            0.0,
            -0.0,
            1.0,
            -2.5,
            std::f64::consts::PI,
            f64::MAX,
            f64::MIN_POSITIVE,
            5e-324,
            1.0e-310,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ];
        for v in samples {
            let got = from_le_bytes(&to_le_bytes(v));
            assert_eq!(got.to_bits(), v.to_bits(), "{v:e}");
        }
        assert!(from_le_bytes(&to_le_bytes(f64::NAN)).is_nan());
    }

    #[test]
    fn one_has_canonical_layout() {
        let b = to_le_bytes(1.0);
        assert_eq!(LittleEndian::read_u64(&b[0..8]), 1u64 << 63);
        assert_eq!(LittleEndian::read_u16(&b[8..10]), 16383);
        assert!(b[10..].iter().all(|&x| x == 0));
    }
}
