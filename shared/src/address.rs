//! Deterministic dialing addresses.
//!
//! A gate's address is derived from its position snapped to a 100-unit grid
//! and the id of the space it lives in. The SHA-256 digest of that key is
//! rebased into base-39 digits, nudged so no digit repeats or clashes with the
//! point of origin, and rendered through the glyph alphabet.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// The 39 dialing glyphs, indexed by digit value.
pub const GLYPHS: &[u8; 39] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ+-=";

/// Number of distinct glyphs (the digit base).
pub const GLYPH_COUNT: u8 = 39;

/// Digits generated from the position hash, before the point of origin.
pub const GENERATED_DIGITS: usize = 6;

/// Side length of a quantization cell.
pub const GRID_SIZE: f64 = 100.0;

/// Point of origin used when the caller supplies none.
pub const DEFAULT_POINT_OF_ORIGIN: &[u8] = &[0];

/// Largest accepted coordinate magnitude (2^53 - 1). Past this, grid cells
/// stop being exactly representable and keys would no longer be distinct.
pub const MAX_COORDINATE: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AddressError {
    #[error("coordinate {axis} is not finite: {value}")]
    NonFiniteCoordinate { axis: char, value: f64 },

    #[error("coordinate {axis} is out of range: {value}")]
    CoordinateOutOfRange { axis: char, value: f64 },

    #[error("point of origin digit {0} is outside 0..39")]
    OriginDigitOutOfRange(u8),

    #[error("point of origin uses {0} distinct digits, leaving fewer than 6 free")]
    OriginTooLarge(usize),
}

/// Snap a coordinate to the nearest grid cell. Halves round towards +inf.
/// Exact for finite values within [`MAX_COORDINATE`].
pub fn quantize(v: f64) -> i64 {
    ((v / GRID_SIZE + 0.5).floor() * GRID_SIZE) as i64
}

/// Generate the dialing address for a position in a space.
///
/// The result is `GENERATED_DIGITS + point_of_origin.len()` glyphs long. An
/// empty `point_of_origin` is treated as [`DEFAULT_POINT_OF_ORIGIN`].
pub fn generate_address(
    x: f64,
    y: f64,
    z: f64,
    space_id: &str,
    point_of_origin: &[u8],
) -> Result<String, AddressError> {
    for (axis, value) in [('x', x), ('y', y), ('z', z)] {
        if !value.is_finite() {
            return Err(AddressError::NonFiniteCoordinate { axis, value });
        }
        if value.abs() > MAX_COORDINATE {
            return Err(AddressError::CoordinateOutOfRange { axis, value });
        }
    }

    let origin = if point_of_origin.is_empty() {
        DEFAULT_POINT_OF_ORIGIN
    } else {
        point_of_origin
    };
    if let Some(&bad) = origin.iter().find(|&&d| d >= GLYPH_COUNT) {
        return Err(AddressError::OriginDigitOutOfRange(bad));
    }
    let mut reserved = [false; GLYPH_COUNT as usize];
    for &d in origin {
        reserved[d as usize] = true;
    }
    let distinct = reserved.iter().filter(|&&r| r).count();
    if distinct + GENERATED_DIGITS > GLYPH_COUNT as usize {
        return Err(AddressError::OriginTooLarge(distinct));
    }

    let key = format!("{}:{}:{}:{}", quantize(x), quantize(y), quantize(z), space_id);
    let digest = Sha256::digest(key.as_bytes());

    // Digest bytes are the big-endian base-256 digits of a 256-bit integer.
    let decimal = rebase(&digest, 256, 10);
    let mut base39 = rebase(&decimal, 10, GLYPH_COUNT as u32);
    base39.reverse();
    base39.resize(GENERATED_DIGITS.max(base39.len()), 0);

    let mut digits = Vec::with_capacity(GENERATED_DIGITS + origin.len());
    for &raw in base39.iter().take(GENERATED_DIGITS) {
        let mut d = raw;
        while reserved[d as usize] {
            d = (d + 1) % GLYPH_COUNT;
        }
        reserved[d as usize] = true;
        digits.push(d);
    }
    digits.extend_from_slice(origin);

    Ok(digits
        .into_iter()
        .map(|d| GLYPHS[d as usize] as char)
        .collect())
}

/// Convert a big-endian digit string from one base to another by repeated
/// long division. Returns big-endian digits; zero is `[0]`.
fn rebase(digits: &[u8], from: u32, to: u32) -> Vec<u8> {
    let mut number: Vec<u32> = digits.iter().map(|&d| d as u32).collect();
    let mut out = Vec::new();

    loop {
        let first_nonzero = number.iter().position(|&d| d != 0);
        let Some(start) = first_nonzero else { break };
        number.drain(..start);

        let mut remainder = 0u32;
        for d in number.iter_mut() {
            let acc = remainder * from + *d;
            *d = acc / to;
            remainder = acc % to;
        }
        out.push(remainder as u8);
    }

    if out.is_empty() {
        out.push(0);
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(address: &str, origin: &[u8]) {
        let bytes = address.as_bytes();
        assert_eq!(bytes.len(), GENERATED_DIGITS + origin.len());
        assert!(bytes.iter().all(|b| GLYPHS.contains(b)), "{address}");

        let generated: Vec<u8> = bytes[..GENERATED_DIGITS]
            .iter()
            .map(|b| GLYPHS.iter().position(|g| g == b).unwrap() as u8)
            .collect();
        for (i, d) in generated.iter().enumerate() {
            assert!(!origin.contains(d), "{address}: digit {d} is in origin");
            assert!(!generated[..i].contains(d), "{address}: digit {d} repeats");
        }
        let tail: Vec<u8> = bytes[GENERATED_DIGITS..]
            .iter()
            .map(|b| GLYPHS.iter().position(|g| g == b).unwrap() as u8)
            .collect();
        assert_eq!(tail, origin);
    }

    #[test]
    fn reference_address() {
        let address = generate_address(250.0, 0.0, -340.0, "space1", &[0]).unwrap();
        assert_eq!(address, "N1CVYB0");
    }

    #[test]
    fn more_reference_addresses() {
        assert_eq!(
            generate_address(0.0, 0.0, 0.0, "space1", &[0]).unwrap(),
            "I32GLD0"
        );
        assert_eq!(
            generate_address(250.0, 0.0, -340.0, "space2", &[0]).unwrap(),
            "L1YF970"
        );
        assert_eq!(
            generate_address(250.0, 0.0, -340.0, "space1", &[1, 2, 3]).unwrap(),
            "N4CVYB123"
        );
        assert_eq!(generate_address(-250.0, 0.0, 0.0, "s", &[0]).unwrap(), "YFOX490");
        assert_eq!(generate_address(0.0, 0.0, 0.0, "", &[0]).unwrap(), "I-8FRS0");
    }

    #[test]
    fn same_cell_same_address() {
        let a = generate_address(250.0, 0.0, -340.0, "space1", &[0]).unwrap();
        let b = generate_address(300.0, 0.0, -300.0, "space1", &[0]).unwrap();
        let c = generate_address(349.9, 49.0, -251.0, "space1", &[0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn deterministic() {
        for i in 0..20 {
            let x = i as f64 * 137.5 - 1000.0;
            let first = generate_address(x, -x, x * 2.0, "space", &[5, 7]).unwrap();
            let second = generate_address(x, -x, x * 2.0, "space", &[5, 7]).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn empty_origin_defaults_to_zero() {
        let empty = generate_address(10.0, 20.0, 30.0, "space1", &[]).unwrap();
        let zero = generate_address(10.0, 20.0, 30.0, "space1", &[0]).unwrap();
        assert_eq!(empty, zero);
        assert!(empty.ends_with('0'));
    }

    #[test]
    fn digits_never_collide() {
        let origins: Vec<Vec<u8>> = vec![
            vec![0],
            vec![38],
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
            (0..33).collect(),
            (6..39).collect(),
            (0..39).step_by(2).collect(),
        ];
        for origin in &origins {
            for i in 0..50 {
                let v = i as f64 * 211.0;
                let space = format!("space{}", i % 4);
                let address = generate_address(v, v * -0.5, 1000.0 - v, &space, origin).unwrap();
                assert_well_formed(&address, origin);
            }
        }
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let err = generate_address(f64::NAN, 0.0, 0.0, "s", &[0]).unwrap_err();
        assert!(matches!(err, AddressError::NonFiniteCoordinate { axis: 'x', .. }));
        let err = generate_address(0.0, 0.0, f64::INFINITY, "s", &[0]).unwrap_err();
        assert!(matches!(err, AddressError::NonFiniteCoordinate { axis: 'z', .. }));
    }

    #[test]
    fn rejects_coordinates_beyond_exact_range() {
        let err = generate_address(0.0, 1e19, 0.0, "s", &[0]).unwrap_err();
        assert!(matches!(err, AddressError::CoordinateOutOfRange { axis: 'y', .. }));
        let err = generate_address(0.0, 0.0, -2e19, "s", &[0]).unwrap_err();
        assert!(matches!(err, AddressError::CoordinateOutOfRange { axis: 'z', .. }));

        // Large but in range: neighbouring cells still get different keys
        let a = generate_address(1e15, 0.0, 0.0, "s", &[0]).unwrap();
        let b = generate_address(1e15 + GRID_SIZE, 0.0, 0.0, "s", &[0]).unwrap();
        assert_ne!(a, b);
        assert!(generate_address(MAX_COORDINATE, 0.0, 0.0, "s", &[0]).is_ok());
    }

    #[test]
    fn rejects_bad_origins() {
        assert_eq!(
            generate_address(0.0, 0.0, 0.0, "s", &[39]).unwrap_err(),
            AddressError::OriginDigitOutOfRange(39)
        );
        let crowded: Vec<u8> = (0..34).collect();
        assert_eq!(
            generate_address(0.0, 0.0, 0.0, "s", &crowded).unwrap_err(),
            AddressError::OriginTooLarge(34)
        );
    }

    #[test]
    fn quantize_rounds_half_up() {
        assert_eq!(quantize(250.0), 300);
        assert_eq!(quantize(-340.0), -300);
        assert_eq!(quantize(-250.0), -200);
        assert_eq!(quantize(-20.0), 0);
        assert_eq!(quantize(49.99), 0);
    }

    #[test]
    fn rebase_handles_wide_numbers() {
        assert_eq!(rebase(&[0], 10, 39), vec![0]);
        assert_eq!(rebase(&[3, 9], 10, 39), vec![1, 0]);
        assert_eq!(rebase(&[1, 0, 0], 256, 10), vec![6, 5, 5, 3, 6]);
        let digest = [0xffu8; 32];
        let decimal = rebase(&digest, 256, 10);
        assert_eq!(decimal.len(), 78);
        assert_eq!(rebase(&decimal, 10, 256), digest.to_vec());
    }
}
