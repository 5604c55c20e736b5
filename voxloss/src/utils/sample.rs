//! Conversions between 16-bit PCM and normalized floating point.

const SCALE: f32 = 32768.0;

/// Maps a 16-bit sample into `[-1.0, 1.0)`.
#[inline(always)]
pub fn to_float(sample: i16) -> f32 {
    sample as f32 / SCALE
}

/// Scales a normalized sample back to 16 bits, saturating instead of wrapping.
#[inline(always)]
pub fn to_i16_saturating(value: f32) -> i16 {
    let scaled = value * SCALE;
    if scaled >= i16::MAX as f32 {
        i16::MAX
    } else if scaled <= i16::MIN as f32 {
        i16::MIN
    } else {
        scaled as i16
    }
}

#[test]
fn test_saturation() {
    assert_eq!(to_i16_saturating(1.5), i16::MAX);
    assert_eq!(to_i16_saturating(-1.5), i16::MIN);
    assert_eq!(to_i16_saturating(to_float(1234)), 1234);
    assert_eq!(to_i16_saturating(to_float(-32768)), -32768);
    assert_eq!(to_i16_saturating(f32::NAN), 0);
}
