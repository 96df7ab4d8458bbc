// Pcmwav -- A PCM wav codec in Rust
// Copyright 2024 The pcmwav developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Conversion between sample bytes, raw integers and physical values.

use super::{Error, Result};

#[inline(always)]
fn le_bytes<const N: usize>(span: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&span[..N]);
    buf
}

/// Returns the `width` bytes at `offset`, or an error if the span ends first.
#[inline(always)]
fn sample_range(len: usize, offset: usize, bytes_per_sample: u16) -> Result<std::ops::Range<usize>> {
    let width = match bytes_per_sample {
        1 | 2 | 4 | 8 => bytes_per_sample as usize,
        n => return Err(Error::UnsupportedWidth(n)),
    };
    match offset.checked_add(width) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(Error::FormatError("sample extends past the end of the buffer")),
    }
}

/// Decodes the little-endian signed integer of `bytes_per_sample` bytes that
/// starts at `offset` in `span`.
///
/// Widths of 1, 2, 4 and 8 bytes are supported, anything else yields
/// `Error::UnsupportedWidth`. A span that ends before the sample does yields
/// `Error::FormatError`.
#[inline]
pub fn decode(span: &[u8], offset: usize, bytes_per_sample: u16) -> Result<i64> {
    let span = &span[sample_range(span.len(), offset, bytes_per_sample)?];
    match bytes_per_sample {
        1 => Ok(span[0] as i8 as i64),
        2 => Ok(i16::from_le_bytes(le_bytes(span)) as i64),
        4 => Ok(i32::from_le_bytes(le_bytes(span)) as i64),
        _ => Ok(i64::from_le_bytes(le_bytes(span))),
    }
}

/// Encodes `value` as a little-endian signed integer of `bytes_per_sample`
/// bytes at `offset` in `span`.
///
/// The value is truncated to the target width, there is no range check. Use a
/// [`Scale`] to map physical values into range before encoding.
#[inline]
pub fn encode(value: i64, span: &mut [u8], offset: usize, bytes_per_sample: u16) -> Result<()> {
    let range = sample_range(span.len(), offset, bytes_per_sample)?;
    let span = &mut span[range];
    match bytes_per_sample {
        1 => span[0] = value as i8 as u8,
        2 => span.copy_from_slice(&(value as i16).to_le_bytes()),
        4 => span.copy_from_slice(&(value as i32).to_le_bytes()),
        _ => span.copy_from_slice(&value.to_le_bytes()),
    }
    Ok(())
}

/// The largest positive raw value of a signed sample: `2^(bits - 1) - 1`.
pub fn channel_amplitude(bits_per_sample: u16) -> i64 {
    match bits_per_sample {
        0 => 0,
        64..=u16::MAX => i64::MAX,
        n => (1i64 << (n - 1)) - 1,
    }
}

/// Converts a raw sample to a physical value: `raw * resolution`.
#[inline]
pub fn to_physical(raw: i64, resolution: f64) -> f64 {
    raw as f64 * resolution
}

/// Converts a physical value to a raw sample: `round(physical / resolution)`.
///
/// Ties round to even. Values beyond the `i64` range saturate.
#[inline]
pub fn to_raw(physical: f64, resolution: f64) -> i64 {
    (physical * (1.0 / resolution)).round_ties_even() as i64
}

/// A linear mapping between raw samples and a physical quantity.
///
/// The full-scale raw value of a channel (see [`channel_amplitude`])
/// corresponds to `amplitude`, and a raw value of zero corresponds to
/// `offset`. Physical values outside `[-amplitude, amplitude]` are clamped
/// before they are quantized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    amplitude: f64,
    offset: f64,
}

impl Scale {
    /// Creates a scale, rejecting non-finite or non-positive amplitudes and
    /// non-finite offsets.
    pub fn new(amplitude: f64, offset: f64) -> Result<Scale> {
        if !amplitude.is_finite() {
            return Err(Error::InvalidScale("amplitude must be finite"));
        }
        if amplitude <= f64::EPSILON {
            return Err(Error::InvalidScale("amplitude must be positive"));
        }
        if !offset.is_finite() {
            return Err(Error::InvalidScale("offset must be finite"));
        }
        Ok(Scale {
            amplitude: amplitude,
            offset: offset,
        })
    }

    /// A scale with the given amplitude and no offset.
    pub fn with_amplitude(amplitude: f64) -> Result<Scale> {
        Scale::new(amplitude, 0.0)
    }

    /// The physical value of the full-scale raw sample.
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// The physical value of the raw sample 0.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// The physical size of one quantization step at the given bit depth.
    pub fn resolution(&self, bits_per_sample: u16) -> f64 {
        self.amplitude / channel_amplitude(bits_per_sample) as f64
    }

    /// Maps a raw sample to its physical value.
    pub fn to_physical(&self, raw: i64, bits_per_sample: u16) -> f64 {
        to_physical(raw, self.resolution(bits_per_sample)) + self.offset
    }

    /// Clamps, shifts and quantizes a physical value to a raw sample.
    pub fn to_raw(&self, value: f64, bits_per_sample: u16) -> i64 {
        let clamped = value.max(-self.amplitude).min(self.amplitude);
        to_raw(clamped - self.offset, self.resolution(bits_per_sample))
    }
}

/// A numeric type that can be written as a sample.
///
/// Integers are written as raw samples unchanged. Floating point values are
/// quantized through the writer's [`Scale`] if it has one, and rounded to the
/// nearest integer otherwise.
pub trait SampleValue: Copy {
    /// Converts the value to a raw sample for the given bit depth.
    fn to_raw(self, scale: Option<&Scale>, bits_per_sample: u16) -> i64;

    /// Whether the value can be converted at all. Only floats can fail this.
    #[inline(always)]
    fn is_finite(self) -> bool {
        true
    }
}

macro_rules! impl_raw_sample_value {
    ($($t:ty),*) => {
        $(
            impl SampleValue for $t {
                #[inline(always)]
                fn to_raw(self, _: Option<&Scale>, _: u16) -> i64 {
                    self as i64
                }
            }
        )*
    }
}

impl_raw_sample_value!(i8, i16, i32, i64, u8, u16, u32);

impl SampleValue for f64 {
    #[inline]
    fn to_raw(self, scale: Option<&Scale>, bits_per_sample: u16) -> i64 {
        match scale {
            Some(scale) => scale.to_raw(self, bits_per_sample),
            None => self.round_ties_even() as i64,
        }
    }

    #[inline(always)]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

impl SampleValue for f32 {
    #[inline]
    fn to_raw(self, scale: Option<&Scale>, bits_per_sample: u16) -> i64 {
        (self as f64).to_raw(scale, bits_per_sample)
    }

    #[inline(always)]
    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }
}

#[test]
fn decode_is_signed_little_endian() {
    assert_eq!(decode(&[0xff], 0, 1).unwrap(), -1);
    assert_eq!(decode(&[0x80], 0, 1).unwrap(), -128);
    assert_eq!(decode(&[0x00, 0x00, 0xfe, 0xff], 2, 2).unwrap(), -2);
    assert_eq!(decode(&[0x01, 0x02, 0x03, 0x04], 0, 4).unwrap(), 0x04030201);
    assert_eq!(decode(&i64::MIN.to_le_bytes(), 0, 8).unwrap(), i64::MIN);
}

#[test]
fn unsupported_width_is_an_error() {
    let mut buf = [0u8; 3];
    match decode(&buf, 0, 3) {
        Err(Error::UnsupportedWidth(3)) => {}
        other => panic!("expected UnsupportedWidth, got {:?}", other),
    }
    assert!(encode(1, &mut buf, 0, 3).is_err());
}

#[test]
fn short_span_is_an_error() {
    let mut buf = [0u8; 3];
    match decode(&buf, 2, 2) {
        Err(Error::FormatError(..)) => {}
        other => panic!("expected FormatError, got {:?}", other),
    }
    assert!(decode(&buf, usize::MAX, 8).is_err());
    assert!(encode(1, &mut buf, 0, 4).is_err());
    assert!(encode(1, &mut buf, 3, 1).is_err());
    assert_eq!(buf, [0, 0, 0]);
    encode(-1, &mut buf, 1, 2).unwrap();
    assert_eq!(buf, [0, 0xff, 0xff]);
}

#[test]
fn only_finite_floats_are_convertible() {
    assert!(SampleValue::is_finite(1.5f64));
    assert!(!SampleValue::is_finite(f64::NAN));
    assert!(!SampleValue::is_finite(f32::NEG_INFINITY));
    assert!(SampleValue::is_finite(i16::MIN));
}

#[test]
fn encode_inverts_decode_for_every_width() {
    let cases: &[(u16, i64)] = &[(1, -128), (1, 127), (2, -32768), (2, 12345),
                                 (4, i32::MIN as i64), (4, -7), (8, i64::MAX), (8, -3)];
    for &(width, value) in cases {
        let mut buf = [0u8; 16];
        encode(value, &mut buf, 3, width).unwrap();
        assert_eq!(decode(&buf, 3, width).unwrap(), value);
    }
}

#[test]
fn encode_wraps_out_of_range_values() {
    let mut buf = [0u8; 2];
    encode(32768, &mut buf, 0, 2).unwrap();
    assert_eq!(decode(&buf, 0, 2).unwrap(), -32768);
}

#[test]
fn verify_channel_amplitude() {
    assert_eq!(channel_amplitude(8), 127);
    assert_eq!(channel_amplitude(16), 32767);
    assert_eq!(channel_amplitude(32), i32::MAX as i64);
    assert_eq!(channel_amplitude(64), i64::MAX);
}

#[test]
fn scale_rejects_invalid_parameters() {
    assert!(Scale::new(f64::NAN, 0.0).is_err());
    assert!(Scale::new(f64::INFINITY, 0.0).is_err());
    assert!(Scale::new(0.0, 0.0).is_err());
    assert!(Scale::new(-1.0, 0.0).is_err());
    assert!(Scale::new(1.0, f64::NAN).is_err());
    assert!(Scale::new(1.0, 0.5).is_ok());
}

#[test]
fn scale_clamps_before_quantizing() {
    let scale = Scale::with_amplitude(2.0).unwrap();
    assert_eq!(scale.to_raw(2.0, 16), 32767);
    assert_eq!(scale.to_raw(100.0, 16), 32767);
    assert_eq!(scale.to_raw(-100.0, 16), -32767);
    assert_eq!(scale.to_raw(0.0, 16), 0);
}

#[test]
fn scale_round_trip_is_within_one_step() {
    let scale = Scale::new(5.0, 0.25).unwrap();
    let step = scale.resolution(16);
    for i in -40..40 {
        let value = i as f64 * 0.113;
        let expected = value.max(-5.0).min(5.0);
        let back = scale.to_physical(scale.to_raw(value, 16), 16);
        assert!((back - expected).abs() <= step, "{} came back as {}", value, back);
    }
}

#[test]
fn unscaled_floats_round_half_to_even() {
    assert_eq!(2.5f64.to_raw(None, 16), 2);
    assert_eq!(3.5f64.to_raw(None, 16), 4);
    assert_eq!((-1.4f32).to_raw(None, 16), -1);
    assert_eq!(17i16.to_raw(Some(&Scale::with_amplitude(1.0).unwrap()), 16), 17);
}
