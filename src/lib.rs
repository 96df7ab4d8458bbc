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

//! Pcmwav, a codec for canonical 44-byte-header PCM wav files.
//!
//! Samples are signed little-endian integers of 8, 16, 32 or 64 bits. Files
//! can be read by random access ([`WavReader::frame`]), by lazy enumeration
//! ([`WavReader::samples`] and friends) or a channel at a time
//! ([`WavReader::channel`]), with blocking or asynchronous IO.
//!
//! Examples
//! ========
//!
//! The following example renders a 440 Hz sine wave with an amplitude of 1.0,
//! and stores it as a mono wav file with a sample rate of 44.1 kHz and 16 bits
//! per sample. It then reads the file back and computes its root mean square.
//!
//! ```
//! use std::f64::consts::PI;
//! use pcmwav::{Scale, WavReader, WavSpec, WavWriter};
//!
//! let path = std::env::temp_dir().join("pcmwav-doc-sine.wav");
//! let spec = WavSpec {
//!     channels: 1,
//!     sample_rate: 44100,
//!     bits_per_sample: 16,
//! };
//! let scale = Scale::with_amplitude(1.0).unwrap();
//!
//! let mut writer = WavWriter::create(&path, spec).unwrap().with_scale(scale);
//! for t in (0 .. 44100).map(|x| x as f64 / 44100.0) {
//!     writer.write(&[(t * 440.0 * 2.0 * PI).sin()]).unwrap();
//! }
//! writer.finalize().unwrap();
//!
//! let mut reader = WavReader::open(&path).unwrap().with_scale(scale);
//! assert_eq!(reader.len(), 44100);
//! let values = reader.channel_f64(0).unwrap();
//! let sqr_sum = values.iter().fold(0.0, |sqr_sum, s| sqr_sum + s * s);
//! let rms = (sqr_sum / values.len() as f64).sqrt();
//! assert!((rms - 0.5f64.sqrt()).abs() < 1e-3);
//! # std::fs::remove_file(&path).unwrap();
//! ```

#![warn(missing_docs)]

use std::io;
use std::result;

use thiserror::Error;

mod frame;
mod read;
pub mod sample;
pub mod wav;
mod write;

pub use frame::Frame;
pub use read::{AsyncChannelSamples, AsyncSamples, AsyncSharedSamples, AsyncSource,
               BlockingSource, ChannelSamples, FileSource, ForwardStream, ReadExt,
               ReadOptions, Samples, SeekableStream, SharedSamples, Source, Tracked, WavReader};
pub use sample::{SampleValue, Scale};
pub use wav::Header;
pub use write::{write_file, zip_channels, AsyncWavWriter, DataWriter, WavWriter, ZipChannels};

/// Specifies properties of the audio data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavSpec {
    /// The number of channels.
    pub channels: u16,

    /// The number of frames per second.
    ///
    /// A common value is 44100, this is 44.1 kHz which is used for CD audio.
    pub sample_rate: u32,

    /// The number of bits per sample: 8, 16, 32 or 64.
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    fn default() -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
        }
    }
}

impl WavSpec {
    /// Checks that a header can describe this format.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::InvalidSpec("at least one channel is required"));
        }
        if self.channels > i16::MAX as u16 {
            return Err(Error::InvalidSpec("too many channels"));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidSpec("sample rate must be positive"));
        }
        match self.bits_per_sample {
            8 | 16 | 32 | 64 => {}
            _ => return Err(Error::InvalidSpec("bits per sample must be 8, 16, 32 or 64")),
        }
        let block_align = self.channels as u64 * self.bytes_per_sample() as u64;
        if block_align > u16::MAX as u64 {
            return Err(Error::InvalidSpec("frame does not fit the block align field"));
        }
        if block_align * self.sample_rate as u64 > u32::MAX as u64 {
            return Err(Error::InvalidSpec("byte rate does not fit the byte rate field"));
        }
        Ok(())
    }

    /// The number of bytes used to store one channel's sample.
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// The number of bytes in one frame.
    ///
    /// Only meaningful for a spec that passes [`WavSpec::validate`].
    pub fn block_align(&self) -> u16 {
        self.channels.wrapping_mul(self.bytes_per_sample())
    }
}

/// The error type for operations on readers and writers.
#[derive(Debug, Error)]
pub enum Error {
    /// An IO error occured in the underlying reader or writer.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// Ill-formed wav data was encountered.
    #[error("ill-formed wav file: {0}")]
    FormatError(&'static str),

    /// Two header fields, or a header field and the stream length, disagree.
    #[error("inconsistent {field}: expected {expected}, found {found}")]
    InconsistentHeader {
        /// The header field that is off.
        field: &'static str,
        /// The value implied by the rest of the header or the stream.
        expected: u64,
        /// The value in the header.
        found: u64,
    },

    /// A sample width other than 1, 2, 4 or 8 bytes.
    #[error("unsupported sample width of {0} bytes")]
    UnsupportedWidth(u16),

    /// The operation or format is not supported.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// A writer was asked for a format that cannot be written.
    #[error("invalid wav spec: {0}")]
    InvalidSpec(&'static str),

    /// A scale with unusable parameters.
    #[error("invalid scale: {0}")]
    InvalidScale(&'static str),

    /// A channel index beyond the channel count.
    #[error("channel {channel} out of range for {channels} channels")]
    ChannelOutOfRange {
        /// The requested channel.
        channel: u16,
        /// The number of channels.
        channels: u16,
    },

    /// The number of values does not match the number of channels.
    #[error("expected {expected} values, found {found}")]
    ArityMismatch {
        /// The number of channels.
        expected: usize,
        /// The number of values supplied.
        found: usize,
    },

    /// A sample value that has no raw representation, such as NaN.
    #[error("value for channel {channel} is not finite")]
    InvalidValue {
        /// The channel the value was meant for.
        channel: u16,
    },

    /// A frame index beyond the data.
    #[error("frame {index} out of range for {frames} frames")]
    OutOfRange {
        /// The requested frame.
        index: u64,
        /// The number of frames in the header.
        frames: u64,
    },

    /// The source ended in the middle of a frame.
    #[error("short read at frame {index}: expected {expected} bytes, found {found}")]
    ShortRead {
        /// The frame being read.
        index: u64,
        /// The size of a frame.
        expected: usize,
        /// The number of bytes available.
        found: usize,
    },

    /// The operation was cancelled through its token.
    #[error("operation cancelled")]
    Cancelled,
}

/// A type for results generated by pcmwav where the error type is hard-wired.
pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
fn write_then_read<T, F>(spec: WavSpec, frames: &[Vec<T>], check: F)
    where T: SampleValue,
          F: FnOnce(WavReader<SeekableStream<&mut io::Cursor<Vec<u8>>>>)
{
    let mut buffer = io::Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
        for frame in frames {
            writer.write(frame).unwrap();
        }
        writer.finalize().unwrap();
    }
    buffer.set_position(0);
    let reader = WavReader::new(&mut buffer).unwrap();
    assert_eq!(reader.spec(), spec);
    assert_eq!(reader.len(), frames.len() as u32);
    check(reader);
}

#[test]
fn write_read_i16_is_lossless() {
    let spec = WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
    };
    let frames: Vec<Vec<i16>> = (-1024_i16..1024).map(|s| vec![s, -s]).collect();
    write_then_read(spec, &frames, |mut reader| {
        for (i, expected) in frames.iter().enumerate() {
            let read = reader.frame(i as u32).unwrap().to_vec();
            assert_eq!(read, vec![expected[0] as i64, expected[1] as i64]);
        }
    });
}

#[test]
fn write_read_i8_is_lossless() {
    let spec = WavSpec {
        channels: 16,
        sample_rate: 48000,
        bits_per_sample: 8,
    };
    let frames: Vec<Vec<i8>> = (-128_i16..128)
        .map(|s| (0..16).map(|c| (s + c) as i8).collect())
        .collect();
    write_then_read(spec, &frames, |mut reader| {
        let samples: Vec<Vec<i64>> = reader.samples().unwrap().map(|r| r.unwrap().1).collect();
        assert_eq!(samples.len(), frames.len());
        for (read, expected) in samples.iter().zip(frames.iter()) {
            let expected: Vec<i64> = expected.iter().map(|&x| x as i64).collect();
            assert_eq!(read, &expected);
        }
    });
}

#[test]
fn write_read_i32_is_lossless() {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 32,
    };
    let values = [i32::MIN, -1, 0, 1, i32::MAX, 123_456_789];
    let frames: Vec<Vec<i32>> = values.iter().map(|&v| vec![v]).collect();
    write_then_read(spec, &frames, |mut reader| {
        let read = reader.channel(0).unwrap();
        let expected: Vec<i64> = values.iter().map(|&v| v as i64).collect();
        assert_eq!(read, expected);
    });
}

#[test]
fn write_read_i64_is_lossless() {
    let spec = WavSpec {
        channels: 3,
        sample_rate: 96000,
        bits_per_sample: 64,
    };
    let frames = vec![vec![i64::MIN, 0, i64::MAX], vec![-42, 42, 1 << 40]];
    write_then_read(spec, &frames, |mut reader| {
        assert_eq!(reader.all_channels().unwrap(),
                   vec![vec![i64::MIN, -42], vec![0, 42], vec![i64::MAX, 1 << 40]]);
    });
}

#[test]
fn write_read_scaled_is_within_one_step() {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 1000,
        bits_per_sample: 16,
    };
    let scale = Scale::new(3.0, 0.5).unwrap();
    let values: Vec<f64> = (0..200).map(|i| (i as f64 * 0.05).sin() * 2.4 + 0.5).collect();

    let mut buffer = io::Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap().with_scale(scale);
        for &v in &values {
            writer.write(&[v]).unwrap();
        }
        writer.finalize().unwrap();
    }
    buffer.set_position(0);
    let mut reader = WavReader::new(&mut buffer).unwrap().with_scale(scale);
    let read = reader.channel_f64(0).unwrap();
    let step = scale.resolution(16);
    for (a, b) in values.iter().zip(read.iter()) {
        assert!((a - b).abs() <= step, "{} came back as {}", a, b);
    }
}

#[test]
fn spec_validation() {
    assert!(WavSpec::default().validate().is_ok());
    let bad = [
        WavSpec { channels: 0, ..WavSpec::default() },
        WavSpec { sample_rate: 0, ..WavSpec::default() },
        WavSpec { bits_per_sample: 24, ..WavSpec::default() },
        WavSpec { channels: 10000, bits_per_sample: 64, ..WavSpec::default() },
        WavSpec { channels: 8, sample_rate: u32::MAX, ..WavSpec::default() },
    ];
    for spec in &bad {
        match spec.validate() {
            Err(Error::InvalidSpec(..)) => {}
            other => panic!("expected InvalidSpec for {:?}, got {:?}", spec, other),
        }
    }
}

#[test]
fn error_messages_carry_context() {
    let err = Error::InconsistentHeader {
        field: "block align",
        expected: 4,
        found: 3,
    };
    assert_eq!(err.to_string(), "inconsistent block align: expected 4, found 3");
    let err = Error::from(io::Error::new(io::ErrorKind::Other, "disk on fire"));
    assert_eq!(err.to_string(), "disk on fire");
    let err = Error::InvalidValue { channel: 1 };
    assert_eq!(err.to_string(), "value for channel 1 is not finite");
}
