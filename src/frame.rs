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

use std::fmt;
use std::ptr;

use super::sample;
use super::{Error, Result};

const TICKS_PER_SECOND: u64 = 10_000_000;

/// The samples of all channels at one instant, borrowed from a byte buffer.
///
/// A frame does not copy or decode anything up front; samples are decoded on
/// access. Two frames compare equal only if they view the very same bytes
/// with the same time and layout. Frames read separately from the same file
/// are therefore never equal, compare their `to_vec()` instead.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    time: f64,
    channels: u16,
    bytes_per_sample: u16,
    data: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Creates a frame over `data`, which holds one sample per channel.
    ///
    /// The width of a sample is `data.len() / channels`, and must be 1, 2, 4
    /// or 8 bytes.
    pub fn new(time: f64, channels: u16, data: &'a [u8]) -> Result<Frame<'a>> {
        if channels == 0 {
            return Err(Error::FormatError("a frame needs at least one channel"));
        }
        if data.len() % channels as usize != 0 {
            return Err(Error::ArityMismatch {
                expected: channels as usize,
                found: data.len(),
            });
        }
        let width = data.len() / channels as usize;
        match width {
            1 | 2 | 4 | 8 => {}
            n => return Err(Error::UnsupportedWidth(n as u16)),
        }
        Ok(Frame {
            time: time,
            channels: channels,
            bytes_per_sample: width as u16,
            data: data,
        })
    }

    /// The time of the frame in seconds since the start of the payload.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The number of channels in the frame.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// The encoded bytes of the frame.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Decodes the sample of one channel.
    pub fn channel(&self, channel: u16) -> Result<i64> {
        if channel >= self.channels {
            return Err(Error::ChannelOutOfRange {
                channel: channel,
                channels: self.channels,
            });
        }
        let width = self.bytes_per_sample;
        sample::decode(self.data, channel as usize * width as usize, width)
    }

    /// Decodes the samples of all channels into `out`.
    ///
    /// Only the first `channels()` elements of `out` are written.
    pub fn decode_into(&self, out: &mut [i64]) -> Result<()> {
        let width = self.bytes_per_sample;
        for (i, slot) in out.iter_mut().take(self.channels as usize).enumerate() {
            *slot = sample::decode(self.data, i * width as usize, width)?;
        }
        Ok(())
    }

    /// Decodes the samples of all channels.
    pub fn to_vec(&self) -> Vec<i64> {
        let mut out = vec![0; self.channels as usize];
        // The width was validated on construction, so decoding cannot fail.
        let _ = self.decode_into(&mut out);
        out
    }
}

impl<'a> PartialEq for Frame<'a> {
    fn eq(&self, other: &Frame<'a>) -> bool {
        self.time == other.time
            && self.channels == other.channels
            && self.bytes_per_sample == other.bytes_per_sample
            && ptr::eq(self.data, other.data)
    }
}

impl<'a> fmt::Display for Frame<'a> {
    /// Formats as `hh:mm:ss.fffffff#v0|v1|...`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Whole ticks of 100 ns, so rounding never carries into a field.
        let ticks = (self.time.max(0.0) * TICKS_PER_SECOND as f64).round() as u64;
        let seconds = ticks / TICKS_PER_SECOND;
        write!(f,
               "{:02}:{:02}:{:02}.{:07}#",
               seconds / 3600,
               seconds / 60 % 60,
               seconds % 60,
               ticks % TICKS_PER_SECOND)?;
        for (i, value) in self.to_vec().iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

#[test]
fn frame_decodes_each_channel() {
    let data = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80];
    let frame = Frame::new(0.5, 3, &data).unwrap();
    assert_eq!(frame.channel(0).unwrap(), 1);
    assert_eq!(frame.channel(1).unwrap(), -1);
    assert_eq!(frame.channel(2).unwrap(), -32768);
    assert_eq!(frame.to_vec(), vec![1, -1, -32768]);
    match frame.channel(3) {
        Err(Error::ChannelOutOfRange { channel: 3, channels: 3 }) => {}
        other => panic!("expected ChannelOutOfRange, got {:?}", other),
    }
}

#[test]
fn frame_rejects_odd_layouts() {
    assert!(Frame::new(0.0, 0, &[0, 0]).is_err());
    assert!(Frame::new(0.0, 2, &[0, 0, 0]).is_err());
    assert!(Frame::new(0.0, 1, &[0, 0, 0]).is_err());
}

#[test]
fn frame_equality_is_by_identity() {
    let a = [1u8, 0, 2, 0];
    let b = a;
    let fa = Frame::new(0.0, 2, &a).unwrap();
    let fb = Frame::new(0.0, 2, &b).unwrap();
    assert_eq!(fa, Frame::new(0.0, 2, &a).unwrap());
    assert!(fa != fb);
    assert_eq!(fa.to_vec(), fb.to_vec());
}

#[test]
fn frame_display() {
    let data = [0x02, 0x00, 0xfd, 0xff];
    let frame = Frame::new(61.5, 2, &data).unwrap();
    assert_eq!(frame.to_string(), "00:01:01.5000000#2|-3");
}

#[test]
fn frame_display_carries_rounding_into_minutes() {
    let data = [0x01];
    let frame = Frame::new(59.99999999, 1, &data).unwrap();
    assert_eq!(frame.to_string(), "00:01:00.0000000#1");
    let frame = Frame::new(3599.99999996, 1, &data).unwrap();
    assert_eq!(frame.to_string(), "01:00:00.0000000#1");
    let frame = Frame::new(1.0 / 44100.0, 1, &data).unwrap();
    assert_eq!(frame.to_string(), "00:00:00.0000227#1");
}
