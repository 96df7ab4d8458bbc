// Pcmwav -- A PCM wav codec in Rust
// Copyright 2024 The pcmwav developers

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Building blocks for working with the canonical 44-byte WAVE header.
//!
//! A PCM wav file as handled by this crate consists of exactly one `fmt `
//! chunk followed by exactly one `data` chunk, which gives a header with a
//! fixed layout:
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!      4     4  chunk size (file length - 8)
//!      8     4  "WAVE"
//!     12     4  "fmt "
//!     16     4  fmt chunk size (16 for PCM)
//!     20     2  audio format (1 for PCM)
//!     22     2  channels
//!     24     4  sample rate
//!     28     4  byte rate (sample rate * block align)
//!     32     2  block align (channels * bytes per sample)
//!     34     2  bits per sample
//!     36     4  "data"
//!     40     4  data chunk size (file length - 44)
//! ```
//!
//! All integers are little endian. The payload that follows the header is a
//! sequence of frames of `block_align` bytes each.

use std::io;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::read::{read_fill_async, ReadExt};
use crate::{Error, Result};

/// The length in bytes of the header, which is also the offset of the data.
pub const HEADER_LEN: usize = 44;

/// The `wFormatTag` value for integer PCM.
pub const FORMAT_PCM: u16 = 0x0001;

/// The size of the `fmt ` chunk body for integer PCM.
pub const PCM_FMT_LEN: u32 = 16;

trait Bytes {
    fn read_4_bytes(&self) -> [u8; 4];
    fn read_le_u16(&self) -> u16;
    fn read_le_u32(&self) -> u32;

    fn write_le_u16(&mut self, x: u16);
    fn write_le_u32(&mut self, x: u32);
}

impl Bytes for [u8] {
    #[inline(always)]
    fn read_4_bytes(&self) -> [u8; 4] {
        [self[0], self[1], self[2], self[3]]
    }

    #[inline(always)]
    fn read_le_u16(&self) -> u16 {
        u16::from_le_bytes([self[0], self[1]])
    }

    #[inline(always)]
    fn read_le_u32(&self) -> u32 {
        u32::from_le_bytes(self.read_4_bytes())
    }

    #[inline(always)]
    fn write_le_u16(&mut self, x: u16) {
        self[..2].copy_from_slice(&x.to_le_bytes());
    }

    #[inline(always)]
    fn write_le_u32(&mut self, x: u32) {
        self[..4].copy_from_slice(&x.to_le_bytes());
    }
}

/// The fixed header of a PCM wav file.
///
/// A header is either parsed from a byte source with [`Header::read`] (or one
/// of its siblings), in which case all of its invariants have been checked,
/// or built for writing with [`Header::pcm`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// The length of the file minus the 8 bytes of the `RIFF` tag and this field.
    pub chunk_size: u32,

    /// The size of the `fmt ` chunk body, 16 for PCM.
    pub fmt_size: u32,

    /// The format tag, [`FORMAT_PCM`] for the only format this crate handles.
    pub audio_format: u16,

    /// The number of channels. Never 0 in a parsed header.
    pub channels: u16,

    /// The number of frames per second.
    pub sample_rate: u32,

    /// The number of payload bytes per second.
    pub byte_rate: u32,

    /// The number of bytes in one frame, across all channels.
    pub block_align: u16,

    /// The width of one channel's sample in bits: 8, 16, 32 or 64.
    pub bits_per_sample: u16,

    /// The length of the payload in bytes.
    pub data_len: u32,
}

impl Header {
    /// Builds a PCM header for a payload of `data_len` bytes.
    ///
    /// The byte rate is derived from the sample rate and block align, and the
    /// `fmt ` size is fixed at 16. The arguments are not validated; writers
    /// validate their [`WavSpec`](crate::WavSpec) up front instead.
    pub fn pcm(channels: u16,
               sample_rate: u32,
               block_align: u16,
               bits_per_sample: u16,
               data_len: u32)
               -> Header {
        Header {
            chunk_size: data_len.wrapping_add(HEADER_LEN as u32 - 8),
            fmt_size: PCM_FMT_LEN,
            audio_format: FORMAT_PCM,
            channels: channels,
            sample_rate: sample_rate,
            byte_rate: sample_rate.wrapping_mul(block_align as u32),
            block_align: block_align,
            bits_per_sample: bits_per_sample,
            data_len: data_len,
        }
    }

    /// Parses and validates a header.
    ///
    /// `file_len` is the total length of the source if it is known
    /// independently, for example from file metadata. When it is given, the
    /// size fields must agree with it. When it is `None`, only the relations
    /// between the fields themselves are checked.
    pub fn from_bytes(bytes: &[u8; HEADER_LEN], file_len: Option<u64>) -> Result<Header> {
        check_file_len(file_len)?;
        if &bytes.read_4_bytes() != b"RIFF" {
            return Err(Error::FormatError("no RIFF tag found"));
        }
        let chunk_size = bytes[4..].read_le_u32();
        if let Some(len) = file_len {
            if chunk_size as u64 != len - 8 {
                return Err(Error::InconsistentHeader {
                    field: "chunk size",
                    expected: len - 8,
                    found: chunk_size as u64,
                });
            }
        }
        if &bytes[8..].read_4_bytes() != b"WAVE" {
            return Err(Error::FormatError("no WAVE tag found"));
        }
        if &bytes[12..].read_4_bytes() != b"fmt " {
            return Err(Error::FormatError("no fmt tag found"));
        }

        let fmt_size = bytes[16..].read_le_u32();
        let audio_format = bytes[20..].read_le_u16();
        if audio_format != FORMAT_PCM {
            return Err(Error::Unsupported("only integer PCM audio is supported"));
        }
        if fmt_size != PCM_FMT_LEN {
            return Err(Error::InconsistentHeader {
                field: "fmt chunk size",
                expected: PCM_FMT_LEN as u64,
                found: fmt_size as u64,
            });
        }

        let channels = bytes[22..].read_le_u16();
        // Negative counts in the signed on-disk field land above i16::MAX.
        if channels == 0 || channels > i16::MAX as u16 {
            return Err(Error::FormatError("channel count must be positive"));
        }

        let sample_rate = bytes[24..].read_le_u32();
        let byte_rate = bytes[28..].read_le_u32();
        let block_align = bytes[32..].read_le_u16();
        let bits_per_sample = bytes[34..].read_le_u16();

        match bits_per_sample {
            8 | 16 | 32 | 64 => {}
            _ => return Err(Error::FormatError("bits per sample is not 8, 16, 32 or 64")),
        }
        if sample_rate == 0 {
            return Err(Error::FormatError("sample rate is 0"));
        }

        let expected_align = channels as u64 * (bits_per_sample / 8) as u64;
        if block_align as u64 != expected_align {
            return Err(Error::InconsistentHeader {
                field: "block align",
                expected: expected_align,
                found: block_align as u64,
            });
        }

        // The byte rate is redundant. It is validated only to reject
        // ill-formed files early.
        if byte_rate / block_align as u32 != sample_rate {
            return Err(Error::InconsistentHeader {
                field: "byte rate",
                expected: sample_rate as u64 * block_align as u64,
                found: byte_rate as u64,
            });
        }

        if &bytes[36..].read_4_bytes() != b"data" {
            return Err(Error::FormatError("no data tag found"));
        }
        let data_len = bytes[40..].read_le_u32();
        if let Some(len) = file_len {
            if data_len as u64 != len - HEADER_LEN as u64 {
                return Err(Error::InconsistentHeader {
                    field: "data chunk size",
                    expected: len - HEADER_LEN as u64,
                    found: data_len as u64,
                });
            }
        }

        let header = Header {
            chunk_size: chunk_size,
            fmt_size: fmt_size,
            audio_format: audio_format,
            channels: channels,
            sample_rate: sample_rate,
            byte_rate: byte_rate,
            block_align: block_align,
            bits_per_sample: bits_per_sample,
            data_len: data_len,
        };
        debug!("parsed wav header: {} channel(s), {} Hz, {} bits, {} frames",
               channels, sample_rate, bits_per_sample, header.frame_count());
        Ok(header)
    }

    /// Reads exactly 44 bytes from `reader` and parses them.
    ///
    /// See [`Header::from_bytes`] for the meaning of `file_len`.
    pub fn read<R: io::Read>(reader: &mut R, file_len: Option<u64>) -> Result<Header> {
        let mut bytes = [0u8; HEADER_LEN];
        let n = reader.read_fill(&mut bytes)?;
        check_filled(n)?;
        Header::from_bytes(&bytes, file_len)
    }

    /// Asynchronous counterpart of [`Header::read`].
    pub async fn read_async<R>(reader: &mut R, file_len: Option<u64>) -> Result<Header>
        where R: AsyncRead + Unpin
    {
        let mut bytes = [0u8; HEADER_LEN];
        let n = read_fill_async(reader, &mut bytes).await?;
        check_filled(n)?;
        Header::from_bytes(&bytes, file_len)
    }

    /// Serializes the header in the layout that [`Header::from_bytes`] parses.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut result = [0u8; HEADER_LEN];
        result[0..4].copy_from_slice(b"RIFF");
        result[4..].write_le_u32(self.chunk_size);
        result[8..12].copy_from_slice(b"WAVE");
        result[12..16].copy_from_slice(b"fmt ");
        result[16..].write_le_u32(self.fmt_size);
        result[20..].write_le_u16(self.audio_format);
        result[22..].write_le_u16(self.channels);
        result[24..].write_le_u32(self.sample_rate);
        result[28..].write_le_u32(self.byte_rate);
        result[32..].write_le_u16(self.block_align);
        result[34..].write_le_u16(self.bits_per_sample);
        result[36..40].copy_from_slice(b"data");
        result[40..].write_le_u32(self.data_len);
        result
    }

    /// Writes the serialized header to `writer`.
    pub fn write_to<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Asynchronous counterpart of [`Header::write_to`].
    pub async fn write_to_async<W>(&self, writer: &mut W) -> Result<()>
        where W: AsyncWrite + Unpin
    {
        writer.write_all(&self.to_bytes()).await?;
        Ok(())
    }

    /// The width of one channel's sample in bytes.
    #[inline]
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// The number of whole frames in the payload.
    #[inline]
    pub fn frame_count(&self) -> u32 {
        match self.block_align {
            0 => 0,
            n => self.data_len / n as u32,
        }
    }

    /// The length of the payload in seconds, as declared by the size fields.
    pub fn time_len(&self) -> f64 {
        match self.byte_rate {
            0 => 0.0,
            n => self.data_len as f64 / n as f64,
        }
    }
}

fn check_file_len(file_len: Option<u64>) -> Result<()> {
    match file_len {
        Some(0) => Err(Error::FormatError("the source is empty")),
        Some(n) if n < HEADER_LEN as u64 => {
            Err(Error::FormatError("the source is too short to hold a header"))
        }
        _ => Ok(()),
    }
}

fn check_filled(n: usize) -> Result<()> {
    match n {
        0 => Err(Error::FormatError("the source is empty")),
        n if n < HEADER_LEN => Err(Error::FormatError("the source is too short to hold a header")),
        _ => Ok(()),
    }
}

#[cfg(test)]
fn stereo_16() -> Header {
    Header::pcm(2, 44100, 4, 16, 400)
}

#[test]
fn pcm_header_serializes_to_canonical_layout() {
    let header = Header::pcm(1, 16000, 2, 16, 0x10);
    assert_eq!(&header.to_bytes()[..], &b"RIFF\x34\x00\x00\x00WAVE\
fmt \x10\x00\x00\x00\x01\x00\x01\x00\x80\x3e\x00\x00\x00\x7d\x00\x00\x02\x00\x10\x00\
data\x10\x00\x00\x00"[..]);
}

#[test]
fn parse_accepts_what_serialize_produces() {
    let header = stereo_16();
    let parsed = Header::from_bytes(&header.to_bytes(), Some(444)).unwrap();
    assert_eq!(parsed, header);
    assert_eq!(parsed.frame_count(), 100);
    assert_eq!(parsed.bytes_per_sample(), 2);
    assert_eq!(parsed.byte_rate, 176_400);
}

#[test]
fn parse_rejects_rifx() {
    let mut bytes = stereo_16().to_bytes();
    bytes[3] = b'X';
    match Header::from_bytes(&bytes, None) {
        Err(Error::FormatError(..)) => {}
        other => panic!("expected a format error, got {:?}", other),
    }
}

#[test]
fn parse_rejects_zero_channels() {
    let mut bytes = stereo_16().to_bytes();
    bytes[22] = 0;
    bytes[23] = 0;
    match Header::from_bytes(&bytes, None) {
        Err(Error::FormatError(..)) => {}
        other => panic!("expected a format error, got {:?}", other),
    }
}

#[test]
fn parse_rejects_inconsistent_block_align() {
    let mut bytes = stereo_16().to_bytes();
    bytes[32] = 3;
    match Header::from_bytes(&bytes, None) {
        Err(Error::InconsistentHeader { field: "block align", expected: 4, found: 3 }) => {}
        other => panic!("expected a block align mismatch, got {:?}", other),
    }
}

#[test]
fn parse_rejects_inconsistent_byte_rate() {
    let mut header = stereo_16();
    header.byte_rate += 8;
    match Header::from_bytes(&header.to_bytes(), None) {
        Err(Error::InconsistentHeader { field: "byte rate", .. }) => {}
        other => panic!("expected a byte rate mismatch, got {:?}", other),
    }
}

#[test]
fn parse_rejects_unknown_bit_depth() {
    let header = Header::pcm(1, 8000, 3, 24, 0);
    assert!(Header::from_bytes(&header.to_bytes(), None).is_err());
}

#[test]
fn parse_checks_sizes_only_when_length_is_known() {
    let bytes = stereo_16().to_bytes();
    assert!(Header::from_bytes(&bytes, None).is_ok());
    match Header::from_bytes(&bytes, Some(440)) {
        Err(Error::InconsistentHeader { field: "chunk size", expected: 432, found: 436 }) => {}
        other => panic!("expected a chunk size mismatch, got {:?}", other),
    }
}

#[test]
fn read_rejects_empty_and_short_sources() {
    let mut empty = io::Cursor::new(Vec::new());
    match Header::read(&mut empty, None) {
        Err(Error::FormatError("the source is empty")) => {}
        other => panic!("expected an empty source error, got {:?}", other),
    }
    let mut short = io::Cursor::new(vec![0u8; 20]);
    assert!(Header::read(&mut short, Some(20)).is_err());
}

#[test]
fn derived_properties() {
    let header = Header::pcm(1, 44100, 2, 16, 441_000);
    assert_eq!(header.frame_count(), 220_500);
    assert_eq!(header.time_len(), 5.0);
}
