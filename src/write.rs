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

use std::cmp;
use std::fs;
use std::io;
use std::io::Write;
use std::path;
use std::pin::Pin;
use std::task::{Context, Poll};

use log::{debug, warn};
use tokio::io::{AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::sample::{self, SampleValue, Scale};
use super::wav::{Header, HEADER_LEN};
use super::{Error, Result, WavSpec};

/// The largest payload a header can describe: `ChunkSize` is `data + 36` and
/// must fit in 32 bits.
const MAX_DATA_LEN: u64 = u32::MAX as u64 - (HEADER_LEN as u64 - 8);

/// Turns frames of values into block-aligned bytes and keeps count of them.
///
/// This holds everything the blocking and the asynchronous writer have in
/// common; they only differ in how the block reaches the stream.
#[derive(Debug)]
struct FrameEncoder {
    spec: WavSpec,
    scale: Option<Scale>,

    /// One frame worth of bytes, reused for every frame.
    block: Vec<u8>,

    /// The number of bytes written to the data section.
    data_bytes_written: u64,
}

impl FrameEncoder {
    fn new(spec: WavSpec) -> Result<FrameEncoder> {
        spec.validate()?;
        Ok(FrameEncoder {
            spec: spec,
            scale: None,
            block: vec![0; spec.block_align() as usize],
            data_bytes_written: 0,
        })
    }

    /// Encodes one frame into the block and returns it.
    fn encode<T: SampleValue>(&mut self, values: &[T]) -> Result<&[u8]> {
        let channels = self.spec.channels as usize;
        if values.len() != channels {
            return Err(Error::ArityMismatch {
                expected: channels,
                found: values.len(),
            });
        }
        // Nothing is encoded unless every value is usable.
        if let Some(channel) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidValue { channel: channel as u16 });
        }
        let bits = self.spec.bits_per_sample;
        let width = self.spec.bytes_per_sample();
        for (i, &value) in values.iter().enumerate() {
            let raw = value.to_raw(self.scale.as_ref(), bits);
            sample::encode(raw, &mut self.block, i * width as usize, width)?;
        }
        Ok(&self.block)
    }

    /// Records `n` more bytes of data and returns the time written so far.
    fn commit(&mut self, n: usize) -> f64 {
        self.data_bytes_written += n as u64;
        self.time()
    }

    fn time(&self) -> f64 {
        let frames = self.data_bytes_written / self.spec.block_align() as u64;
        frames as f64 / self.spec.sample_rate as f64
    }

    fn header(&self) -> Result<Header> {
        if self.data_bytes_written > MAX_DATA_LEN {
            return Err(Error::FormatError("data does not fit in a wav file"));
        }
        let spec = &self.spec;
        Ok(Header::pcm(spec.channels,
                       spec.sample_rate,
                       spec.block_align(),
                       spec.bits_per_sample,
                       self.data_bytes_written as u32))
    }

    fn resolution(&self) -> f64 {
        match self.scale {
            Some(ref scale) => scale.resolution(self.spec.bits_per_sample),
            None => 1.0,
        }
    }
}

/// An iterator that steps through several signals in lock-step.
///
/// Every item holds the next value of each signal, in order. Iteration stops
/// as soon as any of the signals runs out.
pub struct ZipChannels<I> {
    signals: Vec<I>,
}

impl<I: Iterator> Iterator for ZipChannels<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Vec<I::Item>> {
        if self.signals.is_empty() {
            return None;
        }
        let mut frame = Vec::with_capacity(self.signals.len());
        for signal in self.signals.iter_mut() {
            frame.push(signal.next()?);
        }
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.signals.is_empty() {
            return (0, Some(0));
        }
        let mut lower = usize::MAX;
        let mut upper: Option<usize> = None;
        for signal in &self.signals {
            let (lo, hi) = signal.size_hint();
            lower = cmp::min(lower, lo);
            upper = match (upper, hi) {
                (Some(a), Some(b)) => Some(cmp::min(a, b)),
                (a, b) => a.or(b),
            };
        }
        (lower, upper)
    }
}

/// Zips one signal per channel into frames.
pub fn zip_channels<S, I>(signals: S) -> ZipChannels<I::IntoIter>
    where S: IntoIterator<Item = I>,
          I: IntoIterator
{
    ZipChannels {
        signals: signals.into_iter().map(|s| s.into_iter()).collect(),
    }
}

/// A write-only view of the data section of a writer.
///
/// Bytes written through it are appended to the payload and counted towards
/// the data length in the final header. They are written as they are, so the
/// caller is responsible for keeping them block aligned. The view offers no
/// way to read or seek.
pub struct DataWriter<'w, W> {
    inner: &'w mut W,
    written: &'w mut u64,
}

impl<'w, W: io::Write> io::Write for DataWriter<'w, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        *self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'w, W: AsyncWrite + Unpin> AsyncWrite for DataWriter<'w, W> {
    fn poll_write(self: Pin<&mut Self>,
                  cx: &mut Context<'_>,
                  buf: &[u8])
                  -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut *this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            *this.written += n as u64;
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // The stream belongs to the writer, which still has to write the header.
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }
}

/// A writer that encodes frames into a PCM wav stream.
///
/// A 44-byte placeholder header is written on construction. After all frames
/// have been written, the writer must be finalized, which rewrites the header
/// with the real data length. This can be done by calling `finalize`. If
/// `finalize` is not called, the file is finalized upon drop. However,
/// finalization involves IO that may fail, and without calling `finalize`,
/// such a failure can only be logged.
///
/// The underlying stream is assumed to be at offset 0. To keep using it after
/// the writer is done, pass `&mut stream`.
pub struct WavWriter<W> where W: io::Write + io::Seek {
    encoder: FrameEncoder,

    /// The writer that will be written to.
    writer: io::BufWriter<W>,

    /// Whether `finalize_internal` has been called.
    finalized: bool,
}

impl<W> WavWriter<W> where W: io::Write + io::Seek {
    /// Creates a writer that writes the wav format to the underlying writer.
    ///
    /// Fails with `Error::InvalidSpec` if the spec cannot be represented.
    pub fn new(writer: W, spec: WavSpec) -> Result<WavWriter<W>> {
        let encoder = FrameEncoder::new(spec)?;
        let mut writer = io::BufWriter::new(writer);
        writer.write_all(&[0u8; HEADER_LEN])?;
        Ok(WavWriter {
            encoder: encoder,
            writer: writer,
            finalized: false,
        })
    }

    /// Sets the scale used to quantize floating point values.
    pub fn with_scale(mut self, scale: Scale) -> WavWriter<W> {
        self.encoder.scale = Some(scale);
        self
    }

    /// The format that is being written.
    pub fn spec(&self) -> WavSpec {
        self.encoder.spec
    }

    /// The largest raw sample value at the current bit depth.
    pub fn channel_amplitude(&self) -> i64 {
        sample::channel_amplitude(self.encoder.spec.bits_per_sample)
    }

    /// The physical value of one quantization step, 1.0 without a scale.
    pub fn resolution(&self) -> f64 {
        self.encoder.resolution()
    }

    /// The number of bytes written to the data section so far.
    pub fn data_len(&self) -> u64 {
        self.encoder.data_bytes_written
    }

    /// The header that finalizing now would write.
    pub fn header(&self) -> Result<Header> {
        self.encoder.header()
    }

    /// Writes one frame and returns the total time written, in seconds.
    ///
    /// `values` holds one value per channel. Integers are written unchanged,
    /// floating point values go through the scale.
    pub fn write<T: SampleValue>(&mut self, values: &[T]) -> Result<f64> {
        let block = self.encoder.encode(values)?;
        self.writer.write_all(block)?;
        let n = block.len();
        Ok(self.encoder.commit(n))
    }

    /// Writes frames taken from one signal per channel, in lock-step, until
    /// the shortest signal runs out. Returns the number of frames written.
    pub fn write_channels<S, I>(&mut self, signals: S) -> Result<u64>
        where S: IntoIterator<Item = I>,
              I: IntoIterator,
              I::Item: SampleValue
    {
        let frames = zip_channels(signals);
        check_signal_count(&frames, self.encoder.spec.channels)?;
        let mut count = 0;
        for frame in frames {
            self.write(&frame)?;
            count += 1;
        }
        Ok(count)
    }

    /// Appends pre-encoded bytes to the data section.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<f64> {
        self.writer.write_all(bytes)?;
        Ok(self.encoder.commit(bytes.len()))
    }

    /// Returns a write-only stream into the data section.
    pub fn data_writer(&mut self) -> DataWriter<'_, io::BufWriter<W>> {
        DataWriter {
            inner: &mut self.writer,
            written: &mut self.encoder.data_bytes_written,
        }
    }

    /// Performs finalization. After calling this, the writer should be destructed.
    fn finalize_internal(&mut self) -> Result<()> {
        self.finalized = true;

        // Flush remaining frames via the BufWriter.
        self.writer.flush()?;

        let header = self.encoder.header()?;
        let writer = self.writer.get_mut();
        writer.seek(io::SeekFrom::Start(0))?;
        header.write_to(writer)?;
        writer.flush()?;
        debug!("finalized wav stream with {} bytes of data", header.data_len);
        Ok(())
    }

    /// Writes the header, which requires knowing the length of all data.
    ///
    /// This method must be called after all frames have been written. If it
    /// is not called, the destructor will finalize the file, but any errors
    /// that occur in the process cannot be observed in that manner.
    pub fn finalize(mut self) -> Result<()> {
        self.finalize_internal()
    }
}

impl<W> Drop for WavWriter<W> where W: io::Write + io::Seek {
    fn drop(&mut self) {
        // If the user did not finalize explicitly, do it now. Drop cannot
        // return the error, so it is only logged.
        if !self.finalized {
            if let Err(err) = self.finalize_internal() {
                warn!("failed to finalize wav stream on drop: {}", err);
            }
        }
    }
}

impl WavWriter<fs::File> {
    /// Creates a writer that writes the wav format to a file.
    ///
    /// The file will be overwritten if it exists.
    pub fn create<P: AsRef<path::Path>>(filename: P, spec: WavSpec) -> Result<WavWriter<fs::File>> {
        // Validate before touching the file system.
        spec.validate()?;
        let file = fs::File::create(filename)?;
        WavWriter::new(file, spec)
    }
}

fn check_signal_count<I>(frames: &ZipChannels<I>, channels: u16) -> Result<()> {
    if frames.signals.len() != channels as usize {
        return Err(Error::ArityMismatch {
            expected: channels as usize,
            found: frames.signals.len(),
        });
    }
    Ok(())
}

/// The asynchronous counterpart of [`WavWriter`].
///
/// There is no asynchronous drop, so this writer must be finalized with
/// `finalize().await`. A writer that is dropped without it leaves the
/// placeholder header in place, and the stream does not form a valid file.
pub struct AsyncWavWriter<W> where W: AsyncWrite + AsyncSeek + Unpin {
    encoder: FrameEncoder,
    writer: tokio::io::BufWriter<W>,
    finalized: bool,
}

impl<W> AsyncWavWriter<W> where W: AsyncWrite + AsyncSeek + Unpin {
    /// Creates a writer and writes the placeholder header.
    pub async fn new(writer: W, spec: WavSpec) -> Result<AsyncWavWriter<W>> {
        let encoder = FrameEncoder::new(spec)?;
        let mut writer = tokio::io::BufWriter::new(writer);
        writer.write_all(&[0u8; HEADER_LEN]).await?;
        Ok(AsyncWavWriter {
            encoder: encoder,
            writer: writer,
            finalized: false,
        })
    }

    /// Sets the scale used to quantize floating point values.
    pub fn with_scale(mut self, scale: Scale) -> AsyncWavWriter<W> {
        self.encoder.scale = Some(scale);
        self
    }

    /// The format that is being written.
    pub fn spec(&self) -> WavSpec {
        self.encoder.spec
    }

    /// The largest raw sample value at the current bit depth.
    pub fn channel_amplitude(&self) -> i64 {
        sample::channel_amplitude(self.encoder.spec.bits_per_sample)
    }

    /// The physical value of one quantization step, 1.0 without a scale.
    pub fn resolution(&self) -> f64 {
        self.encoder.resolution()
    }

    /// The number of bytes written to the data section so far.
    pub fn data_len(&self) -> u64 {
        self.encoder.data_bytes_written
    }

    /// The header that finalizing now would write.
    pub fn header(&self) -> Result<Header> {
        self.encoder.header()
    }

    /// Writes one frame and returns the total time written, in seconds.
    pub async fn write<T: SampleValue>(&mut self, values: &[T]) -> Result<f64> {
        let block = self.encoder.encode(values)?;
        self.writer.write_all(block).await?;
        let n = block.len();
        Ok(self.encoder.commit(n))
    }

    /// Writes frames from one signal per channel in lock-step, until the
    /// shortest signal runs out. Returns the number of frames written.
    pub async fn write_channels<S, I>(&mut self, signals: S) -> Result<u64>
        where S: IntoIterator<Item = I>,
              I: IntoIterator,
              I::Item: SampleValue
    {
        self.write_channels_with(signals, &CancellationToken::new(), |_| {}).await
    }

    /// Like `write_channels`, checking `cancel` before every frame and calling
    /// `progress` with the number of frames written after every frame.
    ///
    /// Frames written before cancellation stay written.
    pub async fn write_channels_with<S, I, F>(&mut self,
                                              signals: S,
                                              cancel: &CancellationToken,
                                              mut progress: F)
                                              -> Result<u64>
        where S: IntoIterator<Item = I>,
              I: IntoIterator,
              I::Item: SampleValue,
              F: FnMut(u64)
    {
        let frames = zip_channels(signals);
        check_signal_count(&frames, self.encoder.spec.channels)?;
        let mut count = 0;
        for frame in frames {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.write(&frame).await?;
            count += 1;
            progress(count);
        }
        Ok(count)
    }

    /// Appends pre-encoded bytes to the data section.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<f64> {
        self.writer.write_all(bytes).await?;
        Ok(self.encoder.commit(bytes.len()))
    }

    /// Returns a write-only stream into the data section.
    pub fn data_writer(&mut self) -> DataWriter<'_, tokio::io::BufWriter<W>> {
        DataWriter {
            inner: &mut self.writer,
            written: &mut self.encoder.data_bytes_written,
        }
    }

    /// Flushes all frames and writes the final header.
    pub async fn finalize(mut self) -> Result<()> {
        self.finalized = true;
        self.writer.flush().await?;

        let header = self.encoder.header()?;
        let writer = self.writer.get_mut();
        writer.seek(io::SeekFrom::Start(0)).await?;
        header.write_to_async(writer).await?;
        writer.flush().await?;
        debug!("finalized wav stream with {} bytes of data", header.data_len);
        Ok(())
    }
}

impl AsyncWavWriter<tokio::fs::File> {
    /// Creates a writer that writes the wav format to a file.
    ///
    /// The file will be overwritten if it exists.
    pub async fn create<P: AsRef<path::Path>>(filename: P,
                                              spec: WavSpec)
                                              -> Result<AsyncWavWriter<tokio::fs::File>> {
        spec.validate()?;
        let file = tokio::fs::File::create(filename).await?;
        AsyncWavWriter::new(file, spec).await
    }
}

impl<W> Drop for AsyncWavWriter<W> where W: AsyncWrite + AsyncSeek + Unpin {
    fn drop(&mut self) {
        if !self.finalized {
            warn!("async wav writer dropped without finalize, {} bytes of data have no header",
                  self.encoder.data_bytes_written);
        }
    }
}

/// Writes a whole file in one go and returns its duration in seconds.
///
/// `samples` holds the samples of all channels interleaved, frame by frame. A
/// trailing partial frame is an error, and nothing is written in that case.
pub fn write_file<P, T>(path: P, samples: &[T], spec: WavSpec) -> Result<f64>
    where P: AsRef<path::Path>,
          T: SampleValue
{
    spec.validate()?;
    let channels = spec.channels as usize;
    let partial = samples.len() % channels;
    if partial != 0 {
        return Err(Error::ArityMismatch {
            expected: channels,
            found: partial,
        });
    }
    let mut writer = WavWriter::create(path, spec)?;
    let mut time = 0.0;
    for frame in samples.chunks(channels) {
        time = writer.write(frame)?;
    }
    writer.finalize()?;
    Ok(time)
}

#[test]
fn placeholder_header_is_replaced_on_finalize() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 2,
        sample_rate: 8000,
        bits_per_sample: 16,
    };
    {
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
        writer.write(&[1i16, -1]).unwrap();
        writer.write(&[2i16, -2]).unwrap();
        writer.finalize().unwrap();
    }
    let bytes = buffer.into_inner();
    assert_eq!(bytes.len(), HEADER_LEN + 8);
    let mut head = [0u8; HEADER_LEN];
    head.copy_from_slice(&bytes[..HEADER_LEN]);
    let header = Header::from_bytes(&head, Some(52)).unwrap();
    assert_eq!(header, Header::pcm(2, 8000, 4, 16, 8));
    assert_eq!(&bytes[HEADER_LEN..], &[1, 0, 0xff, 0xff, 2, 0, 0xfe, 0xff]);
}

#[test]
fn drop_finalizes() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 1,
        sample_rate: 100,
        bits_per_sample: 8,
    };
    {
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
        writer.write(&[-5i8]).unwrap();
    }
    let bytes = buffer.into_inner();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[40..44], &[1, 0, 0, 0]);
    assert_eq!(bytes[44], 0xfb);
}

#[test]
fn write_returns_cumulative_time() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 1,
        sample_rate: 4,
        bits_per_sample: 32,
    };
    let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
    assert_eq!(writer.write(&[7i32]).unwrap(), 0.25);
    assert_eq!(writer.write(&[8i32]).unwrap(), 0.5);
    assert_eq!(writer.data_len(), 8);
    assert_eq!(writer.header().unwrap().data_len, 8);
}

#[test]
fn write_rejects_wrong_arity() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 3,
        sample_rate: 8000,
        bits_per_sample: 16,
    };
    let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
    match writer.write(&[1i16, 2]) {
        Err(Error::ArityMismatch { expected: 3, found: 2 }) => {}
        other => panic!("expected ArityMismatch, got {:?}", other),
    }
    // Nothing was written by the failed call.
    assert_eq!(writer.data_len(), 0);
}

#[test]
fn writer_rejects_invalid_spec() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 24,
    };
    assert!(WavWriter::new(&mut buffer, spec).is_err());
}

#[test]
fn scaled_write_clamps_to_amplitude() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 2,
        sample_rate: 8000,
        bits_per_sample: 16,
    };
    let scale = Scale::with_amplitude(10.0).unwrap();
    {
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap().with_scale(scale);
        assert!((writer.resolution() - 10.0 / 32767.0).abs() < 1e-12);
        assert_eq!(writer.channel_amplitude(), 32767);
        writer.write(&[10.0f64, -25.0]).unwrap();
        writer.finalize().unwrap();
    }
    let bytes = buffer.into_inner();
    assert_eq!(&bytes[HEADER_LEN..], &[0xff, 0x7f, 0x01, 0x80]);
}

#[test]
fn non_finite_values_are_rejected() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 2,
        sample_rate: 8000,
        bits_per_sample: 16,
    };
    let scale = Scale::with_amplitude(1.0).unwrap();
    {
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            match writer.write(&[0.0, bad]) {
                Err(Error::InvalidValue { channel: 1 }) => {}
                other => panic!("expected InvalidValue, got {:?}", other),
            }
        }
        match writer.write(&[f32::NAN, 0.0]) {
            Err(Error::InvalidValue { channel: 0 }) => {}
            other => panic!("expected InvalidValue, got {:?}", other),
        }
        assert_eq!(writer.data_len(), 0);

        let mut writer = writer.with_scale(scale);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            match writer.write(&[bad, 0.5]) {
                Err(Error::InvalidValue { channel: 0 }) => {}
                other => panic!("expected InvalidValue, got {:?}", other),
            }
        }
        assert_eq!(writer.data_len(), 0);
        writer.write(&[1.0, -1.0]).unwrap();
        writer.finalize().unwrap();
    }
    let bytes = buffer.into_inner();
    assert_eq!(&bytes[HEADER_LEN..], &[0xff, 0x7f, 0x01, 0x80]);
}

#[test]
fn write_channels_stops_at_shortest_signal() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 2,
        sample_rate: 8000,
        bits_per_sample: 16,
    };
    let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
    let n = writer.write_channels(vec![vec![1i16, 2, 3], vec![4i16, 5]]).unwrap();
    assert_eq!(n, 2);
    assert_eq!(writer.data_len(), 8);

    match writer.write_channels(vec![vec![1i16]]) {
        Err(Error::ArityMismatch { expected: 2, found: 1 }) => {}
        other => panic!("expected ArityMismatch, got {:?}", other),
    }
}

#[test]
fn zip_channels_yields_frames() {
    let frames: Vec<Vec<i32>> = zip_channels(vec![vec![1, 2, 3], vec![4, 5, 6]]).collect();
    assert_eq!(frames, vec![vec![1, 4], vec![2, 5], vec![3, 6]]);
    let none: Vec<Vec<i32>> = zip_channels(Vec::<Vec<i32>>::new()).collect();
    assert!(none.is_empty());
}

#[test]
fn data_writer_counts_bytes() {
    let mut buffer = io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
    };
    {
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
        writer.data_writer().write_all(&[1, 0, 2, 0]).unwrap();
        assert_eq!(writer.write_raw(&[3, 0]).unwrap(), 3.0 / 8000.0);
        writer.finalize().unwrap();
    }
    let bytes = buffer.into_inner();
    assert_eq!(&bytes[40..44], &[6, 0, 0, 0]);
}
