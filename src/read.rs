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
use std::io::Seek;
use std::path;
use std::pin::Pin;
use std::task::{Context, Poll};

use log::{trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, ReadBuf};
use tokio_util::sync::CancellationToken;

use super::frame::Frame;
use super::sample::{self, Scale};
use super::wav::{Header, HEADER_LEN};
use super::{Error, Result, WavSpec};

/// Blocking read helpers for any `io::Read`.
pub trait ReadExt: io::Read {
    /// Reads until `buf` is full or the end of the input is reached.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()` only
    /// at the end of the input.
    fn read_fill(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Skip over `n` bytes, returns the number of bytes actually skipped.
    fn skip_bytes(&mut self, n: u64) -> io::Result<u64>;
}

impl<R> ReadExt for R
    where R: io::Read
{
    #[inline(always)]
    fn read_fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.read(&mut buf[n..]) {
                Ok(0) => break,
                Ok(progress) => n += progress,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(n)
    }

    fn skip_bytes(&mut self, n: u64) -> io::Result<u64> {
        // Discarded in chunks; only forward-only sources skip, once per access.
        let mut n_read = 0;
        let mut buf = [0u8; 1024];
        while n_read < n {
            let end = cmp::min(n - n_read, 1024) as usize;
            let progress = self.read_fill(&mut buf[0..end])?;
            if progress == 0 {
                break;
            }
            n_read += progress as u64;
        }
        Ok(n_read)
    }
}

/// Asynchronous counterpart of [`ReadExt::read_fill`].
pub async fn read_fill_async<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
    where R: AsyncRead + Unpin
{
    let mut n = 0;
    while n < buf.len() {
        match reader.read(&mut buf[n..]).await {
            Ok(0) => break,
            Ok(progress) => n += progress,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

async fn skip_bytes_async<R>(reader: &mut R, n: u64) -> io::Result<u64>
    where R: AsyncRead + Unpin
{
    let mut n_read = 0;
    let mut buf = [0u8; 1024];
    while n_read < n {
        let end = cmp::min(n - n_read, 1024) as usize;
        let progress = read_fill_async(reader, &mut buf[0..end]).await?;
        if progress == 0 {
            break;
        }
        n_read += progress as u64;
    }
    Ok(n_read)
}

/// Options that control how a reader validates its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    /// Whether the size fields of the header must match the length of the
    /// source, when that length is known.
    ///
    /// Enabled by default. Disable it to open damaged or truncated files.
    pub verify_length: bool,
}

impl Default for ReadOptions {
    fn default() -> ReadOptions {
        ReadOptions { verify_length: true }
    }
}

impl ReadOptions {
    fn known_len(&self, len: u64) -> Option<u64> {
        if self.verify_length {
            Some(len)
        } else {
            None
        }
    }
}

/// Where a reader gets its bytes from.
///
/// A source knows how long it is (if it can tell) and whether it can still
/// deliver the bytes at a given offset. How the bytes are delivered is up to
/// [`BlockingSource`] and [`AsyncSource`].
pub trait Source {
    /// The total length of the source in bytes, if known.
    fn stream_len(&self) -> Option<u64>;

    /// Whether reading can start at `offset`.
    ///
    /// Only forward-only sources ever return `false`, once they have been
    /// consumed beyond `offset`.
    fn can_reach(&self, _offset: u64) -> bool {
        true
    }
}

/// A source that can be read with blocking IO.
pub trait BlockingSource: Source {
    /// A reader positioned somewhere in the source.
    type Data<'s>: io::Read where Self: 's;

    /// Returns a reader positioned at `offset` bytes from the start.
    fn open_at(&mut self, offset: u64) -> Result<Self::Data<'_>>;
}

/// A source that can be read with asynchronous IO.
#[allow(async_fn_in_trait)]
pub trait AsyncSource: Source {
    /// A reader positioned somewhere in the source.
    type AsyncData<'s>: AsyncRead + Unpin where Self: 's;

    /// Returns a reader positioned at `offset` bytes from the start.
    async fn open_at_async(&mut self, offset: u64) -> Result<Self::AsyncData<'_>>;
}

/// A wav file on disk.
///
/// Every traversal opens its own handle, so clones of a reader over a file
/// source traverse the file independently of each other.
#[derive(Clone, Debug)]
pub struct FileSource {
    path: path::PathBuf,
    len: u64,
}

impl FileSource {
    /// The path of the file.
    pub fn path(&self) -> &path::Path {
        &self.path
    }
}

impl Source for FileSource {
    fn stream_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

impl BlockingSource for FileSource {
    type Data<'s> = io::BufReader<fs::File>;

    fn open_at(&mut self, offset: u64) -> Result<io::BufReader<fs::File>> {
        let mut file = fs::File::open(&self.path)?;
        file.seek(io::SeekFrom::Start(offset))?;
        Ok(io::BufReader::new(file))
    }
}

impl AsyncSource for FileSource {
    type AsyncData<'s> = tokio::io::BufReader<tokio::fs::File>;

    async fn open_at_async(&mut self, offset: u64) -> Result<Self::AsyncData<'_>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(io::SeekFrom::Start(offset)).await?;
        Ok(tokio::io::BufReader::new(file))
    }
}

/// A caller-supplied stream that supports seeking.
///
/// The stream is repositioned in place for every traversal. No buffering is
/// added, wrap the stream in a `BufReader` if it does not buffer itself.
#[derive(Debug)]
pub struct SeekableStream<R> {
    inner: R,
    len: Option<u64>,
}

impl<R> Source for SeekableStream<R> {
    fn stream_len(&self) -> Option<u64> {
        self.len
    }
}

impl<R: io::Read + io::Seek> BlockingSource for SeekableStream<R> {
    type Data<'s> = &'s mut R where Self: 's;

    fn open_at(&mut self, offset: u64) -> Result<&mut R> {
        self.inner.seek(io::SeekFrom::Start(offset))?;
        Ok(&mut self.inner)
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> AsyncSource for SeekableStream<R> {
    type AsyncData<'s> = &'s mut R where Self: 's;

    async fn open_at_async(&mut self, offset: u64) -> Result<&mut R> {
        self.inner.seek(io::SeekFrom::Start(offset)).await?;
        Ok(&mut self.inner)
    }
}

/// A caller-supplied stream that can only be read front to back.
///
/// Such a stream can be traversed once. Random access is possible only at or
/// after the current position; a second enumeration yields nothing. To
/// traverse a non-seekable stream more than once, buffer it first.
#[derive(Debug)]
pub struct ForwardStream<R> {
    inner: R,
    position: u64,
}

/// A view of a [`ForwardStream`] that keeps its position up to date.
pub struct Tracked<'s, R> {
    inner: &'s mut R,
    position: &'s mut u64,
}

impl<'s, R: io::Read> io::Read for Tracked<'s, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        *self.position += n as u64;
        Ok(n)
    }
}

impl<'s, R: AsyncRead + Unpin> AsyncRead for Tracked<'s, R> {
    fn poll_read(self: Pin<&mut Self>,
                 cx: &mut Context<'_>,
                 buf: &mut ReadBuf<'_>)
                 -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut *this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            *this.position += (buf.filled().len() - before) as u64;
        }
        poll
    }
}

impl<R> ForwardStream<R> {
    fn check_forward(&self, offset: u64) -> Result<u64> {
        if offset < self.position {
            return Err(Error::Unsupported("cannot seek backwards in a forward-only stream"));
        }
        Ok(offset - self.position)
    }

    fn tracked(&mut self) -> Tracked<'_, R> {
        Tracked {
            inner: &mut self.inner,
            position: &mut self.position,
        }
    }
}

impl<R> Source for ForwardStream<R> {
    fn stream_len(&self) -> Option<u64> {
        None
    }

    fn can_reach(&self, offset: u64) -> bool {
        offset >= self.position
    }
}

impl<R: io::Read> BlockingSource for ForwardStream<R> {
    type Data<'s> = Tracked<'s, R> where Self: 's;

    fn open_at(&mut self, offset: u64) -> Result<Tracked<'_, R>> {
        let gap = self.check_forward(offset)?;
        let mut tracked = self.tracked();
        tracked.skip_bytes(gap)?;
        Ok(tracked)
    }
}

impl<R: AsyncRead + Unpin> AsyncSource for ForwardStream<R> {
    type AsyncData<'s> = Tracked<'s, R> where Self: 's;

    async fn open_at_async(&mut self, offset: u64) -> Result<Tracked<'_, R>> {
        let gap = self.check_forward(offset)?;
        let mut tracked = self.tracked();
        skip_bytes_async(&mut tracked, gap).await?;
        Ok(tracked)
    }
}

/// A reader for PCM wav data.
///
/// The header is read and validated when the reader is created. Sample data
/// is read on demand: every random access and every traversal goes back to
/// the source, nothing is cached. How that works depends on the source:
///
/// * [`FileSource`] (from [`WavReader::open`]) opens a fresh handle each time.
/// * [`SeekableStream`] (from [`WavReader::new`]) seeks the stream in place.
/// * [`ForwardStream`] (from [`WavReader::new_forward`]) reads the stream
///   once, front to back.
///
/// When the reader wraps a caller-supplied stream it owns that stream and
/// drops it with the reader. Pass `&mut stream` to keep ownership, or take
/// the stream back with `into_inner`.
#[derive(Clone, Debug)]
pub struct WavReader<S> {
    /// The header as found at the start of the source.
    header: Header,

    /// Maps raw samples to physical values for the `*_f64` methods.
    scale: Option<Scale>,

    /// Scratch space of one block for random access.
    block: Vec<u8>,

    /// Where the bytes come from.
    source: S,
}

impl<S> WavReader<S> {
    fn from_parts(header: Header, source: S) -> WavReader<S> {
        WavReader {
            header: header,
            scale: None,
            block: vec![0; header.block_align as usize],
            source: source,
        }
    }

    /// Sets the scale that the `*_f64` methods use to produce physical values.
    pub fn with_scale(mut self, scale: Scale) -> WavReader<S> {
        self.scale = Some(scale);
        self
    }

    /// The scale used by the `*_f64` methods, if any.
    pub fn scale(&self) -> Option<Scale> {
        self.scale
    }

    /// The header of the file.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The format of the file.
    pub fn spec(&self) -> WavSpec {
        WavSpec {
            channels: self.header.channels,
            sample_rate: self.header.sample_rate,
            bits_per_sample: self.header.bits_per_sample,
        }
    }

    /// The number of frames per second.
    pub fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    /// The time between two frames in seconds.
    pub fn dt(&self) -> f64 {
        1.0 / self.header.sample_rate as f64
    }

    /// The number of channels.
    pub fn channels(&self) -> u16 {
        self.header.channels
    }

    /// The number of frames declared by the header.
    ///
    /// This is a count of frames, not of individual samples: a stereo file
    /// with 10 frames holds 20 samples.
    pub fn len(&self) -> u32 {
        self.header.frame_count()
    }

    /// Returns whether the header declares no frames at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The duration of the file in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 * self.dt()
    }

    /// The length of the payload in bytes, as declared by the header.
    pub fn data_len(&self) -> u32 {
        self.header.data_len
    }

    /// The number of bytes in one frame.
    pub fn frame_len(&self) -> u16 {
        self.header.block_align
    }

    /// The number of bytes used to store one channel's sample.
    pub fn sample_len(&self) -> u16 {
        (self.header.bits_per_sample + 7) / 8
    }

    /// The source the reader reads from.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn check_channel(&self, channel: u16) -> Result<()> {
        if channel >= self.header.channels {
            return Err(Error::ChannelOutOfRange {
                channel: channel,
                channels: self.header.channels,
            });
        }
        Ok(())
    }

    fn to_physical(&self, raw: Vec<i64>) -> Vec<f64> {
        let bits = self.header.bits_per_sample;
        match self.scale {
            Some(scale) => raw.into_iter().map(|x| scale.to_physical(x, bits)).collect(),
            None => raw.into_iter().map(|x| x as f64).collect(),
        }
    }
}

impl WavReader<FileSource> {
    /// Opens the wav file at `path`.
    pub fn open<P: AsRef<path::Path>>(path: P) -> Result<WavReader<FileSource>> {
        WavReader::open_with(path, ReadOptions::default())
    }

    /// Opens the wav file at `path` with the given options.
    pub fn open_with<P: AsRef<path::Path>>(path: P,
                                           options: ReadOptions)
                                           -> Result<WavReader<FileSource>> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        let len = file.metadata()?.len();
        let mut buf_reader = io::BufReader::new(file);
        let header = Header::read(&mut buf_reader, options.known_len(len))?;
        let source = FileSource {
            path: path.to_path_buf(),
            len: len,
        };
        Ok(WavReader::from_parts(header, source))
    }

    /// Asynchronous counterpart of [`WavReader::open`].
    pub async fn open_async<P: AsRef<path::Path>>(path: P) -> Result<WavReader<FileSource>> {
        WavReader::open_async_with(path, ReadOptions::default()).await
    }

    /// Asynchronous counterpart of [`WavReader::open_with`].
    pub async fn open_async_with<P: AsRef<path::Path>>(path: P,
                                                       options: ReadOptions)
                                                       -> Result<WavReader<FileSource>> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let mut buf_reader = tokio::io::BufReader::new(file);
        let header = Header::read_async(&mut buf_reader, options.known_len(len)).await?;
        let source = FileSource {
            path: path.to_path_buf(),
            len: len,
        };
        Ok(WavReader::from_parts(header, source))
    }
}

impl<R: io::Read + io::Seek> WavReader<SeekableStream<R>> {
    /// Creates a reader over a seekable stream that holds a wav file at
    /// offset 0.
    pub fn new(reader: R) -> Result<WavReader<SeekableStream<R>>> {
        WavReader::new_with(reader, ReadOptions::default())
    }

    /// Creates a reader over a seekable stream with the given options.
    pub fn new_with(mut reader: R, options: ReadOptions) -> Result<WavReader<SeekableStream<R>>> {
        let len = reader.seek(io::SeekFrom::End(0))?;
        reader.seek(io::SeekFrom::Start(0))?;
        let header = Header::read(&mut reader, options.known_len(len))?;
        let source = SeekableStream {
            inner: reader,
            len: Some(len),
        };
        Ok(WavReader::from_parts(header, source))
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> WavReader<SeekableStream<R>> {
    /// Asynchronous counterpart of [`WavReader::new`].
    pub async fn new_async(reader: R) -> Result<WavReader<SeekableStream<R>>> {
        WavReader::new_async_with(reader, ReadOptions::default()).await
    }

    /// Asynchronous counterpart of [`WavReader::new_with`].
    pub async fn new_async_with(mut reader: R,
                                options: ReadOptions)
                                -> Result<WavReader<SeekableStream<R>>> {
        let len = reader.seek(io::SeekFrom::End(0)).await?;
        reader.seek(io::SeekFrom::Start(0)).await?;
        let header = Header::read_async(&mut reader, options.known_len(len)).await?;
        let source = SeekableStream {
            inner: reader,
            len: Some(len),
        };
        Ok(WavReader::from_parts(header, source))
    }
}

impl<R> WavReader<SeekableStream<R>> {
    /// Destroys the reader and returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.source.inner
    }
}

impl<R: io::Read> WavReader<ForwardStream<R>> {
    /// Creates a reader over a stream that can only be read once, front to
    /// back. The stream must be positioned at the start of the wav file.
    ///
    /// The length of such a stream is unknown, so the size fields of the
    /// header are not checked against it.
    pub fn new_forward(mut reader: R) -> Result<WavReader<ForwardStream<R>>> {
        let header = Header::read(&mut reader, None)?;
        let source = ForwardStream {
            inner: reader,
            position: HEADER_LEN as u64,
        };
        Ok(WavReader::from_parts(header, source))
    }
}

impl<R: AsyncRead + Unpin> WavReader<ForwardStream<R>> {
    /// Asynchronous counterpart of [`WavReader::new_forward`].
    pub async fn new_forward_async(mut reader: R) -> Result<WavReader<ForwardStream<R>>> {
        let header = Header::read_async(&mut reader, None).await?;
        let source = ForwardStream {
            inner: reader,
            position: HEADER_LEN as u64,
        };
        Ok(WavReader::from_parts(header, source))
    }
}

impl<R> WavReader<ForwardStream<R>> {
    /// Destroys the reader and returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.source.inner
    }
}

impl<S: BlockingSource> WavReader<S> {
    /// Reads the frame at `index`.
    ///
    /// Fails with `Error::OutOfRange` if the frame lies beyond the declared
    /// data or beyond the end of the source, and with `Error::ShortRead` if
    /// the source delivers less than a whole frame.
    pub fn frame(&mut self, index: u32) -> Result<Frame<'_>> {
        let frames = self.header.frame_count();
        let block_len = self.header.block_align as u64;
        let offset = HEADER_LEN as u64 + index as u64 * block_len;
        let beyond_source = match self.source.stream_len() {
            Some(len) => offset + block_len > len,
            None => false,
        };
        if index >= frames || beyond_source {
            return Err(Error::OutOfRange {
                index: index as u64,
                frames: frames as u64,
            });
        }

        let n = {
            let mut data = self.source.open_at(offset)?;
            data.read_fill(&mut self.block)?
        };
        if n < self.block.len() {
            return Err(Error::ShortRead {
                index: index as u64,
                expected: self.block.len(),
                found: n,
            });
        }
        let time = index as f64 / self.header.sample_rate as f64;
        Frame::new(time, self.header.channels, &self.block)
    }

    /// Returns a cursor over all frames, or an empty one if the source can no
    /// longer reach the start of the data.
    fn cursor(&mut self) -> Result<Cursor<S::Data<'_>>> {
        let start = HEADER_LEN as u64;
        let data = if self.source.can_reach(start) {
            Some(self.source.open_at(start)?)
        } else {
            warn!("forward-only source was already consumed, traversal yields no frames");
            None
        };
        Ok(Cursor::new(data, self.header))
    }

    /// Reads every frame once, calling `f` with the bytes of each block.
    ///
    /// Unlike the enumerators this insists on all declared frames: a short
    /// block is an error.
    fn for_each_block<F>(&mut self, mut f: F) -> Result<()>
        where F: FnMut(&[u8]) -> Result<()>
    {
        let data = self.source.open_at(HEADER_LEN as u64)?;
        let mut cursor = Cursor::new(Some(data), self.header);
        while cursor.step()?.is_some() {
            f(&cursor.block)?;
        }
        match cursor.short_block {
            Some(found) => Err(Error::ShortRead {
                index: cursor.index as u64,
                expected: cursor.block.len(),
                found: found,
            }),
            None => Ok(()),
        }
    }

    /// Reads all raw samples of one channel in a single pass.
    pub fn channel(&mut self, channel: u16) -> Result<Vec<i64>> {
        self.check_channel(channel)?;
        let width = self.header.bytes_per_sample();
        let offset = channel as usize * width as usize;
        let mut result = Vec::with_capacity(self.len() as usize);
        self.for_each_block(|block| {
            result.push(sample::decode(block, offset, width)?);
            Ok(())
        })?;
        Ok(result)
    }

    /// Reads all samples of one channel as physical values.
    ///
    /// Without a scale, the raw samples are returned as `f64`.
    pub fn channel_f64(&mut self, channel: u16) -> Result<Vec<f64>> {
        let raw = self.channel(channel)?;
        Ok(self.to_physical(raw))
    }

    /// Reads all raw samples of all channels in a single pass.
    ///
    /// The result holds one vector per channel.
    pub fn all_channels(&mut self) -> Result<Vec<Vec<i64>>> {
        let width = self.header.bytes_per_sample();
        let frames = self.len() as usize;
        let mut result: Vec<Vec<i64>> = (0..self.header.channels)
            .map(|_| Vec::with_capacity(frames))
            .collect();
        self.for_each_block(|block| {
            for (channel, samples) in result.iter_mut().enumerate() {
                samples.push(sample::decode(block, channel * width as usize, width)?);
            }
            Ok(())
        })?;
        Ok(result)
    }

    /// Reads all samples of all channels as physical values.
    pub fn all_channels_f64(&mut self) -> Result<Vec<Vec<f64>>> {
        let raw = self.all_channels()?;
        Ok(raw.into_iter().map(|channel| self.to_physical(channel)).collect())
    }

    /// Returns an iterator over all frames that yields a fresh vector of
    /// samples per frame.
    ///
    /// The iterator is lazy and single pass. It ends silently at a short final
    /// block, unlike [`WavReader::frame`].
    pub fn samples(&mut self) -> Result<Samples<'_, S>> {
        Ok(Samples { cursor: self.cursor()? })
    }

    /// Returns an iterator over the samples of one channel.
    pub fn channel_samples(&mut self, channel: u16) -> Result<ChannelSamples<'_, S>> {
        self.check_channel(channel)?;
        Ok(ChannelSamples {
            cursor: self.cursor()?,
            channel: channel,
        })
    }

    /// Returns an enumerator over all frames that reuses one buffer.
    pub fn shared_samples(&mut self) -> Result<SharedSamples<'_, S>> {
        Ok(SharedSamples { cursor: self.cursor()? })
    }
}

impl<S: AsyncSource> WavReader<S> {
    async fn async_cursor(&mut self) -> Result<AsyncCursor<'_, S::AsyncData<'_>>> {
        let start = HEADER_LEN as u64;
        let data = if self.source.can_reach(start) {
            Some(self.source.open_at_async(start).await?)
        } else {
            warn!("forward-only source was already consumed, traversal yields no frames");
            None
        };
        Ok(AsyncCursor {
            cursor: Cursor::new(data, self.header),
            cancel: None,
            progress: None,
        })
    }

    /// Asynchronous counterpart of [`WavReader::samples`].
    pub async fn samples_async(&mut self) -> Result<AsyncSamples<'_, S>> {
        Ok(AsyncSamples { cursor: self.async_cursor().await? })
    }

    /// Asynchronous counterpart of [`WavReader::channel_samples`].
    pub async fn channel_samples_async(&mut self,
                                       channel: u16)
                                       -> Result<AsyncChannelSamples<'_, S>> {
        self.check_channel(channel)?;
        Ok(AsyncChannelSamples {
            cursor: self.async_cursor().await?,
            channel: channel,
        })
    }

    /// Asynchronous counterpart of [`WavReader::shared_samples`].
    pub async fn shared_samples_async(&mut self) -> Result<AsyncSharedSamples<'_, S>> {
        Ok(AsyncSharedSamples { cursor: self.async_cursor().await? })
    }
}

/// The state of one traversal over the data: a reader positioned at the
/// next block, the block buffer and the decoded values of the last block.
///
/// Both the blocking and the asynchronous enumerators step through this; they
/// differ only in how a block is read.
struct Cursor<D> {
    data: Option<D>,
    header: Header,
    index: u32,
    frames: u32,
    block: Vec<u8>,
    values: Vec<i64>,
    short_block: Option<usize>,
}

impl<D> Cursor<D> {
    fn new(data: Option<D>, header: Header) -> Cursor<D> {
        Cursor {
            data: data,
            header: header,
            index: 0,
            frames: header.frame_count(),
            block: vec![0; header.block_align as usize],
            values: vec![0; header.channels as usize],
            short_block: None,
        }
    }

    fn finished(&self) -> bool {
        self.data.is_none() || self.index >= self.frames
    }

    /// Accounts for a block read of `filled` bytes. Returns the time of the
    /// frame, or `None` if the block was short and the traversal is over.
    fn accept(&mut self, filled: usize) -> Option<f64> {
        if filled < self.block.len() {
            trace!("short block at frame {} ({} of {} bytes), ending traversal",
                   self.index, filled, self.block.len());
            self.short_block = Some(filled);
            self.data = None;
            return None;
        }
        let time = self.index as f64 / self.header.sample_rate as f64;
        self.index += 1;
        Some(time)
    }

    fn decode_channel(&self, channel: u16) -> Result<i64> {
        let width = self.header.bytes_per_sample();
        sample::decode(&self.block, channel as usize * width as usize, width)
    }

    fn decode_values(&mut self) -> Result<&[i64]> {
        let width = self.header.bytes_per_sample();
        for (i, value) in self.values.iter_mut().enumerate() {
            *value = sample::decode(&self.block, i * width as usize, width)?;
        }
        Ok(&self.values)
    }

    fn remaining(&self) -> usize {
        match self.data {
            Some(..) => (self.frames - self.index) as usize,
            None => 0,
        }
    }
}

impl<D: io::Read> Cursor<D> {
    fn step(&mut self) -> Result<Option<f64>> {
        if self.finished() {
            return Ok(None);
        }
        let filled = match self.data.as_mut() {
            Some(data) => data.read_fill(&mut self.block),
            None => return Ok(None),
        };
        match filled {
            Ok(n) => Ok(self.accept(n)),
            Err(err) => {
                self.data = None;
                Err(Error::from(err))
            }
        }
    }
}

impl<D: AsyncRead + Unpin> Cursor<D> {
    async fn step_async(&mut self) -> Result<Option<f64>> {
        if self.finished() {
            return Ok(None);
        }
        let filled = match self.data.as_mut() {
            Some(data) => read_fill_async(data, &mut self.block).await,
            None => return Ok(None),
        };
        match filled {
            Ok(n) => Ok(self.accept(n)),
            Err(err) => {
                self.data = None;
                Err(Error::from(err))
            }
        }
    }
}

/// A cursor with cooperative cancellation and progress reporting.
struct AsyncCursor<'r, D> {
    cursor: Cursor<D>,
    cancel: Option<CancellationToken>,
    progress: Option<Box<dyn FnMut(f64) + Send + 'r>>,
}

impl<'r, D: AsyncRead + Unpin> AsyncCursor<'r, D> {
    async fn step(&mut self) -> Result<Option<f64>> {
        if self.cursor.finished() {
            return Ok(None);
        }
        if let Some(ref token) = self.cancel {
            if token.is_cancelled() {
                self.cursor.data = None;
                return Err(Error::Cancelled);
            }
        }
        let index = self.cursor.index;
        let time = self.cursor.step_async().await?;
        if time.is_some() {
            if let Some(ref mut progress) = self.progress {
                progress(index as f64 / self.cursor.frames as f64);
            }
        }
        Ok(time)
    }
}

/// An iterator over all frames of a file, as fresh vectors of samples.
///
/// Created by [`WavReader::samples`].
pub struct Samples<'r, S: BlockingSource + 'r> {
    cursor: Cursor<S::Data<'r>>,
}

impl<'r, S: BlockingSource + 'r> Iterator for Samples<'r, S> {
    type Item = Result<(f64, Vec<i64>)>;

    fn next(&mut self) -> Option<Result<(f64, Vec<i64>)>> {
        match self.cursor.step() {
            Ok(Some(time)) => Some(self.cursor.decode_values().map(|v| (time, v.to_vec()))),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // The source may end early, so only the upper bound is exact.
        (0, Some(self.cursor.remaining()))
    }
}

/// An iterator over the samples of one channel.
///
/// Created by [`WavReader::channel_samples`].
pub struct ChannelSamples<'r, S: BlockingSource + 'r> {
    cursor: Cursor<S::Data<'r>>,
    channel: u16,
}

impl<'r, S: BlockingSource + 'r> Iterator for ChannelSamples<'r, S> {
    type Item = Result<(f64, i64)>;

    fn next(&mut self) -> Option<Result<(f64, i64)>> {
        match self.cursor.step() {
            Ok(Some(time)) => Some(self.cursor.decode_channel(self.channel).map(|v| (time, v))),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.cursor.remaining()))
    }
}

/// An enumerator over all frames that decodes every frame into the same
/// buffer.
///
/// This cannot be an `Iterator`: the samples returned by `next_shared` borrow
/// the enumerator and must be consumed before it advances.
///
/// Created by [`WavReader::shared_samples`].
pub struct SharedSamples<'r, S: BlockingSource + 'r> {
    cursor: Cursor<S::Data<'r>>,
}

impl<'r, S: BlockingSource + 'r> SharedSamples<'r, S> {
    /// Reads the next frame, returns its time and samples.
    pub fn next_shared(&mut self) -> Option<Result<(f64, &[i64])>> {
        match self.cursor.step() {
            Ok(Some(time)) => Some(self.cursor.decode_values().map(|v| (time, v))),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

macro_rules! impl_async_options {
    ($name:ident) => {
        impl<'r, S: AsyncSource + 'r> $name<'r, S> {
            /// Checks `token` before every block; once it is cancelled, the
            /// enumerator yields `Error::Cancelled` and stops.
            pub fn with_cancel(mut self, token: CancellationToken) -> Self {
                self.cursor.cancel = Some(token);
                self
            }

            /// Calls `progress` after every block with the fraction of frames
            /// read before it.
            pub fn with_progress<F>(mut self, progress: F) -> Self
                where F: FnMut(f64) + Send + 'r
            {
                self.cursor.progress = Some(Box::new(progress));
                self
            }
        }
    }
}

/// An asynchronous enumerator over all frames, as fresh vectors of samples.
///
/// Created by [`WavReader::samples_async`].
pub struct AsyncSamples<'r, S: AsyncSource + 'r> {
    cursor: AsyncCursor<'r, S::AsyncData<'r>>,
}

impl_async_options!(AsyncSamples);

impl<'r, S: AsyncSource + 'r> AsyncSamples<'r, S> {
    /// Reads the next frame, returns its time and samples.
    pub async fn next(&mut self) -> Option<Result<(f64, Vec<i64>)>> {
        match self.cursor.step().await {
            Ok(Some(time)) => {
                Some(self.cursor.cursor.decode_values().map(|v| (time, v.to_vec())))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// An asynchronous enumerator over the samples of one channel.
///
/// Created by [`WavReader::channel_samples_async`].
pub struct AsyncChannelSamples<'r, S: AsyncSource + 'r> {
    cursor: AsyncCursor<'r, S::AsyncData<'r>>,
    channel: u16,
}

impl_async_options!(AsyncChannelSamples);

impl<'r, S: AsyncSource + 'r> AsyncChannelSamples<'r, S> {
    /// Reads the next frame, returns its time and the channel's sample.
    pub async fn next(&mut self) -> Option<Result<(f64, i64)>> {
        match self.cursor.step().await {
            Ok(Some(time)) => {
                Some(self.cursor.cursor.decode_channel(self.channel).map(|v| (time, v)))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// An asynchronous enumerator over all frames that reuses one buffer.
///
/// Created by [`WavReader::shared_samples_async`].
pub struct AsyncSharedSamples<'r, S: AsyncSource + 'r> {
    cursor: AsyncCursor<'r, S::AsyncData<'r>>,
}

impl_async_options!(AsyncSharedSamples);

impl<'r, S: AsyncSource + 'r> AsyncSharedSamples<'r, S> {
    /// Reads the next frame, returns its time and samples.
    pub async fn next_shared(&mut self) -> Option<Result<(f64, &[i64])>> {
        match self.cursor.step().await {
            Ok(Some(time)) => Some(self.cursor.cursor.decode_values().map(|v| (time, v))),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
fn stereo_16_bytes(frames: &[[i16; 2]]) -> Vec<u8> {
    let header = Header::pcm(2, 8000, 4, 16, frames.len() as u32 * 4);
    let mut bytes = header.to_bytes().to_vec();
    for frame in frames {
        bytes.extend_from_slice(&frame[0].to_le_bytes());
        bytes.extend_from_slice(&frame[1].to_le_bytes());
    }
    bytes
}

#[test]
fn read_fill_stops_at_end_of_input() {
    let mut cursor = io::Cursor::new(vec![1u8, 2, 3]);
    let mut buf = [0u8; 5];
    assert_eq!(cursor.read_fill(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], &[1, 2, 3]);
    assert_eq!(cursor.read_fill(&mut buf).unwrap(), 0);
}

#[test]
fn skip_bytes_reports_what_was_skipped() {
    let mut cursor = io::Cursor::new(vec![0u8; 3000]);
    assert_eq!(cursor.skip_bytes(2500).unwrap(), 2500);
    assert_eq!(cursor.skip_bytes(2500).unwrap(), 500);
}

#[test]
fn frame_reads_random_access() {
    let bytes = stereo_16_bytes(&[[2, -3], [5, -7], [11, -13]]);
    let mut reader = WavReader::new(io::Cursor::new(bytes)).unwrap();
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.channels(), 2);
    assert_eq!(reader.sample_rate(), 8000);

    assert_eq!(reader.frame(2).unwrap().to_vec(), vec![11, -13]);
    let frame = reader.frame(1).unwrap();
    assert_eq!(frame.time(), 1.0 / 8000.0);
    assert_eq!(frame.to_vec(), vec![5, -7]);

    match reader.frame(3) {
        Err(Error::OutOfRange { index: 3, frames: 3 }) => {}
        other => panic!("expected OutOfRange, got {:?}", other.map(|f| f.to_vec())),
    }
}

#[test]
fn channel_extraction() {
    let bytes = stereo_16_bytes(&[[2, -3], [5, -7], [11, -13]]);
    let mut reader = WavReader::new(io::Cursor::new(bytes)).unwrap();
    assert_eq!(reader.channel(0).unwrap(), vec![2, 5, 11]);
    assert_eq!(reader.channel(1).unwrap(), vec![-3, -7, -13]);
    assert_eq!(reader.all_channels().unwrap(),
               vec![vec![2, 5, 11], vec![-3, -7, -13]]);
    match reader.channel(2) {
        Err(Error::ChannelOutOfRange { channel: 2, channels: 2 }) => {}
        other => panic!("expected ChannelOutOfRange, got {:?}", other),
    }
}

#[test]
fn channel_f64_without_scale_is_raw() {
    let bytes = stereo_16_bytes(&[[2, -3], [5, -7]]);
    let mut reader = WavReader::new(io::Cursor::new(bytes)).unwrap();
    assert_eq!(reader.channel_f64(1).unwrap(), vec![-3.0, -7.0]);
}

#[test]
fn channel_f64_applies_scale() {
    let bytes = stereo_16_bytes(&[[32767, -32767], [0, 0]]);
    let scale = Scale::new(2.0, 1.0).unwrap();
    let mut reader = WavReader::new(io::Cursor::new(bytes)).unwrap().with_scale(scale);
    let values = reader.channel_f64(0).unwrap();
    assert!((values[0] - 3.0).abs() < 1e-9);
    assert!((values[1] - 1.0).abs() < 1e-9);
    let all = reader.all_channels_f64().unwrap();
    assert!((all[1][0] + 1.0).abs() < 1e-9);
}

#[test]
fn enumerators_agree_with_random_access() {
    let frames = [[2, -3], [5, -7], [11, -13], [17, -19]];
    let bytes = stereo_16_bytes(&frames);
    let mut reader = WavReader::new(io::Cursor::new(bytes)).unwrap();

    let all: Vec<(f64, Vec<i64>)> = reader.samples().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(all.len(), 4);
    for (i, &(time, ref values)) in all.iter().enumerate() {
        let frame = reader.frame(i as u32).unwrap();
        assert_eq!(time, frame.time());
        assert_eq!(values, &frame.to_vec());
    }

    let right: Vec<i64> = reader.channel_samples(1).unwrap().map(|r| r.unwrap().1).collect();
    assert_eq!(right, vec![-3, -7, -13, -19]);

    let mut shared = reader.shared_samples().unwrap();
    let mut sum = 0;
    while let Some(next) = shared.next_shared() {
        let (_, values) = next.unwrap();
        sum += values[0] + values[1];
    }
    assert_eq!(sum, 2 - 3 + 5 - 7 + 11 - 13 + 17 - 19);
}

#[test]
fn enumeration_stops_silently_at_short_block() {
    let mut bytes = stereo_16_bytes(&[[1, 2], [3, 4], [5, 6]]);
    // Cut the last frame in half; the header still declares three frames.
    let len = bytes.len();
    bytes.truncate(len - 2);
    let options = ReadOptions { verify_length: false };
    let mut reader = WavReader::new_with(io::Cursor::new(bytes), options).unwrap();
    assert_eq!(reader.len(), 3);

    let values: Vec<Vec<i64>> = reader.samples().unwrap().map(|r| r.unwrap().1).collect();
    assert_eq!(values, vec![vec![1, 2], vec![3, 4]]);

    match reader.frame(2) {
        Err(Error::OutOfRange { index: 2, .. }) => {}
        other => panic!("expected OutOfRange, got {:?}", other.map(|f| f.to_vec())),
    }
    match reader.channel(0) {
        Err(Error::ShortRead { index: 2, expected: 4, found: 2 }) => {}
        other => panic!("expected ShortRead, got {:?}", other),
    }
}

#[test]
fn forward_stream_is_traversed_once() {
    let bytes = stereo_16_bytes(&[[1, 2], [3, 4], [5, 6]]);
    let mut reader = WavReader::new_forward(&bytes[..]).unwrap();
    assert_eq!(reader.len(), 3);

    let first: Vec<Vec<i64>> = reader.samples().unwrap().map(|r| r.unwrap().1).collect();
    assert_eq!(first.len(), 3);

    assert_eq!(reader.samples().unwrap().count(), 0);
    match reader.frame(0) {
        Err(Error::Unsupported(..)) => {}
        other => panic!("expected Unsupported, got {:?}", other.map(|f| f.to_vec())),
    }
}

#[test]
fn forward_stream_random_access_moves_forward() {
    let bytes = stereo_16_bytes(&[[1, 2], [3, 4], [5, 6]]);
    let mut reader = WavReader::new_forward(&bytes[..]).unwrap();
    assert_eq!(reader.frame(1).unwrap().to_vec(), vec![3, 4]);
    assert_eq!(reader.frame(2).unwrap().to_vec(), vec![5, 6]);
    assert!(reader.frame(0).is_err());
}

#[test]
fn forward_stream_reports_short_read() {
    let mut bytes = stereo_16_bytes(&[[1, 2], [3, 4]]);
    bytes.truncate(bytes.len() - 1);
    let mut reader = WavReader::new_forward(&bytes[..]).unwrap();
    match reader.frame(1) {
        Err(Error::ShortRead { index: 1, expected: 4, found: 3 }) => {}
        other => panic!("expected ShortRead, got {:?}", other.map(|f| f.to_vec())),
    }
}

#[test]
fn open_rejects_mismatched_length() {
    let mut bytes = stereo_16_bytes(&[[1, 2], [3, 4]]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    match WavReader::new(io::Cursor::new(bytes)) {
        Err(Error::InconsistentHeader { field: "chunk size", .. }) => {}
        other => panic!("expected a size mismatch, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn into_inner_returns_the_stream() {
    let bytes = stereo_16_bytes(&[[1, 2]]);
    let reader = WavReader::new(io::Cursor::new(bytes.clone())).unwrap();
    assert_eq!(reader.into_inner().into_inner(), bytes);
}
