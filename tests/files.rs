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

use std::f64::consts::PI;
use std::fs;
use std::io;
use std::io::Seek;

use pcmwav::{Error, ReadOptions, Scale, WavReader, WavSpec, WavWriter};

fn stereo_spec() -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate: 8000,
        bits_per_sample: 16,
    }
}

fn write_ramp(path: &std::path::Path, frames: i16) {
    let mut writer = WavWriter::create(path, stereo_spec()).unwrap();
    for i in 0..frames {
        writer.write(&[i, -i]).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn five_seconds_of_sine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sine.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
    };

    let mut writer = WavWriter::create(&path, spec).unwrap();
    let mut time = 0.0;
    for i in 0..5 * 44100 {
        let t = i as f64 / 44100.0;
        time = writer.write(&[1000.0 * (2.0 * PI * 1000.0 * t).sin()]).unwrap();
    }
    assert_eq!(time, 5.0);
    writer.finalize().unwrap();

    let mut reader = WavReader::open(&path).unwrap();
    assert_eq!(reader.len(), 220500);
    assert_eq!(reader.frame_len(), 2);
    assert_eq!(reader.sample_len(), 2);
    assert_eq!(reader.data_len(), 441000);
    assert_eq!(reader.header().data_len, 441000);
    assert_eq!(reader.header().chunk_size, 441036);
    assert_eq!(reader.duration(), 5.0);
    assert_eq!(reader.dt(), 1.0 / 44100.0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 441044);

    let first = reader.frame(0).unwrap();
    assert_eq!(first.time(), 0.0);
    assert_eq!(first.to_vec(), vec![0]);

    let peak = reader.channel(0).unwrap().into_iter().map(|x| x.abs()).max().unwrap();
    assert_eq!(peak, 1000);
}

#[test]
fn enumeration_matches_random_access_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.wav");
    write_ramp(&path, 300);

    let mut reader = WavReader::open(&path).unwrap();
    let all: Vec<(f64, Vec<i64>)> = reader.samples().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(all.len(), reader.len() as usize);
    for (i, (time, values)) in all.iter().enumerate() {
        let frame = reader.frame(i as u32).unwrap();
        assert_eq!(*time, frame.time());
        assert_eq!(*values, frame.to_vec());
    }

    let left: Vec<i64> = reader.channel_samples(0).unwrap().map(|r| r.unwrap().1).collect();
    assert_eq!(left, reader.channel(0).unwrap());
    match reader.channel_samples(2) {
        Err(Error::ChannelOutOfRange { channel: 2, channels: 2 }) => {}
        Err(other) => panic!("expected ChannelOutOfRange, got {:?}", other),
        Ok(..) => panic!("expected ChannelOutOfRange"),
    }
}

#[test]
fn truncated_file_needs_relaxed_options() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.wav");
    write_ramp(&path, 10);
    // 40 bytes of data; keep 9 whole frames and one byte of the tenth.
    fs::OpenOptions::new().write(true).open(&path).unwrap().set_len(44 + 37).unwrap();

    match WavReader::open(&path) {
        Err(Error::InconsistentHeader { field: "chunk size", .. }) => {}
        Err(other) => panic!("expected a size mismatch, got {:?}", other),
        Ok(..) => panic!("a truncated file should not pass the length check"),
    }

    let options = ReadOptions { verify_length: false };
    let mut reader = WavReader::open_with(&path, options).unwrap();
    assert_eq!(reader.len(), 10);
    assert_eq!(reader.samples().unwrap().count(), 9);
    assert_eq!(reader.frame(8).unwrap().to_vec(), vec![8, -8]);
    match reader.frame(9) {
        Err(Error::OutOfRange { index: 9, frames: 10 }) => {}
        other => panic!("expected OutOfRange, got {:?}", other.map(|f| f.to_vec())),
    }
    match reader.channel(1) {
        Err(Error::ShortRead { index: 9, expected: 4, found: 1 }) => {}
        other => panic!("expected ShortRead, got {:?}", other),
    }
}

#[test]
fn clones_traverse_independently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clones.wav");
    write_ramp(&path, 50);

    let mut a = WavReader::open(&path).unwrap();
    let mut b = a.clone();
    let mut fast = a.samples().unwrap();
    let mut slow = b.samples().unwrap().step_by(2);
    for i in 0..25 {
        assert_eq!(fast.next().unwrap().unwrap().1, vec![i, -i]);
        assert_eq!(fast.next().unwrap().unwrap().1, vec![i + 1, -i - 1]);
        let (time, values) = slow.next().unwrap().unwrap();
        assert_eq!(values, vec![2 * i, -2 * i]);
        assert_eq!(time, (2 * i) as f64 / 8000.0);
    }
    assert!(fast.next().is_none());
    assert!(slow.next().is_none());
}

#[test]
fn scaled_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scaled.wav");
    let spec = WavSpec {
        channels: 2,
        sample_rate: 1000,
        bits_per_sample: 8,
    };
    let scale = Scale::with_amplitude(5.0).unwrap();
    let left: Vec<f64> = (0..100).map(|i| (i as f64 * 0.1).sin() * 4.0).collect();
    let right: Vec<f64> = (0..100).map(|i| (i as f64 * 0.1).cos() * 4.0).collect();

    let mut writer = WavWriter::create(&path, spec).unwrap().with_scale(scale);
    let n = writer.write_channels(vec![left.clone(), right.clone()]).unwrap();
    assert_eq!(n, 100);
    writer.finalize().unwrap();

    let mut reader = WavReader::open(&path).unwrap().with_scale(scale);
    let step = scale.resolution(8);
    let read = reader.all_channels_f64().unwrap();
    for (written, read) in [&left, &right].iter().zip(read.iter()) {
        for (a, b) in written.iter().zip(read.iter()) {
            assert!((a - b).abs() <= step, "{} came back as {}", a, b);
        }
    }
}

#[test]
fn write_file_writes_interleaved_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whole.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 10,
        bits_per_sample: 32,
    };
    let samples: Vec<i32> = (0..25).map(|x| x * 1000).collect();
    assert_eq!(pcmwav::write_file(&path, &samples, spec).unwrap(), 2.5);
    let mut reader = WavReader::open(&path).unwrap();
    let expected: Vec<i64> = samples.iter().map(|&x| x as i64).collect();
    assert_eq!(reader.channel(0).unwrap(), expected);

    let partial = dir.path().join("partial.wav");
    match pcmwav::write_file(&partial, &[1i16, 2, 3], stereo_spec()) {
        Err(Error::ArityMismatch { expected: 2, found: 1 }) => {}
        other => panic!("expected ArityMismatch, got {:?}", other),
    }
    assert!(!partial.exists());
}

#[test]
fn forward_stream_from_file_is_single_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forward.wav");
    write_ramp(&path, 20);

    let file = io::BufReader::new(fs::File::open(&path).unwrap());
    let mut reader = WavReader::new_forward(file).unwrap();
    assert_eq!(reader.len(), 20);
    assert_eq!(reader.frame(3).unwrap().to_vec(), vec![3, -3]);

    // The traversal starts from the beginning of the data, which is gone.
    assert_eq!(reader.samples().unwrap().count(), 0);
    match reader.frame(0) {
        Err(Error::Unsupported(..)) => {}
        other => panic!("expected Unsupported, got {:?}", other.map(|f| f.to_vec())),
    }
}

#[test]
fn borrowed_stream_stays_usable() {
    let mut buffer = io::Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, stereo_spec()).unwrap();
        writer.write(&[1i16, 2]).unwrap();
    }
    // The writer is gone but the stream is still ours.
    buffer.seek(io::SeekFrom::End(0)).unwrap();
    let end = buffer.position();
    assert_eq!(end, 48);

    {
        buffer.set_position(0);
        let mut reader = WavReader::new(&mut buffer).unwrap();
        assert_eq!(reader.frame(0).unwrap().to_string(), "00:00:00.0000000#1|2");
    }

    let reader = WavReader::new(buffer).unwrap();
    let buffer = reader.into_inner();
    assert_eq!(buffer.get_ref().len(), 48);
}
