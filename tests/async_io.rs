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

use std::io;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use pcmwav::{AsyncWavWriter, Error, WavReader, WavSpec};

fn spec() -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate: 100,
        bits_per_sample: 32,
    }
}

async fn write_ramp(path: &std::path::Path, frames: i32) {
    let mut writer = AsyncWavWriter::create(path, spec()).await.unwrap();
    for i in 0..frames {
        writer.write(&[i, i * 10]).await.unwrap();
    }
    writer.finalize().await.unwrap();
}

#[tokio::test]
async fn async_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("async.wav");
    write_ramp(&path, 64).await;

    let mut reader = WavReader::open_async(&path).await.unwrap();
    assert_eq!(reader.len(), 64);
    assert_eq!(reader.duration(), 0.64);

    {
        let mut samples = reader.samples_async().await.unwrap();
        let mut n = 0;
        while let Some(next) = samples.next().await {
            let (time, values) = next.unwrap();
            assert_eq!(values, vec![n, n * 10]);
            assert_eq!(time, n as f64 / 100.0);
            n += 1;
        }
        assert_eq!(n, 64);
    }

    // The blocking API reads the same file.
    assert_eq!(reader.frame(7).unwrap().to_vec(), vec![7, 70]);

    let mut right = reader.channel_samples_async(1).await.unwrap();
    let mut sum = 0;
    while let Some(next) = right.next().await {
        sum += next.unwrap().1;
    }
    assert_eq!(sum, (0..64).sum::<i64>() * 10);
}

#[tokio::test]
async fn progress_is_reported_per_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.wav");
    write_ramp(&path, 4).await;

    let mut reader = WavReader::open_async(&path).await.unwrap();
    let mut reports = Vec::new();
    {
        let mut shared = reader.shared_samples_async()
                               .await
                               .unwrap()
                               .with_progress(|p| reports.push(p));
        let mut total = 0;
        while let Some(next) = shared.next_shared().await {
            let (_, values) = next.unwrap();
            total += values[0];
        }
        assert_eq!(total, 6);
    }
    assert_eq!(reports, vec![0.0, 0.25, 0.5, 0.75]);
}

#[tokio::test]
async fn cancelled_enumeration_stops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cancel.wav");
    write_ramp(&path, 10).await;

    let mut reader = WavReader::open_async(&path).await.unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let mut calls = 0;
    let mut samples = reader.samples_async()
                            .await
                            .unwrap()
                            .with_cancel(token)
                            .with_progress(move |_| {
                                calls += 1;
                                if calls == 3 {
                                    trigger.cancel();
                                }
                            });

    let mut ok = 0;
    loop {
        match samples.next().await {
            Some(Ok(..)) => ok += 1,
            Some(Err(Error::Cancelled)) => break,
            Some(Err(other)) => panic!("expected Cancelled, got {:?}", other),
            None => panic!("enumeration ended without noticing the cancellation"),
        }
    }
    assert_eq!(ok, 3);
    assert!(samples.next().await.is_none());
}

#[tokio::test]
async fn batch_write_reports_frame_counter() {
    let mut buffer = io::Cursor::new(Vec::new());
    let mut counts = Vec::new();
    {
        let mut writer = AsyncWavWriter::new(&mut buffer, spec()).await.unwrap();
        let token = CancellationToken::new();
        let n = writer.write_channels_with(vec![0..5, 100..200], &token, |c| counts.push(c))
                      .await
                      .unwrap();
        assert_eq!(n, 5);
        assert_eq!(writer.data_len(), 40);
        writer.finalize().await.unwrap();
    }
    assert_eq!(counts, vec![1, 2, 3, 4, 5]);

    buffer.set_position(0);
    let mut reader = WavReader::new_async(&mut buffer).await.unwrap();
    let mut samples = reader.samples_async().await.unwrap();
    let mut frames = Vec::new();
    while let Some(next) = samples.next().await {
        frames.push(next.unwrap().1);
    }
    assert_eq!(frames, vec![vec![0, 100], vec![1, 101], vec![2, 102], vec![3, 103], vec![4, 104]]);
}

#[tokio::test]
async fn cancelled_batch_write_writes_nothing() {
    let mut buffer = io::Cursor::new(Vec::new());
    let mut writer = AsyncWavWriter::new(&mut buffer, spec()).await.unwrap();
    let token = CancellationToken::new();
    token.cancel();
    match writer.write_channels_with(vec![vec![1i32, 2], vec![3i32, 4]], &token, |_| {}).await {
        Err(Error::Cancelled) => {}
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert_eq!(writer.data_len(), 0);
    writer.finalize().await.unwrap();
}

#[tokio::test]
async fn unfinalized_async_writer_leaves_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unfinished.wav");
    {
        let mut writer = AsyncWavWriter::create(&path, spec()).await.unwrap();
        writer.write(&[1i32, 2]).await.unwrap();
        writer.data_writer().flush().await.unwrap();
    }
    let bytes = tokio::fs::read(&path).await.unwrap();
    assert_eq!(bytes.len(), 52);
    assert!(bytes[..44].iter().all(|&b| b == 0));
    match WavReader::open_async(&path).await {
        Err(Error::FormatError(..)) => {}
        Err(other) => panic!("expected FormatError, got {:?}", other),
        Ok(..) => panic!("a placeholder header should not parse"),
    }
}

#[tokio::test]
async fn forward_async_stream_is_single_pass() {
    let mut buffer = io::Cursor::new(Vec::new());
    {
        let mut writer = AsyncWavWriter::new(&mut buffer, spec()).await.unwrap();
        writer.write_raw(&[1, 0, 0, 0, 2, 0, 0, 0]).await.unwrap();
        writer.finalize().await.unwrap();
    }
    let bytes = buffer.into_inner();

    let mut reader = WavReader::new_forward_async(&bytes[..]).await.unwrap();
    assert_eq!(reader.len(), 1);
    {
        let mut samples = reader.samples_async().await.unwrap();
        assert_eq!(samples.next().await.unwrap().unwrap().1, vec![1, 2]);
        assert!(samples.next().await.is_none());
    }

    let mut again = reader.samples_async().await.unwrap();
    assert!(again.next().await.is_none());
}
