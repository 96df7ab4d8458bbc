// Pcmwav -- A PCM wav codec in Rust
// Copyright 2024 The pcmwav developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Without the length check, more inputs get past the header and into
    // the frame decoding paths.
    let options = pcmwav::ReadOptions { verify_length: false };
    let mut reader = match pcmwav::WavReader::new_with(Cursor::new(data), options) {
        Ok(r) => r,
        Err(..) => return,
    };

    let frames = reader.len();
    for sample in reader.samples().into_iter().flatten() {
        if sample.is_err() {
            return;
        }
    }

    // Random access must agree with the header: either a frame or an error.
    for index in [0, frames / 2, frames.saturating_sub(1), frames] {
        let _ = reader.frame(index).map(|f| f.to_string());
    }
    let _ = reader.all_channels();
});
