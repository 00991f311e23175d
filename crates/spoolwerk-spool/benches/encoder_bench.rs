// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the payload encoder.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use base64::{Engine as _, engine::general_purpose};
use spoolwerk_core::types::PayloadBody;
use spoolwerk_spool::encoder::encode;

fn bench_encode_text(c: &mut Criterion) {
    let short = PayloadBody::Text("Order #1042 -- 2x espresso".into());
    let long = PayloadBody::Text("line\n".repeat(500));

    c.bench_function("encode_text_short", |b| {
        b.iter(|| encode(black_box(&short)).expect("encode"))
    });
    c.bench_function("encode_text_long", |b| {
        b.iter(|| encode(black_box(&long)).expect("encode"))
    });
}

fn bench_encode_raw(c: &mut Criterion) {
    let blob = general_purpose::STANDARD.encode(vec![0x5Au8; 16 * 1024]);
    let raw = PayloadBody::RawBase64(blob);

    c.bench_function("encode_raw_16k", |b| {
        b.iter(|| encode(black_box(&raw)).expect("encode"))
    });
}

criterion_group!(benches, bench_encode_text, bench_encode_raw);
criterion_main!(benches);
