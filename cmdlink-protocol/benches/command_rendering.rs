use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use cmdlink_protocol::{Arg, Classifier, Command};

fn render(c: &mut Criterion) {
    let cmd = Command::builder("move", "MOVE {} {:04} {:02X}\r\n")
        .validate(r"^MOVE [A-Z]+ -?[0-9]{4} [0-9A-F]{2}\r\n$")
        .build()
        .expect("Command should build");
    let args = [Arg::from("AXIS"), Arg::from(1234), Arg::from(0x5au8)];

    c.bench_function("render with validation", |b| {
        b.iter(|| cmd.render(black_box(&args)))
    });
}

fn classify(c: &mut Criterion) {
    let cmd = Command::builder("status", "STAT?\r\n")
        .success(r"STAT [0-9]+\r\n")
        .failure(r"ERR [0-9]+\r\n")
        .build()
        .expect("Command should build");
    let mut accumulated = vec![b'.'; 4096];
    accumulated.extend_from_slice(b"STAT 12\r\n");

    c.bench_function("classify 4 KiB", |b| {
        b.iter(|| cmd.classify(black_box(&accumulated)))
    });
}

criterion_group!(benches, render, classify);
criterion_main!(benches);
