//! Benchmark for `.osu` parsing, writing and rate scaling.

use std::fmt::Write as _;

use criterion::{Criterion, Throughput};
use mania_rate::{document::BeatmapDocument, transform::scale_document};

/// Hand-written fixtures, embedded so the benchmark runs from any directory.
const FIXTURES: [(&str, &str); 2] = [
    ("two_tempo_4k", include_str!("../tests/files/two_tempo_4k.osu")),
    ("legacy_7k", include_str!("../tests/files/legacy_7k.osu")),
];

/// A 7K map with a hold every fifth note and a tempo change every thousand notes.
fn generated_map(notes: usize) -> (String, String) {
    let mut source = String::from(
        "osu file format v14\n\n[General]\nAudioFilename: audio.mp3\nMode: 3\n\n[Metadata]\n\
         Version:Generated\n\n[Difficulty]\nCircleSize:7\n\n[TimingPoints]\n",
    );
    for change in 0..notes.div_ceil(1000) {
        let beat_length = if change % 2 == 0 { 400 } else { 300 };
        let _ = writeln!(source, "{},{beat_length},4,2,0,100,1,0", change * 75_000);
    }
    source.push_str("\n[HitObjects]\n");
    for index in 0..notes {
        let column = (index * 3) % 7;
        let x = (2 * column + 1) * 256 / 7;
        let time = index * 75;
        if index % 5 == 0 {
            let _ = writeln!(source, "{x},192,{time},128,0,{}:0:0:0:0:", time + 300);
        } else {
            let _ = writeln!(source, "{x},192,{time},1,0,0:0:0:0:");
        }
    }
    (format!("generated_{notes}"), source)
}

fn bench_inputs() -> Vec<(String, String)> {
    FIXTURES
        .iter()
        .map(|(name, source)| ((*name).to_string(), (*source).to_string()))
        .chain([500, 5_000].map(generated_map))
        .collect()
}

fn bench_parse(c: &mut Criterion, inputs: &[(String, String)]) {
    let mut group = c.benchmark_group("parse_beatmap");
    for (name, source) in inputs {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| BeatmapDocument::parse(std::hint::black_box(source)));
        });
    }
    group.finish();
}

fn bench_unparse(c: &mut Criterion, inputs: &[(String, String)]) {
    let mut group = c.benchmark_group("unparse_beatmap");
    for (name, source) in inputs {
        let document = BeatmapDocument::parse(source)
            .expect("benchmark input must parse")
            .document;
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| std::hint::black_box(&document).to_osu_string());
        });
    }
    group.finish();
}

fn bench_scale(c: &mut Criterion) {
    let (name, source) = generated_map(5_000);
    let document = BeatmapDocument::parse(&source)
        .expect("generated map must parse")
        .document;
    let mut group = c.benchmark_group("scale_document");
    group.throughput(Throughput::Elements(5_000));
    for rate in [0.75, 1.5] {
        group.bench_function(format!("{name}@{rate}x"), |b| {
            b.iter(|| scale_document(std::hint::black_box(&document), std::hint::black_box(rate)));
        });
    }
    group.finish();
}

fn main() {
    let inputs = bench_inputs();
    let mut criterion = Criterion::default();
    bench_parse(&mut criterion, &inputs);
    bench_unparse(&mut criterion, &inputs);
    bench_scale(&mut criterion);
}
