//! Benchmarks table compilation and table-driven decoding.

#[macro_use] extern crate criterion;
extern crate dispatchgen;

use criterion::{Benchmark, Criterion, Throughput};
use dispatchgen::compiler::{compile_str, render};
use dispatchgen::runtime::Decoder;

static TABLE: &str = include_str!("../tables/8086.txt");

/// A DOS "hello world", followed by a string copy loop.
///
/// One instruction per line.
static DATA: &str = r#"
B8 00 00
8E D8
BA 0E 01
B4 09
CD 21
8B 1E 34 12
26 8B 07
03 46 FE
80 E9 05
D1 E0
FC
F3 A4
E2 F0
9A 78 56 34 12
B8 00 4C
CD 21
"#;

fn compile_8086(c: &mut Criterion) {
    let bytes = TABLE.len() as u32;

    c.bench("compile", Benchmark::new("8086 table", |b| {
        b.iter(|| criterion::black_box(compile_str(TABLE).unwrap()))
    }).throughput(Throughput::Bytes(bytes)));

    let compiled = compile_str(TABLE).unwrap();
    c.bench("render", Benchmark::new("8086 dispatch", move |b| {
        b.iter(|| criterion::black_box(render::render_dispatch(&compiled)))
    }));
}

fn decode_hello(c: &mut Criterion) {
    // expected instr count
    let icount = DATA.lines().filter(|line| !line.trim().is_empty()).count();
    let data: Vec<_> = DATA.split_whitespace()
        .map(|b| u8::from_str_radix(b, 16).unwrap())
        .collect();
    let bytes = data.len() as u32;
    let compiled = compile_str(TABLE).unwrap();

    c.bench("decode", Benchmark::new("hello world", move |b| {
        b.iter(|| {
            let mut decoder = Decoder::new(&compiled.tree, &data, 0x100);
            for _ in 0..icount {
                criterion::black_box(&decoder.decode_next().unwrap());
            }
        })
    }).throughput(Throughput::Bytes(bytes)));
}

criterion_group!(compile, compile_8086, decode_hello);
criterion_main!(compile);
