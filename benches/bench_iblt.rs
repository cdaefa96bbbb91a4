/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use iblt::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const VALUE_SIZE: usize = 8;

fn pairs(n: usize) -> Vec<(u64, [u8; VALUE_SIZE])> {
    let mut rng = SmallRng::seed_from_u64(0);
    (0..n).map(|_| (rng.gen(), rng.gen())).collect()
}

fn filled(n: usize) -> Iblt {
    let mut table = Iblt::new(n, VALUE_SIZE);
    for (key, value) in pairs(n) {
        table.insert(key, value).unwrap();
    }
    table
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for n in [100, 1000, 10000] {
        let pairs = pairs(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut table = Iblt::new(n, VALUE_SIZE);
                for (key, value) in &pairs {
                    table.insert(black_box(*key), value).unwrap();
                }
                table
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    for n in [100, 1000, 10000] {
        let table = filled(n);
        let pairs = pairs(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % pairs.len();
                black_box(table.get(black_box(pairs[i].0)))
            });
        });
    }
    group.finish();
}

fn bench_list_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_entries");
    for n in [100, 1000, 10000] {
        let table = filled(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(table.list_entries()));
        });
    }
    group.finish();
}

fn bench_subtract(c: &mut Criterion) {
    let mut group = c.benchmark_group("subtract");
    for n in [100, 1000, 10000] {
        let a = filled(n);
        let mut b_table = a.clone();
        for (key, value) in pairs(n).into_iter().take(n / 10) {
            b_table.erase(key, value).unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(a.subtract(&b_table).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_get,
    bench_list_entries,
    bench_subtract
);
criterion_main!(benches);
