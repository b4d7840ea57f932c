use bilitidy::config::Config;
use bilitidy::metadata::read_metadata;
use bilitidy::scanner::discover;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs;
use tempfile::TempDir;

/// Build a synthetic cache export with `size` units spread over collections
fn create_test_cache(size: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let cache_root = temp_dir.path();

    for i in 0..size {
        let unit = cache_root.join(format!("s_{}/{}", i % 10, 1000 + i));

        // Mostly split audio/video units (70%), the rest legacy fragments
        if i % 10 < 7 {
            let asset_dir = unit.join("64");
            fs::create_dir_all(&asset_dir).unwrap();
            fs::write(
                unit.join("entry.json"),
                format!(
                    r#"{{"media_type": 2, "type_tag": "64", "title": "Collection {}", "page_data": {{"part": "Episode {}"}}}}"#,
                    i % 10,
                    i
                ),
            )
            .unwrap();
            fs::write(asset_dir.join("audio.m4s"), "a").unwrap();
            fs::write(asset_dir.join("video.m4s"), "v").unwrap();
        } else {
            let asset_dir = unit.join("lua.flv360.bilibili2api.16");
            fs::create_dir_all(&asset_dir).unwrap();
            fs::write(
                unit.join("entry.json"),
                format!(
                    r#"{{"media_type": 1, "type_tag": "lua.flv360.bilibili2api.16", "title": "Collection {}", "page_data": {{"part": "Episode {}"}}}}"#,
                    i % 10,
                    i
                ),
            )
            .unwrap();
            for fragment in 0..3 {
                fs::write(asset_dir.join(format!("{fragment}.flv")), "x").unwrap();
            }
        }
    }

    temp_dir
}

fn bench_scan_small(c: &mut Criterion) {
    let temp_dir = create_test_cache(50);
    let config = Config::default();

    c.bench_function("scan_50_units", |b| {
        b.iter(|| {
            let units = discover(temp_dir.path(), &config).unwrap();
            black_box(units);
        });
    });
}

fn bench_scan_medium(c: &mut Criterion) {
    let temp_dir = create_test_cache(200);
    let config = Config::default();

    c.bench_function("scan_200_units", |b| {
        b.iter(|| {
            let units = discover(temp_dir.path(), &config).unwrap();
            black_box(units);
        });
    });
}

fn bench_scan_large(c: &mut Criterion) {
    let temp_dir = create_test_cache(500);
    let config = Config::default();

    c.bench_function("scan_500_units", |b| {
        b.iter(|| {
            let units = discover(temp_dir.path(), &config).unwrap();
            black_box(units);
        });
    });
}

fn bench_resolve_metadata(c: &mut Criterion) {
    let temp_dir = create_test_cache(200);
    let config = Config::default();
    let units = discover(temp_dir.path(), &config).unwrap();

    c.bench_function("resolve_200_descriptors", |b| {
        b.iter(|| {
            for unit in &units {
                let meta = read_metadata(&unit.dir, &config).unwrap();
                black_box(meta);
            }
        });
    });
}

criterion_group!(
    benches,
    bench_scan_small,
    bench_scan_medium,
    bench_scan_large,
    bench_resolve_metadata
);
criterion_main!(benches);
