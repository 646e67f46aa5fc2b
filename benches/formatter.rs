//! Benchmark suite for the output formatters.
//!
//! Isolates formatter performance from async runtime overhead to enable
//! precise measurement of record building and serialization.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use eddystone_listener::output::json::JsonFormatter;
use eddystone_listener::output::text::TextFormatter;
use eddystone_listener::{DiscoveredDevice, OutputFormatter, UrlDeviceBuilder};

const TEST_URL: &str = "https://example.org/beacons";

/// Record as emitted for a labelled beacon with every extra populated
fn full_device() -> DiscoveredDevice {
    UrlDeviceBuilder::new(format!("ble-url:AA:BB:CC:DD:EE:FF:{TEST_URL}"), TEST_URL)
        .set_scan_time_millis(12_345)
        .and_then(|b| b.set_rssi(-70))
        .and_then(|b| b.set_tx_power(-20))
        .and_then(|b| b.set_device_type("ble"))
        .and_then(|b| b.set_title("Lobby sign"))
        .and_then(|b| b.set_description("Building A"))
        .and_then(|b| b.set_public())
        .unwrap()
        .build()
}

/// Record with only the URL and scan time
fn minimal_device() -> DiscoveredDevice {
    UrlDeviceBuilder::new("ble-url:AA:BB:CC:DD:EE:FF:http://a.co", "http://a.co")
        .set_scan_time_millis(0)
        .unwrap()
        .build()
}

fn bench_formatters(c: &mut Criterion) {
    let mut group = c.benchmark_group("formatter");
    group.throughput(Throughput::Elements(1));

    let full = full_device();
    let minimal = minimal_device();

    group.bench_function("json_full", |b| {
        b.iter(|| JsonFormatter.format(black_box(&full)).unwrap())
    });
    group.bench_function("json_minimal", |b| {
        b.iter(|| JsonFormatter.format(black_box(&minimal)).unwrap())
    });
    group.bench_function("text_full", |b| {
        b.iter(|| TextFormatter.format(black_box(&full)).unwrap())
    });
    group.bench_function("text_minimal", |b| {
        b.iter(|| TextFormatter.format(black_box(&minimal)).unwrap())
    });

    group.finish();
}

/// Building the record dominates per-advertisement cost alongside formatting
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.throughput(Throughput::Elements(1));

    group.bench_function("full_device", |b| b.iter(full_device));
    group.bench_function("custom_extras", |b| {
        b.iter(|| {
            UrlDeviceBuilder::new("id", TEST_URL)
                .add_extra("battery", black_box(2.97))
                .and_then(|b| b.add_extra("firmware", "1.4.2"))
                .and_then(|b| b.add_extra("connectable", true))
                .unwrap()
                .build()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_formatters, bench_build);
criterion_main!(benches);
