//! Hot-path benchmarks
//!
//! Measures the non-I/O work every operation pays before a backend call:
//! PII detection, redaction, restoration and routing-table lookup.
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::str::FromStr;
use supportroute::{
    config::Config,
    operation::{OperationClass, Priority},
    privacy::{PiiDetector, restore},
    router::RoutingTable,
};

const CLEAN: &str = "My order has not arrived yet, can you check the delivery status?";
const MIXED: &str = "Hi, I'm reachable at jane.doe@example.com or +1 (555) 123-4567. \
    Please refund card 4111 1111 1111 1111 and ship to 221 Baker Street. \
    Login came from 192.168.10.24.";

fn bench_detection(c: &mut Criterion) {
    let detector = PiiDetector::new(0.5).unwrap();
    let long = MIXED.repeat(200);
    let inputs = [("clean", CLEAN), ("mixed", MIXED), ("long", long.as_str())];

    let mut group = c.benchmark_group("pii_detection");
    for (name, text) in inputs {
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |b, t| {
            b.iter(|| detector.detect(black_box(t)));
        });
    }
    group.finish();
}

fn bench_redact_and_restore(c: &mut Criterion) {
    let detector = PiiDetector::new(0.5).unwrap();
    let (findings, redaction) = detector.scan(MIXED);

    c.bench_function("redact", |b| {
        b.iter(|| detector.redact(black_box(MIXED), black_box(&findings)));
    });

    c.bench_function("restore", |b| {
        b.iter(|| restore(black_box(&redaction.text), black_box(&redaction.map)));
    });
}

fn bench_rule_lookup(c: &mut Criterion) {
    let config = Config::from_str(supportroute::cli::generate_config_template()).unwrap();
    let table = RoutingTable::from_rules(&config.routing.rules);

    c.bench_function("rule_lookup", |b| {
        b.iter(|| {
            table.lookup(
                black_box(OperationClass::Standard),
                black_box(Priority::High),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_detection,
    bench_redact_and_restore,
    bench_rule_lookup
);
criterion_main!(benches);
