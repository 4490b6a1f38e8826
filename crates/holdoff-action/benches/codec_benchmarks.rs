//! Benchmarks for payload encoding and command replay.
//!
//! Every queued call is encoded once and decoded once when the scheduler
//! applies it, so both directions are measured on realistic commands, from
//! a bare flag to a long package list.

use std::collections::BTreeSet;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use holdoff_action::{codec, PolicyCommand};

/// A representative mix of commands, weighted towards the small ones.
fn sample_commands() -> Vec<PolicyCommand> {
    let packages: Vec<String> = (0..50).map(|i| format!("com.example.app{}", i)).collect();
    let ids: BTreeSet<String> = (0..10).map(|i| format!("affiliation-{}", i)).collect();
    vec![
        PolicyCommand::SetCameraDisabled(true),
        PolicyCommand::LockNow,
        PolicyCommand::SetPasswordQuality(0x50000),
        PolicyCommand::RemoveUser(1 << 40),
        PolicyCommand::SetSecureSetting {
            setting: "install_non_market_apps".to_string(),
            value: None,
        },
        PolicyCommand::SetPackagesSuspended {
            packages,
            suspended: true,
        },
        PolicyCommand::SetAffiliationIds(ids),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let commands = sample_commands();

    let mut group = c.benchmark_group("codec_encode");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("flag", |b| {
        let command = &commands[0];
        b.iter(|| black_box(command.encode().unwrap()));
    });

    group.bench_function("mixed", |b| {
        b.iter(|| {
            for command in &commands {
                black_box(command.encode().unwrap());
            }
        });
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let encoded: Vec<(&'static str, String)> = sample_commands()
        .iter()
        .map(|command| (command.tag(), command.encode().unwrap()))
        .collect();

    let mut group = c.benchmark_group("codec_decode");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("params_only", |b| {
        b.iter(|| {
            for (_, payload) in &encoded {
                black_box(codec::decode(payload).unwrap());
            }
        });
    });

    // Full replay path: text to typed command.
    group.bench_function("replay", |b| {
        b.iter(|| {
            for (tag, payload) in &encoded {
                black_box(PolicyCommand::from_payload(tag, payload).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
