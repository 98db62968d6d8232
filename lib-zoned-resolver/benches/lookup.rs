use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::net::Ipv4Addr;

use zoned_resolver::lookup::find_labels;
use zoned_resolver::metrics::Metrics;
use zoned_types::protocol::types::{DomainName, RecordData, RecordType};
use zoned_types::zones::types::{Record, Zone};

fn bench_zone() -> Zone {
    let origin = DomainName::from_dotted_string("bench.example.com.").unwrap();
    let mut zone = Zone::new(origin);

    for i in 0..500u32 {
        let label = zone.add_label(&format!("host-{i}"));
        label.add_record(Record {
            data: RecordData::A {
                address: Ipv4Addr::from(0x0a00_0000 + i),
            },
            ttl: 300,
            weight: i % 7,
        });
    }

    for country in ["us", "de", "jp", "br"] {
        for i in 0..50u32 {
            let label = zone.add_label(&format!("host-{i}.{country}"));
            label.add_record(Record {
                data: RecordData::A {
                    address: Ipv4Addr::from(0x0a10_0000 + i),
                },
                ttl: 300,
                weight: 0,
            });
        }
    }

    zone.add_label("*.svc").add_record(Record {
        data: RecordData::A {
            address: Ipv4Addr::new(10, 99, 99, 99),
        },
        ttl: 300,
        weight: 0,
    });

    zone
}

fn targets(ts: &[&str]) -> Vec<String> {
    ts.iter().map(|s| (*s).to_string()).collect()
}

fn benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let zone = bench_zone();
    let accepted = [RecordType::Alias, RecordType::CNAME, RecordType::A];

    let geo = targets(&["us-west", "us-ca", "us", "north-america", "@"]);
    c.bench_function("find_labels geo hit", |b| {
        b.iter(|| {
            rt.block_on(find_labels(
                black_box(&zone),
                black_box("host-7"),
                &geo,
                &accepted,
                None,
                &mut Metrics::new(),
            ))
        });
    });

    let at = targets(&["@"]);
    c.bench_function("find_labels exact hit", |b| {
        b.iter(|| {
            rt.block_on(find_labels(
                black_box(&zone),
                black_box("host-400"),
                &at,
                &accepted,
                None,
                &mut Metrics::new(),
            ))
        });
    });

    c.bench_function("find_labels wildcard hit", |b| {
        b.iter(|| {
            rt.block_on(find_labels(
                black_box(&zone),
                black_box("anything.svc"),
                &at,
                &accepted,
                None,
                &mut Metrics::new(),
            ))
        });
    });

    c.bench_function("find_labels miss", |b| {
        b.iter(|| {
            rt.block_on(find_labels(
                black_box(&zone),
                black_box("no.such.name"),
                &geo,
                &accepted,
                None,
                &mut Metrics::new(),
            ))
        });
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
