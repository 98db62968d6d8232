//! End-to-end answer-selection scenarios against a zone loaded from its
//! JSON form, the way the server loads them.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::Ipv4Addr;
use std::sync::Arc;

use zoned_resolver::lookup::{find_labels, Lookup};
use zoned_resolver::metrics::Metrics;
use zoned_resolver::rop::{MemoryRopStore, RopList};
use zoned_resolver::{resolve, ResolvedAnswer};
use zoned_types::protocol::types::*;
use zoned_types::zones::types::Zone;

const ZONE_JSON: &str = r#"{
    "serial": 3,
    "ttl": 600,
    "max_hosts": 2,
    "contact": "support.example.com",
    "targeting": "@ continent country",
    "data": {
        "": {
            "ns": ["ns1.example.net", "ns2.example.net"],
            "mx": { "mx.example.net": 10, "mx2.example.net": 20 },
            "spf": "v=spf1 ~all"
        },
        "europe": { "mx": "mx-eu.example.net" },
        "bar": { "a": [["192.168.1.2", 100]] },
        "bar.no": {},
        "www": { "cname": "geo.bitnames.com." },
        "foo": { "txt": "this is foo" },
        "weight": { "max_hosts": 1, "txt": ["w1000", "w1"] },
        "a.b.c": { "a": "192.168.1.7" },
        "three.two.one": { "a": "192.168.1.5" },
        "one": { "a": "192.168.1.6" },
        "*.svc": { "a": "10.1.1.1" },
        "rop-sv4-5": { "a": "10.9.9.9" },
        "client*": { "alias": "rop-sv4-5", "rop": true }
    }
}"#;

fn origin() -> DomainName {
    DomainName::from_dotted_string("test.example.com.").unwrap()
}

fn zone() -> Zone {
    Zone::deserialise(&origin(), ZONE_JSON).unwrap()
}

fn targets(ts: &[&str]) -> Vec<String> {
    ts.iter().map(|s| (*s).to_string()).collect()
}

async fn lookup<'z>(
    zone: &'z Zone,
    leaf: &str,
    ts: &[&str],
    accepted: &[RecordType],
) -> Lookup<'z> {
    find_labels(zone, leaf, &targets(ts), accepted, None, &mut Metrics::new())
        .await
        .unwrap()
}

fn a_addresses(lookup: &Lookup) -> Vec<Ipv4Addr> {
    match lookup {
        Lookup::Found { label, qtype } => label
            .records_of(*qtype)
            .iter()
            .filter_map(|r| match r.data {
                RecordData::A { address } => Some(address),
                _ => None,
            })
            .collect(),
        other => panic!("expected Found, got {other:?}"),
    }
}

// S1: the empty geo label is skipped and the apex-relative label answers
#[tokio::test]
async fn empty_geo_label_skipped() {
    let zone = zone();
    let found = lookup(&zone, "bar", &["no", "europe", "@"], &[RecordType::A]).await;

    assert_eq!(vec![Ipv4Addr::new(192, 168, 1, 2)], a_addresses(&found));
    assert!(matches!(
        found,
        Lookup::Found {
            qtype: RecordType::A,
            ..
        }
    ));
}

// S2: apex MX without geo targeting
#[tokio::test]
async fn apex_mx() {
    let zone = zone();
    let found = lookup(&zone, "", &["@"], &[RecordType::MX]).await;

    match found {
        Lookup::Found { label, qtype } => {
            assert_eq!(RecordType::MX, qtype);
            let mxs = label.records_of(RecordType::MX);
            assert_eq!(2, mxs.len());
            let exchanges: Vec<String> = mxs
                .iter()
                .map(|r| match &r.data {
                    RecordData::MX { exchange, .. } => exchange.to_dotted_string(),
                    other => panic!("expected MX, got {other:?}"),
                })
                .collect();
            assert_eq!(vec!["mx.example.net.", "mx2.example.net."], exchanges);
        }
        other => panic!("expected Found, got {other:?}"),
    }
}

// S3: a geo label narrows the answer
#[tokio::test]
async fn geo_narrowing() {
    let zone = zone();
    let found = lookup(&zone, "", &["dk", "europe", "@"], &[RecordType::MX]).await;

    match found {
        Lookup::Found { label, qtype } => {
            assert_eq!(RecordType::MX, qtype);
            let mxs = label.records_of(RecordType::MX);
            assert_eq!(1, mxs.len());
            assert!(matches!(
                &mxs[0].data,
                RecordData::MX { exchange, .. }
                    if exchange.to_dotted_string() == "mx-eu.example.net."
            ));
        }
        other => panic!("expected Found, got {other:?}"),
    }
}

// S4: the accepted-type order decides, not the zone contents
#[tokio::test]
async fn type_ordering_prefers_cname() {
    let zone = zone();
    let found = lookup(&zone, "www", &["@"], &[RecordType::CNAME, RecordType::A]).await;

    match found {
        Lookup::Found { label, qtype } => {
            assert_eq!(RecordType::CNAME, qtype);
            assert_eq!(1, label.records_of(RecordType::CNAME).len());
        }
        other => panic!("expected Found, got {other:?}"),
    }
}

// S5: wildcard + alias + override: the blacklisted target falls back
#[tokio::test]
async fn wildcard_alias_override_falls_back() {
    let mut store = MemoryRopStore::new();
    store.insert(
        "client",
        "155",
        &RopList {
            list: vec!["sv4-5".to_string()],
            is_out: true,
        },
    );

    let mut zone = zone();
    zone.rop = Some(Arc::new(store));

    let qname = DomainName::from_dotted_string("client155.test.example.com.").unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let (metrics, answer) = resolve(
        &zone,
        &qname,
        RecordType::A,
        &targets(&["us", "north-america", "@"]),
        &mut rng,
    )
    .await;

    match answer.unwrap() {
        ResolvedAnswer::Answer { rrs } => {
            assert_eq!(1, rrs.len());
            assert_eq!(qname, rrs[0].name);
            assert_eq!(
                RecordData::A {
                    address: Ipv4Addr::new(10, 9, 9, 9)
                },
                rrs[0].data
            );
        }
        other => panic!("expected answer, got {other:?}"),
    }
    assert_eq!(1, metrics.rop_lookups);
    assert_eq!(1, metrics.rop_overrides);
}

// S5 counterpart: a client the override does not blacklist follows the
// alias as-is
#[tokio::test]
async fn wildcard_alias_without_override_serves_the_target() {
    let mut zone = zone();
    zone.rop = Some(Arc::new(MemoryRopStore::new()));

    let qname = DomainName::from_dotted_string("client200.test.example.com.").unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let (_, answer) = resolve(&zone, &qname, RecordType::A, &targets(&["@"]), &mut rng).await;

    match answer.unwrap() {
        ResolvedAnswer::Answer { rrs } => {
            assert_eq!(
                RecordData::A {
                    address: Ipv4Addr::new(10, 9, 9, 9)
                },
                rrs[0].data
            );
        }
        other => panic!("expected answer, got {other:?}"),
    }
}

// S6: a wildcard match with no records of the asked type is NOERROR
#[tokio::test]
async fn wildcard_wrong_type_is_noerror_empty() {
    let zone = zone();
    let found = lookup(&zone, "x.svc", &["@"], &[RecordType::AAAA]).await;
    assert_eq!(Lookup::TypeEmpty, found);

    let qname = DomainName::from_dotted_string("x.svc.test.example.com.").unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let (_, answer) = resolve(&zone, &qname, RecordType::AAAA, &targets(&["@"]), &mut rng).await;
    assert_eq!(Ok(ResolvedAnswer::Answer { rrs: Vec::new() }), answer);
}

#[tokio::test]
async fn apex_ns_and_spf() {
    let zone = zone();

    match lookup(&zone, "", &["@"], &[RecordType::NS]).await {
        Lookup::Found { label, qtype } => {
            assert_eq!(RecordType::NS, qtype);
            assert_eq!(2, label.records_of(RecordType::NS).len());
        }
        other => panic!("expected Found, got {other:?}"),
    }

    match lookup(&zone, "", &["@"], &[RecordType::SPF]).await {
        Lookup::Found { label, .. } => {
            assert!(matches!(
                &label.records_of(RecordType::SPF)[0].data,
                RecordData::SPF { text } if text == "v=spf1 ~all"
            ));
        }
        other => panic!("expected Found, got {other:?}"),
    }
}

#[tokio::test]
async fn max_hosts_respected_on_the_wire() {
    let zone = zone();
    let qname = DomainName::from_dotted_string("weight.test.example.com.").unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    let (_, answer) = resolve(&zone, &qname, RecordType::TXT, &targets(&["@"]), &mut rng).await;
    match answer.unwrap() {
        ResolvedAnswer::Answer { rrs } => assert_eq!(1, rrs.len()),
        other => panic!("expected answer, got {other:?}"),
    }
}

#[tokio::test]
async fn intermediate_labels_answer_noerror() {
    let zone = zone();

    let found = lookup(&zone, "a.b.c", &["@"], &[RecordType::A]).await;
    assert_eq!(vec![Ipv4Addr::new(192, 168, 1, 7)], a_addresses(&found));

    // created as a side effect of a.b.c, empty but present
    let miss = lookup(&zone, "b.c", &["@"], &[RecordType::A]).await;
    match miss {
        Lookup::Miss { label: Some(label) } => {
            assert_eq!("b.c", label.label);
            assert!(!label.has(RecordType::A));
        }
        other => panic!("expected empty label, got {other:?}"),
    }

    let found = lookup(&zone, "three.two.one", &["@"], &[RecordType::A]).await;
    assert_eq!(vec![Ipv4Addr::new(192, 168, 1, 5)], a_addresses(&found));

    // "one" was defined before "three.two.one" filled in the gaps: the
    // explicit records survive
    let found = lookup(&zone, "one", &["@"], &[RecordType::A]).await;
    assert_eq!(vec![Ipv4Addr::new(192, 168, 1, 6)], a_addresses(&found));

    let miss = lookup(&zone, "two.one", &["@"], &[RecordType::A]).await;
    assert!(matches!(miss, Lookup::Miss { label: Some(_) }));
}

#[tokio::test]
async fn nxdomain_only_without_any_match() {
    let zone = zone();
    let miss = lookup(&zone, "definitely.not.here", &["@"], &[RecordType::A]).await;
    assert_eq!(Lookup::Miss { label: None }, miss);
}

#[tokio::test]
async fn resolution_is_deterministic_for_a_seed() {
    let zone = zone();
    let qname = DomainName::from_dotted_string("bar.test.example.com.").unwrap();

    let (_, first) = resolve(
        &zone,
        &qname,
        RecordType::A,
        &targets(&["@"]),
        &mut StdRng::seed_from_u64(1234),
    )
    .await;
    let (_, second) = resolve(
        &zone,
        &qname,
        RecordType::A,
        &targets(&["@"]),
        &mut StdRng::seed_from_u64(1234),
    )
    .await;

    assert_eq!(first, second);
}
