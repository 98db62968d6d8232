//! Deserialisation of JSON zone files.
//!
//! A zone file is a JSON object: zone-wide options at the top level and a
//! `data` object mapping relative labels to their records.  Record values
//! come in several shapes for operator convenience; every shape normalises
//! into weighted [`Record`]s.
//!
//! ```json
//! {
//!     "serial": 3,
//!     "ttl": 600,
//!     "contact": "support.example.com",
//!     "targeting": "@ continent country",
//!     "data": {
//!         "": { "ns": ["ns1.example.net", "ns2.example.net"] },
//!         "bar": { "a": [["192.168.1.2", 100], ["192.168.1.3", 0]] },
//!         "www": { "cname": "bar" },
//!         "*.cdn": { "alias": "bar", "rop": true }
//!     }
//! }
//! ```

use serde_json::Value;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;
use crate::zones::types::*;

impl Zone {
    /// Parse a zone file.  The origin comes from the file name, not the
    /// file contents.
    ///
    /// # Errors
    ///
    /// If the JSON is malformed, an option or record value has the wrong
    /// shape, or the finished zone is missing apex NS records.
    pub fn deserialise(origin: &DomainName, data: &str) -> Result<Zone, Error> {
        let root: Value = serde_json::from_str(data).map_err(|err| Error::Json {
            message: err.to_string(),
        })?;
        let root = root.as_object().ok_or(Error::NotAnObject)?;

        let mut zone = Zone::new(origin.clone());

        for (key, value) in root {
            match key.as_str() {
                "serial" => zone.options.serial = parse_u32(key, value)?,
                "ttl" => zone.options.ttl = parse_u32(key, value)?,
                "max_hosts" => zone.options.max_hosts = parse_u32(key, value)? as usize,
                "contact" => {
                    zone.options.contact = value
                        .as_str()
                        .ok_or_else(|| Error::BadOption {
                            option: key.clone(),
                        })?
                        .to_string();
                }
                "targeting" => {
                    let s = value.as_str().ok_or_else(|| Error::BadOption {
                        option: key.clone(),
                    })?;
                    zone.options.targeting =
                        Targeting::parse(s).map_err(|err| Error::BadTargeting {
                            keyword: err.keyword,
                        })?;
                }
                "logging" => zone.logging = Some(parse_logging(value)?),
                "data" => {} // second pass, after the options are known
                _ => {
                    tracing::warn!(zone = %origin, option = %key, "ignoring unknown zone option");
                }
            }
        }

        let data = root
            .get("data")
            .and_then(Value::as_object)
            .ok_or(Error::MissingData)?;

        for (name, entry) in data {
            let entry = entry.as_object().ok_or_else(|| Error::BadLabel {
                label: name.clone(),
            })?;

            // label options first so records pick up the right TTL
            let mut ttl = zone.options.ttl;
            let mut max_hosts = zone.options.max_hosts;
            let mut check_rop = false;
            for (key, value) in entry {
                match key.as_str() {
                    "ttl" => ttl = parse_u32(key, value)?,
                    "max_hosts" => max_hosts = parse_u32(key, value)? as usize,
                    "rop" => {
                        check_rop = value.as_bool().ok_or_else(|| Error::BadOption {
                            option: key.clone(),
                        })?;
                    }
                    _ => {}
                }
            }

            let label = zone.add_label(name);
            label.ttl = ttl;
            label.max_hosts = max_hosts;
            label.check_rop = check_rop;

            for (key, value) in entry {
                if matches!(key.as_str(), "ttl" | "max_hosts" | "rop") {
                    continue;
                }
                let records = parse_records(origin, name, key, value, ttl)?;
                // re-borrow: add_label above may have re-sorted the table
                let label = if name.contains('*') {
                    zone.glob_label_mut(&name.to_ascii_lowercase())
                } else {
                    zone.label_mut(&name.to_ascii_lowercase())
                };
                let label = label.expect("label was just created");
                for record in records {
                    label.add_record(record);
                }
            }
        }

        fill_intermediate_labels(&mut zone);
        synthesise_soa(&mut zone);

        if zone.ns_rrs().is_empty() {
            return Err(Error::ApexMissingNS);
        }

        Ok(zone)
    }
}

/// Ensure every name between a label and the apex exists, so that
/// `b.c` answers NOERROR (empty) rather than NXDOMAIN once `a.b.c` is
/// defined.
fn fill_intermediate_labels(zone: &mut Zone) {
    let names: Vec<String> = zone.labels.keys().cloned().collect();
    for name in names {
        let mut rest = name.as_str();
        while let Some((_, parent)) = rest.split_once('.') {
            if !parent.contains('*') && !zone.labels.contains_key(parent) {
                zone.add_label(parent);
            }
            rest = parent;
        }
    }
    if !zone.labels.contains_key("") {
        zone.add_label("");
    }
}

/// Give the apex an SOA when the file did not provide one.
fn synthesise_soa(zone: &mut Zone) {
    let apex = zone.labels.get("").expect("apex label exists");
    if apex.has(RecordType::SOA) {
        return;
    }

    let origin = zone.origin().clone();
    let mname = match zone.ns_rrs().first().map(|rr| rr.data.clone()) {
        Some(RecordData::NS { nsdname }) => nsdname,
        _ => DomainName::from_relative_dotted_string(&origin, "ns1")
            .expect("origin-derived name is valid"),
    };
    // the contact is an absolute mailbox name, dotted form
    let contact = zone.options.contact.trim_end_matches('.');
    let rname =
        DomainName::from_dotted_string(&format!("{contact}.")).unwrap_or_else(|| origin.clone());

    let record = Record {
        data: RecordData::SOA {
            mname,
            rname,
            serial: if zone.options.serial == 0 {
                1
            } else {
                zone.options.serial
            },
            refresh: 5400,
            retry: 5400,
            expire: 2_419_200,
            minimum: zone.options.ttl,
        },
        ttl: zone.options.ttl,
        weight: 0,
    };

    zone.label_mut("").expect("apex label exists").add_record(record);
}

fn parse_logging(value: &Value) -> Result<ZoneLogging, Error> {
    let object = value.as_object().ok_or_else(|| Error::BadOption {
        option: "logging".to_string(),
    })?;
    Ok(ZoneLogging {
        stathat: object.get("stathat").and_then(Value::as_bool).unwrap_or(false),
        stathat_api: object
            .get("stathat_api")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    })
}

fn parse_u32(option: &str, value: &Value) -> Result<u32, Error> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| Error::BadOption {
            option: option.to_string(),
        })
}

/// Parse one record-type entry of a label into records.
fn parse_records(
    origin: &DomainName,
    label: &str,
    key: &str,
    value: &Value,
    ttl: u32,
) -> Result<Vec<Record>, Error> {
    let bad = |reason: &str| Error::BadRecord {
        label: label.to_string(),
        rtype: key.to_string(),
        reason: reason.to_string(),
    };

    let mut records = Vec::new();
    match key {
        "a" => {
            for (s, weight) in weighted_strings(value).ok_or_else(|| bad("expected address"))? {
                let address: Ipv4Addr = s.parse().map_err(|_| bad("not an IPv4 address"))?;
                records.push(Record {
                    data: RecordData::A { address },
                    ttl,
                    weight,
                });
            }
        }
        "aaaa" => {
            for (s, weight) in weighted_strings(value).ok_or_else(|| bad("expected address"))? {
                let address: Ipv6Addr = s.parse().map_err(|_| bad("not an IPv6 address"))?;
                records.push(Record {
                    data: RecordData::AAAA { address },
                    ttl,
                    weight,
                });
            }
        }
        "ns" => {
            for name in name_list(value).ok_or_else(|| bad("expected name list"))? {
                let nsdname = qualify(origin, &name).ok_or_else(|| bad("bad name"))?;
                records.push(Record {
                    data: RecordData::NS { nsdname },
                    ttl,
                    weight: 0,
                });
            }
        }
        "cname" => {
            let s = value.as_str().ok_or_else(|| bad("expected name"))?;
            let cname = qualify(origin, s).ok_or_else(|| bad("bad name"))?;
            records.push(Record {
                data: RecordData::CNAME { cname },
                ttl,
                weight: 0,
            });
        }
        "alias" => {
            let s = value.as_str().ok_or_else(|| bad("expected label name"))?;
            records.push(Record {
                data: RecordData::Alias {
                    target: s.to_ascii_lowercase(),
                },
                ttl,
                weight: 0,
            });
        }
        "mx" => {
            for (exchange, preference, weight) in
                mx_entries(value).ok_or_else(|| bad("expected exchange list"))?
            {
                let exchange = qualify(origin, &exchange).ok_or_else(|| bad("bad name"))?;
                records.push(Record {
                    data: RecordData::MX {
                        preference,
                        exchange,
                    },
                    ttl,
                    weight,
                });
            }
        }
        "txt" | "spf" => {
            for text in string_list(value).ok_or_else(|| bad("expected text"))? {
                let data = if key == "txt" {
                    RecordData::TXT { text }
                } else {
                    RecordData::SPF { text }
                };
                records.push(Record {
                    data,
                    ttl,
                    weight: 0,
                });
            }
        }
        "srv" => {
            let entries: Vec<&Value> = match value {
                Value::Array(vs) => vs.iter().collect(),
                Value::Object(_) => vec![value],
                _ => return Err(bad("expected object or array")),
            };
            for entry in entries {
                let object = entry.as_object().ok_or_else(|| bad("expected object"))?;
                let target = object
                    .get("target")
                    .and_then(Value::as_str)
                    .ok_or_else(|| bad("missing target"))?;
                let target = qualify(origin, target).ok_or_else(|| bad("bad name"))?;
                let field = |name: &str| {
                    object
                        .get(name)
                        .and_then(Value::as_u64)
                        .and_then(|n| u16::try_from(n).ok())
                        .unwrap_or(0)
                };
                records.push(Record {
                    data: RecordData::SRV {
                        priority: field("priority"),
                        weight: field("weight"),
                        port: field("port"),
                        target,
                    },
                    ttl,
                    weight: object
                        .get("rr_weight")
                        .and_then(Value::as_u64)
                        .and_then(|n| u32::try_from(n).ok())
                        .unwrap_or(0),
                });
            }
        }
        "soa" => {
            let object = value.as_object().ok_or_else(|| bad("expected object"))?;
            let name_field = |field: &str| -> Result<DomainName, Error> {
                let s = object
                    .get(field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| bad("missing name field"))?;
                qualify(origin, s).ok_or_else(|| bad("bad name"))
            };
            let num_field = |field: &str, default: u32| {
                object
                    .get(field)
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(default)
            };
            records.push(Record {
                data: RecordData::SOA {
                    mname: name_field("mname")?,
                    rname: name_field("rname")?,
                    serial: num_field("serial", 1),
                    refresh: num_field("refresh", 5400),
                    retry: num_field("retry", 5400),
                    expire: num_field("expire", 2_419_200),
                    minimum: num_field("minimum", ttl),
                },
                ttl,
                weight: 0,
            });
        }
        _ => {
            return Err(Error::UnknownRecordType {
                label: label.to_string(),
                rtype: key.to_string(),
            })
        }
    }
    Ok(records)
}

fn qualify(origin: &DomainName, s: &str) -> Option<DomainName> {
    DomainName::from_relative_dotted_string(origin, s)
}

/// `"v"` | `["v", ...]` | `[["v", weight], ...]`, the common shape for
/// address records.
fn weighted_strings(value: &Value) -> Option<Vec<(String, u32)>> {
    match value {
        Value::String(s) => Some(vec![(s.clone(), 0)]),
        Value::Array(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for entry in entries {
                match entry {
                    Value::String(s) => out.push((s.clone(), 0)),
                    Value::Array(pair) if !pair.is_empty() => {
                        let s = pair[0].as_str()?;
                        let weight = match pair.get(1) {
                            None => 0,
                            Some(Value::Number(n)) => u32::try_from(n.as_u64()?).ok()?,
                            Some(Value::String(s)) => s.parse().ok()?,
                            Some(_) => return None,
                        };
                        out.push((s.to_string(), weight));
                    }
                    _ => return None,
                }
            }
            Some(out)
        }
        _ => None,
    }
}

/// `"name"` | `["name", ...]` | `{"name": ..., ...}` for NS records.
fn name_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(entries) => entries
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::Object(map) => Some(map.keys().cloned().collect()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(entries) => entries
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// MX entries: `"exchange"` | `{"exchange": preference}` |
/// `{"exchange": {"preference": n, "weight": n}}` | an array of strings.
/// Yields `(exchange, preference, weight)`.
fn mx_entries(value: &Value) -> Option<Vec<(String, u16, u32)>> {
    match value {
        Value::String(s) => Some(vec![(s.clone(), 10, 0)]),
        Value::Array(entries) => entries
            .iter()
            .map(|v| v.as_str().map(|s| (s.to_string(), 10, 0)))
            .collect(),
        Value::Object(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (exchange, settings) in map {
                let (preference, weight) = match settings {
                    Value::Number(n) => (u16::try_from(n.as_u64()?).ok()?, 0),
                    Value::Object(o) => (
                        o.get("preference")
                            .and_then(Value::as_u64)
                            .and_then(|n| u16::try_from(n).ok())
                            .unwrap_or(10),
                        o.get("weight")
                            .and_then(Value::as_u64)
                            .and_then(|n| u32::try_from(n).ok())
                            .unwrap_or(0),
                    ),
                    Value::Null => (10, 0),
                    _ => return None,
                };
                out.push((exchange.clone(), preference, weight));
            }
            Some(out)
        }
        _ => None,
    }
}

/// Errors encountered when deserialising a zone file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Json { message: String },
    NotAnObject,
    MissingData,
    BadOption { option: String },
    BadTargeting { keyword: String },
    BadLabel { label: String },
    UnknownRecordType { label: String, rtype: String },
    BadRecord { label: String, rtype: String, reason: String },
    ApexMissingNS,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Json { message } => write!(f, "invalid JSON: {message}"),
            Error::NotAnObject => write!(f, "zone file is not a JSON object"),
            Error::MissingData => write!(f, "zone file has no 'data' object"),
            Error::BadOption { option } => write!(f, "bad value for option '{option}'"),
            Error::BadTargeting { keyword } => {
                write!(f, "unknown targeting keyword '{keyword}'")
            }
            Error::BadLabel { label } => write!(f, "label '{label}' is not an object"),
            Error::UnknownRecordType { label, rtype } => {
                write!(f, "label '{label}' has unknown record type '{rtype}'")
            }
            Error::BadRecord {
                label,
                rtype,
                reason,
            } => write!(f, "bad {rtype} record at label '{label}': {reason}"),
            Error::ApexMissingNS => write!(f, "zone has no NS records at the apex"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    fn example_zone() -> Zone {
        let origin = domain("test.example.com.");
        Zone::deserialise(
            &origin,
            r#"{
                "serial": 3,
                "ttl": 600,
                "max_hosts": 2,
                "contact": "support.example.com",
                "targeting": "@ continent country",
                "logging": { "stathat": true, "stathat_api": "abc-test" },
                "data": {
                    "": {
                        "ns": ["ns1.example.net", "ns2.example.net"],
                        "mx": { "mx.example.net": 10, "mx2.example.net": 20 }
                    },
                    "bar": { "a": [["192.168.1.2", 100]] },
                    "bar.no": {},
                    "www": { "cname": "bar" },
                    "weight": {
                        "max_hosts": 1,
                        "txt": ["w1000", "w1"]
                    },
                    "a.b.c": { "a": "192.168.1.7" },
                    "*.cdn": { "alias": "bar", "rop": true }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_options() {
        let zone = example_zone();
        assert_eq!(3, zone.options.serial);
        assert_eq!(600, zone.options.ttl);
        assert_eq!(2, zone.options.max_hosts);
        assert_eq!("support.example.com", zone.options.contact);
        assert_eq!(
            Targeting::GLOBAL
                .with(Targeting::CONTINENT)
                .with(Targeting::COUNTRY),
            zone.options.targeting
        );
        assert_eq!(
            Some(ZoneLogging {
                stathat: true,
                stathat_api: "abc-test".to_string(),
            }),
            zone.logging
        );
    }

    #[test]
    fn parses_weighted_a_records() {
        let zone = example_zone();
        let bar = zone.label("bar").unwrap();
        assert_eq!(1, bar.records_of(RecordType::A).len());
        assert_eq!(100, bar.weight_of(RecordType::A));
        assert_eq!(600, bar.records_of(RecordType::A)[0].ttl);
    }

    #[test]
    fn parses_mx_map_with_preferences() {
        let zone = example_zone();
        let apex = zone.label("").unwrap();
        let mxs = apex.records_of(RecordType::MX);
        assert_eq!(2, mxs.len());
        assert!(mxs.iter().any(|r| matches!(
            &r.data,
            RecordData::MX { preference: 10, exchange } if exchange == &domain("mx.example.net.")
        )));
    }

    #[test]
    fn qualifies_relative_cnames() {
        let zone = example_zone();
        let www = zone.label("www").unwrap();
        assert_eq!(
            &RecordData::CNAME {
                cname: domain("bar.test.example.com."),
            },
            &www.records_of(RecordType::CNAME)[0].data
        );
    }

    #[test]
    fn label_options_override_zone_defaults() {
        let zone = example_zone();
        assert_eq!(1, zone.label("weight").unwrap().max_hosts);
        assert_eq!(2, zone.label("bar").unwrap().max_hosts);
    }

    #[test]
    fn wildcard_alias_with_rop_flag() {
        let zone = example_zone();
        let glob = &zone.glob_labels[0];
        assert_eq!("*.cdn", glob.label);
        assert!(glob.check_rop);
        assert_eq!(Some("bar"), glob.alias_target());
    }

    #[test]
    fn creates_empty_intermediate_labels() {
        let zone = example_zone();
        assert!(zone.label("a.b.c").unwrap().has(RecordType::A));
        let bc = zone.label("b.c").unwrap();
        assert!(!bc.has(RecordType::A));
        assert!(zone.label("c").is_some());
    }

    #[test]
    fn synthesises_apex_soa() {
        let zone = example_zone();
        let soa = zone.soa_rr().unwrap();
        match soa.data {
            RecordData::SOA {
                mname,
                serial,
                minimum,
                ..
            } => {
                assert_eq!(domain("ns1.example.net."), mname);
                assert_eq!(3, serial);
                assert_eq!(600, minimum);
            }
            other => panic!("expected SOA, got {other:?}"),
        }
    }

    #[test]
    fn explicit_soa_wins() {
        let origin = domain("example.org.");
        let zone = Zone::deserialise(
            &origin,
            r#"{
                "data": {
                    "": {
                        "ns": "ns1.example.org",
                        "soa": { "mname": "ns1", "rname": "root", "serial": 42 }
                    }
                }
            }"#,
        )
        .unwrap();

        match zone.soa_rr().unwrap().data {
            RecordData::SOA { serial, .. } => assert_eq!(42, serial),
            other => panic!("expected SOA, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zone_without_apex_ns() {
        let origin = domain("example.org.");
        assert_eq!(
            Err(Error::ApexMissingNS),
            Zone::deserialise(&origin, r#"{ "data": { "www": { "a": "10.0.0.1" } } }"#)
        );
    }

    #[test]
    fn rejects_unknown_record_type() {
        let origin = domain("example.org.");
        assert_eq!(
            Err(Error::UnknownRecordType {
                label: "www".to_string(),
                rtype: "hinfo".to_string(),
            }),
            Zone::deserialise(
                &origin,
                r#"{ "data": { "": {"ns": "ns1.example.net"}, "www": { "hinfo": "x" } } }"#
            )
        );
    }

    #[test]
    fn rejects_bad_address() {
        let origin = domain("example.org.");
        let err = Zone::deserialise(
            &origin,
            r#"{ "data": { "www": { "a": "not-an-ip" } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadRecord { .. }));
    }
}
