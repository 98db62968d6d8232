//! The zone data model: weighted records grouped by type under labels,
//! labels grouped under a zone origin, wildcard labels kept aside in
//! specificity order.
//!
//! A zone is built once by the loader, then published read-only.  All of
//! the lookup machinery lives in the resolver crate; this module only
//! knows how to hold and index the data.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::protocol::types::*;

/// Default TTL for a zone which does not set one.
pub const DEFAULT_TTL: u32 = 120;

/// Default cap on the number of records returned per answer.
pub const DEFAULT_MAX_HOSTS: usize = 2;

/// A single resource record plus its selection weight.  Weight 0 means
/// "equal share with the other zero-weighted records of the same type".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: RecordData,
    pub ttl: u32,
    pub weight: u32,
}

impl Record {
    /// Build the wire RR for this record with the given owner name.
    /// Wildcard and geo matches answer under the name that was queried,
    /// so the owner is always supplied by the caller.
    pub fn to_rr(&self, name: &DomainName) -> ResourceRecord {
        ResourceRecord {
            name: name.clone(),
            data: self.data.clone(),
            ttl: self.ttl,
        }
    }
}

/// A node of the zone's name table: the records for one relative name,
/// grouped by type, with per-type weight totals maintained on insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// The name relative to the zone origin, lower-cased.  May contain a
    /// `*` wildcard.
    pub label: String,

    pub ttl: u32,

    /// Cap on the records returned per answer for this label.
    pub max_hosts: usize,

    /// Records by type, in insertion order.
    pub records: HashMap<RecordType, Vec<Record>>,

    /// Sum of the record weights per type.
    pub weight: HashMap<RecordType, u32>,

    /// When true and this is a wildcard alias, a per-client override
    /// lookup is attempted during alias resolution.
    pub check_rop: bool,
}

impl Label {
    fn new(label: String, ttl: u32, max_hosts: usize) -> Self {
        Self {
            label,
            ttl,
            max_hosts,
            records: HashMap::new(),
            weight: HashMap::new(),
            check_rop: false,
        }
    }

    /// Append a record, keeping the per-type weight total in step.
    pub fn add_record(&mut self, record: Record) {
        let rtype = record.data.rtype();
        *self.weight.entry(rtype).or_insert(0) += record.weight;
        self.records.entry(rtype).or_default().push(record);
    }

    /// The records of a type, in insertion order.
    pub fn records_of(&self, rtype: RecordType) -> &[Record] {
        self.records.get(&rtype).map_or(&[], Vec::as_slice)
    }

    pub fn has(&self, rtype: RecordType) -> bool {
        !self.records_of(rtype).is_empty()
    }

    /// Total weight of a type's records.  O(1): maintained on insertion.
    pub fn weight_of(&self, rtype: RecordType) -> u32 {
        self.weight.get(&rtype).copied().unwrap_or(0)
    }

    pub fn first(&self, rtype: RecordType) -> Option<&Record> {
        self.records_of(rtype).first()
    }

    /// The alias target, if this label carries an alias record.
    pub fn alias_target(&self) -> Option<&str> {
        match self.first(RecordType::Alias) {
            Some(Record {
                data: RecordData::Alias { target },
                ..
            }) => Some(target),
            _ => None,
        }
    }

    /// Records of a type sorted by descending weight.  Diagnostic display
    /// order only: selection operates on the insertion order.
    pub fn records_by_weight(&self, rtype: RecordType) -> Vec<&Record> {
        let mut rs: Vec<&Record> = self.records_of(rtype).iter().collect();
        rs.sort_by(|a, b| b.weight.cmp(&a.weight));
        rs
    }
}

/// Zone-wide options, applied as label defaults at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneOptions {
    pub serial: u32,
    pub ttl: u32,
    pub max_hosts: usize,
    pub contact: String,
    pub targeting: Targeting,
}

/// Which targeting levels a zone answers on, as a bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Targeting(u8);

impl Targeting {
    pub const GLOBAL: Targeting = Targeting(1);
    pub const CONTINENT: Targeting = Targeting(1 << 1);
    pub const COUNTRY: Targeting = Targeting(1 << 2);
    pub const REGION_GROUP: Targeting = Targeting(1 << 3);
    pub const REGION: Targeting = Targeting(1 << 4);
    pub const ASN: Targeting = Targeting(1 << 5);

    pub fn none() -> Self {
        Targeting(0)
    }

    pub fn contains(self, other: Targeting) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: Targeting) -> Self {
        Targeting(self.0 | other.0)
    }

    /// Parse a zone file's space-separated targeting keywords, e.g.
    /// `"@ continent country"`.
    pub fn parse(s: &str) -> Result<Self, UnknownTargetError> {
        let mut targeting = Targeting::none();
        for keyword in s.split_whitespace() {
            targeting = targeting.with(match keyword {
                "@" => Targeting::GLOBAL,
                "continent" => Targeting::CONTINENT,
                "country" => Targeting::COUNTRY,
                "regiongroup" => Targeting::REGION_GROUP,
                "region" => Targeting::REGION,
                "asn" => Targeting::ASN,
                _ => {
                    return Err(UnknownTargetError {
                        keyword: keyword.to_string(),
                    })
                }
            });
        }
        Ok(targeting)
    }
}

impl Default for Targeting {
    fn default() -> Self {
        Targeting::GLOBAL
            .with(Targeting::COUNTRY)
            .with(Targeting::CONTINENT)
    }
}

impl fmt::Display for Targeting {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (bit, keyword) in [
            (Targeting::ASN, "asn"),
            (Targeting::REGION_GROUP, "regiongroup"),
            (Targeting::REGION, "region"),
            (Targeting::COUNTRY, "country"),
            (Targeting::CONTINENT, "continent"),
            (Targeting::GLOBAL, "@"),
        ] {
            if self.contains(bit) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{keyword}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// An unrecognised targeting keyword in a zone file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTargetError {
    pub keyword: String,
}

impl fmt::Display for UnknownTargetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown targeting keyword '{}'", self.keyword)
    }
}

impl std::error::Error for UnknownTargetError {}

/// Where a zone ships its stats, from the zone file's `logging` section.
/// The shipper itself lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZoneLogging {
    pub stathat: bool,
    pub stathat_api: String,
}

/// Per-zone hot counters.  These are shared handles so that republishing
/// a rebuilt zone carries the counts forward.
#[derive(Debug, Clone, Default)]
pub struct ZoneMetrics {
    pub queries: Arc<AtomicU64>,
    pub edns_queries: Arc<AtomicU64>,
}

/// The route-override store, as the resolver consults it: a single
/// hash-field fetch returning raw bytes or "absent".  Pooling, timeouts
/// and retries are the implementation's concern.
#[async_trait::async_trait]
pub trait RopStore: Send + Sync + fmt::Debug {
    async fn fetch(&self, key: &str, field: &str) -> std::io::Result<Option<Vec<u8>>>;
}

/// A zone: an origin plus its label tables and options.  Built once,
/// then read-only.
#[derive(Debug, Clone)]
pub struct Zone {
    origin: DomainName,
    /// Non-root labels in the origin; the listener strips this many
    /// labels off a query name to get the relative leaf.
    label_count: usize,

    /// Exact-name table, keyed by relative name.
    pub labels: HashMap<String, Label>,

    /// Wildcard labels, most specific first.  Specificity is the length
    /// of the pattern with `*`s removed; ties keep insertion order.
    pub glob_labels: Vec<Label>,

    pub options: ZoneOptions,

    pub logging: Option<ZoneLogging>,

    pub metrics: ZoneMetrics,

    /// Route-override store handle; `None` disables override lookups.
    pub rop: Option<Arc<dyn RopStore>>,
}

impl PartialEq for Zone {
    /// Compares the zone's data; the shared metrics handles and the
    /// route-override store handle are runtime wiring, not data, so
    /// they are excluded from equality.
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin
            && self.label_count == other.label_count
            && self.labels == other.labels
            && self.glob_labels == other.glob_labels
            && self.options == other.options
            && self.logging == other.logging
    }
}

impl Zone {
    pub fn new(origin: DomainName) -> Self {
        let contact = if origin.is_root() {
            "hostmaster.".to_string()
        } else {
            format!("hostmaster.{}", origin.to_dotted_string())
        };

        Self {
            label_count: origin.label_count(),
            origin,
            labels: HashMap::new(),
            glob_labels: Vec::new(),
            options: ZoneOptions {
                serial: 0,
                ttl: DEFAULT_TTL,
                max_hosts: DEFAULT_MAX_HOSTS,
                contact,
                targeting: Targeting::default(),
            },
            logging: None,
            metrics: ZoneMetrics::default(),
            rop: None,
        }
    }

    pub fn origin(&self) -> &DomainName {
        &self.origin
    }

    pub fn label_count(&self) -> usize {
        self.label_count
    }

    /// The leaf a query name resolves under: the name with the origin's
    /// `label_count` labels (and the root) stripped off, joined by `.`.
    /// `None` if the name is not under this origin.
    pub fn leaf_of(&self, name: &DomainName) -> Option<String> {
        if !name.is_subdomain_of(&self.origin) {
            return None;
        }
        Some(name.labels[..name.labels.len() - self.label_count - 1].join("."))
    }

    /// Create an empty label (with the zone's default TTL and max-hosts)
    /// and return a handle to it.  Wildcard-bearing names go to the glob
    /// table, which is re-sorted after every insertion; zones are built
    /// once, so there is no hot-path cost.
    pub fn add_label(&mut self, name: &str) -> &mut Label {
        let name = name.to_ascii_lowercase();
        let label = Label::new(name.clone(), self.options.ttl, self.options.max_hosts);

        if name.contains('*') {
            if self.glob_labels.iter().all(|l| l.label != name) {
                self.glob_labels.push(label);
                self.glob_labels
                    .sort_by_key(|l| std::cmp::Reverse(specificity(&l.label)));
            }
            // just inserted, or already present
            self.glob_label_mut(&name).unwrap()
        } else {
            self.labels.entry(name).or_insert(label)
        }
    }

    pub fn label(&self, name: &str) -> Option<&Label> {
        self.labels.get(name)
    }

    pub fn label_mut(&mut self, name: &str) -> Option<&mut Label> {
        self.labels.get_mut(name)
    }

    pub fn glob_label_mut(&mut self, name: &str) -> Option<&mut Label> {
        self.glob_labels.iter_mut().find(|l| l.label == name)
    }

    /// The apex SOA RR.  Every well-formed zone has one; `None` means the
    /// zone is still mid-build.
    pub fn soa_rr(&self) -> Option<ResourceRecord> {
        self.labels
            .get("")
            .and_then(|apex| apex.first(RecordType::SOA))
            .map(|record| record.to_rr(&self.origin))
    }

    /// The apex NS RRs.
    pub fn ns_rrs(&self) -> Vec<ResourceRecord> {
        self.labels.get("").map_or_else(Vec::new, |apex| {
            apex.records_of(RecordType::NS)
                .iter()
                .map(|record| record.to_rr(&self.origin))
                .collect()
        })
    }

    /// Take over another zone's counters.  Used on reload so the rebuilt
    /// zone continues the old zone's counts.
    pub fn adopt_metrics(&mut self, old: &Zone) {
        self.metrics = old.metrics.clone();
    }
}

/// Wildcard specificity: pattern length with the `*`s stripped out.
pub fn specificity(pattern: &str) -> usize {
    pattern.len() - pattern.matches('*').count()
}

#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    use super::*;
    use std::net::Ipv4Addr;

    pub fn a(address: Ipv4Addr, weight: u32) -> Record {
        Record {
            data: RecordData::A { address },
            ttl: 300,
            weight,
        }
    }

    pub fn alias(target: &str) -> Record {
        Record {
            data: RecordData::Alias {
                target: target.to_string(),
            },
            ttl: 300,
            weight: 0,
        }
    }

    pub fn soa(origin: &DomainName) -> Record {
        Record {
            data: RecordData::SOA {
                mname: DomainName::from_relative_dotted_string(origin, "ns1").unwrap(),
                rname: DomainName::from_relative_dotted_string(origin, "hostmaster").unwrap(),
                serial: 1,
                refresh: 5400,
                retry: 5400,
                expire: 2_419_200,
                minimum: 120,
            },
            ttl: 300,
            weight: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::Ordering;

    use super::test_util::*;
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    fn add_label_lowercases_and_routes_to_the_right_table() {
        let mut zone = Zone::new(domain("example.com."));
        zone.add_label("WWW");
        zone.add_label("*.Glob");

        assert!(zone.labels.contains_key("www"));
        assert!(!zone.labels.contains_key("*.glob"));
        assert_eq!(1, zone.glob_labels.len());
        assert_eq!("*.glob", zone.glob_labels[0].label);
    }

    #[test]
    fn glob_labels_sorted_most_specific_first() {
        let mut zone = Zone::new(domain("example.com."));
        zone.add_label("*");
        zone.add_label("*.very.specific");
        zone.add_label("*.svc");

        let patterns: Vec<&str> = zone.glob_labels.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(vec!["*.very.specific", "*.svc", "*"], patterns);

        for window in zone.glob_labels.windows(2) {
            assert!(specificity(&window[0].label) >= specificity(&window[1].label));
        }
    }

    #[test]
    fn glob_sort_ties_keep_insertion_order() {
        let mut zone = Zone::new(domain("example.com."));
        zone.add_label("*.aa");
        zone.add_label("*.bb");

        let patterns: Vec<&str> = zone.glob_labels.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(vec!["*.aa", "*.bb"], patterns);
    }

    #[test]
    fn weight_totals_track_insertions() {
        let mut zone = Zone::new(domain("example.com."));
        let label = zone.add_label("weighted");
        label.add_record(a(Ipv4Addr::new(10, 0, 0, 1), 70));
        label.add_record(a(Ipv4Addr::new(10, 0, 0, 2), 30));
        label.add_record(a(Ipv4Addr::new(10, 0, 0, 3), 0));

        let label = zone.label("weighted").unwrap();
        assert_eq!(100, label.weight_of(RecordType::A));
        assert_eq!(
            100u32,
            label
                .records_of(RecordType::A)
                .iter()
                .map(|r| r.weight)
                .sum::<u32>()
        );
        assert_eq!(0, label.weight_of(RecordType::AAAA));
    }

    #[test]
    fn records_by_weight_is_descending_and_nondestructive() {
        let mut zone = Zone::new(domain("example.com."));
        let label = zone.add_label("weighted");
        label.add_record(a(Ipv4Addr::new(10, 0, 0, 1), 1));
        label.add_record(a(Ipv4Addr::new(10, 0, 0, 2), 1000));

        let label = zone.label("weighted").unwrap();
        let by_weight = label.records_by_weight(RecordType::A);
        assert_eq!(1000, by_weight[0].weight);
        assert_eq!(1, by_weight[1].weight);

        // insertion order untouched
        assert_eq!(1, label.records_of(RecordType::A)[0].weight);
    }

    #[test]
    fn soa_and_ns_come_from_the_apex() {
        let origin = domain("example.com.");
        let mut zone = Zone::new(origin.clone());
        let apex = zone.add_label("");
        apex.add_record(soa(&origin));
        apex.add_record(Record {
            data: RecordData::NS {
                nsdname: domain("ns1.example.net."),
            },
            ttl: 300,
            weight: 0,
        });

        let soa_rr = zone.soa_rr().unwrap();
        assert_eq!(origin, soa_rr.name);
        assert_eq!(RecordType::SOA, soa_rr.data.rtype());

        assert_eq!(1, zone.ns_rrs().len());
    }

    #[test]
    fn alias_target_reads_the_alias_slot() {
        let mut zone = Zone::new(domain("example.com."));
        let label = zone.add_label("www");
        label.add_record(alias("bar"));

        assert_eq!(Some("bar"), zone.label("www").unwrap().alias_target());
        assert_eq!(None, zone.add_label("other").alias_target());
    }

    #[test]
    fn leaf_of_strips_the_origin_by_label_count() {
        let zone = Zone::new(domain("test.example.com."));
        assert_eq!(3, zone.label_count());

        assert_eq!(
            Some("x.bar".to_string()),
            zone.leaf_of(&domain("x.bar.test.example.com."))
        );
        assert_eq!(
            Some(String::new()),
            zone.leaf_of(&domain("test.example.com."))
        );
        assert_eq!(None, zone.leaf_of(&domain("other.example.com.")));
    }

    #[test]
    fn adopt_metrics_carries_counts_across_rebuilds() {
        let mut old = Zone::new(domain("example.com."));
        old.metrics.queries.fetch_add(17, Ordering::Relaxed);

        let mut new = Zone::new(domain("example.com."));
        new.adopt_metrics(&old);
        new.metrics.queries.fetch_add(1, Ordering::Relaxed);

        assert_eq!(18, old.metrics.queries.load(Ordering::Relaxed));
    }
}
