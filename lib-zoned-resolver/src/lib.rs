#![warn(clippy::pedantic)]
// Sometimes a redundant else is clearer
#![allow(clippy::redundant_else)]
// Don't care enough to fix
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::wildcard_imports)]

pub mod lookup;
pub mod metrics;
pub mod pick;
pub mod registry;
pub mod rop;
pub mod targeting;

use rand::Rng;

use zoned_types::protocol::types::*;
use zoned_types::zones::types::Zone;

use self::lookup::{find_labels, Lookup, ResolutionError};
use self::metrics::Metrics;
use self::pick::pick;

/// A fully selected answer, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAnswer {
    /// The records to answer with.  May be empty: a matched name with no
    /// records of the asked type is NOERROR, not NXDOMAIN.
    Answer { rrs: Vec<ResourceRecord> },

    /// The name does not exist in the zone.
    NameError,
}

/// The type list a query is willing to accept, in the order the lookup
/// tries them: an alias always wins, then a CNAME, then the asked type
/// itself.
pub fn accepted_types(qtype: RecordType) -> Vec<RecordType> {
    let mut accepted = vec![RecordType::Alias, RecordType::CNAME, qtype];
    accepted.dedup();
    accepted
}

/// Resolve one question against a zone snapshot: find the label, pick
/// the record subset, build the RRs under the query name.
///
/// `targets` is the targeting list for the client (see
/// [`targeting::build_targets`]); `rng` drives the weighted pick and is
/// seeded per query.
pub async fn resolve<R: Rng + ?Sized>(
    zone: &Zone,
    qname: &DomainName,
    qtype: RecordType,
    targets: &[String],
    rng: &mut R,
) -> (Metrics, Result<ResolvedAnswer, ResolutionError>) {
    let mut metrics = Metrics::new();

    let Some(leaf) = zone.leaf_of(qname) else {
        // the registry matched this zone, so the name should be under
        // the origin; answer NXDOMAIN and let the operator see the log
        tracing::warn!(zone = %zone.origin(), %qname, "query name escapes zone origin");
        return (metrics, Ok(ResolvedAnswer::NameError));
    };

    let accepted = accepted_types(qtype);
    let lookup = find_labels(zone, &leaf, targets, &accepted, None, &mut metrics).await;

    let answer = match lookup {
        Err(error) => return (metrics, Err(error)),
        Ok(Lookup::Found {
            label,
            qtype: satisfied,
        }) => {
            let rrs = match satisfied {
                RecordType::ANY => {
                    let mut types: Vec<RecordType> = label
                        .records
                        .keys()
                        .copied()
                        .filter(|&t| t != RecordType::Alias)
                        .collect();
                    types.sort_by_key(|&t| u16::from(t));

                    let mut rrs = Vec::new();
                    for t in types {
                        rrs.extend(pick(label, t, rng).iter().map(|r| r.to_rr(qname)));
                    }
                    rrs
                }
                satisfied => pick(label, satisfied, rng)
                    .iter()
                    .map(|r| r.to_rr(qname))
                    .collect(),
            };
            ResolvedAnswer::Answer { rrs }
        }
        Ok(Lookup::TypeEmpty) => ResolvedAnswer::Answer { rrs: Vec::new() },
        Ok(Lookup::Miss { label: Some(_) }) => ResolvedAnswer::Answer { rrs: Vec::new() },
        Ok(Lookup::Miss { label: None }) => ResolvedAnswer::NameError,
    };

    (metrics, Ok(answer))
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::Ipv4Addr;

    use zoned_types::protocol::types::test_util::*;
    use zoned_types::zones::types::test_util::*;
    use zoned_types::zones::types::Record;

    use super::*;

    fn zone() -> Zone {
        let origin = domain("test.example.com.");
        let mut zone = Zone::new(origin.clone());
        zone.add_label("").add_record(soa(&origin));
        zone.add_label("bar")
            .add_record(a(Ipv4Addr::new(192, 168, 1, 2), 0));
        zone
    }

    fn at() -> Vec<String> {
        vec!["@".to_string()]
    }

    #[tokio::test]
    async fn answers_carry_the_query_name() {
        let zone = zone();
        let qname = domain("bar.test.example.com.");
        let mut rng = StdRng::seed_from_u64(1);

        let (metrics, answer) =
            resolve(&zone, &qname, RecordType::A, &at(), &mut rng).await;

        match answer.unwrap() {
            ResolvedAnswer::Answer { rrs } => {
                assert_eq!(1, rrs.len());
                assert_eq!(qname, rrs[0].name);
            }
            other => panic!("expected answer, got {other:?}"),
        }
        assert_eq!(1, metrics.exact_hits);
    }

    #[tokio::test]
    async fn missing_name_is_a_name_error() {
        let zone = zone();
        let qname = domain("missing.test.example.com.");
        let mut rng = StdRng::seed_from_u64(1);

        let (_, answer) = resolve(&zone, &qname, RecordType::A, &at(), &mut rng).await;
        assert_eq!(Ok(ResolvedAnswer::NameError), answer);
    }

    #[tokio::test]
    async fn present_name_with_missing_type_is_empty() {
        let zone = zone();
        let qname = domain("bar.test.example.com.");
        let mut rng = StdRng::seed_from_u64(1);

        let (_, answer) = resolve(&zone, &qname, RecordType::AAAA, &at(), &mut rng).await;
        assert_eq!(Ok(ResolvedAnswer::Answer { rrs: Vec::new() }), answer);
    }

    #[tokio::test]
    async fn any_answers_all_types_at_the_leaf() {
        let origin = domain("test.example.com.");
        let mut z = Zone::new(origin.clone());
        z.add_label("").add_record(soa(&origin));
        let label = z.add_label("multi");
        label.max_hosts = 10;
        label.add_record(a(Ipv4Addr::new(10, 0, 0, 1), 0));
        label.add_record(Record {
            data: RecordData::TXT {
                text: "hello".to_string(),
            },
            ttl: 300,
            weight: 0,
        });

        let qname = domain("multi.test.example.com.");
        let mut rng = StdRng::seed_from_u64(1);
        let (_, answer) = resolve(&z, &qname, RecordType::ANY, &at(), &mut rng).await;

        match answer.unwrap() {
            ResolvedAnswer::Answer { rrs } => {
                // A sorts before TXT by type code
                assert_eq!(2, rrs.len());
                assert_eq!(RecordType::A, rrs[0].data.rtype());
                assert_eq!(RecordType::TXT, rrs[1].data.rtype());
            }
            other => panic!("expected answer, got {other:?}"),
        }
    }

    #[test]
    fn accepted_types_dedups() {
        assert_eq!(
            vec![RecordType::Alias, RecordType::CNAME, RecordType::A],
            accepted_types(RecordType::A)
        );
        assert_eq!(
            vec![RecordType::Alias, RecordType::CNAME],
            accepted_types(RecordType::CNAME)
        );
    }
}
