//! Weighted record selection: up to `max_hosts` records per answer,
//! biased by weight.
//!
//! Selection operates on the insertion order of the records; the
//! descending-weight order a label can also produce is display-only.

use rand::Rng;

use zoned_types::zones::types::{Label, Record};
use zoned_types::protocol::types::RecordType;

/// Pick up to `label.max_hosts` records of a type.
///
/// With a zero total weight the pick is uniform: a partial shuffle of
/// the whole set.  Otherwise it is weighted sampling without
/// replacement: draw in `[0, total)`, walk the stored order until the
/// running weight crosses the draw, remove, repeat.  A zero-weight
/// record is never chosen while a positive-weight record remains.
///
/// Deterministic for a fixed RNG seed.
pub fn pick<'a, R: Rng + ?Sized>(
    label: &'a Label,
    rtype: RecordType,
    rng: &mut R,
) -> Vec<&'a Record> {
    let records = label.records_of(rtype);
    let max = label.max_hosts.min(records.len());

    let mut remaining: Vec<&Record> = records.iter().collect();
    let mut total = u64::from(label.weight_of(rtype));
    let mut picked = Vec::with_capacity(max);

    while picked.len() < max {
        if total == 0 {
            // all remaining records weigh nothing: uniform
            let at = rng.gen_range(0..remaining.len());
            picked.push(remaining.swap_remove(at));
            continue;
        }

        let draw = rng.gen_range(0..total);
        let mut acc = 0u64;
        let mut chosen = remaining.len() - 1;
        for (i, record) in remaining.iter().enumerate() {
            acc += u64::from(record.weight);
            if acc > draw {
                chosen = i;
                break;
            }
        }

        let record = remaining.remove(chosen);
        total -= u64::from(record.weight);
        picked.push(record);
    }

    picked
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    use zoned_types::protocol::types::test_util::*;
    use zoned_types::zones::types::test_util::*;
    use zoned_types::zones::types::Zone;

    use super::*;

    fn label_with(weights: &[u32], max_hosts: usize) -> Zone {
        let mut zone = Zone::new(domain("example.com."));
        let label = zone.add_label("picked");
        label.max_hosts = max_hosts;
        for (i, &weight) in weights.iter().enumerate() {
            label.add_record(a(Ipv4Addr::new(10, 0, 0, i as u8 + 1), weight));
        }
        zone
    }

    fn addr_of(record: &Record) -> Ipv4Addr {
        match record.data {
            zoned_types::protocol::types::RecordData::A { address } => address,
            _ => panic!("not an A record"),
        }
    }

    #[test]
    fn never_more_than_max_hosts() {
        let zone = label_with(&[0, 0, 0, 0, 0], 2);
        let label = zone.label("picked").unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..50 {
            let picked = pick(label, RecordType::A, &mut rng);
            assert_eq!(2, picked.len());
        }
    }

    #[test]
    fn never_more_than_available() {
        let zone = label_with(&[0], 5);
        let label = zone.label("picked").unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(1, pick(label, RecordType::A, &mut rng).len());
        assert!(pick(label, RecordType::AAAA, &mut rng).is_empty());
    }

    #[test]
    fn without_replacement() {
        let zone = label_with(&[5, 5, 5, 5], 4);
        let label = zone.label("picked").unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let picked = pick(label, RecordType::A, &mut rng);
            let mut addresses: Vec<Ipv4Addr> = picked.iter().map(|r| addr_of(r)).collect();
            addresses.sort();
            addresses.dedup();
            assert_eq!(4, addresses.len());
        }
    }

    #[test]
    fn zero_weight_loses_to_positive_weight() {
        let zone = label_with(&[0, 1], 1);
        let label = zone.label("picked").unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..100 {
            let picked = pick(label, RecordType::A, &mut rng);
            assert_eq!(Ipv4Addr::new(10, 0, 0, 2), addr_of(picked[0]));
        }
    }

    #[test]
    fn weights_bias_the_first_pick() {
        let zone = label_with(&[900, 100], 1);
        let label = zone.label("picked").unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let mut counts: HashMap<Ipv4Addr, u32> = HashMap::new();
        for _ in 0..1000 {
            let picked = pick(label, RecordType::A, &mut rng);
            *counts.entry(addr_of(picked[0])).or_insert(0) += 1;
        }

        let heavy = counts[&Ipv4Addr::new(10, 0, 0, 1)];
        // 900/1000 expected; anything this side of 800 means the
        // weighting is broken, not unlucky
        assert!(heavy > 800, "heavy record picked only {heavy}/1000 times");
    }

    #[test]
    fn uniform_pick_reaches_every_record() {
        let zone = label_with(&[0, 0, 0], 1);
        let label = zone.label("picked").unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let mut seen: HashMap<Ipv4Addr, u32> = HashMap::new();
        for _ in 0..300 {
            let picked = pick(label, RecordType::A, &mut rng);
            *seen.entry(addr_of(picked[0])).or_insert(0) += 1;
        }
        assert_eq!(3, seen.len());
    }

    #[test]
    fn deterministic_for_a_fixed_seed() {
        let zone = label_with(&[10, 20, 30, 40], 2);
        let label = zone.label("picked").unwrap();

        let picks_a: Vec<Ipv4Addr> = pick(label, RecordType::A, &mut StdRng::seed_from_u64(99))
            .iter()
            .map(|r| addr_of(r))
            .collect();
        let picks_b: Vec<Ipv4Addr> = pick(label, RecordType::A, &mut StdRng::seed_from_u64(99))
            .iter()
            .map(|r| addr_of(r))
            .collect();

        assert_eq!(picks_a, picks_b);
    }
}
