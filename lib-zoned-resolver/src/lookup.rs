//! The label lookup at the heart of answer selection.
//!
//! [`find_labels`] takes the query's relative leaf name, the targeting
//! list built from the client's location, and the ordered list of record
//! types that would satisfy the query.  It walks the exact-label table
//! one targeting level at a time, falls back to the wildcard table in
//! specificity order, chases aliases (consulting the route-override store
//! for wildcard aliases flagged for it), and reports which label and type
//! won, or how exactly nothing won, because NOERROR-empty versus
//! NXDOMAIN matters to downstream caches.

use async_recursion::async_recursion;

use zoned_types::protocol::types::*;
use zoned_types::zones::types::*;

use crate::metrics::Metrics;
use crate::rop::{override_disables, RopClient};

/// Aliases followed per query before giving up.  Aliases are chased at
/// query time, so a cycle in the zone data would otherwise spin forever.
pub const ALIAS_CHASE_LIMIT: usize = 8;

/// The outcome of a label lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// A label with at least one record of the satisfied type.
    Found { label: &'a Label, qtype: RecordType },

    /// A wildcard label matched, but no accepted type was satisfied.
    /// The caller must answer NOERROR-empty: an NXDOMAIN here would be
    /// cached downstream and suppress queries for sibling types.
    TypeEmpty,

    /// No label matched.  `label` carries the bare leaf's (empty) label
    /// if it exists (NOERROR) and `None` for a true NXDOMAIN.
    Miss { label: Option<&'a Label> },
}

/// An error that can occur during a label lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Alias chasing exceeded [`ALIAS_CHASE_LIMIT`].
    AliasLimit { name: String },
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResolutionError::AliasLimit { name } => {
                write!(f, "alias chain through '{name}' exceeds {ALIAS_CHASE_LIMIT} follows")
            }
        }
    }
}

impl std::error::Error for ResolutionError {}

/// Find the label and record type satisfying a query.
///
/// `leaf` is the query name relative to the zone origin, lower-cased.
/// `targets` is the targeting-suffix list, most specific first, ending
/// with `"@"`.  `accepted` is tried in order at every matching label; the
/// first type with records wins.
///
/// # Errors
///
/// If alias chasing exceeds the depth cap.
pub async fn find_labels<'z>(
    zone: &'z Zone,
    leaf: &str,
    targets: &[String],
    accepted: &[RecordType],
    rop_client: Option<RopClient>,
    metrics: &mut Metrics,
) -> Result<Lookup<'z>, ResolutionError> {
    find_labels_at(
        zone,
        leaf,
        targets,
        accepted,
        rop_client,
        metrics,
        ALIAS_CHASE_LIMIT,
    )
    .await
}

#[async_recursion]
async fn find_labels_at<'z>(
    zone: &'z Zone,
    leaf: &str,
    targets: &[String],
    accepted: &[RecordType],
    rop_client: Option<RopClient>,
    metrics: &mut Metrics,
    depth: usize,
) -> Result<Lookup<'z>, ResolutionError> {
    // exact pass: most specific targeting level first
    for target in targets {
        let name = compose(leaf, target);
        if let Some(label) = zone.labels.get(&name) {
            for &qtype in accepted {
                match qtype {
                    // Deliberate short-circuit: ANY answers from the bare
                    // leaf, not the composed target label, so ANY is
                    // never geo-targeted.
                    RecordType::ANY => return Ok(any_lookup(zone, leaf)),
                    RecordType::Alias => {
                        if label.alias_target().is_some() {
                            return follow_alias(
                                zone, label, targets, accepted, rop_client, metrics, depth,
                            )
                            .await;
                        }
                    }
                    _ => {
                        if label.has(qtype) {
                            metrics.exact_hits += 1;
                            return Ok(Lookup::Found { label, qtype });
                        }
                    }
                }
            }
        }
    }

    // wildcard pass: specificity order, first matching pattern only
    for glob_label in &zone.glob_labels {
        let mut matched = false;
        for target in targets {
            let name = compose(leaf, target);
            if glob(&glob_label.label, &name) {
                matched = true;
                for &qtype in accepted {
                    match qtype {
                        RecordType::ANY => return Ok(any_lookup(zone, leaf)),
                        RecordType::Alias => {
                            if glob_label.alias_target().is_some() {
                                let rop_client = if glob_label.check_rop {
                                    rop_client_for(glob_label, leaf).or(rop_client)
                                } else {
                                    rop_client
                                };
                                return follow_alias(
                                    zone, glob_label, targets, accepted, rop_client, metrics,
                                    depth,
                                )
                                .await;
                            }
                        }
                        _ => {
                            if glob_label.has(qtype) {
                                metrics.wildcard_hits += 1;
                                return Ok(Lookup::Found {
                                    label: glob_label,
                                    qtype,
                                });
                            }
                        }
                    }
                }
            }
        }
        if matched {
            metrics.empty_answers += 1;
            return Ok(Lookup::TypeEmpty);
        }
    }

    let label = zone.labels.get(leaf);
    if label.is_some() {
        metrics.empty_answers += 1;
    } else {
        metrics.name_errors += 1;
    }
    Ok(Lookup::Miss { label })
}

/// Chase an alias record: possibly divert through the route-override
/// store, then restart resolution at the target name.
async fn follow_alias<'z>(
    zone: &'z Zone,
    label: &Label,
    targets: &[String],
    accepted: &[RecordType],
    rop_client: Option<RopClient>,
    metrics: &mut Metrics,
    depth: usize,
) -> Result<Lookup<'z>, ResolutionError> {
    let name = label
        .alias_target()
        .expect("caller checked the alias slot")
        .to_string();

    if depth == 0 {
        tracing::error!(zone = %zone.origin(), %name, "alias chase limit hit");
        return Err(ResolutionError::AliasLimit { name });
    }
    metrics.alias_follows += 1;

    if let (Some(client), Some(store)) = (&rop_client, &zone.rop) {
        if let Some(rop_name) = name.strip_prefix("rop-") {
            metrics.rop_lookups += 1;
            if override_disables(store.as_ref(), client, rop_name).await {
                metrics.rop_overrides += 1;
                tracing::debug!(
                    zone = %zone.origin(),
                    key = %client.key,
                    value = %client.value,
                    %rop_name,
                    fallback = %client.fallback_label,
                    "override disables alias target"
                );
                // fall back apex-relative, with the override client
                // cleared: re-entering the same wildcard with geo
                // targets would loop
                let fallback = client.fallback_label.clone();
                return find_labels_at(
                    zone,
                    &fallback,
                    &["@".to_string()],
                    accepted,
                    None,
                    metrics,
                    depth - 1,
                )
                .await;
            }
        }
    }

    find_labels_at(zone, &name, targets, accepted, rop_client, metrics, depth - 1).await
}

/// The ANY short-circuit answers from the bare leaf.
fn any_lookup<'z>(zone: &'z Zone, leaf: &str) -> Lookup<'z> {
    match zone.labels.get(leaf) {
        Some(label) => Lookup::Found {
            label,
            qtype: RecordType::ANY,
        },
        None => Lookup::Miss { label: None },
    }
}

/// The override state for a wildcard alias: the pattern prefix before
/// the `*` keys the store table, and the part of the leaf from that
/// position onward is the field.
fn rop_client_for(glob_label: &Label, leaf: &str) -> Option<RopClient> {
    let idx = glob_label.label.find('*')?;
    if idx >= leaf.len() {
        return None;
    }
    Some(RopClient {
        key: glob_label.label[..idx].to_string(),
        value: leaf[idx..].to_string(),
        fallback_label: glob_label.alias_target()?.to_string(),
    })
}

/// Compose the name to look up from the leaf and a targeting suffix.
fn compose(leaf: &str, target: &str) -> String {
    if target == "@" {
        leaf.to_string()
    } else if leaf.is_empty() {
        target.to_string()
    } else {
        format!("{leaf}.{target}")
    }
}

/// Anchored glob match, `*` matching any run of characters.
pub fn glob(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == name;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !name.starts_with(first) {
        return false;
    }
    let mut rest = &name[first.len()..];

    if rest.len() < last.len() || !rest.ends_with(last) {
        return false;
    }
    rest = &rest[..rest.len() - last.len()];

    for mid in &parts[1..parts.len() - 1] {
        match rest.find(mid) {
            Some(at) => rest = &rest[at + mid.len()..],
            None => return false,
        }
    }
    true
}
