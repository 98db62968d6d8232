//! Builds the ordered list of targeting suffixes for a client address.
//!
//! The list is always most-specific first and always ends with `"@"`,
//! the apex-relative sentinel.  Levels the zone does not target, and
//! levels the geo adapter has no answer for, are skipped.

use std::fmt;
use std::net::IpAddr;

use zoned_types::countries;
use zoned_types::zones::types::Targeting;

/// A location as the geo databases report it.  Empty strings mean
/// "unknown"; codes are lower-case; the region is `<cc>-<subdivision>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: String,
    pub continent: String,
    pub region_group: String,
    pub region: String,
    /// Significant prefix bits of the lookup, for the EDNS scope answer.
    pub netmask: u8,
}

/// Geolocation databases, IPv4 and IPv6 alike.  Implementations wrap
/// whatever country/city/ASN databases are on disk; [`NoGeoIp`] keeps the
/// server answering when there are none.
pub trait GeoIp: Send + Sync + fmt::Debug {
    /// Country and continent only.
    fn country(&self, ip: IpAddr) -> GeoLocation;

    /// Country, continent, region, and region group.
    fn country_region(&self, ip: IpAddr) -> GeoLocation;

    /// Autonomous system, lower-cased `asNNNN` form, with netmask.
    fn asn(&self, ip: IpAddr) -> (String, u8);
}

/// A geo adapter with no databases: every lookup comes back unknown, so
/// every query resolves at the `"@"` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoIp;

impl GeoIp for NoGeoIp {
    fn country(&self, _ip: IpAddr) -> GeoLocation {
        GeoLocation::default()
    }

    fn country_region(&self, _ip: IpAddr) -> GeoLocation {
        GeoLocation::default()
    }

    fn asn(&self, _ip: IpAddr) -> (String, u8) {
        (String::new(), 0)
    }
}

/// Derive the region group from a country + region pair the way the
/// static table defines it.  Adapters which already know the group can
/// skip this.
pub fn region_group_of(country: &str, region: &str) -> String {
    countries::region_group(country, region)
        .unwrap_or_default()
        .to_string()
}

/// Build the targeting list for one query.
///
/// Pure apart from the adapter calls: no I/O, no clock, no randomness.
/// Returns the suffixes and the netmask to report as the EDNS scope.
pub fn build_targets(geo: &dyn GeoIp, targeting: Targeting, ip: IpAddr) -> (Vec<String>, u8) {
    let mut targets = Vec::with_capacity(6);
    let mut netmask = 0;

    if targeting.contains(Targeting::ASN) {
        let (asn, mask) = geo.asn(ip);
        if !asn.is_empty() {
            targets.push(format!("asn.{asn}"));
        }
        netmask = netmask.max(mask);
    }

    let wants_region =
        targeting.contains(Targeting::REGION) || targeting.contains(Targeting::REGION_GROUP);
    let wants_country =
        targeting.contains(Targeting::COUNTRY) || targeting.contains(Targeting::CONTINENT);

    if wants_region || wants_country {
        let location = if wants_region {
            geo.country_region(ip)
        } else {
            geo.country(ip)
        };
        netmask = netmask.max(location.netmask);

        if targeting.contains(Targeting::REGION_GROUP) && !location.region_group.is_empty() {
            targets.push(location.region_group);
        }
        if targeting.contains(Targeting::REGION) && !location.region.is_empty() {
            targets.push(location.region);
        }
        if targeting.contains(Targeting::COUNTRY) && !location.country.is_empty() {
            targets.push(location.country);
        }
        if targeting.contains(Targeting::CONTINENT) && !location.continent.is_empty() {
            targets.push(location.continent);
        }
    }

    targets.push("@".to_string());
    (targets, netmask)
}
