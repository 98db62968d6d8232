//! Types for DNS messages as this server speaks them: queries in,
//! geo-selected answers out.
//!
//! ```text
//!     +---------------------+
//!     |        Header       |
//!     +---------------------+
//!     |       Question      | the question for the name server
//!     +---------------------+
//!     |        Answer       | RRs answering the question
//!     +---------------------+
//!     |      Authority      | RRs pointing toward an authority
//!     +---------------------+
//!     |      Additional     | RRs holding additional information
//!     +---------------------+
//! ```
//!
//! See section 4.1 of RFC 1035 and, for the EDNS client-subnet option,
//! RFC 7871.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Maximum length of a single label, in octets.
pub const LABEL_MAX_LEN: usize = 63;

/// Maximum length of a domain name, in octets, including the length
/// octets.
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// Basic DNS message format, used for both queries and responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    /// The parsed OPT pseudo-record, if the query carried one.  This is
    /// interpreted on read and regenerated on write, never kept as a raw
    /// additional RR.
    pub edns: Option<Edns>,
}

/// Common header type for all messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    /// Query identifier, copied into the response.
    pub id: u16,

    /// False for a query, true for a response.
    pub is_response: bool,

    /// Kind of query.
    pub opcode: Opcode,

    /// Whether the responding server is an authority for the queried
    /// name.
    pub is_authoritative: bool,

    /// Whether the message was truncated to fit the transport.
    pub is_truncated: bool,

    /// Copied from query to response; this server never recurses.
    pub recursion_desired: bool,

    /// Always false in our responses.
    pub recursion_available: bool,

    /// Response code.
    pub rcode: Rcode,
}

/// A single entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: DomainName,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.qclass, self.qtype)
    }
}

/// A resource record of the answer, authority, or additional section.
/// The class is always IN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: DomainName,
    pub data: RecordData,
    pub ttl: u32,
}

/// What sort of query this is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    Standard,
    Inverse,
    Status,
    Reserved(u8),
}

impl From<u8> for Opcode {
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Opcode::Standard,
            1 => Opcode::Inverse,
            2 => Opcode::Status,
            other => Opcode::Reserved(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
            Opcode::Reserved(other) => other,
        }
    }
}

/// What sort of response this is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Reserved(u8),
}

impl From<u8> for Rcode {
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Reserved(other),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Reserved(other) => other,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "NOERROR"),
            Rcode::FormatError => write!(f, "FORMERR"),
            Rcode::ServerFailure => write!(f, "SERVFAIL"),
            Rcode::NameError => write!(f, "NXDOMAIN"),
            Rcode::NotImplemented => write!(f, "NOTIMP"),
            Rcode::Refused => write!(f, "REFUSED"),
            Rcode::Reserved(other) => write!(f, "RCODE{other}"),
        }
    }
}

/// A domain name: a sequence of lower-cased ASCII labels ending with the
/// empty root label.
///
/// A label must be 63 octets or shorter.  A name must be 255 octets or
/// shorter in total, including the length octets of the wire form.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DomainName {
    pub labels: Vec<String>,
    // INVARIANT: len == len(labels) + sum(map(len, labels))
    pub len: usize,
}

impl DomainName {
    pub fn root_domain() -> Self {
        DomainName {
            labels: vec![String::new()],
            len: 1,
        }
    }

    pub fn is_root(&self) -> bool {
        self.len == 1 && self.labels[0].is_empty()
    }

    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        self.labels.len() >= other.labels.len()
            && self.labels[self.labels.len() - other.labels.len()..] == other.labels[..]
    }

    /// The number of real (non-root) labels.
    pub fn label_count(&self) -> usize {
        self.labels.len() - 1
    }

    /// Chop the origin suffix off this name, returning the remaining
    /// labels joined by `.`: the relative leaf name the zone tables are
    /// keyed by.  `None` if this name is not under the origin.
    pub fn leaf_of(&self, origin: &DomainName) -> Option<String> {
        if self.is_subdomain_of(origin) {
            Some(self.labels[..self.labels.len() - origin.labels.len()].join("."))
        } else {
            None
        }
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }

        let mut out = String::with_capacity(self.len);
        let mut first = true;
        for label in &self.labels {
            if first {
                first = false;
            } else {
                out.push('.');
            }
            out.push_str(label);
        }

        out
    }

    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s == "." {
            return Some(Self::root_domain());
        }

        let chunks = s.split('.').collect::<Vec<_>>();
        let mut labels = Vec::with_capacity(chunks.len() + 1);

        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.is_empty() && i != chunks.len() - 1 {
                return None;
            }
            labels.push((*chunk).to_string());
        }

        if !matches!(labels.last(), Some(l) if l.is_empty()) {
            labels.push(String::new());
        }

        Self::from_labels(labels)
    }

    /// Qualify a possibly-relative name against an origin: absolute names
    /// (trailing dot) are taken as-is, everything else is suffixed with
    /// the origin.
    pub fn from_relative_dotted_string(origin: &Self, s: &str) -> Option<Self> {
        if s.is_empty() {
            Some(origin.clone())
        } else if s.ends_with('.') {
            Self::from_dotted_string(s)
        } else {
            let mut labels: Vec<String> = s.split('.').map(str::to_string).collect();
            labels.extend(origin.labels.iter().cloned());
            Self::from_labels(labels)
        }
    }

    pub fn from_labels(mixed_case_labels: Vec<String>) -> Option<Self> {
        if mixed_case_labels.is_empty() {
            return None;
        }

        let mut labels = Vec::with_capacity(mixed_case_labels.len());
        let mut len = mixed_case_labels.len();
        let mut blank_label = false;

        for mc_label in &mixed_case_labels {
            if blank_label {
                return None;
            }

            blank_label = mc_label.is_empty();

            if mc_label.len() > LABEL_MAX_LEN || !mc_label.is_ascii() {
                return None;
            }

            len += mc_label.len();
            labels.push(mc_label.to_ascii_lowercase());
        }

        if blank_label && len <= DOMAINNAME_MAX_LEN {
            Some(Self { labels, len })
        } else {
            None
        }
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainName")
            .field("to_dotted_string()", &self.to_dotted_string())
            .finish()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_dotted_string())
    }
}

impl FromStr for DomainName {
    type Err = DomainNameFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomainName::from_dotted_string(s).ok_or(DomainNameFromStr::NoParse)
    }
}

/// Errors that can arise when converting a `&str` into a `DomainName`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DomainNameFromStr {
    NoParse,
}

impl fmt::Display for DomainNameFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not parse string to domain name")
    }
}

impl std::error::Error for DomainNameFromStr {}

/// Record types this server stores and serves.  `Alias` is the internal
/// server-side redirection type: it reuses the long-retired wire code 4
/// and is never serialised.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    NS,
    Alias,
    CNAME,
    SOA,
    MX,
    TXT,
    AAAA,
    SRV,
    SPF,
    ANY,
    Unknown(u16),
}

impl RecordType {
    pub fn is_unknown(self) -> bool {
        matches!(self, RecordType::Unknown(_))
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            4 => RecordType::Alias,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            99 => RecordType::SPF,
            255 => RecordType::ANY,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::Alias => 4,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::SPF => 99,
            RecordType::ANY => 255,
            RecordType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::Alias => write!(f, "ALIAS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::SPF => write!(f, "SPF"),
            RecordType::ANY => write!(f, "ANY"),
            RecordType::Unknown(other) => write!(f, "TYPE{other}"),
        }
    }
}

/// Record classes.  This server only answers IN.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RecordClass {
    IN,
    Unknown(u16),
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            other => RecordClass::Unknown(other),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::Unknown(other) => write!(f, "CLASS{other}"),
        }
    }
}

/// A record type with its associated data, over the closed set of types
/// this server serves.  The answer-selection machinery never looks inside
/// the payload, only at the type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A {
        address: Ipv4Addr,
    },
    AAAA {
        address: Ipv6Addr,
    },
    NS {
        nsdname: DomainName,
    },
    CNAME {
        cname: DomainName,
    },
    MX {
        preference: u16,
        exchange: DomainName,
    },
    TXT {
        text: String,
    },
    SPF {
        text: String,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    /// Server-side redirection to another label of the same zone.
    /// Resolved before answer construction, never sent on the wire.
    Alias {
        target: String,
    },
}

impl RecordData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordData::A { .. } => RecordType::A,
            RecordData::AAAA { .. } => RecordType::AAAA,
            RecordData::NS { .. } => RecordType::NS,
            RecordData::CNAME { .. } => RecordType::CNAME,
            RecordData::MX { .. } => RecordType::MX,
            RecordData::TXT { .. } => RecordType::TXT,
            RecordData::SPF { .. } => RecordType::SPF,
            RecordData::SRV { .. } => RecordType::SRV,
            RecordData::SOA { .. } => RecordType::SOA,
            RecordData::Alias { .. } => RecordType::Alias,
        }
    }
}

/// The interpreted OPT pseudo-record of a query or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edns {
    /// The requestor's UDP payload size.
    pub udp_payload_size: u16,
    pub client_subnet: Option<ClientSubnet>,
}

impl Edns {
    /// The payload size we advertise in responses.
    pub const RESPONSE_UDP_PAYLOAD_SIZE: u16 = 4096;
}

/// EDNS client-subnet option (code 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSubnet {
    pub address: IpAddr,
    pub source_prefix: u8,
    pub scope_prefix: u8,
}

impl ClientSubnet {
    /// Address family in the RFC 7871 sense: 1 for IPv4, 2 for IPv6.
    pub fn family(&self) -> u16 {
        match self.address {
            IpAddr::V4(_) => 1,
            IpAddr::V6(_) => 2,
        }
    }
}

#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    use super::*;

    pub fn domain(s: &str) -> DomainName {
        DomainName::from_dotted_string(s).unwrap()
    }

    pub fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            data: RecordData::A { address },
            ttl: 300,
        }
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            data: RecordData::AAAA { address },
            ttl: 300,
        }
    }

    pub fn ns_record(name: &str, nsdname: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            data: RecordData::NS {
                nsdname: domain(nsdname),
            },
            ttl: 300,
        }
    }

    pub fn cname_record(name: &str, cname: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            data: RecordData::CNAME {
                cname: domain(cname),
            },
            ttl: 300,
        }
    }

    pub fn mx_record(name: &str, preference: u16, exchange: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            data: RecordData::MX {
                preference,
                exchange: domain(exchange),
            },
            ttl: 300,
        }
    }
}
