//! Serialisation of DNS messages to the wire format.  See the `types`
//! module for details of the format.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::protocol::types::*;

/// Wire type of the OPT pseudo-record.
const OPT_TYPE: u16 = 41;

/// EDNS option code of the client-subnet option.
const OPT_CLIENT_SUBNET: u16 = 8;

impl Message {
    /// # Errors
    ///
    /// If a section counter overflows, or an answer contains an internal
    /// alias record (a bug in answer construction).
    pub fn to_octets(&self) -> Result<BytesMut, Error> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;
        Ok(buffer.octets)
    }

    fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = u16::from(self.edns.is_some());

        self.header.serialise(buffer);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(buffer);
        }
        for rr in &self.answers {
            rr.serialise(buffer)?;
        }
        for rr in &self.authority {
            rr.serialise(buffer)?;
        }
        if let Some(edns) = &self.edns {
            edns.serialise(buffer);
        }

        Ok(())
    }
}

const HEADER_MASK_QR: u8 = 0b1000_0000;
const HEADER_OFFSET_OPCODE: u8 = 3;
const HEADER_MASK_OPCODE: u8 = 0b0111_1000;
const HEADER_MASK_AA: u8 = 0b0000_0100;
const HEADER_MASK_TC: u8 = 0b0000_0010;
const HEADER_MASK_RD: u8 = 0b0000_0001;
const HEADER_MASK_RA: u8 = 0b1000_0000;
const HEADER_MASK_RCODE: u8 = 0b0000_1111;

impl Header {
    fn serialise(&self, buffer: &mut WritableBuffer) {
        // octet 1
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        // octet 2
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let field_rcode = HEADER_MASK_RCODE & u8::from(self.rcode);

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | field_rcode);
    }
}

impl Question {
    fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer, true);
        buffer.write_u16(self.qtype.into());
        buffer.write_u16(self.qclass.into());
    }
}

impl ResourceRecord {
    fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer, true);
        buffer.write_u16(self.data.rtype().into());
        buffer.write_u16(RecordClass::IN.into());
        buffer.write_u32(self.ttl);

        // filled in below
        let rdlength_index = buffer.index();
        buffer.write_u16(0);

        match &self.data {
            RecordData::A { address } => buffer.write_octets(&address.octets()),
            RecordData::AAAA { address } => buffer.write_octets(&address.octets()),
            RecordData::NS { nsdname } => nsdname.serialise(buffer, false),
            RecordData::CNAME { cname } => cname.serialise(buffer, false),
            RecordData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer, false);
            }
            RecordData::TXT { text } | RecordData::SPF { text } => {
                write_character_strings(buffer, text);
            }
            RecordData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                buffer.write_u16(*priority);
                buffer.write_u16(*weight);
                buffer.write_u16(*port);
                target.serialise(buffer, false);
            }
            RecordData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer, false);
                rname.serialise(buffer, false);
                buffer.write_u32(*serial);
                buffer.write_u32(*refresh);
                buffer.write_u32(*retry);
                buffer.write_u32(*expire);
                buffer.write_u32(*minimum);
            }
            RecordData::Alias { .. } => return Err(Error::AliasOnTheWire),
        }

        // -2 so we don't also include the 2 octets for the rdlength
        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        let [hi, lo] = rdlength.to_be_bytes();
        buffer.octets[rdlength_index] = hi;
        buffer.octets[rdlength_index + 1] = lo;

        Ok(())
    }
}

impl Edns {
    /// OPT overloads the RR fields: the class carries the payload size
    /// and the TTL the extended rcode and flags (all zero here).
    fn serialise(&self, buffer: &mut WritableBuffer) {
        buffer.write_u8(0); // root owner name
        buffer.write_u16(OPT_TYPE);
        buffer.write_u16(self.udp_payload_size);
        buffer.write_u32(0);

        match &self.client_subnet {
            Some(cs) => {
                let address_octets = subnet_address_octets(cs);
                let rdlength = 4 + 4 + address_octets.len();
                buffer.write_u16(rdlength as u16);
                buffer.write_u16(OPT_CLIENT_SUBNET);
                buffer.write_u16((4 + address_octets.len()) as u16);
                buffer.write_u16(cs.family());
                buffer.write_u8(cs.source_prefix);
                buffer.write_u8(cs.scope_prefix);
                buffer.write_octets(&address_octets);
            }
            None => buffer.write_u16(0),
        }
    }
}

/// The address of a client-subnet option, truncated to the source prefix
/// length as RFC 7871 requires.
fn subnet_address_octets(cs: &ClientSubnet) -> Vec<u8> {
    let all = match cs.address {
        IpAddr::V4(addr) => addr.octets().to_vec(),
        IpAddr::V6(addr) => addr.octets().to_vec(),
    };
    let keep = usize::from(cs.source_prefix).div_ceil(8).min(all.len());
    all[..keep].to_vec()
}

impl DomainName {
    fn serialise(&self, buffer: &mut WritableBuffer, compress: bool) {
        if compress {
            if let Some(ptr) = buffer.name_pointer(self) {
                buffer.write_u16(ptr);
                return;
            }
        }

        buffer.memoise_name(self);
        for label in &self.labels {
            buffer.write_u8(label.len() as u8);
            buffer.write_octets(label.as_bytes());
        }
    }
}

/// TXT-style data is a sequence of character strings, each at most 255
/// octets.
fn write_character_strings(buffer: &mut WritableBuffer, text: &str) {
    let octets = text.as_bytes();
    if octets.is_empty() {
        buffer.write_u8(0);
        return;
    }
    for chunk in octets.chunks(255) {
        buffer.write_u8(chunk.len() as u8);
        buffer.write_octets(chunk);
    }
}

/// Errors encountered when serialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize },
    /// An internal alias record reached answer serialisation.
    AliasOnTheWire,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter } => {
                write!(f, "'{counter}' cannot be converted to a u16")
            }
            Error::AliasOnTheWire => {
                write!(f, "internal error (bug): tried to serialise an alias record")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A buffer which can be written to, for serialisation purposes.
pub struct WritableBuffer {
    pub octets: BytesMut,
    name_pointers: HashMap<DomainName, u16>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
            name_pointers: HashMap::new(),
        }
    }
}

impl WritableBuffer {
    fn index(&self) -> usize {
        self.octets.len()
    }

    fn memoise_name(&mut self, name: &DomainName) {
        if !name.is_root() && !self.name_pointers.contains_key(name) {
            if let Ok(index) = u16::try_from(self.index()) {
                let [hi, lo] = index.to_be_bytes();
                self.name_pointers
                    .insert(name.clone(), u16::from_be_bytes([hi | 0b1100_0000, lo]));
            }
        }
    }

    fn name_pointer(&self, name: &DomainName) -> Option<u16> {
        self.name_pointers.get(name).copied()
    }

    fn write_u8(&mut self, octet: u8) {
        self.octets.put_u8(octet);
    }

    fn write_u16(&mut self, value: u16) {
        self.write_octets(&value.to_be_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.write_octets(&value.to_be_bytes());
    }

    fn write_octets(&mut self, octets: &[u8]) {
        self.octets.put_slice(octets);
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an error).
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    u16::try_from(counter).map_err(|_| Error::CounterTooLarge { counter })
}
