//! Deserialisation of DNS messages from the wire format.  See the
//! `types` module for details of the format.
//!
//! This is the query side of the house: the answer sections of incoming
//! messages are skipped over, and the only additional record that gets
//! interpreted is OPT (for the payload size and the client-subnet
//! option).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

/// Wire type of the OPT pseudo-record.
const OPT_TYPE: u16 = 41;

/// EDNS option code of the client-subnet option.
const OPT_CLIENT_SUBNET: u16 = 8;

/// Upper bound on compression-pointer jumps while reading one name.
const MAX_POINTER_JUMPS: usize = 32;

impl Message {
    /// # Errors
    ///
    /// If the message is shorter than its counters promise, or a name is
    /// malformed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        let mut buffer = ConsumableBuffer::new(octets);

        if octets.len() < 12 {
            return Err(Error::HeaderTooShort);
        }

        // safe: the length check above covers the fixed-size header
        let id = buffer.next_u16().unwrap();
        let flags1 = buffer.next_u8().unwrap();
        let flags2 = buffer.next_u8().unwrap();
        let qdcount = buffer.next_u16().unwrap();
        let ancount = buffer.next_u16().unwrap();
        let nscount = buffer.next_u16().unwrap();
        let arcount = buffer.next_u16().unwrap();

        let header = Header {
            id,
            is_response: flags1 & 0b1000_0000 != 0,
            opcode: Opcode::from((flags1 & 0b0111_1000) >> 3),
            is_authoritative: flags1 & 0b0000_0100 != 0,
            is_truncated: flags1 & 0b0000_0010 != 0,
            recursion_desired: flags1 & 0b0000_0001 != 0,
            recursion_available: flags2 & 0b1000_0000 != 0,
            rcode: Rcode::from(flags2 & 0b0000_1111),
        };

        let mut questions = Vec::with_capacity(usize::from(qdcount));
        for _ in 0..qdcount {
            let name = buffer.next_domain(id)?;
            let qtype = buffer.next_u16().ok_or(Error::QuestionTooShort { id })?;
            let qclass = buffer.next_u16().ok_or(Error::QuestionTooShort { id })?;
            questions.push(Question {
                name,
                qtype: qtype.into(),
                qclass: qclass.into(),
            });
        }

        // answer and authority sections of a query carry nothing this
        // server acts on
        for _ in 0..u32::from(ancount) + u32::from(nscount) {
            skip_rr(&mut buffer, id)?;
        }

        let mut edns = None;
        for _ in 0..arcount {
            if let Some(parsed) = next_additional(&mut buffer, id)? {
                edns = Some(parsed);
            }
        }

        Ok(Self {
            header,
            questions,
            answers: Vec::new(),
            authority: Vec::new(),
            edns,
        })
    }
}

fn skip_rr(buffer: &mut ConsumableBuffer, id: u16) -> Result<(), Error> {
    buffer.next_domain(id)?;
    buffer
        .skip(2 + 2 + 4)
        .ok_or(Error::RecordTooShort { id })?;
    let rdlength = buffer.next_u16().ok_or(Error::RecordTooShort { id })?;
    buffer
        .skip(usize::from(rdlength))
        .ok_or(Error::RecordTooShort { id })?;
    Ok(())
}

/// Parse one additional record, returning the interpreted EDNS data if it
/// was an OPT.
fn next_additional(buffer: &mut ConsumableBuffer, id: u16) -> Result<Option<Edns>, Error> {
    buffer.next_domain(id)?;
    let rtype = buffer.next_u16().ok_or(Error::RecordTooShort { id })?;
    let rclass = buffer.next_u16().ok_or(Error::RecordTooShort { id })?;
    let _ttl = buffer.next_u32().ok_or(Error::RecordTooShort { id })?;
    let rdlength = buffer.next_u16().ok_or(Error::RecordTooShort { id })?;
    let rdata = buffer
        .take(usize::from(rdlength))
        .ok_or(Error::RecordTooShort { id })?;

    if rtype != OPT_TYPE {
        return Ok(None);
    }

    Ok(Some(Edns {
        udp_payload_size: rclass,
        client_subnet: parse_client_subnet(rdata),
    }))
}

/// Walk OPT rdata looking for a well-formed client-subnet option.
/// Malformed options are ignored rather than rejected: EDNS is advisory
/// for this server.
fn parse_client_subnet(rdata: &[u8]) -> Option<ClientSubnet> {
    let mut pos = 0;
    while pos + 4 <= rdata.len() {
        let code = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]);
        let olen = usize::from(u16::from_be_bytes([rdata[pos + 2], rdata[pos + 3]]));
        pos += 4;
        if pos + olen > rdata.len() {
            return None;
        }
        let option = &rdata[pos..pos + olen];
        pos += olen;

        if code != OPT_CLIENT_SUBNET || option.len() < 4 {
            continue;
        }

        let family = u16::from_be_bytes([option[0], option[1]]);
        let source_prefix = option[2];
        let scope_prefix = option[3];
        let addr = &option[4..];

        let address = match family {
            1 if addr.len() <= 4 => {
                let mut octets = [0u8; 4];
                octets[..addr.len()].copy_from_slice(addr);
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            2 if addr.len() <= 16 => {
                let mut octets = [0u8; 16];
                octets[..addr.len()].copy_from_slice(addr);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => continue,
        };

        return Some(ClientSubnet {
            address,
            source_prefix,
            scope_prefix,
        });
    }
    None
}

/// Errors encountered when deserialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    HeaderTooShort,
    QuestionTooShort { id: u16 },
    RecordTooShort { id: u16 },
    DomainTooLong { id: u16 },
    DomainLabelInvalid { id: u16 },
    DomainPointerInvalid { id: u16 },
}

impl Error {
    /// The query id, if it could be read: a format-error response needs
    /// it.
    pub fn id(&self) -> Option<u16> {
        match self {
            Error::HeaderTooShort => None,
            Error::QuestionTooShort { id }
            | Error::RecordTooShort { id }
            | Error::DomainTooLong { id }
            | Error::DomainLabelInvalid { id }
            | Error::DomainPointerInvalid { id } => Some(*id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::HeaderTooShort => write!(f, "message too short for the header"),
            Error::QuestionTooShort { .. } => write!(f, "question section ends early"),
            Error::RecordTooShort { .. } => write!(f, "record section ends early"),
            Error::DomainTooLong { .. } => write!(f, "domain name exceeds 255 octets"),
            Error::DomainLabelInvalid { .. } => write!(f, "domain label malformed"),
            Error::DomainPointerInvalid { .. } => write!(f, "compression pointer invalid"),
        }
    }
}

impl std::error::Error for Error {}

/// A buffer which can be read from, for deserialisation purposes.
struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    fn next_u8(&mut self) -> Option<u8> {
        let octet = *self.octets.get(self.position)?;
        self.position += 1;
        Some(octet)
    }

    fn next_u16(&mut self) -> Option<u16> {
        let hi = self.next_u8()?;
        let lo = self.next_u8()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    fn next_u32(&mut self) -> Option<u32> {
        let hi = self.next_u16()?;
        let lo = self.next_u16()?;
        Some((u32::from(hi) << 16) | u32::from(lo))
    }

    fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.position + size <= self.octets.len() {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    fn skip(&mut self, size: usize) -> Option<()> {
        self.take(size).map(|_| ())
    }

    /// Read a domain name, following compression pointers.  Pointer
    /// targets are read without moving the main cursor.
    fn next_domain(&mut self, id: u16) -> Result<DomainName, Error> {
        let mut labels = Vec::new();
        let mut octets_len = 0;
        let mut position = self.position;
        let mut jumps = 0;
        let mut followed = false;

        loop {
            let len = *self
                .octets
                .get(position)
                .ok_or(Error::DomainLabelInvalid { id })?;

            if len & 0b1100_0000 == 0b1100_0000 {
                let lo = *self
                    .octets
                    .get(position + 1)
                    .ok_or(Error::DomainPointerInvalid { id })?;
                if !followed {
                    self.position = position + 2;
                    followed = true;
                }
                position = usize::from(u16::from_be_bytes([len & 0b0011_1111, lo]));
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(Error::DomainPointerInvalid { id });
                }
                continue;
            }

            if len & 0b1100_0000 != 0 {
                return Err(Error::DomainLabelInvalid { id });
            }

            let len = usize::from(len);
            position += 1;
            octets_len += 1 + len;
            if octets_len > DOMAINNAME_MAX_LEN {
                return Err(Error::DomainTooLong { id });
            }

            if len == 0 {
                labels.push(String::new());
                if !followed {
                    self.position = position;
                }
                return DomainName::from_labels(labels)
                    .ok_or(Error::DomainLabelInvalid { id });
            }

            let label_octets = self
                .octets
                .get(position..position + len)
                .ok_or(Error::DomainLabelInvalid { id })?;
            if !label_octets.is_ascii() {
                return Err(Error::DomainLabelInvalid { id });
            }
            labels.push(String::from_utf8_lossy(label_octets).into_owned());
            position += len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    fn query_octets() -> Vec<u8> {
        let mut octets = vec![
            0x12, 0x34, // id
            0b0000_0001, 0b0000_0000, // flags: RD
            0, 1, // QDCOUNT
            0, 0, // ANCOUNT
            0, 0, // NSCOUNT
            0, 0, // ARCOUNT
        ];
        octets.extend_from_slice(&[
            3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o',
            b'm', 0, // www.example.com.
            0, 1, // QTYPE A
            0, 1, // QCLASS IN
        ]);
        octets
    }

    #[test]
    fn parses_a_query() {
        let msg = Message::from_octets(&query_octets()).unwrap();

        assert_eq!(0x1234, msg.header.id);
        assert!(!msg.header.is_response);
        assert!(msg.header.recursion_desired);
        assert_eq!(1, msg.questions.len());
        assert_eq!(
            Question {
                name: domain("www.example.com."),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
            msg.questions[0]
        );
        assert_eq!(None, msg.edns);
    }

    #[test]
    fn parses_edns_client_subnet() {
        let mut octets = query_octets();
        octets[11] = 1; // ARCOUNT
        octets.extend_from_slice(&[
            0, // root owner
            0, 41, // OPT
            16, 0, // payload size 4096
            0, 0, 0, 0, // extended rcode + flags
            0, 11, // RDLENGTH
            0, 8, // client subnet
            0, 7, // option length
            0, 1, // family IPv4
            24, 0, // source /24, scope 0
            192, 168, 7, // address
        ]);

        let msg = Message::from_octets(&octets).unwrap();
        let edns = msg.edns.unwrap();
        assert_eq!(4096, edns.udp_payload_size);
        assert_eq!(
            Some(ClientSubnet {
                address: std::net::Ipv4Addr::new(192, 168, 7, 0).into(),
                source_prefix: 24,
                scope_prefix: 0,
            }),
            edns.client_subnet
        );
    }

    #[test]
    fn header_too_short() {
        assert_eq!(
            Err(Error::HeaderTooShort),
            Message::from_octets(&[0x12, 0x34, 0, 0])
        );
    }

    #[test]
    fn truncated_question_keeps_id() {
        let mut octets = query_octets();
        octets.truncate(16);

        let err = Message::from_octets(&octets).unwrap_err();
        assert_eq!(Some(0x1234), err.id());
    }

    #[test]
    fn rejects_pointer_loops() {
        let mut octets = vec![
            0x12, 0x34, 0, 0, //
            0, 1, 0, 0, 0, 0, 0, 0,
        ];
        // name is a pointer to itself
        octets.extend_from_slice(&[0b1100_0000, 12, 0, 1, 0, 1]);

        assert_eq!(
            Err(Error::DomainPointerInvalid { id: 0x1234 }),
            Message::from_octets(&octets)
        );
    }

    #[test]
    fn roundtrips_own_responses() {
        let msg = Message::from_octets(&query_octets()).unwrap();
        let mut response = msg.make_response();
        response.answers.push(a_record(
            "www.example.com.",
            std::net::Ipv4Addr::new(10, 0, 0, 1),
        ));

        let octets = response.to_octets().unwrap();
        let reparsed = Message::from_octets(&octets).unwrap();

        assert_eq!(response.header, reparsed.header);
        assert_eq!(response.questions, reparsed.questions);
        // answers of an incoming message are skipped, not parsed
        assert!(reparsed.answers.is_empty());
    }
}
