pub mod deserialise;
pub mod serialise;
pub mod types;

use self::types::*;

impl Message {
    /// An empty response to this query: id, opcode, questions, and the RD
    /// flag are copied over, and an OPT record is promised if the query
    /// carried one.
    pub fn make_response(&self) -> Self {
        Self {
            header: Header {
                id: self.header.id,
                is_response: true,
                opcode: self.header.opcode,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: self.header.recursion_desired,
                recursion_available: false,
                rcode: Rcode::NoError,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            edns: self.edns.as_ref().map(|edns| Edns {
                udp_payload_size: Edns::RESPONSE_UDP_PAYLOAD_SIZE,
                client_subnet: edns.client_subnet.map(|cs| ClientSubnet {
                    scope_prefix: 0,
                    ..cs
                }),
            }),
        }
    }

    pub fn make_format_error_response(id: u16) -> Self {
        Self {
            header: Header {
                id,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: false,
                rcode: Rcode::FormatError,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            edns: None,
        }
    }
}
