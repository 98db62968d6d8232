//! Byte-level plumbing for the UDP and TCP listeners.

use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// The classic DNS UDP payload limit, for clients without EDNS.
pub const UDP_PAYLOAD_DEFAULT: usize = 512;

/// Read a DNS message from a TCP stream.
///
/// A DNS TCP message has a big-endian u16 prefix giving the total length
/// of the message, so the entire message can be read before parsing
/// begins.
pub async fn read_tcp_bytes(stream: &mut TcpStream) -> Result<BytesMut, TcpError> {
    match stream.read_u16().await {
        Ok(size) => {
            let expected = size as usize;
            let mut bytes = BytesMut::with_capacity(expected);
            while bytes.len() < expected {
                match stream.read_buf(&mut bytes).await {
                    Ok(0) if bytes.len() < expected => {
                        return Err(TcpError::TooShort {
                            id: id_of(&bytes),
                            expected,
                            actual: bytes.len(),
                        });
                    }
                    Err(err) => {
                        return Err(TcpError::IO {
                            id: id_of(&bytes),
                            error: err,
                        });
                    }
                    _ => (),
                }
            }
            Ok(bytes)
        }
        Err(err) => Err(TcpError::IO {
            id: None,
            error: err,
        }),
    }
}

fn id_of(bytes: &BytesMut) -> Option<u16> {
    if bytes.len() >= 2 {
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    } else {
        None
    }
}

/// An error that can occur when reading a DNS TCP message.
#[derive(Debug)]
pub enum TcpError {
    TooShort {
        id: Option<u16>,
        expected: usize,
        actual: usize,
    },
    IO {
        id: Option<u16>,
        error: io::Error,
    },
}

impl TcpError {
    pub fn id(&self) -> Option<u16> {
        match self {
            TcpError::TooShort { id, .. } | TcpError::IO { id, .. } => *id,
        }
    }
}

/// Write a serialised response to a UDP socket, truncating to the
/// client's payload limit and setting the TC flag if it does not fit.
pub async fn send_udp_bytes_to(
    sock: &UdpSocket,
    target: SocketAddr,
    bytes: &mut [u8],
    max_payload: usize,
) -> Result<(), io::Error> {
    debug_assert!(bytes.len() >= 12);

    if bytes.len() > max_payload {
        bytes[2] |= 0b0000_0010;
        sock.send_to(&bytes[..max_payload], target).await?;
    } else {
        sock.send_to(bytes, target).await?;
    }

    Ok(())
}

/// Write a serialised response to a TCP stream, with the two-octet
/// length prefix.
pub async fn send_tcp_bytes(stream: &mut TcpStream, bytes: &mut [u8]) -> Result<(), io::Error> {
    debug_assert!(bytes.len() >= 12);

    let len = if let Ok(len) = bytes.len().try_into() {
        len
    } else {
        bytes[2] |= 0b0000_0010;
        u16::MAX
    };

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes[..(len as usize)]).await?;

    Ok(())
}
