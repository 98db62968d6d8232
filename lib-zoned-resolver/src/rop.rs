//! The route-override (ROP) store: a per-client redirection table the
//! resolver consults while following a wildcard alias.
//!
//! The store speaks one operation: hash-field fetch by `(key, value)`,
//! returning bytes or "absent".  The bytes decode as a JSON
//! `{"list": [...], "is_out": bool}` pair: with `is_out` false the list
//! is a whitelist (membership allows the override name), with `is_out`
//! true it is a blacklist (membership disables it).
//!
//! Every failure mode (no connection, timeout, decode error, missing
//! entry) collapses to "override absent": the store can only ever
//! redirect traffic, never break resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub use zoned_types::zones::types::RopStore;

/// Hard deadline on a single override lookup.  Queries must not hang on
/// the store.
pub const ROP_TIMEOUT: Duration = Duration::from_millis(50);

/// Idle connections kept per store handle.
const MAX_IDLE_CONNS: usize = 4;

/// The override state carried through alias resolution: which hash entry
/// to consult and where to fall back to if the override disables the
/// target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RopClient {
    pub key: String,
    pub value: String,
    pub fallback_label: String,
}

/// A stored override entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RopList {
    pub list: Vec<String>,
    /// True: the list excludes its members (blacklist).
    pub is_out: bool,
}

impl RopList {
    /// Whether this entry disables the given override name.
    pub fn disables(&self, rop_name: &str) -> bool {
        self.list.iter().any(|s| s == rop_name) == self.is_out
    }
}

/// Consult the store, bounded by [`ROP_TIMEOUT`], absorbing every error
/// as "override absent".
pub async fn override_disables(store: &dyn RopStore, client: &RopClient, rop_name: &str) -> bool {
    match tokio::time::timeout(ROP_TIMEOUT, store.fetch(&client.key, &client.value)).await {
        Ok(Ok(Some(octets))) => match serde_json::from_slice::<RopList>(&octets) {
            Ok(entry) => entry.disables(rop_name),
            Err(error) => {
                tracing::warn!(key = %client.key, value = %client.value, %error, "undecodable override entry");
                false
            }
        },
        Ok(Ok(None)) => false,
        Ok(Err(error)) => {
            tracing::warn!(key = %client.key, value = %client.value, %error, "override lookup failed");
            false
        }
        Err(_) => {
            tracing::warn!(key = %client.key, value = %client.value, "override lookup timed out");
            false
        }
    }
}

/// A pooled TCP client for the override store's wire protocol
/// (RESP-framed `HGET key field`).
///
/// Idle connections are reused; a connection is only returned to the pool
/// after a complete, successful exchange.  If a lookup errors out, or is
/// cancelled by the timeout mid-reply, its connection is dropped and
/// closed, so no half-read reply can leak into a later lookup.
#[derive(Debug)]
pub struct TcpRopStore {
    address: String,
    idle: Mutex<Vec<TcpStream>>,
}

impl TcpRopStore {
    pub fn new(address: String) -> Self {
        Self {
            address,
            idle: Mutex::new(Vec::new()),
        }
    }

    fn checkout(&self) -> Option<TcpStream> {
        self.idle.lock().expect("rop pool mutex poisoned").pop()
    }

    fn checkin(&self, conn: TcpStream) {
        let mut idle = self.idle.lock().expect("rop pool mutex poisoned");
        if idle.len() < MAX_IDLE_CONNS {
            idle.push(conn);
        }
    }
}

#[async_trait::async_trait]
impl RopStore for TcpRopStore {
    async fn fetch(&self, key: &str, field: &str) -> io::Result<Option<Vec<u8>>> {
        let mut conn = match self.checkout() {
            Some(conn) => conn,
            None => TcpStream::connect(&self.address).await?,
        };

        let result = hget(&mut conn, key, field).await;
        if result.is_ok() {
            self.checkin(conn);
        }
        result
    }
}

/// One `HGET` exchange on an open connection.
async fn hget(conn: &mut TcpStream, key: &str, field: &str) -> io::Result<Option<Vec<u8>>> {
    let mut request = Vec::with_capacity(32 + key.len() + field.len());
    request.extend_from_slice(b"*3\r\n$4\r\nHGET\r\n");
    for arg in [key, field] {
        request.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        request.extend_from_slice(arg.as_bytes());
        request.extend_from_slice(b"\r\n");
    }
    conn.write_all(&request).await?;

    let mut line = read_line(conn).await?;
    if line.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "empty reply line"));
    }
    let kind = line.remove(0);
    match kind {
        b'$' => {
            let len: i64 = std::str::from_utf8(&line)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad bulk length"))?;
            if len < 0 {
                return Ok(None);
            }
            let mut payload = vec![0u8; len as usize + 2];
            conn.read_exact(&mut payload).await?;
            payload.truncate(len as usize);
            Ok(Some(payload))
        }
        b'-' => Err(io::Error::new(
            io::ErrorKind::Other,
            String::from_utf8_lossy(&line).into_owned(),
        )),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected reply type '{}'", other as char),
        )),
    }
}

async fn read_line(conn: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut line = Vec::with_capacity(16);
    loop {
        let octet = conn.read_u8().await?;
        if octet == b'\r' {
            let lf = conn.read_u8().await?;
            if lf != b'\n' {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "bare CR in reply"));
            }
            return Ok(line);
        }
        if line.len() > 64 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "reply line too long"));
        }
        line.push(octet);
    }
}

/// An in-memory store: the override table as a plain map.  Used by tests
/// and by local setups with no external store.
#[derive(Debug, Default)]
pub struct MemoryRopStore {
    entries: HashMap<(String, String), Vec<u8>>,
}

impl MemoryRopStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, field: &str, entry: &RopList) {
        self.entries.insert(
            (key.to_string(), field.to_string()),
            serde_json::to_vec(entry).expect("RopList serialises"),
        );
    }
}

#[async_trait::async_trait]
impl RopStore for MemoryRopStore {
    async fn fetch(&self, key: &str, field: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&(key.to_string(), field.to_string()))
            .cloned())
    }
}
