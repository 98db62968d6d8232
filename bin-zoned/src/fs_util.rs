//! Zone directory loading.  A zone file is named after its origin:
//! `test.example.com.json` defines the zone rooted at
//! `test.example.com.`.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{read_dir, read_to_string};

use zoned_types::protocol::types::DomainName;
use zoned_types::zones::deserialise;
use zoned_types::zones::types::Zone;

/// Why a zone file could not be turned into a zone.
#[derive(Debug)]
pub enum ZoneFileError {
    /// The file name does not parse as a domain name.
    BadOrigin,
    Parse(deserialise::Error),
}

impl std::fmt::Display for ZoneFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ZoneFileError::BadOrigin => write!(f, "file name is not a domain name"),
            ZoneFileError::Parse(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ZoneFileError {}

/// Read a zone file.  The origin comes from the file stem.
pub async fn zone_from_file<P: AsRef<Path>>(
    path: P,
) -> io::Result<Result<Zone, ZoneFileError>> {
    let origin = match origin_of(path.as_ref()) {
        Some(origin) => origin,
        None => return Ok(Err(ZoneFileError::BadOrigin)),
    };

    let data = read_to_string(path).await?;
    Ok(Zone::deserialise(&origin, &data).map_err(ZoneFileError::Parse))
}

fn origin_of(path: &Path) -> Option<DomainName> {
    let stem = path.file_stem()?.to_str()?;
    DomainName::from_dotted_string(&format!("{}.", stem.trim_end_matches('.')))
}

/// Get the zone files from a directory, sorted.
pub async fn get_files_from_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();

    let mut reader = read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let path = entry.path();
        if !path.is_dir() && path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }

    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_comes_from_the_file_stem() {
        assert_eq!(
            DomainName::from_dotted_string("test.example.com."),
            origin_of(Path::new("/zones/test.example.com.json"))
        );
        let oversized = format!("/zones/{}.json", "x".repeat(64));
        assert_eq!(None, origin_of(Path::new(&oversized)));
    }
}
