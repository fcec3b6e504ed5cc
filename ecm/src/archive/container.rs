//! The "tar-like container" named by the archive format: a flat sequence of
//! length-prefixed, tagged sections. No general-purpose tar implementation is
//! part of the dependency stack, and the container only ever holds a fixed
//! set of named sections, so a minimal framing is enough.

use std::collections::HashMap;
use std::io::Write;

use crate::error::{EcmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Schema,
    Chunks,
    Edges,
    Clusters,
    Vectors,
}

impl Section {
    fn tag(self) -> u8 {
        match self {
            Section::Schema => 1,
            Section::Chunks => 2,
            Section::Edges => 3,
            Section::Clusters => 4,
            Section::Vectors => 5,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Section::Schema),
            2 => Ok(Section::Chunks),
            3 => Ok(Section::Edges),
            4 => Ok(Section::Clusters),
            5 => Ok(Section::Vectors),
            other => Err(EcmError::Archive(format!("unknown archive section tag {other}"))),
        }
    }
}

/// Appends one `tag:u8 | len:u64 LE | body` record to `out`.
pub fn write_section(out: &mut Vec<u8>, section: Section, body: &[u8]) -> Result<()> {
    out.write_all(&[section.tag()]).expect("writing to Vec never fails");
    out.write_all(&(body.len() as u64).to_le_bytes()).expect("writing to Vec never fails");
    out.write_all(body).expect("writing to Vec never fails");
    Ok(())
}

/// Parses a container produced by [`write_section`] back into one body per
/// section tag.
pub fn read_all_sections(bytes: &[u8]) -> Result<HashMap<Section, Vec<u8>>> {
    let mut out = HashMap::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        if cursor + 9 > bytes.len() {
            return Err(EcmError::Archive("truncated archive section header".into()));
        }
        let section = Section::from_tag(bytes[cursor])?;
        let len = u64::from_le_bytes(bytes[cursor + 1..cursor + 9].try_into().unwrap()) as usize;
        cursor += 9;
        if cursor + len > bytes.len() {
            return Err(EcmError::Archive("truncated archive section body".into()));
        }
        out.insert(section, bytes[cursor..cursor + len].to_vec());
        cursor += len;
    }
    Ok(out)
}
