//! Loose git object handling

use anyhow::{Context, Result};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use gix_object::Kind;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

/// Git object SHA-1 identifier (40 hex characters)
pub type ObjectId = String;

/// Object id of the empty tree. Every repository can refer to it without
/// ever storing it on disk.
pub const EMPTY_TREE_OID: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Canonical name of an object kind as it appears in headers and plumbing.
pub fn kind_name(kind: Kind) -> &'static str {
    match kind {
        Kind::Commit => "commit",
        Kind::Tree => "tree",
        Kind::Blob => "blob",
        Kind::Tag => "tag",
    }
}

pub fn parse_kind(name: &str) -> Result<Kind> {
    match name {
        "commit" => Ok(Kind::Commit),
        "tree" => Ok(Kind::Tree),
        "blob" => Ok(Kind::Blob),
        "tag" => Ok(Kind::Tag),
        _ => anyhow::bail!("Unknown object type: {}", name),
    }
}

/// Relative path of a loose object inside an objects/ directory
pub fn object_path(oid: &str) -> String {
    let (dir, file) = oid.split_at(2);
    format!("objects/{}/{}", dir, file)
}

/// Represents a Git object with its content
#[derive(Debug, Clone)]
pub struct GitObject {
    pub id: ObjectId,
    pub kind: Kind,
    pub data: Vec<u8>,
}

impl GitObject {
    /// Create a GitObject from raw object data (without header)
    pub fn from_raw(kind: Kind, data: Vec<u8>) -> Self {
        let id = compute_object_id(kind, &data);
        Self { id, kind, data }
    }

    /// Parse the canonical form (with header: "type size\0data")
    pub fn from_canonical(content: &[u8]) -> Result<Self> {
        let null_pos = content
            .iter()
            .position(|&b| b == 0)
            .context("No null terminator in object header")?;

        let header = std::str::from_utf8(&content[..null_pos])
            .context("Invalid UTF-8 in object header")?;

        let parts: Vec<&str> = header.split_whitespace().collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid object header format: {}", header);
        }

        let kind = parse_kind(parts[0])?;
        let size: usize = parts[1]
            .parse()
            .with_context(|| format!("Invalid size in object header: {}", header))?;

        let data = content[null_pos + 1..].to_vec();
        if data.len() != size {
            anyhow::bail!(
                "Object header declares {} bytes but payload has {}",
                size,
                data.len()
            );
        }

        Ok(Self::from_raw(kind, data))
    }

    /// Serialize to canonical form (with header)
    pub fn to_canonical(&self) -> Vec<u8> {
        let header = format!("{} {}\0", kind_name(self.kind), self.data.len());
        let mut result = header.into_bytes();
        result.extend_from_slice(&self.data);
        result
    }

    /// Zlib-compress the canonical form, the on-the-wire shape of a loose
    /// object.
    pub fn compress(&self) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&self.to_canonical())
            .context("Failed to compress object")?;
        encoder.finish().context("Failed to finish compression")
    }

}

/// Inflate a compressed loose object back to its canonical form
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut content = Vec::new();
    decoder
        .read_to_end(&mut content)
        .context("Failed to decompress object")?;
    Ok(content)
}

/// Compute Git SHA-1 object ID from object type and data
pub fn compute_object_id(kind: Kind, data: &[u8]) -> ObjectId {
    let header = format!("{} {}\0", kind_name(kind), data.len());
    let mut hasher = Sha1::new();
    hasher.update(header.as_bytes());
    hasher.update(data);
    hex::encode(hasher.finalize())
}
