//! Client for the IPFS daemon HTTP API.

mod client;

pub use client::IpfsClient;

use serde::Deserialize;

use crate::error::ApiError;

/// `ls` entry type for a subdirectory
pub const LINK_TYPE_DIR: u64 = 1;
/// `ls` entry type for a file
pub const LINK_TYPE_FILE: u64 = 2;

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct VersionInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Commit", default)]
    pub commit: String,
}

/// One entry of a directory listing
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct LsLink {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "Type")]
    pub kind: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct LsObject {
    #[serde(rename = "Hash", default)]
    pub hash: String,
    #[serde(rename = "Links", default)]
    pub links: Vec<LsLink>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LsResponse {
    #[serde(rename = "Objects", default)]
    pub objects: Vec<LsObject>,
}

impl LsResponse {
    /// Flatten the listing into its entries
    pub fn links(self) -> Vec<LsLink> {
        self.objects.into_iter().flat_map(|o| o.links).collect()
    }
}

/// One line of the newline-delimited `add` response. When uploading a
/// wrapped directory the wrapper itself is the last entry, with an empty
/// name.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct AddedEntry {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Hash")]
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedPath {
    #[serde(rename = "Path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct PublishedName {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemovedPins {
    #[serde(rename = "Pins", default)]
    pub pins: Vec<String>,
}

/// One method per daemon endpoint the helper uses. The transfer engines are
/// generic over this trait so tests can serve canned responses.
pub trait IpfsApi {
    fn version(&self) -> Result<VersionInfo, ApiError>;

    fn ls(&self, path: &str) -> Result<LsResponse, ApiError>;

    fn cat(&self, path: &str) -> Result<Vec<u8>, ApiError>;

    /// Upload named byte streams wrapped in a single directory, pinned,
    /// with raw leaves. One response entry per file plus the wrapper.
    fn add(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<AddedEntry>, ApiError>;

    fn name_resolve(&self, name: &str) -> Result<ResolvedPath, ApiError>;

    fn name_publish(&self, cid: &str, key: &str, lifetime: &str)
        -> Result<PublishedName, ApiError>;

    fn pin_rm(&self, path: &str) -> Result<RemovedPins, ApiError>;
}

/// Percent-encode a path, keeping the separators.
pub(crate) fn quote_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
