//! Per-invocation state of the remote repository: discovery and the
//! reference directory.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::config::RemoteConfig;
use crate::error::ApiError;
use crate::git::Plumbing;
use crate::ipfs::{IpfsApi, LINK_TYPE_DIR, LINK_TYPE_FILE};
use crate::objects::ObjectId;

/// Everything one helper invocation knows about its remote.
///
/// `ipfs_path` is the anchor used in all subsequent API calls: either
/// `/ipns/<id>` when the id resolved as a mutable name, or the raw id.
pub struct Remote<A, G> {
    pub name: String,
    pub config: RemoteConfig,
    pub api: A,
    pub git: G,

    id: String,
    pub ipfs_path: String,
    pub mutable_name: bool,
    pub accessible: bool,
    pub empty: bool,

    refs: BTreeMap<String, ObjectId>,
    refs_loaded: bool,
    head: Option<String>,
    head_loaded: bool,
}

impl<A: IpfsApi, G: Plumbing> Remote<A, G> {
    pub fn new(name: &str, id: &str, config: RemoteConfig, api: A, git: G) -> Self {
        Self {
            name: name.to_string(),
            config,
            api,
            git,
            id: id.to_string(),
            ipfs_path: id.to_string(),
            mutable_name: false,
            accessible: false,
            empty: false,
            refs: BTreeMap::new(),
            refs_loaded: false,
            head: None,
            head_loaded: false,
        }
    }

    /// Classify the remote id: mutable name, immutable CID, or unreachable.
    /// Probe failures fall through to the next probe; an unreachable remote
    /// is not fatal here because a first push will create it.
    pub fn discover(&mut self) {
        let ipns = format!("/ipns/{}", self.id);
        match self.api.ls(&ipns) {
            Ok(_) => {
                tracing::debug!("{} resolved as a mutable name", self.id);
                self.mutable_name = true;
                self.accessible = true;
                self.ipfs_path = ipns;
                return;
            }
            Err(err) if err.is_timeout() => {
                tracing::debug!("name resolution timed out for {}", self.id);
            }
            Err(err) => {
                tracing::debug!("{} is not a mutable name: {}", self.id, err);
            }
        }

        match self.api.ls(&self.id) {
            Ok(_) => {
                tracing::debug!("{} resolved as an immutable path", self.id);
                self.accessible = true;
            }
            Err(err) => {
                tracing::info!("remote {} is not reachable yet: {}", self.id, err);
                self.accessible = false;
            }
        }
    }

    /// Recursively list the reference files under `prefix/` on the remote.
    /// Result order is unspecified.
    pub fn reference_names(&self, prefix: &str) -> Result<Vec<String>, ApiError> {
        let mut names = Vec::new();
        let mut pending = vec![prefix.to_string()];

        while let Some(dir) = pending.pop() {
            let listing = self.api.ls(&format!("{}/{}", self.ipfs_path, dir))?;
            for link in listing.links() {
                let path = format!("{}/{}", dir, link.name);
                if link.kind == LINK_TYPE_DIR && link.size == 0 {
                    pending.push(path);
                } else if link.kind == LINK_TYPE_FILE {
                    names.push(path);
                } else {
                    tracing::info!("skipping unexpected entry {} (type {})", path, link.kind);
                }
            }
        }

        Ok(names)
    }

    /// The remote reference map, loaded once per invocation. A remote whose
    /// refs/ directory cannot be listed is treated as an empty repository.
    pub fn references(&mut self) -> Result<&BTreeMap<String, ObjectId>> {
        if self.refs_loaded {
            return Ok(&self.refs);
        }

        if !self.accessible {
            self.empty = true;
            self.refs_loaded = true;
            return Ok(&self.refs);
        }

        match self.reference_names("refs") {
            Ok(names) => {
                for name in names {
                    let value = self.read_reference(&name)?;
                    self.refs.insert(name, value);
                }
            }
            Err(err) => {
                tracing::debug!("no refs on the remote ({}); treating it as empty", err);
                self.empty = true;
            }
        }

        self.refs_loaded = true;
        Ok(&self.refs)
    }

    /// The loaded reference map. Call `references` first.
    pub fn refs(&self) -> &BTreeMap<String, ObjectId> {
        &self.refs
    }

    /// Read one reference file and return the oid it carries.
    fn read_reference(&self, name: &str) -> Result<ObjectId> {
        let bytes = self
            .api
            .cat(&format!("{}/{}", self.ipfs_path, name))
            .with_context(|| format!("Failed to read remote ref {}", name))?;
        let text = String::from_utf8(bytes)
            .with_context(|| format!("Remote ref {} is not valid UTF-8", name))?;
        text.split_whitespace()
            .next()
            .map(|oid| oid.to_string())
            .with_context(|| format!("Remote ref {} is empty", name))
    }

    /// Read a symbolic reference like HEAD. Returns the target ref name, or
    /// None when the file is absent or does not follow the `ref: ` format.
    pub fn read_symbolic_reference(&self, name: &str) -> Result<Option<String>> {
        let path = format!("{}/{}", self.ipfs_path, name);
        if self.api.ls(&path).is_err() {
            return Ok(None);
        }
        let bytes = self
            .api
            .cat(&path)
            .with_context(|| format!("Failed to read {}", name))?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text
            .strip_prefix("ref: ")
            .map(|target| target.trim_end().to_string()))
    }

    /// The ref the remote HEAD points at, read once per invocation.
    pub fn head_target(&mut self) -> Result<Option<String>> {
        if !self.head_loaded {
            self.head = if self.accessible {
                self.read_symbolic_reference("HEAD")?
            } else {
                None
            };
            self.head_loaded = true;
        }
        Ok(self.head.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mock_head, mock_refs, remote_with, MockApi, MockPlumbing};
    use crate::ipfs::{LsLink, LsObject, LsResponse};

    #[test]
    fn test_discovery_prefers_mutable_name() {
        let api = MockApi::default();
        api.serve_ls("/ipns/k51example", LsResponse::default());
        let mut remote = remote_with(api, MockPlumbing::new(), "k51example");

        remote.discover();

        assert!(remote.mutable_name);
        assert!(remote.accessible);
        assert_eq!(remote.ipfs_path, "/ipns/k51example");
    }

    #[test]
    fn test_discovery_falls_back_to_immutable() {
        let api = MockApi::default();
        api.serve_ls("QmExample", LsResponse::default());
        let mut remote = remote_with(api, MockPlumbing::new(), "QmExample");

        remote.discover();

        assert!(!remote.mutable_name);
        assert!(remote.accessible);
        assert_eq!(remote.ipfs_path, "QmExample");
    }

    #[test]
    fn test_discovery_marks_unreachable() {
        let mut remote = remote_with(MockApi::default(), MockPlumbing::new(), "QmMissing");

        remote.discover();

        assert!(!remote.accessible);
        assert_eq!(remote.ipfs_path, "QmMissing");
    }

    #[test]
    fn test_reference_names_recurses() {
        let api = MockApi::default();
        api.serve_ls("QmRepo", LsResponse::default());
        mock_refs(
            &api,
            "QmRepo",
            &[
                ("refs/heads/main", "1111111111111111111111111111111111111111"),
                ("refs/heads/topic/deep", "2222222222222222222222222222222222222222"),
                ("refs/tags/v1", "3333333333333333333333333333333333333333"),
            ],
        );
        let mut remote = remote_with(api, MockPlumbing::new(), "QmRepo");
        remote.discover();

        let mut names = remote.reference_names("refs").unwrap();
        names.sort();
        assert_eq!(
            names,
            vec![
                "refs/heads/main",
                "refs/heads/topic/deep",
                "refs/tags/v1"
            ]
        );

        let refs = remote.references().unwrap();
        assert_eq!(
            refs.get("refs/heads/topic/deep").map(String::as_str),
            Some("2222222222222222222222222222222222222222")
        );
        assert!(!remote.empty);
    }

    #[test]
    fn test_reference_names_skips_odd_entries() {
        let api = MockApi::default();
        api.serve_ls("QmRepo", LsResponse::default());
        api.serve_ls(
            "QmRepo/refs",
            LsResponse {
                objects: vec![LsObject {
                    hash: "QmDir".to_string(),
                    links: vec![LsLink {
                        name: "weird".to_string(),
                        hash: "QmW".to_string(),
                        size: 9,
                        kind: 7,
                    }],
                }],
            },
        );
        let mut remote = remote_with(api, MockPlumbing::new(), "QmRepo");
        remote.discover();

        assert!(remote.reference_names("refs").unwrap().is_empty());
    }

    #[test]
    fn test_missing_refs_means_empty() {
        let api = MockApi::default();
        api.serve_ls("QmRepo", LsResponse::default());
        let mut remote = remote_with(api, MockPlumbing::new(), "QmRepo");
        remote.discover();

        assert!(remote.references().unwrap().is_empty());
        assert!(remote.empty);
    }

    #[test]
    fn test_symbolic_head() {
        let api = MockApi::default();
        api.serve_ls("QmRepo", LsResponse::default());
        mock_head(&api, "QmRepo", "refs/heads/main");
        let mut remote = remote_with(api, MockPlumbing::new(), "QmRepo");
        remote.discover();

        assert_eq!(
            remote.head_target().unwrap().as_deref(),
            Some("refs/heads/main")
        );
    }

    #[test]
    fn test_detached_head_is_not_symbolic() {
        let api = MockApi::default();
        api.serve_ls("QmRepo", LsResponse::default());
        api.serve_ls("QmRepo/HEAD", LsResponse::default());
        api.serve_cat(
            "QmRepo/HEAD",
            b"1111111111111111111111111111111111111111\n".to_vec(),
        );
        let mut remote = remote_with(api, MockPlumbing::new(), "QmRepo");
        remote.discover();

        assert_eq!(remote.head_target().unwrap(), None);
    }
}
