//! In-memory doubles for the two trait seams, shared by the unit tests.

use anyhow::{anyhow, Result};
use gix_object::Kind;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tempfile::TempDir;

use crate::config::RemoteConfig;
use crate::error::ApiError;
use crate::git::Plumbing;
use crate::ipfs::{
    AddedEntry, IpfsApi, LsLink, LsObject, LsResponse, PublishedName, RemovedPins, ResolvedPath,
    VersionInfo, LINK_TYPE_DIR, LINK_TYPE_FILE,
};
use crate::objects::{compute_object_id, GitObject, ObjectId};
use crate::remote::Remote;

/// Wrapper directory hash every mock upload reports.
pub const WRAPPER_CID: &str = "QmNewSnapshotWrapper";

fn not_found(path: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        message: format!("{}: file does not exist", path),
    }
}

/// Canned daemon: serves `ls`/`cat` from maps and records every write.
#[derive(Default)]
pub struct MockApi {
    ls: RefCell<HashMap<String, LsResponse>>,
    cat: RefCell<HashMap<String, Vec<u8>>>,
    cat_log: RefCell<Vec<String>>,
    adds: RefCell<Vec<Vec<(String, Vec<u8>)>>>,
    resolved: RefCell<Option<String>>,
    published: RefCell<Vec<(String, String, String)>>,
    unpinned: RefCell<Vec<String>>,
}

impl MockApi {
    pub fn serve_ls(&self, path: &str, response: LsResponse) {
        self.ls.borrow_mut().insert(path.to_string(), response);
    }

    pub fn serve_cat(&self, path: &str, content: Vec<u8>) {
        self.cat.borrow_mut().insert(path.to_string(), content);
    }

    pub fn set_resolved(&self, path: &str) {
        *self.resolved.borrow_mut() = Some(path.to_string());
    }

    /// Every path `cat` was asked for, hits and misses alike.
    pub fn cat_requests(&self) -> Vec<String> {
        self.cat_log.borrow().clone()
    }

    /// Every `add` upload, file manifests in call order.
    pub fn add_calls(&self) -> Vec<Vec<(String, Vec<u8>)>> {
        self.adds.borrow().clone()
    }

    pub fn published(&self) -> Vec<(String, String, String)> {
        self.published.borrow().clone()
    }

    pub fn unpinned(&self) -> Vec<String> {
        self.unpinned.borrow().clone()
    }
}

impl IpfsApi for MockApi {
    fn version(&self) -> Result<VersionInfo, ApiError> {
        Ok(VersionInfo {
            version: "0.0.0-mock".to_string(),
            commit: String::new(),
        })
    }

    fn ls(&self, path: &str) -> Result<LsResponse, ApiError> {
        self.ls
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn cat(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        self.cat_log.borrow_mut().push(path.to_string());
        self.cat
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn add(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<AddedEntry>, ApiError> {
        self.adds.borrow_mut().push(files.to_vec());
        let mut entries: Vec<AddedEntry> = files
            .iter()
            .enumerate()
            .map(|(index, (name, _))| AddedEntry {
                name: name.clone(),
                hash: format!("QmFile{}", index),
            })
            .collect();
        entries.push(AddedEntry {
            name: String::new(),
            hash: WRAPPER_CID.to_string(),
        });
        Ok(entries)
    }

    fn name_resolve(&self, name: &str) -> Result<ResolvedPath, ApiError> {
        self.resolved
            .borrow()
            .clone()
            .map(|path| ResolvedPath { path })
            .ok_or_else(|| not_found(name))
    }

    fn name_publish(
        &self,
        cid: &str,
        key: &str,
        lifetime: &str,
    ) -> Result<PublishedName, ApiError> {
        self.published
            .borrow_mut()
            .push((cid.to_string(), key.to_string(), lifetime.to_string()));
        Ok(PublishedName {
            name: key.to_string(),
            value: format!("/ipfs/{}", cid),
        })
    }

    fn pin_rm(&self, path: &str) -> Result<RemovedPins, ApiError> {
        self.unpinned.borrow_mut().push(path.to_string());
        Ok(RemovedPins {
            pins: vec![path.to_string()],
        })
    }
}

/// In-memory repository standing in for the git plumbing.
pub struct MockPlumbing {
    dir: TempDir,
    objects: RefCell<HashMap<ObjectId, (Kind, Vec<u8>)>>,
    refs: RefCell<HashMap<String, ObjectId>>,
    rev_lists: RefCell<HashMap<String, Vec<ObjectId>>>,
    ancestors: RefCell<HashSet<(ObjectId, ObjectId)>>,
    remote_urls: RefCell<Vec<(String, String)>>,
}

impl MockPlumbing {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp git dir"),
            objects: RefCell::new(HashMap::new()),
            refs: RefCell::new(HashMap::new()),
            rev_lists: RefCell::new(HashMap::new()),
            ancestors: RefCell::new(HashSet::new()),
            remote_urls: RefCell::new(Vec::new()),
        }
    }

    /// Insert an object with its real identity and return the oid.
    pub fn add_object(&self, kind: Kind, data: &[u8]) -> ObjectId {
        let id = compute_object_id(kind, data);
        self.objects
            .borrow_mut()
            .insert(id.clone(), (kind, data.to_vec()));
        id
    }

    pub fn set_ref(&self, name: &str, oid: &str) {
        self.refs
            .borrow_mut()
            .insert(name.to_string(), oid.to_string());
    }

    pub fn set_rev_list(&self, rev: &str, oids: &[ObjectId]) {
        self.rev_lists
            .borrow_mut()
            .insert(rev.to_string(), oids.to_vec());
    }

    pub fn set_ancestor(&self, ancestor: &str, descendant: &str) {
        self.ancestors
            .borrow_mut()
            .insert((ancestor.to_string(), descendant.to_string()));
    }

    pub fn remote_urls(&self) -> Vec<(String, String)> {
        self.remote_urls.borrow().clone()
    }
}

impl Plumbing for MockPlumbing {
    fn git_dir(&self) -> &Path {
        self.dir.path()
    }

    fn rev_list(&self, rev: &str) -> Result<Vec<ObjectId>> {
        self.rev_lists
            .borrow()
            .get(rev)
            .cloned()
            .ok_or_else(|| anyhow!("no rev-list for {}", rev))
    }

    fn object_kind(&self, oid: &str) -> Result<Kind> {
        self.objects
            .borrow()
            .get(oid)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| anyhow!("unknown object {}", oid))
    }

    fn object_size(&self, oid: &str) -> Result<u64> {
        self.objects
            .borrow()
            .get(oid)
            .map(|(_, data)| data.len() as u64)
            .ok_or_else(|| anyhow!("unknown object {}", oid))
    }

    fn read_object(&self, oid: &str) -> Result<GitObject> {
        self.objects
            .borrow()
            .get(oid)
            .map(|(kind, data)| GitObject {
                id: oid.to_string(),
                kind: *kind,
                data: data.clone(),
            })
            .ok_or_else(|| anyhow!("unknown object {}", oid))
    }

    fn hash_object(&self, kind: Kind, data: &[u8]) -> Result<ObjectId> {
        Ok(self.add_object(kind, data))
    }

    fn object_exists(&self, oid: &str) -> Result<bool> {
        Ok(self.objects.borrow().contains_key(oid))
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        Ok(self
            .ancestors
            .borrow()
            .contains(&(ancestor.to_string(), descendant.to_string())))
    }

    fn resolve(&self, rev: &str) -> Result<Option<ObjectId>> {
        Ok(self.refs.borrow().get(rev).cloned())
    }

    fn update_server_info(&self) -> Result<()> {
        let info = self.dir.path().join("info");
        std::fs::create_dir_all(&info)?;
        let mut listing = String::new();
        for (name, oid) in self.refs.borrow().iter() {
            if name.starts_with("refs/") {
                listing.push_str(&format!("{}\t{}\n", oid, name));
            }
        }
        std::fs::write(info.join("refs"), listing)?;

        let packs = self.dir.path().join("objects").join("info");
        std::fs::create_dir_all(&packs)?;
        std::fs::write(packs.join("packs"), "")?;
        Ok(())
    }

    fn set_remote_url(&self, remote: &str, url: &str) -> Result<()> {
        self.remote_urls
            .borrow_mut()
            .push((remote.to_string(), url.to_string()));
        Ok(())
    }
}

/// A remote named "origin" over the given doubles, before discovery.
pub fn remote_with(api: MockApi, git: MockPlumbing, id: &str) -> Remote<MockApi, MockPlumbing> {
    Remote::new("origin", id, RemoteConfig::default(), api, git)
}

/// Serve a refs/ directory tree and the ref files underneath it.
pub fn mock_refs(api: &MockApi, base: &str, refs: &[(&str, &str)]) {
    let mut dirs: BTreeMap<String, BTreeMap<String, LsLink>> = BTreeMap::new();

    for (name, oid) in refs {
        let segments: Vec<&str> = name.split('/').collect();
        for i in 1..segments.len() {
            let dir = segments[..i].join("/");
            let child = segments[i];
            let is_file = i == segments.len() - 1;
            dirs.entry(dir).or_default().insert(
                child.to_string(),
                LsLink {
                    name: child.to_string(),
                    hash: format!("Qm{}", child),
                    size: if is_file { 41 } else { 0 },
                    kind: if is_file { LINK_TYPE_FILE } else { LINK_TYPE_DIR },
                },
            );
        }
        api.serve_cat(
            &format!("{}/{}", base, name),
            format!("{}\n", oid).into_bytes(),
        );
    }

    for (dir, links) in dirs {
        api.serve_ls(
            &format!("{}/{}", base, dir),
            LsResponse {
                objects: vec![LsObject {
                    hash: format!("QmDir{}", dir.replace('/', "-")),
                    links: links.into_values().collect(),
                }],
            },
        );
    }
}

/// Serve a symbolic HEAD file on the mock remote.
pub fn mock_head(api: &MockApi, base: &str, target: &str) {
    let path = format!("{}/HEAD", base);
    api.serve_ls(&path, LsResponse::default());
    api.serve_cat(&path, format!("ref: {}\n", target).into_bytes());
}

/// Raw tree content from (mode, name, oid) entries.
pub fn tree_data(entries: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut data = Vec::new();
    for (mode, name, oid) in entries {
        data.extend_from_slice(mode.as_bytes());
        data.push(b' ');
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        data.extend_from_slice(&hex::decode(oid).expect("valid oid hex"));
    }
    data
}
