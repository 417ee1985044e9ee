//! Fetch engine: walk the remote object graph, download, verify, insert.

use anyhow::{Context, Result};
use gix_object::Kind;
use std::collections::HashSet;
use std::io::Write;

use crate::git::Plumbing;
use crate::ipfs::IpfsApi;
use crate::objects::{self, kind_name, object_path, GitObject, ObjectId, EMPTY_TREE_OID};
use crate::remote::Remote;

/// Tree entry mode of a submodule (gitlink). Its target commit lives in
/// another repository and must not be downloaded.
const GITLINK_MODE: &str = "160000";

/// One `fetch <oid> <refname>` request line.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub oid: ObjectId,
    pub refname: String,
}

pub fn parse_request(line: &str) -> Result<FetchRequest> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("fetch"), Some(oid), Some(refname)) => Ok(FetchRequest {
            oid: oid.to_string(),
            refname: refname.to_string(),
        }),
        _ => anyhow::bail!("malformed fetch command: {}", line),
    }
}

/// Handle a fetch batch: download each requested object and everything it
/// transitively references, then emit the blank-line terminator.
pub fn handle<A: IpfsApi, G: Plumbing, W: Write>(
    remote: &Remote<A, G>,
    output: &mut W,
    requests: &[FetchRequest],
) -> Result<()> {
    let mut queue: Vec<ObjectId> = requests.iter().map(|r| r.oid.clone()).collect();
    let mut visited: HashSet<ObjectId> = HashSet::new();

    while let Some(oid) = queue.pop() {
        if !visited.insert(oid.clone()) {
            continue;
        }
        fetch_object(remote, &oid)?;
        enqueue_children(&remote.git, &oid, &mut queue)?;
    }

    tracing::info!("fetched {} objects", visited.len());

    // Empty line signals completion
    writeln!(output)?;

    Ok(())
}

/// Make one object present in the local store, downloading it if needed.
fn fetch_object<A: IpfsApi, G: Plumbing>(remote: &Remote<A, G>, oid: &str) -> Result<()> {
    if oid == EMPTY_TREE_OID && !remote.git.object_exists(oid)? {
        // The empty tree is never stored on the remote; materialize it.
        remote.git.hash_object(Kind::Tree, b"")?;
        return Ok(());
    }

    if remote.git.object_exists(oid)? {
        tracing::debug!("{} already present locally", oid);
        return Ok(());
    }

    let path = format!("{}/{}", remote.ipfs_path, object_path(oid));
    let compressed = remote
        .api
        .cat(&path)
        .with_context(|| format!("Failed to download object {}", oid))?;

    let canonical = objects::decompress(&compressed)
        .with_context(|| format!("Failed to decompress object {}", oid))?;
    let object = GitObject::from_canonical(&canonical)
        .with_context(|| format!("Failed to parse object {}", oid))?;

    let written = remote.git.hash_object(object.kind, &object.data)?;
    if written != oid {
        anyhow::bail!(
            "hash mismatch for downloaded object: expected {}, stored {}",
            oid,
            written
        );
    }

    tracing::debug!("fetched {} {}", kind_name(object.kind), oid);
    Ok(())
}

/// Queue every object `oid` references. The object is read back from the
/// local store, which it reached either just now or on an earlier fetch.
fn enqueue_children<G: Plumbing>(git: &G, oid: &str, queue: &mut Vec<ObjectId>) -> Result<()> {
    let object = git.read_object(oid)?;
    match object.kind {
        Kind::Blob => {}
        Kind::Tag => {
            let text = std::str::from_utf8(&object.data)
                .with_context(|| format!("tag {} is not valid UTF-8", oid))?;
            for line in text.lines() {
                if line.is_empty() {
                    break;
                }
                if let Some(target) = line.strip_prefix("object ") {
                    queue.push(target.trim().to_string());
                    break;
                }
            }
        }
        Kind::Commit => {
            let text = std::str::from_utf8(&object.data)
                .with_context(|| format!("commit {} is not valid UTF-8", oid))?;
            let mut lines = text.lines();
            let tree = lines
                .next()
                .and_then(|line| line.strip_prefix("tree "))
                .with_context(|| format!("commit {} has no tree header", oid))?;
            queue.push(tree.trim().to_string());
            for line in lines {
                match line.strip_prefix("parent ") {
                    Some(parent) => queue.push(parent.trim().to_string()),
                    None => break,
                }
            }
        }
        Kind::Tree => {
            for (mode, child) in tree_entries(&object.data)
                .with_context(|| format!("malformed tree {}", oid))?
            {
                if mode == GITLINK_MODE {
                    tracing::debug!("skipping submodule entry {}", child);
                    continue;
                }
                queue.push(child);
            }
        }
    }
    Ok(())
}

/// Parse raw tree content: a sequence of "<mode> <name>\0<20-byte oid>".
fn tree_entries(data: &[u8]) -> Result<Vec<(String, ObjectId)>> {
    let mut entries = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .context("tree entry missing mode terminator")?;
        let mode = std::str::from_utf8(&rest[..space])
            .context("tree entry mode is not valid UTF-8")?
            .to_string();

        let nul = rest[space..]
            .iter()
            .position(|&b| b == 0)
            .context("tree entry missing name terminator")?
            + space;
        anyhow::ensure!(rest.len() >= nul + 21, "tree entry truncated");

        entries.push((mode, hex::encode(&rest[nul + 1..nul + 21])));
        rest = &rest[nul + 21..];
    }

    Ok(entries)
}
