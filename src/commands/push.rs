//! Push engine: stage the reachable closure of each pushed ref, upload the
//! whole snapshot as one wrapped directory, then update the remote pointer.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::io::Write;

use crate::git::Plumbing;
use crate::ipfs::IpfsApi;
use crate::objects::{object_path, ObjectId};
use crate::remote::Remote;

/// One `push [+]<src>:<dst>` request line.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub src: String,
    pub dst: String,
    pub force: bool,
}

pub fn parse_request(line: &str) -> Result<PushRequest> {
    let spec = line
        .strip_prefix("push ")
        .with_context(|| format!("malformed push command: {}", line))?;
    let (src, dst) = spec
        .split_once(':')
        .with_context(|| format!("malformed refspec: {}", spec))?;
    let (force, src) = match src.strip_prefix('+') {
        Some(stripped) => (true, stripped),
        None => (false, src),
    };
    Ok(PushRequest {
        src: src.to_string(),
        dst: dst.to_string(),
        force,
    })
}

/// Why a single ref was turned away while the batch kept going.
enum StageError {
    Rejected(&'static str),
    Fatal(anyhow::Error),
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        StageError::Fatal(err)
    }
}

/// Handle a push batch. Each ref is acked with `ok <dst>` or
/// `error <dst> <reason>`; one `add` upload covers the whole batch.
pub fn handle<A: IpfsApi, G: Plumbing, W: Write>(
    remote: &mut Remote<A, G>,
    output: &mut W,
    requests: &[PushRequest],
) -> Result<()> {
    remote.references()?;
    let head_target = remote.head_target()?;

    // path inside the snapshot -> file content
    let mut manifest: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    // refs updated by this batch, in batch order
    let mut pushed: Vec<(String, ObjectId)> = Vec::new();
    let mut deletions: Vec<String> = Vec::new();

    for request in requests {
        if request.src.is_empty() {
            if head_target.as_deref() == Some(request.dst.as_str()) {
                writeln!(
                    output,
                    "error {} refused to delete current branch",
                    request.dst
                )?;
            } else {
                tracing::info!("deleting {} from the next snapshot", request.dst);
                deletions.push(request.dst.clone());
                writeln!(output, "ok {}", request.dst)?;
            }
            continue;
        }

        match stage_ref(remote, &mut manifest, request) {
            Ok(oid) => {
                pushed.push((request.dst.clone(), oid));
                writeln!(output, "ok {}", request.dst)?;
            }
            Err(StageError::Rejected(reason)) => {
                writeln!(output, "error {} {}", request.dst, reason)?;
            }
            Err(StageError::Fatal(err)) => return Err(err),
        }
    }

    if pushed.is_empty() && deletions.is_empty() {
        // every ref was rejected; nothing to upload
        writeln!(output)?;
        return Ok(());
    }

    let head = snapshot_head(remote, &pushed, head_target.as_deref())?;

    // Dumb-protocol scaffolding: regenerate and copy the info files verbatim
    remote.git.update_server_info()?;
    let git_dir = remote.git.git_dir();
    let info_refs =
        std::fs::read(git_dir.join("info").join("refs")).context("Failed to read info/refs")?;
    let packs = std::fs::read(git_dir.join("objects").join("info").join("packs"))
        .context("Failed to read objects/info/packs")?;
    manifest.insert("info/refs".to_string(), info_refs);
    manifest.insert("objects/info/packs".to_string(), packs);

    for (dst, oid) in &pushed {
        manifest.insert(dst.clone(), format!("{}\n", oid).into_bytes());
    }
    manifest.insert("HEAD".to_string(), head);

    let files: Vec<(String, Vec<u8>)> = manifest.into_iter().collect();
    tracing::info!("uploading {} files", files.len());
    let entries = remote
        .api
        .add(&files)
        .context("Failed to upload the new snapshot")?;
    let cid = entries
        .last()
        .map(|entry| entry.hash.clone())
        .ok_or_else(|| anyhow!("add returned no entries"))?;
    tracing::info!("new repository snapshot: {}", cid);

    if remote.mutable_name {
        finalize_mutable(remote, &cid)?;
    } else {
        finalize_immutable(remote, &cid)?;
    }

    // Empty line signals completion
    writeln!(output)?;

    Ok(())
}

/// Stage one ref: fast-forward safety, then the compressed object closure.
/// Returns the oid the ref will point at.
fn stage_ref<A: IpfsApi, G: Plumbing>(
    remote: &Remote<A, G>,
    manifest: &mut BTreeMap<String, Vec<u8>>,
    request: &PushRequest,
) -> std::result::Result<ObjectId, StageError> {
    let git = &remote.git;
    let src_oid = git
        .resolve(&request.src)?
        .ok_or_else(|| StageError::Fatal(anyhow!("unknown local ref {}", request.src)))?;

    if !request.force && !remote.empty {
        if let Some(prior) = remote.refs().get(&request.dst) {
            if *prior != src_oid {
                if !git.object_exists(prior)? {
                    return Err(StageError::Rejected("fetch first"));
                }
                if !git.is_ancestor(prior, &src_oid)? {
                    return Err(StageError::Rejected("non-fast forward"));
                }
            }
        }
    }

    let mut count = 0usize;
    let mut total_bytes = 0u64;
    for oid in git.rev_list(&request.src)? {
        let path = object_path(&oid);
        if manifest.contains_key(&path) {
            continue;
        }
        let object = git.read_object(&oid)?;
        total_bytes += git.object_size(&oid)?;
        let compressed = object.compress()?;
        tracing::debug!("staged {} ({} bytes compressed)", path, compressed.len());
        manifest.insert(path, compressed);
        count += 1;
    }
    tracing::info!(
        "pushing {}: {} objects, {} bytes",
        request.dst,
        count,
        total_bytes
    );

    Ok(src_oid)
}

/// Compute the HEAD file of the new snapshot. A populated remote keeps its
/// current symbolic target; an empty one is bootstrapped from the batch.
fn snapshot_head<A: IpfsApi, G: Plumbing>(
    remote: &Remote<A, G>,
    pushed: &[(String, ObjectId)],
    head_target: Option<&str>,
) -> Result<Vec<u8>> {
    if !remote.empty {
        if let Some(target) = head_target {
            return Ok(format!("ref: {}\n", target).into_bytes());
        }
    }

    // prefer the ref matching the local HEAD as the new default branch
    if let Some(local_head) = remote.git.resolve("HEAD")? {
        if let Some((name, _)) = pushed.iter().find(|(_, oid)| *oid == local_head) {
            return Ok(format!("ref: {}\n", name).into_bytes());
        }
    }
    if let Some((name, _)) = pushed.first() {
        return Ok(format!("ref: {}\n", name).into_bytes());
    }
    match pushed.last() {
        Some((_, oid)) => Ok(format!("{}\n", oid).into_bytes()),
        None => anyhow::bail!("cannot determine a HEAD for the new snapshot"),
    }
}

/// After uploading to a mutable name: optionally unpin the old snapshot and
/// republish the name. Publish failures are not fatal; the new CID is the
/// user's recovery handle.
fn finalize_mutable<A: IpfsApi, G: Plumbing>(remote: &Remote<A, G>, cid: &str) -> Result<()> {
    let key = remote
        .ipfs_path
        .rsplit('/')
        .next()
        .unwrap_or(remote.ipfs_path.as_str())
        .to_string();

    let previous = match remote.api.name_resolve(&key) {
        Ok(resolved) => {
            tracing::info!("previous snapshot was {}", resolved.path);
            Some(resolved.path)
        }
        Err(err) => {
            tracing::debug!("could not resolve the previous snapshot: {}", err);
            None
        }
    };

    if remote.config.unpin_old {
        if let Some(previous) = &previous {
            match remote.api.pin_rm(previous) {
                Ok(removed) => tracing::info!("unpinned {}", removed.pins.join(", ")),
                Err(err) => tracing::warn!("failed to unpin {}: {}", previous, err),
            }
        }
    }

    if remote.config.republish_ipns {
        match remote
            .api
            .name_publish(cid, &key, &remote.config.ipns_ttl)
        {
            Ok(published) => tracing::info!("published {} -> {}", published.name, cid),
            Err(err) => {
                tracing::warn!("failed to publish {}: {}", key, err);
                tracing::warn!("the snapshot was uploaded as {}; update the name manually", cid);
            }
        }
    } else {
        tracing::info!("republishing disabled; point {} at {} to share this push", key, cid);
    }

    Ok(())
}

/// After uploading an immutable remote the stored URL must follow the new
/// CID, otherwise the next fetch would read the stale snapshot.
fn finalize_immutable<A: IpfsApi, G: Plumbing>(remote: &Remote<A, G>, cid: &str) -> Result<()> {
    let url = format!("ipfs://{}", cid);
    tracing::info!("rewriting remote {} to {}", remote.name, url);
    remote
        .git
        .set_remote_url(&remote.name, &url)
        .with_context(|| format!("Failed to update the remote URL; the new snapshot is {}", cid))?;
    Ok(())
}
