use anyhow::Result;
use std::io::Write;

use crate::git::Plumbing;
use crate::ipfs::IpfsApi;
use crate::remote::Remote;

/// Handle the list command
/// Output all remote refs with their oids, plus the symbolic HEAD pointer
/// when listing for fetch.
pub fn handle<A: IpfsApi, G: Plumbing, W: Write>(
    remote: &mut Remote<A, G>,
    output: &mut W,
    for_push: bool,
) -> Result<()> {
    remote.references()?;
    let head = if for_push { None } else { remote.head_target()? };

    for (refname, oid) in remote.refs() {
        writeln!(output, "{} {}", oid, refname)?;
    }

    if let Some(target) = head {
        writeln!(output, "@{} HEAD", target)?;
    }

    // Empty line signals completion
    writeln!(output)?;

    Ok(())
}
