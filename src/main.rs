use anyhow::{Context, Result};
use std::env;

mod commands;
mod config;
mod error;
mod git;
mod ipfs;
mod logging;
mod objects;
mod protocol;
mod remote;
#[cfg(test)]
mod testutil;

use config::RemoteConfig;
use git::{GitCli, Plumbing};
use ipfs::{IpfsApi, IpfsClient};
use remote::Remote;

fn main() -> Result<()> {
    logging::init();

    // Git passes three arguments:
    // 1. Binary path
    // 2. Remote name (e.g., "origin")
    // 3. Remote URL (e.g., "ipfs://QmHash" or "ipfs://k51...")
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        anyhow::bail!("Usage: git-remote-ipfs <remote-name> <remote-url>");
    }

    let remote_name = &args[1];
    let id = parse_remote_url(&args[2])?;

    let git = GitCli::discover()?;
    let config = RemoteConfig::load(git.git_dir())?;
    let api = IpfsClient::new(&config).context("Failed to build the IPFS API client")?;

    // A daemon we cannot reach is not worth limping past.
    let version = api
        .version()
        .context("Cannot reach the IPFS daemon; is it running?")?;
    tracing::info!("connected to IPFS daemon {}", version.version);

    let mut remote = Remote::new(remote_name, &id, config, api, git);
    remote.discover();

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    protocol::run(&mut remote, stdin.lock(), &mut stdout)
}

/// Split the configured URL on "://" and keep the id. Git hands the URL
/// through unchanged, scheme included.
fn parse_remote_url(url: &str) -> Result<String> {
    match url.split_once("://") {
        Some((_, id)) if !id.is_empty() => Ok(id.to_string()),
        _ => anyhow::bail!(
            "malformed remote URL {:?}; expected ipfs://<cid-or-ipns-name>",
            url
        ),
    }
}
