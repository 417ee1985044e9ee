use anyhow::{anyhow, Context, Result};
use configparser::ini::Ini;
use std::path::Path;
use std::time::Duration;

/// Configuration for git-remote-ipfs, read from `<git-dir>/ipfs/config`.
///
/// The file is INI with a single `[IPFS]` section and case-sensitive keys.
/// Unknown keys are ignored.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// IPFS daemon base URL (e.g. http://127.0.0.1)
    pub url: String,

    /// Daemon API port
    pub port: u16,

    /// API path prefix (e.g. api/v0)
    pub version_prefix: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Unpin the previous snapshot after publishing a new one
    pub unpin_old: bool,

    /// Issue name/publish after pushing to a mutable name
    pub republish_ipns: bool,

    /// Publish lifetime handed to name/publish
    pub ipns_ttl: String,

    /// `cid-version` parameter to add
    pub cid_version: u32,

    /// `chunker` parameter to add
    pub chunker: String,

    /// HTTP basic auth, enabled only when both are set
    pub user_name: Option<String>,
    pub user_password: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1".to_string(),
            port: 5001,
            version_prefix: "api/v0".to_string(),
            timeout: Duration::from_secs_f64(30.0),
            unpin_old: false,
            republish_ipns: false,
            ipns_ttl: "2h".to_string(),
            cid_version: 0,
            chunker: "size-262144".to_string(),
            user_name: None,
            user_password: None,
        }
    }
}

const SECTION: &str = "IPFS";

impl RemoteConfig {
    /// Load the configuration for the enclosing repository.
    /// A missing file is fatal before any network I/O happens.
    pub fn load(git_dir: &Path) -> Result<Self> {
        let path = git_dir.join("ipfs").join("config");
        if !path.exists() {
            anyhow::bail!(
                "configuration file not found at {}\n\
                 Create it with an [IPFS] section pointing at your daemon, e.g.\n\
                 \n\
                 [IPFS]\n\
                 URL = http://127.0.0.1\n\
                 Port = 5001",
                path.display()
            );
        }
        Self::load_from_file(&path)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // Keys are case-sensitive, matching the file format exactly
        let mut ini = Ini::new_cs();
        ini.read(content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        let mut config = Self::default();

        if let Some(url) = ini.get(SECTION, "URL") {
            config.url = url;
        }
        if let Some(port) = ini
            .getuint(SECTION, "Port")
            .map_err(|e| anyhow!("Invalid Port in {:?}: {}", path, e))?
        {
            config.port = u16::try_from(port).context("Port out of range")?;
        }
        if let Some(prefix) = ini.get(SECTION, "VersionPrefix") {
            config.version_prefix = prefix;
        }
        if let Some(timeout) = ini
            .getfloat(SECTION, "Timeout")
            .map_err(|e| anyhow!("Invalid Timeout in {:?}: {}", path, e))?
        {
            config.timeout = Duration::from_secs_f64(timeout);
        }
        if let Some(unpin) = ini
            .getboolcoerce(SECTION, "UnpinOld")
            .map_err(|e| anyhow!("Invalid UnpinOld in {:?}: {}", path, e))?
        {
            config.unpin_old = unpin;
        }
        if let Some(republish) = ini
            .getboolcoerce(SECTION, "Republish")
            .map_err(|e| anyhow!("Invalid Republish in {:?}: {}", path, e))?
        {
            config.republish_ipns = republish;
        }
        if let Some(ttl) = ini.get(SECTION, "IPNSTTLString") {
            config.ipns_ttl = ttl;
        }
        if let Some(cid_version) = ini
            .getuint(SECTION, "CIDVersion")
            .map_err(|e| anyhow!("Invalid CIDVersion in {:?}: {}", path, e))?
        {
            config.cid_version = u32::try_from(cid_version).context("CIDVersion out of range")?;
        }
        if let Some(chunker) = ini.get(SECTION, "IPFSChunker") {
            config.chunker = chunker;
        }
        config.user_name = ini.get(SECTION, "UserName");
        config.user_password = ini.get(SECTION, "UserPassword");

        Ok(config)
    }

    /// Basic-auth credentials, present only when both halves are configured.
    pub fn auth(&self) -> Option<(&str, &str)> {
        match (&self.user_name, &self.user_password) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        }
    }
}
