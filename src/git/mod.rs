//! Gateway to the local git plumbing.
//!
//! The transfer engines never touch the object store directly; everything
//! goes through the `Plumbing` trait so tests can substitute an in-memory
//! repository.

use anyhow::{Context, Result};
use gix_object::Kind;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::objects::{kind_name, parse_kind, GitObject, ObjectId};

/// Local repository operations the helper depends on.
pub trait Plumbing {
    /// Absolute path of the .git directory
    fn git_dir(&self) -> &Path;

    /// All objects reachable from `rev`, one oid per entry
    fn rev_list(&self, rev: &str) -> Result<Vec<ObjectId>>;

    /// Kind of an object in the local store
    fn object_kind(&self, oid: &str) -> Result<Kind>;

    /// Payload size in bytes
    fn object_size(&self, oid: &str) -> Result<u64>;

    /// Read an object's kind and payload, binary content preserved exactly
    fn read_object(&self, oid: &str) -> Result<GitObject>;

    /// Insert a payload into the local store, returning its identity
    fn hash_object(&self, kind: Kind, data: &[u8]) -> Result<ObjectId>;

    fn object_exists(&self, oid: &str) -> Result<bool>;

    /// True iff `ancestor` is an ancestor of `descendant`
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool>;

    /// Resolve a revision to an oid, or None when it does not exist
    fn resolve(&self, rev: &str) -> Result<Option<ObjectId>>;

    /// Regenerate info/refs and objects/info/packs
    fn update_server_info(&self) -> Result<()>;

    /// Rewrite the stored URL of a remote
    fn set_remote_url(&self, remote: &str, url: &str) -> Result<()>;
}

/// `Plumbing` implemented by shelling out to the `git` binary.
pub struct GitCli {
    work_dir: PathBuf,
    git_dir: PathBuf,
}

impl GitCli {
    /// Locate the repository enclosing the working directory.
    /// Fatal when invoked outside one.
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read the working directory")?;
        Self::open(cwd)
    }

    /// Open the repository enclosing `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let output = Command::new("git")
            .current_dir(dir.as_ref())
            .args(["rev-parse", "--show-toplevel", "--absolute-git-dir"])
            .output()
            .context("Failed to run git rev-parse")?;

        if !output.status.success() {
            anyhow::bail!(
                "not inside a git repository: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8(output.stdout).context("git rev-parse output")?;
        let mut lines = stdout.lines();
        let work_dir = lines.next().context("missing work tree path")?;
        let git_dir = lines.next().context("missing git dir path")?;

        Ok(Self {
            work_dir: PathBuf::from(work_dir),
            git_dir: PathBuf::from(git_dir),
        })
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.work_dir).args(args);
        cmd
    }

    /// Run git and capture stdout; non-zero exit is an error carrying stderr.
    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = self
            .command(args)
            .output()
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

        if !output.status.success() {
            anyhow::bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.stdout)
    }

    fn run_text(&self, args: &[&str]) -> Result<String> {
        let stdout = self.run(args)?;
        Ok(String::from_utf8(stdout).context("git output was not UTF-8")?.trim().to_string())
    }
}

impl Plumbing for GitCli {
    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn rev_list(&self, rev: &str) -> Result<Vec<ObjectId>> {
        let stdout = self.run_text(&["rev-list", "--objects", rev])?;
        // Each line is "<oid>" or "<oid> <path>"
        Ok(stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(|oid| oid.to_string())
            .collect())
    }

    fn object_kind(&self, oid: &str) -> Result<Kind> {
        let name = self.run_text(&["cat-file", "-t", oid])?;
        parse_kind(&name)
    }

    fn object_size(&self, oid: &str) -> Result<u64> {
        let size = self.run_text(&["cat-file", "-s", oid])?;
        size.parse()
            .with_context(|| format!("Unexpected cat-file -s output: {}", size))
    }

    fn read_object(&self, oid: &str) -> Result<GitObject> {
        let kind = self.object_kind(oid)?;
        let data = self.run(&["cat-file", kind_name(kind), oid])?;
        Ok(GitObject {
            id: oid.to_string(),
            kind,
            data,
        })
    }

    fn hash_object(&self, kind: Kind, data: &[u8]) -> Result<ObjectId> {
        let mut child = self
            .command(&["hash-object", "-w", "-t", kind_name(kind), "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn git hash-object")?;

        child
            .stdin
            .as_mut()
            .context("git hash-object stdin unavailable")?
            .write_all(data)
            .context("Failed to write payload to git hash-object")?;
        drop(child.stdin.take());

        let output = child
            .wait_with_output()
            .context("Failed to wait for git hash-object")?;
        if !output.status.success() {
            anyhow::bail!(
                "git hash-object failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8(output.stdout)
            .context("git hash-object output")?
            .trim()
            .to_string())
    }

    fn object_exists(&self, oid: &str) -> Result<bool> {
        let status = self
            .command(&["cat-file", "-e", oid])
            .stderr(Stdio::null())
            .status()
            .context("Failed to run git cat-file -e")?;
        Ok(status.success())
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let output = self
            .command(&["merge-base", "--is-ancestor", ancestor, descendant])
            .output()
            .context("Failed to run git merge-base")?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => anyhow::bail!(
                "git merge-base --is-ancestor {} {} failed: {}",
                ancestor,
                descendant,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }

    fn resolve(&self, rev: &str) -> Result<Option<ObjectId>> {
        let output = self
            .command(&["rev-parse", "--verify", "--quiet", rev])
            .output()
            .context("Failed to run git rev-parse")?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8(output.stdout)
                .context("git rev-parse output")?
                .trim()
                .to_string(),
        ))
    }

    fn update_server_info(&self) -> Result<()> {
        self.run(&["update-server-info"])?;
        Ok(())
    }

    fn set_remote_url(&self, remote: &str, url: &str) -> Result<()> {
        self.run(&["remote", "set-url", remote, url])?;
        Ok(())
    }
}
