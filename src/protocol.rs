//! Remote-helper line-protocol driver.
//!
//! Reads commands from git on stdin and dispatches them. `push` and `fetch`
//! arrive as batches terminated by a blank line; responses are flushed after
//! every batch so git never waits on a buffered reply.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::commands;
use crate::git::Plumbing;
use crate::ipfs::IpfsApi;
use crate::logging;
use crate::remote::Remote;

/// Drive the command dialog until git closes the stream or sends the
/// final blank line.
pub fn run<A: IpfsApi, G: Plumbing, R: BufRead, W: Write>(
    remote: &mut Remote<A, G>,
    input: R,
    output: &mut W,
) -> Result<()> {
    let mut lines = input.lines();

    while let Some(line) = lines.next() {
        let line = line?;
        let line = line.trim();
        tracing::debug!("command: {}", line);

        match line.split_whitespace().next() {
            None => break, // blank line at idle: git is done with us
            Some("capabilities") => commands::capabilities::handle(output)?,
            Some("option") => handle_option(line, output)?,
            Some("list") => {
                let for_push = line == "list for-push";
                commands::list::handle(remote, output, for_push)?;
            }
            Some("push") => {
                let requests = collect_batch(line, &mut lines, commands::push::parse_request)?;
                commands::push::handle(remote, output, &requests)?;
            }
            Some("fetch") => {
                let requests = collect_batch(line, &mut lines, commands::fetch::parse_request)?;
                commands::fetch::handle(remote, output, &requests)?;
            }
            Some(_) => {
                eprintln!("Unsupported operation: {}", line);
                anyhow::bail!("unsupported operation: {}", line);
            }
        }

        output.flush()?;
    }

    Ok(())
}

/// Gather a push/fetch batch: the line already read plus every following
/// line up to the blank sentinel.
fn collect_batch<T, R: BufRead>(
    first: &str,
    lines: &mut std::io::Lines<R>,
    parse: impl Fn(&str) -> Result<T>,
) -> Result<Vec<T>> {
    let mut batch = vec![parse(first)?];
    for line in lines {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        batch.push(parse(line)?);
    }
    Ok(batch)
}

fn handle_option<W: Write>(line: &str, output: &mut W) -> Result<()> {
    let mut parts = line.split_whitespace();
    let _ = parts.next(); // "option"
    match (parts.next(), parts.next()) {
        (Some("verbosity"), Some(value)) => match value.parse::<u64>() {
            Ok(level) => {
                logging::set_verbosity(level);
                writeln!(output, "ok")?;
            }
            Err(_) => writeln!(output, "unsupported")?,
        },
        _ => writeln!(output, "unsupported")?,
    }
    Ok(())
}
