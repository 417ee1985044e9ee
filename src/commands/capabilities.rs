use anyhow::Result;
use std::io::Write;

/// Handle the capabilities command
/// Output the capabilities this remote helper supports
pub fn handle<W: Write>(output: &mut W) -> Result<()> {
    writeln!(output, "option")?;
    writeln!(output, "list")?;
    writeln!(output, "push")?;
    writeln!(output, "fetch")?;
    writeln!(output)?; // Empty line signals completion

    Ok(())
}
