//! Create command implementation

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};

use pl_core::{AgentConnector, PeerError, PeerStore};

use crate::lifecycle::PeerLifecycleManager;
use crate::output::{print_success, OutputTarget, PreparedOutput, PRIVATE_KEY_WARNING};

const OUTPUT_PROMPT: &str = "Filename to store WireGuard configuration in, or 'stdout': ";

/// Create a peer and write its WireGuard configuration
///
/// The destination comes from `file`, or from a prompt when it is omitted
/// on a terminal; without a terminal the document goes to stdout.
pub async fn create_command<S, C>(
    manager: &PeerLifecycleManager<S, C>,
    org: Option<&str>,
    region: Option<&str>,
    name: Option<&str>,
    file: Option<&str>,
) -> Result<()>
where
    S: PeerStore,
    C: AgentConnector,
{
    let org = manager.resolve_org(org).await?;

    eprintln!("\n{}\n", PRIVATE_KEY_WARNING);

    let output = match file {
        Some(file) => PreparedOutput::prepare(OutputTarget::parse(file))
            .with_context(|| format!("Can't create '{}'", file))?,
        None => prompt_for_output()?,
    };

    let outcome = manager.create(&org, region, name, output).await?;

    if let OutputTarget::File(path) = &outcome.written_to {
        print_success(&format!(
            "Wrote WireGuard configuration for peer '{}' to {}; load in your WireGuard client",
            outcome.peer.name,
            path.display()
        ));
    }
    Ok(())
}

fn prompt_for_output() -> Result<PreparedOutput> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(PreparedOutput::prepare(OutputTarget::Stdout)?);
    }

    let mut input = stdin.lock();
    let mut stderr = io::stderr();
    loop {
        write!(stderr, "{}", OUTPUT_PROMPT)?;
        stderr.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(PeerError::SelectionAborted("No output file chosen".to_string()).into());
        }
        let answer = line.trim();
        if answer.is_empty() {
            continue;
        }

        match PreparedOutput::prepare(OutputTarget::parse(answer)) {
            Ok(prepared) => return Ok(prepared),
            Err(e) => writeln!(stderr, "Can't create '{}': {}", answer, e)?,
        }
    }
}
