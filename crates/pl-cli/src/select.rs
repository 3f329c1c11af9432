//! Interactive selection for omitted identifiers
//!
//! When a command leaves out a peer or organization, the lifecycle manager
//! asks a [`PeerSelector`] to pick one from the current list.

use std::io::{self, BufRead, IsTerminal, Write};

use pl_core::PeerError;

/// Picks one entry out of a list
pub trait PeerSelector: Send + Sync {
    /// Index of the chosen option, `None` if the user declined
    fn select(&self, prompt: &str, options: &[String]) -> Result<Option<usize>, PeerError>;
}

/// Numbered menu on stderr, answer read from stdin
///
/// Declines without asking when stdin is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinSelector;

impl PeerSelector for StdinSelector {
    fn select(&self, prompt: &str, options: &[String]) -> Result<Option<usize>, PeerError> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            tracing::debug!("stdin is not a terminal, not prompting");
            return Ok(None);
        }

        let mut stderr = io::stderr();
        writeln!(stderr, "{}:", prompt).map_err(PeerError::Output)?;
        for (i, option) in options.iter().enumerate() {
            writeln!(stderr, "  {}) {}", i + 1, option).map_err(PeerError::Output)?;
        }

        let mut input = stdin.lock();
        loop {
            write!(stderr, "Enter a number (blank to cancel): ").map_err(PeerError::Output)?;
            stderr.flush().map_err(PeerError::Output)?;

            let mut line = String::new();
            if input.read_line(&mut line).map_err(PeerError::Output)? == 0 {
                return Ok(None);
            }
            match parse_choice(&line, options.len()) {
                Choice::Cancel => return Ok(None),
                Choice::Index(i) => return Ok(Some(i)),
                Choice::Invalid => {
                    writeln!(stderr, "Please enter 1-{}", options.len()).map_err(PeerError::Output)?;
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Choice {
    Cancel,
    Index(usize),
    Invalid,
}

fn parse_choice(line: &str, count: usize) -> Choice {
    let line = line.trim();
    if line.is_empty() {
        return Choice::Cancel;
    }
    match line.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Choice::Index(n - 1),
        _ => Choice::Invalid,
    }
}
