//! Line-oriented user commands read from standard input.

use std::io::{self, BufRead};
use std::thread;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, ViewerError};

/// A user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Hide or show a channel
    Toggle(String),
    /// Flip newest-first / oldest-first
    Order,
    /// Reveal another page of rows
    More,
    Quit,
}

/// Parse one input line
///
/// Accepted forms:
/// - `toggle <channel>` or `t <channel>`
/// - `1`, `2`, ... toggle the n-th tracked channel
/// - `order` / `o`, `more` / `m`, `quit` / `q`
///
/// Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns `ViewerError::Command` for anything else.
pub fn parse_command(line: &str, tracked: &[String]) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(ViewerError::Command(line.trim().to_string()));
    }

    let command = match (verb, arg) {
        ("toggle" | "t", Some(channel)) => Command::Toggle(channel.to_string()),
        ("order" | "o", None) => Command::Order,
        ("more" | "m", None) => Command::More,
        ("quit" | "q" | "exit", None) => Command::Quit,
        (n, None) => match n.parse::<usize>() {
            Ok(idx) if idx >= 1 && idx <= tracked.len() => Command::Toggle(tracked[idx - 1].clone()),
            _ => return Err(ViewerError::Command(line.trim().to_string())),
        },
        _ => return Err(ViewerError::Command(line.trim().to_string())),
    };
    Ok(Some(command))
}

/// Forward stdin lines to `lines` until EOF
///
/// Reads on a detached OS thread. A blocking read there never holds up
/// runtime shutdown after `quit` or Ctrl+C.
pub fn spawn_stdin_reader(lines: mpsc::UnboundedSender<String>) -> thread::JoinHandle<()> {
    thread::spawn(move || forward_lines(io::stdin().lock(), &lines))
}

/// Forward lines from any reader on a detached OS thread
pub fn spawn_line_reader<R>(reader: R, lines: mpsc::UnboundedSender<String>) -> thread::JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || forward_lines(reader, &lines))
}

/// Send each line until EOF, a read error, or the receiver is gone
fn forward_lines<R: BufRead>(reader: R, lines: &mpsc::UnboundedSender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if lines.send(line).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("stdin read failed: {}", e);
                return;
            }
        }
    }
    debug!("stdin closed, no more commands");
}
