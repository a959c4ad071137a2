//! Interactive console
//!
//! Line-oriented front end for the endpoint nodes, standing in for the
//! `open`/`read`/`write`/`close` calls a program would make on a device
//! file. Handles stay open across commands, so the one-shot read gate and
//! the detach-while-open behavior can be exercised by hand.

use crate::file::FileHandle;
use crate::nodes::NodeTable;
use anyhow::{Context, Result};
use protocol::FileError;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::debug;

const HELP: &str = "\
commands:
  list                 show published nodes
  open <node>          open a node
  read <node>          read the value from an open node
  write <node> <text>  write text (plus newline) to an open node
  close <node>         release an open node
  help                 show this help
  quit                 exit";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Open(String),
    Read(String),
    Write { node: String, text: String },
    Close(String),
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse a line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));

        let node = || {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                Err(format!("usage: {} <node>", verb))
            } else {
                Ok(rest.to_string())
            }
        };

        let cmd = match verb {
            "list" | "ls" => Self::List,
            "open" => Self::Open(node()?),
            "read" => Self::Read(node()?),
            "close" => Self::Close(node()?),
            "write" => {
                let (node, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: write <node> <text>".to_string())?;
                Self::Write {
                    node: node.to_string(),
                    text: text.trim_start().to_string(),
                }
            }
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(Some(cmd))
    }
}

/// Console state: the node table and the handles opened through it
pub struct Console {
    table: Arc<NodeTable>,
    handles: BTreeMap<String, FileHandle>,
}

impl Console {
    pub fn new(table: Arc<NodeTable>) -> Self {
        Self {
            table,
            handles: BTreeMap::new(),
        }
    }

    /// Execute one command and return the text to show
    pub fn execute(&mut self, cmd: ConsoleCommand) -> String {
        debug!("Console command: {:?}", cmd);
        match cmd {
            ConsoleCommand::List => self.list(),
            ConsoleCommand::Open(node) => self.open(node),
            ConsoleCommand::Read(node) => self.with_handle(&node, |file| {
                let mut buf = [0u8; 16];
                let n = file.read(&mut buf)?;
                Ok(if n == 0 {
                    "(no new value)".to_string()
                } else {
                    String::from_utf8_lossy(&buf[..n]).trim_end().to_string()
                })
            }),
            ConsoleCommand::Write { node, text } => self.with_handle(&node, |file| {
                let payload = format!("{}\n", text);
                let n = file.write(payload.as_bytes())?;
                Ok(format!("{} bytes written", n))
            }),
            ConsoleCommand::Close(node) => match self.handles.remove(&node) {
                Some(mut file) => match file.release() {
                    Ok(()) => format!("{} closed", node),
                    Err(e) => format!("close {}: {}", node, e),
                },
                None => format!("{} is not open", node),
            },
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => String::new(),
        }
    }

    fn list(&self) -> String {
        let nodes = self.table.list();
        if nodes.is_empty() {
            return "No nodes published.".to_string();
        }

        nodes
            .iter()
            .map(|node| {
                format!(
                    "{:<22} {:>8}  ep {:#04x}{}",
                    node.name,
                    node.dev.to_string(),
                    node.endpoint,
                    if self.handles.contains_key(&node.name) {
                        "  [open]"
                    } else {
                        ""
                    }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn open(&mut self, node: String) -> String {
        if self.handles.contains_key(&node) {
            return format!("{} is already open", node);
        }

        let Some(dev) = self.table.dev_by_name(&node) else {
            return format!("open {}: {}", node, FileError::NoDevice);
        };

        match FileHandle::open(self.table.as_ref(), dev) {
            Ok(file) => {
                self.handles.insert(node.clone(), file);
                format!("{} opened", node)
            }
            Err(e) => format!("open {}: {}", node, e),
        }
    }

    fn with_handle(
        &mut self,
        node: &str,
        op: impl FnOnce(&mut FileHandle) -> Result<String, FileError>,
    ) -> String {
        match self.handles.get_mut(node) {
            Some(file) => op(file).unwrap_or_else(|e| format!("{}: {}", node, e)),
            None => format!("{} is not open", node),
        }
    }
}

/// Run the console until `quit` or end of input
///
/// Handles still open at exit are released.
pub fn run_console<R: BufRead, W: Write>(
    table: Arc<NodeTable>,
    input: R,
    mut output: W,
) -> Result<()> {
    let mut console = Console::new(table);

    writeln!(output, "hp-gadget console, type 'help' for commands")?;
    for line in input.lines() {
        let line = line.context("Failed to read console input")?;

        let reply = match ConsoleCommand::parse(&line) {
            Ok(None) => continue,
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(cmd)) => console.execute(cmd),
            Err(e) => e,
        };
        writeln!(output, "{}", reply)?;
        output.flush()?;
    }

    Ok(())
}
