//! Line-oriented session commands.

use anyhow::{anyhow, bail, Result};
use recsync_core::{FieldValues, RecordId, SyncMode};
use serde_json::Value;

pub const HELP: &str = "\
commands:
  list                       all rows of the record set
  view                       rows of the filtered view
  search [term]              set the search term (empty clears it)
  sync on|off                toggle external records
  refresh                    reload internal records
  edit <id> <field> <value>  edit a draft field
  save <id>                  save a dirty draft
  create <field=value>...    create an internal record
  delete <id>                delete a row
  notify <json>              publish a change notification
  pending                    show the pending change
  accept                     apply the pending change
  help                       this text
  quit                       leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    View,
    Search(String),
    Sync(SyncMode),
    Refresh,
    Edit {
        id: RecordId,
        field: String,
        value: String,
    },
    Save(RecordId),
    Create(FieldValues),
    Delete(RecordId),
    Notify(Value),
    Pending,
    Accept,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb {
            "list" => Command::List,
            "view" => Command::View,
            "search" => Command::Search(rest.to_string()),
            "sync" => match rest {
                "on" => Command::Sync(SyncMode::On),
                "off" => Command::Sync(SyncMode::Off),
                other => bail!("sync expects on or off, got '{}'", other),
            },
            "refresh" => Command::Refresh,
            "edit" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                let id = parts.next().filter(|s| !s.is_empty());
                let field = parts.next().filter(|s| !s.is_empty());
                match (id, field) {
                    (Some(id), Some(field)) => Command::Edit {
                        id: RecordId::from(id),
                        field: field.to_string(),
                        value: parts.next().unwrap_or("").trim().to_string(),
                    },
                    _ => bail!("usage: edit <id> <field> <value>"),
                }
            }
            "save" => Command::Save(required_id(rest, "save")?),
            "create" => {
                let mut fields = FieldValues::new();
                for pair in rest.split_whitespace() {
                    let (field, value) = pair
                        .split_once('=')
                        .ok_or_else(|| anyhow!("expected field=value, got '{}'", pair))?;
                    fields.insert(field.to_string(), value.to_string());
                }
                if fields.is_empty() {
                    bail!("usage: create <field=value>...");
                }
                Command::Create(fields)
            }
            "delete" => Command::Delete(required_id(rest, "delete")?),
            "notify" => Command::Notify(
                serde_json::from_str(rest).map_err(|e| anyhow!("invalid notification: {}", e))?,
            ),
            "pending" => Command::Pending,
            "accept" => Command::Accept,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command '{}'", other),
        };
        Ok(Some(command))
    }
}

fn required_id(rest: &str, verb: &str) -> Result<RecordId> {
    match rest.split_whitespace().next() {
        Some(id) => Ok(RecordId::from(id)),
        None => bail!("usage: {} <id>", verb),
    }
}
