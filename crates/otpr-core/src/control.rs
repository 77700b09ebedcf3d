//! Administrative control plane.
//!
//! Authorization happens in the transport adapter before a command reaches
//! [`ControlPlane::execute`]; nothing here checks who is asking.

use std::sync::Arc;

use crate::{
    domain::DestinationId,
    errors::Error,
    formatting::escape_html,
    gate::RelayGate,
    registry::DestinationRegistry,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
    Status,
    Add(DestinationId),
    Remove(DestinationId),
    SetLabel { id: DestinationId, label: String },
    List,
    Help,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Known command, bad arguments. Carries the usage line.
    Usage(&'static str),
    Unknown(String),
}

const USAGE_ADD: &str = "Usage: /addgroup <group_chat_id>";
const USAGE_REMOVE: &str = "Usage: /rmvgroup <group_chat_id>";
const USAGE_SET_LABEL: &str = "Usage: /cngcredit <group_chat_id> <new_credit>";

pub const HELP_TEXT: &str = "<b>OTP relay commands</b>\n\n\
/on - start relaying codes\n\
/off - stop relaying codes\n\
/status - show relay status\n\
/addgroup &lt;chat_id&gt; - add a destination\n\
/rmvgroup &lt;chat_id&gt; - remove a destination\n\
/cngcredit &lt;chat_id&gt; &lt;text&gt; - change a destination's credit\n\
/groups - list destinations";

impl Command {
    /// Parse a command name (without `/` or `@bot`) and its argument string.
    pub fn parse(name: &str, args: &str) -> std::result::Result<Self, ParseError> {
        let args = args.trim();

        // Commands without parameters ignore trailing text.
        match name.to_lowercase().as_str() {
            "on" => Ok(Command::On),
            "off" => Ok(Command::Off),
            "status" => Ok(Command::Status),
            "groups" | "list" => Ok(Command::List),
            "start" | "help" => Ok(Command::Help),
            "addgroup" | "add" => single_id(args, USAGE_ADD).map(Command::Add),
            "rmvgroup" | "remove" => single_id(args, USAGE_REMOVE).map(Command::Remove),
            "cngcredit" | "setlabel" => {
                let mut parts = args.splitn(2, char::is_whitespace);
                let id = parts.next().unwrap_or("").trim();
                let label = parts.next().unwrap_or("").trim();
                if id.is_empty() || label.is_empty() {
                    return Err(ParseError::Usage(USAGE_SET_LABEL));
                }
                Ok(Command::SetLabel {
                    id: DestinationId::from(id),
                    label: label.to_string(),
                })
            }
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

fn single_id(args: &str, usage: &'static str) -> std::result::Result<DestinationId, ParseError> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    match parts.as_slice() {
        [id] => Ok(DestinationId::from(*id)),
        _ => Err(ParseError::Usage(usage)),
    }
}

/// Gate + registry operations exposed to the operator.
pub struct ControlPlane {
    gate: Arc<RelayGate>,
    registry: Arc<DestinationRegistry>,
}

impl ControlPlane {
    pub fn new(gate: Arc<RelayGate>, registry: Arc<DestinationRegistry>) -> Self {
        Self { gate, registry }
    }

    pub fn query_status(&self) -> bool {
        self.gate.is_enabled()
    }

    /// Apply a command and produce the HTML reply.
    ///
    /// `Err` means nothing changed; the caller should show the error.
    pub async fn execute(&self, cmd: Command) -> Result<String> {
        match cmd {
            Command::On => {
                self.gate.enable().await?;
                Ok("✅ Bot is now ON.".to_string())
            }
            Command::Off => {
                self.gate.disable().await?;
                Ok("✅ Bot is now OFF.".to_string())
            }
            Command::Status => {
                let state = if self.query_status() { "ON ✅" } else { "OFF ❌" };
                Ok(format!(
                    "ℹ️ Bot Status: {state}\nDestinations: {}",
                    self.registry.len().await
                ))
            }
            Command::Add(id) => {
                let html_id = escape_html(id.as_str());
                if self.registry.add(id).await? {
                    Ok(format!("✅ Added group {html_id}."))
                } else {
                    Ok(format!("ℹ️ Group {html_id} is already registered."))
                }
            }
            Command::Remove(id) => {
                let html_id = escape_html(id.as_str());
                if self.registry.remove(&id).await? {
                    Ok(format!("✅ Removed group {html_id}."))
                } else {
                    Ok(format!("ℹ️ Group {html_id} was not registered."))
                }
            }
            Command::SetLabel { id, label } => {
                self.registry.set_label(&id, label).await?;
                Ok(format!(
                    "✅ Updated credit for group {}.",
                    escape_html(id.as_str())
                ))
            }
            Command::List => {
                let all = self.registry.list().await;
                if all.is_empty() {
                    return Ok("No groups registered.".to_string());
                }
                let mut lines = vec![format!("📋 <b>Groups ({})</b>", all.len())];
                for d in all {
                    lines.push(format!(
                        "• <code>{}</code>: {}",
                        escape_html(d.id.as_str()),
                        escape_html(&d.label)
                    ));
                }
                Ok(lines.join("\n"))
            }
            Command::Help => Ok(HELP_TEXT.to_string()),
        }
    }
}

/// Operator-facing text for a failed command.
pub fn error_reply(e: &Error) -> String {
    match e {
        Error::NotFound(id) => format!(
            "❌ Group {} is not registered. Add it with /addgroup first.",
            escape_html(id.as_str())
        ),
        Error::Persistence { .. } => {
            "❌ Could not save the change; nothing was updated. Check the relay logs.".to_string()
        }
        other => format!("❌ {}", escape_html(&other.to_string())),
    }
}
