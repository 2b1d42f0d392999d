use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::message::Message;
use crate::swarm::Swarm;

/// One stable, diff-friendly line per message.
pub fn summarize(message: &Message) -> String {
    let to = if message.is_broadcast() {
        "*".to_string()
    } else {
        message.recipient_ids().join(",")
    };
    format!(
        "{} {} from={} to={} content={:?}",
        message.timestamp().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        message.kind(),
        message.sender_id(),
        to,
        message.content()
    )
}

pub fn render_ledger(messages: &[Message]) -> String {
    let mut out = format!("LEDGER messages={}\n", messages.len());
    for msg in messages {
        out.push_str(&summarize(msg));
        out.push('\n');
    }
    out
}

/// Print the swarm's ledger to stdout.
pub fn print_ledger(swarm: &Swarm) {
    print!("{}", render_ledger(&swarm.messages()));
}

/// For each sender, every recipient it addressed, in first-seen order.
/// Broadcasts are listed under the recipient `"*"`.
pub fn recipients_by_sender(messages: &[Message]) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for msg in messages {
        let entry = out.entry(msg.sender_id().to_string()).or_default();
        let targets: Vec<&str> = if msg.is_broadcast() {
            vec!["*"]
        } else {
            msg.recipient_ids().iter().map(String::as_str).collect()
        };
        for t in targets {
            if !entry.iter().any(|seen| seen == t) {
                entry.push(t.to_string());
            }
        }
    }
    out
}

pub fn write_ledger_artifact(path: &Path, messages: &[Message]) -> Result<()> {
    let body = serde_json::to_vec_pretty(messages).context("serialize ledger artifact")?;
    fs::write(path, body)
        .with_context(|| format!("failed writing ledger artifact '{}'", path.display()))
}

pub fn load_ledger_artifact(path: &Path) -> Result<Vec<Message>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading ledger artifact '{}'", path.display()))?;
    serde_json::from_str(&raw).with_context(|| {
        format!(
            "failed parsing ledger artifact '{}' as message json",
            path.display()
        )
    })
}
