use std::io::{self, Write};

use colored::Colorize;
use edit_history_engine::replay::ExternalChangeResolver;
use edit_history_engine::{ContentHash, EditEntry, EngineError, Status};
use edit_history_engine::reviewer::{IdentifierResolution, Reviewer, StatusFilter};

use crate::cli_args::StatusArg;

/// Resolves identifiers to interactive stdin consent: the only
/// `ExternalChangeResolver` this binary uses outside tests.
pub struct InteractiveResolver;

impl ExternalChangeResolver for InteractiveResolver {
    fn resolve(&self, path: &std::path::Path, recorded: Option<&ContentHash>, current: Option<&ContentHash>) -> bool {
        eprintln!("{}", format!("`{}` was modified outside the engine:", path.display()).yellow());
        eprintln!("  expected: {}", recorded.map(ContentHash::as_str).unwrap_or("<absent>"));
        eprintln!("  found:    {}", current.map(ContentHash::as_str).unwrap_or("<absent>"));
        eprint!("discard the external change and proceed? [y/N] ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

pub fn print_status(entries: &[EditEntry]) {
    if entries.is_empty() {
        println!("no entries");
        return;
    }
    for e in entries {
        let status = match e.status {
            Status::Pending => "pending".yellow(),
            Status::Accepted => "accepted".green(),
            Status::Rejected => "rejected".red(),
        };
        println!(
            "{}  {}  {:<8}  {:<8}  {}  {}",
            &e.edit_id.as_str()[..8.min(e.edit_id.as_str().len())],
            &e.conversation_id.as_str()[..8.min(e.conversation_id.as_str().len())],
            e.detail.name(),
            status,
            e.timestamp.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
            e.file_path.display(),
        );
    }
}

/// Parses a duration like `30m`, `2h`, `1d` into a cutoff: "now minus that
/// much time". Bare digits are interpreted as seconds.
fn parse_since(raw: &str) -> anyhow::Result<time::OffsetDateTime> {
    let (digits, unit_secs) = match raw.strip_suffix('s') {
        Some(d) => (d, 1u64),
        None => match raw.strip_suffix('m') {
            Some(d) => (d, 60),
            None => match raw.strip_suffix('h') {
                Some(d) => (d, 3600),
                None => match raw.strip_suffix('d') {
                    Some(d) => (d, 86_400),
                    None => (raw, 1),
                },
            },
        },
    };
    let n: u64 = digits.parse().map_err(|_| anyhow::anyhow!("invalid `--time` value `{raw}`"))?;
    let age = std::time::Duration::from_secs(n * unit_secs);
    Ok(time::OffsetDateTime::now_utc() - age)
}

pub fn run_status(
    reviewer: &Reviewer,
    conversation: Option<String>,
    file: Option<std::path::PathBuf>,
    status: Option<StatusArg>,
    time: Option<String>,
    limit: usize,
) -> anyhow::Result<()> {
    let since = time.as_deref().map(parse_since).transpose()?;
    let filter = StatusFilter {
        conversation_id: conversation.map(edit_history_engine::ConversationId::new),
        file_path: file,
        status: status.map(Status::from),
        since,
        limit: Some(limit),
    };
    let entries = reviewer.status(&filter)?;
    print_status(&entries);
    Ok(())
}

pub fn run_show(reviewer: &Reviewer, identifier: &str) -> anyhow::Result<()> {
    match reviewer.resolve_prefix(identifier)? {
        IdentifierResolution::Edit(edit_id) => match reviewer.diff_for_edit(&edit_id)? {
            Some(diff) => {
                print_diff(&diff);
            }
            None => println!("edit {edit_id} changed no content (no diff)"),
        },
        IdentifierResolution::Conversation(conversation_id) => {
            let diffs = reviewer.diffs_for_conversation(&conversation_id)?;
            if diffs.is_empty() {
                println!("conversation {conversation_id} has no content-changing edits");
            }
            for (entry, diff) in diffs {
                println!("{}", format!("# {} ({})", entry.edit_id, entry.file_path.display()).bold());
                print_diff(&diff);
            }
        }
        IdentifierResolution::Ambiguous { edits, conversations } => {
            return Err(EngineError::AmbiguousIdentifier {
                prefix: identifier.to_string(),
                count: edits.len() + conversations.len(),
            }
            .into());
        }
        IdentifierResolution::None => {
            return Err(EngineError::NoSuchIdentifier { prefix: identifier.to_string() }.into());
        }
    }
    Ok(())
}

fn print_diff(diff: &[u8]) {
    let text = String::from_utf8_lossy(diff);
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix('+') {
            if line.starts_with("+++") {
                println!("{}", line.bold());
            } else {
                println!("{}", format!("+{rest}").green());
            }
        } else if let Some(rest) = line.strip_prefix('-') {
            if line.starts_with("---") {
                println!("{}", line.bold());
            } else {
                println!("{}", format!("-{rest}").red());
            }
        } else {
            println!("{line}");
        }
    }
}

fn resolve_edit_or_conversation(
    reviewer: &Reviewer,
    edit: Option<String>,
    conversation: Option<String>,
) -> anyhow::Result<Target> {
    if let Some(edit) = edit {
        return match reviewer.resolve_prefix(&edit)? {
            IdentifierResolution::Edit(id) => Ok(Target::Edit(id)),
            IdentifierResolution::Ambiguous { edits, conversations } => Err(EngineError::AmbiguousIdentifier {
                prefix: edit,
                count: edits.len() + conversations.len(),
            }
            .into()),
            IdentifierResolution::Conversation(_) | IdentifierResolution::None => {
                Err(EngineError::NoSuchIdentifier { prefix: edit }.into())
            }
        };
    }
    if let Some(conversation) = conversation {
        return Ok(Target::Conversation(edit_history_engine::ConversationId::new(conversation)));
    }
    Err(anyhow::anyhow!("one of `-e/--edit` or `-c/--conversation` is required"))
}

enum Target {
    Edit(edit_history_engine::EditId),
    Conversation(edit_history_engine::ConversationId),
}

pub fn run_accept(reviewer: &Reviewer, edit: Option<String>, conversation: Option<String>) -> anyhow::Result<()> {
    set_status(reviewer, edit, conversation, Status::Accepted)
}

pub fn run_reject(reviewer: &Reviewer, edit: Option<String>, conversation: Option<String>) -> anyhow::Result<()> {
    set_status(reviewer, edit, conversation, Status::Rejected)
}

fn set_status(
    reviewer: &Reviewer,
    edit: Option<String>,
    conversation: Option<String>,
    new_status: Status,
) -> anyhow::Result<()> {
    let target = resolve_edit_or_conversation(reviewer, edit, conversation)?;
    let resolver = InteractiveResolver;
    match target {
        Target::Edit(edit_id) => {
            let report = reviewer.set_status(&edit_id, new_status, &resolver)?;
            println!("{}: {} -> {}", edit_id, report.final_path.display(), format!("{new_status:?}").to_lowercase());
            if let Some(warning) = &report.final_hash_warning {
                eprintln!("{}", warning.yellow());
            }
        }
        Target::Conversation(conversation_id) => {
            let reports = reviewer.set_status_for_conversation(&conversation_id, new_status, &resolver)?;
            for report in reports {
                println!("{} -> {}", report.final_path.display(), format!("{new_status:?}").to_lowercase());
                if let Some(warning) = &report.final_hash_warning {
                    eprintln!("{}", warning.yellow());
                }
            }
        }
    }
    Ok(())
}

pub fn run_review(reviewer: &Reviewer, conversation: Option<String>) -> anyhow::Result<()> {
    let conversation_id = conversation.map(edit_history_engine::ConversationId::new);
    let resolver = InteractiveResolver;
    let mut skipped = std::collections::HashSet::new();

    loop {
        let pending = reviewer.pending_oldest_first(conversation_id.as_ref())?;
        let Some(entry) = pending.iter().find(|e| !skipped.contains(&e.edit_id)) else {
            println!("no pending edits");
            return Ok(());
        };

        println!(
            "{}",
            format!("{} {} ({})", entry.edit_id, entry.file_path.display(), entry.detail.name()).bold()
        );
        if let Some(diff) = reviewer.diff_for_edit(&entry.edit_id)? {
            print_diff(&diff);
        }
        print!("[a]ccept / [r]eject / [s]kip / [q]uit > ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return Ok(());
        }
        match line.trim().to_lowercase().as_str() {
            "a" | "accept" => {
                reviewer.set_status(&entry.edit_id, Status::Accepted, &resolver)?;
            }
            "r" | "reject" => {
                reviewer.set_status(&entry.edit_id, Status::Rejected, &resolver)?;
            }
            "s" | "skip" => {
                skipped.insert(entry.edit_id.clone());
            }
            "q" | "quit" => return Ok(()),
            _ => continue,
        }
    }
}

pub fn run_cleanup(reviewer: &Reviewer) -> anyhow::Result<()> {
    let reclaimed = reviewer.cleanup()?;
    println!("reclaimed {reclaimed} stale lock(s)");
    Ok(())
}
