//! Console and chat commands.
//!
//! Commands are keyed by `(prefix, signature)`, e.g. `("/", "heal")`. Every
//! command can be run from the server console. Chat commands can also be
//! typed in game by anyone whose session privilege meets the command's
//! minimum; they receive the invoking player, or `None` on the console.
//! Prefix and signature match exactly, case included.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use compact_str::CompactString;
use tracing::{info, warn};

use crate::context::ServerContext;
use crate::objects::GameObject;

/// Prefix assumed for console input that omits one.
pub const DEFAULT_PREFIX: &str = "/";

pub type ConsoleFn = Arc<dyn Fn(&[String], &ServerContext) -> anyhow::Result<String> + Send + Sync>;
pub type ChatFn = Arc<
    dyn Fn(&[String], Option<&Arc<GameObject>>, &ServerContext) -> anyhow::Result<String>
        + Send
        + Sync,
>;

/// Command body; the variant decides where the command may be invoked.
#[derive(Clone)]
pub enum CommandHandler {
    /// Server console only
    Console(ConsoleFn),
    /// Console and in-game chat
    Chat(ChatFn),
}

/// One registered command.
#[derive(Clone)]
pub struct CommandEntry {
    pub(crate) group: &'static str,
    pub(crate) prefix: CompactString,
    pub(crate) signature: CompactString,
    pub(crate) min_privilege: u8,
    pub(crate) help: CompactString,
    pub(crate) handler: CommandHandler,
}

impl CommandEntry {
    pub fn group(&self) -> &'static str {
        self.group
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn min_privilege(&self) -> u8 {
        self.min_privilege
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn is_console_only(&self) -> bool {
        matches!(self.handler, CommandHandler::Console(_))
    }

    /// `prefix + signature`, as typed.
    pub fn usage(&self) -> String {
        format!("{}{}", self.prefix, self.signature)
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("command", &self.usage())
            .field("min_privilege", &self.min_privilege)
            .field("console_only", &self.is_console_only())
            .finish()
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub prefix: CompactString,
    pub signature: CompactString,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Parses a line that starts with one of `prefixes`.
    pub fn parse<'a>(line: &str, prefixes: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let line = line.trim();
        let prefix = prefixes
            .into_iter()
            .filter(|p| !p.is_empty() && line.starts_with(*p))
            .max_by_key(|p| p.len())?;
        let mut words = line[prefix.len()..].split_whitespace();
        let signature = words.next()?;
        Some(Self {
            prefix: CompactString::from(prefix),
            signature: CompactString::from(signature),
            args: words.map(str::to_string).collect(),
        })
    }
}

/// Command table keyed by `(prefix, signature)`.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: HashMap<(CompactString, CompactString), CommandEntry>,
}

impl CommandTable {
    /// Inserts an entry, replacing (and logging) any previous one.
    pub(crate) fn insert(&mut self, entry: CommandEntry) {
        let key = (entry.prefix.clone(), entry.signature.clone());
        let usage = entry.usage();
        let group = entry.group;
        if let Some(previous) = self.entries.insert(key, entry) {
            warn!(
                "⚠️ Command {} from group '{}' replaced the one from '{}'",
                usage, group, previous.group
            );
        }
    }

    pub fn get(&self, prefix: &str, signature: &str) -> Option<&CommandEntry> {
        self.entries
            .get(&(CompactString::from(prefix), CompactString::from(signature)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by usage.
    pub fn entries(&self) -> Vec<&CommandEntry> {
        let mut entries: Vec<&CommandEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| (&a.prefix, &a.signature).cmp(&(&b.prefix, &b.signature)));
        entries
    }

    fn prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self.entries.keys().map(|(p, _)| p.as_str()).collect();
        prefixes.sort_unstable();
        prefixes.dedup();
        prefixes
    }

    /// One line per command usable at `privilege`.
    pub fn help_text(&self, privilege: u8, include_console: bool) -> String {
        self.entries()
            .into_iter()
            .filter(|e| e.min_privilege <= privilege && (include_console || !e.is_console_only()))
            .map(|e| format!("{:<12} {}", e.usage(), e.help))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Runs a console line. The prefix may be omitted; `help` lists every
    /// command when no command of that name is registered.
    pub fn execute_console(&self, line: &str, ctx: &ServerContext) -> String {
        let parsed = CommandLine::parse(line, self.prefixes()).or_else(|| {
            CommandLine::parse(&format!("{DEFAULT_PREFIX}{}", line.trim()), [DEFAULT_PREFIX])
        });
        let Some(command) = parsed else {
            return String::new();
        };

        let entry = self.get(&command.prefix, &command.signature);
        if command.signature == "help" && !entry.is_some_and(CommandEntry::is_console_only) {
            return self.help_text(u8::MAX, true);
        }
        let Some(entry) = entry else {
            return format!("Unknown command: {}{}", command.prefix, command.signature);
        };

        info!("🖥️ Console: {}", line.trim());
        let result = match &entry.handler {
            CommandHandler::Console(handler) => handler(&command.args, ctx),
            CommandHandler::Chat(handler) => handler(&command.args, None, ctx),
        };
        Self::render(entry, result)
    }

    /// Runs a chat line typed by `player`.
    ///
    /// # Returns
    ///
    /// `None` when the line is ordinary chat, otherwise the reply to show the
    /// player.
    pub fn execute_chat(
        &self,
        line: &str,
        player: &Arc<GameObject>,
        privilege: u8,
        ctx: &ServerContext,
    ) -> Option<String> {
        let command = CommandLine::parse(line, self.prefixes())?;
        let reply = match self.get(&command.prefix, &command.signature) {
            None => format!("Unknown command: {}{}", command.prefix, command.signature),
            Some(entry) if entry.is_console_only() => {
                format!("Unknown command: {}", entry.usage())
            }
            Some(entry) if privilege < entry.min_privilege => {
                warn!(
                    "🚫 Player {} tried {} without privilege ({} < {})",
                    player.id(),
                    entry.usage(),
                    privilege,
                    entry.min_privilege
                );
                format!("You are not allowed to use {}", entry.usage())
            }
            Some(entry) => match &entry.handler {
                CommandHandler::Chat(handler) => {
                    info!("💬 Player {} ran {}", player.id(), entry.usage());
                    Self::render(entry, handler(&command.args, Some(player), ctx))
                }
                CommandHandler::Console(_) => format!("Unknown command: {}", entry.usage()),
            },
        };
        Some(reply)
    }

    fn render(entry: &CommandEntry, result: anyhow::Result<String>) -> String {
        match result {
            Ok(output) => output,
            Err(e) => {
                warn!("⚠️ Command {} failed: {:#}", entry.usage(), e);
                format!("{} failed: {}", entry.usage(), e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_signature_and_args() {
        let line = CommandLine::parse("  /heal 5 now", ["/", "!"]).unwrap();
        assert_eq!(line.prefix, "/");
        assert_eq!(line.signature, "heal");
        assert_eq!(line.args, vec!["5".to_string(), "now".to_string()]);

        assert!(CommandLine::parse("hello there", ["/"]).is_none());
        assert!(CommandLine::parse("/", ["/"]).is_none());
    }

    #[test]
    fn longest_prefix_wins() {
        let line = CommandLine::parse("//zones", ["/", "//"]).unwrap();
        assert_eq!(line.prefix, "//");
        assert_eq!(line.signature, "zones");
    }

    fn entry(signature: &str, min_privilege: u8, console: bool) -> CommandEntry {
        let handler = if console {
            CommandHandler::Console(Arc::new(
                |_: &[String], _: &ServerContext| -> anyhow::Result<String> { Ok("console".into()) },
            ))
        } else {
            CommandHandler::Chat(Arc::new(
                |_: &[String], _: Option<&Arc<GameObject>>, _: &ServerContext| -> anyhow::Result<String> {
                    Ok("chat".into())
                },
            ))
        };
        CommandEntry {
            group: "test",
            prefix: CompactString::from(DEFAULT_PREFIX),
            signature: CompactString::from(signature),
            min_privilege,
            help: CompactString::from("does things"),
            handler,
        }
    }

    #[test]
    fn help_filters_by_privilege_and_surface() {
        let mut table = CommandTable::default();
        table.insert(entry("zones", 0, true));
        table.insert(entry("heal", 0, false));
        table.insert(entry("smash", 5, false));

        let player_help = table.help_text(0, false);
        assert!(player_help.contains("/heal"));
        assert!(!player_help.contains("/zones"));
        assert!(!player_help.contains("/smash"));

        assert_eq!(table.help_text(u8::MAX, true).lines().count(), 3);
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut table = CommandTable::default();
        table.insert(entry("heal", 0, false));
        table.insert(entry("heal", 3, false));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("/", "heal").unwrap().min_privilege(), 3);
    }

    #[test]
    fn signatures_match_exactly() {
        let line = CommandLine::parse("/Heal 5", ["/"]).unwrap();
        assert_eq!(line.signature, "Heal");

        let mut table = CommandTable::default();
        table.insert(entry("heal", 0, false));
        assert!(table.get(&line.prefix, &line.signature).is_none());
        assert!(table.get("/", "heal").is_some());
    }
}
