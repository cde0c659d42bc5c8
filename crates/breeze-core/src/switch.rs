//! Per-chat feature switches.
//!
//! A switch record says whether one module is enabled in one [`Scope`].
//! Absent records read as disabled; toggling an absent record enables it.
//!
//! ```text
//! SwitchTable
//! ├── "group:123"  → { "weather": true, "dice": false }
//! ├── "group:456"  → { "weather": true }
//! └── "private"    → { "dice": true }
//! ```
//!
//! Two backends ship here: [`MemorySwitchStore`] and the JSON file backed
//! [`JsonFileSwitchStore`]. [`Switched`] gates a handler on its switch and
//! [`SwitchCommand`] exposes the store to operators in chat.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bot::Bot;
use crate::error::{HandlerResult, SwitchError, SwitchResult};
use crate::event::{Event, EventKind, MessageEvent, Route};
use crate::handler::Handler;

/// Where a switch applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One group chat.
    Group(i64),
    /// All private chats.
    Private,
}

impl Scope {
    fn key(self) -> String {
        match self {
            Self::Group(group_id) => format!("group:{group_id}"),
            Self::Private => "private".to_string(),
        }
    }

    /// The scope an event falls under, if any.
    ///
    /// Messages map by chat kind; notices and requests map to their group
    /// when they carry one, otherwise to [`Scope::Private`]. Meta events and
    /// responses have no scope.
    pub fn of(event: &Event) -> Option<Self> {
        match &event.kind {
            EventKind::Message(msg) => Some(Self::of_message(msg)),
            EventKind::Notice(notice) => {
                Some(notice.group_id.map_or(Self::Private, Self::Group))
            }
            EventKind::Request(request) => {
                Some(request.group_id.map_or(Self::Private, Self::Group))
            }
            EventKind::Meta(_) | EventKind::Response(_) => None,
        }
    }

    fn of_message(msg: &MessageEvent) -> Self {
        match msg.group_id {
            Some(group_id) if msg.is_group() => Self::Group(group_id),
            _ => Self::Private,
        }
    }
}

/// Outcome of [`SwitchStore::copy_group`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Records whose value changed in the target.
    pub copied: usize,
    /// Records that already matched.
    pub unchanged: usize,
}

/// A switch backend.
pub trait SwitchStore: Send + Sync {
    /// Whether `module` is enabled in `scope`.
    fn is_enabled(&self, scope: Scope, module: &str) -> bool;

    /// Flips the switch and returns the new value.
    fn toggle(&self, scope: Scope, module: &str) -> SwitchResult<bool>;

    /// Modules enabled in `group_id`, sorted.
    fn enabled_modules(&self, group_id: i64) -> Vec<String>;

    /// Groups in which `module` is enabled, sorted.
    fn enabled_groups(&self, module: &str) -> Vec<i64>;

    /// Copies every switch record of `source` into `target`.
    fn copy_group(&self, source: i64, target: i64) -> SwitchResult<CopyReport>;
}

// =============================================================================
// Table
// =============================================================================

/// The switch records shared by both backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchTable {
    scopes: BTreeMap<String, BTreeMap<String, bool>>,
}

impl SwitchTable {
    fn get(&self, scope: Scope, module: &str) -> bool {
        self.scopes
            .get(&scope.key())
            .and_then(|modules| modules.get(module))
            .copied()
            .unwrap_or(false)
    }

    fn toggle(&mut self, scope: Scope, module: &str) -> bool {
        let value = self
            .scopes
            .entry(scope.key())
            .or_default()
            .entry(module.to_string())
            .or_insert(false);
        *value = !*value;
        *value
    }

    fn enabled_modules(&self, group_id: i64) -> Vec<String> {
        self.scopes
            .get(&Scope::Group(group_id).key())
            .map(|modules| {
                modules
                    .iter()
                    .filter(|(_, enabled)| **enabled)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn enabled_groups(&self, module: &str) -> Vec<i64> {
        let mut groups: Vec<i64> = self
            .scopes
            .iter()
            .filter(|(_, modules)| modules.get(module).copied().unwrap_or(false))
            .filter_map(|(key, _)| key.strip_prefix("group:")?.parse().ok())
            .collect();
        groups.sort_unstable();
        groups
    }

    fn copy_group(&mut self, source: i64, target: i64) -> CopyReport {
        let mut report = CopyReport::default();
        let Some(records) = self.scopes.get(&Scope::Group(source).key()).cloned() else {
            return report;
        };
        let dest = self.scopes.entry(Scope::Group(target).key()).or_default();
        for (module, enabled) in records {
            if dest.insert(module, enabled) == Some(enabled) {
                report.unchanged += 1;
            } else {
                report.copied += 1;
            }
        }
        report
    }
}

// =============================================================================
// Backends
// =============================================================================

/// Switches held in memory only.
#[derive(Debug, Default)]
pub struct MemorySwitchStore {
    table: RwLock<SwitchTable>,
}

impl MemorySwitchStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwitchStore for MemorySwitchStore {
    fn is_enabled(&self, scope: Scope, module: &str) -> bool {
        self.table.read().get(scope, module)
    }

    fn toggle(&self, scope: Scope, module: &str) -> SwitchResult<bool> {
        Ok(self.table.write().toggle(scope, module))
    }

    fn enabled_modules(&self, group_id: i64) -> Vec<String> {
        self.table.read().enabled_modules(group_id)
    }

    fn enabled_groups(&self, module: &str) -> Vec<i64> {
        self.table.read().enabled_groups(module)
    }

    fn copy_group(&self, source: i64, target: i64) -> SwitchResult<CopyReport> {
        Ok(self.table.write().copy_group(source, target))
    }
}

/// Switches persisted to a JSON file after every change.
#[derive(Debug)]
pub struct JsonFileSwitchStore {
    path: PathBuf,
    table: RwLock<SwitchTable>,
}

impl JsonFileSwitchStore {
    /// Loads the store from `path`, starting empty if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> SwitchResult<Self> {
        let path = path.into();
        let table = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str(&data).map_err(|e| SwitchError::Corrupt(e.to_string()))?
        } else {
            SwitchTable::default()
        };
        debug!(path = %path.display(), "Opened switch store");
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, table: &SwitchTable) -> SwitchResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data =
            serde_json::to_string_pretty(table).map_err(|e| SwitchError::Corrupt(e.to_string()))?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    /// Applies `change`, writing the table back. Memory is left untouched
    /// if the write fails.
    fn update<T>(&self, change: impl FnOnce(&mut SwitchTable) -> T) -> SwitchResult<T> {
        let mut table = self.table.write();
        let mut next = table.clone();
        let out = change(&mut next);
        self.save(&next)?;
        *table = next;
        Ok(out)
    }
}

impl SwitchStore for JsonFileSwitchStore {
    fn is_enabled(&self, scope: Scope, module: &str) -> bool {
        self.table.read().get(scope, module)
    }

    fn toggle(&self, scope: Scope, module: &str) -> SwitchResult<bool> {
        self.update(|table| table.toggle(scope, module))
    }

    fn enabled_modules(&self, group_id: i64) -> Vec<String> {
        self.table.read().enabled_modules(group_id)
    }

    fn enabled_groups(&self, module: &str) -> Vec<i64> {
        self.table.read().enabled_groups(module)
    }

    fn copy_group(&self, source: i64, target: i64) -> SwitchResult<CopyReport> {
        self.update(|table| table.copy_group(source, target))
    }
}

// =============================================================================
// Gate
// =============================================================================

/// Runs the wrapped handler only where `module` is switched on.
///
/// Events without a [`Scope`] (meta events, responses) always pass.
pub struct Switched<H> {
    module: String,
    inner: H,
    store: Arc<dyn SwitchStore>,
}

impl<H: Handler> Switched<H> {
    /// Gates `inner` on the switch named `module`.
    pub fn new(module: impl Into<String>, inner: H, store: Arc<dyn SwitchStore>) -> Self {
        Self {
            module: module.into(),
            inner,
            store,
        }
    }
}

#[async_trait]
impl<H: Handler> Handler for Switched<H> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn accepts(&self, route: Route) -> bool {
        self.inner.accepts(route)
    }

    async fn handle(&self, bot: &Bot, event: &Event) -> HandlerResult {
        if let Some(scope) = Scope::of(event)
            && !self.store.is_enabled(scope, &self.module)
        {
            return Ok(());
        }
        self.inner.handle(bot, event).await
    }
}

// =============================================================================
// Chat commands
// =============================================================================

const QUERY_COMMAND: &str = "switch";
const COPY_COMMAND: &str = "复制开关";

/// Chat commands over a [`SwitchStore`].
///
/// | Where | Text | Who |
/// |-------|------|-----|
/// | group | `switch` | operator or group admin: list enabled modules |
/// | group | `switch <module>` | operator or group admin: toggle |
/// | group | `复制开关 <group>` | operator: copy from another group, others are refused |
/// | private | `复制开关 <from> <to>` | operator: copy between groups |
pub struct SwitchCommand {
    store: Arc<dyn SwitchStore>,
    operators: Vec<i64>,
}

impl SwitchCommand {
    /// Creates the command handler.
    pub fn new(store: Arc<dyn SwitchStore>, operators: Vec<i64>) -> Self {
        Self { store, operators }
    }

    fn is_operator(&self, user_id: i64) -> bool {
        self.operators.contains(&user_id)
    }

    async fn on_group(
        &self,
        bot: &Bot,
        msg: &MessageEvent,
        group_id: i64,
        args: &[&str],
    ) -> HandlerResult {
        let privileged = self.is_operator(msg.user_id) || msg.sender.is_group_admin();
        match args {
            [QUERY_COMMAND] if privileged => {
                let modules = self.store.enabled_modules(group_id);
                let text = if modules.is_empty() {
                    "No modules are enabled in this group.".to_string()
                } else {
                    format!("Enabled modules:\n{}", modules.join("\n"))
                };
                bot.reply(msg, &text).await?;
            }
            [QUERY_COMMAND, module] if privileged => {
                let enabled = self.store.toggle(Scope::Group(group_id), module)?;
                info!(group_id, module = %module, enabled, "Switch toggled");
                let state = if enabled { "on" } else { "off" };
                bot.reply(msg, &format!("{module} is now {state}.")).await?;
            }
            [COPY_COMMAND, source] if self.is_operator(msg.user_id) => {
                let Some(source) = parse_group_id(source) else {
                    bot.reply(msg, "Group id must be numeric.").await?;
                    return Ok(());
                };
                if source == group_id {
                    bot.reply(msg, "Source and target are the same group.").await?;
                    return Ok(());
                }
                self.copy(bot, msg, source, group_id).await?;
            }
            [COPY_COMMAND, _] => {
                debug!(user_id = msg.user_id, "Refusing switch copy from non-operator");
                bot.reply(msg, "Only operators can copy switches.").await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_private(&self, bot: &Bot, msg: &MessageEvent, args: &[&str]) -> HandlerResult {
        let [COPY_COMMAND, source, target] = args else {
            return Ok(());
        };
        if !self.is_operator(msg.user_id) {
            debug!(user_id = msg.user_id, "Ignoring switch copy from non-operator");
            return Ok(());
        }
        let (Some(source), Some(target)) = (parse_group_id(source), parse_group_id(target)) else {
            bot.reply(msg, "Group ids must be numeric.").await?;
            return Ok(());
        };
        if source == target {
            bot.reply(msg, "Source and target are the same group.").await?;
            return Ok(());
        }
        self.copy(bot, msg, source, target).await
    }

    async fn copy(&self, bot: &Bot, msg: &MessageEvent, source: i64, target: i64) -> HandlerResult {
        let report = self.store.copy_group(source, target)?;
        info!(
            source,
            target,
            copied = report.copied,
            unchanged = report.unchanged,
            "Switches copied"
        );
        let text = format!(
            "Copied switches from {source} to {target}: {} changed, {} unchanged.",
            report.copied, report.unchanged
        );
        bot.reply(msg, &text).await?;
        Ok(())
    }
}

fn parse_group_id(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[async_trait]
impl Handler for SwitchCommand {
    fn name(&self) -> &str {
        "switch"
    }

    fn accepts(&self, route: Route) -> bool {
        matches!(route, Route::GroupMessage | Route::PrivateMessage)
    }

    async fn handle(&self, bot: &Bot, event: &Event) -> HandlerResult {
        let Some(msg) = event.as_message() else {
            return Ok(());
        };
        let text = msg.plain_text();
        let args: Vec<&str> = text.split_whitespace().collect();
        match Scope::of_message(msg) {
            Scope::Group(group_id) => self.on_group(bot, msg, group_id, &args).await,
            Scope::Private => self.on_private(bot, msg, &args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::tasks::TaskTracker;
    use crate::transport::{ConnectionHandle, Outbound};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_bot() -> (Bot, Outbound) {
        let (handle, outbound) = ConnectionHandle::channel(16);
        (Bot::new(handle, Arc::new(TaskTracker::new())), outbound)
    }

    fn group_message(group_id: i64, user_id: i64, role: &str, text: &str) -> Event {
        Event::from_value(json!({
            "time": 1, "self_id": 10, "post_type": "message", "message_type": "group",
            "message_id": 1, "group_id": group_id, "user_id": user_id,
            "message": text, "sender": {"user_id": user_id, "role": role},
        }))
        .unwrap()
    }

    fn private_message(user_id: i64, text: &str) -> Event {
        Event::from_value(json!({
            "time": 1, "self_id": 10, "post_type": "message", "message_type": "private",
            "message_id": 2, "user_id": user_id, "message": text,
        }))
        .unwrap()
    }

    fn reply_text(frame: &Value) -> &str {
        frame["params"]["message"][1]["data"]["text"].as_str().unwrap()
    }

    async fn next_frame(outbound: &mut Outbound) -> Value {
        serde_json::from_slice(&outbound.frames.recv().await.unwrap()).unwrap()
    }

    #[test]
    fn test_absent_record_is_disabled_and_toggle_enables() {
        let store = MemorySwitchStore::new();
        assert!(!store.is_enabled(Scope::Group(1), "dice"));
        assert!(store.toggle(Scope::Group(1), "dice").unwrap());
        assert!(store.is_enabled(Scope::Group(1), "dice"));
        assert!(!store.is_enabled(Scope::Private, "dice"));
        assert!(!store.toggle(Scope::Group(1), "dice").unwrap());
        assert!(!store.is_enabled(Scope::Group(1), "dice"));
    }

    #[test]
    fn test_queries() {
        let store = MemorySwitchStore::new();
        store.toggle(Scope::Group(2), "weather").unwrap();
        store.toggle(Scope::Group(1), "weather").unwrap();
        store.toggle(Scope::Group(1), "dice").unwrap();
        store.toggle(Scope::Private, "weather").unwrap();
        store.toggle(Scope::Group(3), "weather").unwrap();
        store.toggle(Scope::Group(3), "weather").unwrap();

        assert_eq!(store.enabled_modules(1), vec!["dice", "weather"]);
        assert_eq!(store.enabled_groups("weather"), vec![1, 2]);
        assert!(store.enabled_modules(99).is_empty());
    }

    #[test]
    fn test_copy_group_counts() {
        let store = MemorySwitchStore::new();
        store.toggle(Scope::Group(1), "a").unwrap();
        store.toggle(Scope::Group(1), "b").unwrap();
        store.toggle(Scope::Group(2), "a").unwrap();

        let report = store.copy_group(1, 2).unwrap();
        assert_eq!(report, CopyReport { copied: 1, unchanged: 1 });
        assert_eq!(store.enabled_modules(2), vec!["a", "b"]);

        assert_eq!(store.copy_group(7, 2).unwrap(), CopyReport::default());
    }

    #[test]
    fn test_json_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("switches.json");

        let store = JsonFileSwitchStore::open(&path).unwrap();
        store.toggle(Scope::Group(5), "dice").unwrap();
        store.toggle(Scope::Private, "echo").unwrap();
        drop(store);

        let reopened = JsonFileSwitchStore::open(&path).unwrap();
        assert!(reopened.is_enabled(Scope::Group(5), "dice"));
        assert!(reopened.is_enabled(Scope::Private, "echo"));
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switches.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            JsonFileSwitchStore::open(&path),
            Err(SwitchError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_switched_gate() {
        let store: Arc<dyn SwitchStore> = Arc::new(MemorySwitchStore::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let gated = Switched::new(
            "dice",
            handler_fn("dice", move |_bot, _event| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            Arc::clone(&store),
        );
        let (bot, _outbound) = test_bot();
        let event = group_message(1, 2, "member", "roll");

        gated.handle(&bot, &event).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        store.toggle(Scope::Group(1), "dice").unwrap();
        gated.handle(&bot, &event).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(gated.name(), "dice");
    }

    #[tokio::test]
    async fn test_query_and_toggle_command() {
        let store: Arc<dyn SwitchStore> = Arc::new(MemorySwitchStore::new());
        let command = SwitchCommand::new(Arc::clone(&store), vec![]);
        let (bot, mut outbound) = test_bot();

        command
            .handle(&bot, &group_message(1, 2, "admin", "switch dice"))
            .await
            .unwrap();
        assert_eq!(reply_text(&next_frame(&mut outbound).await), "dice is now on.");

        command
            .handle(&bot, &group_message(1, 2, "owner", "switch"))
            .await
            .unwrap();
        assert!(reply_text(&next_frame(&mut outbound).await).contains("dice"));

        command
            .handle(&bot, &group_message(1, 3, "member", "switch dice"))
            .await
            .unwrap();
        assert!(outbound.frames.try_recv().is_err());
        assert!(store.is_enabled(Scope::Group(1), "dice"));
    }

    #[tokio::test]
    async fn test_copy_commands_are_operator_only() {
        let store: Arc<dyn SwitchStore> = Arc::new(MemorySwitchStore::new());
        store.toggle(Scope::Group(1), "dice").unwrap();
        let command = SwitchCommand::new(Arc::clone(&store), vec![42]);
        let (bot, mut outbound) = test_bot();

        command
            .handle(&bot, &group_message(2, 7, "owner", "复制开关 1"))
            .await
            .unwrap();
        assert!(reply_text(&next_frame(&mut outbound).await).contains("Only operators"));
        assert!(!store.is_enabled(Scope::Group(2), "dice"));

        command
            .handle(&bot, &group_message(2, 42, "member", "复制开关 2"))
            .await
            .unwrap();
        assert!(reply_text(&next_frame(&mut outbound).await).contains("same group"));

        command
            .handle(&bot, &group_message(2, 42, "member", "复制开关 abc"))
            .await
            .unwrap();
        assert!(reply_text(&next_frame(&mut outbound).await).contains("numeric"));

        command
            .handle(&bot, &group_message(2, 42, "member", "复制开关 1"))
            .await
            .unwrap();
        next_frame(&mut outbound).await;
        assert!(store.is_enabled(Scope::Group(2), "dice"));

        command
            .handle(&bot, &private_message(42, "复制开关 1 3"))
            .await
            .unwrap();
        let frame = next_frame(&mut outbound).await;
        assert_eq!(frame["action"], "send_private_msg");
        assert!(reply_text(&frame).contains("1 changed"));
        assert_eq!(store.enabled_groups("dice"), vec![1, 2, 3]);
    }
}
