//! Host Adapter
//!
//! The narrow boundary between the command registry and the application
//! that owns the shared command table and the raw input stream.

pub mod memory;

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use serde::{Deserialize, Serialize};

use crate::command_registry::errors::CommandError;

pub use memory::{BufferedSender, InputPipeline, MemoryCommandTable};

/// Capability group a caller belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CallerKind {
    /// An interactive end-user session
    Interactive,
    /// The non-interactive operator console
    Operator,
    /// Anything else (remote consoles, automation, ...)
    Other,
}

/// Someone who issues commands and receives messages
pub trait CommandSender: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> CallerKind;

    fn send_message(&self, line: &str);

    fn send_lines(&self, lines: &[String]) {
        for line in lines {
            self.send_message(line);
        }
    }
}

/// Structured command and tab-completion callbacks invoked by the host
pub trait CommandExecutor: Send + Sync {
    /// Handle a resolved command
    fn on_command(
        &self,
        sender: &dyn CommandSender,
        command: &HostCommand,
        label: &str,
        args: &[String],
    ) -> anyhow::Result<()>;

    /// Complete the last argument; `None` lets the host supply defaults
    fn on_tab_complete(
        &self,
        _sender: &dyn CommandSender,
        _command: &HostCommand,
        _label: &str,
        _args: &[String],
    ) -> Option<Vec<String>> {
        None
    }
}

/// One command in the host's shared command table
pub struct HostCommand {
    name: String,
    description: String,
    usage: String,
    aliases: Vec<String>,
    owner: String,
    executor: RwLock<Option<Weak<dyn CommandExecutor>>>,
}

impl HostCommand {
    pub fn new(
        name: &str,
        owner: &str,
        description: Option<&str>,
        usage: Option<&str>,
        aliases: &[String],
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.unwrap_or_default().to_string(),
            usage: usage.unwrap_or_default().to_string(),
            aliases: aliases
                .iter()
                .filter(|a| !a.trim().is_empty())
                .cloned()
                .collect(),
            owner: owner.to_string(),
            executor: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Identity of the application that registered this command
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Point this command at a new executor
    pub fn set_executor(&self, executor: Weak<dyn CommandExecutor>) -> Result<(), CommandError> {
        let mut slot = self.executor.write().map_err(|err| {
            CommandError::host_unavailable(format!("executor slot of '{}' poisoned: {}", self.name, err))
        })?;
        *slot = Some(executor);
        Ok(())
    }

    /// The bound executor, if it is still alive
    pub fn executor(&self) -> Option<Arc<dyn CommandExecutor>> {
        self.executor
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade))
    }

    pub fn has_executor(&self) -> bool {
        self.executor().is_some()
    }

    /// Run the bound executor. Returns `Ok(false)` when nothing is bound.
    pub fn execute(
        &self,
        sender: &dyn CommandSender,
        label: &str,
        args: &[String],
    ) -> anyhow::Result<bool> {
        match self.executor() {
            Some(executor) => {
                executor.on_command(sender, self, label, args)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ask the bound executor for completions
    pub fn tab_complete(
        &self,
        sender: &dyn CommandSender,
        label: &str,
        args: &[String],
    ) -> Option<Vec<String>> {
        self.executor()
            .and_then(|executor| executor.on_tab_complete(sender, self, label, args))
    }
}

impl fmt::Debug for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCommand")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("description", &self.description)
            .field("usage", &self.usage)
            .field("aliases", &self.aliases)
            .field("bound", &self.has_executor())
            .finish()
    }
}

/// Outbound operations on the host's shared command table
///
/// Implementations own the table; the registry only ever mutates it
/// through these calls.
pub trait HostCommandTable: Send + Sync {
    /// Insert a command under its name and any free aliases.
    /// Returns `Ok(false)` without changing anything if the name is taken.
    fn insert(&self, command: Arc<HostCommand>) -> Result<bool, CommandError>;

    /// Remove whatever is stored under `label`
    fn remove(&self, label: &str) -> Result<(), CommandError>;

    fn lookup(&self, label: &str) -> Result<Option<Arc<HostCommand>>, CommandError>;

    /// Every `(label, command)` pair, aliases included
    fn entries(&self) -> Result<Vec<(String, Arc<HostCommand>)>, CommandError>;
}

/// Raw input line observed before command resolution
pub struct RawInputEvent {
    message: String,
    sender: Arc<dyn CommandSender>,
    handled: bool,
}

impl RawInputEvent {
    pub fn new(message: impl Into<String>, sender: Arc<dyn CommandSender>) -> Self {
        Self {
            message: message.into(),
            sender,
            handled: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Who typed the line
    pub fn sender(&self) -> &Arc<dyn CommandSender> {
        &self.sender
    }

    /// Suppress the host's own processing of this input
    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }
}

/// Observation priority; `Lowest` observers see input first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObserverPriority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    Monitor,
}

/// Callback for raw input lines
pub trait RawInputObserver: Send + Sync {
    fn priority(&self) -> ObserverPriority {
        ObserverPriority::Normal
    }

    fn on_raw_input(&self, event: &mut RawInputEvent) -> Result<(), CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Echo {
        calls: Mutex<Vec<String>>,
    }

    impl CommandExecutor for Echo {
        fn on_command(
            &self,
            _sender: &dyn CommandSender,
            command: &HostCommand,
            label: &str,
            args: &[String],
        ) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}:{}", command.name(), label, args.join(",")));
            Ok(())
        }
    }

    #[test]
    fn test_command_without_executor_is_not_handled() {
        let command = HostCommand::new("foo", "demo", None, None, &[]);
        let sender = BufferedSender::operator("console");
        assert!(!command.execute(&sender, "foo", &[]).unwrap());
        assert_eq!(command.description(), "");
        assert_eq!(command.usage(), "");
    }

    #[test]
    fn test_executor_is_weak() {
        let command = HostCommand::new("foo", "demo", Some("desc"), None, &["".to_string(), "f".to_string()]);
        assert_eq!(command.aliases(), &["f".to_string()]);

        let echo: Arc<dyn CommandExecutor> = Arc::new(Echo { calls: Mutex::new(Vec::new()) });
        command.set_executor(Arc::downgrade(&echo)).unwrap();
        assert!(command.has_executor());

        let sender = BufferedSender::operator("console");
        assert!(command.execute(&sender, "f", &["a".to_string()]).unwrap());

        drop(echo);
        assert!(!command.has_executor());
        assert!(!command.execute(&sender, "f", &[]).unwrap());
    }

    #[test]
    fn test_poisoned_executor_slot_is_host_failure() {
        let command = Arc::new(HostCommand::new("foo", "demo", None, None, &[]));
        let holder = command.clone();
        let _ = std::thread::spawn(move || {
            let _slot = holder.executor.write().unwrap();
            panic!("poison the slot");
        })
        .join();

        let echo: Arc<dyn CommandExecutor> = Arc::new(Echo { calls: Mutex::new(Vec::new()) });
        let err = command.set_executor(Arc::downgrade(&echo)).unwrap_err();
        assert!(matches!(err, CommandError::HostIntegration(_)));
    }

    #[test]
    fn test_raw_input_event_handled_flag() {
        let sender: Arc<dyn CommandSender> = Arc::new(BufferedSender::interactive("alice"));
        let mut event = RawInputEvent::new("foo bar", sender);
        assert!(!event.is_handled());
        event.mark_handled();
        assert!(event.is_handled());
        assert_eq!(event.message(), "foo bar");
        assert_eq!(event.sender().name(), "alice");
    }

    #[test]
    fn test_priority_order() {
        assert!(ObserverPriority::Lowest < ObserverPriority::Normal);
        assert!(ObserverPriority::Highest < ObserverPriority::Monitor);
    }
}
