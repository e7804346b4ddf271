//! In-memory host
//!
//! A self-contained host command table, raw input pipeline and sender,
//! used by the demo binary and by tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, error};

use crate::command_registry::errors::CommandError;
use crate::host::{
    CallerKind, CommandSender, HostCommand, HostCommandTable, RawInputEvent, RawInputObserver,
};

/// Reply sent when neither an observer nor the table claims a line
pub const UNKNOWN_COMMAND_MESSAGE: &str = "Unknown command. Type \"help\" for help.";

fn table_key(label: &str) -> String {
    label.trim().to_lowercase()
}

fn poisoned<E: std::fmt::Display>(err: E) -> CommandError {
    CommandError::host_unavailable(format!("command table lock poisoned: {}", err))
}

/// Split a command line into its label and arguments
pub fn split_command_line(line: &str) -> (String, Vec<String>) {
    let line = line.strip_prefix('/').unwrap_or(line);
    let mut parts = line.split_whitespace();
    let label = parts.next().unwrap_or_default().to_string();
    (label, parts.map(str::to_string).collect())
}

/// Label-keyed command table
#[derive(Default)]
pub struct MemoryCommandTable {
    known: RwLock<HashMap<String, Arc<HostCommand>>>,
}

impl MemoryCommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of labels, aliases included
    pub fn len(&self) -> usize {
        self.known.read().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a label and run its executor
    ///
    /// Returns `Ok(false)` when no live command answers to the label.
    pub fn dispatch(&self, sender: &dyn CommandSender, line: &str) -> anyhow::Result<bool> {
        let (label, args) = split_command_line(line);
        if label.is_empty() {
            return Ok(false);
        }
        match self.lookup(&label)? {
            Some(command) => command.execute(sender, &label, &args),
            None => Ok(false),
        }
    }

    /// Tab-complete a partial command line; empty when nothing answers
    pub fn complete(&self, sender: &dyn CommandSender, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.strip_prefix('/').unwrap_or(line);
        let mut parts: Vec<String> = line.split(' ').map(str::to_string).collect();
        let label = parts.remove(0);
        Ok(self
            .lookup(&label)?
            .and_then(|command| command.tab_complete(sender, &label, &parts))
            .unwrap_or_default())
    }
}

impl HostCommandTable for MemoryCommandTable {
    fn insert(&self, command: Arc<HostCommand>) -> Result<bool, CommandError> {
        let mut known = self.known.write().map_err(poisoned)?;
        let name = table_key(command.name());
        if name.is_empty() || known.contains_key(&name) {
            return Ok(false);
        }
        known.insert(name, command.clone());
        for alias in command.aliases() {
            let alias = table_key(alias);
            if !alias.is_empty() && !known.contains_key(&alias) {
                known.insert(alias, command.clone());
            }
        }
        Ok(true)
    }

    fn remove(&self, label: &str) -> Result<(), CommandError> {
        self.known.write().map_err(poisoned)?.remove(&table_key(label));
        Ok(())
    }

    fn lookup(&self, label: &str) -> Result<Option<Arc<HostCommand>>, CommandError> {
        Ok(self.known.read().map_err(poisoned)?.get(&table_key(label)).cloned())
    }

    fn entries(&self) -> Result<Vec<(String, Arc<HostCommand>)>, CommandError> {
        let known = self.known.read().map_err(poisoned)?;
        let mut entries: Vec<_> = known.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

/// What happened to a submitted line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// An observer marked the line handled
    Intercepted,
    /// The host table resolved and executed it
    Executed,
    /// Nothing answered
    Unknown,
}

/// Raw input stream: observers first, then host-table resolution
pub struct InputPipeline {
    table: Arc<MemoryCommandTable>,
    observers: RwLock<Vec<Arc<dyn RawInputObserver>>>,
}

impl InputPipeline {
    pub fn new(table: Arc<MemoryCommandTable>) -> Self {
        Self {
            table,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn table(&self) -> &Arc<MemoryCommandTable> {
        &self.table
    }

    /// Add an observer after every observer of equal or earlier priority
    pub fn add_observer(&self, observer: Arc<dyn RawInputObserver>) -> Result<(), CommandError> {
        let mut observers = self.observers.write().map_err(|err| {
            CommandError::host_unavailable(format!("observer list lock poisoned: {}", err))
        })?;
        let priority = observer.priority();
        let position = observers
            .iter()
            .position(|o| o.priority() > priority)
            .unwrap_or(observers.len());
        observers.insert(position, observer);
        Ok(())
    }

    /// Feed one raw line from `sender` through the pipeline
    pub fn submit(&self, sender: Arc<dyn CommandSender>, line: &str) -> anyhow::Result<InputOutcome> {
        let mut event = RawInputEvent::new(line, sender.clone());
        let observers = self
            .observers
            .read()
            .map(|o| o.clone())
            .map_err(|e| anyhow::anyhow!("observer list lock poisoned: {}", e))?;

        for observer in observers {
            if let Err(err) = observer.on_raw_input(&mut event) {
                let err = anyhow::Error::from(err);
                error!("Could not pass raw input '{}' to an observer: {:#}", line, err);
                return Err(err);
            }
        }

        if event.is_handled() {
            debug!("Raw input '{}' handled by an observer", line);
            return Ok(InputOutcome::Intercepted);
        }

        if self.table.dispatch(sender.as_ref(), line)? {
            Ok(InputOutcome::Executed)
        } else {
            sender.send_message(UNKNOWN_COMMAND_MESSAGE);
            Ok(InputOutcome::Unknown)
        }
    }
}

/// Sender that keeps every line it receives
pub struct BufferedSender {
    name: String,
    kind: CallerKind,
    lines: Mutex<Vec<String>>,
}

impl BufferedSender {
    pub fn new(name: &str, kind: CallerKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn interactive(name: &str) -> Self {
        Self::new(name, CallerKind::Interactive)
    }

    pub fn operator(name: &str) -> Self {
        Self::new(name, CallerKind::Operator)
    }

    /// Copy of every line received so far
    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Drain the received lines
    pub fn take_messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|mut l| std::mem::take(&mut *l))
            .unwrap_or_default()
    }
}

impl CommandSender for BufferedSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CallerKind {
        self.kind
    }

    fn send_message(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
