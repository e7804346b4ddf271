//! Registry diagnostics
//!
//! Point-in-time report of what a registry has put into the host table,
//! which handlers it has bound and how they have been performing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command_registry::descriptor::CapabilityGroup;
use crate::command_registry::errors::CommandError;
use crate::command_registry::registry::CommandRegistry;

/// Host-table command owned by the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandSummary {
    pub name: String,
    pub labels: Vec<String>,
    pub description: String,
    pub usage: String,
    pub bound: bool,
}

/// One bound handler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerSummary {
    pub type_name: String,
    pub names: Vec<String>,
    pub group: CapabilityGroup,
    pub min_args: usize,
    pub silent: bool,
}

/// Dispatch statistics for one command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchSummary {
    pub command: String,
    pub count: usize,
    pub avg_micros: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryReport {
    pub generated_at: DateTime<Utc>,
    pub owner: String,
    pub commands: Vec<CommandSummary>,
    pub handlers: Vec<HandlerSummary>,
    pub silent_labels: Vec<String>,
    pub dispatch: Vec<DispatchSummary>,
}

impl RegistryReport {
    /// Snapshot the registry's commands, handlers and dispatch stats
    pub fn collect(registry: &CommandRegistry) -> Result<Self, CommandError> {
        let mut commands: Vec<CommandSummary> = Vec::new();
        let mut entries: Vec<_> = registry.snapshot()?.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (label, command) in entries {
            if command.owner() != registry.owner() {
                continue;
            }
            match commands.iter_mut().find(|c| c.name == command.name()) {
                Some(summary) => summary.labels.push(label),
                None => commands.push(CommandSummary {
                    name: command.name().to_string(),
                    labels: vec![label],
                    description: command.description().to_string(),
                    usage: command.usage().to_string(),
                    bound: command.has_executor(),
                }),
            }
        }
        commands.sort_by(|a, b| a.name.cmp(&b.name));

        let handlers = registry
            .handlers()
            .iter()
            .map(|handler| HandlerSummary {
                type_name: handler.type_name().to_string(),
                names: handler.names().to_vec(),
                group: handler.descriptor().group(),
                min_args: handler.descriptor().min_args(),
                silent: handler.is_silent(),
            })
            .collect();

        let silent_labels = registry
            .silent_interceptor()
            .silent_handlers()
            .iter()
            .flat_map(|handler| handler.names().to_vec())
            .collect();

        let dispatch = registry
            .monitor()
            .summary()
            .into_iter()
            .map(|stats| DispatchSummary {
                command: stats.command,
                count: stats.count,
                avg_micros: stats.avg_duration.as_micros() as u64,
                success_rate: stats.success_rate,
            })
            .collect();

        Ok(Self {
            generated_at: Utc::now(),
            owner: registry.owner().to_string(),
            commands,
            handlers,
            silent_labels,
            dispatch,
        })
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable lines, one per command and silent label
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("{} commands for {}:", self.commands.len(), self.owner)];
        for command in &self.commands {
            let description = if command.description.is_empty() {
                String::new()
            } else {
                format!(" - {}", command.description)
            };
            lines.push(format!("  {} [{}]{}", command.name, command.labels.join(", "), description));
        }
        for label in &self.silent_labels {
            lines.push(format!("  {} (silent)", label));
        }
        lines
    }
}
