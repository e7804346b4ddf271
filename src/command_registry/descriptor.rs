//! Handler descriptors and extra registration declarations

use serde::{Deserialize, Serialize};

use crate::command_registry::errors::CommandError;
use crate::host::CallerKind;

pub const DEFAULT_INTERACTIVE_ONLY_MSG: &str = "This command can only be executed by players!";
pub const DEFAULT_OPERATOR_ONLY_MSG: &str = "This command can only be executed by a console!";

/// Which callers a handler acts for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum CapabilityGroup {
    /// Any caller
    #[default]
    Generic,
    /// Interactive end-user sessions only
    Interactive,
    /// The operator console only
    Operator,
}

impl CapabilityGroup {
    /// Whether a caller of `kind` belongs to this group
    pub fn admits(&self, kind: CallerKind) -> bool {
        match self {
            CapabilityGroup::Generic => true,
            CapabilityGroup::Interactive => kind == CallerKind::Interactive,
            CapabilityGroup::Operator => kind == CallerKind::Operator,
        }
    }
}

/// Declarative configuration of one handler, immutable once built
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HandlerDescriptor {
    names: Vec<String>,
    min_args: usize,
    group: CapabilityGroup,
    interactive_only_msg: Vec<String>,
    operator_only_msg: Vec<String>,
    usage: Option<String>,
    silent: bool,
}

impl HandlerDescriptor {
    /// Start a descriptor answering to `names`
    pub fn builder<I, S>(names: I) -> HandlerDescriptorBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HandlerDescriptorBuilder {
            names: names.into_iter().map(Into::into).collect(),
            min_args: 0,
            group: CapabilityGroup::Generic,
            interactive_only_msg: vec![DEFAULT_INTERACTIVE_ONLY_MSG.to_string()],
            operator_only_msg: vec![DEFAULT_OPERATOR_ONLY_MSG.to_string()],
            usage: None,
            silent: false,
        }
    }

    /// Lower-cased names, in declaration order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Fewest arguments the action accepts
    pub fn min_args(&self) -> usize {
        self.min_args
    }

    /// Callers admitted to the action
    pub fn group(&self) -> CapabilityGroup {
        self.group
    }

    pub fn interactive_only_msg(&self) -> &[String] {
        &self.interactive_only_msg
    }

    pub fn operator_only_msg(&self) -> &[String] {
        &self.operator_only_msg
    }

    /// Message for callers outside this descriptor's group
    pub fn rejection_msg(&self) -> &[String] {
        match self.group {
            CapabilityGroup::Generic => &[],
            CapabilityGroup::Interactive => &self.interactive_only_msg,
            CapabilityGroup::Operator => &self.operator_only_msg,
        }
    }

    /// Usage template used when no host entry is available
    pub fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn answers_to(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.names.iter().any(|name| *name == label)
    }
}

/// Builder for [`HandlerDescriptor`]
#[derive(Debug, Clone)]
pub struct HandlerDescriptorBuilder {
    names: Vec<String>,
    min_args: usize,
    group: CapabilityGroup,
    interactive_only_msg: Vec<String>,
    operator_only_msg: Vec<String>,
    usage: Option<String>,
    silent: bool,
}

impl HandlerDescriptorBuilder {
    pub fn min_args(mut self, min_args: usize) -> Self {
        self.min_args = min_args;
        self
    }

    pub fn group(mut self, group: CapabilityGroup) -> Self {
        self.group = group;
        self
    }

    pub fn interactive_only_msg<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interactive_only_msg = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn operator_only_msg<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operator_only_msg = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Usage template sent when no host entry supplies one
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Intercept from raw input instead of using the host table
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Validate and normalise the names
    pub fn build(self) -> Result<HandlerDescriptor, CommandError> {
        let mut names: Vec<String> = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                return Err(CommandError::invalid("command names cannot be empty or contain only whitespace"));
            }
            if name.chars().any(char::is_whitespace) {
                return Err(CommandError::invalid(format!("command name '{}' contains whitespace", name)));
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            return Err(CommandError::invalid("a handler must declare at least one name"));
        }
        if self.silent && self.group != CapabilityGroup::Interactive {
            return Err(CommandError::invalid(format!(
                "'{}' is silent but only interactive handlers can be silent",
                names[0]
            )));
        }

        Ok(HandlerDescriptor {
            names,
            min_args: self.min_args,
            group: self.group,
            interactive_only_msg: self.interactive_only_msg,
            operator_only_msg: self.operator_only_msg,
            usage: self.usage,
            silent: self.silent,
        })
    }
}

/// Extra host-table registration carried by a handler type or declared in config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Registration {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Replace an existing command with the same name
    #[serde(default)]
    pub force: bool,
}

impl Registration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Replace whatever already holds the name
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}
