//! Command handlers
//!
//! A [`CommandHandler`] wraps a concrete [`CommandAction`] with the policy
//! gate from its [`HandlerDescriptor`]: caller-group filtering and the
//! minimum argument count. The action only runs once both pass.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::command_registry::descriptor::{CapabilityGroup, HandlerDescriptor, Registration};
use crate::command_registry::errors::CommandError;
use crate::host::{CommandExecutor, CommandSender, HostCommand};
use crate::logging::{DispatchMonitor, Timer};

/// Placeholder in usage templates replaced by the invoked label
pub const COMMAND_PLACEHOLDER: &str = "<command>";

/// Everything a concrete action gets to see about one invocation
pub struct Invocation<'a> {
    pub sender: &'a dyn CommandSender,
    /// Absent when the command was intercepted silently
    pub command: Option<&'a HostCommand>,
    pub command_name: &'a str,
    pub label: &'a str,
    pub args: &'a [String],
}

/// The behaviour of a concrete command
pub trait CommandAction: Send + Sync + 'static {
    fn perform(&self, invocation: &Invocation<'_>) -> anyhow::Result<()>;

    /// Completion candidates; `None` lets the host supply defaults
    fn complete(&self, _invocation: &Invocation<'_>) -> Option<Vec<String>> {
        None
    }
}

/// A handler type that describes itself statically
pub trait HandlerType: CommandAction + Sized {
    fn descriptor() -> Result<HandlerDescriptor, CommandError>;

    /// Host-table names this type registers before binding
    fn registrations() -> Vec<Registration> {
        Vec::new()
    }

    fn create() -> anyhow::Result<Self>;
}

struct CallerFilter {
    group: CapabilityGroup,
    rejection: Vec<String>,
}

impl CallerFilter {
    fn from_descriptor(descriptor: &HandlerDescriptor) -> Self {
        Self {
            group: descriptor.group(),
            rejection: descriptor.rejection_msg().to_vec(),
        }
    }

    fn admits(&self, sender: &dyn CommandSender) -> bool {
        self.group.admits(sender.kind())
    }
}

/// A concrete action bound to its descriptor
pub struct CommandHandler {
    descriptor: HandlerDescriptor,
    filter: CallerFilter,
    action: Box<dyn CommandAction>,
    type_id: TypeId,
    type_name: &'static str,
    monitor: Option<Arc<DispatchMonitor>>,
}

impl CommandHandler {
    pub fn new<A: CommandAction>(descriptor: HandlerDescriptor, action: A) -> Self {
        Self::from_parts(descriptor, Box::new(action), TypeId::of::<A>(), type_name::<A>())
    }

    pub(crate) fn from_parts(
        descriptor: HandlerDescriptor,
        action: Box<dyn CommandAction>,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Self {
        Self {
            filter: CallerFilter::from_descriptor(&descriptor),
            descriptor,
            action,
            type_id,
            type_name,
            monitor: None,
        }
    }

    /// Record every performed dispatch into `monitor`
    pub fn with_monitor(mut self, monitor: Arc<DispatchMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    /// Lower-cased labels this handler answers to
    pub fn names(&self) -> &[String] {
        self.descriptor.names()
    }

    pub fn is_silent(&self) -> bool {
        self.descriptor.is_silent()
    }

    /// Type name of the concrete action
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_type<T: CommandAction>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Whether `label` is one of this handler's names
    pub fn is_applicable(&self, label: &str) -> bool {
        self.descriptor.answers_to(label)
    }

    /// Send the usage template line by line, if there is one
    pub fn send_usage(&self, sender: &dyn CommandSender, command: Option<&HostCommand>, label: &str) {
        let template = command
            .map(HostCommand::usage)
            .filter(|usage| !usage.is_empty())
            .or_else(|| self.descriptor.usage());
        if let Some(template) = template.filter(|usage| !usage.is_empty()) {
            for line in template.replace(COMMAND_PLACEHOLDER, label).split('\n') {
                sender.send_message(line);
            }
        }
    }

    /// Apply the policy gate and run the action
    ///
    /// Callers outside the handler's group get the rejection message, and
    /// too few arguments get the usage message. Both count as handled.
    pub fn dispatch(
        &self,
        sender: &dyn CommandSender,
        command: Option<&HostCommand>,
        command_name: &str,
        label: &str,
        args: &[String],
    ) -> anyhow::Result<()> {
        // group before argument count: a rejected caller never sees the usage text
        if !self.filter.admits(sender) {
            sender.send_lines(&self.filter.rejection);
            return Ok(());
        }
        if args.len() < self.descriptor.min_args() {
            self.send_usage(sender, command, label);
            return Ok(());
        }

        let invocation = Invocation {
            sender,
            command,
            command_name,
            label,
            args,
        };
        let timer = Timer::start(command_name, self.monitor.clone());
        let result = self.action.perform(&invocation);
        timer.stop(result.is_ok());
        result
    }

    /// Tab completion behind the same caller filter
    pub fn complete(
        &self,
        sender: &dyn CommandSender,
        command: Option<&HostCommand>,
        command_name: &str,
        label: &str,
        args: &[String],
    ) -> Option<Vec<String>> {
        if !self.filter.admits(sender) {
            return Some(Vec::new());
        }
        self.action.complete(&Invocation {
            sender,
            command,
            command_name,
            label,
            args,
        })
    }
}

impl CommandExecutor for CommandHandler {
    fn on_command(
        &self,
        sender: &dyn CommandSender,
        command: &HostCommand,
        label: &str,
        args: &[String],
    ) -> anyhow::Result<()> {
        self.dispatch(sender, Some(command), command.name(), label, args)
    }

    fn on_tab_complete(
        &self,
        sender: &dyn CommandSender,
        command: &HostCommand,
        label: &str,
        args: &[String],
    ) -> Option<Vec<String>> {
        self.complete(sender, Some(command), command.name(), label, args)
    }
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandler")
            .field("type_name", &self.type_name)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

type ActionFactory = Box<dyn FnOnce() -> anyhow::Result<Box<dyn CommandAction>> + Send>;

/// Everything needed to construct and bind one handler
pub struct HandlerBinding {
    type_name: &'static str,
    type_id: TypeId,
    descriptor: Result<HandlerDescriptor, CommandError>,
    registrations: Vec<Registration>,
    factory: ActionFactory,
}

pub(crate) struct BindingParts {
    pub type_name: &'static str,
    pub type_id: TypeId,
    pub descriptor: Result<HandlerDescriptor, CommandError>,
    pub registrations: Vec<Registration>,
    pub factory: ActionFactory,
}

impl HandlerBinding {
    /// Binding for a statically described handler type
    pub fn of<T: HandlerType>() -> Self {
        Self::from_factory(T::descriptor(), T::create).with_registrations(T::registrations())
    }

    /// Binding for an already constructed action
    pub fn new<A: CommandAction>(descriptor: HandlerDescriptor, action: A) -> Self {
        Self::from_factory(Ok(descriptor), move || Ok(action))
    }

    /// Binding whose action is built lazily when it is added
    pub fn from_factory<A, F>(descriptor: Result<HandlerDescriptor, CommandError>, factory: F) -> Self
    where
        A: CommandAction,
        F: FnOnce() -> anyhow::Result<A> + Send + 'static,
    {
        Self {
            type_name: type_name::<A>(),
            type_id: TypeId::of::<A>(),
            descriptor,
            registrations: Vec::new(),
            factory: Box::new(move || factory().map(|action| Box::new(action) as Box<dyn CommandAction>)),
        }
    }

    /// Host names to register before binding
    pub fn with_registrations(mut self, registrations: impl IntoIterator<Item = Registration>) -> Self {
        self.registrations.extend(registrations);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn into_parts(self) -> BindingParts {
        BindingParts {
            type_name: self.type_name,
            type_id: self.type_id,
            descriptor: self.descriptor,
            registrations: self.registrations,
            factory: self.factory,
        }
    }
}

type ActionFn = dyn Fn(&Invocation<'_>) -> anyhow::Result<()> + Send + Sync;
type CompleterFn = dyn Fn(&Invocation<'_>) -> Option<Vec<String>> + Send + Sync;

/// Ad-hoc executor/completer pair for commands without a descriptor
pub struct SimpleCommand {
    action: Box<ActionFn>,
    completer: Option<Box<CompleterFn>>,
}

impl SimpleCommand {
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            action: Box::new(action),
            completer: None,
        }
    }

    /// Attach a tab completer
    pub fn with_completer<F>(mut self, completer: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Option<Vec<String>> + Send + Sync + 'static,
    {
        self.completer = Some(Box::new(completer));
        self
    }
}

impl CommandExecutor for SimpleCommand {
    fn on_command(
        &self,
        sender: &dyn CommandSender,
        command: &HostCommand,
        label: &str,
        args: &[String],
    ) -> anyhow::Result<()> {
        (self.action)(&Invocation {
            sender,
            command: Some(command),
            command_name: command.name(),
            label,
            args,
        })
    }

    fn on_tab_complete(
        &self,
        sender: &dyn CommandSender,
        command: &HostCommand,
        label: &str,
        args: &[String],
    ) -> Option<Vec<String>> {
        let completer = self.completer.as_ref()?;
        completer(&Invocation {
            sender,
            command: Some(command),
            command_name: command.name(),
            label,
            args,
        })
    }
}
