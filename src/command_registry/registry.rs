//! Command Registry Implementation
//!
//! Owns this application's view of the host command table: registers,
//! force-replaces and unregisters commands, and binds handlers either to
//! host-table entries or to the silent interceptor.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{error, info, warn};

use crate::command_registry::descriptor::Registration;
use crate::command_registry::errors::CommandError;
use crate::command_registry::handler::{
    BindingParts, CommandAction, CommandHandler, HandlerBinding, SimpleCommand,
};
use crate::command_registry::interceptor::SilentInterceptor;
use crate::config::CommandConfig;
use crate::host::{CommandExecutor, HostCommand, HostCommandTable};
use crate::logging::DispatchMonitor;

/// Outcome of binding a batch of handlers
#[derive(Debug, Default)]
pub struct BindReport {
    /// Type names of the handlers that were bound
    pub bound: Vec<String>,
    pub failures: Vec<CommandError>,
}

impl BindReport {
    /// Whether every handler in the batch was bound
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry that manages one owner's commands in the host table
pub struct CommandRegistry {
    owner: String,
    table: Arc<dyn HostCommandTable>,
    interceptor: Arc<SilentInterceptor>,
    handlers: RwLock<Vec<Arc<CommandHandler>>>,
    simple_executors: RwLock<Vec<Arc<dyn CommandExecutor>>>,
    monitor: Arc<DispatchMonitor>,
}

fn lock_poisoned<E: std::fmt::Display>(err: E) -> CommandError {
    CommandError::host_unavailable(format!("registry lock poisoned: {}", err))
}

impl CommandRegistry {
    /// Create a registry for `owner` on top of the host's table
    pub fn new(owner: &str, table: Arc<dyn HostCommandTable>) -> Self {
        Self::with_parts(
            owner,
            table,
            SilentInterceptor::new(owner),
            DispatchMonitor::default(),
        )
    }

    /// Create a registry using the owner, messages and thresholds from config
    pub fn from_config(config: &CommandConfig, table: Arc<dyn HostCommandTable>) -> Self {
        Self::with_parts(
            &config.owner,
            table,
            SilentInterceptor::new(&config.owner)
                .with_internal_error_message(config.internal_error_message.clone()),
            DispatchMonitor::new(config.slow_dispatch()),
        )
    }

    fn with_parts(
        owner: &str,
        table: Arc<dyn HostCommandTable>,
        interceptor: SilentInterceptor,
        monitor: DispatchMonitor,
    ) -> Self {
        Self {
            owner: owner.to_string(),
            table,
            interceptor: Arc::new(interceptor),
            handlers: RwLock::new(Vec::new()),
            simple_executors: RwLock::new(Vec::new()),
            monitor: Arc::new(monitor),
        }
    }

    /// Identity stamped on every command this registry registers
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The silent interceptor; hand it to the host's raw input stream
    pub fn silent_interceptor(&self) -> Arc<SilentInterceptor> {
        self.interceptor.clone()
    }

    /// Dispatch timings shared by every bound handler
    pub fn monitor(&self) -> Arc<DispatchMonitor> {
        self.monitor.clone()
    }

    /// Register a command in the host table
    ///
    /// A taken name fails with [`CommandError::Collision`] and leaves the
    /// table untouched, unless `force` is set, in which case every entry
    /// named `name` is removed first.
    pub fn register(&self, registration: &Registration) -> Result<Arc<HostCommand>, CommandError> {
        let name = registration.name.trim();
        if name.is_empty() {
            return Err(CommandError::invalid(
                "Command name cannot be empty or contain only whitespace",
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(CommandError::invalid(format!("Command name '{}' contains whitespace", name)));
        }

        let command = Arc::new(HostCommand::new(
            name,
            &self.owner,
            registration.description.as_deref(),
            registration.usage.as_deref(),
            &registration.aliases,
        ));

        if self.table.insert(command.clone())? {
            info!("Registered command '{}' for {}", name, self.owner);
            return Ok(command);
        }

        if !registration.force {
            warn!("Command '{}' is already registered, skipping", name);
            return Err(CommandError::collision(name));
        }

        let mut removed = self.unregister(name)?;
        if !self.table.insert(command.clone())? {
            if let Some(holder) = self.table.lookup(name)? {
                if holder.name().to_lowercase() == name.to_lowercase() {
                    // same command under different case: drop it with its aliases
                    removed += self.unregister(holder.name())?;
                } else {
                    // another command holds the label as an alias
                    self.table.remove(name)?;
                    removed += 1;
                }
            }
            if !self.table.insert(command.clone())? {
                return Err(CommandError::host_unavailable(format!(
                    "host refused to insert '{}' after clearing it",
                    name
                )));
            }
        }
        info!("Replaced command '{}' ({} entries removed)", name, removed);
        Ok(command)
    }

    /// Register every command declared in configuration, collecting failures
    pub fn register_declared(&self, registrations: &[Registration]) -> Vec<CommandError> {
        registrations
            .iter()
            .filter_map(|registration| self.register(registration).err())
            .collect()
    }

    /// Remove every host entry whose command is named exactly `name`
    ///
    /// Returns how many labels were removed.
    pub fn unregister(&self, name: &str) -> Result<usize, CommandError> {
        let doomed: Vec<String> = self
            .table
            .entries()?
            .into_iter()
            .filter(|(_, command)| command.name() == name)
            .map(|(label, _)| label)
            .collect();

        for label in &doomed {
            self.table.remove(label)?;
        }
        if !doomed.is_empty() {
            info!("Unregistered command '{}' ({} labels)", name, doomed.len());
        }
        Ok(doomed.len())
    }

    /// Construct and bind a single handler
    ///
    /// Host names registered on the handler's behalf are unregistered
    /// again if binding fails.
    pub fn add_handler(&self, binding: HandlerBinding) -> Result<Arc<CommandHandler>, CommandError> {
        let BindingParts {
            type_name,
            type_id,
            descriptor,
            registrations,
            factory,
        } = binding.into_parts();

        let descriptor = descriptor.map_err(|err| CommandError::bind_failed(type_name, err.to_string()))?;
        let action = factory().map_err(|err| CommandError::bind_failed(type_name, format!("{:#}", err)))?;
        let handler = Arc::new(
            CommandHandler::from_parts(descriptor, action, type_id, type_name)
                .with_monitor(self.monitor.clone()),
        );

        let mut claimed = Vec::new();
        if let Err(err) = self.claim_and_bind(&handler, &registrations, &mut claimed) {
            self.release(type_name, &claimed);
            return Err(err);
        }

        self.handlers.write().map_err(lock_poisoned)?.push(handler.clone());
        info!(
            "Bound {} to {:?}{}",
            type_name,
            handler.names(),
            if handler.is_silent() { " (silent)" } else { "" }
        );
        Ok(handler)
    }

    fn claim_and_bind(
        &self,
        handler: &Arc<CommandHandler>,
        registrations: &[Registration],
        claimed: &mut Vec<String>,
    ) -> Result<(), CommandError> {
        let type_name = handler.type_name();
        for registration in registrations
            .iter()
            .filter(|registration| handler.is_applicable(registration.name.trim()))
        {
            match self.register(registration) {
                Ok(command) => claimed.push(command.name().to_string()),
                Err(CommandError::Collision(name)) => {
                    warn!("{} could not claim '{}': already registered", type_name, name);
                }
                Err(err @ CommandError::HostIntegration(_)) => return Err(err),
                Err(err) => return Err(CommandError::bind_failed(type_name, err.to_string())),
            }
        }

        if handler.is_silent() {
            return self.interceptor.add_silent_handler(handler.clone());
        }

        let mut targets = Vec::with_capacity(handler.names().len());
        for name in handler.names() {
            match self.table.lookup(name)? {
                Some(command) if command.owner() == self.owner => targets.push(command),
                Some(command) => {
                    return Err(CommandError::bind_failed(
                        type_name,
                        format!("command '{}' belongs to {}", name, command.owner()),
                    ))
                }
                None => {
                    return Err(CommandError::bind_failed(
                        type_name,
                        format!("command '{}' is not registered", name),
                    ))
                }
            }
        }
        let executor: Arc<dyn CommandExecutor> = handler.clone();
        for command in targets {
            command.set_executor(Arc::downgrade(&executor))?;
        }
        Ok(())
    }

    /// Undo registrations made for a handler that failed to bind
    fn release(&self, type_name: &str, claimed: &[String]) {
        for name in claimed {
            if let Err(err) = self.unregister(name) {
                warn!("{} could not release '{}': {}", type_name, name, err);
            }
        }
    }

    /// Construct and bind every handler
    ///
    /// A handler that cannot be built or bound is recorded in the report
    /// and the rest still get their chance. Only host failures abort.
    pub fn add_handlers(
        &self,
        bindings: impl IntoIterator<Item = HandlerBinding>,
    ) -> Result<BindReport, CommandError> {
        let mut report = BindReport::default();
        for binding in bindings {
            let type_name = binding.type_name();
            match self.add_handler(binding) {
                Ok(_) => report.bound.push(type_name.to_string()),
                Err(err) if err.is_recoverable() => {
                    error!("{}", err);
                    report.failures.push(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    /// Register a bare command backed by closures
    ///
    /// Returns `Ok(None)` if the name is taken and `force` is not set.
    pub fn add_simple_command(
        &self,
        registration: &Registration,
        command: SimpleCommand,
    ) -> Result<Option<Arc<HostCommand>>, CommandError> {
        let host_command = match self.register(registration) {
            Ok(host_command) => host_command,
            Err(CommandError::Collision(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let executor: Arc<dyn CommandExecutor> = Arc::new(command);
        host_command.set_executor(Arc::downgrade(&executor))?;
        self.simple_executors.write().map_err(lock_poisoned)?.push(executor);
        Ok(Some(host_command))
    }

    /// First bound handler whose action is a `T`
    pub fn handler<T: CommandAction>(&self) -> Option<Arc<CommandHandler>> {
        self.handlers
            .read()
            .ok()?
            .iter()
            .find(|handler| handler.is_type::<T>())
            .cloned()
    }

    /// Copy of the bound handler list
    pub fn handlers(&self) -> Vec<Arc<CommandHandler>> {
        self.handlers.read().map(|h| h.clone()).unwrap_or_default()
    }

    /// Point-in-time copy of the host table
    pub fn snapshot(&self) -> Result<HashMap<String, Arc<HostCommand>>, CommandError> {
        Ok(self.table.entries()?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_registry::descriptor::{CapabilityGroup, HandlerDescriptor};
    use crate::command_registry::handler::{HandlerType, Invocation};
    use crate::host::{BufferedSender, MemoryCommandTable};

    struct Ping;

    impl CommandAction for Ping {
        fn perform(&self, invocation: &Invocation<'_>) -> anyhow::Result<()> {
            invocation.sender.send_message("pong");
            Ok(())
        }
    }

    impl HandlerType for Ping {
        fn descriptor() -> Result<HandlerDescriptor, CommandError> {
            HandlerDescriptor::builder(["ping"]).build()
        }

        fn registrations() -> Vec<Registration> {
            vec![
                Registration::new("ping").description("Replies with pong"),
                Registration::new("unrelated"),
            ]
        }

        fn create() -> anyhow::Result<Self> {
            Ok(Ping)
        }
    }

    struct Broken;

    impl CommandAction for Broken {
        fn perform(&self, _invocation: &Invocation<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl HandlerType for Broken {
        fn descriptor() -> Result<HandlerDescriptor, CommandError> {
            HandlerDescriptor::builder(["broken"]).build()
        }

        fn create() -> anyhow::Result<Self> {
            anyhow::bail!("missing configuration")
        }
    }

    struct Pair;

    impl CommandAction for Pair {
        fn perform(&self, _invocation: &Invocation<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl HandlerType for Pair {
        fn descriptor() -> Result<HandlerDescriptor, CommandError> {
            HandlerDescriptor::builder(["a", "b"]).build()
        }

        fn registrations() -> Vec<Registration> {
            vec![Registration::new("a")]
        }

        fn create() -> anyhow::Result<Self> {
            Ok(Pair)
        }
    }

    /// Host whose command table cannot be reached
    struct UnreachableTable;

    impl HostCommandTable for UnreachableTable {
        fn insert(&self, _command: Arc<HostCommand>) -> Result<bool, CommandError> {
            Err(CommandError::host_unavailable("down"))
        }

        fn remove(&self, _label: &str) -> Result<(), CommandError> {
            Err(CommandError::host_unavailable("down"))
        }

        fn lookup(&self, _label: &str) -> Result<Option<Arc<HostCommand>>, CommandError> {
            Err(CommandError::host_unavailable("down"))
        }

        fn entries(&self) -> Result<Vec<(String, Arc<HostCommand>)>, CommandError> {
            Err(CommandError::host_unavailable("down"))
        }
    }

    fn registry() -> (CommandRegistry, Arc<MemoryCommandTable>) {
        let table = Arc::new(MemoryCommandTable::new());
        (CommandRegistry::new("demo", table.clone()), table)
    }

    #[test]
    fn test_register_returns_inserted_entry() {
        let (registry, table) = registry();
        let command = registry
            .register(&Registration::new("warp").description("Teleport").aliases(["w"]))
            .unwrap();
        assert_eq!(command.name(), "warp");
        assert_eq!(command.owner(), "demo");
        assert!(Arc::ptr_eq(&table.lookup("w").unwrap().unwrap(), &command));
    }

    #[test]
    fn test_register_rejects_blank_name() {
        let (registry, table) = registry();
        let err = registry.register(&Registration::new("  ")).unwrap_err();
        assert!(matches!(err, CommandError::InvalidDescriptor(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_force_replaces_alias_holder() {
        let (registry, table) = registry();
        registry.register(&Registration::new("teleport").aliases(["tp"])).unwrap();
        let tp = registry.register(&Registration::new("tp").force(true)).unwrap();
        assert!(Arc::ptr_eq(&table.lookup("tp").unwrap().unwrap(), &tp));
        assert_eq!(table.lookup("teleport").unwrap().unwrap().name(), "teleport");
    }

    #[test]
    fn test_force_replaces_same_name_in_other_case() {
        let (registry, table) = registry();
        let old = registry.register(&Registration::new("Warp").aliases(["w"])).unwrap();
        let new = registry.register(&Registration::new("warp").force(true)).unwrap();

        assert!(Arc::ptr_eq(&table.lookup("warp").unwrap().unwrap(), &new));
        assert!(table.lookup("w").unwrap().is_none());
        assert!(table.entries().unwrap().iter().all(|(_, c)| !Arc::ptr_eq(c, &old)));
    }

    #[test]
    fn test_unregister_removes_aliases_only_of_named_command() {
        let (registry, table) = registry();
        registry.register(&Registration::new("warp").aliases(["w", "go"])).unwrap();
        registry.register(&Registration::new("home")).unwrap();
        assert_eq!(registry.unregister("warp").unwrap(), 3);
        assert!(table.lookup("go").unwrap().is_none());
        assert!(table.lookup("home").unwrap().is_some());
        assert_eq!(registry.unregister("Home").unwrap(), 0);
    }

    #[test]
    fn test_add_handler_registers_only_own_names() {
        let (registry, table) = registry();
        let handler = registry.add_handler(HandlerBinding::of::<Ping>()).unwrap();
        assert!(table.lookup("unrelated").unwrap().is_none());

        let ping = table.lookup("ping").unwrap().unwrap();
        assert_eq!(ping.description(), "Replies with pong");
        assert!(ping.has_executor());

        let sender = BufferedSender::operator("console");
        assert!(table.dispatch(&sender, "ping").unwrap());
        assert_eq!(sender.messages(), vec!["pong".to_string()]);
        assert!(Arc::ptr_eq(&registry.handler::<Ping>().unwrap(), &handler));
        assert!(registry.handler::<Broken>().is_none());
    }

    #[test]
    fn test_bind_requires_registered_name() {
        let (registry, _) = registry();
        let descriptor = HandlerDescriptor::builder(["ghost"]).build().unwrap();
        let err = registry.add_handler(HandlerBinding::new(descriptor, Ping)).unwrap_err();
        assert!(matches!(err, CommandError::HandlerBind { .. }));
        assert!(registry.handlers().is_empty());
    }

    #[test]
    fn test_bind_refuses_foreign_command() {
        let table = Arc::new(MemoryCommandTable::new());
        let other = CommandRegistry::new("other", table.clone());
        other.register(&Registration::new("ping")).unwrap();

        let registry = CommandRegistry::new("demo", table.clone());
        let report = registry.add_handlers([HandlerBinding::of::<Ping>()]).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(!table.lookup("ping").unwrap().unwrap().has_executor());
    }

    #[test]
    fn test_failed_bind_releases_claimed_names() {
        let (registry, table) = registry();
        let report = registry.add_handlers([HandlerBinding::of::<Pair>()]).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], CommandError::HandlerBind { .. }));
        assert!(table.lookup("a").unwrap().is_none());
        assert!(table.is_empty());
        assert!(registry.handler::<Pair>().is_none());
    }

    #[test]
    fn test_unreachable_host_is_fatal() {
        let registry = CommandRegistry::new("demo", Arc::new(UnreachableTable));

        let err = registry.register(&Registration::new("ping")).unwrap_err();
        assert!(matches!(err, CommandError::HostIntegration(_)));
        assert!(!err.is_recoverable());
        assert!(matches!(registry.unregister("ping"), Err(CommandError::HostIntegration(_))));
        assert!(matches!(registry.snapshot(), Err(CommandError::HostIntegration(_))));

        let result = registry.add_handlers([HandlerBinding::of::<Ping>(), HandlerBinding::of::<Broken>()]);
        assert!(matches!(result, Err(CommandError::HostIntegration(_))));
        assert!(registry.handlers().is_empty());
    }

    #[test]
    fn test_failed_bind_does_not_stop_others() {
        let (registry, _) = registry();
        let report = registry
            .add_handlers([HandlerBinding::of::<Broken>(), HandlerBinding::of::<Ping>()])
            .unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.bound.len(), 1);
        assert!(matches!(report.failures[0], CommandError::HandlerBind { .. }));
        assert!(registry.handler::<Ping>().is_some());
    }

    #[test]
    fn test_malformed_descriptor_is_bind_failure() {
        let (registry, _) = registry();
        let descriptor = HandlerDescriptor::builder(["x"])
            .group(CapabilityGroup::Generic)
            .silent(true)
            .build();
        let report = registry
            .add_handlers([HandlerBinding::from_factory(descriptor, || Ok(Ping))])
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.bound.is_empty());
    }

    #[test]
    fn test_simple_command_collision_returns_none() {
        let (registry, table) = registry();
        let first = registry
            .add_simple_command(&Registration::new("hello"), SimpleCommand::new(|_| Ok(())))
            .unwrap();
        assert!(first.is_some());
        let second = registry
            .add_simple_command(&Registration::new("hello"), SimpleCommand::new(|_| Err(anyhow::anyhow!("no"))))
            .unwrap();
        assert!(second.is_none());

        let sender = BufferedSender::operator("console");
        assert!(table.dispatch(&sender, "hello").unwrap());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let (registry, table) = registry();
        registry.register(&Registration::new("a")).unwrap();
        let mut snapshot = registry.snapshot().unwrap();
        snapshot.remove("a");
        snapshot.insert("b".to_string(), Arc::new(HostCommand::new("b", "x", None, None, &[])));
        assert!(table.lookup("a").unwrap().is_some());
        assert!(table.lookup("b").unwrap().is_none());
    }
}
