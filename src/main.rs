//! Interactive console over an in-memory host.
//!
//! Reads command lines from stdin. A line starting with `@name ` is
//! submitted by the interactive caller `name`, anything else by the
//! console operator.
//!
//! Usage: `command-forge [config.toml]`

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use anyhow::Context;
use log::{error, info, warn};

use command_forge::command_registry::{
    CapabilityGroup, CommandAction, CommandError, CommandRegistry, HandlerBinding,
    HandlerDescriptor, HandlerType, Invocation, Registration, RegistryReport, SimpleCommand,
};
use command_forge::config::CommandConfig;
use command_forge::host::{BufferedSender, CommandSender, InputPipeline, MemoryCommandTable};
use command_forge::logging::{init_logging, parse_level};

/// Lists every command the registry owns
struct Help {
    registry: Weak<CommandRegistry>,
}

impl CommandAction for Help {
    fn perform(&self, invocation: &Invocation<'_>) -> anyhow::Result<()> {
        let registry = self
            .registry
            .upgrade()
            .context("registry has been shut down")?;
        let report = RegistryReport::collect(&registry)?;
        invocation.sender.send_lines(&report.to_lines());
        Ok(())
    }
}

/// Operator-only broadcast to the console log
struct Broadcast;

impl CommandAction for Broadcast {
    fn perform(&self, invocation: &Invocation<'_>) -> anyhow::Result<()> {
        let message = invocation.args.join(" ");
        info!("[broadcast] {}: {}", invocation.sender.name(), message);
        invocation.sender.send_message(&format!("Broadcast sent: {}", message));
        Ok(())
    }

    fn complete(&self, invocation: &Invocation<'_>) -> Option<Vec<String>> {
        match invocation.args.len() {
            0 | 1 => Some(vec!["Server restarting soon".to_string()]),
            _ => None,
        }
    }
}

impl HandlerType for Broadcast {
    fn descriptor() -> Result<HandlerDescriptor, CommandError> {
        HandlerDescriptor::builder(["broadcast"])
            .group(CapabilityGroup::Operator)
            .min_args(1)
            .build()
    }

    fn registrations() -> Vec<Registration> {
        vec![Registration::new("broadcast")
            .description("Announce a message")
            .usage("/<command> <message...>")
            .aliases(["bc"])]
    }

    fn create() -> anyhow::Result<Self> {
        Ok(Broadcast)
    }
}

/// Private note that never reaches the host table
struct Whisper;

impl CommandAction for Whisper {
    fn perform(&self, invocation: &Invocation<'_>) -> anyhow::Result<()> {
        invocation.sender.send_message(&format!(
            "(only you can see this) {}",
            invocation.args.join(" ")
        ));
        Ok(())
    }
}

impl HandlerType for Whisper {
    fn descriptor() -> Result<HandlerDescriptor, CommandError> {
        HandlerDescriptor::builder(["whisper", "w"])
            .group(CapabilityGroup::Interactive)
            .min_args(1)
            .usage("/<command> <message...>")
            .silent(true)
            .build()
    }

    fn create() -> anyhow::Result<Self> {
        Ok(Whisper)
    }
}

fn load_config() -> anyhow::Result<CommandConfig> {
    match std::env::args().nth(1) {
        Some(path) => CommandConfig::load(&path),
        None => Ok(CommandConfig::default()),
    }
}

fn caller_for(line: &str, console: &Arc<BufferedSender>) -> (Arc<BufferedSender>, String) {
    if let Some(rest) = line.strip_prefix('@') {
        if let Some((name, command)) = rest.split_once(' ') {
            return (Arc::new(BufferedSender::interactive(name)), command.to_string());
        }
    }
    (console.clone(), line.to_string())
}

fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_logging(parse_level(&config.log_level));

    let table = Arc::new(MemoryCommandTable::new());
    let pipeline = InputPipeline::new(table.clone());
    let registry = Arc::new(CommandRegistry::from_config(&config, table.clone()));

    for failure in registry.register_declared(&config.commands) {
        warn!("Skipping declared command: {}", failure);
    }

    registry.register(&Registration::new("help").description("List commands").aliases(["?"]).force(true))?;
    let report = registry.add_handlers([
        HandlerBinding::new(
            HandlerDescriptor::builder(["help"]).build()?,
            Help {
                registry: Arc::downgrade(&registry),
            },
        ),
        HandlerBinding::of::<Broadcast>(),
        HandlerBinding::of::<Whisper>(),
    ])?;
    for failure in &report.failures {
        error!("Handler not bound: {}", failure);
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    registry.add_simple_command(
        &Registration::new("stop").description("Shut down the console"),
        SimpleCommand::new(move |invocation| {
            invocation.sender.send_message("Stopping");
            flag.store(false, Ordering::SeqCst);
            Ok(())
        }),
    )?;

    pipeline.add_observer(registry.silent_interceptor())?;
    info!("{} ready with {} handlers", registry.owner(), report.bound.len());

    let console = Arc::new(BufferedSender::operator("console"));
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (sender, command) = caller_for(line, &console);
        if let Err(err) = pipeline.submit(sender.clone(), &command) {
            error!("{:#}", err);
        }
        for message in sender.take_messages() {
            writeln!(stdout, "[{}] {}", sender.name(), message)?;
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }
    }

    if let Ok(json) = RegistryReport::collect(&registry)?.to_json() {
        info!("Final registry state:\n{}", json);
    }
    Ok(())
}
