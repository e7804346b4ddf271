//! Declarative command registration and dispatch over a host command table.
//!
//! Handlers describe themselves with a [`HandlerDescriptor`] and are bound
//! by a [`CommandRegistry`] either into the host's shared command table or
//! into the [`SilentInterceptor`], which claims matching raw input before
//! the host resolves it.

pub mod command_registry;
pub mod config;
pub mod host;
pub mod logging;

pub use command_registry::{
    BindReport, CapabilityGroup, CommandAction, CommandError, CommandHandler, CommandRegistry,
    HandlerBinding, HandlerDescriptor, HandlerType, Invocation, Registration, RegistryReport,
    SilentInterceptor, SimpleCommand,
};
pub use config::CommandConfig;
pub use host::{CallerKind, CommandSender, HostCommand, HostCommandTable};
