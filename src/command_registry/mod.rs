//! Command Registry Module
//!
//! Declarative command handlers bound into a host command table or
//! intercepted silently from raw input.

pub mod descriptor;
pub mod diagnostic;
pub mod errors;
pub mod handler;
pub mod interceptor;
pub mod registry;



pub use descriptor::{CapabilityGroup, HandlerDescriptor, HandlerDescriptorBuilder, Registration};
pub use diagnostic::{CommandSummary, DispatchSummary, HandlerSummary, RegistryReport};
pub use errors::{CommandError, ErrorType};
pub use handler::{
    CommandAction, CommandHandler, HandlerBinding, HandlerType, Invocation, SimpleCommand,
};
pub use interceptor::SilentInterceptor;
pub use registry::{BindReport, CommandRegistry};
