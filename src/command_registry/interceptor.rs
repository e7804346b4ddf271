//! Silent command interception
//!
//! Silent handlers never appear in the host table. The interceptor watches
//! raw input at the earliest priority, claims lines whose label belongs to
//! a silent handler and dispatches them directly.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use log::{debug, error};

use crate::command_registry::errors::CommandError;
use crate::command_registry::handler::CommandHandler;
use crate::host::{ObserverPriority, RawInputEvent, RawInputObserver};

pub const DEFAULT_INTERNAL_ERROR_MESSAGE: &str =
    "An internal error occurred while attempting to perform this command";

/// Split raw input into the label and its space-separated arguments.
/// Trailing empty arguments are dropped, interior ones are kept.
pub fn split_raw_input(raw: &str) -> (&str, Vec<String>) {
    let raw = raw.strip_prefix('/').unwrap_or(raw);
    let (label, rest) = raw.split_once(' ').unwrap_or((raw, ""));
    let mut args: Vec<String> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(' ').map(str::to_string).collect()
    };
    while args.last().is_some_and(|arg| arg.is_empty()) {
        args.pop();
    }
    (label, args)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Ordered list of silent handlers plus the raw input observer
pub struct SilentInterceptor {
    owner: String,
    internal_error_message: String,
    handlers: RwLock<Vec<Arc<CommandHandler>>>,
}

impl SilentInterceptor {
    /// Interceptor reporting failures on behalf of `owner`
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            internal_error_message: DEFAULT_INTERNAL_ERROR_MESSAGE.to_string(),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Replace the message sent when a silent action fails
    pub fn with_internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = message.into();
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Append a handler. Duplicate labels are allowed; the earliest wins.
    pub fn add_silent_handler(&self, handler: Arc<CommandHandler>) -> Result<(), CommandError> {
        let mut handlers = self.handlers.write().map_err(|err| {
            CommandError::host_unavailable(format!("silent handler list poisoned: {}", err))
        })?;
        debug!("Silent handler {} bound to {:?}", handler.type_name(), handler.names());
        handlers.push(handler);
        Ok(())
    }

    /// Copy of the silent handler list
    pub fn silent_handlers(&self) -> Vec<Arc<CommandHandler>> {
        self.handlers.read().map(|h| h.clone()).unwrap_or_default()
    }

    /// First silent handler answering to `label`
    pub fn silent_handler(&self, label: &str) -> Option<Arc<CommandHandler>> {
        self.handlers
            .read()
            .ok()?
            .iter()
            .find(|handler| handler.is_applicable(label))
            .cloned()
    }

    /// Claim and dispatch `event` if a silent handler answers to it
    ///
    /// Returns `Ok(true)` when the event was claimed. A failing action
    /// gets one internal-error message to the caller and comes back as a
    /// [`CommandError::Dispatch`] for the host's own fault handling.
    pub fn intercept(&self, event: &mut RawInputEvent) -> Result<bool, CommandError> {
        let (label, args) = split_raw_input(event.message());
        let label = label.to_string();
        let Some(handler) = self.silent_handler(&label) else {
            return Ok(false);
        };

        event.mark_handled();
        let sender = event.sender().clone();
        debug!("Silently dispatching '{}' for {}", label, sender.name());

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler.dispatch(sender.as_ref(), None, &label, &label, &args)
        }));
        let failure = match outcome {
            Ok(Ok(())) => return Ok(true),
            Ok(Err(err)) => err,
            Err(payload) => anyhow::anyhow!("command panicked: {}", panic_message(payload)),
        };

        sender.send_message(&self.internal_error_message);
        error!("Silent command '{}' failed in {}: {:#}", label, self.owner, failure);
        Err(CommandError::dispatch_failed(&label, &self.owner, failure))
    }
}

impl RawInputObserver for SilentInterceptor {
    fn priority(&self) -> ObserverPriority {
        ObserverPriority::Lowest
    }

    fn on_raw_input(&self, event: &mut RawInputEvent) -> Result<(), CommandError> {
        self.intercept(event).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_registry::descriptor::{CapabilityGroup, HandlerDescriptor};
    use crate::command_registry::handler::{CommandAction, Invocation};
    use crate::host::{BufferedSender, CommandSender};
    use std::sync::Mutex;

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl CommandAction for Tagged {
        fn perform(&self, invocation: &Invocation<'_>) -> anyhow::Result<()> {
            assert!(invocation.command.is_none());
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}:{}", self.tag, invocation.label, invocation.args.join(",")));
            Ok(())
        }
    }

    struct Failing;

    impl CommandAction for Failing {
        fn perform(&self, _invocation: &Invocation<'_>) -> anyhow::Result<()> {
            anyhow::bail!("database offline")
        }
    }

    struct Panicking;

    impl CommandAction for Panicking {
        fn perform(&self, _invocation: &Invocation<'_>) -> anyhow::Result<()> {
            panic!("index out of range")
        }
    }

    fn silent<A: CommandAction>(names: &[&str], action: A) -> Arc<CommandHandler> {
        let descriptor = HandlerDescriptor::builder(names.iter().copied())
            .group(CapabilityGroup::Interactive)
            .silent(true)
            .build()
            .unwrap();
        Arc::new(CommandHandler::new(descriptor, action))
    }

    fn event(text: &str) -> (RawInputEvent, Arc<BufferedSender>) {
        let sender = Arc::new(BufferedSender::interactive("alice"));
        let as_dyn: Arc<dyn CommandSender> = sender.clone();
        (RawInputEvent::new(text, as_dyn), sender)
    }

    #[test]
    fn test_split_raw_input() {
        assert_eq!(split_raw_input("foo"), ("foo", Vec::new()));
        assert_eq!(split_raw_input("/foo a b"), ("foo", vec!["a".to_string(), "b".to_string()]));
        assert_eq!(split_raw_input("foo a  "), ("foo", vec!["a".to_string()]));
        assert_eq!(split_raw_input("foo  a"), ("foo", vec!["".to_string(), "a".to_string()]));
    }

    #[test]
    fn test_matching_label_is_claimed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptor = SilentInterceptor::new("demo");
        interceptor.add_silent_handler(silent(&["foo"], Tagged { tag: "foo", log: log.clone() })).unwrap();
        interceptor.add_silent_handler(silent(&["bar"], Tagged { tag: "bar", log: log.clone() })).unwrap();

        let (mut ev, sender) = event("foo arg1");
        assert!(interceptor.intercept(&mut ev).unwrap());
        assert!(ev.is_handled());
        assert_eq!(*log.lock().unwrap(), vec!["foo:foo:arg1".to_string()]);
        assert!(sender.messages().is_empty());

        let (mut ev, _) = event("baz");
        assert!(!interceptor.intercept(&mut ev).unwrap());
        assert!(!ev.is_handled());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_first_match_wins() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptor = SilentInterceptor::new("demo");
        interceptor.add_silent_handler(silent(&["dup"], Tagged { tag: "first", log: log.clone() })).unwrap();
        interceptor.add_silent_handler(silent(&["dup"], Tagged { tag: "second", log: log.clone() })).unwrap();
        assert_eq!(interceptor.silent_handlers().len(), 2);

        let (mut ev, _) = event("DUP");
        interceptor.intercept(&mut ev).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first:DUP:".to_string()]);
    }

    #[test]
    fn test_failure_reported_once_and_propagated() {
        let interceptor = SilentInterceptor::new("demo");
        interceptor.add_silent_handler(silent(&["boom"], Failing)).unwrap();

        let (mut ev, sender) = event("boom now");
        let err = interceptor.intercept(&mut ev).unwrap_err();
        assert!(ev.is_handled());
        assert_eq!(sender.messages(), vec![DEFAULT_INTERNAL_ERROR_MESSAGE.to_string()]);
        match err {
            CommandError::Dispatch { label, owner, source } => {
                assert_eq!(label, "boom");
                assert_eq!(owner, "demo");
                assert_eq!(source.to_string(), "database offline");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_panic_becomes_dispatch_failure() {
        let interceptor = SilentInterceptor::new("demo").with_internal_error_message("oops");
        interceptor.add_silent_handler(silent(&["crash"], Panicking)).unwrap();

        let (mut ev, sender) = event("crash");
        let err = interceptor.on_raw_input(&mut ev).unwrap_err();
        assert!(matches!(err, CommandError::Dispatch { .. }));
        assert_eq!(sender.messages(), vec!["oops".to_string()]);
    }

    #[test]
    fn test_runs_at_lowest_priority() {
        assert_eq!(SilentInterceptor::new("demo").priority(), ObserverPriority::Lowest);
    }
}
