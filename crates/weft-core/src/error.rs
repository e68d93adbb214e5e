use std::fmt;

use crate::host::HostError;

/// Lifecycle entry points a component error can escape from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookName {
    Construct,
    Render,
    BeforeMount,
    AfterMount,
    ReceiveProps,
    ShouldUpdate,
    BeforeUpdate,
    AfterUpdate,
    WillUnmount,
    OnError,
    ChildContext,
    Callback,
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookName::Construct => "construct",
            HookName::Render => "render",
            HookName::BeforeMount => "before_mount",
            HookName::AfterMount => "after_mount",
            HookName::ReceiveProps => "receive_props",
            HookName::ShouldUpdate => "should_update",
            HookName::BeforeUpdate => "before_update",
            HookName::AfterUpdate => "after_update",
            HookName::WillUnmount => "will_unmount",
            HookName::OnError => "on_error",
            HookName::ChildContext => "child_context",
            HookName::Callback => "callback",
        };
        f.write_str(name)
    }
}

/// Contract violations. These are fatal and never recovered by error
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invariant {
    ChildContextWithoutKeys { component: &'static str },
    UndeclaredChildContext { component: &'static str, key: String },
    TransactionInProgress,
    ComponentBusy { component: &'static str },
    Unmounted { component: &'static str },
    AsapOutsideBatch,
    BatchNotRun,
    HostBusy,
    RootUnmounted,
    RuntimeDropped,
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invariant::ChildContextWithoutKeys { component } => write!(
                f,
                "{component}: child_context returned a value but no child context keys are declared"
            ),
            Invariant::UndeclaredChildContext { component, key } => write!(
                f,
                "{component}: child context key \"{key}\" is not declared in CHILD_CONTEXT_KEYS"
            ),
            Invariant::TransactionInProgress => {
                f.write_str("cannot perform a transaction while it is already in progress")
            }
            Invariant::ComponentBusy { component } => write!(
                f,
                "{component} was re-entered while one of its lifecycle hooks was running"
            ),
            Invariant::Unmounted { component } => {
                write!(f, "{component} is not mounted")
            }
            Invariant::AsapOutsideBatch => {
                f.write_str("asap callbacks can only be enqueued while updates are batched")
            }
            Invariant::BatchNotRun => {
                f.write_str("batching strategy returned without running the batched work")
            }
            Invariant::HostBusy => f.write_str("host is already borrowed by another mutation"),
            Invariant::RootUnmounted => f.write_str("root has already been unmounted"),
            Invariant::RuntimeDropped => f.write_str("runtime has been dropped"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// Raised by user code (render, hooks, callbacks).
    Component(Box<dyn std::error::Error + 'static>),
    /// A component error annotated with the unit and hook it escaped from.
    Lifecycle {
        component: &'static str,
        hook: HookName,
        source: Box<Error>,
    },
    Invariant(Invariant),
    Host(HostError),
}

impl Error {
    /// Wraps a user error message.
    pub fn component(message: impl Into<String>) -> Self {
        Error::Component(message.into().into())
    }

    /// Annotates user errors with the hook they escaped from. Errors raised
    /// by the runtime itself pass through unchanged.
    pub(crate) fn in_hook(self, component: &'static str, hook: HookName) -> Self {
        match self {
            Error::Component(_) => Error::Lifecycle {
                component,
                hook,
                source: Box::new(self),
            },
            other => other,
        }
    }

    /// The innermost error, skipping lifecycle annotations.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Lifecycle { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self.root_cause(), Error::Invariant(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Component(err) => write!(f, "{err}"),
            Error::Lifecycle {
                component,
                hook,
                source,
            } => write!(f, "{component}.{hook} failed: {source}"),
            Error::Invariant(invariant) => write!(f, "invariant violated: {invariant}"),
            Error::Host(err) => write!(f, "host mutation failed: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Component(err) => Some(err.as_ref()),
            Error::Lifecycle { source, .. } => Some(source.as_ref()),
            Error::Invariant(_) => None,
            Error::Host(err) => Some(err),
        }
    }
}

impl From<Invariant> for Error {
    fn from(invariant: Invariant) -> Self {
        Error::Invariant(invariant)
    }
}

impl From<HostError> for Error {
    fn from(err: HostError) -> Self {
        Error::Host(err)
    }
}
