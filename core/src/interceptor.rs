//! Interceptors and chain execution.
//!
//! An interceptor is data: an id plus an optional `before` hook and an
//! optional `after` hook, each a function `Context -> Result<Context>`.
//! A chain is executed as a stack-based two-phase sweep:
//!
//! 1. **Before phase**: pop interceptors off the front of the queue, run each
//!    `before` hook, and push the interceptor onto the stack.
//! 2. **After phase**: pop the stack back-to-front and run each `after` hook.
//!
//! The first error stops the sweep. No further hooks run and the
//! in-progress context is dropped, so nothing is committed.

use crate::context::Context;
use crate::error::DispatchError;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A before or after hook
pub type Hook = Arc<dyn Fn(Context) -> Result<Context, DispatchError> + Send + Sync>;

/// A composable `{before, after}` hook pair
///
/// # Example
///
/// ```
/// use refract_core::{Context, Interceptor};
///
/// let trace = Interceptor::new("trace")
///     .with_before(|ctx: Context| {
///         println!("handling {}", ctx.event_name());
///         Ok(ctx)
///     })
///     .with_after(|ctx: Context| Ok(ctx));
///
/// assert!(trace.has_before() && trace.has_after());
/// ```
#[derive(Clone)]
pub struct Interceptor {
    id: Cow<'static, str>,
    before: Option<Hook>,
    after: Option<Hook>,
}

impl Interceptor {
    /// Create an interceptor with no hooks
    #[must_use]
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: id.into(),
            before: None,
            after: None,
        }
    }

    /// Set the before hook
    #[must_use]
    pub fn with_before<F>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Result<Context, DispatchError> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }

    /// Set the after hook
    #[must_use]
    pub fn with_after<F>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Result<Context, DispatchError> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(hook));
        self
    }

    /// Identifier used in logs and diagnostics
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this interceptor has a before hook
    #[must_use]
    pub const fn has_before(&self) -> bool {
        self.before.is_some()
    }

    /// Whether this interceptor has an after hook
    #[must_use]
    pub const fn has_after(&self) -> bool {
        self.after.is_some()
    }

    fn run_before(&self, ctx: Context) -> Result<Context, DispatchError> {
        match &self.before {
            Some(hook) => hook(ctx),
            None => Ok(ctx),
        }
    }

    fn run_after(&self, ctx: Context) -> Result<Context, DispatchError> {
        match &self.after {
            Some(hook) => hook(ctx),
            None => Ok(ctx),
        }
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("id", &self.id)
            .field("before", &self.has_before())
            .field("after", &self.has_after())
            .finish()
    }
}

/// Run every queued interceptor's before hook, then unwind the stack running
/// the after hooks
///
/// # Errors
///
/// Returns the first error raised by any hook; later hooks do not run.
pub fn execute(mut ctx: Context) -> Result<Context, DispatchError> {
    while let Some(interceptor) = ctx.next_queued() {
        tracing::trace!(interceptor = interceptor.id(), "before");
        ctx = interceptor.run_before(ctx).inspect_err(|error| {
            tracing::debug!(interceptor = interceptor.id(), %error, "before hook failed");
        })?;
        ctx.push_stack(interceptor);
    }

    while let Some(interceptor) = ctx.pop_stack() {
        tracing::trace!(interceptor = interceptor.id(), "after");
        ctx = interceptor.run_after(ctx).inspect_err(|error| {
            tracing::debug!(interceptor = interceptor.id(), %error, "after hook failed");
        })?;
    }

    Ok(ctx)
}
