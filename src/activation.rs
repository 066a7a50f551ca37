//! Namespace activation
//!
//! Tracks which namespace is "current" while an operation deserializes or runs
//! namespace-tagged objects. [`ActivationStack`] is the plain data structure; the
//! free functions in this module keep one stack per thread and hand out
//! [`ActivationGuard`]s that pop on drop.
//!
//! Activation never crosses threads on its own. A task handed to another worker
//! either carries an [`ActivationSnapshot`] and re-establishes it there, or runs
//! with nothing active.

use crate::context::IsolatedCodeContext;
use crate::error::ActivationError;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{error, trace, warn};

struct Frame {
    namespace: Arc<str>,
    context: Arc<IsolatedCodeContext>,
    count: usize,
}

/// Reentrant stack of active namespaces
///
/// Pushing the namespace already on top bumps its counter; pushing another one
/// overrides it until popped.
#[derive(Default)]
pub struct ActivationStack {
    frames: Vec<Frame>,
}

impl ActivationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `context`; returns the top frame's reentrancy count
    pub fn push(&mut self, context: &Arc<IsolatedCodeContext>) -> usize {
        if let Some(top) = self.frames.last_mut() {
            if *top.namespace == *context.namespace() {
                top.count += 1;
                return top.count;
            }
        }
        self.frames.push(Frame {
            namespace: Arc::from(context.namespace()),
            context: Arc::clone(context),
            count: 1,
        });
        1
    }

    /// Deactivate `namespace`, which must be the top frame
    ///
    /// Returns the remaining reentrancy count of that frame.
    pub fn pop(&mut self, namespace: &str) -> Result<usize, ActivationError> {
        let Some(top) = self.frames.last_mut() else {
            return Err(ActivationError::NotActive(namespace.to_string()));
        };
        if *top.namespace != *namespace {
            return Err(ActivationError::Mismatch {
                requested: namespace.to_string(),
                active: top.namespace.to_string(),
            });
        }
        top.count -= 1;
        let remaining = top.count;
        if remaining == 0 {
            self.frames.pop();
        }
        Ok(remaining)
    }

    pub fn current(&self) -> Option<&Arc<IsolatedCodeContext>> {
        self.frames.last().map(|frame| &frame.context)
    }

    pub fn current_namespace(&self) -> Option<&str> {
        self.frames.last().map(|frame| &*frame.namespace)
    }

    /// Reentrancy count of the top frame, 0 when empty
    pub fn reentrancy(&self) -> usize {
        self.frames.last().map(|frame| frame.count).unwrap_or(0)
    }

    /// Number of distinct frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn clear(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }
}

thread_local! {
    static ACTIVE: RefCell<ActivationStack> = RefCell::new(ActivationStack::new());
}

/// Activate `context` on this thread
pub fn push(context: &Arc<IsolatedCodeContext>) -> usize {
    let count = ACTIVE.with(|stack| stack.borrow_mut().push(context));
    trace!(namespace = %context.namespace(), count, ">> activate");
    count
}

/// Deactivate `namespace` on this thread
pub fn pop(namespace: &str) -> Result<usize, ActivationError> {
    let remaining = ACTIVE.with(|stack| stack.borrow_mut().pop(namespace))?;
    trace!(namespace = %namespace, remaining, "<< deactivate");
    Ok(remaining)
}

/// The context active on this thread
pub fn current() -> Option<Arc<IsolatedCodeContext>> {
    ACTIVE.with(|stack| stack.borrow().current().cloned())
}

pub fn current_namespace() -> Option<String> {
    ACTIVE.with(|stack| stack.borrow().current_namespace().map(str::to_string))
}

pub fn reentrancy() -> usize {
    ACTIVE.with(|stack| stack.borrow().reentrancy())
}

pub fn depth() -> usize {
    ACTIVE.with(|stack| stack.borrow().depth())
}

/// True when nothing is active on this thread
pub fn is_clear() -> bool {
    ACTIVE.with(|stack| stack.borrow().is_empty())
}

/// Drop every frame on this thread; returns how many were left over
///
/// For worker pools that want a clean slate before running the next task.
/// Leftover frames indicate an activation that was never closed.
pub fn clear() -> usize {
    let dropped = ACTIVE.with(|stack| stack.borrow_mut().clear());
    if dropped > 0 {
        warn!(frames = dropped, "Cleared leftover namespace activation");
    }
    dropped
}

/// Activate `context` until the returned guard is dropped
pub fn enter(context: &Arc<IsolatedCodeContext>) -> ActivationGuard {
    push(context);
    ActivationGuard {
        namespace: Arc::from(context.namespace()),
        closed: false,
        _not_send: PhantomData,
    }
}

/// Run `body` with `context` active; the activation is closed on every exit path
pub fn run_scoped<F>(context: &Arc<IsolatedCodeContext>, body: F)
where
    F: FnOnce(),
{
    let _guard = enter(context);
    body();
}

/// Like [`run_scoped`], returning `body`'s result
pub fn call_scoped<F, R>(context: &Arc<IsolatedCodeContext>, body: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = enter(context);
    body()
}

/// Closes one activation when dropped
///
/// Guards are tied to the thread that created them and must be dropped in
/// reverse order of creation. Dropping out of order is a caller bug and panics.
#[must_use = "the namespace is deactivated as soon as the guard is dropped"]
pub struct ActivationGuard {
    namespace: Arc<str>,
    closed: bool,
    _not_send: PhantomData<*const ()>,
}

impl ActivationGuard {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Close the activation now, reporting misuse instead of panicking
    pub fn exit(mut self) -> Result<(), ActivationError> {
        self.closed = true;
        pop(&self.namespace).map(|_| ())
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let result = ACTIVE.try_with(|stack| stack.borrow_mut().pop(&self.namespace));
        match result {
            Ok(Ok(remaining)) => {
                trace!(namespace = %self.namespace, remaining, "<< deactivate");
            }
            Ok(Err(e)) => {
                if std::thread::panicking() {
                    error!(error = %e, "Activation stack corrupted while unwinding");
                } else {
                    panic!("{}", e);
                }
            }
            // thread is exiting, the stack is gone with it
            Err(_) => {}
        }
    }
}

/// The activation of one thread, captured for explicit hand-off
#[derive(Clone, Default)]
pub struct ActivationSnapshot {
    context: Option<Arc<IsolatedCodeContext>>,
}

impl ActivationSnapshot {
    /// Capture the context active on this thread
    pub fn capture() -> Self {
        Self { context: current() }
    }

    /// A snapshot that activates nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.context.as_ref().map(|context| context.namespace())
    }

    /// Re-establish the captured activation on the current thread
    pub fn enter(&self) -> Option<ActivationGuard> {
        self.context.as_ref().map(enter)
    }

    /// Run `body` under the captured activation
    pub fn call<F, R>(&self, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.enter();
        body()
    }
}

impl std::fmt::Debug for ActivationSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationSnapshot")
            .field("namespace", &self.namespace())
            .finish()
    }
}
