// ABOUTME: Deferred rollback/cleanup action stacks for transactional teardown.
// ABOUTME: LIFO execution, failure-swallowing drains, rollback always before cleanup.

use futures::future::BoxFuture;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type ActionFuture = BoxFuture<'static, Result<(), BoxError>>;

/// Which teardown stack an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Always-run teardown (temp directories and the like).
    Cleanup,
    /// Run only on failure, before cleanup, to restore pre-run state.
    Rollback,
}

/// One deferred operation: a label for logging plus an async closure.
struct Action {
    label: String,
    run: Box<dyn FnOnce() -> ActionFuture + Send>,
}

/// A teardown action that failed during a drain.
#[derive(Debug)]
pub struct ActionFailure {
    pub label: String,
    pub error: String,
}

/// Two independent LIFO stacks of deferred actions.
///
/// Registration order mirrors resource acquisition order, so draining in
/// reverse tears inner-scope artifacts down before outer-scope ones. A
/// drain exhausts its stack unconditionally: individual failures are
/// reported back but never interrupt the remaining actions, so teardown
/// can never mask the original pipeline failure. Draining an already
/// drained phase is a no-op.
#[derive(Default)]
pub struct ActionStack {
    cleanup: Vec<Action>,
    rollback: Vec<Action>,
}

impl ActionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deferred action. Once pushed, an action only leaves the
    /// stack by being executed in a drain.
    pub fn push<F, Fut>(&mut self, phase: Phase, label: impl Into<String>, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let action = Action {
            label: label.into(),
            run: Box::new(move || Box::pin(f())),
        };
        self.stack_mut(phase).push(action);
    }

    pub fn len(&self, phase: Phase) -> usize {
        self.stack(phase).len()
    }

    pub fn is_empty(&self, phase: Phase) -> bool {
        self.stack(phase).is_empty()
    }

    /// Run every registered action of a phase, last registered first,
    /// returning the failures that occurred along the way.
    pub async fn drain(&mut self, phase: Phase) -> Vec<ActionFailure> {
        let mut failures = Vec::new();
        while let Some(action) = self.stack_mut(phase).pop() {
            tracing::debug!(phase = ?phase, label = %action.label, "running teardown action");
            if let Err(e) = (action.run)().await {
                tracing::warn!(
                    phase = ?phase,
                    label = %action.label,
                    "teardown action failed: {e}"
                );
                failures.push(ActionFailure {
                    label: action.label,
                    error: e.to_string(),
                });
            }
        }
        failures
    }

    /// Drop all rollback actions without running them. Called on success,
    /// when the deployment is accepted and prior state no longer matters.
    pub fn discard_rollback(&mut self) {
        let dropped = self.rollback.len();
        self.rollback.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding rollback actions after success");
        }
    }

    fn stack(&self, phase: Phase) -> &Vec<Action> {
        match phase {
            Phase::Cleanup => &self.cleanup,
            Phase::Rollback => &self.rollback,
        }
    }

    fn stack_mut(&mut self, phase: Phase) -> &mut Vec<Action> {
        match phase {
            Phase::Cleanup => &mut self.cleanup,
            Phase::Rollback => &mut self.rollback,
        }
    }
}
