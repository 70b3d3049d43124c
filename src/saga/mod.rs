//! Compensating transaction orchestrator.
//!
//! A saga is an ordered list of named steps. Each step has a forward action
//! that transforms an opaque context and an optional compensation. On a step
//! failure the forward sweep halts and the compensations of every completed
//! step run in reverse order; compensation errors are recorded but never
//! abort the sweep or mask the primary error.

use futures::future::BoxFuture;
use tracing::{error, warn};

/// Forward action: consume the context, produce the next context.
type ForwardFn<C, E> = Box<dyn FnOnce(C) -> BoxFuture<'static, Result<C, E>> + Send>;

/// Compensation: observe the (possibly partial) context at failure time.
type CompensateFn<C, E> =
    Box<dyn for<'a> FnOnce(&'a C) -> BoxFuture<'a, Result<(), E>> + Send>;

struct SagaStep<C, E> {
    name: &'static str,
    forward: ForwardFn<C, E>,
    compensation: Option<CompensateFn<C, E>>,
}

/// Result of executing a saga.
pub struct SagaOutcome<C, E> {
    /// Whether every step completed.
    pub success: bool,
    /// Final context; partial when a step failed.
    pub context: C,
    /// The primary error, when a step failed.
    pub error: Option<E>,
    /// Name of the step that failed.
    pub failed_step: Option<&'static str>,
    /// Names of steps that completed, in execution order.
    pub completed_steps: Vec<&'static str>,
    /// Compensation errors, recorded but non-fatal.
    pub compensation_errors: Vec<(&'static str, E)>,
}

/// Builder-style saga over a context of type `C`.
pub struct Saga<C, E> {
    name: &'static str,
    steps: Vec<SagaStep<C, E>>,
}

impl<C, E> Saga<C, E>
where
    C: Clone + Send,
    E: std::fmt::Display + Send,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Append a step without compensation.
    pub fn step<F>(self, name: &'static str, forward: F) -> Self
    where
        F: FnOnce(C) -> BoxFuture<'static, Result<C, E>> + Send + 'static,
    {
        self.push(name, Box::new(forward), None)
    }

    /// Append a step with a compensation.
    pub fn step_with_compensation<F, R>(
        self,
        name: &'static str,
        forward: F,
        compensation: R,
    ) -> Self
    where
        F: FnOnce(C) -> BoxFuture<'static, Result<C, E>> + Send + 'static,
        R: for<'a> FnOnce(&'a C) -> BoxFuture<'a, Result<(), E>> + Send + 'static,
    {
        self.push(name, Box::new(forward), Some(Box::new(compensation)))
    }

    fn push(
        mut self,
        name: &'static str,
        forward: ForwardFn<C, E>,
        compensation: Option<CompensateFn<C, E>>,
    ) -> Self {
        self.steps.push(SagaStep {
            name,
            forward,
            compensation,
        });
        self
    }

    /// Run the forward sweep, compensating in reverse on failure.
    pub async fn execute(self, context: C) -> SagaOutcome<C, E> {
        let saga_name = self.name;
        let mut context = context;
        let mut completed: Vec<(&'static str, Option<CompensateFn<C, E>>)> = Vec::new();

        for step in self.steps {
            // The forward action consumes the context; keep the pre-step
            // state so a failure still has a context to compensate against.
            let snapshot = context.clone();
            match (step.forward)(context).await {
                Ok(next) => {
                    context = next;
                    completed.push((step.name, step.compensation));
                }
                Err(e) => {
                    context = snapshot;
                    warn!(
                        saga = saga_name,
                        step = step.name,
                        error = %e,
                        "Saga step failed, compensating"
                    );

                    let mut compensation_errors = Vec::new();
                    let mut completed_names = Vec::with_capacity(completed.len());
                    for (name, _) in &completed {
                        completed_names.push(*name);
                    }

                    for (name, compensation) in completed.into_iter().rev() {
                        let Some(compensation) = compensation else {
                            continue;
                        };
                        if let Err(comp_err) = compensation(&context).await {
                            error!(
                                saga = saga_name,
                                step = name,
                                error = %comp_err,
                                "Compensation failed"
                            );
                            compensation_errors.push((name, comp_err));
                        }
                    }

                    return SagaOutcome {
                        success: false,
                        context,
                        error: Some(e),
                        failed_step: Some(step.name),
                        completed_steps: completed_names,
                        compensation_errors,
                    };
                }
            }
        }

        SagaOutcome {
            success: true,
            context,
            error: None,
            failed_step: None,
            completed_steps: completed.iter().map(|(name, _)| *name).collect(),
            compensation_errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests;
