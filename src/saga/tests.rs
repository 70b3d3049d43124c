use std::sync::{Arc, Mutex};

use super::*;

#[derive(Debug, Default, Clone)]
struct Ctx {
    values: Vec<&'static str>,
}

fn trace() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::new(Mutex::new(Vec::new()))
}

#[tokio::test]
async fn test_all_steps_run_in_order() {
    let saga: Saga<Ctx, String> = Saga::new("test")
        .step("one", |mut ctx: Ctx| {
            Box::pin(async move {
                ctx.values.push("one");
                Ok(ctx)
            })
        })
        .step("two", |mut ctx: Ctx| {
            Box::pin(async move {
                ctx.values.push("two");
                Ok(ctx)
            })
        });

    let outcome = saga.execute(Ctx::default()).await;
    assert!(outcome.success);
    assert_eq!(outcome.context.values, vec!["one", "two"]);
    assert_eq!(outcome.completed_steps, vec!["one", "two"]);
    assert!(outcome.error.is_none());
    assert!(outcome.failed_step.is_none());
}

#[tokio::test]
async fn test_failure_halts_and_reports_step() {
    let saga: Saga<Ctx, String> = Saga::new("test")
        .step("one", |ctx: Ctx| Box::pin(async move { Ok(ctx) }))
        .step("two", |_ctx: Ctx| {
            Box::pin(async move { Err("two exploded".to_string()) })
        })
        .step("three", |mut ctx: Ctx| {
            Box::pin(async move {
                ctx.values.push("three");
                Ok(ctx)
            })
        });

    let outcome = saga.execute(Ctx::default()).await;
    assert!(!outcome.success);
    assert_eq!(outcome.failed_step, Some("two"));
    assert_eq!(outcome.completed_steps, vec!["one"]);
    assert!(outcome.context.values.is_empty());
    assert_eq!(outcome.error.as_deref(), Some("two exploded"));
}

#[tokio::test]
async fn test_compensations_run_in_reverse_order() {
    let seen = trace();
    let (s1, s2) = (seen.clone(), seen.clone());

    let saga: Saga<Ctx, String> = Saga::new("test")
        .step_with_compensation(
            "one",
            |ctx: Ctx| Box::pin(async move { Ok(ctx) }),
            move |_ctx| {
                Box::pin(async move {
                    s1.lock().unwrap().push("undo-one");
                    Ok(())
                })
            },
        )
        .step_with_compensation(
            "two",
            |ctx: Ctx| Box::pin(async move { Ok(ctx) }),
            move |_ctx| {
                Box::pin(async move {
                    s2.lock().unwrap().push("undo-two");
                    Ok(())
                })
            },
        )
        .step("three", |_ctx: Ctx| {
            Box::pin(async move { Err("three exploded".to_string()) })
        });

    let outcome = saga.execute(Ctx::default()).await;
    assert!(!outcome.success);
    assert_eq!(outcome.completed_steps, vec!["one", "two"]);
    assert_eq!(*seen.lock().unwrap(), vec!["undo-two", "undo-one"]);
}

#[tokio::test]
async fn test_compensation_error_does_not_abort_sweep() {
    let seen = trace();
    let s1 = seen.clone();

    let saga: Saga<Ctx, String> = Saga::new("test")
        .step_with_compensation(
            "one",
            |ctx: Ctx| Box::pin(async move { Ok(ctx) }),
            move |_ctx| {
                Box::pin(async move {
                    s1.lock().unwrap().push("undo-one");
                    Ok(())
                })
            },
        )
        .step_with_compensation(
            "two",
            |ctx: Ctx| Box::pin(async move { Ok(ctx) }),
            |_ctx| Box::pin(async move { Err("undo-two exploded".to_string()) }),
        )
        .step("three", |_ctx: Ctx| {
            Box::pin(async move { Err("three exploded".to_string()) })
        });

    let outcome = saga.execute(Ctx::default()).await;
    assert!(!outcome.success);
    // The failing compensation is recorded, the earlier one still ran.
    assert_eq!(outcome.compensation_errors.len(), 1);
    assert_eq!(outcome.compensation_errors[0].0, "two");
    assert_eq!(*seen.lock().unwrap(), vec!["undo-one"]);
    // The primary error is never masked by compensation failures.
    assert_eq!(outcome.error.as_deref(), Some("three exploded"));
}

#[tokio::test]
async fn test_failure_on_first_step_compensates_nothing() {
    let seen = trace();
    let s1 = seen.clone();

    let saga: Saga<Ctx, String> = Saga::new("test")
        .step_with_compensation(
            "one",
            |_ctx: Ctx| Box::pin(async move { Err("one exploded".to_string()) }),
            move |_ctx| {
                Box::pin(async move {
                    s1.lock().unwrap().push("undo-one");
                    Ok(())
                })
            },
        );

    let outcome = saga.execute(Ctx::default()).await;
    assert!(!outcome.success);
    assert!(outcome.completed_steps.is_empty());
    assert!(seen.lock().unwrap().is_empty());
}
