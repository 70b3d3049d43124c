use std::time::Duration;

use super::*;

fn fast_config() -> BreakerConfig {
    BreakerConfig {
        call_timeout_secs: 1,
        error_threshold_pct: 50,
        reset_timeout_secs: 1,
        volume_threshold: 5,
        window_secs: 60,
    }
}

async fn ok_call(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
    breaker.call(async { Ok::<_, &'static str>(1) }).await
}

async fn err_call(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
    breaker.call(async { Err::<u32, _>("boom") }).await
}

#[tokio::test]
async fn test_closed_allows_calls() {
    let breaker = CircuitBreaker::new("stripe", fast_config());
    assert_eq!(ok_call(&breaker).await.unwrap(), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_opens_after_failure_burst() {
    let breaker = CircuitBreaker::new("stripe", fast_config());
    for _ in 0..5 {
        let _ = err_call(&breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected = ok_call(&breaker).await;
    assert!(matches!(rejected, Err(BreakerError::Open)));
}

#[tokio::test]
async fn test_stays_closed_below_volume_threshold() {
    let breaker = CircuitBreaker::new("stripe", fast_config());
    for _ in 0..4 {
        let _ = err_call(&breaker).await;
    }
    // 100% failure rate but only 4 observations.
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_stays_closed_below_error_rate() {
    let breaker = CircuitBreaker::new("stripe", fast_config());
    for _ in 0..7 {
        let _ = ok_call(&breaker).await;
    }
    for _ in 0..3 {
        let _ = err_call(&breaker).await;
    }
    // 30% failure rate over 10 observations.
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_half_open_probe_success_closes() {
    let breaker = CircuitBreaker::new("stripe", fast_config());
    for _ in 0..5 {
        let _ = err_call(&breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    assert_eq!(ok_call(&breaker).await.unwrap(), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_half_open_probe_failure_reopens() {
    let breaker = CircuitBreaker::new("stripe", fast_config());
    for _ in 0..5 {
        let _ = err_call(&breaker).await;
    }
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let result = err_call(&breaker).await;
    assert!(matches!(result, Err(BreakerError::Inner("boom"))));
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_timeout_counts_as_failure() {
    let breaker = CircuitBreaker::new("stripe", fast_config());
    for _ in 0..5 {
        let result = breaker
            .call(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<u32, &'static str>(1)
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Timeout)));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_fallback_on_rejection_and_failure() {
    let breaker = CircuitBreaker::new("stripe", fast_config());

    let value = breaker
        .call_with_fallback(async { Err::<u32, &'static str>("boom") }, |_| 42)
        .await;
    assert_eq!(value, 42);

    for _ in 0..5 {
        let _ = err_call(&breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let value = breaker
        .call_with_fallback(async { Ok::<_, &'static str>(1) }, |_| 42)
        .await;
    assert_eq!(value, 42);
    // Fallback must not close the breaker.
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_registry_reuses_and_reports_open() {
    let registry = BreakerRegistry::new(fast_config());
    let a = registry.get("stripe");
    let b = registry.get("stripe");
    assert!(Arc::ptr_eq(&a, &b));

    for _ in 0..5 {
        let _ = err_call(&a).await;
    }
    assert_eq!(registry.open_breakers(), vec!["stripe".to_string()]);
}
