//! Error classification and recovery infrastructure
//!
//! The printer session path carries a hierarchical error envelope: failures
//! are classified into a category and severity, each category has an ordered
//! list of recovery strategies, retries back off exponentially up to a cap,
//! and a circuit breaker guards each sensitive operation so a flapping host
//! cannot spin the session in a hot loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::TN3270Error;

/// Severity levels for classified failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Failure categories with targeted recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Connection,
    Protocol,
    Timeout,
    Data,
    Session,
    Resource,
    Unknown,
}

/// Recovery strategies, tried in category order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Retry with exponential backoff, capped at the policy's max delay
    Retry,
    Reconnect,
    Reset,
    Failover,
    Escalate,
    Ignore,
}

/// Classify an error into (category, severity)
pub fn classify_error(error: &TN3270Error) -> (ErrorCategory, ErrorSeverity) {
    match error {
        TN3270Error::Connection(_) => (ErrorCategory::Connection, ErrorSeverity::High),
        TN3270Error::Negotiation(_) => (ErrorCategory::Session, ErrorSeverity::High),
        TN3270Error::Protocol(_) => (ErrorCategory::Protocol, ErrorSeverity::High),
        TN3270Error::Parse(_) => (ErrorCategory::Data, ErrorSeverity::Medium),
        TN3270Error::NotConnected { .. } => (ErrorCategory::Session, ErrorSeverity::Medium),
        TN3270Error::Timeout { .. } => (ErrorCategory::Timeout, ErrorSeverity::Medium),
    }
}

/// Ordered recovery strategies for a category
pub fn recovery_strategies(category: ErrorCategory) -> &'static [RecoveryStrategy] {
    use RecoveryStrategy::*;
    match category {
        ErrorCategory::Connection => &[Reconnect, Retry, Escalate],
        ErrorCategory::Protocol => &[Reset, Retry, Escalate],
        ErrorCategory::Timeout => &[Retry, Reconnect, Escalate],
        ErrorCategory::Data => &[Retry, Reset, Escalate],
        ErrorCategory::Session => &[Reconnect, Reset, Escalate],
        ErrorCategory::Resource => &[Retry, Failover, Escalate],
        ErrorCategory::Unknown => &[Retry, Escalate],
    }
}

/// Retry policy with capped exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Delay before the given attempt (0-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let millis = (self.base_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32)) as u64;
        Duration::from_millis(millis.min(self.max_delay.as_millis() as u64))
    }

    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; failures count toward the threshold
    Closed,
    /// Failing; calls rejected until the recovery timeout lapses
    Open,
    /// Probing recovery with a bounded number of trial calls
    HalfOpen,
}

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub recovery_timeout: Duration,
    pub success_threshold: usize,
    pub half_open_max_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    half_open_calls: usize,
    last_failure: Option<Instant>,
}

/// Circuit breaker guarding a sensitive operation
///
/// CLOSED counts failures; crossing the threshold opens the circuit. After
/// the recovery timeout the breaker transitions HALF-OPEN and permits a
/// bounded number of trial calls; enough consecutive successes close it
/// again, and any failure reopens it.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_calls: 0,
                last_failure: None,
            })),
        }
    }

    /// Whether a call may proceed right now
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.half_open_calls = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.half_open_calls = 0;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.half_open_calls = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// The plan produced for one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPlan {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub strategy: RecoveryStrategy,
    /// Backoff to sleep before acting, for Retry plans
    pub delay: Option<Duration>,
}

/// Hierarchical error handler for printer operations
///
/// Classifies each failure, walks the category's strategy list, applies the
/// retry budget per operation name, and consults the circuit breaker.
#[derive(Debug)]
pub struct ErrorEnvelope {
    retry_policy: RetryPolicy,
    breaker: CircuitBreaker,
    attempts: HashMap<String, usize>,
}

impl ErrorEnvelope {
    pub fn new(retry_policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            retry_policy,
            breaker,
            attempts: HashMap::new(),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Classify a failure and choose the strategy to apply next.
    ///
    /// Retry is selected while the operation has budget left; afterwards
    /// the category's next strategy applies. An open circuit escalates
    /// immediately.
    pub fn plan_recovery(&mut self, error: &TN3270Error, operation: &str) -> RecoveryPlan {
        let (category, severity) = classify_error(error);
        self.breaker.record_failure();

        if !self.breaker.allow_request() {
            return RecoveryPlan {
                category,
                severity,
                strategy: RecoveryStrategy::Escalate,
                delay: None,
            };
        }

        let attempt = self.attempts.entry(operation.to_string()).or_insert(0);
        let strategies = recovery_strategies(category);

        for &strategy in strategies {
            if strategy == RecoveryStrategy::Retry {
                if self.retry_policy.should_retry(*attempt) {
                    let delay = self.retry_policy.delay_for(*attempt);
                    *attempt += 1;
                    return RecoveryPlan {
                        category,
                        severity,
                        strategy,
                        delay: Some(delay),
                    };
                }
                continue; // budget exhausted, fall through
            }
            // Non-retry strategies are position-gated: the first applies
            // once retries are spent or when it leads the list
            return RecoveryPlan { category, severity, strategy, delay: None };
        }

        RecoveryPlan {
            category,
            severity,
            strategy: RecoveryStrategy::Escalate,
            delay: None,
        }
    }

    /// Reset the retry budget for an operation after it succeeds
    pub fn record_success(&mut self, operation: &str) {
        self.attempts.remove(operation);
        self.breaker.record_success();
    }
}

impl Default for ErrorEnvelope {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), CircuitBreaker::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectionError, ParseError};

    fn connection_error() -> TN3270Error {
        TN3270Error::Connection(ConnectionError::ConnectionLost {
            host: "host".to_string(),
            port: 23,
            reason: "reset".to_string(),
        })
    }

    fn timeout_error() -> TN3270Error {
        TN3270Error::Timeout {
            host: "host".to_string(),
            port: 23,
            operation: "read".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            classify_error(&connection_error()),
            (ErrorCategory::Connection, ErrorSeverity::High)
        );
        assert_eq!(
            classify_error(&timeout_error()),
            (ErrorCategory::Timeout, ErrorSeverity::Medium)
        );
        let parse: TN3270Error =
            ParseError::ShortRecord { expected: 1, available: 0, context: "WCC" }.into();
        assert_eq!(classify_error(&parse), (ErrorCategory::Data, ErrorSeverity::Medium));
    }

    #[test]
    fn test_strategy_order_per_category() {
        assert_eq!(
            recovery_strategies(ErrorCategory::Connection)[0],
            RecoveryStrategy::Reconnect
        );
        assert_eq!(recovery_strategies(ErrorCategory::Timeout)[0], RecoveryStrategy::Retry);
        assert!(recovery_strategies(ErrorCategory::Unknown)
            .contains(&RecoveryStrategy::Escalate));
    }

    #[test]
    fn test_retry_policy_backoff_capped() {
        let policy = RetryPolicy::new(5)
            .with_delays(Duration::from_millis(100), Duration::from_millis(400));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(6), Duration::from_millis(400)); // capped
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn test_circuit_breaker_opens_at_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            half_open_max_calls: 2,
        });
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());

        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_circuit_breaker_half_open_cycle() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            success_threshold: 2,
            half_open_max_calls: 5,
        });
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_breaker_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            success_threshold: 2,
            half_open_max_calls: 5,
        });
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_circuit_breaker_half_open_call_limit() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            success_threshold: 10,
            half_open_max_calls: 2,
        });
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.allow_request()); // trial 1
        assert!(breaker.allow_request()); // trial 2
        assert!(!breaker.allow_request()); // limit reached
    }

    #[test]
    fn test_envelope_retries_then_falls_through() {
        let mut envelope = ErrorEnvelope::new(
            RetryPolicy::new(2).with_delays(Duration::from_millis(10), Duration::from_millis(40)),
            CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 100,
                ..CircuitBreakerConfig::default()
            }),
        );

        let plan = envelope.plan_recovery(&timeout_error(), "scs-write");
        assert_eq!(plan.strategy, RecoveryStrategy::Retry);
        assert_eq!(plan.delay, Some(Duration::from_millis(10)));

        let plan = envelope.plan_recovery(&timeout_error(), "scs-write");
        assert_eq!(plan.strategy, RecoveryStrategy::Retry);
        assert_eq!(plan.delay, Some(Duration::from_millis(20)));

        // Budget exhausted: next strategy in the Timeout list
        let plan = envelope.plan_recovery(&timeout_error(), "scs-write");
        assert_eq!(plan.strategy, RecoveryStrategy::Reconnect);
    }

    #[test]
    fn test_envelope_success_resets_budget() {
        let mut envelope = ErrorEnvelope::new(
            RetryPolicy::new(1),
            CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 100,
                ..CircuitBreakerConfig::default()
            }),
        );
        let plan = envelope.plan_recovery(&timeout_error(), "op");
        assert_eq!(plan.strategy, RecoveryStrategy::Retry);
        envelope.record_success("op");
        let plan = envelope.plan_recovery(&timeout_error(), "op");
        assert_eq!(plan.strategy, RecoveryStrategy::Retry);
    }

    #[test]
    fn test_envelope_escalates_when_circuit_open() {
        let mut envelope = ErrorEnvelope::new(
            RetryPolicy::new(3),
            CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
                success_threshold: 1,
                half_open_max_calls: 1,
            }),
        );
        // First failure trips the breaker (threshold 1); plan escalates
        let plan = envelope.plan_recovery(&connection_error(), "connect");
        assert_eq!(plan.strategy, RecoveryStrategy::Escalate);
    }
}
