//! Agent invocation with timeout, interrupt watch, and retry/backoff.
//!
//! One call to [`Invoker::invoke`] performs a full turn's worth of attempts:
//! each attempt runs under the thinking indicator and the per-attempt
//! timeout, retryable failures back off exponentially, and the spinner row
//! is erased on every exit path before anything else is printed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::agent::{Agent, Response};
use crate::config::ChatConfig;
use crate::error::{Error, ErrorCategory, Result};
use crate::observability;
use crate::render::{Palette, Role};
use crate::spinner::Spinner;

/// How often the interrupt flag is polled during an attempt.
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Retry knobs resolved from the `behavior` config section.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts for retryable errors.
    pub max_retries: u32,
    /// Base backoff.
    pub retry_delay: Duration,
    /// Per-attempt deadline.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Resolves the policy for an agent from config.
    pub fn from_config(config: &ChatConfig, agent: Option<&str>) -> Self {
        Self {
            max_retries: config.get_u32("behavior.max_retries", 3, agent).max(1),
            retry_delay: Duration::from_secs_f64(
                config.get_f64("behavior.retry_delay", 2.0, agent).max(0.0),
            ),
            timeout: Duration::from_secs_f64(
                config.get_f64("behavior.timeout", 120.0, agent).max(0.001),
            ),
        }
    }

    /// Backoff before the attempt after `attempt` (counted from 0):
    /// `retry_delay × 2^attempt`, with a doubled base when rate limited.
    pub fn backoff(&self, category: ErrorCategory, attempt: u32) -> Duration {
        let base = if category == ErrorCategory::RateLimited {
            self.retry_delay * 2
        } else {
            self.retry_delay
        };
        base * 2u32.saturating_pow(attempt)
    }
}

/// The result of one successful turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The agent's response.
    pub response: Response,
    /// Duration of the successful attempt.
    pub duration: Duration,
    /// Attempts performed, including the successful one.
    pub attempts: u32,
}

/// Performs agent calls on behalf of the REPL.
pub struct Invoker {
    policy: RetryPolicy,
    spinner: Spinner,
}

impl Invoker {
    /// Creates an invoker with the given policy and indicator.
    pub fn new(policy: RetryPolicy, spinner: Spinner) -> Self {
        Self { policy, spinner }
    }

    /// The active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls the agent once per attempt until success, a non-retryable
    /// failure, or exhausted retries.
    ///
    /// At most one call is in flight at a time; the caller must not re-open
    /// the prompt until this returns. Retry announcements go through the
    /// palette; the final failure is left to the caller to render.
    pub async fn invoke(
        &self,
        agent: &mut dyn Agent,
        prompt: &str,
        interrupted: &Arc<AtomicBool>,
        palette: &Palette,
    ) -> Result<TurnOutcome> {
        let mut attempt = 0u32;
        loop {
            observability::INVOKE_ATTEMPTS.click();
            let started = Instant::now();
            let result = self.attempt(agent, prompt, interrupted).await;
            let duration = started.elapsed();

            match result {
                Ok(response) => {
                    info!(attempt, duration_s = duration.as_secs_f64(), "attempt succeeded");
                    return Ok(TurnOutcome {
                        response,
                        duration,
                        attempts: attempt + 1,
                    });
                }
                Err(err) => {
                    let category = ErrorCategory::of(&err);
                    if category == ErrorCategory::Cancelled {
                        observability::INVOKE_INTERRUPTS.click();
                        info!(attempt, "attempt cancelled by user");
                        return Err(err);
                    }
                    if !category.is_retryable() || attempt + 1 >= self.policy.max_retries {
                        error!(attempt, %err, category = %category, "attempt failed");
                        return Err(err);
                    }
                    let delay = self.policy.backoff(category, attempt);
                    warn!(attempt, %err, category = %category, delay_s = delay.as_secs_f64(), "retrying");
                    println!(
                        "{}",
                        palette.paint(
                            Role::Error,
                            &format!(
                                "{category} error (attempt {}/{}): {err}",
                                attempt + 1,
                                self.policy.max_retries
                            ),
                        )
                    );
                    println!(
                        "{}",
                        palette.paint(
                            Role::System,
                            &format!("Retrying in {:.1}s...", delay.as_secs_f64()),
                        )
                    );
                    observability::INVOKE_RETRIES.click();
                    observability::INVOKE_BACKOFF.add(delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One attempt: spinner up, race the agent against the deadline and the
    /// interrupt flag, spinner down.
    async fn attempt(
        &self,
        agent: &mut dyn Agent,
        prompt: &str,
        interrupted: &Arc<AtomicBool>,
    ) -> Result<Response> {
        let guard = self.spinner.start();
        let deadline = self.policy.timeout;
        let result = tokio::select! {
            outcome = tokio::time::timeout(deadline, agent.respond(prompt)) => {
                match outcome {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::timeout(
                        "agent call exceeded deadline",
                        Some(deadline.as_secs_f64()),
                    )),
                }
            }
            _ = wait_for_interrupt(interrupted) => {
                Err(Error::interrupted("agent call interrupted"))
            }
        };
        // Erase the spinner row before any further output.
        guard.stop();
        result
    }
}

async fn wait_for_interrupt(flag: &AtomicBool) {
    loop {
        if flag.swap(false, Ordering::Relaxed) {
            return;
        }
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spinner::SpinnerStyle;

    struct ScriptedAgent {
        script: Vec<Result<Response>>,
        calls: u32,
    }

    impl ScriptedAgent {
        fn new(script: Vec<Result<Response>>) -> Self {
            Self { script, calls: 0 }
        }
    }

    #[async_trait::async_trait]
    impl Agent for ScriptedAgent {
        async fn respond(&mut self, _prompt: &str) -> Result<Response> {
            self.calls += 1;
            if self.script.is_empty() {
                return Ok(Response::text("default"));
            }
            self.script.remove(0)
        }

        fn name(&self) -> &str {
            "Scripted"
        }
    }

    struct SleepyAgent;

    #[async_trait::async_trait]
    impl Agent for SleepyAgent {
        async fn respond(&mut self, _prompt: &str) -> Result<Response> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Response::text("never"))
        }

        fn name(&self) -> &str {
            "Sleepy"
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        }
    }

    fn quiet_invoker(policy: RetryPolicy) -> Invoker {
        Invoker::new(policy, Spinner::new(SpinnerStyle::Dots, false, false))
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let mut agent = ScriptedAgent::new(vec![Ok(Response::text("hi"))]);
        let invoker = quiet_invoker(fast_policy(3));
        let interrupted = Arc::new(AtomicBool::new(false));
        let outcome = invoker
            .invoke(&mut agent, "hello", &interrupted, &Palette::plain())
            .await
            .expect("success");
        assert_eq!(outcome.response.text, "hi");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(agent.calls, 1);
    }

    #[tokio::test]
    async fn retry_then_success() {
        let mut agent = ScriptedAgent::new(vec![
            Err(Error::timeout("t", None)),
            Err(Error::timeout("t", None)),
            Ok(Response::text("finally")),
        ]);
        let invoker = quiet_invoker(fast_policy(3));
        let interrupted = Arc::new(AtomicBool::new(false));
        let started = Instant::now();
        let outcome = invoker
            .invoke(&mut agent, "hello", &interrupted, &Palette::plain())
            .await
            .expect("success");
        assert_eq!(agent.calls, 3);
        assert_eq!(outcome.attempts, 3);
        // Two backoff sleeps: 10ms then 20ms.
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn configuration_error_is_not_retried() {
        let mut agent = ScriptedAgent::new(vec![Err(Error::agent(
            "The provided model ID isn't supported",
        ))]);
        let invoker = quiet_invoker(fast_policy(3));
        let interrupted = Arc::new(AtomicBool::new(false));
        let err = invoker
            .invoke(&mut agent, "hello", &interrupted, &Palette::plain())
            .await
            .unwrap_err();
        assert_eq!(agent.calls, 1);
        assert_eq!(ErrorCategory::of(&err), ErrorCategory::Configuration);
    }

    #[tokio::test]
    async fn retries_exhaust_and_surface_last_error() {
        let mut agent = ScriptedAgent::new(vec![
            Err(Error::connection("reset", None)),
            Err(Error::connection("reset", None)),
        ]);
        let invoker = quiet_invoker(fast_policy(2));
        let interrupted = Arc::new(AtomicBool::new(false));
        let err = invoker
            .invoke(&mut agent, "hello", &interrupted, &Palette::plain())
            .await
            .unwrap_err();
        assert_eq!(agent.calls, 2);
        assert_eq!(ErrorCategory::of(&err), ErrorCategory::TransientNetwork);
    }

    #[tokio::test]
    async fn timeout_bounds_an_attempt() {
        let mut agent = SleepyAgent;
        let invoker = quiet_invoker(fast_policy(1));
        let interrupted = Arc::new(AtomicBool::new(false));
        let err = invoker
            .invoke(&mut agent, "hello", &interrupted, &Palette::plain())
            .await
            .unwrap_err();
        assert_eq!(ErrorCategory::of(&err), ErrorCategory::Timeout);
    }

    #[tokio::test]
    async fn interrupt_cancels_without_retry() {
        let mut agent = SleepyAgent;
        let invoker = quiet_invoker(RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(60),
        });
        let interrupted = Arc::new(AtomicBool::new(true));
        let err = invoker
            .invoke(&mut agent, "hello", &interrupted, &Palette::plain())
            .await
            .unwrap_err();
        assert_eq!(ErrorCategory::of(&err), ErrorCategory::Cancelled);
        // Flag is consumed so the next read starts clean.
        assert!(!interrupted.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn rate_limit_backoff_doubles_base() {
        let policy = fast_policy(3);
        assert_eq!(
            policy.backoff(ErrorCategory::Timeout, 0),
            Duration::from_millis(10)
        );
        assert_eq!(
            policy.backoff(ErrorCategory::Timeout, 1),
            Duration::from_millis(20)
        );
        assert_eq!(
            policy.backoff(ErrorCategory::RateLimited, 0),
            Duration::from_millis(20)
        );
        assert_eq!(
            policy.backoff(ErrorCategory::RateLimited, 2),
            Duration::from_millis(80)
        );
    }

    #[test]
    fn policy_from_config() {
        let config = ChatConfig::builtin();
        let policy = RetryPolicy::from_config(&config, None);
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(2));
        assert_eq!(policy.timeout, Duration::from_secs(120));
    }
}
