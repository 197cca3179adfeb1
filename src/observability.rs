use biometrics::{Collector, Counter, Moments};

pub(crate) static TURNS: Counter = Counter::new("confab.loop.turns");
pub(crate) static TURN_ERRORS: Counter = Counter::new("confab.loop.turn_errors");
pub(crate) static TURN_DURATION: Moments = Moments::new("confab.loop.turn_duration_seconds");

pub(crate) static INVOKE_ATTEMPTS: Counter = Counter::new("confab.invoke.attempts");
pub(crate) static INVOKE_RETRIES: Counter = Counter::new("confab.invoke.retries");
pub(crate) static INVOKE_BACKOFF: Moments = Moments::new("confab.invoke.backoff_seconds");
pub(crate) static INVOKE_INTERRUPTS: Counter = Counter::new("confab.invoke.interrupts");

pub(crate) static TOKENS_IN: Counter = Counter::new("confab.usage.input_tokens");
pub(crate) static TOKENS_OUT: Counter = Counter::new("confab.usage.output_tokens");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&TURNS);
    collector.register_counter(&TURN_ERRORS);
    collector.register_moments(&TURN_DURATION);

    collector.register_counter(&INVOKE_ATTEMPTS);
    collector.register_counter(&INVOKE_RETRIES);
    collector.register_moments(&INVOKE_BACKOFF);
    collector.register_counter(&INVOKE_INTERRUPTS);

    collector.register_counter(&TOKENS_IN);
    collector.register_counter(&TOKENS_OUT);
}
