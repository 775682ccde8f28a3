use std::time::Duration;

/// Delay schedule applied before each automatic reconnect.
///
/// Doubles from `initial_delay_ms` up to `max_delay_ms` for every
/// consecutive failed attempt, and resets once a session reaches Active.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    current_attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms: max_delay_ms.max(initial_delay_ms),
            current_attempt: 0,
        }
    }

    pub fn next_delay(&self) -> Duration {
        let factor = 2_u64.saturating_pow(self.current_attempt.min(32));
        let delay = std::cmp::min(
            self.initial_delay_ms.saturating_mul(factor),
            self.max_delay_ms,
        );
        Duration::from_millis(delay)
    }

    /// Consume one attempt and return how long to wait before making it
    pub fn next_attempt(&mut self) -> Duration {
        let delay = self.next_delay();
        self.current_attempt = self.current_attempt.saturating_add(1);

        log::warn!(
            "⏳ Reconnect attempt {} in {}ms",
            self.current_attempt,
            delay.as_millis()
        );

        delay
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
