use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Ordered delays consumed by a polling loop. The first delay is normally zero
/// so the first attempt runs immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl Default for BackoffSchedule {
    /// 0, 100, 250, 500, 1000 ms: five attempts, 1.85 s of sleep at most.
    fn default() -> Self {
        Self::from_millis(&[0, 100, 250, 500, 1000])
    }
}

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(delays_ms: &[u64]) -> Self {
        Self::new(delays_ms.iter().copied().map(Duration::from_millis).collect())
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Run `attempt` once per scheduled delay until a result satisfies `accept`.
    ///
    /// Returns the first accepted result, otherwise the last non-empty result
    /// seen, otherwise `None`. Exhausting the schedule is never an error.
    pub async fn poll<T, F, Fut, P>(&self, mut attempt: F, accept: P) -> Option<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Option<T>>,
        P: Fn(&T) -> bool,
    {
        let mut last = None;

        for (index, delay) in self.delays.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }

            match attempt(index).await {
                Some(value) if accept(&value) => return Some(value),
                Some(value) => last = Some(value),
                None => {}
            }

            debug!(
                "Backoff attempt {}/{} not accepted",
                index + 1,
                self.delays.len()
            );
        }

        last
    }
}
