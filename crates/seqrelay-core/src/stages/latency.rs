//! Simulated processing latency and failure injection.

use std::time::Duration;

use rand::Rng;

use seqrelay_types::config::StageConfig;

/// Uniform latency in `[min, max]` with an independent failure chance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyModel {
    min: Duration,
    max: Duration,
    failure_rate: f64,
}

impl LatencyModel {
    pub fn new(min: Duration, max: Duration, failure_rate: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &StageConfig) -> Self {
        Self::new(config.min_delay(), config.max_delay(), config.failure_rate)
    }

    /// Always `delay`, never fails.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 0.0)
    }

    /// Draw one delay and whether this attempt fails.
    pub fn sample(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let delay = if self.min == self.max {
            self.min
        } else {
            let ms = rng.gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
            Duration::from_millis(ms)
        };
        let fail = self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate);
        (delay, fail)
    }

    /// Sleep for one sampled delay; returns `true` if the attempt fails.
    pub async fn simulate(&self) -> bool {
        let (delay, fail) = self.sample();
        tokio::time::sleep(delay).await;
        fail
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}
