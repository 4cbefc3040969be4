use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 128;

/// Upload throughput over a sliding time window.
///
/// Shared by concurrent chunk uploads, so samples sit behind a mutex.
pub struct SpeedCalculator {
    inner: Mutex<Window>,
}

struct Window {
    samples: VecDeque<(Instant, u64)>,
    span: Duration,
    max_samples: usize,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_SAMPLES)
    }
}

impl SpeedCalculator {
    pub fn new(span: Duration, max_samples: usize) -> Self {
        Self {
            inner: Mutex::new(Window {
                samples: VecDeque::new(),
                span,
                max_samples: max_samples.max(2),
            }),
        }
    }

    /// Records `bytes` finished now.
    pub fn record(&self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    fn record_at(&self, now: Instant, bytes: u64) {
        let mut w = self.lock();
        w.samples.push_back((now, bytes));

        let span = w.span;
        while let Some(&(at, _)) = w.samples.front() {
            if now.duration_since(at) <= span {
                break;
            }
            w.samples.pop_front();
        }
        while w.samples.len() > w.max_samples {
            w.samples.pop_front();
        }
    }

    /// Average bytes per second across the window; `0.0` until two samples
    /// at distinct instants exist.
    ///
    /// The oldest sample only marks the start of the window: its bytes were
    /// transferred before it, so they are not counted.
    pub fn bytes_per_second(&self) -> f64 {
        let w = self.lock();
        let (Some(&(first, _)), Some(&(last, _))) = (w.samples.front(), w.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(first);
        if elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = w.samples.iter().skip(1).map(|&(_, b)| b).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Time left for `remaining` bytes at the current rate.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        (rate > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / rate))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rate_without_two_samples() {
        let calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        calc.record(100);
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn rate_over_window() {
        let calc = SpeedCalculator::default();
        let t0 = Instant::now();
        calc.record_at(t0, 500);
        calc.record_at(t0 + Duration::from_millis(500), 500);

        assert!((calc.bytes_per_second() - 1000.0).abs() < 1e-6);
        let eta = calc.eta(4000).unwrap();
        assert!((eta.as_secs_f64() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn old_samples_fall_out() {
        let calc = SpeedCalculator::new(Duration::from_secs(1), 16);
        let t0 = Instant::now();
        calc.record_at(t0, 1_000_000);
        calc.record_at(t0 + Duration::from_secs(5), 100);
        calc.record_at(t0 + Duration::from_secs(6), 100);

        assert!((calc.bytes_per_second() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn sample_count_is_bounded() {
        let calc = SpeedCalculator::new(Duration::from_secs(60), 4);
        let t0 = Instant::now();
        for i in 0..10 {
            calc.record_at(t0 + Duration::from_millis(i * 100), 10);
        }
        assert_eq!(calc.lock().samples.len(), 4);
    }
}
