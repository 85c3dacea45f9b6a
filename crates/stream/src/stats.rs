use std::time::Duration;

/// Per-update streaming statistics for instrumentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub tick: u64,
    pub enqueued: usize,
    pub loaded: usize,
    pub unloaded: usize,
    pub relevelled: usize,
    pub failed: usize,
    /// Queued jobs dropped because the viewer moved away first.
    pub cancelled: usize,
    pub resident: usize,
    pub in_progress: usize,
    pub queued: usize,
    pub update_time: Duration,
}

/// Rolling window of per-tile generation times.
#[derive(Debug)]
pub struct GenerationTimer {
    history: Vec<Duration>,
    capacity: usize,
    index: usize,
    filled: bool,
}

impl GenerationTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: vec![Duration::ZERO; capacity],
            capacity,
            index: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        self.history[self.index] = dt;
        self.index = (self.index + 1) % self.capacity;
        if self.index == 0 {
            self.filled = true;
        }
    }

    pub fn len(&self) -> usize {
        if self.filled { self.capacity } else { self.index }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mean(&self) -> Duration {
        let count = self.len();
        if count == 0 {
            return Duration::ZERO;
        }
        let total: Duration = self.history[..count].iter().sum();
        total / count as u32
    }

    pub fn worst(&self) -> Duration {
        self.history[..self.len()]
            .iter()
            .copied()
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for GenerationTimer {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timer_reports_zero() {
        let timer = GenerationTimer::new(4);
        assert!(timer.is_empty());
        assert_eq!(timer.mean(), Duration::ZERO);
        assert_eq!(timer.worst(), Duration::ZERO);
    }

    #[test]
    fn window_drops_oldest_samples() {
        let mut timer = GenerationTimer::new(2);
        timer.record(Duration::from_millis(40));
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(30));

        assert_eq!(timer.len(), 2);
        assert_eq!(timer.mean(), Duration::from_millis(20));
        assert_eq!(timer.worst(), Duration::from_millis(30));
    }
}
