use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// A helper structure to track per-step acquisition statistics, with both
/// *all-time* counters and a *sliding 1 s window* rate.
#[derive(Debug)]
pub struct Counter {
    /// All-time number of events
    pub n_events: usize,
    /// Time when this counter was created or last reset
    pub t_begin: Instant,

    // --- sliding window fields ---
    window: Duration,
    events: VecDeque<(Instant, usize)>,
    events_in_window: usize,
}

impl Default for Counter {
    fn default() -> Self {
        let now = Instant::now();
        Counter {
            n_events: 0,
            t_begin: now,
            window: Duration::from_secs(1),
            events: VecDeque::new(),
            events_in_window: 0,
        }
    }
}

impl Counter {
    /// Create a new Counter with a 1 s sliding window.
    pub fn new() -> Self {
        Default::default()
    }

    /// Long-term average rate since t_begin, in events/s.
    pub fn average_rate(&self) -> f64 {
        let secs = self.t_begin.elapsed().as_secs_f64().max(1e-6);
        self.n_events as f64 / secs
    }

    /// Sliding-window rate over the last `window` duration (default 1 s),
    /// in events/s.
    pub fn rate(&self) -> f64 {
        let secs = self.window.as_secs_f64().max(1e-6);
        self.events_in_window as f64 / secs
    }

    /// Record a batch of `count` events.
    /// Updates both the all-time totals and the sliding window.
    pub fn increment(&mut self, count: usize) {
        let now = Instant::now();

        self.n_events += count;

        self.events.push_back((now, count));
        self.events_in_window += count;

        // Evict any entries older than `window`
        while let Some(&(ts, n)) = self.events.front() {
            if now.duration_since(ts) > self.window {
                self.events.pop_front();
                self.events_in_window -= n;
            } else {
                break;
            }
        }
    }

    /// Reset both all-time counters and the sliding window.
    pub fn reset(&mut self) {
        self.n_events = 0;
        self.t_begin = Instant::now();

        self.events.clear();
        self.events_in_window = 0;
    }
}
