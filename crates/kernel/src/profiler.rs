use std::collections::BTreeMap;
use std::time::Duration;

/// Timing aggregate for one profiled label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileStats {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
    pub last: Duration,
}

impl ProfileStats {
    fn first(sample: Duration) -> Self {
        Self {
            count: 1,
            total: sample,
            min: sample,
            max: sample,
            last: sample,
        }
    }

    fn push(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.last = sample;
    }

    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / self.count as u32
    }
}

/// Wall-clock timings keyed by label. Disabled by default; `record` is a
/// no-op until enabled.
///
/// The scheduler records `stage:<label>` and `system:<id>` entries.
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    enabled: bool,
    entries: BTreeMap<String, ProfileStats>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, name: &str, sample: Duration) {
        if !self.enabled {
            return;
        }
        match self.entries.get_mut(name) {
            Some(stats) => stats.push(sample),
            None => {
                self.entries
                    .insert(name.to_string(), ProfileStats::first(sample));
            }
        }
    }

    pub fn stats(&self, name: &str) -> Option<&ProfileStats> {
        self.entries.get(name)
    }

    /// Every entry, sorted by name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ProfileStats)> + '_ {
        self.entries.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let mut profiler = Profiler::new();
        profiler.record("stage:Update", Duration::from_millis(1));
        assert!(!profiler.is_enabled());
        assert!(profiler.stats("stage:Update").is_none());
    }

    #[test]
    fn aggregates_samples() {
        let mut profiler = Profiler::new();
        profiler.set_enabled(true);
        profiler.record("system:move", Duration::from_millis(10));
        profiler.record("system:move", Duration::from_millis(20));
        profiler.record("system:move", Duration::from_millis(30));

        let stats = profiler.stats("system:move").unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.average(), Duration::from_millis(20));
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(30));
        assert_eq!(stats.last, Duration::from_millis(30));
    }

    #[test]
    fn entries_sorted_and_reset() {
        let mut profiler = Profiler::new();
        profiler.set_enabled(true);
        profiler.record("system:b", Duration::ZERO);
        profiler.record("stage:Update", Duration::ZERO);
        profiler.record("system:a", Duration::ZERO);
        let names: Vec<&str> = profiler.entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["stage:Update", "system:a", "system:b"]);

        profiler.reset();
        assert_eq!(profiler.entries().count(), 0);
    }
}
