//! Statistics Accumulator

use crate::pbrt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Return the global statistics accumulator.
pub fn stats_accumulator() -> &'static Mutex<StatsAccumulator> {
    static DATA: OnceLock<Mutex<StatsAccumulator>> = OnceLock::new();
    DATA.get_or_init(|| Mutex::new(StatsAccumulator::new()))
}

/// Lock a statistics mutex. A poisoned lock only means a worker panicked
/// while reporting; the counters are still usable.
///
/// * `m` - The mutex.
pub fn lock_stats<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Integer distribution statistic.
#[derive(Default, Copy, Clone, Debug)]
pub struct StatsDistribution {
    /// Sum of all values.
    sum: i64,

    /// Count of all values.
    count: u64,

    /// Minimum value.
    min: Option<i64>,

    /// Maximum value.
    max: Option<i64>,
}

impl StatsDistribution {
    /// Accumulate another distribution.
    ///
    /// * `distrib` - The distribution to merge.
    pub fn accumulate(&mut self, distrib: Self) {
        self.sum += distrib.sum;
        self.count += distrib.count;
        self.min = match (self.min, distrib.min) {
            (Some(a), Some(b)) => Some(pbrt::min(a, b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, distrib.max) {
            (Some(a), Some(b)) => Some(pbrt::max(a, b)),
            (a, b) => a.or(b),
        };
    }

    /// Report a sample value.
    ///
    /// * `val`  - Sample value.
    pub fn report(&mut self, val: i64) {
        self.accumulate(Self {
            sum: val,
            count: 1,
            min: Some(val),
            max: Some(val),
        });
    }

    /// Returns the average of the reported values.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// Returns the number of reported values.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Clear stats.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Aggregate different types of statistics.
#[derive(Default)]
pub struct StatsAccumulator {
    /// Counters.
    counters: HashMap<String, i64>,

    /// Integer distribution.
    int_distribution: HashMap<String, StatsDistribution>,

    /// Percentages.
    percentages: HashMap<String, (i64, i64)>,
}

impl StatsAccumulator {
    /// Create a new instance of `StatsAccumulator`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates a counter value.
    ///
    /// * `name` - Statistic name.
    /// * `val`  - Counter value.
    pub fn report_counter(&mut self, name: &str, val: i64) {
        *self.counters.entry(name.to_string()).or_insert(0) += val;
    }

    /// Accumulates integer distribution samples.
    ///
    /// * `name`    - Statistic name.
    /// * `distrib` - Distribution.
    pub fn report_int_distribution(&mut self, name: &str, distrib: StatsDistribution) {
        self.int_distribution
            .entry(name.to_string())
            .or_default()
            .accumulate(distrib);
    }

    /// Accumulates a percentage value.
    ///
    /// * `name`  - Statistic name.
    /// * `num`   - Numerator (actual count).
    /// * `denom` - Denominator (total count).
    pub fn report_percentage(&mut self, name: &str, num: i64, denom: i64) {
        let v = self.percentages.entry(name.to_string()).or_insert((0, 0));
        v.0 += num;
        v.1 += denom;
    }

    /// Returns an accumulated counter.
    ///
    /// * `name` - Statistic name.
    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.get(name).copied()
    }

    /// Returns an accumulated percentage as (numerator, denominator).
    ///
    /// * `name` - Statistic name.
    pub fn percentage(&self, name: &str) -> Option<(i64, i64)> {
        self.percentages.get(name).copied()
    }

    /// Returns an accumulated distribution.
    ///
    /// * `name` - Statistic name.
    pub fn int_distribution(&self, name: &str) -> Option<StatsDistribution> {
        self.int_distribution.get(name).copied()
    }

    /// Formats the report grouped by category.
    pub fn report(&self) -> String {
        let mut to_print: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (k, v) in self.counters.iter().filter(|(_, v)| **v != 0) {
            let (category, title) = get_category_and_title(k);
            to_print
                .entry(category)
                .or_default()
                .push(format!("{title:-42}               {v:12}"));
        }

        for (k, v) in self.int_distribution.iter().filter(|(_, v)| v.count > 0) {
            let (category, title) = get_category_and_title(k);
            let mn = v.min.unwrap_or(i64::MAX);
            let mx = v.max.unwrap_or(i64::MIN);
            let avg = v.average();
            to_print.entry(category).or_default().push(format!(
                "{title:-42}                      {avg:.3} avg [range {mn} - {mx}]"
            ));
        }

        for (k, &(num, denom)) in self.percentages.iter().filter(|(_, v)| v.1 != 0) {
            let (category, title) = get_category_and_title(k);
            to_print.entry(category).or_default().push(format!(
                "{title:-42}{num:12} / {denom:12} ({:.2}%)",
                (100.0 * num as f64) / denom as f64,
            ));
        }

        let mut out = String::from("Statistics:\n");
        for (category, mut items) in to_print {
            items.sort();
            out.push_str(&format!("  {category}\n"));
            for item in items {
                out.push_str(&format!("    {item}\n"));
            }
        }
        out
    }

    /// Prints the report.
    pub fn print(&self) {
        print!("{}", self.report());
    }

    /// Clear the accumulated statistics.
    pub fn clear(&mut self) {
        self.counters.clear();
        self.int_distribution.clear();
        self.percentages.clear();
    }
}

/// Splits a statistic name at the first `/` as the separator and returns
/// category and title. If there is no `/`, then category is the empty string.
///
/// * `s` - The statistic name to split.
fn get_category_and_title(s: &str) -> (String, String) {
    match s.split_once('/') {
        Some((category, title)) => (category.to_string(), title.to_string()),
        None => (String::new(), s.to_string()),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_and_title() {
        assert_eq!(
            get_category_and_title("Integrator/Camera paths"),
            ("Integrator".to_string(), "Camera paths".to_string())
        );
        assert_eq!(
            get_category_and_title("Paths"),
            ("".to_string(), "Paths".to_string())
        );
    }

    #[test]
    fn distribution_merges_ranges() {
        let mut a = StatsDistribution::default();
        a.report(3);
        a.report(7);

        let mut b = StatsDistribution::default();
        b.report(1);

        a.accumulate(b);
        assert_eq!(a.count(), 3);
        assert_eq!(a.min, Some(1));
        assert_eq!(a.max, Some(7));
        assert!((a.average() - 11.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn accumulates_counters_and_percentages() {
        let mut accum = StatsAccumulator::new();
        accum.report_counter("Integrator/Camera paths", 4);
        accum.report_counter("Integrator/Camera paths", 6);
        accum.report_percentage("Integrator/Russian roulette", 1, 4);
        accum.report_percentage("Integrator/Russian roulette", 1, 6);

        assert_eq!(accum.counter("Integrator/Camera paths"), Some(10));
        assert_eq!(accum.percentage("Integrator/Russian roulette"), Some((2, 10)));

        let report = accum.report();
        assert!(report.contains("Integrator"));
        assert!(report.contains("Camera paths"));

        accum.clear();
        assert_eq!(accum.counter("Integrator/Camera paths"), None);
    }
}
