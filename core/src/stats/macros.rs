//! Macros

/// Create a thread local variable to track an `i64` counter across threads.
///
/// * `$title`      - Descriptive title of the statistic that uses `/` as a separator for categories.
///                   For example: "Integrator/Camera paths",
/// * `$var`        - An identifier for the thread local variable.
/// * `$stats_func` - An identifier for the callback function used by `StatsRegistrar::call_stat_funcs()` to report
///                   to `StatsAccumulator`.
#[macro_export]
macro_rules! stat_counter {
    ($title: expr, $var: ident, $stats_func: ident $(,)?) => {
        thread_local! { pub(crate) static $var: std::cell::RefCell<i64> = std::cell::RefCell::new(0); }

        pub(crate) fn $stats_func(accum: &mut $crate::stats::StatsAccumulator) {
            let val = $var.with(|v| v.replace(0));
            accum.report_counter($title, val);
        }
    };
}

/// Create a thread local variable to track an integer distribution across threads.
///
/// * `$title`      - Descriptive title of the statistic that uses `/` as a separator for categories.
/// * `$var`        - An identifier for the thread local variable.
/// * `$stats_func` - An identifier for the reporting callback function.
#[macro_export]
macro_rules! stat_int_distribution {
    ($title: expr, $var: ident, $stats_func: ident $(,)?) => {
        thread_local! {
            pub(crate) static $var: std::cell::RefCell<$crate::stats::StatsDistribution> =
                std::cell::RefCell::new($crate::stats::StatsDistribution::default());
        }

        pub(crate) fn $stats_func(accum: &mut $crate::stats::StatsAccumulator) {
            let val = $var.with(|v| v.replace($crate::stats::StatsDistribution::default()));
            accum.report_int_distribution($title, val);
        }
    };
}

/// Create thread local variables to track `i64` values for numerator/denominator as percentage across threads.
///
/// * `$title`      - Descriptive title of the statistic that uses `/` as a separator for categories.
/// * `$var_num`    - An identifier for the thread local variable for numerator (actual count).
/// * `$var_denom`  - An identifier for the thread local variable for denominator (total count).
/// * `$stats_func` - An identifier for the reporting callback function.
#[macro_export]
macro_rules! stat_percent {
    ($title: expr, $var_num: ident, $var_denom: ident, $stats_func: ident $(,)?) => {
        thread_local! {
            pub(crate) static $var_num: std::cell::RefCell<i64> = std::cell::RefCell::new(0);
            pub(crate) static $var_denom: std::cell::RefCell<i64> = std::cell::RefCell::new(0);
        }

        pub(crate) fn $stats_func(accum: &mut $crate::stats::StatsAccumulator) {
            let num = $var_num.with(|v| v.replace(0));
            let denom = $var_denom.with(|v| v.replace(0));
            accum.report_percentage($title, num, denom);
        }
    };
}

/// Convenience macro to increment a thread local variable for counter/percent statistics.
#[macro_export]
macro_rules! stat_inc {
    ($var: ident, $e: expr) => {
        $var.with(|v| *v.borrow_mut() += $e);
    };
}

/// Convenience macro to report a value to a thread local distribution statistic.
#[macro_export]
macro_rules! stat_dist {
    ($var: ident, $e: expr) => {
        $var.with(|v| v.borrow_mut().report($e));
    };
}

/// Convenience macro to register the callback functions for statistics.
///
/// * `$($func: ident),+` - One or more callback functions created by the `stat_*` macros.
#[macro_export]
macro_rules! stat_register_fns {
    ($($stat_func: ident),+ $(,)?) => {
        /// Register this module's statistics with the global registrar. Call it
        /// from a top-level constructor, not per path.
        pub(crate) fn register_stats() {
            static REGISTERED: std::sync::Once = std::sync::Once::new();
            REGISTERED.call_once(|| {
                let mut sr = $crate::stats::lock_stats($crate::stats::stats_registrar());
                $(
                    sr.register_stat_func($stat_func);
                )+
            });
        }
    };
}

/// Accumulate the calling thread's statistics in the global `StatsAccumulator`.
/// Call at the end of each worker thread and from the main thread when
/// rendering finishes.
#[macro_export]
macro_rules! report_stats {
    () => {{
        let mut accum = $crate::stats::lock_stats($crate::stats::stats_accumulator());
        $crate::stats::lock_stats($crate::stats::stats_registrar()).call_stat_funcs(&mut accum);
    }};
}

/// Print the accumulated statistics in the global `StatsAccumulator`.
#[macro_export]
macro_rules! print_stats {
    () => {{
        $crate::stats::lock_stats($crate::stats::stats_accumulator()).print();
    }};
}
