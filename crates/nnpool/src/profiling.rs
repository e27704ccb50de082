//! Lightweight scope profiler for kernel dispatch.
//!
//! Scopes nest per thread: each guard records inclusive time and the time not spent in child
//! scopes (exclusive). Recording is off unless [`set_enabled`] was called or `NNPOOL_PROFILE`
//! is set; disabled guards cost one atomic load.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum ProfilerKey {
    Functional {
        op: &'static str,
        implementation: &'static str,
    },
    Backend {
        name: &'static str,
    },
}

#[derive(Default, Clone)]
struct Stat {
    calls: u64,
    exclusive_ns: u128,
    inclusive_ns: u128,
}

struct Profiler {
    stats: Mutex<HashMap<ProfilerKey, Stat>>,
}

impl Profiler {
    fn instance() -> &'static Self {
        static INSTANCE: OnceLock<Profiler> = OnceLock::new();
        INSTANCE.get_or_init(|| Profiler {
            stats: Mutex::new(HashMap::new()),
        })
    }

    fn stats(&self) -> MutexGuard<'_, HashMap<ProfilerKey, Stat>> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, key: ProfilerKey, exclusive: Duration, inclusive: Duration) {
        let mut stats = self.stats();
        let entry = stats.entry(key).or_default();
        entry.calls = entry.calls.saturating_add(1);
        entry.exclusive_ns = entry.exclusive_ns.saturating_add(exclusive.as_nanos());
        entry.inclusive_ns = entry.inclusive_ns.saturating_add(inclusive.as_nanos());
    }
}

struct GuardFrame {
    key: ProfilerKey,
    start: Instant,
    child_time: Duration,
}

thread_local! {
    static ACTIVE_GUARDS: RefCell<Vec<GuardFrame>> = const { RefCell::new(Vec::new()) };
}

static ENABLED: AtomicBool = AtomicBool::new(false);
static ENV_CHECKED: OnceLock<()> = OnceLock::new();

/// Turns recording on or off for all threads.
pub fn set_enabled(enabled: bool) {
    ENV_CHECKED.get_or_init(|| ());
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENV_CHECKED.get_or_init(|| {
        if crate::env::profile_enabled() {
            ENABLED.store(true, Ordering::Relaxed);
        }
    });
    ENABLED.load(Ordering::Relaxed)
}

/// Drops everything recorded so far.
pub fn reset() {
    Profiler::instance().stats().clear();
}

/// RAII guard returned by the scope constructors; records on drop.
pub struct ScopeGuard {
    key: Option<ProfilerKey>,
}

impl ScopeGuard {
    #[inline]
    fn new(key: ProfilerKey) -> Self {
        if !is_enabled() {
            return ScopeGuard { key: None };
        }
        ACTIVE_GUARDS.with(|stack| {
            stack.borrow_mut().push(GuardFrame {
                key,
                start: Instant::now(),
                child_time: Duration::ZERO,
            });
        });
        ScopeGuard { key: Some(key) }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(expected) = self.key else {
            return;
        };
        ACTIVE_GUARDS.with(|stack| {
            let mut stack = stack.borrow_mut();
            let Some(frame) = stack.pop() else {
                return;
            };
            debug_assert!(frame.key == expected, "scope guard stack corrupted");

            let elapsed = frame.start.elapsed();
            let exclusive = elapsed.saturating_sub(frame.child_time);
            Profiler::instance().record(frame.key, exclusive, elapsed);

            if let Some(parent) = stack.last_mut() {
                parent.child_time = parent.child_time.saturating_add(elapsed);
            }
        });
    }
}

/// Scope around one kernel invocation for a pooling family.
#[inline]
pub fn functional_scope(op: &'static str, implementation: &'static str) -> ScopeGuard {
    ScopeGuard::new(ProfilerKey::Functional { op, implementation })
}

/// Scope around a backend-internal phase such as the channel fan-out.
#[inline]
pub fn backend_scope(name: &'static str) -> ScopeGuard {
    ScopeGuard::new(ProfilerKey::Backend { name })
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub name: String,
    pub calls: u64,
    pub per_ms: f64,
    pub excl_ms: f64,
    pub incl_ms: f64,
    pub percent: f64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ProfilerReport {
    pub functionals: Vec<TableRow>,
    pub backend: Vec<TableRow>,
}

impl ProfilerReport {
    pub fn is_empty(&self) -> bool {
        self.functionals.is_empty() && self.backend.is_empty()
    }

    /// Fixed-width text table, one section per category.
    pub fn format_table(&self) -> String {
        let mut out = String::new();
        for (title, rows) in [("functionals", &self.functionals), ("backend", &self.backend)] {
            if rows.is_empty() {
                continue;
            }
            let _ = writeln!(out, "== {title}");
            let _ = writeln!(
                out,
                "{:<40} {:>8} {:>10} {:>10} {:>10} {:>7}",
                "name", "calls", "per_ms", "excl_ms", "incl_ms", "%"
            );
            for row in rows {
                let _ = writeln!(
                    out,
                    "{:<40} {:>8} {:>10.3} {:>10.3} {:>10.3} {:>6.1}%",
                    row.name, row.calls, row.per_ms, row.excl_ms, row.incl_ms, row.percent
                );
            }
        }
        out
    }
}

fn to_rows(items: Vec<(String, Stat)>) -> Vec<TableRow> {
    let total_ns: f64 = items.iter().map(|(_, stat)| stat.exclusive_ns as f64).sum();
    let mut rows: Vec<TableRow> = items
        .into_iter()
        .map(|(name, stat)| {
            let excl_ms = stat.exclusive_ns as f64 / 1_000_000.0;
            let incl_ms = stat.inclusive_ns as f64 / 1_000_000.0;
            let per_ms = if stat.calls > 0 {
                excl_ms / stat.calls as f64
            } else {
                0.0
            };
            let percent = if total_ns > 0.0 {
                (stat.exclusive_ns as f64 / total_ns) * 100.0
            } else {
                0.0
            };
            TableRow {
                name,
                calls: stat.calls,
                per_ms,
                excl_ms,
                incl_ms,
                percent,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.percent
            .partial_cmp(&a.percent)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

/// Drains the recorded statistics into a report.
pub fn take_report() -> ProfilerReport {
    let stats = std::mem::take(&mut *Profiler::instance().stats());
    let mut functionals = Vec::new();
    let mut backend = Vec::new();
    for (key, stat) in stats {
        match key {
            ProfilerKey::Functional { op, implementation } => {
                functionals.push((format!("{op} ({implementation})"), stat));
            }
            ProfilerKey::Backend { name } => backend.push((name.to_string(), stat)),
        }
    }
    ProfilerReport {
        functionals: to_rows(functionals),
        backend: to_rows(backend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes_split_exclusive_time() {
        set_enabled(true);
        reset();
        {
            let _outer = functional_scope("profiling_test_op", "outer_impl");
            let _inner = backend_scope("profiling_test_inner");
            std::thread::sleep(Duration::from_millis(2));
        }
        let report = take_report();
        set_enabled(false);

        let outer = report
            .functionals
            .iter()
            .find(|row| row.name == "profiling_test_op (outer_impl)")
            .expect("outer scope recorded");
        let inner = report
            .backend
            .iter()
            .find(|row| row.name == "profiling_test_inner")
            .expect("inner scope recorded");
        assert_eq!(outer.calls, 1);
        assert!(inner.excl_ms >= 1.0);
        assert!(outer.incl_ms >= inner.incl_ms);
        assert!(outer.excl_ms < outer.incl_ms);
        assert!(report.format_table().contains("profiling_test_inner"));
    }
}
