use std::env;
use std::sync::OnceLock;

static NNPOOL_KERNEL_POLICY: OnceLock<Option<String>> = OnceLock::new();
static NNPOOL_NUM_THREADS: OnceLock<Option<usize>> = OnceLock::new();
static NNPOOL_MIN_PARALLEL_COST: OnceLock<Option<u64>> = OnceLock::new();
static NNPOOL_PROFILE: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

/// Raw JSON object of kernel overrides, e.g. `{"max_pool": "force=reference"}`.
pub(crate) fn kernel_policy() -> Option<&'static str> {
    NNPOOL_KERNEL_POLICY
        .get_or_init(|| non_empty("NNPOOL_KERNEL_POLICY"))
        .as_deref()
}

pub(crate) fn num_threads() -> Option<usize> {
    *NNPOOL_NUM_THREADS.get_or_init(|| {
        non_empty("NNPOOL_NUM_THREADS")
            .and_then(|value| value.parse().ok())
            .filter(|&threads: &usize| threads > 0)
    })
}

pub(crate) fn min_parallel_cost() -> Option<u64> {
    *NNPOOL_MIN_PARALLEL_COST
        .get_or_init(|| non_empty("NNPOOL_MIN_PARALLEL_COST").and_then(|value| value.parse().ok()))
}

pub(crate) fn profile_enabled() -> bool {
    *NNPOOL_PROFILE.get_or_init(|| match non_empty("NNPOOL_PROFILE") {
        Some(value) => parse_bool(&value),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for raw in ["1", "true", " YES ", "On"] {
            assert!(parse_bool(raw), "{raw} should parse as true");
        }
        for raw in ["0", "false", "off", "maybe"] {
            assert!(!parse_bool(raw), "{raw} should parse as false");
        }
    }
}
