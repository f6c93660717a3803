use crate::prtls::ParticleRef;
use serde::Deserialize;

/// Minimum bundles per task under `TaskPolicy::Bunch`.
pub const BUNCH_BUNDLES: usize = 4;

/// How the sorted particle list is split into tasks. A tuning choice only:
/// every policy covers each particle exactly once.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskPolicy {
    /// As many near-equal ranges as there are tasks.
    Spread,
    /// Fewer, larger ranges that never split a cell.
    Bunch,
}

impl Default for TaskPolicy {
    fn default() -> TaskPolicy {
        TaskPolicy::Spread
    }
}

/// Splits `[0, n)` into `min(tasks, n)` ranges whose lengths differ by at
/// most one. Returns the boundaries, first 0 and last `n`.
pub fn spread_tasks(n: usize, tasks: usize) -> Vec<usize> {
    if n == 0 {
        return vec![0];
    }
    let t = tasks.max(1).min(n);
    (0..=t).map(|k| k * n / t).collect()
}

/// Splits the sorted references into ranges of at least
/// `BUNCH_BUNDLES * bundle` particles (or `n / tasks`, if larger). A range
/// boundary is pushed forward until the cell key changes.
pub fn bunch_tasks(sorted: &[ParticleRef], tasks: usize, bundle: usize) -> Vec<usize> {
    let n = sorted.len();
    let mut task_map = vec![0];
    if n == 0 {
        return task_map;
    }
    let tasks = tasks.max(1);
    let chunk = ((n + tasks - 1) / tasks).max(BUNCH_BUNDLES * bundle.max(1));
    let mut lo = 0;
    while lo < n {
        let mut hi = (lo + chunk).min(n);
        while hi < n && sorted[hi].key == sorted[hi - 1].key {
            hi += 1;
        }
        task_map.push(hi);
        lo = hi;
    }
    task_map
}
