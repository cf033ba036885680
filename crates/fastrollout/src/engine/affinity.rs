//! Best-effort CPU pinning layout.
//!
//! Core 0 goes to the caller, workers cycle through the cores above it,
//! and each background loader takes a core from the top of the set. When
//! the machine has fewer cores than threads, assignments wrap around the
//! available set instead of failing.

use core_affinity::CoreId;

pub(crate) struct AffinityPlan {
    pub caller: Option<CoreId>,
    pub workers: Vec<Option<CoreId>>,
    pub loaders: Vec<Option<CoreId>>,
}

impl AffinityPlan {
    fn disabled(num_workers: usize, num_loaders: usize) -> Self {
        Self {
            caller: None,
            workers: vec![None; num_workers],
            loaders: vec![None; num_loaders],
        }
    }
}

pub(crate) fn plan(num_workers: usize, num_loaders: usize, enabled: bool) -> AffinityPlan {
    if !enabled {
        return AffinityPlan::disabled(num_workers, num_loaders);
    }
    let Some(cores) = core_affinity::get_core_ids() else {
        tracing::warn!("core enumeration failed; running without affinity");
        return AffinityPlan::disabled(num_workers, num_loaders);
    };
    if cores.is_empty() {
        return AffinityPlan::disabled(num_workers, num_loaders);
    }

    let caller = Some(cores[0]);

    let loaders = (0..num_loaders)
        .map(|i| Some(cores[cores.len() - 1 - (i % cores.len())]))
        .collect();

    // Workers live between the caller core and the loader cores.
    let worker_cores = cores
        .len()
        .saturating_sub(1 + num_loaders)
        .max(1);
    let workers = (0..num_workers)
        .map(|i| Some(cores[(1 + (i % worker_cores)) % cores.len()]))
        .collect();

    AffinityPlan {
        caller,
        workers,
        loaders,
    }
}

pub(crate) fn pin(core: Option<CoreId>) {
    if let Some(core) = core {
        core_affinity::set_for_current(core);
    }
}
