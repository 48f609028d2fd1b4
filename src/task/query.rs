//! Scheduler query: which tasks should fire now.

use crate::schedule::Timestamp;
use crate::task::model::TaskRecord;

/// Tasks that are active and due at `now`, soonest first.
///
/// Ties on `next_run_at` keep the input order.
pub fn runnable<'a>(
    tasks: impl IntoIterator<Item = &'a TaskRecord>,
    now: Timestamp,
) -> Vec<&'a TaskRecord> {
    let mut due: Vec<&TaskRecord> = tasks.into_iter().filter(|t| t.is_runnable(now)).collect();
    sort_by_next_run(&mut due);
    due
}

/// Stable sort by `next_run_at`; tasks without one go last.
pub fn sort_by_next_run(tasks: &mut [&TaskRecord]) {
    tasks.sort_by_key(|t| (t.next_run_at.is_none(), t.next_run_at));
}
