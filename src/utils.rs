use std::sync::{LazyLock, Mutex};

use ulid::{Generator, Ulid};

// Shared so that ids minted within the same millisecond still increase.
static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generates a time-based, lexicographically sortable task id.
///
/// Ids from one process are strictly increasing, so sorting a spool queue
/// directory by file name yields publish order.
pub fn time_sortable_uid() -> String {
    let mut generator = GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
    // Overflow needs 2^80 ids in one millisecond.
    generator
        .generate()
        .unwrap_or_else(|_| Ulid::new())
        .to_string()
}

/// Whether `id` is a task id minted by [`time_sortable_uid`].
pub fn is_valid_task_id(id: &str) -> bool {
    Ulid::from_string(id).is_ok()
}

/// Queue names end up as directory names in the spool broker.
pub fn is_valid_queue_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
