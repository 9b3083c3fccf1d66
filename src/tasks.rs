use serde_json::json;

use crate::mq::TaskQueue;

/// Tasks every deployment ships with.
pub fn register_builtin_tasks(queue: &TaskQueue) {
    // Round-trip check for the web -> broker -> worker path.
    queue.register("ping", |ctx, _args| async move {
        Ok::<_, anyhow::Error>(json!({ "pong": ctx.name.as_ref() }))
    });
}
