use std::{future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use serde_json::Value;

use crate::state::AppContext;

pub type TaskBody = dyn Fn(AppContext, Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// A registered task whose body always runs inside the application context.
pub struct ContextTask {
    name: String,
    context: AppContext,
    body: Arc<TaskBody>,
}

impl ContextTask {
    pub fn new<F, Fut>(name: impl Into<String>, context: AppContext, body: F) -> Self
    where
        F: Fn(AppContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let body: Arc<TaskBody> =
            Arc::new(move |ctx: AppContext, args: Value| body(ctx, args).boxed());
        Self {
            name: name.into(),
            context,
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, args: Value) -> anyhow::Result<Value> {
        let ctx = self.context.clone();
        let body = Arc::clone(&self.body);
        self.context.scope(async move { body(ctx, args).await }).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{config::Settings, state::current_app};

    #[tokio::test]
    async fn body_sees_current_app() {
        let mut settings = Settings::default();
        settings.name = "ctx-test".to_string();
        let task = ContextTask::new("whoami", AppContext::new(settings), |ctx, args| async move {
            let current = current_app().expect("inside app context");
            Ok::<_, anyhow::Error>(json!({
                "explicit": ctx.name.as_ref(),
                "ambient": current.name.as_ref(),
                "args": args,
            }))
        });

        assert_eq!(task.name(), "whoami");
        let out = task.call(json!([1, 2])).await.unwrap();
        assert_eq!(out["explicit"], "ctx-test");
        assert_eq!(out["ambient"], "ctx-test");
        assert_eq!(out["args"], json!([1, 2]));
    }
}
