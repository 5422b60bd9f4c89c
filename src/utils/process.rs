use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use futures_util::future::BoxFuture;

/// Long-running unit supervised by the [`Hub`](crate::utils::hub::Hub).
///
/// `start` runs until the process ends on its own or is told to stop; `stop` asks a running
/// `start` to return and must be safe to call even if `start` already returned.
#[async_trait]
pub trait Process: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

type Action = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Process assembled from two closures.
pub struct FnProcess {
    name: String,
    start: Action,
    stop: Action,
}

impl FnProcess {
    pub fn new<S, T>(name: impl Into<String>, start: S, stop: T) -> Self
    where
        S: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
        T: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            start: Arc::new(start),
            stop: Arc::new(stop),
        }
    }
}

#[async_trait]
impl Process for FnProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        (self.start)().await
    }

    async fn stop(&self) -> Result<()> {
        (self.stop)().await
    }
}
