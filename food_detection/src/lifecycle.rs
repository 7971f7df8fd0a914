use crate::model_service::{ModelLoadError, ModelService};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, OnceLock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl ModelStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ModelStatus::Loading,
            2 => ModelStatus::Ready,
            3 => ModelStatus::Failed,
            _ => ModelStatus::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ModelStatus::Uninitialized => 0,
            ModelStatus::Loading => 1,
            ModelStatus::Ready => 2,
            ModelStatus::Failed => 3,
        }
    }
}

/// Holds the process-wide model and its one-way startup transition:
/// `Uninitialized -> Loading -> Ready | Failed`.
pub struct ModelLifecycle<M: ModelService> {
    status: AtomicU8,
    model: OnceLock<Arc<M>>,
}

impl<M: ModelService> Default for ModelLifecycle<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ModelService> ModelLifecycle<M> {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(ModelStatus::Uninitialized.as_u8()),
            model: OnceLock::new(),
        }
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModelStatus::Ready
    }

    /// The loaded model, only once the lifecycle reached `Ready`.
    pub fn model(&self) -> Option<Arc<M>> {
        if !self.is_ready() {
            return None;
        }
        self.model.get().cloned()
    }

    /// Moves `Uninitialized -> Loading`. Returns false if loading already started.
    pub fn begin_loading(&self) -> bool {
        self.status
            .compare_exchange(
                ModelStatus::Uninitialized.as_u8(),
                ModelStatus::Loading.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Settles a `Loading` lifecycle. Has no effect in any other state.
    pub fn complete(&self, result: Result<M, ModelLoadError>) -> ModelStatus {
        if self.status() != ModelStatus::Loading {
            return self.status();
        }

        let next = match result {
            Ok(model) => {
                if self.model.set(Arc::new(model)).is_err() {
                    tracing::error!("Model handle was already set");
                    ModelStatus::Failed
                } else {
                    tracing::info!("Model loaded");
                    ModelStatus::Ready
                }
            }
            Err(e) => {
                tracing::error!("Model loading failed: {}", e);
                ModelStatus::Failed
            }
        };

        self.status.store(next.as_u8(), Ordering::Release);
        next
    }

    /// Runs `loader` on the blocking pool and settles the lifecycle with its result.
    pub async fn load_with<F>(&self, loader: F) -> ModelStatus
    where
        F: FnOnce() -> Result<M, ModelLoadError> + Send + 'static,
    {
        if !self.begin_loading() {
            tracing::warn!("Model loading requested twice, keeping {:?}", self.status());
            return self.status();
        }

        let result = match tokio::task::spawn_blocking(loader).await {
            Ok(result) => result,
            Err(e) => Err(ModelLoadError::Worker(e.to_string())),
        };

        self.complete(result)
    }
}
