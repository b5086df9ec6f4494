use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{config::AppConfig, llm::TextGenerator, store::ArtifactStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn ArtifactStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl AppState {
    /// Estado listo para servir y el receptor de la señal de apagado.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ArtifactStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let state = Self {
            config,
            store,
            generator,
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: "Servidor listo.".to_string(),
                progress: 0.0,
            })),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
        };
        (state, shutdown_rx)
    }

    /// Actualiza el estado visible en `/api/status`. Un mutex envenenado se ignora.
    pub fn set_status(&self, is_busy: bool, message: impl Into<String>, progress: f32) {
        if let Ok(mut status) = self.status.lock() {
            status.is_busy = is_busy;
            status.message = message.into();
            status.progress = progress;
        }
    }

    pub fn status_snapshot(&self) -> Status {
        self.status.lock().map(|s| s.clone()).unwrap_or_default()
    }
}
