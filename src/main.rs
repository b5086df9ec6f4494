use std::sync::Arc;

use study_artifacts::{
    api,
    app_state::AppState,
    config::{self, StoreBackend},
    llm::{LlmManager, TextGenerator},
    neo4j_client,
    store::{ArtifactStore, InMemoryStore, Neo4jStore},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");

    // 3. Almacén de artefactos (memoria o Neo4j)
    let store: Arc<dyn ArtifactStore> = match &cfg.store_backend {
        StoreBackend::Memory => {
            info!("Usando almacén en memoria; los artefactos se pierden al cerrar.");
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Neo4j(settings) => {
            let graph = neo4j_client::connect(settings)
                .await
                .expect("Error conectando a Neo4j");
            neo4j_client::ensure_schema(&graph)
                .await
                .expect("Error asegurando el esquema de Neo4j");
            Arc::new(Neo4jStore::new(Arc::new(graph)))
        }
    };

    // 4. Servicio de generación
    let generator: Arc<dyn TextGenerator> = Arc::new(LlmManager::from_config(&cfg));

    // 5. Estado compartido y router
    let (app_state, shutdown_rx) = AppState::new(cfg.clone(), store, generator);
    let app = api::create_router(app_state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 6. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .expect("No se pudo abrir la dirección del servidor");
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("Error en el servidor HTTP");

    info!("✅ Servidor cerrado correctamente.");
}
