use anyhow::Result;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

use crate::config::Neo4jSettings;

pub async fn connect(settings: &Neo4jSettings) -> Result<Graph> {
    let url = Url::parse(&settings.uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &settings.user, &settings.password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Un único nodo :Artifact por (owner, kind, id).
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    let statements = [
        "CREATE CONSTRAINT artifact_key IF NOT EXISTS
         FOR (a:Artifact)
         REQUIRE (a.owner, a.kind, a.id) IS UNIQUE",
        "CREATE INDEX artifact_owner IF NOT EXISTS
         FOR (a:Artifact)
         ON (a.owner)",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("Esquema de Neo4j asegurado (constraint de :Artifact).");
    Ok(())
}
