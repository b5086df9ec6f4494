//! Persistencia de artefactos generados (apuntes, flashcards, quiz, mapa mental).
//!
//! Cada artefacto se guarda por (propietario, tipo, id de documento) como JSON.
//! Regenerar sobrescribe; no hay bloqueo entre escrituras concurrentes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Notes,
    Flashcards,
    Quiz,
    Mindmap,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Notes => "notes",
            ArtifactKind::Flashcards => "flashcards",
            ArtifactKind::Quiz => "quiz",
            ArtifactKind::Mindmap => "mindmap",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredArtifact {
    pub owner: String,
    pub kind: ArtifactKind,
    pub id: String,
    pub body: Value,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, owner: &str, kind: ArtifactKind, id: &str, body: Value) -> Result<StoredArtifact>;

    /// `Ok(None)` si no existe.
    async fn get(&self, owner: &str, kind: ArtifactKind, id: &str) -> Result<Option<StoredArtifact>>;
}

// --- Memoria ---

type ArtifactKey = (String, ArtifactKind, String);

#[derive(Default, Clone)]
pub struct InMemoryStore {
    artifacts: Arc<Mutex<HashMap<ArtifactKey, StoredArtifact>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryStore {
    async fn put(&self, owner: &str, kind: ArtifactKind, id: &str, body: Value) -> Result<StoredArtifact> {
        let artifact = StoredArtifact {
            owner: owner.to_string(),
            kind,
            id: id.to_string(),
            body,
            created_at: Utc::now(),
        };
        self.artifacts
            .lock()
            .map_err(|_| anyhow!("El almacén en memoria está envenenado"))?
            .insert((owner.to_string(), kind, id.to_string()), artifact.clone());
        debug!("Artefacto {kind} '{id}' guardado en memoria para '{owner}'");
        Ok(artifact)
    }

    async fn get(&self, owner: &str, kind: ArtifactKind, id: &str) -> Result<Option<StoredArtifact>> {
        let artifacts = self
            .artifacts
            .lock()
            .map_err(|_| anyhow!("El almacén en memoria está envenenado"))?;
        Ok(artifacts.get(&(owner.to_string(), kind, id.to_string())).cloned())
    }
}

// --- Neo4j ---

/// Un nodo `(:Artifact {owner, kind, id})` con el cuerpo serializado en `body`.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Arc<Graph>,
}

impl Neo4jStore {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl ArtifactStore for Neo4jStore {
    async fn put(&self, owner: &str, kind: ArtifactKind, id: &str, body: Value) -> Result<StoredArtifact> {
        let created_at = Utc::now();
        self.graph
            .run(
                query(
                    "MERGE (a:Artifact {owner: $owner, kind: $kind, id: $id})
                     SET a.body = $body, a.created_at = $created_at",
                )
                .param("owner", owner)
                .param("kind", kind.as_str())
                .param("id", id)
                .param("body", body.to_string())
                .param("created_at", created_at.to_rfc3339()),
            )
            .await?;
        info!("Artefacto {kind} '{id}' guardado en Neo4j para '{owner}'");

        Ok(StoredArtifact {
            owner: owner.to_string(),
            kind,
            id: id.to_string(),
            body,
            created_at,
        })
    }

    async fn get(&self, owner: &str, kind: ArtifactKind, id: &str) -> Result<Option<StoredArtifact>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (a:Artifact {owner: $owner, kind: $kind, id: $id})
                     RETURN a.body AS body, a.created_at AS created_at",
                )
                .param("owner", owner)
                .param("kind", kind.as_str())
                .param("id", id),
            )
            .await?;

        let Some(row) = cursor.next().await? else {
            return Ok(None);
        };

        let body: String = row
            .get("body")
            .map_err(|_| anyhow!("Artefacto {kind} '{id}' sin cuerpo"))?;
        let created_at: String = row
            .get("created_at")
            .map_err(|_| anyhow!("Artefacto {kind} '{id}' sin fecha de creación"))?;

        Ok(Some(StoredArtifact {
            owner: owner.to_string(),
            kind,
            id: id.to_string(),
            body: serde_json::from_str(&body)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_artifacts_are_none() {
        let store = InMemoryStore::new();
        assert!(store.get("ana", ArtifactKind::Notes, "doc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn artifacts_are_scoped_by_owner_and_kind() {
        let store = InMemoryStore::new();
        store.put("ana", ArtifactKind::Notes, "doc", json!({"title": "A"})).await.unwrap();

        assert!(store.get("luis", ArtifactKind::Notes, "doc").await.unwrap().is_none());
        assert!(store.get("ana", ArtifactKind::Quiz, "doc").await.unwrap().is_none());
        let found = store.get("ana", ArtifactKind::Notes, "doc").await.unwrap().unwrap();
        assert_eq!(found.body["title"], "A");
    }

    #[tokio::test]
    async fn regeneration_overwrites() {
        let store = InMemoryStore::new();
        store.put("ana", ArtifactKind::Quiz, "doc", json!(1)).await.unwrap();
        store.put("ana", ArtifactKind::Quiz, "doc", json!(2)).await.unwrap();
        let found = store.get("ana", ArtifactKind::Quiz, "doc").await.unwrap().unwrap();
        assert_eq!(found.body, json!(2));
    }

    #[test]
    fn kinds_serialize_lowercase() {
        assert_eq!(serde_json::to_value(ArtifactKind::Mindmap).unwrap(), json!("mindmap"));
        assert_eq!(ArtifactKind::Flashcards.to_string(), "flashcards");
    }
}
