//! Carga y gestión de configuración de la aplicación (servidor, LLM, almacén y troceado).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::chunking::ChunkOptions;

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Credenciales de Neo4j, sólo necesarias con `STORE_BACKEND=neo4j`.
#[derive(Clone, Debug)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub enum StoreBackend {
    Memory,
    Neo4j(Neo4jSettings),
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub store_backend: StoreBackend,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,

    pub chunking: ChunkOptions,
    pub quiz_min_points: usize,

    /// Directorio desde el que se pueden leer fuentes `pdf`/`file`. Sin él, se rechazan.
    pub source_root: Option<PathBuf>,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero leyendo de cualquier fuente clave → valor.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3322".to_string());

        let llm_provider_str = lookup("LLM_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model = lookup("LLM_CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        let store_backend = match lookup("STORE_BACKEND")
            .unwrap_or_else(|| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "neo4j" => StoreBackend::Neo4j(Neo4jSettings {
                uri: lookup("NEO4J_URI").ok_or_else(|| anyhow!("Falta NEO4J_URI en el entorno"))?,
                user: lookup("NEO4J_USER").ok_or_else(|| anyhow!("Falta NEO4J_USER en el entorno"))?,
                password: lookup("NEO4J_PASSWORD")
                    .ok_or_else(|| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?,
            }),
            other => return Err(anyhow!("Backend de almacenamiento no soportado: {other}")),
        };

        let defaults = ChunkOptions::default();
        let chunking = ChunkOptions {
            preserve_sentences: parse_var(&lookup, "CHUNK_PRESERVE_SENTENCES", defaults.preserve_sentences)?,
            min_chunk_size: parse_var(&lookup, "CHUNK_MIN_SIZE", defaults.min_chunk_size)?,
            max_chunk_size: parse_var(&lookup, "CHUNK_MAX_SIZE", defaults.max_chunk_size)?,
        };
        chunking
            .validate()
            .map_err(|e| anyhow!("CHUNK_MIN_SIZE/CHUNK_MAX_SIZE: {e}"))?;

        let quiz_min_points = parse_var(&lookup, "QUIZ_MIN_POINTS", 2)?;
        let source_root = lookup("SOURCE_ROOT")
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            server_addr,
            store_backend,
            llm_provider,
            llm_chat_model,
            chunking,
            quiz_min_points,
            source_root,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Valor inválido para {key} ('{raw}'): {e}")),
        None => Ok(default),
    }
}
