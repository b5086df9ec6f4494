//! Frontera con el servicio de generación de texto.
//!
//! El núcleo sólo depende del trait `TextGenerator`; `LlmManager` lo implementa
//! sobre Rig. De momento se implementa OpenAI; Gemini/Ollama quedan preparados
//! para el futuro.

use async_trait::async_trait;
use schemars::JsonSchema;
use thiserror::Error;
use tracing::info;

use crate::config::{AppConfig, LlmProvider};

/// Contenido devuelto por el servicio de generación. No es JSON de confianza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub content: String,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("el proveedor LLM {0} aún no está implementado")]
    Unsupported(String),

    #[error("la llamada al proveedor falló: {0}")]
    Provider(String),

    #[error("el servicio de generación no devolvió contenido utilizable")]
    EmptyResponse,
}

/// Servicio de generación: una única ida y vuelta, sin reintentos.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn invoke(&self, system_instructions: &str, user_payload: &str) -> Result<Generation, GenerationError>;
}

/// Invoca el generador y descarta respuestas vacías.
pub async fn generate_content(
    generator: &dyn TextGenerator,
    system_instructions: &str,
    user_payload: &str,
) -> Result<String, GenerationError> {
    let generation = generator.invoke(system_instructions, user_payload).await?;
    if generation.content.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(generation.content)
}

/// Esquema JSON de `T` listo para incrustar en unas instrucciones de sistema.
pub fn schema_instructions<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// Gestor de LLMs basado en Rig.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        }
    }

    fn model_name(&self) -> &str {
        if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        }
    }

    async fn invoke_openai(&self, system_instructions: &str, user_payload: &str) -> Result<String, GenerationError> {
        use rig::completion::Prompt;
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();
        let agent = client
            .agent(self.model_name())
            .preamble(system_instructions)
            .build();

        agent
            .prompt(user_payload)
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for LlmManager {
    async fn invoke(&self, system_instructions: &str, user_payload: &str) -> Result<Generation, GenerationError> {
        info!(
            "Llamada de generación al modelo {} ({} caracteres de payload)",
            self.model_name(),
            user_payload.len()
        );
        let content = match self.provider {
            LlmProvider::OpenAI => self.invoke_openai(system_instructions, user_payload).await?,
            ref other => return Err(GenerationError::Unsupported(format!("{other:?}"))),
        };
        Ok(Generation { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CardFace;

    struct Fixed(&'static str);

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn invoke(&self, _system: &str, _user: &str) -> Result<Generation, GenerationError> {
            Ok(Generation {
                content: self.0.to_string(),
            })
        }
    }

    #[test]
    fn whitespace_content_is_not_usable() {
        let result = tokio_test::block_on(generate_content(&Fixed("  \n "), "sys", "user"));
        assert!(matches!(result, Err(GenerationError::EmptyResponse)));
    }

    #[test]
    fn content_is_passed_through() {
        let result = tokio_test::block_on(generate_content(&Fixed("[]"), "sys", "user"));
        assert_eq!(result.unwrap(), "[]");
    }

    #[test]
    fn schema_mentions_every_field() {
        let schema = schema_instructions::<CardFace>();
        assert!(schema.contains("\"front\""));
        assert!(schema.contains("\"back\""));
    }

    #[test]
    fn unsupported_providers_fail_without_network() {
        let manager = LlmManager {
            provider: LlmProvider::Ollama,
            chat_model: String::new(),
        };
        let result = tokio_test::block_on(manager.invoke("sys", "user"));
        assert!(matches!(result, Err(GenerationError::Unsupported(_))));
    }
}
