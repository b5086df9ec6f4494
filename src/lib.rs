//! Pipeline de material de estudio: troceado de texto, reparación de JSON del LLM,
//! apuntes, flashcards, tests y mapas mentales, más la capa HTTP que lo expone.

pub mod api;
pub mod app_state;
pub mod chunking;
pub mod config;
pub mod error;
pub mod flashcards;
pub mod llm;
pub mod mindmap;
pub mod models;
pub mod neo4j_client;
pub mod notes;
pub mod quiz;
pub mod repair;
pub mod source;
pub mod store;

pub use error::PipelineError;
pub use llm::{Generation, GenerationError, TextGenerator};
