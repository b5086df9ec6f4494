//! Taxonomía de errores del pipeline de artefactos de estudio.

use thiserror::Error;

use crate::llm::GenerationError;
use crate::repair::RecoveryError;

/// Error devuelto por las operaciones del núcleo (apuntes, flashcards, tests, mapas).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// La entrada viola una precondición y no existe un resultado por defecto razonable.
    #[error("entrada no válida: {0}")]
    Validation(String),

    /// El servicio de generación falló o no devolvió contenido utilizable.
    #[error("fallo de generación: {0}")]
    Generation(#[from] GenerationError),

    /// La escalera de reparación se agotó o el valor recuperado no encaja con la forma esperada.
    #[error("documento mal formado: {reason}")]
    MalformedDocument {
        raw: String,
        fixes_attempted: Vec<String>,
        reason: String,
    },

    /// Un invariante estructural concreto falló tras el parseo (p.ej. MCQ sin 4 opciones).
    #[error("violación de forma: {0}")]
    ShapeViolation(String),
}

impl PipelineError {
    /// Convierte cualquier fallo del parser en `MalformedDocument`.
    pub fn malformed(err: RecoveryError) -> Self {
        let reason = err.to_string();
        let (raw, fixes_attempted) = err.into_diagnostics();
        PipelineError::MalformedDocument {
            raw,
            fixes_attempted,
            reason,
        }
    }

    /// Como `malformed`, pero los invariantes post-parseo se elevan a `ShapeViolation`.
    pub fn from_recovery(err: RecoveryError) -> Self {
        match err {
            RecoveryError::InvariantViolated { reason, .. } => PipelineError::ShapeViolation(reason),
            other => PipelineError::malformed(other),
        }
    }
}
