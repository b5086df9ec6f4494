//! Generación del documento de apuntes a partir del texto limpio.

use tracing::{info, warn};

use crate::chunking::{chunk_normalized, ChunkOptions};
use crate::error::PipelineError;
use crate::llm::{generate_content, schema_instructions, TextGenerator};
use crate::models::NotesDocument;
use crate::repair::recover_structured;

const NOTES_PROMPT: &str = r#"
You are an expert study assistant. Turn the study material you receive into well-structured notes.

Rules:
- Keep the original order of topics. Every section needs a heading and a "points" array (may be empty).
- Write every definition as "term: definition" so the term comes before the first colon.
- Use "examples" for concrete examples and "connections" for links between ideas.
- Use "subsections" only one level deep; subsections never contain subsections.
- Add "key_takeaways" with the most important ideas and a short "summary".

The output MUST be a single valid JSON object matching this JSON Schema. No explanations, only the JSON.
"#;

/// Construye los apuntes a partir del texto completo ya normalizado.
///
/// Todo el material viaja en una única petición al servicio de generación.
pub async fn build_notes(
    generator: &dyn TextGenerator,
    cleaned_full_text: &str,
    options: &ChunkOptions,
) -> Result<NotesDocument, PipelineError> {
    if cleaned_full_text.trim().is_empty() {
        return Err(PipelineError::Validation(
            "el texto de origen está vacío".to_string(),
        ));
    }

    let chunks = chunk_normalized(cleaned_full_text, options);
    if chunks.is_empty() {
        return Err(PipelineError::Validation(format!(
            "el texto es demasiado corto para trocearlo (mínimo {} caracteres)",
            options.min_chunk_size
        )));
    }

    let system = format!("{}\n{}", NOTES_PROMPT.trim(), schema_instructions::<NotesDocument>());
    let payload = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[Part {}]\n{}", i + 1, chunk))
        .collect::<Vec<_>>()
        .join("\n\n");

    info!("Generando apuntes a partir de {} chunks", chunks.len());
    let content = generate_content(generator, &system, &payload).await?;

    let recovered = recover_structured::<NotesDocument>(&content).map_err(|e| {
        warn!("No se pudo recuperar el documento de apuntes: {e}");
        PipelineError::malformed(e)
    })?;

    if !recovered.fixes_applied.is_empty() {
        info!(
            "Apuntes recuperados con reparaciones: {:?}",
            recovered.fixes_applied
        );
    }
    Ok(recovered.data)
}
