//! Extracción de texto bruto de las fuentes de estudio (texto, transcripción, PDF, fichero).
//!
//! Sólo obtiene el texto; la normalización la hace `chunking::normalize_text`.

use std::fs;
use std::path::{Path, PathBuf};

use mime_guess::MimeGuess;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::PipelineError;

/// Fragmento de una transcripción; los tiempos no influyen en el texto.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceMaterial {
    Text { text: String },
    Transcript { segments: Vec<TranscriptSegment> },
    Pdf { path: PathBuf },
    File { path: PathBuf },
}

impl SourceMaterial {
    fn describe(&self) -> &'static str {
        match self {
            SourceMaterial::Text { .. } => "texto",
            SourceMaterial::Transcript { .. } => "transcripción",
            SourceMaterial::Pdf { .. } => "pdf",
            SourceMaterial::File { .. } => "fichero",
        }
    }
}

/// Devuelve el texto bruto de la fuente.
pub fn extract_text(source: &SourceMaterial) -> Result<String, PipelineError> {
    let text = match source {
        SourceMaterial::Text { text } => text.clone(),
        SourceMaterial::Transcript { segments } => join_segments(segments),
        SourceMaterial::Pdf { path } => read_pdf(path)?,
        SourceMaterial::File { path } => read_file(path)?,
    };
    info!("Fuente de tipo {} extraída: {} caracteres", source.describe(), text.len());
    Ok(text)
}

/// Las fuentes `pdf`/`file` sólo pueden leer rutas dentro de `root`; las rutas
/// relativas se resuelven contra él. Sin raíz no se acepta ninguna ruta.
/// Devuelve la fuente con la ruta ya resuelta.
pub fn confine_to_root(source: SourceMaterial, root: Option<&Path>) -> Result<SourceMaterial, PipelineError> {
    let (path, is_pdf) = match source {
        SourceMaterial::Pdf { path } => (path, true),
        SourceMaterial::File { path } => (path, false),
        inline => return Ok(inline),
    };
    let root = root.ok_or_else(|| {
        PipelineError::Validation("las fuentes de fichero están deshabilitadas (falta SOURCE_ROOT)".to_string())
    })?;

    let root = fs::canonicalize(root)
        .map_err(|e| PipelineError::Validation(format!("SOURCE_ROOT inaccesible ({}): {e}", root.display())))?;
    let candidate = if path.is_relative() { root.join(&path) } else { path.clone() };
    let resolved = fs::canonicalize(&candidate)
        .map_err(|e| PipelineError::Validation(format!("no se pudo resolver {}: {e}", path.display())))?;

    if !resolved.starts_with(&root) {
        return Err(PipelineError::Validation(format!(
            "la ruta {} está fuera de SOURCE_ROOT",
            path.display()
        )));
    }
    debug!("Ruta de fuente {} dentro de {}", resolved.display(), root.display());
    Ok(if is_pdf {
        SourceMaterial::Pdf { path: resolved }
    } else {
        SourceMaterial::File { path: resolved }
    })
}

fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_pdf(path: &Path) -> Result<String, PipelineError> {
    pdf_extract::extract_text(path)
        .map_err(|e| PipelineError::Validation(format!("no se pudo leer el PDF {}: {e}", path.display())))
}

fn read_file(path: &Path) -> Result<String, PipelineError> {
    let mime = MimeGuess::from_path(path).first().ok_or_else(|| {
        PipelineError::Validation(format!("tipo de fichero desconocido: {}", path.display()))
    })?;
    debug!("Fichero {} detectado como {}", path.display(), mime);

    if mime.essence_str() == "application/pdf" {
        return read_pdf(path);
    }
    if mime.type_() == mime_guess::mime::TEXT {
        return fs::read_to_string(path)
            .map_err(|e| PipelineError::Validation(format!("no se pudo leer {}: {e}", path.display())));
    }
    Err(PipelineError::Validation(format!(
        "tipo de fichero no soportado ({mime}): {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(extension: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}.{extension}", uuid::Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn transcript_segments_join_in_order() {
        let source: SourceMaterial = serde_json::from_value(serde_json::json!({
            "kind": "transcript",
            "segments": [
                {"text": "Hello there.", "start": 0.0, "duration": 1.2},
                {"text": "  "},
                {"text": "General Kenobi."}
            ]
        }))
        .unwrap();
        assert_eq!(extract_text(&source).unwrap(), "Hello there. General Kenobi.");
    }

    #[test]
    fn text_files_are_read_verbatim() {
        let path = temp_file("md", "# Title\n\nBody");
        let text = extract_text(&SourceMaterial::File { path: path.clone() }).unwrap();
        assert_eq!(text, "# Title\n\nBody");
        fs::remove_file(path).ok();
    }

    #[test]
    fn binary_files_are_rejected() {
        let path = temp_file("png", "not really a png");
        let err = extract_text(&SourceMaterial::File { path: path.clone() }).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(msg) if msg.contains("no soportado")));
        fs::remove_file(path).ok();
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn paths_inside_the_root_resolve_against_it() {
        let root = temp_dir();
        fs::write(root.join("notes.txt"), "inside the root").unwrap();

        let relative = SourceMaterial::File { path: PathBuf::from("notes.txt") };
        let confined = confine_to_root(relative, Some(root.as_path())).unwrap();
        assert_eq!(extract_text(&confined).unwrap(), "inside the root");

        let absolute = SourceMaterial::File { path: root.join("notes.txt") };
        assert!(confine_to_root(absolute, Some(root.as_path())).is_ok());
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn paths_outside_the_root_are_rejected() {
        let root = temp_dir();
        let outside = temp_file("txt", "secret");

        let escape = SourceMaterial::File { path: PathBuf::from("..").join(outside.file_name().unwrap()) };
        let absolute = SourceMaterial::Pdf { path: outside.clone() };
        assert!(matches!(
            confine_to_root(escape, Some(root.as_path())),
            Err(PipelineError::Validation(msg)) if msg.contains("fuera de SOURCE_ROOT")
        ));
        assert!(matches!(
            confine_to_root(absolute, Some(root.as_path())),
            Err(PipelineError::Validation(_))
        ));
        fs::remove_dir_all(root).ok();
        fs::remove_file(outside).ok();
    }

    #[test]
    fn file_sources_need_a_root_but_inline_text_does_not() {
        let file = SourceMaterial::File { path: PathBuf::from("/etc/hostname") };
        assert!(matches!(confine_to_root(file, None), Err(PipelineError::Validation(_))));

        let text = SourceMaterial::Text { text: "inline".into() };
        assert_eq!(confine_to_root(text.clone(), None).unwrap(), text);
    }

    #[test]
    fn missing_pdf_is_a_validation_error() {
        let path = std::env::temp_dir().join(format!("{}.pdf", uuid::Uuid::new_v4()));
        assert!(matches!(
            extract_text(&SourceMaterial::Pdf { path }),
            Err(PipelineError::Validation(_))
        ));
    }
}
