//! Normalización del texto extraído (PDF, transcripciones, texto plano) y
//! troceado en chunks que respetan los límites de frase.
//!
//! Flujo:
//!   1. `normalize_text`: limpieza heurística de artefactos de extracción.
//!   2. `split_sentences`: segmentación protegiendo abreviaturas y decimales.
//!   3. `assemble_chunks`: acumulación voraz de unidades (frases o palabras).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Techo de tokens frente al que se calcula la cobertura (sólo informativo).
pub const TOKEN_CEILING: usize = 100_000;

/// Marcador temporal para los puntos que no deben cortar una frase.
const PROTECTED_PERIOD: char = '\u{E000}';

static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\S\r\n]+").unwrap());
static LINE_ENDINGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n?").unwrap());
static LOWER_UPPER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());
static LETTER_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([A-Za-z])([0-9])").unwrap());
static DIGIT_LETTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([0-9])([A-Za-z])").unwrap());
static GLUED_SENTENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([.!?])([A-Z])").unwrap());
static SYMBOL_ONLY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[^\S\n]*[^\w\s][^\w\n]*$").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[^\S\n]*\n){2,}").unwrap());
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[^\S\n]*\n").unwrap());

static ABBREVIATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(Mr|Mrs|Ms|Dr|Prof|Sr|Jr|vs|etc|Inc|Ltd|Corp)\.").unwrap()
});
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d)\.(\d)").unwrap());
static CAPITALIZED_ABBREVIATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][a-z]*)\.(\s)").unwrap());

/// Opciones de troceado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkOptions {
    pub preserve_sentences: bool,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

impl ChunkOptions {
    /// `min_chunk_size` no puede superar `max_chunk_size`.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_chunk_size > self.max_chunk_size {
            return Err(format!(
                "el tamaño mínimo de chunk ({}) no puede superar el máximo ({})",
                self.min_chunk_size, self.max_chunk_size
            ));
        }
        Ok(())
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            preserve_sentences: true,
            min_chunk_size: 200,
            max_chunk_size: 3000,
        }
    }
}

/// Estadísticas del texto normalizado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStats {
    pub word_count: usize,
    pub character_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub estimated_tokens: usize,
    /// Porcentaje del texto que cabe bajo `TOKEN_CEILING` (100 si cabe entero).
    pub token_coverage: f64,
    pub exceeds_token_ceiling: bool,
}

/// Limpia el texto bruto. Cada paso es idempotente y el orden importa.
pub fn normalize_text(raw: &str) -> String {
    let text = HORIZONTAL_WS.replace_all(raw, " ");
    let text = LINE_ENDINGS.replace_all(&text, "\n");
    let text = LOWER_UPPER.replace_all(&text, "${1} ${2}");
    let text = LETTER_DIGIT.replace_all(&text, "${1} ${2}");
    let text = DIGIT_LETTER.replace_all(&text, "${1} ${2}");
    let text = GLUED_SENTENCE.replace_all(&text, "${1} ${2}");
    let text = SYMBOL_ONLY_LINE.replace_all(&text, "");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    let text = MULTI_SPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Divide en frases sin cortar en abreviaturas ("Dr.", "Mrs.") ni en decimales.
pub fn split_sentences(text: &str) -> Vec<String> {
    let protected = protect_periods(text);
    let chars: Vec<char> = protected.chars().collect();

    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        current.push(ch);

        if matches!(ch, '.' | '!' | '?') {
            let mut next = i + 1;
            while next < chars.len() && chars[next].is_whitespace() {
                next += 1;
            }
            let at_end = next == chars.len();
            let before_capital = next > i + 1 && !at_end && chars[next].is_uppercase();

            if at_end || before_capital {
                push_sentence(&mut sentences, &current);
                current.clear();
                i = next;
                continue;
            }
        }
        i += 1;
    }
    push_sentence(&mut sentences, &current);

    sentences
}

fn protect_periods(text: &str) -> String {
    let marker = PROTECTED_PERIOD.to_string();
    let text = CAPITALIZED_ABBREVIATION.replace_all(text, format!("${{1}}{marker}${{2}}").as_str());
    let text = DECIMAL.replace_all(&text, format!("${{1}}{marker}${{2}}").as_str());
    let text = ABBREVIATION.replace_all(&text, format!("${{1}}{marker}").as_str());
    text.into_owned()
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let restored = raw.replace(PROTECTED_PERIOD, ".");
    let trimmed = restored.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Acumula unidades en chunks de `[min, max]` caracteres.
///
/// Se cierra el chunk actual sólo si añadir la siguiente unidad supera `max`
/// y el chunk ya alcanza `min`. Un resto final más corto que `min` se funde
/// con el chunk anterior; si no existe, se descarta (la lista puede quedar vacía).
pub fn assemble_chunks<S: AsRef<str>>(units: &[S], min_chunk_size: usize, max_chunk_size: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for unit in units {
        let unit = unit.as_ref().trim();
        if unit.is_empty() {
            continue;
        }
        let unit_len = unit.chars().count();

        if current.is_empty() {
            current.push_str(unit);
            current_len = unit_len;
            continue;
        }

        if current_len + 1 + unit_len > max_chunk_size && current_len >= min_chunk_size {
            chunks.push(std::mem::take(&mut current));
            current.push_str(unit);
            current_len = unit_len;
        } else {
            current.push(' ');
            current.push_str(unit);
            current_len += 1 + unit_len;
        }
    }

    if !current.is_empty() {
        if current_len >= min_chunk_size {
            chunks.push(current);
        } else if let Some(last) = chunks.last_mut() {
            last.push(' ');
            last.push_str(&current);
        }
    }

    chunks
}

/// Normaliza y trocea. Una lista vacía debe tratarse como fallo de validación
/// por quien llama.
pub fn normalize_and_chunk(raw_text: &str, options: &ChunkOptions) -> Vec<String> {
    let normalized = normalize_text(raw_text);
    chunk_normalized(&normalized, options)
}

/// Trocea un texto ya normalizado.
pub fn chunk_normalized(normalized: &str, options: &ChunkOptions) -> Vec<String> {
    if options.preserve_sentences {
        let sentences = split_sentences(normalized);
        assemble_chunks(&sentences, options.min_chunk_size, options.max_chunk_size)
    } else {
        let words: Vec<&str> = normalized.split_whitespace().collect();
        assemble_chunks(&words, options.min_chunk_size, options.max_chunk_size)
    }
}

pub fn text_stats(text: &str) -> TextStats {
    let word_count = text.split_whitespace().count();
    let character_count = text.chars().count();
    let sentence_count = split_sentences(text).len();
    let paragraph_count = PARAGRAPH_BREAK
        .split(text)
        .filter(|block| !block.trim().is_empty())
        .count();
    let estimated_tokens = character_count.div_ceil(4);

    let token_coverage = if estimated_tokens <= TOKEN_CEILING {
        100.0
    } else {
        let ratio = TOKEN_CEILING as f64 / estimated_tokens as f64 * 100.0;
        (ratio * 100.0).round() / 100.0
    };

    TextStats {
        word_count,
        character_count,
        sentence_count,
        paragraph_count,
        estimated_tokens,
        token_coverage,
        exceeds_token_ceiling: estimated_tokens > TOKEN_CEILING,
    }
}
