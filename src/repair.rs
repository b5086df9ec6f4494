//! Recuperación de JSON a partir de respuestas poco fiables del LLM.
//!
//! La respuesta pasa por una escalera de reparaciones cada vez más agresivas.
//! Tras cada peldaño se reintenta un parseo normal; las reparaciones son
//! acumulativas y se devuelven en `fixes_applied` para diagnóstico:
//!
//!   1. Parseo directo.
//!   2. Eliminación de bloques de código markdown.
//!   3. Extracción entre la primera llave/corchete y el último cierre.
//!   4. Reparaciones sintácticas (comas, comillas, caracteres de control, saltos de línea).
//!   5. Reparación agresiva: rebalanceo de corchetes y coerción de campos escalares a arrays.
//!
//! Opcionalmente el valor recuperado se valida contra una forma (`Shape`).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Campos del modelo de apuntes que deben ser arrays aunque el LLM emita un string suelto.
pub const COERCIBLE_ARRAY_FIELDS: &[&str] = &[
    "points",
    "definitions",
    "examples",
    "connections",
    "key_takeaways",
];

/// Propiedades sondeadas, en orden de prioridad, cuando la respuesta es un objeto.
const CONTENT_KEYS: &[&str] = &["content", "text", "message"];

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)```[ \t]*(?:json)?").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static ADJACENT_OBJECTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\}(\s*)\{").unwrap());
static ADJACENT_ARRAYS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\](\s*)\[").unwrap());
static ADJACENT_STRINGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^\S\n]*\n\s*)""#).unwrap());
static SCALAR_ARRAY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<String> = COERCIBLE_ARRAY_FIELDS.iter().map(|f| regex::escape(f)).collect();
    Regex::new(&format!(r#""({})"\s*:\s*("(?:[^"\\]|\\.)*")"#, names.join("|"))).unwrap()
});

/// Reparación aplicada por algún peldaño de la escalera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairFix {
    StrippedCodeFences,
    ExtractedJsonBoundaries,
    StrippedControlCharacters,
    NormalizedSingleQuotes,
    EscapedStringWhitespace,
    RemovedTrailingCommas,
    InsertedMissingCommas,
    RebalancedBrackets,
    CoercedScalarFields,
}

impl RepairFix {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairFix::StrippedCodeFences => "stripped_code_fences",
            RepairFix::ExtractedJsonBoundaries => "extracted_json_boundaries",
            RepairFix::StrippedControlCharacters => "stripped_control_characters",
            RepairFix::NormalizedSingleQuotes => "normalized_single_quotes",
            RepairFix::EscapedStringWhitespace => "escaped_string_whitespace",
            RepairFix::RemovedTrailingCommas => "removed_trailing_commas",
            RepairFix::InsertedMissingCommas => "inserted_missing_commas",
            RepairFix::RebalancedBrackets => "rebalanced_brackets",
            RepairFix::CoercedScalarFields => "coerced_scalar_fields",
        }
    }
}

impl fmt::Display for RepairFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Valor recuperado junto con las reparaciones que hicieron falta.
#[derive(Debug, Clone)]
pub struct Recovered<T> {
    pub data: T,
    pub fixes_applied: Vec<RepairFix>,
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("forma de respuesta no reconocida")]
    UnrecognizedShape { raw: String },

    #[error("no se pudo recuperar JSON válido ({} reparaciones intentadas): {reason}", fixes_attempted.len())]
    Unparseable {
        raw: String,
        fixes_attempted: Vec<RepairFix>,
        reason: String,
    },

    #[error("el JSON recuperado no encaja con la forma esperada: {reason}")]
    ShapeRejected {
        data: Value,
        fixes_applied: Vec<RepairFix>,
        reason: String,
    },

    #[error("{reason}")]
    InvariantViolated {
        data: Value,
        fixes_applied: Vec<RepairFix>,
        reason: String,
    },
}

impl RecoveryError {
    /// Texto bruto (o datos parcialmente parseados) y reparaciones, para diagnóstico.
    pub fn into_diagnostics(self) -> (String, Vec<String>) {
        let names = |fixes: Vec<RepairFix>| fixes.iter().map(|f| f.to_string()).collect();
        match self {
            RecoveryError::UnrecognizedShape { raw } => (raw, Vec::new()),
            RecoveryError::Unparseable {
                raw,
                fixes_attempted,
                ..
            } => (raw, names(fixes_attempted)),
            RecoveryError::ShapeRejected {
                data,
                fixes_applied,
                ..
            }
            | RecoveryError::InvariantViolated {
                data,
                fixes_applied,
                ..
            } => (data.to_string(), names(fixes_applied)),
        }
    }
}

/// Forma contra la que se valida un valor recuperado.
///
/// La deserialización comprueba la estructura; `check` añade invariantes
/// que serde no puede expresar.
pub trait Shape: DeserializeOwned {
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Shape for Value {}

impl<T: Shape> Shape for Vec<T> {
    fn check(&self) -> Result<(), String> {
        for (index, item) in self.iter().enumerate() {
            item.check().map_err(|e| format!("elemento {index}: {e}"))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// EXTRACCIÓN DEL CONTENIDO
// ---------------------------------------------------------------------

/// Obtiene el texto de una respuesta: un string tal cual, o la primera de
/// `content`, `text` o `message` presente en un objeto. Cualquier otra forma
/// es `UnrecognizedShape`.
pub fn extract_content(response: &Value) -> Result<String, RecoveryError> {
    match response {
        Value::String(text) => Ok(text.clone()),
        Value::Object(map) => CONTENT_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .map(|found| match found {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| RecoveryError::UnrecognizedShape {
                raw: response.to_string(),
            }),
        other => Err(RecoveryError::UnrecognizedShape {
            raw: other.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------
// ESCALERA DE REPARACIÓN
// ---------------------------------------------------------------------

type Rung = fn(&str) -> (String, Vec<RepairFix>);

const LADDER: [Rung; 4] = [
    strip_code_fences_rung,
    extract_boundaries_rung,
    repair_syntax,
    aggressive_repair,
];

/// Recupera un `serde_json::Value` sin validar su forma.
pub fn recover_json(raw: &str) -> Result<Recovered<Value>, RecoveryError> {
    let mut fixes_applied = Vec::new();

    let mut last_error = match serde_json::from_str::<Value>(raw) {
        Ok(data) => {
            return Ok(Recovered {
                data,
                fixes_applied,
            })
        }
        Err(e) => e.to_string(),
    };

    let mut current = raw.to_string();
    for rung in LADDER {
        let (next, fixes) = rung(&current);
        for fix in fixes {
            debug!("Reparación aplicada a la respuesta: {fix}");
            fixes_applied.push(fix);
        }
        current = next;

        match serde_json::from_str::<Value>(&current) {
            Ok(data) => {
                return Ok(Recovered {
                    data,
                    fixes_applied,
                })
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    warn!(
        "Escalera de reparación agotada tras {} reparaciones: {last_error}",
        fixes_applied.len()
    );
    Err(RecoveryError::Unparseable {
        raw: raw.to_string(),
        fixes_attempted: fixes_applied,
        reason: last_error,
    })
}

/// Recupera el JSON y lo valida contra `T`.
pub fn recover_structured<T: Shape>(raw: &str) -> Result<Recovered<T>, RecoveryError> {
    let recovered = recover_json(raw)?;
    validate_shape(recovered)
}

/// Atajo sobre una respuesta sin tipar: extrae el contenido y lo recupera.
pub fn recover_from_response<T: Shape>(response: &Value) -> Result<Recovered<T>, RecoveryError> {
    let content = extract_content(response)?;
    recover_structured(&content)
}

/// Valida un valor ya recuperado. Nunca corrige el valor para hacerlo encajar.
pub fn validate_shape<T: Shape>(recovered: Recovered<Value>) -> Result<Recovered<T>, RecoveryError> {
    let Recovered {
        data,
        fixes_applied,
    } = recovered;

    let typed = match serde_json::from_value::<T>(data.clone()) {
        Ok(typed) => typed,
        Err(e) => {
            return Err(RecoveryError::ShapeRejected {
                data,
                fixes_applied,
                reason: e.to_string(),
            })
        }
    };

    if let Err(reason) = typed.check() {
        return Err(RecoveryError::InvariantViolated {
            data,
            fixes_applied,
            reason,
        });
    }

    Ok(Recovered {
        data: typed,
        fixes_applied,
    })
}

fn strip_code_fences_rung(text: &str) -> (String, Vec<RepairFix>) {
    if !CODE_FENCE.is_match(text) {
        return (text.to_string(), Vec::new());
    }
    (strip_code_fences(text), vec![RepairFix::StrippedCodeFences])
}

fn extract_boundaries_rung(text: &str) -> (String, Vec<RepairFix>) {
    let extracted = extract_json_boundaries(text);
    if extracted == text {
        (extracted, Vec::new())
    } else {
        (extracted, vec![RepairFix::ExtractedJsonBoundaries])
    }
}

/// Peldaño 2: quita bloques ```json y líneas sueltas de triple comilla invertida.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Posición de apertura del JSON: el objeto gana salvo que un array empiece antes.
fn json_start(text: &str) -> Option<(usize, char)> {
    match (text.find('{'), text.find('[')) {
        (Some(obj), Some(arr)) if arr < obj => Some((arr, ']')),
        (Some(obj), _) => Some((obj, '}')),
        (None, Some(arr)) => Some((arr, ']')),
        (None, None) => None,
    }
}

/// Peldaño 3: subcadena entre la primera apertura y el último cierre correspondiente.
pub fn extract_json_boundaries(text: &str) -> String {
    let Some((start, close)) = json_start(text) else {
        return text.to_string();
    };
    match text.rfind(close) {
        Some(end) if end > start => text[start..=end].to_string(),
        _ => text[start..].to_string(),
    }
}

/// Peldaño 4: reparaciones sintácticas, cada una registrada sólo si cambió algo.
pub fn repair_syntax(text: &str) -> (String, Vec<RepairFix>) {
    let stages: [(RepairFix, fn(&str) -> String); 5] = [
        (RepairFix::StrippedControlCharacters, strip_control_characters),
        (RepairFix::NormalizedSingleQuotes, normalize_single_quotes),
        (RepairFix::EscapedStringWhitespace, escape_string_whitespace),
        (RepairFix::RemovedTrailingCommas, remove_trailing_commas),
        (RepairFix::InsertedMissingCommas, insert_missing_commas),
    ];

    let mut current = text.to_string();
    let mut fixes = Vec::new();
    for (fix, stage) in stages {
        let next = stage(&current);
        if next != current {
            fixes.push(fix);
            current = next;
        }
    }
    (current, fixes)
}

pub fn remove_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "${1}").into_owned()
}

pub fn insert_missing_commas(text: &str) -> String {
    let text = ADJACENT_OBJECTS.replace_all(text, "},${1}{");
    let text = ADJACENT_ARRAYS.replace_all(&text, "],${1}[");
    ADJACENT_STRINGS.replace_all(&text, "\",${1}\"").into_owned()
}

/// Elimina caracteres de control no imprimibles (conserva `\n`, `\r` y `\t`).
pub fn strip_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Convierte strings entre comillas simples en strings JSON con comillas dobles.
/// Los apóstrofes dentro de strings con comillas dobles no se tocan.
pub fn normalize_single_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    let mut in_double = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_double {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_double = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_double = true;
                out.push(c);
            }
            '\'' => {
                out.push('"');
                let mut inner_escaped = false;
                for inner in chars.by_ref() {
                    if inner_escaped {
                        if inner != '\'' {
                            out.push('\\');
                        }
                        out.push(inner);
                        inner_escaped = false;
                        continue;
                    }
                    match inner {
                        '\\' => inner_escaped = true,
                        '\'' => break,
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Escapa saltos de línea, retornos de carro y tabuladores literales dentro de strings.
pub fn escape_string_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Peldaño 5: rebalanceo de corchetes y coerción de campos escalares.
pub fn aggressive_repair(text: &str) -> (String, Vec<RepairFix>) {
    let Some((start, _)) = json_start(text) else {
        return (text.to_string(), Vec::new());
    };

    let mut fixes = Vec::new();
    let balanced = balance_brackets(&text[start..]);
    if balanced != text {
        fixes.push(RepairFix::RebalancedBrackets);
    }

    let coerced = coerce_scalar_fields(&balanced);
    if coerced != balanced {
        fixes.push(RepairFix::CoercedScalarFields);
    }
    (coerced, fixes)
}

/// Recorre el texto con una pila de corchetes: descarta cierres sin pareja,
/// corta lo que sigue al cierre de la raíz y añade los cierres pendientes
/// (cerrando también un string truncado).
pub fn balance_brackets(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                    out.push(c);
                    if stack.is_empty() {
                        return out;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().trim_end_matches(',').trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(':') {
        out.push_str("null");
    }

    while let Some(close) = stack.pop() {
        out.push(close);
    }
    out
}

/// `"points": "texto"` → `"points": ["texto"]` para los campos de `COERCIBLE_ARRAY_FIELDS`.
pub fn coerce_scalar_fields(text: &str) -> String {
    SCALAR_ARRAY_FIELD
        .replace_all(text, "\"${1}\": [${2}]")
        .into_owned()
}
