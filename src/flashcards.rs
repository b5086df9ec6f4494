//! Derivación de flashcards a partir de los apuntes.
//!
//! Tres estrategias independientes:
//!   - definición: mecánica, una tarjeta por entrada de `definitions`.
//!   - recuerdo: candidatos desde `points` y `key_takeaways`, pares generados por el LLM.
//!   - aplicación: candidatos desde `examples` y `connections` con conceptos relacionados.
//!
//! El recuento de elegibilidad recorre exactamente los mismos ámbitos que la extracción.

use tracing::info;

use crate::error::PipelineError;
use crate::llm::{generate_content, schema_instructions, TextGenerator};
use crate::models::{
    ApplicationCandidate, CandidateKind, CandidateSource, CardFace, Flashcard, FlashcardEligibility,
    FlashcardSet, FlashcardType, NotesDocument, RecallCandidate,
};
use crate::repair::recover_structured;

pub const TAKEAWAYS_LABEL: &str = "Key Takeaways";
const MAX_RELATED_CONCEPTS: usize = 5;
const MAX_CONCEPT_CHARS: usize = 50;

const RECALL_PROMPT: &str = r#"
You write active-recall flashcards. You receive a JSON array of facts, each with its context.
Produce exactly one flashcard per fact: "front" is a focused question, "back" a concise answer taken from the fact.
The output MUST be a JSON array of {"front", "back"} objects matching this JSON Schema. No explanations, only the JSON.
"#;

const APPLICATION_PROMPT: &str = r#"
You write application flashcards. You receive a JSON array of examples and connections, each with related concepts.
Produce exactly one flashcard per item: "front" asks the learner to apply or explain the concept in that scenario, "back" gives the reasoning.
The output MUST be a JSON array of {"front", "back"} objects matching this JSON Schema. No explanations, only the JSON.
"#;

/// Sección o subsección vista como ámbito de extracción.
struct Scope<'a> {
    section: &'a str,
    subsection: Option<&'a str>,
    points: &'a [String],
    definitions: &'a [String],
    examples: &'a [String],
    connections: &'a [String],
}

impl Scope<'_> {
    fn context(&self) -> String {
        match self.subsection {
            Some(sub) => format!("{} > {}", self.section, sub),
            None => self.section.to_string(),
        }
    }

    fn source(&self, kind: CandidateKind, index: usize) -> CandidateSource {
        CandidateSource {
            section: self.section.to_string(),
            subsection: self.subsection.map(str::to_string),
            kind,
            index,
        }
    }
}

/// Secciones y sus subsecciones en orden de documento.
fn scopes(doc: &NotesDocument) -> Vec<Scope<'_>> {
    let mut scopes = Vec::new();
    for section in &doc.sections {
        scopes.push(Scope {
            section: &section.heading,
            subsection: None,
            points: &section.points,
            definitions: &section.definitions,
            examples: &section.examples,
            connections: &section.connections,
        });
        for sub in &section.subsections {
            scopes.push(Scope {
                section: &section.heading,
                subsection: Some(&sub.heading),
                points: &sub.points,
                definitions: &sub.definitions,
                examples: &sub.examples,
                connections: &sub.connections,
            });
        }
    }
    scopes
}

/// Término de una entrada `"término: definición"` (todo el texto si no hay dos puntos).
pub fn definition_term(entry: &str) -> &str {
    entry.split_once(':').map_or(entry, |(term, _)| term).trim()
}

// ---------------------------------------------------------------------
// ESTRATEGIAS
// ---------------------------------------------------------------------

/// Una tarjeta por definición; el reverso es la entrada original completa.
pub fn definition_cards(doc: &NotesDocument) -> Vec<Flashcard> {
    scopes(doc)
        .iter()
        .flat_map(|scope| scope.definitions.iter())
        .map(|entry| Flashcard {
            kind: FlashcardType::Definition,
            front: format!("What is {}?", definition_term(entry)),
            back: entry.clone(),
        })
        .collect()
}

pub fn recall_candidates(doc: &NotesDocument) -> Vec<RecallCandidate> {
    let mut candidates = Vec::new();

    for scope in scopes(doc) {
        for (index, point) in scope.points.iter().enumerate() {
            candidates.push(RecallCandidate {
                content: point.clone(),
                source: scope.source(CandidateKind::Point, index),
                context: Some(scope.context()),
            });
        }
    }

    for (index, takeaway) in doc.key_takeaways.iter().enumerate() {
        candidates.push(RecallCandidate {
            content: takeaway.clone(),
            source: CandidateSource {
                section: TAKEAWAYS_LABEL.to_string(),
                subsection: None,
                kind: CandidateKind::Takeaway,
                index,
            },
            context: Some(TAKEAWAYS_LABEL.to_string()),
        });
    }

    candidates
}

pub fn application_candidates(doc: &NotesDocument) -> Vec<ApplicationCandidate> {
    let mut candidates = Vec::new();

    for scope in scopes(doc) {
        if scope.examples.is_empty() && scope.connections.is_empty() {
            continue;
        }
        let related = related_concepts(scope.points, scope.definitions);

        let items = scope
            .examples
            .iter()
            .enumerate()
            .map(|(i, e)| (CandidateKind::Example, i, e))
            .chain(
                scope
                    .connections
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (CandidateKind::Connection, i, c)),
            );

        for (kind, index, content) in items {
            candidates.push(ApplicationCandidate {
                content: content.clone(),
                source: scope.source(kind, index),
                context: Some(scope.context()),
                related_concepts: related.clone(),
            });
        }
    }

    candidates
}

/// Hasta cinco términos cortos del mismo ámbito: las primeras cláusulas de
/// cada punto y los términos de las definiciones, sin repetidos.
pub fn related_concepts(points: &[String], definitions: &[String]) -> Vec<String> {
    let mut concepts: Vec<String> = Vec::new();

    let clauses = points.iter().flat_map(|point| {
        point
            .split(['.', ',', ';', ':'])
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .take(2)
            .filter(|clause| clause.chars().count() <= MAX_CONCEPT_CHARS)
    });
    let terms = definitions.iter().map(|entry| definition_term(entry));

    for concept in clauses.chain(terms) {
        if concepts.len() >= MAX_RELATED_CONCEPTS {
            break;
        }
        if !concept.is_empty() && !concepts.iter().any(|c| c == concept) {
            concepts.push(concept.to_string());
        }
    }
    concepts
}

/// Cuenta los candidatos de cada tipo sin invocar la generación.
pub fn count_eligible(doc: &NotesDocument) -> FlashcardEligibility {
    let mut eligibility = FlashcardEligibility::default();
    for scope in scopes(doc) {
        eligibility.definition += scope.definitions.len();
        eligibility.recall += scope.points.len();
        eligibility.application += scope.examples.len() + scope.connections.len();
    }
    eligibility.recall += doc.key_takeaways.len();
    eligibility
}

// ---------------------------------------------------------------------
// GENERACIÓN
// ---------------------------------------------------------------------

/// Tarjetas de recuerdo. Sin candidatos devuelve una lista vacía sin llamar al LLM.
pub async fn generate_recall_cards(
    generator: &dyn TextGenerator,
    doc: &NotesDocument,
) -> Result<Vec<Flashcard>, PipelineError> {
    let candidates = recall_candidates(doc);
    if candidates.is_empty() {
        info!("Sin candidatos de recuerdo; se omite la generación");
        return Ok(Vec::new());
    }
    let payload = to_payload(&candidates)?;
    cards_from_batch(generator, RECALL_PROMPT, &payload, FlashcardType::Recall).await
}

/// Tarjetas de aplicación. Sin candidatos devuelve una lista vacía sin llamar al LLM.
pub async fn generate_application_cards(
    generator: &dyn TextGenerator,
    doc: &NotesDocument,
) -> Result<Vec<Flashcard>, PipelineError> {
    let candidates = application_candidates(doc);
    if candidates.is_empty() {
        info!("Sin candidatos de aplicación; se omite la generación");
        return Ok(Vec::new());
    }
    let payload = to_payload(&candidates)?;
    cards_from_batch(generator, APPLICATION_PROMPT, &payload, FlashcardType::Application).await
}

/// Genera el conjunto completo de un tipo de flashcard.
pub async fn generate_flashcards(
    generator: &dyn TextGenerator,
    doc: &NotesDocument,
    kind: FlashcardType,
) -> Result<FlashcardSet, PipelineError> {
    let flashcards = match kind {
        FlashcardType::Definition => definition_cards(doc),
        FlashcardType::Recall => generate_recall_cards(generator, doc).await?,
        FlashcardType::Application => generate_application_cards(generator, doc).await?,
    };
    info!("Generadas {} flashcards de tipo {:?}", flashcards.len(), kind);
    Ok(FlashcardSet { kind, flashcards })
}

fn to_payload<T: serde::Serialize>(candidates: &T) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(candidates)
        .map_err(|e| PipelineError::Validation(format!("candidatos no serializables: {e}")))
}

async fn cards_from_batch(
    generator: &dyn TextGenerator,
    prompt: &str,
    payload: &str,
    kind: FlashcardType,
) -> Result<Vec<Flashcard>, PipelineError> {
    let system = format!("{}\n{}", prompt.trim(), schema_instructions::<Vec<CardFace>>());
    let content = generate_content(generator, &system, payload).await?;

    let recovered = recover_structured::<Vec<CardFace>>(&content).map_err(PipelineError::from_recovery)?;
    Ok(recovered
        .data
        .into_iter()
        .map(|face| Flashcard {
            kind,
            front: face.front,
            back: face.back,
        })
        .collect())
}
