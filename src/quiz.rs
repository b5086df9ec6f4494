//! Extracción y puntuación de contenido para tests, y generación de preguntas.
//!
//! Puntuación de cada sección aplanada:
//!   score = points*2 + definitions*3 + examples*2.5  (redondeado a 2 decimales)
//! con una penalización de 0.75 si `points < min_points_per_section`. Esas mismas
//! secciones se descartan después en `extract_for_quiz`; `flatten_sections`
//! devuelve la puntuación sin filtrar.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::llm::{generate_content, schema_instructions, TextGenerator};
use crate::models::{
    ContentType, Difficulty, ExtractedQuizContent, McqQuestion, NotesDocument, QuestionType, Quiz,
    QuizQuestion, QuizSection, SectionLevel, TrueFalseQuestion,
};
use crate::repair::{recover_structured, Shape};

const UNDERFILLED_PENALTY: f64 = 0.75;

const MCQ_PROMPT: &str = r#"
You write multiple-choice exam questions from study notes. Sections arrive ranked by importance; favour the first ones.
Every question has exactly 4 options and exactly one option with "isCorrect": true. Distractors must be plausible.
Match the requested difficulty and produce the requested number of questions.
The output MUST be a JSON array matching this JSON Schema. No explanations, only the JSON.
"#;

const TRUE_FALSE_PROMPT: &str = r#"
You write true/false exam statements from study notes. Sections arrive ranked by importance; favour the first ones.
Each "statement" is declarative (never a question) and "isTrue" is a boolean. Mix true and false statements.
Match the requested difficulty and produce the requested number of statements.
The output MUST be a JSON array matching this JSON Schema. No explanations, only the JSON.
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    pub include_subsections: bool,
    pub min_points_per_section: usize,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            include_subsections: true,
            min_points_per_section: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRequest {
    pub question_count: usize,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
}

/// Puntuación de riqueza de contenido de una sección.
pub fn section_score(points: usize, definitions: usize, examples: usize, min_points_per_section: usize) -> f64 {
    let raw = points as f64 * 2.0 + definitions as f64 * 3.0 + examples as f64 * 2.5;
    let rounded = (raw * 100.0).round() / 100.0;
    if points < min_points_per_section {
        rounded * UNDERFILLED_PENALTY
    } else {
        rounded
    }
}

/// Aplana secciones (y subsecciones si se piden) en orden de documento, ya puntuadas.
pub fn flatten_sections(doc: &NotesDocument, config: &QuizConfig) -> Vec<QuizSection> {
    let mut flattened = Vec::new();
    let scored = |heading: &str, level, parent_heading: Option<&str>, points: &[String], definitions: &[String], examples: &[String]| {
        QuizSection {
            heading: heading.to_string(),
            level,
            parent_heading: parent_heading.map(str::to_string),
            points: points.to_vec(),
            definitions: definitions.to_vec(),
            examples: examples.to_vec(),
            score: section_score(
                points.len(),
                definitions.len(),
                examples.len(),
                config.min_points_per_section,
            ),
        }
    };

    for section in &doc.sections {
        flattened.push(scored(
            &section.heading,
            SectionLevel::Main,
            None,
            &section.points,
            &section.definitions,
            &section.examples,
        ));
        if config.include_subsections {
            for sub in &section.subsections {
                flattened.push(scored(
                    &sub.heading,
                    SectionLevel::Sub,
                    Some(&section.heading),
                    &sub.points,
                    &sub.definitions,
                    &sub.examples,
                ));
            }
        }
    }
    flattened
}

/// Aplana, filtra por mínimo de puntos y ordena por puntuación descendente
/// (estable ante empates).
pub fn extract_for_quiz(doc: &NotesDocument, config: &QuizConfig) -> ExtractedQuizContent {
    let mut sections: Vec<QuizSection> = flatten_sections(doc, config)
        .into_iter()
        .filter(|s| s.points.len() >= config.min_points_per_section)
        .collect();
    sections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let total_points: usize = sections.iter().map(|s| s.points.len()).sum();
    let total_definitions: usize = sections.iter().map(|s| s.definitions.len()).sum();
    let total_examples: usize = sections.iter().map(|s| s.examples.len()).sum();

    let mut content_types = Vec::new();
    if total_definitions > 0 {
        content_types.push(ContentType::Definitions);
    }
    if total_examples > 0 {
        content_types.push(ContentType::Examples);
    }
    if total_points > 0 {
        content_types.push(ContentType::Concepts);
    }

    ExtractedQuizContent {
        title: doc.title.clone(),
        summary: doc.summary.clone(),
        sections,
        total_points,
        total_definitions,
        total_examples,
        content_types,
    }
}

/// El LLM puede devolver el array suelto o envuelto en `{"questions": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionBatch<T> {
    Bare(Vec<T>),
    Wrapped { questions: Vec<T> },
}

impl<T> QuestionBatch<T> {
    fn into_questions(self) -> Vec<T> {
        match self {
            QuestionBatch::Bare(questions) | QuestionBatch::Wrapped { questions } => questions,
        }
    }

    fn questions(&self) -> &[T] {
        match self {
            QuestionBatch::Bare(questions) | QuestionBatch::Wrapped { questions } => questions,
        }
    }
}

impl<T: Shape> Shape for QuestionBatch<T> {
    fn check(&self) -> Result<(), String> {
        if self.questions().is_empty() {
            return Err("la respuesta no contiene preguntas".to_string());
        }
        for (index, question) in self.questions().iter().enumerate() {
            question.check().map_err(|e| format!("pregunta {}: {e}", index + 1))?;
        }
        Ok(())
    }
}

/// Genera un test a partir de las secciones mejor puntuadas. Las preguntas que
/// violan la forma (opciones ≠ 4, respuestas correctas ≠ 1) invalidan el test entero.
pub async fn generate_quiz(
    generator: &dyn TextGenerator,
    doc: &NotesDocument,
    config: &QuizConfig,
    request: &QuizRequest,
) -> Result<Quiz, PipelineError> {
    if request.question_count == 0 {
        return Err(PipelineError::Validation(
            "el número de preguntas debe ser mayor que cero".to_string(),
        ));
    }

    let content = extract_for_quiz(doc, config);
    if content.sections.is_empty() {
        return Err(PipelineError::Validation(format!(
            "ninguna sección tiene al menos {} puntos",
            config.min_points_per_section
        )));
    }

    let payload = json!({
        "title": content.title,
        "summary": content.summary,
        "sections": content.sections,
        "contentTypes": content.content_types,
        "questionCount": request.question_count,
        "questionType": request.question_type,
        "difficulty": request.difficulty,
    })
    .to_string();

    info!(
        "Generando test {:?} de {} preguntas con {} secciones",
        request.question_type,
        request.question_count,
        content.sections.len()
    );

    let questions = match request.question_type {
        QuestionType::Mcq => {
            let system = format!("{}\n{}", MCQ_PROMPT.trim(), schema_instructions::<Vec<McqQuestion>>());
            let raw = generate_content(generator, &system, &payload).await?;
            parse_batch::<McqQuestion>(&raw)?
                .into_iter()
                .map(QuizQuestion::Mcq)
                .collect::<Vec<_>>()
        }
        QuestionType::TrueFalse => {
            let system = format!(
                "{}\n{}",
                TRUE_FALSE_PROMPT.trim(),
                schema_instructions::<Vec<TrueFalseQuestion>>()
            );
            let raw = generate_content(generator, &system, &payload).await?;
            parse_batch::<TrueFalseQuestion>(&raw)?
                .into_iter()
                .map(QuizQuestion::TrueFalse)
                .collect::<Vec<_>>()
        }
    };

    if questions.len() != request.question_count {
        warn!(
            "Se pidieron {} preguntas y el modelo devolvió {}",
            request.question_count,
            questions.len()
        );
    }

    Ok(Quiz {
        title: doc.title.clone(),
        total_questions: questions.len(),
        questions,
    })
}

fn parse_batch<T: Shape>(raw: &str) -> Result<Vec<T>, PipelineError> {
    recover_structured::<QuestionBatch<T>>(raw)
        .map(|recovered| recovered.data.into_questions())
        .map_err(PipelineError::from_recovery)
}
