//! Modelos de dominio: apuntes jerárquicos, flashcards, tests y mapas mentales.
//!
//! Los tipos que produce el LLM derivan `JsonSchema` para poder incrustar su
//! esquema en las instrucciones de generación, e implementan `Shape` con los
//! invariantes que serde no puede comprobar.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::repair::Shape;

// ---------------------------------------------------------------------
// APUNTES
// ---------------------------------------------------------------------

/// Documento de apuntes. El orden de `sections` es significativo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NotesDocument {
    pub title: String,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
    pub summary: String,
}

/// Sección de primer nivel. `points` es obligatorio aunque esté vacío.
/// Cada entrada de `definitions` tiene la forma `"término: definición"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub heading: String,
    pub points: Vec<String>,
    #[serde(default)]
    pub definitions: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub subsections: Vec<Subsection>,
}

/// Subsección: igual que `Section` pero sin anidamiento adicional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Subsection {
    pub heading: String,
    pub points: Vec<String>,
    #[serde(default)]
    pub definitions: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub connections: Vec<String>,
}

impl Shape for NotesDocument {
    fn check(&self) -> Result<(), String> {
        if self.sections.is_empty() {
            return Err("el documento no tiene secciones".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// FLASHCARDS
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashcardType {
    Definition,
    Recall,
    Application,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    #[serde(rename = "type")]
    pub kind: FlashcardType,
    pub front: String,
    pub back: String,
}

/// Conjunto de flashcards de un mismo tipo, tal como se persiste.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardSet {
    #[serde(rename = "type")]
    pub kind: FlashcardType,
    pub flashcards: Vec<Flashcard>,
}

/// Par pregunta/respuesta devuelto por el LLM (sin tipo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CardFace {
    pub front: String,
    pub back: String,
}

impl Shape for CardFace {
    fn check(&self) -> Result<(), String> {
        if self.front.trim().is_empty() || self.back.trim().is_empty() {
            return Err("la flashcard tiene una cara vacía".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Point,
    Takeaway,
    Example,
    Connection,
}

/// Origen de un candidato dentro del documento.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSource {
    pub section: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallCandidate {
    pub content: String,
    pub source: CandidateSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCandidate {
    pub content: String,
    pub source: CandidateSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub related_concepts: Vec<String>,
}

/// Número de candidatos que cada tipo de flashcard podría producir.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardEligibility {
    pub definition: usize,
    pub recall: usize,
    pub application: usize,
}

impl FlashcardEligibility {
    pub fn count_for(&self, kind: FlashcardType) -> usize {
        match kind {
            FlashcardType::Definition => self.definition,
            FlashcardType::Recall => self.recall,
            FlashcardType::Application => self.application,
        }
    }

    pub fn is_available(&self, kind: FlashcardType) -> bool {
        self.count_for(kind) > 0
    }
}

// ---------------------------------------------------------------------
// TESTS (QUIZ)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "MCQ")]
    Mcq,
    #[serde(rename = "TRUE_FALSE")]
    TrueFalse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McqOption {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct McqQuestion {
    pub question: String,
    pub options: Vec<McqOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Shape for McqQuestion {
    fn check(&self) -> Result<(), String> {
        if self.options.len() != 4 {
            return Err(format!(
                "la pregunta MCQ tiene {} opciones en lugar de 4",
                self.options.len()
            ));
        }
        let correct = self.options.iter().filter(|o| o.is_correct).count();
        if correct != 1 {
            return Err(format!(
                "la pregunta MCQ tiene {correct} opciones correctas en lugar de 1"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrueFalseQuestion {
    pub statement: String,
    pub is_true: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Shape for TrueFalseQuestion {
    fn check(&self) -> Result<(), String> {
        if self.statement.trim_end().ends_with('?') {
            return Err("la afirmación verdadero/falso termina en interrogación".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QuizQuestion {
    #[serde(rename = "MCQ")]
    Mcq(McqQuestion),
    #[serde(rename = "TRUE_FALSE")]
    TrueFalse(TrueFalseQuestion),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub total_questions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionLevel {
    Main,
    Sub,
}

/// Unidad de puntuación aplanada (sección o subsección).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSection {
    pub heading: String,
    pub level: SectionLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_heading: Option<String>,
    pub points: Vec<String>,
    pub definitions: Vec<String>,
    pub examples: Vec<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Definitions,
    Examples,
    Concepts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedQuizContent {
    pub title: String,
    pub summary: String,
    pub sections: Vec<QuizSection>,
    pub total_points: usize,
    pub total_definitions: usize,
    pub total_examples: usize,
    pub content_types: Vec<ContentType>,
}

// ---------------------------------------------------------------------
// MAPA MENTAL
// ---------------------------------------------------------------------

/// Nivel de énfasis que asigna el LLM a un nodo; sólo afecta al renderizado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Emphasis {
    High,
    Medium,
    Low,
}

/// Forma que genera el LLM para el mapa mental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MindMapSource {
    pub central_concept: String,
    pub branches: Vec<MindMapBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MindMapBranch {
    pub branch_label: String,
    #[serde(default)]
    pub main_nodes: Vec<MindMapSourceNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MindMapSourceNode {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emphasis: Option<Emphasis>,
    #[serde(default)]
    pub children: Vec<MindMapSourceNode>,
}

impl Shape for MindMapSource {
    fn check(&self) -> Result<(), String> {
        if self.central_concept.trim().is_empty() {
            return Err("el mapa mental no tiene concepto central".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MindMapNodeType {
    Root,
    Section,
    Subsection,
    Takeaway,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MindMapNodeData {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: MindMapNodeType,
    pub is_expanded: bool,
    pub children_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub points_count: usize,
    pub definitions_count: usize,
    pub examples_count: usize,
    pub node_key: String,
    pub has_expandable_children: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emphasis: Option<Emphasis>,
}

/// Nodo posicionado por el motor de layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MindMapNode {
    pub id: String,
    pub position: Position,
    pub data: MindMapNodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MindMapEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MindMapLayout {
    pub nodes: Vec<MindMapNode>,
    pub edges: Vec<MindMapEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::recover_structured;
    use serde_json::json;

    #[test]
    fn notes_optional_lists_default_to_empty() {
        let doc: NotesDocument = serde_json::from_value(json!({
            "title": "Cells",
            "sections": [{"heading": "Intro", "points": []}],
            "summary": "s"
        }))
        .unwrap();
        assert!(doc.key_takeaways.is_empty());
        assert!(doc.sections[0].definitions.is_empty());
        assert!(doc.sections[0].subsections.is_empty());
    }

    #[test]
    fn section_points_are_required() {
        let result = recover_structured::<NotesDocument>(
            r#"{"title": "t", "sections": [{"heading": "h"}], "summary": "s"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_sections_fail_the_notes_invariant() {
        let doc = NotesDocument {
            title: "t".into(),
            sections: vec![],
            key_takeaways: vec![],
            summary: "s".into(),
        };
        assert!(doc.check().is_err());
    }

    #[test]
    fn mcq_requires_four_options_and_one_answer() {
        let option = |text: &str, is_correct| McqOption {
            text: text.into(),
            is_correct,
        };
        let mut question = McqQuestion {
            question: "q".into(),
            options: vec![option("a", true), option("b", false), option("c", false)],
            explanation: None,
        };
        assert!(question.check().is_err());

        question.options.push(option("d", true));
        assert!(question.check().is_err());

        question.options[3].is_correct = false;
        assert!(question.check().is_ok());
    }

    #[test]
    fn quiz_questions_serialize_with_type_tag() {
        let question = QuizQuestion::TrueFalse(TrueFalseQuestion {
            statement: "Water boils at 100 C at sea level.".into(),
            is_true: true,
            explanation: None,
        });
        let value = serde_json::to_value(&question).unwrap();
        assert_eq!(
            value,
            json!({"type": "TRUE_FALSE", "statement": "Water boils at 100 C at sea level.", "isTrue": true})
        );
    }

    #[test]
    fn flashcard_type_is_lowercase_on_the_wire() {
        let card = Flashcard {
            kind: FlashcardType::Definition,
            front: "What is ATP?".into(),
            back: "ATP: energy currency".into(),
        };
        assert_eq!(
            serde_json::to_value(&card).unwrap(),
            json!({"type": "definition", "front": "What is ATP?", "back": "ATP: energy currency"})
        );
    }
}
