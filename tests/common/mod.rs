//! Generador de texto programado para los tests de integración.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use study_artifacts::llm::{Generation, GenerationError, TextGenerator};
use study_artifacts::models::{NotesDocument, Section, Subsection};

/// Devuelve las respuestas en orden y registra cada petición (sistema, usuario).
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: GenerationError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(error)])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> (String, String) {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn invoke(&self, system_instructions: &str, user_payload: &str) -> Result<Generation, GenerationError> {
        self.requests
            .lock()
            .unwrap()
            .push((system_instructions.to_string(), user_payload.to_string()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Provider("no scripted reply left".into())));
        reply.map(|content| Generation { content })
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Apuntes con definiciones, ejemplos, conexiones y una subsección.
pub fn photosynthesis_notes() -> NotesDocument {
    NotesDocument {
        title: "Photosynthesis".into(),
        sections: vec![
            Section {
                heading: "Light reactions".into(),
                points: strings(&[
                    "Light is absorbed by chlorophyll",
                    "Water is split, releasing oxygen",
                    "ATP and NADPH are produced",
                ]),
                definitions: strings(&["Chlorophyll: the green pigment that absorbs light"]),
                examples: strings(&["Leaves turn toward sunlight"]),
                connections: vec![],
                subsections: vec![Subsection {
                    heading: "Photosystems".into(),
                    points: strings(&["PSII acts before PSI", "Electrons flow through a chain"]),
                    definitions: strings(&["Photosystem: a protein complex that captures light"]),
                    examples: vec![],
                    connections: strings(&["Links to cellular respiration"]),
                }],
            },
            Section {
                heading: "Calvin cycle".into(),
                points: strings(&["Carbon dioxide is fixed into sugar"]),
                definitions: vec![],
                examples: vec![],
                connections: vec![],
                subsections: vec![],
            },
        ],
        key_takeaways: strings(&["Plants turn light into chemical energy"]),
        summary: "How plants capture light and store it as sugar.".into(),
    }
}

/// Texto de estudio lo bastante largo para producir al menos un chunk.
pub fn study_text() -> String {
    "Photosynthesis converts light energy into chemical energy. \
     Chlorophyll absorbs mostly blue and red light. \
     The light reactions happen in the thylakoid membranes and split water. \
     The Calvin cycle uses ATP and NADPH to fix carbon dioxide into sugar. \
     Oxygen is released as a by-product of splitting water."
        .to_string()
}
