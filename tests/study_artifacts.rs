mod common;

use std::collections::HashSet;

use common::{photosynthesis_notes, strings, ScriptedGenerator};
use study_artifacts::flashcards::{count_eligible, definition_cards, generate_flashcards};
use study_artifacts::mindmap::{generate_mind_map, layout, Breakpoint, MindMapTree};
use study_artifacts::models::{
    Difficulty, FlashcardType, MindMapNodeType, NotesDocument, QuestionType, QuizQuestion, Section,
};
use study_artifacts::quiz::{generate_quiz, QuizConfig, QuizRequest};
use study_artifacts::store::{ArtifactKind, ArtifactStore, InMemoryStore};
use study_artifacts::PipelineError;

fn bare_notes() -> NotesDocument {
    NotesDocument {
        title: "Empty".into(),
        sections: vec![Section {
            heading: "Only heading".into(),
            points: vec![],
            definitions: vec![],
            examples: vec![],
            connections: vec![],
            subsections: vec![],
        }],
        key_takeaways: vec![],
        summary: "nothing".into(),
    }
}

fn mcq(options: &[(&str, bool)]) -> serde_json::Value {
    serde_json::json!({
        "question": "Which pigment absorbs light?",
        "options": options
            .iter()
            .map(|(text, correct)| serde_json::json!({"text": text, "isCorrect": correct}))
            .collect::<Vec<_>>(),
    })
}

// --- Flashcards ---

#[tokio::test]
async fn given_notes_when_generating_every_type_then_counts_match_eligibility() {
    let notes = photosynthesis_notes();
    let eligibility = count_eligible(&notes);
    assert_eq!(eligibility.definition, 2);
    assert_eq!(eligibility.recall, 7);
    assert_eq!(eligibility.application, 2);

    let definitions = generate_flashcards(&ScriptedGenerator::default(), &notes, FlashcardType::Definition)
        .await
        .unwrap();
    assert_eq!(definitions.flashcards.len(), eligibility.definition);
    assert_eq!(definitions.flashcards, definition_cards(&notes));
    assert_eq!(definitions.flashcards[0].front, "What is Chlorophyll?");

    let generator = ScriptedGenerator::replying([r#"[
        {"front": "Why do leaves turn toward the sun?", "back": "To absorb more light."},
        {"front": "How does photosynthesis relate to respiration?", "back": "Its products feed respiration."}
    ]"#]);
    let application = generate_flashcards(&generator, &notes, FlashcardType::Application)
        .await
        .unwrap();
    assert_eq!(application.kind, FlashcardType::Application);
    assert_eq!(application.flashcards.len(), 2);
    assert!(application.flashcards.iter().all(|c| c.kind == FlashcardType::Application));

    let (_, payload) = generator.request(0);
    assert!(payload.contains("Leaves turn toward sunlight"));
    assert!(payload.contains("relatedConcepts"));
}

#[tokio::test]
async fn given_points_and_takeaways_when_generating_recall_cards_then_one_batch_covers_them_all() {
    let notes = photosynthesis_notes();
    let faces: Vec<serde_json::Value> = (0..7)
        .map(|i| serde_json::json!({"front": format!("Question {i}?"), "back": format!("Answer {i}")}))
        .collect();
    let generator = ScriptedGenerator::replying([serde_json::Value::from(faces).to_string()]);

    let recall = generate_flashcards(&generator, &notes, FlashcardType::Recall).await.unwrap();

    assert_eq!(generator.calls(), 1);
    assert_eq!(recall.kind, FlashcardType::Recall);
    assert_eq!(recall.flashcards.len(), count_eligible(&notes).recall);
    assert!(recall.flashcards.iter().all(|c| c.kind == FlashcardType::Recall));

    let (_, payload) = generator.request(0);
    let candidates: Vec<serde_json::Value> = serde_json::from_str(&payload).unwrap();
    assert_eq!(candidates.len(), 7);
    for point in notes
        .sections
        .iter()
        .flat_map(|s| s.points.iter().chain(s.subsections.iter().flat_map(|sub| sub.points.iter())))
    {
        assert!(candidates.iter().any(|c| c["content"] == point.as_str()), "missing {point}");
    }
    let takeaway = candidates.last().unwrap();
    assert_eq!(takeaway["content"], "Plants turn light into chemical energy");
    assert_eq!(takeaway["context"], "Key Takeaways");
    assert_eq!(takeaway["source"]["type"], "takeaway");
    assert_eq!(candidates[3]["context"], "Light reactions > Photosystems");
}

#[tokio::test]
async fn given_notes_without_content_when_generating_recall_cards_then_generator_is_not_called() {
    let generator = ScriptedGenerator::default();
    let notes = bare_notes();

    let recall = generate_flashcards(&generator, &notes, FlashcardType::Recall).await.unwrap();
    let application = generate_flashcards(&generator, &notes, FlashcardType::Application)
        .await
        .unwrap();

    assert!(recall.flashcards.is_empty());
    assert!(application.flashcards.is_empty());
    assert_eq!(generator.calls(), 0);
    assert!(!count_eligible(&notes).is_available(FlashcardType::Recall));
}

#[tokio::test]
async fn given_cards_with_empty_faces_when_generating_recall_then_shape_is_violated() {
    let generator = ScriptedGenerator::replying([r#"[{"front": "", "back": "Oxygen"}]"#]);

    let err = generate_flashcards(&generator, &photosynthesis_notes(), FlashcardType::Recall)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ShapeViolation(_)));
}

// --- Quiz ---

#[tokio::test]
async fn given_wrapped_mcq_batch_when_generating_quiz_then_questions_are_typed() {
    let reply = serde_json::json!({
        "questions": [
            mcq(&[("Chlorophyll", true), ("Keratin", false), ("Melanin", false), ("Hemoglobin", false)]),
            mcq(&[("ATP", false), ("NADPH", false), ("Chlorophyll", true), ("Glucose", false)]),
        ]
    })
    .to_string();
    let generator = ScriptedGenerator::replying([reply]);
    let request = QuizRequest {
        question_count: 2,
        question_type: QuestionType::Mcq,
        difficulty: Difficulty::Medium,
    };

    let quiz = generate_quiz(&generator, &photosynthesis_notes(), &QuizConfig::default(), &request)
        .await
        .unwrap();

    assert_eq!(quiz.title, "Photosynthesis");
    assert_eq!(quiz.total_questions, 2);
    assert!(quiz.questions.iter().all(|q| matches!(q, QuizQuestion::Mcq(_))));

    let (_, payload) = generator.request(0);
    let payload: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(payload["questionType"], "MCQ");
    assert_eq!(payload["difficulty"], "medium");
    // "Calvin cycle" has a single point and falls under the default minimum.
    let headings: Vec<&str> = payload["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["heading"].as_str().unwrap())
        .collect();
    assert_eq!(headings, vec!["Light reactions", "Photosystems"]);
}

#[tokio::test]
async fn given_mcq_with_two_correct_options_when_generating_quiz_then_shape_is_violated() {
    let reply = serde_json::json!([
        mcq(&[("Chlorophyll", true), ("Carotene", true), ("Melanin", false), ("Hemoglobin", false)])
    ])
    .to_string();
    let generator = ScriptedGenerator::replying([reply]);
    let request = QuizRequest {
        question_count: 1,
        question_type: QuestionType::Mcq,
        difficulty: Difficulty::Easy,
    };

    let err = generate_quiz(&generator, &photosynthesis_notes(), &QuizConfig::default(), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ShapeViolation(msg) if msg.contains("correctas")));
}

#[tokio::test]
async fn given_no_section_reaches_the_minimum_when_generating_quiz_then_validation_fails() {
    let generator = ScriptedGenerator::default();
    let config = QuizConfig {
        include_subsections: false,
        min_points_per_section: 10,
    };
    let request = QuizRequest {
        question_count: 3,
        question_type: QuestionType::TrueFalse,
        difficulty: Difficulty::Hard,
    };

    let err = generate_quiz(&generator, &photosynthesis_notes(), &config, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(generator.calls(), 0);
}

// --- Mapa mental ---

#[tokio::test]
async fn given_generated_mind_map_when_laying_out_then_branches_form_the_section_tier() {
    let generator = ScriptedGenerator::replying([r#"{
        "central_concept": "Photosynthesis",
        "branches": [
            {"branch_label": "Light reactions", "main_nodes": [
                {"label": "Chlorophyll", "emphasis": "high"},
                {"label": "Water splitting", "children": [{"label": "Oxygen"}]}
            ]},
            {"branch_label": "Calvin cycle", "main_nodes": [{"label": "Carbon fixation"}]}
        ]
    }"#]);

    let source = generate_mind_map(&generator, &photosynthesis_notes()).await.unwrap();
    let tree = MindMapTree::from_source(&source);
    let expanded: HashSet<String> = ["section-Light reactions".to_string()].into();
    let result = layout(&tree, &expanded, Breakpoint::from_width(800));

    assert_eq!(result.nodes.len(), 1 + 2 + 2);
    assert_eq!(result.edges.len(), 4);
    assert_eq!(result.nodes[0].data.label, "Photosynthesis");
    let water = result
        .nodes
        .iter()
        .find(|n| n.data.label == "Water splitting")
        .unwrap();
    assert_eq!(water.data.kind, MindMapNodeType::Subsection);
    assert_eq!(water.data.points_count, 1);
}

#[tokio::test]
async fn given_mind_map_without_central_concept_when_generating_then_shape_is_violated() {
    let generator = ScriptedGenerator::replying([r#"{"central_concept": " ", "branches": []}"#]);

    let err = generate_mind_map(&generator, &photosynthesis_notes()).await.unwrap_err();

    assert!(matches!(err, PipelineError::ShapeViolation(_)));
}

#[test]
fn given_notes_when_expanding_a_section_then_section_positions_are_stable() {
    let tree = MindMapTree::from_notes(&photosynthesis_notes());
    let collapsed = layout(&tree, &HashSet::new(), Breakpoint::Xl);
    let expanded = layout(
        &tree,
        &["section-Light reactions".to_string()].into(),
        Breakpoint::Xl,
    );

    // root + 2 sections + takeaways
    assert_eq!(collapsed.nodes.len(), 4);
    assert_eq!(expanded.nodes.len(), 5);
    for (before, after) in collapsed.nodes.iter().zip(&expanded.nodes) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.position, after.position);
    }
    assert_eq!(expanded.nodes[1].data.children_ids, vec!["5"]);
    assert_eq!(expanded.nodes[3].data.kind, MindMapNodeType::Takeaway);
    assert_eq!(expanded.nodes[4].data.node_key, "subsection-Light reactions-Photosystems");
}

// --- Almacén ---

#[tokio::test]
async fn given_stored_notes_when_reading_back_then_document_round_trips_per_owner() {
    let store = InMemoryStore::new();
    let notes = photosynthesis_notes();
    let body = serde_json::to_value(&notes).unwrap();

    store.put("ana", ArtifactKind::Notes, "doc-1", body).await.unwrap();

    let stored = store.get("ana", ArtifactKind::Notes, "doc-1").await.unwrap().unwrap();
    let back: NotesDocument = serde_json::from_value(stored.body).unwrap();
    assert_eq!(back, notes);
    assert_eq!(back.key_takeaways, strings(&["Plants turn light into chemical energy"]));
    assert!(store.get("bob", ArtifactKind::Notes, "doc-1").await.unwrap().is_none());
}
