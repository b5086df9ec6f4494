//! Mapa mental: generación del árbol fuente con el LLM y layout determinista.
//!
//! El árbol se guarda como arena (`MindMapTree`) con índices padre/hijos. El
//! layout coloca la raíz, una banda horizontal de secciones y, sólo para las
//! secciones expandidas, una banda de subsecciones centrada bajo su padre.
//! Los ids numéricos se reasignan en cada layout; la identidad estable de un
//! nodo es su `node_key`, derivada del texto del encabezado.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::llm::{generate_content, schema_instructions, TextGenerator};
use crate::models::{
    Emphasis, MindMapEdge, MindMapLayout, MindMapNode, MindMapNodeData, MindMapNodeType, MindMapSource,
    MindMapSourceNode, NotesDocument, Position,
};
use crate::repair::recover_structured;

pub type NodeIndex = usize;

pub const ROOT_Y: f64 = 50.0;
pub const SECTION_EDGE_COLOR: &str = "#6366f1";
pub const SUBSECTION_EDGE_COLOR: &str = "#10b981";
pub const ROOT_KEY: &str = "root";
pub const TAKEAWAY_KEY: &str = "takeaways";

const MIND_MAP_PROMPT: &str = r#"
You design mind maps from study notes. You receive the notes as JSON.
Return one "central_concept", between 3 and 7 "branches" (each with a "branch_label") and, for each branch, its "main_nodes".
Main nodes may have "children", at most 2 levels deep. Tag important nodes with "emphasis": "high", "medium" or "low".
The output MUST be a single JSON object matching this JSON Schema. No explanations, only the JSON.
"#;

// ---------------------------------------------------------------------
// ÁRBOL (ARENA)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub label: String,
    pub kind: MindMapNodeType,
    pub key: String,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    pub points_count: usize,
    pub definitions_count: usize,
    pub examples_count: usize,
    pub emphasis: Option<Emphasis>,
}

impl TreeNode {
    fn new(label: &str, kind: MindMapNodeType, key: String) -> Self {
        Self {
            label: label.to_string(),
            kind,
            key,
            parent: None,
            children: Vec::new(),
            points_count: 0,
            definitions_count: 0,
            examples_count: 0,
            emphasis: None,
        }
    }
}

/// Árbol de a lo sumo tres niveles: raíz → secciones → subsecciones.
#[derive(Debug, Clone, PartialEq)]
pub struct MindMapTree {
    nodes: Vec<TreeNode>,
}

impl MindMapTree {
    const ROOT: NodeIndex = 0;

    fn with_root(label: &str) -> Self {
        Self {
            nodes: vec![TreeNode::new(label, MindMapNodeType::Root, ROOT_KEY.to_string())],
        }
    }

    fn attach(&mut self, parent: NodeIndex, mut node: TreeNode) -> NodeIndex {
        let index = self.nodes.len();
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent].children.push(index);
        index
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[Self::ROOT]
    }

    pub fn children(&self, index: NodeIndex) -> impl Iterator<Item = (NodeIndex, &TreeNode)> + '_ {
        self.nodes
            .get(index)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |&child| (child, &self.nodes[child]))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Árbol a partir de los apuntes: secciones, subsecciones y un nodo de
    /// conclusiones clave al final si las hay.
    pub fn from_notes(doc: &NotesDocument) -> Self {
        let mut tree = Self::with_root(&doc.title);

        for section in &doc.sections {
            let mut node = TreeNode::new(
                &section.heading,
                MindMapNodeType::Section,
                section_key(&section.heading),
            );
            node.points_count = section.points.len();
            node.definitions_count = section.definitions.len();
            node.examples_count = section.examples.len();
            let section_index = tree.attach(Self::ROOT, node);

            for sub in &section.subsections {
                let mut node = TreeNode::new(
                    &sub.heading,
                    MindMapNodeType::Subsection,
                    subsection_key(&section.heading, &sub.heading),
                );
                node.points_count = sub.points.len();
                node.definitions_count = sub.definitions.len();
                node.examples_count = sub.examples.len();
                tree.attach(section_index, node);
            }
        }

        if !doc.key_takeaways.is_empty() {
            let mut node = TreeNode::new("Key Takeaways", MindMapNodeType::Takeaway, TAKEAWAY_KEY.to_string());
            node.points_count = doc.key_takeaways.len();
            tree.attach(Self::ROOT, node);
        }

        tree
    }

    /// Árbol a partir del mapa generado: ramas como secciones y nodos
    /// principales como subsecciones. Los descendientes más profundos no se
    /// dibujan; se cuentan en el `points_count` de su nodo principal.
    pub fn from_source(source: &MindMapSource) -> Self {
        let mut tree = Self::with_root(&source.central_concept);

        for branch in &source.branches {
            let mut node = TreeNode::new(
                &branch.branch_label,
                MindMapNodeType::Section,
                section_key(&branch.branch_label),
            );
            node.points_count = branch.main_nodes.len();
            let branch_index = tree.attach(Self::ROOT, node);

            for main in &branch.main_nodes {
                let mut node = TreeNode::new(
                    &main.label,
                    MindMapNodeType::Subsection,
                    subsection_key(&branch.branch_label, &main.label),
                );
                node.emphasis = main.emphasis;
                node.points_count = count_descendants(main);
                if node.points_count > 0 {
                    debug!(
                        "Nodo '{}' recortado: {} descendientes no se dibujan",
                        main.label, node.points_count
                    );
                }
                tree.attach(branch_index, node);
            }
        }

        tree
    }
}

fn count_descendants(node: &MindMapSourceNode) -> usize {
    node.children
        .iter()
        .map(|child| 1 + count_descendants(child))
        .sum()
}

pub fn section_key(heading: &str) -> String {
    format!("section-{heading}")
}

pub fn subsection_key(parent_heading: &str, heading: &str) -> String {
    format!("subsection-{parent_heading}-{heading}")
}

// ---------------------------------------------------------------------
// LAYOUT
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Breakpoint {
    Sm,
    Md,
    Lg,
    Xl,
}

/// Constantes de layout de un tamaño de pantalla. No se interpolan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConstants {
    pub tier_spacing: f64,
    pub sibling_spacing: f64,
    pub subsection_spacing: f64,
    pub center_x: f64,
}

impl Breakpoint {
    pub fn from_width(width: u32) -> Self {
        match width {
            0..=639 => Breakpoint::Sm,
            640..=1023 => Breakpoint::Md,
            1024..=1279 => Breakpoint::Lg,
            _ => Breakpoint::Xl,
        }
    }

    pub fn constants(self) -> LayoutConstants {
        match self {
            Breakpoint::Sm => LayoutConstants {
                tier_spacing: 150.0,
                sibling_spacing: 180.0,
                subsection_spacing: 140.0,
                center_x: 300.0,
            },
            Breakpoint::Md => LayoutConstants {
                tier_spacing: 180.0,
                sibling_spacing: 240.0,
                subsection_spacing: 170.0,
                center_x: 450.0,
            },
            Breakpoint::Lg => LayoutConstants {
                tier_spacing: 200.0,
                sibling_spacing: 300.0,
                subsection_spacing: 200.0,
                center_x: 600.0,
            },
            Breakpoint::Xl => LayoutConstants {
                tier_spacing: 220.0,
                sibling_spacing: 350.0,
                subsection_spacing: 230.0,
                center_x: 750.0,
            },
        }
    }
}

/// Coordenadas x de `count` hermanos repartidos uniformemente y centrados en `center`.
fn band_positions(count: usize, spacing: f64, center: f64) -> impl Iterator<Item = f64> {
    let total = count.saturating_sub(1) as f64 * spacing;
    let start = center - total / 2.0;
    (0..count).map(move |i| start + i as f64 * spacing)
}

fn node_data(tree_node: &TreeNode, is_expanded: bool, parent_id: Option<&str>) -> MindMapNodeData {
    MindMapNodeData {
        label: tree_node.label.clone(),
        kind: tree_node.kind,
        is_expanded,
        children_ids: Vec::new(),
        parent_id: parent_id.map(str::to_string),
        points_count: tree_node.points_count,
        definitions_count: tree_node.definitions_count,
        examples_count: tree_node.examples_count,
        node_key: tree_node.key.clone(),
        has_expandable_children: tree_node.kind == MindMapNodeType::Section && !tree_node.children.is_empty(),
        emphasis: tree_node.emphasis,
    }
}

fn edge(source: &str, target: &str, color: &'static str) -> MindMapEdge {
    MindMapEdge {
        id: format!("e{source}-{target}"),
        source: source.to_string(),
        target: target.to_string(),
        color,
    }
}

/// Calcula posiciones y aristas. Función pura: mismos argumentos, misma salida.
///
/// Las secciones siempre se colocan antes que cualquier subsección, de modo que
/// expandir una sección no mueve ni renumera los nodos de sección.
pub fn layout(tree: &MindMapTree, expanded_keys: &HashSet<String>, breakpoint: Breakpoint) -> MindMapLayout {
    let constants = breakpoint.constants();
    let mut nodes: Vec<MindMapNode> = Vec::new();
    let mut edges: Vec<MindMapEdge> = Vec::new();
    let mut next_id = 1usize;
    let mut assign_id = || {
        let id = next_id.to_string();
        next_id += 1;
        id
    };

    let root = tree.root();
    let root_id = assign_id();
    nodes.push(MindMapNode {
        id: root_id.clone(),
        position: Position {
            x: constants.center_x,
            y: ROOT_Y,
        },
        data: node_data(root, true, None),
    });

    let section_y = ROOT_Y + constants.tier_spacing;
    let mut placed_sections: Vec<(usize, NodeIndex)> = Vec::new();

    let sections: Vec<(NodeIndex, &TreeNode)> = tree.children(MindMapTree::ROOT).collect();
    let xs = band_positions(sections.len(), constants.sibling_spacing, constants.center_x);
    for ((index, section), x) in sections.into_iter().zip(xs) {
        let id = assign_id();
        let is_expanded = expanded_keys.contains(&section.key);
        nodes.push(MindMapNode {
            id: id.clone(),
            position: Position { x, y: section_y },
            data: node_data(section, is_expanded, Some(&root_id)),
        });
        edges.push(edge(&root_id, &id, SECTION_EDGE_COLOR));
        nodes[0].data.children_ids.push(id);
        placed_sections.push((nodes.len() - 1, index));
    }

    let subsection_y = ROOT_Y + 2.0 * constants.tier_spacing;
    for (position, index) in placed_sections {
        let section_node = &nodes[position];
        if !section_node.data.is_expanded {
            continue;
        }
        let parent_id = section_node.id.clone();
        let parent_x = section_node.position.x;

        let subsections: Vec<&TreeNode> = tree.children(index).map(|(_, node)| node).collect();
        let xs = band_positions(subsections.len(), constants.subsection_spacing, parent_x);
        for (sub, x) in subsections.into_iter().zip(xs) {
            let id = assign_id();
            nodes.push(MindMapNode {
                id: id.clone(),
                position: Position { x, y: subsection_y },
                data: node_data(sub, false, Some(&parent_id)),
            });
            edges.push(edge(&parent_id, &id, SUBSECTION_EDGE_COLOR));
            nodes[position].data.children_ids.push(id);
        }
    }

    MindMapLayout { nodes, edges }
}

// ---------------------------------------------------------------------
// GENERACIÓN
// ---------------------------------------------------------------------

/// Pide al LLM el árbol fuente del mapa mental para unos apuntes.
pub async fn generate_mind_map(
    generator: &dyn TextGenerator,
    doc: &NotesDocument,
) -> Result<MindMapSource, PipelineError> {
    let system = format!("{}\n{}", MIND_MAP_PROMPT.trim(), schema_instructions::<MindMapSource>());
    let payload = serde_json::to_string(doc)
        .map_err(|e| PipelineError::Validation(format!("apuntes no serializables: {e}")))?;

    let content = generate_content(generator, &system, &payload).await?;
    let recovered = recover_structured::<MindMapSource>(&content).map_err(PipelineError::from_recovery)?;

    info!(
        "Mapa mental generado: '{}' con {} ramas",
        recovered.data.central_concept,
        recovered.data.branches.len()
    );
    Ok(recovered.data)
}
