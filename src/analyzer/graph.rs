use std::collections::{BTreeSet, HashMap, HashSet};

use crate::db::models::{Category, DependencyEdge, Diagnostic};

use super::message::quoted_identifiers;

/// The cycle-broken likely-causes DAG over one set of diagnostics
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// All diagnostic ids, including isolated ones
    pub nodes: Vec<i64>,
    pub edges: Vec<DependencyEdge>,
    /// Severity rank per node (lower = more severe), for ordering ties
    pub(crate) severity_rank: HashMap<i64, i64>,
}

impl DependencyGraph {
    /// Ids with no inbound edge, the inferred root causes
    pub fn root_causes(&self) -> Vec<i64> {
        let targets: HashSet<i64> = self.edges.iter().map(|e| e.effect_id).collect();
        self.nodes
            .iter()
            .copied()
            .filter(|id| !targets.contains(id))
            .collect()
    }

    pub fn has_edge(&self, cause_id: i64, effect_id: i64) -> bool {
        self.edges
            .iter()
            .any(|e| e.cause_id == cause_id && e.effect_id == effect_id)
    }
}

/// Infer directed likely-causes edges between diagnostics and break any
/// cycles so the result is a DAG
pub fn build_graph(diagnostics: &[Diagnostic]) -> DependencyGraph {
    let mut edges: HashMap<(i64, i64), f64> = HashMap::new();

    for cause in diagnostics {
        let cause_idents = quoted_identifiers(&cause.message);
        for effect in diagnostics {
            if cause.id == effect.id {
                continue;
            }

            let mut confidence: f64 = 0.0;

            // Rule (i): a declarative diagnostic about symbol S likely
            // causes diagnostics whose message mentions S.
            if matches!(
                cause.category,
                Category::MissingDeclaration | Category::ImportError
            ) {
                let effect_idents = quoted_identifiers(&effect.message);
                for ident in &cause_idents {
                    if effect_idents.contains(ident) {
                        confidence = confidence.max(0.9);
                    } else if effect.message.contains(ident.as_str()) {
                        confidence = confidence.max(0.7);
                    }
                }
            }

            // Rule (ii): earlier root-cause category in the same file
            // likely causes later effect categories.
            if cause.file == effect.file
                && cause.line < effect.line
                && cause.category.is_root_cause()
                && effect.category.is_effect()
            {
                let gap = (effect.line - cause.line) as f64;
                let proximity = 1.0 / (1.0 + gap / 10.0);
                confidence = confidence.max(0.4 + 0.2 * proximity);
            }

            if confidence > 0.0 {
                let entry = edges.entry((cause.id, effect.id)).or_insert(0.0);
                *entry = entry.max(confidence);
            }
        }
    }

    let mut edge_list: Vec<DependencyEdge> = edges
        .into_iter()
        .map(|((cause_id, effect_id), confidence)| DependencyEdge {
            cause_id,
            effect_id,
            confidence,
        })
        .collect();
    edge_list.sort_by_key(|e| (e.cause_id, e.effect_id));

    let mut nodes: Vec<i64> = diagnostics.iter().map(|d| d.id).collect();
    nodes.sort_unstable();

    let severity_rank = diagnostics
        .iter()
        .map(|d| (d.id, d.severity.rank()))
        .collect();

    let mut graph = DependencyGraph {
        nodes,
        edges: edge_list,
        severity_rank,
    };
    break_cycles(&mut graph);
    graph
}

/// Remove the lowest-confidence edge of every cycle until none remain.
/// Confidence ties break by lexicographic (cause_id, effect_id) so graph
/// construction is reproducible.
fn break_cycles(graph: &mut DependencyGraph) {
    while let Some(cycle_edges) = find_cycle(graph) {
        let victim = cycle_edges.into_iter().min_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (a.0, a.1).cmp(&(b.0, b.1)))
        });
        let Some(victim) = victim else { break };
        graph
            .edges
            .retain(|e| !(e.cause_id == victim.0 && e.effect_id == victim.1));
    }
}

/// DFS for one cycle; returns its edges as (cause, effect, confidence)
fn find_cycle(graph: &DependencyGraph) -> Option<Vec<(i64, i64, f64)>> {
    let mut adjacency: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
    for edge in &graph.edges {
        adjacency
            .entry(edge.cause_id)
            .or_default()
            .push((edge.effect_id, edge.confidence));
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<i64, Color> = graph.nodes.iter().map(|&n| (n, Color::White)).collect();
    let mut stack: Vec<i64> = Vec::new();

    fn visit(
        node: i64,
        adjacency: &HashMap<i64, Vec<(i64, f64)>>,
        color: &mut HashMap<i64, Color>,
        stack: &mut Vec<i64>,
    ) -> Option<Vec<i64>> {
        color.insert(node, Color::Gray);
        stack.push(node);

        if let Some(neighbors) = adjacency.get(&node) {
            for &(next, _) in neighbors {
                match color.get(&next).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        // Back edge: the cycle is the stack suffix from
                        // `next` plus the closing edge.
                        let pos = stack.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle = stack[pos..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = visit(next, adjacency, color, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        stack.pop();
        color.insert(node, Color::Black);
        None
    }

    for &node in &graph.nodes {
        if color.get(&node).copied() == Some(Color::White) {
            if let Some(cycle_nodes) = visit(node, &adjacency, &mut color, &mut stack) {
                let mut cycle_edges = Vec::new();
                for pair in cycle_nodes.windows(2) {
                    let confidence = graph
                        .edges
                        .iter()
                        .find(|e| e.cause_id == pair[0] && e.effect_id == pair[1])
                        .map(|e| e.confidence)
                        .unwrap_or(0.0);
                    cycle_edges.push((pair[0], pair[1], confidence));
                }
                return Some(cycle_edges);
            }
            stack.clear();
        }
    }

    None
}

/// Root causes first, dependents after their causes; ties by severity
/// (critical first) then ascending id. Kahn's algorithm over the broken
/// graph; always a permutation of the node set.
pub fn topological_order(graph: &DependencyGraph) -> Vec<i64> {
    let mut in_degree: HashMap<i64, usize> = graph.nodes.iter().map(|&n| (n, 0)).collect();
    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for edge in &graph.edges {
        *in_degree.entry(edge.effect_id).or_insert(0) += 1;
        adjacency.entry(edge.cause_id).or_default().push(edge.effect_id);
    }

    let rank = |id: i64| -> (i64, i64) {
        (
            graph.severity_rank.get(&id).copied().unwrap_or(i64::MAX),
            id,
        )
    };

    let mut ready: BTreeSet<(i64, i64)> = graph
        .nodes
        .iter()
        .filter(|&&n| in_degree.get(&n).copied().unwrap_or(0) == 0)
        .map(|&n| rank(n))
        .collect();

    let mut order = Vec::with_capacity(graph.nodes.len());
    while let Some(&key) = ready.iter().next() {
        ready.remove(&key);
        let node = key.1;
        order.push(node);

        if let Some(neighbors) = adjacency.get(&node) {
            for &next in neighbors {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(rank(next));
                    }
                }
            }
        }
    }

    order
}
