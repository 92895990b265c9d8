use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::db::clusters::ClusterDraft;
use crate::db::models::Diagnostic;

use super::graph::DependencyGraph;
use super::message::message_skeleton;

/// Partition diagnostics into clusters of shared root cause.
///
/// Diagnostics group by (code, message skeleton); each group is then split
/// into connected components of the dependency graph restricted to that
/// group, so same-shaped but causally unrelated diagnostics land in
/// different clusters. The result covers the input exactly once.
pub fn cluster(diagnostics: &[Diagnostic], graph: &DependencyGraph) -> Vec<ClusterDraft> {
    let by_id: HashMap<i64, &Diagnostic> = diagnostics.iter().map(|d| (d.id, d)).collect();

    // BTreeMap keeps group iteration deterministic.
    let mut groups: BTreeMap<(String, String), Vec<i64>> = BTreeMap::new();
    for diag in diagnostics {
        let key = (diag.code.clone(), message_skeleton(&diag.message));
        groups.entry(key).or_default().push(diag.id);
    }

    // Undirected adjacency over the whole graph; restricted per group below.
    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for edge in &graph.edges {
        adjacency.entry(edge.cause_id).or_default().push(edge.effect_id);
        adjacency.entry(edge.effect_id).or_default().push(edge.cause_id);
    }

    let mut drafts = Vec::new();
    for ((code, skeleton), mut members) in groups {
        members.sort_unstable();
        let member_set: HashSet<i64> = members.iter().copied().collect();
        let mut unvisited: HashSet<i64> = member_set.clone();

        while let Some(&seed) = members.iter().find(|id| unvisited.contains(*id)) {
            let mut component = Vec::new();
            let mut queue = VecDeque::new();
            unvisited.remove(&seed);
            queue.push_back(seed);

            while let Some(current) = queue.pop_front() {
                component.push(current);
                if let Some(neighbors) = adjacency.get(&current) {
                    for &next in neighbors {
                        if member_set.contains(&next) && unvisited.remove(&next) {
                            queue.push_back(next);
                        }
                    }
                }
            }

            component.sort_unstable();
            let representative_id = component[0];
            let description = by_id
                .get(&representative_id)
                .map(|d| {
                    if component.len() > 1 {
                        format!("{} × {}: {}", component.len(), code, skeleton)
                    } else {
                        d.message.clone()
                    }
                })
                .unwrap_or_else(|| skeleton.clone());

            drafts.push(ClusterDraft {
                code: code.clone(),
                description,
                representative_id,
                suggested_fix_id: None,
                member_ids: component,
            });
        }
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::graph::build_graph;
    use crate::db::models::{Category, DependencyEdge, Severity, Status};

    fn diag(id: i64, file: &str, line: i64, code: &str, message: &str) -> Diagnostic {
        Diagnostic {
            id,
            file: file.to_string(),
            line,
            col: 1,
            code: code.to_string(),
            message: message.to_string(),
            category: Category::UndefinedReference,
            severity: Severity::High,
            status: Status::Detected,
            hash: format!("h{id}"),
            first_detected: String::new(),
            last_seen: String::new(),
            occurrence_count: 1,
            pattern_id: None,
            cluster_id: None,
            context_line: None,
        }
    }

    #[test]
    fn clusters_partition_the_input_exactly() {
        let diags = vec![
            diag(1, "a.py", 1, "name-defined", "Name \"x\" is not defined"),
            diag(2, "a.py", 9, "name-defined", "Name \"y\" is not defined"),
            diag(3, "b.py", 2, "assignment", "Incompatible types in assignment"),
            diag(4, "c.py", 7, "misc", "Unused \"type: ignore\" comment"),
        ];
        let graph = build_graph(&diags);
        let drafts = cluster(&diags, &graph);

        let mut covered: Vec<i64> = drafts.iter().flat_map(|d| d.member_ids.clone()).collect();
        covered.sort_unstable();
        assert_eq!(covered, vec![1, 2, 3, 4]);

        let total: usize = drafts.iter().map(|d| d.member_ids.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn same_shape_groups_by_skeleton() {
        let diags = vec![
            diag(1, "a.py", 1, "name-defined", "Name \"x\" is not defined"),
            diag(2, "b.py", 2, "name-defined", "Name \"y\" is not defined"),
        ];
        // Force causal connection so they form one component.
        let graph = DependencyGraph {
            nodes: vec![1, 2],
            edges: vec![DependencyEdge { cause_id: 1, effect_id: 2, confidence: 0.8 }],
            ..Default::default()
        };

        let drafts = cluster(&diags, &graph);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].member_ids, vec![1, 2]);
        assert_eq!(drafts[0].representative_id, 1);
        assert!(drafts[0].description.starts_with("2 × name-defined"));
    }

    #[test]
    fn causally_unrelated_twins_split_into_separate_clusters() {
        let diags = vec![
            diag(1, "a.py", 1, "name-defined", "Name \"x\" is not defined"),
            diag(2, "b.py", 2, "name-defined", "Name \"y\" is not defined"),
        ];
        // No edges: same shape, different cause.
        let graph = DependencyGraph {
            nodes: vec![1, 2],
            ..Default::default()
        };

        let drafts = cluster(&diags, &graph);
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.member_ids.len() == 1));
    }

    #[test]
    fn singletons_keep_their_full_message() {
        let diags = vec![diag(1, "a.py", 1, "misc", "Unused \"type: ignore\" comment")];
        let graph = build_graph(&diags);
        let drafts = cluster(&diags, &graph);
        assert_eq!(drafts[0].description, "Unused \"type: ignore\" comment");
    }
}
