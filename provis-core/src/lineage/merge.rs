// De-duplicating merge of lineage graph fragments.

use std::collections::HashSet;

use crate::types::LineageGraph;

/// Counts of what one [`GraphBuilder::merge`] call added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub nodes_added: usize,
    pub links_added: usize,
}

/// Accumulates fragments into one graph.
///
/// A node is kept only if no node with the same id was merged before; a link
/// is kept only if no link with the same `(source, target)` pair was merged
/// before, whatever its type. Merged items are cloned, never shared.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    graph: LineageGraph,
    node_ids: HashSet<String>,
    link_pairs: HashSet<(String, String)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `fragment` into the accumulator.
    pub fn merge(&mut self, fragment: &LineageGraph) -> MergeStats {
        let mut stats = MergeStats::default();

        for node in &fragment.nodes {
            if self.node_ids.insert(node.id.clone()) {
                self.graph.nodes.push(node.clone());
                stats.nodes_added += 1;
            }
        }

        for link in &fragment.links {
            if self
                .link_pairs
                .insert((link.source.clone(), link.target.clone()))
            {
                self.graph.links.push(link.clone());
                stats.links_added += 1;
            }
        }

        stats
    }

    pub fn graph(&self) -> &LineageGraph {
        &self.graph
    }

    pub fn finish(self) -> LineageGraph {
        self.graph
    }
}

/// Merge fragments in iteration order.
pub fn assemble<'a, I>(fragments: I) -> LineageGraph
where
    I: IntoIterator<Item = &'a LineageGraph>,
{
    let mut builder = GraphBuilder::new();
    for fragment in fragments {
        builder.merge(fragment);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LineageEdge, LineageNode};

    fn node(id: &str) -> LineageNode {
        LineageNode {
            id: id.to_string(),
            item_category: "ENTITY".to_string(),
            item_subtype: "DATASET".to_string(),
            details: None,
        }
    }

    fn link(source: &str, target: &str, kind: &str) -> LineageEdge {
        LineageEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn duplicate_nodes_keep_first_copy() {
        let mut first = node("a");
        first.item_subtype = "MODEL".to_string();
        let a = LineageGraph {
            nodes: vec![first],
            links: vec![],
        };
        let b = LineageGraph {
            nodes: vec![node("a"), node("b")],
            links: vec![],
        };

        let graph = assemble([&a, &b]);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].item_subtype, "MODEL");
        assert_eq!(graph.nodes[1].id, "b");
    }

    #[test]
    fn first_link_type_wins_per_pair() {
        let a = LineageGraph {
            nodes: vec![node("x"), node("y")],
            links: vec![link("x", "y", "used")],
        };
        let b = LineageGraph {
            nodes: vec![],
            links: vec![link("x", "y", "wasDerivedFrom"), link("y", "x", "wasInformedBy")],
        };

        let graph = assemble([&a, &b]);
        assert_eq!(graph.links.len(), 2);
        assert_eq!(graph.links[0].kind, "used");
        assert_eq!(graph.links[1].key(), ("y", "x"));
    }

    #[test]
    fn merge_reports_what_was_added() {
        let fragment = LineageGraph {
            nodes: vec![node("a"), node("b")],
            links: vec![link("a", "b", "used")],
        };
        let mut builder = GraphBuilder::new();
        assert_eq!(
            builder.merge(&fragment),
            MergeStats {
                nodes_added: 2,
                links_added: 1
            }
        );
        assert_eq!(builder.merge(&fragment), MergeStats::default());
    }

    #[test]
    fn merged_nodes_are_independent_copies() {
        let fragment = LineageGraph {
            nodes: vec![node("a")],
            links: vec![],
        };
        let mut builder = GraphBuilder::new();
        builder.merge(&fragment);
        let mut graph = builder.finish();
        graph.nodes[0].item_category = "ACTIVITY".to_string();
        assert_eq!(fragment.nodes[0].item_category, "ENTITY");
    }

    #[test]
    fn empty_input_gives_empty_graph() {
        let graph = assemble(std::iter::empty());
        assert!(graph.is_empty());
    }

    mod proptests {
        use std::collections::HashSet;

        use super::*;
        use proptest::prelude::*;

        fn arb_id() -> impl Strategy<Value = String> {
            "[a-e]"
        }

        fn arb_fragment() -> impl Strategy<Value = LineageGraph> {
            (
                proptest::collection::vec(arb_id(), 0..6),
                proptest::collection::vec((arb_id(), arb_id(), "[a-c]{1,3}"), 0..8),
            )
                .prop_map(|(ids, links)| LineageGraph {
                    nodes: ids.iter().map(|id| node(id)).collect(),
                    links: links
                        .iter()
                        .map(|(s, t, k)| link(s, t, k))
                        .collect(),
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn merging_twice_equals_merging_once(fragment in arb_fragment()) {
                let once = assemble([&fragment]);
                let twice = assemble([&fragment, &fragment]);
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn result_has_no_duplicates(
                fragments in proptest::collection::vec(arb_fragment(), 0..5),
            ) {
                let graph = assemble(&fragments);
                let ids: HashSet<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
                prop_assert_eq!(ids.len(), graph.nodes.len());
                let pairs: HashSet<_> = graph.links.iter().map(LineageEdge::key).collect();
                prop_assert_eq!(pairs.len(), graph.links.len());
            }

            #[test]
            fn result_covers_every_input(
                fragments in proptest::collection::vec(arb_fragment(), 0..5),
            ) {
                let graph = assemble(&fragments);
                for fragment in &fragments {
                    for n in &fragment.nodes {
                        prop_assert!(graph.contains_node(&n.id));
                    }
                    for l in &fragment.links {
                        prop_assert!(graph.links.iter().any(|m| m.key() == l.key()));
                    }
                }
            }

            #[test]
            fn re_merging_a_prefix_changes_nothing(
                a in arb_fragment(),
                b in arb_fragment(),
            ) {
                let base = assemble([&a, &b]);
                let repeated = assemble([&a, &b, &a]);
                prop_assert_eq!(base, repeated);
            }
        }
    }
}
