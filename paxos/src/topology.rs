//! # Summary
//!
//! Computes the hierarchical acceptor forwarding tree once at startup
//! from the configuration record (§9 design notes), so handlers consult
//! a precomputed structure rather than recomputing BFS per message.
//!
//! A group's root is the acceptor whose `group_id == parent_id`; every
//! other acceptor in the group carries its parent's `group_id` and an
//! explicit `parent_id` pointing at the acceptor one level up.

use std::collections::HashMap as Map;

use hashbrown::HashSet;

use crate::message::Aid;

#[derive(Clone, Debug)]
pub struct AcceptorNode {
    pub aid: Aid,
    pub group_id: Aid,
    pub parent_id: Aid,
}

/// Precomputed parent pointer and descendant set per acceptor.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    parent: Map<Aid, Aid>,
    down: Map<Aid, HashSet<Aid>>,
}

impl Topology {
    pub fn build(acceptors: &[AcceptorNode]) -> Self {
        let mut parent = Map::new();
        let mut down: Map<Aid, HashSet<Aid>> = Map::new();

        for node in acceptors {
            if node.parent_id != node.aid {
                parent.insert(node.aid, node.parent_id);
            }
            down.entry(node.aid).or_default();
        }

        // A node's descendants are every acceptor whose ancestor chain
        // (by repeatedly following `parent`) passes through it.
        for node in acceptors {
            let mut cur = node.aid;
            while let Some(&p) = parent.get(&cur) {
                down.entry(p).or_default().insert(node.aid);
                cur = p;
            }
        }

        Topology { parent, down }
    }

    /// The node one level up from `aid`, if any (roots have none).
    pub fn parent_of(&self, aid: Aid) -> Option<Aid> {
        self.parent.get(&aid).copied()
    }

    pub fn is_root(&self, aid: Aid) -> bool {
        !self.parent.contains_key(&aid)
    }

    /// Every acceptor in `aid`'s subtree, excluding `aid` itself.
    pub fn down_acceptors(&self, aid: Aid) -> impl Iterator<Item = Aid> + '_ {
        self.down.get(&aid).into_iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(aid: Aid, group_id: Aid, parent_id: Aid) -> AcceptorNode {
        AcceptorNode { aid, group_id, parent_id }
    }

    #[test]
    fn flat_topology_has_no_parents_and_no_descendants() {
        let nodes = vec![node(0, 0, 0), node(1, 1, 1), node(2, 2, 2)];
        let topo = Topology::build(&nodes);
        for aid in 0..3 {
            assert!(topo.is_root(aid));
            assert_eq!(topo.down_acceptors(aid).count(), 0);
        }
    }

    #[test]
    fn child_reports_root_as_parent_and_root_reports_child_as_descendant() {
        let nodes = vec![node(0, 0, 0), node(1, 0, 0)];
        let topo = Topology::build(&nodes);
        assert!(topo.is_root(0));
        assert!(!topo.is_root(1));
        assert_eq!(topo.parent_of(1), Some(0));
        assert_eq!(topo.down_acceptors(0).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn grandchild_propagates_up_through_chain() {
        // 0 is root; 1's parent is 0; 2's parent is 1.
        let nodes = vec![node(0, 0, 0), node(1, 0, 0), node(2, 0, 1)];
        let topo = Topology::build(&nodes);
        let mut descendants: Vec<_> = topo.down_acceptors(0).collect();
        descendants.sort();
        assert_eq!(descendants, vec![1, 2]);
        assert_eq!(topo.down_acceptors(1).collect::<Vec<_>>(), vec![2]);
        assert_eq!(topo.parent_of(2), Some(1));
    }
}
