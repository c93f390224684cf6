//! Dinic max-flow on a graph with two terminals
//!
//! Edges are stored in pairs (`e`, `e ^ 1`) so the residual of an edge is its
//! partner. Augmenting paths are found with an explicit stack, which keeps the
//! search safe on images with millions of pixels.

use std::collections::VecDeque;

/// Residual capacities below this are treated as saturated
const EPSILON: f64 = 1e-9;

const NONE: usize = usize::MAX;

/// Flow network over pixel nodes plus a source and a sink
#[derive(Debug)]
pub struct FlowGraph {
    head: Vec<usize>,
    next: Vec<usize>,
    to: Vec<usize>,
    capacity: Vec<f64>,
    level: Vec<usize>,
    current: Vec<usize>,
    source: usize,
    sink: usize,
}

impl FlowGraph {
    /// Graph with `nodes` inner nodes; the terminals are appended after them
    #[must_use]
    pub fn new(nodes: usize, edge_capacity_hint: usize) -> Self {
        let total = nodes + 2;
        Self {
            head: vec![NONE; total],
            next: Vec::with_capacity(edge_capacity_hint * 2),
            to: Vec::with_capacity(edge_capacity_hint * 2),
            capacity: Vec::with_capacity(edge_capacity_hint * 2),
            level: vec![NONE; total],
            current: vec![NONE; total],
            source: nodes,
            sink: nodes + 1,
        }
    }

    /// Source terminal index
    #[must_use]
    pub fn source(&self) -> usize {
        self.source
    }

    /// Sink terminal index
    #[must_use]
    pub fn sink(&self) -> usize {
        self.sink
    }

    fn push_arc(&mut self, from: usize, to: usize, capacity: f64) {
        self.to.push(to);
        self.capacity.push(capacity);
        self.next.push(self.head[from]);
        self.head[from] = self.to.len() - 1;
    }

    /// Add an edge with independent forward and backward capacities
    pub fn add_edge(&mut self, from: usize, to: usize, capacity: f64, reverse_capacity: f64) {
        self.push_arc(from, to, capacity.max(0.0));
        self.push_arc(to, from, reverse_capacity.max(0.0));
    }

    /// Connect a node to both terminals
    ///
    /// Only the difference of the two capacities is stored; subtracting the
    /// shared part changes the flow value but not the minimum cut.
    pub fn add_terminal_edges(&mut self, node: usize, from_source: f64, to_sink: f64) {
        let difference = from_source - to_sink;
        if difference > 0.0 {
            self.add_edge(self.source, node, difference, 0.0);
        } else if difference < 0.0 {
            self.add_edge(node, self.sink, -difference, 0.0);
        }
    }

    fn build_levels(&mut self) -> bool {
        self.level.fill(NONE);
        self.level[self.source] = 0;
        let mut queue = VecDeque::from([self.source]);

        while let Some(u) = queue.pop_front() {
            let mut edge = self.head[u];
            while edge != NONE {
                let v = self.to[edge];
                if self.level[v] == NONE && self.capacity[edge] > EPSILON {
                    self.level[v] = self.level[u] + 1;
                    queue.push_back(v);
                }
                edge = self.next[edge];
            }
        }

        self.level[self.sink] != NONE
    }

    /// Push flow along shortest augmenting paths in the level graph
    fn blocking_flow(&mut self) -> f64 {
        self.current.copy_from_slice(&self.head);
        let mut total = 0.0;
        let mut path: Vec<usize> = Vec::new();
        let mut u = self.source;

        loop {
            if u == self.sink {
                let bottleneck = path
                    .iter()
                    .map(|&edge| self.capacity[edge])
                    .fold(f64::INFINITY, f64::min);
                for &edge in &path {
                    self.capacity[edge] -= bottleneck;
                    self.capacity[edge ^ 1] += bottleneck;
                }
                total += bottleneck;

                // Resume from the tail of the first saturated edge
                let saturated = path
                    .iter()
                    .position(|&edge| self.capacity[edge] <= EPSILON)
                    .unwrap_or(0);
                path.truncate(saturated);
                u = path.last().map_or(self.source, |&edge| self.to[edge]);
                continue;
            }

            let mut advanced = false;
            while self.current[u] != NONE {
                let edge = self.current[u];
                let v = self.to[edge];
                if self.capacity[edge] > EPSILON
                    && self.level[v] != NONE
                    && self.level[v] == self.level[u] + 1
                {
                    path.push(edge);
                    u = v;
                    advanced = true;
                    break;
                }
                self.current[u] = self.next[edge];
            }

            if !advanced {
                if u == self.source {
                    break;
                }
                // Dead end: drop the node from this phase and retreat
                self.level[u] = NONE;
                let Some(edge) = path.pop() else {
                    break;
                };
                u = self.to[edge ^ 1];
                self.current[u] = self.next[edge];
            }
        }

        total
    }

    /// Compute the maximum flow from source to sink
    pub fn max_flow(&mut self) -> f64 {
        let mut flow = 0.0;
        while self.build_levels() {
            let pushed = self.blocking_flow();
            if pushed <= EPSILON {
                break;
            }
            flow += pushed;
        }
        flow
    }

    /// Nodes still reachable from the source in the residual graph
    ///
    /// After [`max_flow`](Self::max_flow) this is the source side of a
    /// minimum cut. The terminals are not included.
    #[must_use]
    pub fn source_side(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.head.len()];
        reachable[self.source] = true;
        let mut queue = VecDeque::from([self.source]);

        while let Some(u) = queue.pop_front() {
            let mut edge = self.head[u];
            while edge != NONE {
                let v = self.to[edge];
                if !reachable[v] && self.capacity[edge] > EPSILON {
                    reachable[v] = true;
                    queue.push_back(v);
                }
                edge = self.next[edge];
            }
        }

        reachable.truncate(self.source);
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_path_flow() {
        let mut graph = FlowGraph::new(1, 2);
        let (s, t) = (graph.source(), graph.sink());
        graph.add_edge(s, 0, 3.0, 0.0);
        graph.add_edge(0, t, 2.0, 0.0);
        assert!((graph.max_flow() - 2.0).abs() < 1e-9);
        assert_eq!(graph.source_side(), vec![true]);
    }

    #[test]
    fn test_classic_network() {
        // Textbook network with max flow 23
        let mut graph = FlowGraph::new(4, 9);
        let (s, t) = (graph.source(), graph.sink());
        graph.add_edge(s, 0, 16.0, 0.0);
        graph.add_edge(s, 1, 13.0, 0.0);
        graph.add_edge(0, 1, 10.0, 0.0);
        graph.add_edge(1, 0, 4.0, 0.0);
        graph.add_edge(0, 2, 12.0, 0.0);
        graph.add_edge(2, 1, 9.0, 0.0);
        graph.add_edge(1, 3, 14.0, 0.0);
        graph.add_edge(3, 2, 7.0, 0.0);
        graph.add_edge(2, t, 20.0, 0.0);
        graph.add_edge(3, t, 4.0, 0.0);
        assert!((graph.max_flow() - 23.0).abs() < 1e-9);
    }

    #[test]
    fn test_terminal_edges_split_nodes() {
        // Two nodes joined by a weak link, each pulled to one terminal
        let mut graph = FlowGraph::new(2, 4);
        graph.add_terminal_edges(0, 10.0, 1.0);
        graph.add_terminal_edges(1, 1.0, 10.0);
        graph.add_edge(0, 1, 0.5, 0.5);
        graph.max_flow();
        assert_eq!(graph.source_side(), vec![true, false]);
    }

    #[test]
    fn test_strong_link_keeps_nodes_together() {
        let mut graph = FlowGraph::new(2, 4);
        graph.add_terminal_edges(0, 10.0, 0.0);
        graph.add_terminal_edges(1, 0.0, 1.0);
        graph.add_edge(0, 1, 100.0, 100.0);
        graph.max_flow();
        assert_eq!(graph.source_side(), vec![true, true]);
    }

    #[test]
    fn test_long_chain_does_not_overflow_stack() {
        let nodes = 200_000;
        let mut graph = FlowGraph::new(nodes, nodes + 1);
        let (s, t) = (graph.source(), graph.sink());
        graph.add_edge(s, 0, 1.0, 0.0);
        for i in 0..nodes - 1 {
            graph.add_edge(i, i + 1, 1.0, 0.0);
        }
        graph.add_edge(nodes - 1, t, 1.0, 0.0);
        assert!((graph.max_flow() - 1.0).abs() < 1e-9);
    }
}
