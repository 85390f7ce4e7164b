//! s-t minimum cut on a capacitated graph (Dinic's algorithm)

#![allow(clippy::indexing_slicing)]

use std::collections::VecDeque;

const NONE: usize = usize::MAX;
const EPS: f64 = 1e-9;

/// Flow network over `n` pixel nodes plus an implicit source and sink
#[derive(Debug)]
pub(crate) struct FlowGraph {
    source: usize,
    sink: usize,
    head: Vec<usize>,
    next: Vec<usize>,
    to: Vec<usize>,
    cap: Vec<f64>,
}

impl FlowGraph {
    pub(crate) fn new(nodes: usize, edge_hint: usize) -> Self {
        Self {
            source: nodes,
            sink: nodes + 1,
            head: vec![NONE; nodes + 2],
            next: Vec::with_capacity(edge_hint * 2),
            to: Vec::with_capacity(edge_hint * 2),
            cap: Vec::with_capacity(edge_hint * 2),
        }
    }

    fn push_arc(&mut self, from: usize, to: usize, cap: f64) {
        self.next.push(self.head[from]);
        self.to.push(to);
        self.cap.push(cap);
        self.head[from] = self.to.len() - 1;
    }

    /// Pair of arcs `u -> v` and `v -> u`; arc `e` and `e ^ 1` are reverses
    fn add_pair(&mut self, u: usize, v: usize, cap_uv: f64, cap_vu: f64) {
        self.push_arc(u, v, cap_uv);
        self.push_arc(v, u, cap_vu);
    }

    /// Undirected neighbour link
    pub(crate) fn add_edge(&mut self, u: usize, v: usize, weight: f64) {
        if weight > 0.0 {
            self.add_pair(u, v, weight, weight);
        }
    }

    /// Terminal links: `to_source` is paid when the node ends up on the sink
    /// side, `to_sink` when it ends up on the source side.
    ///
    /// The common part of both capacities is routed directly and dropped.
    pub(crate) fn add_terminal(&mut self, node: usize, to_source: f64, to_sink: f64) {
        let common = to_source.min(to_sink);
        let (s, t) = (to_source - common, to_sink - common);
        if s > EPS {
            self.add_pair(self.source, node, s, 0.0);
        }
        if t > EPS {
            self.add_pair(node, self.sink, t, 0.0);
        }
    }

    fn bfs_levels(&self, level: &mut [usize]) -> bool {
        level.fill(NONE);
        level[self.source] = 0;
        let mut queue = VecDeque::from([self.source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if level[v] == NONE && self.cap[e] > EPS {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
                e = self.next[e];
            }
        }
        level[self.sink] != NONE
    }

    fn blocking_flow(&mut self, level: &mut [usize], iter: &mut [usize]) -> f64 {
        let mut total = 0.0;
        let mut path: Vec<usize> = Vec::new();
        let mut u = self.source;

        loop {
            if u == self.sink {
                let bottleneck = path
                    .iter()
                    .map(|&e| self.cap[e])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.cap[e] -= bottleneck;
                    self.cap[e ^ 1] += bottleneck;
                }
                total += bottleneck;

                // Retreat to the tail of the first saturated arc
                let cut = path
                    .iter()
                    .position(|&e| self.cap[e] <= EPS)
                    .unwrap_or(0);
                path.truncate(cut);
                u = path.last().map_or(self.source, |&e| self.to[e]);
                continue;
            }

            let mut advanced = false;
            while iter[u] != NONE {
                let e = iter[u];
                let v = self.to[e];
                if self.cap[e] > EPS && level[v] != NONE && level[v] == level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                iter[u] = self.next[e];
            }

            if !advanced {
                if u == self.source {
                    return total;
                }
                level[u] = NONE;
                let Some(e) = path.pop() else {
                    return total;
                };
                u = self.to[e ^ 1];
                iter[u] = self.next[iter[u]];
            }
        }
    }

    /// Run max-flow and return, per pixel node, whether it stays on the source side
    pub(crate) fn min_cut(mut self) -> Vec<bool> {
        let total_nodes = self.head.len();
        let mut level = vec![NONE; total_nodes];
        let mut iter = vec![NONE; total_nodes];

        while self.bfs_levels(&mut level) {
            iter.copy_from_slice(&self.head);
            if self.blocking_flow(&mut level, &mut iter) <= 0.0 {
                break;
            }
        }

        // Residual reachability from the source
        let mut reached = vec![false; total_nodes];
        reached[self.source] = true;
        let mut queue = VecDeque::from([self.source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if !reached[v] && self.cap[e] > EPS {
                    reached[v] = true;
                    queue.push_back(v);
                }
                e = self.next[e];
            }
        }

        reached.truncate(self.source);
        reached
    }
}
