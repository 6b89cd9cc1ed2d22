//! PageRank by power iteration.
//!
//! Each iteration:
//!
//! ```text
//! PR'(v) = (1 − d)/N + d · Σ_{u → v} PR(u)/outdeg(u) + d · D/|C|   (v ∈ C)
//! ```
//!
//! where `C` is the set of nodes with at least one incident edge and `D` the
//! mass held by sinks in `C`. Isolated nodes are outside the walk and keep
//! exactly `(1 − d)/N`. Out-degree counts distinct out-neighbours.
//!
//! Stops when the L1 change drops below the threshold or the iteration cap
//! is hit; in the latter case the last iterate is returned unconverged.

use super::adjacency::{build_directed, build_undirected, DirectedAdjacency};
use super::models::{rank_scores, EntityGraph, PageRankConfig, PageRankMetadata, PageRankResult};

/// Convergence bookkeeping of one power-iteration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceState {
    pub iterations: usize,
    pub last_delta: f64,
    pub converged: bool,
}

/// Compute PageRank for every entity in the graph.
pub fn calculate_pagerank(graph: &EntityGraph, config: &PageRankConfig) -> PageRankResult {
    let adj = if config.directed {
        build_directed(graph)
    } else {
        DirectedAdjacency::from_undirected(&build_undirected(graph))
    };
    let (ranks, state) = power_iteration(&adj, config);

    let scores = graph
        .node_ids()
        .into_iter()
        .zip(ranks)
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    let ranked_entities = rank_scores(&scores);

    if !state.converged {
        tracing::warn!(
            "PageRank did not converge after {} iterations (delta={:.3e})",
            state.iterations,
            state.last_delta
        );
    }

    PageRankResult {
        scores,
        ranked_entities,
        metadata: PageRankMetadata {
            damping_factor: config.damping_factor,
            iterations: state.iterations,
            converged: state.converged,
            last_delta: state.last_delta,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
        },
    }
}

/// Run the power iteration on an adjacency. Scores are indexed by node.
pub fn power_iteration(adj: &DirectedAdjacency, config: &PageRankConfig) -> (Vec<f64>, ConvergenceState) {
    let n = adj.node_count();
    if n == 0 {
        return (
            Vec::new(),
            ConvergenceState {
                iterations: 0,
                last_delta: 0.0,
                converged: true,
            },
        );
    }

    let d = config.damping_factor;
    let nf = n as f64;
    let teleport = (1.0 - d) / nf;
    let connected: Vec<usize> = (0..n).filter(|&v| !adj.is_isolated(v)).collect();
    let sinks: Vec<usize> = connected
        .iter()
        .copied()
        .filter(|&v| adj.out_degree(v) == 0)
        .collect();

    let mut ranks = vec![config.default_score / nf; n];
    let mut next = vec![0.0; n];
    let mut state = ConvergenceState {
        iterations: 0,
        last_delta: f64::INFINITY,
        converged: false,
    };

    while state.iterations < config.max_iterations {
        let dangling: f64 = sinks.iter().map(|&v| ranks[v]).sum();
        let share = if connected.is_empty() {
            0.0
        } else {
            d * dangling / connected.len() as f64
        };

        next.fill(teleport);
        for &v in &connected {
            next[v] += share;
        }
        for (u, targets) in adj.out_neighbors.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let contribution = d * ranks[u] / targets.len() as f64;
            for &(v, _) in targets {
                next[v] += contribution;
            }
        }

        let delta: f64 = ranks.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        std::mem::swap(&mut ranks, &mut next);
        state.iterations += 1;
        state.last_delta = delta;
        if delta < config.convergence_threshold {
            state.converged = true;
            break;
        }
    }

    (ranks, state)
}
