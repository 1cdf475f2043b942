//! Rule-based baseline controller
//!
//! Gives green to the phase whose lanes hold the most queued vehicles. Needs
//! no trained model, so it serves as the comparison baseline.

use super::Node;

#[derive(Debug, Clone)]
pub struct GreedyController {
    nodes: Vec<Node>,
}

impl GreedyController {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Pick one phase per node from the node's own (leading) queue features.
    pub fn act(&self, observations: &[Vec<f32>]) -> Vec<usize> {
        self.nodes
            .iter()
            .zip(observations)
            .map(|(node, obs)| Self::greedy_phase(node, obs))
            .collect()
    }

    fn greedy_phase(node: &Node, obs: &[f32]) -> usize {
        let own = &obs[..node.lanes.min(obs.len())];
        let mut best = 0;
        let mut best_pressure = f32::NEG_INFINITY;
        for (phase, lanes) in node.phases.iter().enumerate() {
            let pressure: f32 = lanes.iter().filter_map(|&l| own.get(l)).sum();
            if pressure > best_pressure {
                best = phase;
                best_pressure = pressure;
            }
        }
        best
    }
}
