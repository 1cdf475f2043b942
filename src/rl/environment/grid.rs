//! Simulated Signalised Grid
//!
//! A queue-level simulation of a `rows x cols` grid of intersections. Each
//! intersection has four incoming lanes (northbound, southbound, eastbound,
//! westbound) and two phases (north-south green, east-west green).
//!
//! Every control step lasts `control_interval_sec` simulated seconds:
//! 1. Green lanes discharge up to `saturation_flow * green_secs` vehicles;
//!    switching phase costs `yellow_interval_sec` of green.
//! 2. Discharged vehicles join the same-direction lane of the downstream
//!    intersection, or leave the network at the boundary.
//! 3. Boundary lanes receive new vehicles, one Bernoulli trial per second.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{EnvDims, EnvStep, Node, TrafficEnv};
use crate::config::EnvConfig;
use crate::error::{GreenwaveError, Result};

pub const LANES_PER_NODE: usize = 4;
pub const NUM_PHASES: usize = 2;

/// Travel direction per lane index as (row delta, col delta)
const LANE_DIRECTIONS: [(isize, isize); LANES_PER_NODE] = [(-1, 0), (1, 0), (0, 1), (0, -1)];

/// Per-step traffic measurements, written when recording is enabled
#[derive(Debug, Clone, Serialize)]
pub struct TrafficRecord {
    pub scenario: String,
    pub agent: String,
    pub episode: usize,
    pub step: usize,
    pub time_sec: f64,
    pub total_queue: u64,
    pub avg_queue: f64,
    pub max_queue: u32,
    pub arrived: u64,
    pub departed: u64,
    pub phase_switches: usize,
}

/// In-process traffic simulator implementing [`TrafficEnv`]
pub struct SimulatedGrid {
    config: EnvConfig,
    port: u16,
    agent: String,
    node_names: Vec<String>,
    nodes: Vec<Node>,
    dims: EnvDims,
    /// Downstream (node, lane) per (node, lane); None leaves the network
    downstream: Vec<[Option<usize>; LANES_PER_NODE]>,
    /// Whether a lane is fed from outside the grid
    boundary: Vec<[bool; LANES_PER_NODE]>,
    queues: Vec<[u32; LANES_PER_NODE]>,
    phases: Vec<usize>,
    fingerprints: Vec<Vec<f32>>,
    rng: StdRng,
    /// Training resets so far; training traffic is seeded from it alone
    train_episodes: u64,
    episode_steps: usize,
    step_index: usize,
    episode: usize,
    recording: bool,
    records: Vec<TrafficRecord>,
}

impl SimulatedGrid {
    /// Build the grid for port slot `port`; the simulator port is
    /// `sim_port_base + port`.
    pub fn new(config: &EnvConfig, port: u16) -> Result<Self> {
        let rows = config.grid_rows;
        let cols = config.grid_cols;
        if rows == 0 || cols == 0 {
            return Err(GreenwaveError::Simulator(format!(
                "grid must have at least one intersection, got {rows}x{cols}"
            )));
        }
        let sim_port = config.sim_port_base.checked_add(port).ok_or_else(|| {
            GreenwaveError::Simulator(format!(
                "port slot {port} overflows base port {}",
                config.sim_port_base
            ))
        })?;

        let n = rows * cols;
        let index = |r: usize, c: usize| r * cols + c;
        let offset = |r: usize, c: usize, dr: isize, dc: isize| -> Option<usize> {
            let nr = r as isize + dr;
            let nc = c as isize + dc;
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                None
            } else {
                Some(index(nr as usize, nc as usize))
            }
        };

        let mut node_names = Vec::with_capacity(n);
        let mut nodes = Vec::with_capacity(n);
        let mut downstream = Vec::with_capacity(n);
        let mut boundary = Vec::with_capacity(n);

        for r in 0..rows {
            for c in 0..cols {
                let name = format!("nt{}", index(r, c) + 1);
                let mut neighbors = Vec::new();
                let mut down = [None; LANES_PER_NODE];
                let mut edge = [false; LANES_PER_NODE];
                for (lane, &(dr, dc)) in LANE_DIRECTIONS.iter().enumerate() {
                    down[lane] = offset(r, c, dr, dc);
                    edge[lane] = offset(r, c, -dr, -dc).is_none();
                    if let Some(j) = down[lane] {
                        neighbors.push(j);
                    }
                }
                neighbors.sort_unstable();

                node_names.push(name.clone());
                nodes.push(Node {
                    name,
                    neighbors,
                    phases: vec![vec![0, 1], vec![2, 3]],
                    lanes: LANES_PER_NODE,
                });
                downstream.push(down);
                boundary.push(edge);
            }
        }

        let n_w_ls: Vec<usize> = nodes
            .iter()
            .map(|node| node.neighbors.len() * LANES_PER_NODE)
            .collect();
        let n_f_ls: Vec<usize> = nodes
            .iter()
            .map(|node| node.neighbors.len() * NUM_PHASES)
            .collect();
        let n_s_ls: Vec<usize> = n_w_ls.iter().map(|w| LANES_PER_NODE + w).collect();
        let n_a_ls = vec![NUM_PHASES; n];
        let dims = EnvDims {
            n_s: n_s_ls.iter().sum(),
            n_a: n_a_ls.iter().sum(),
            n_s_ls,
            n_a_ls,
            n_w_ls,
            n_f_ls,
        };

        debug!(
            "Simulated grid {}x{} on port {} ({} agents)",
            rows, cols, sim_port, n
        );

        Ok(Self {
            port: sim_port,
            agent: config.agent.clone(),
            node_names,
            nodes,
            dims,
            downstream,
            boundary,
            queues: vec![[0; LANES_PER_NODE]; n],
            phases: vec![0; n],
            fingerprints: vec![vec![1.0 / NUM_PHASES as f32; NUM_PHASES]; n],
            rng: StdRng::seed_from_u64(config.seed),
            train_episodes: 0,
            episode_steps: config.episode_steps().max(1),
            step_index: 0,
            episode: 0,
            recording: false,
            records: Vec::new(),
            config: config.clone(),
        })
    }

    pub fn episode_steps(&self) -> usize {
        self.episode_steps
    }

    pub fn total_queue(&self) -> u64 {
        self.queues
            .iter()
            .flat_map(|lanes| lanes.iter())
            .map(|&q| q as u64)
            .sum()
    }

    fn observe(&self) -> Vec<Vec<f32>> {
        let norm = self.config.norm_queue as f32;
        let gamma = self.config.coop_gamma as f32;

        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let mut obs = Vec::with_capacity(self.dims.input_dim(i));
                obs.extend(self.queues[i].iter().map(|&q| q as f32 / norm));
                for &j in &node.neighbors {
                    obs.extend(self.queues[j].iter().map(|&q| gamma * q as f32 / norm));
                }
                for &j in &node.neighbors {
                    obs.extend_from_slice(&self.fingerprints[j]);
                }
                obs
            })
            .collect()
    }

    fn arrivals(&mut self, trials: usize) -> u64 {
        let p = self.config.arrival_rate;
        let mut arrived = 0u64;
        for i in 0..self.queues.len() {
            for lane in 0..LANES_PER_NODE {
                if !self.boundary[i][lane] {
                    continue;
                }
                let count = (0..trials).filter(|_| self.rng.gen_bool(p)).count() as u32;
                self.queues[i][lane] += count;
                arrived += count as u64;
            }
        }
        arrived
    }
}

impl TrafficEnv for SimulatedGrid {
    fn dims(&self) -> &EnvDims {
        &self.dims
    }

    fn node_names(&self) -> &[String] {
        &self.node_names
    }

    fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn agent(&self) -> &str {
        &self.agent
    }

    fn set_agent(&mut self, agent: &str) {
        self.agent = agent.to_string();
    }

    fn test_num(&self) -> usize {
        self.config.test_seeds.len()
    }

    fn init_recording(&mut self, enabled: bool) {
        self.recording = enabled;
        self.records.clear();
    }

    fn reset(&mut self, test_index: Option<usize>) -> Result<Vec<Vec<f32>>> {
        if let Some(index) = test_index {
            let seed = self.config.test_seeds.get(index).copied().ok_or_else(|| {
                GreenwaveError::Simulator(format!(
                    "test episode {index} requested but only {} test seeds configured",
                    self.config.test_seeds.len()
                ))
            })?;
            self.rng = StdRng::seed_from_u64(seed);
            self.episode = index;
        } else {
            self.rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(self.train_episodes));
            self.train_episodes += 1;
            self.episode = self.train_episodes as usize;
        }

        for lanes in &mut self.queues {
            *lanes = [0; LANES_PER_NODE];
        }
        self.phases.iter_mut().for_each(|p| *p = 0);
        for fp in &mut self.fingerprints {
            fp.iter_mut().for_each(|x| *x = 1.0 / NUM_PHASES as f32);
        }
        self.step_index = 0;

        Ok(self.observe())
    }

    fn update_fingerprint(&mut self, policies: &[Vec<f32>]) {
        for (fp, policy) in self.fingerprints.iter_mut().zip(policies) {
            if policy.len() == fp.len() {
                fp.copy_from_slice(policy);
            }
        }
    }

    fn step(&mut self, actions: &[usize]) -> Result<EnvStep> {
        if actions.len() != self.nodes.len() {
            return Err(GreenwaveError::Simulator(format!(
                "expected {} actions, got {}",
                self.nodes.len(),
                actions.len()
            )));
        }
        if let Some((i, &a)) = actions
            .iter()
            .enumerate()
            .find(|(i, a)| **a >= self.nodes[*i].phases.len())
        {
            return Err(GreenwaveError::Simulator(format!(
                "invalid phase {a} for node {}",
                self.node_names[i]
            )));
        }

        let control = self.config.control_interval_sec;
        let yellow = self.config.yellow_interval_sec;
        let flow = self.config.saturation_flow;

        // Discharge into a transfer buffer so node order does not matter.
        let mut incoming = vec![[0u32; LANES_PER_NODE]; self.nodes.len()];
        let mut departed = 0u64;
        let mut switches = 0usize;
        for (i, &action) in actions.iter().enumerate() {
            let switched = action != self.phases[i];
            if switched {
                switches += 1;
            }
            let green = if switched { control - yellow } else { control };
            let capacity = (green * flow).floor() as u32;

            for &lane in &self.nodes[i].phases[action] {
                let moved = self.queues[i][lane].min(capacity);
                self.queues[i][lane] -= moved;
                match self.downstream[i][lane] {
                    Some(j) => incoming[j][lane] += moved,
                    None => departed += moved as u64,
                }
            }
            self.phases[i] = action;
        }
        for (lanes, extra) in self.queues.iter_mut().zip(&incoming) {
            for lane in 0..LANES_PER_NODE {
                lanes[lane] += extra[lane];
            }
        }

        let arrived = self.arrivals(control.round().max(1.0) as usize);
        self.step_index += 1;
        let done = self.step_index >= self.episode_steps;

        let local: Vec<f32> = self
            .queues
            .iter()
            .map(|lanes| -(lanes.iter().sum::<u32>() as f32))
            .collect();
        let gamma = self.config.coop_gamma as f32;
        let rewards = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                local[i] + gamma * node.neighbors.iter().map(|&j| local[j]).sum::<f32>()
            })
            .collect();
        let global_reward = local.iter().sum();

        if self.recording {
            let total_queue = self.total_queue();
            let lanes = (self.nodes.len() * LANES_PER_NODE) as f64;
            let max_queue = self
                .queues
                .iter()
                .flat_map(|l| l.iter().copied())
                .max()
                .unwrap_or(0);
            self.records.push(TrafficRecord {
                scenario: self.config.scenario.clone(),
                agent: self.agent.clone(),
                episode: self.episode,
                step: self.step_index,
                time_sec: self.step_index as f64 * control,
                total_queue,
                avg_queue: total_queue as f64 / lanes,
                max_queue,
                arrived,
                departed,
                phase_switches: switches,
            });
        }

        Ok(EnvStep {
            observations: self.observe(),
            rewards,
            done,
            global_reward,
        })
    }

    fn terminate(&mut self) {
        debug!(
            "Episode {} terminated after {} steps on port {}",
            self.episode, self.step_index, self.port
        );
    }

    fn output_data(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let path = dir.join(format!("{}_traffic.csv", self.agent));
        let mut writer = csv::Writer::from_path(&path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(vec![path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_config() -> EnvConfig {
        EnvConfig {
            seed: 7,
            agent: "ma2c".to_string(),
            scenario: "grid".to_string(),
            grid_rows: 2,
            grid_cols: 3,
            control_interval_sec: 5.0,
            yellow_interval_sec: 2.0,
            episode_length_sec: 50.0,
            arrival_rate: 0.3,
            saturation_flow: 0.5,
            coop_gamma: 0.5,
            norm_queue: 10.0,
            test_seeds: vec![100, 200],
            sim_port_base: 8000,
        }
    }

    #[test]
    fn test_topology_and_dims() {
        let env = SimulatedGrid::new(&env_config(), 3).unwrap();
        assert_eq!(env.port(), 8003);
        assert_eq!(env.node_names().len(), 6);
        assert_eq!(env.node_names()[0], "nt1");

        // corner node nt1 (0,0) touches nt2 (0,1) and nt4 (1,0)
        assert_eq!(env.nodes()[0].neighbors, vec![1, 3]);
        // middle of the top row has three neighbours
        assert_eq!(env.nodes()[1].neighbors, vec![0, 2, 4]);

        let dims = env.dims();
        assert_eq!(dims.n_agents(), 6);
        assert_eq!(dims.n_s_ls[0], 4 + 2 * 4);
        assert_eq!(dims.n_w_ls[1], 3 * 4);
        assert_eq!(dims.n_f_ls[1], 3 * 2);
        assert_eq!(dims.n_a_ls, vec![2; 6]);
        assert_eq!(dims.n_a, 12);
        assert_eq!(dims.n_s, dims.n_s_ls.iter().sum::<usize>());
    }

    #[test]
    fn test_observation_lengths_match_dims() {
        let mut env = SimulatedGrid::new(&env_config(), 0).unwrap();
        let obs = env.reset(None).unwrap();
        for (i, o) in obs.iter().enumerate() {
            assert_eq!(o.len(), env.dims().input_dim(i));
        }
    }

    #[test]
    fn test_episode_runs_to_done() {
        let mut env = SimulatedGrid::new(&env_config(), 0).unwrap();
        env.reset(None).unwrap();
        let mut steps = 0;
        loop {
            let result = env.step(&[0, 1, 0, 1, 0, 1]).unwrap();
            steps += 1;
            assert!(result.global_reward <= 0.0);
            if result.done {
                break;
            }
        }
        assert_eq!(steps, 10);
    }

    #[test]
    fn test_test_episodes_are_reproducible() {
        let run = |port: u16| {
            let mut env = SimulatedGrid::new(&env_config(), port).unwrap();
            env.reset(Some(1)).unwrap();
            let mut rewards = Vec::new();
            for _ in 0..10 {
                rewards.push(env.step(&[1; 6]).unwrap().global_reward);
            }
            rewards
        };
        assert_eq!(run(0), run(5));
    }

    fn run_episode(env: &mut SimulatedGrid, test_index: Option<usize>) -> Vec<u64> {
        env.reset(test_index).unwrap();
        let mut queues = Vec::new();
        loop {
            let done = env.step(&[0; 6]).unwrap().done;
            queues.push(env.total_queue());
            if done {
                return queues;
            }
        }
    }

    #[test]
    fn test_training_traffic_ignores_test_passes() {
        let mut env = SimulatedGrid::new(&env_config(), 0).unwrap();
        let mut train = Vec::new();
        for _ in 0..3 {
            train.push(run_episode(&mut env, None));
            for index in 0..env.test_num() {
                run_episode(&mut env, Some(index));
            }
        }
        assert_ne!(train[0], train[1]);
        assert_ne!(train[1], train[2]);

        let mut untested = SimulatedGrid::new(&env_config(), 0).unwrap();
        let plain: Vec<_> = (0..3).map(|_| run_episode(&mut untested, None)).collect();
        assert_eq!(train, plain);
    }

    #[test]
    fn test_rejects_bad_actions() {
        let mut env = SimulatedGrid::new(&env_config(), 0).unwrap();
        env.reset(None).unwrap();
        assert!(env.step(&[0; 5]).is_err());
        assert!(env.step(&[0, 0, 0, 0, 0, 2]).is_err());
        assert!(env.reset(Some(2)).is_err());
    }

    #[test]
    fn test_port_overflow() {
        let mut config = env_config();
        config.sim_port_base = u16::MAX;
        assert!(SimulatedGrid::new(&config, 1).is_err());
    }

    #[test]
    fn test_recording_writes_traffic_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let mut env = SimulatedGrid::new(&env_config(), 0).unwrap();
        env.set_agent("ma2c_test");
        env.init_recording(true);
        env.reset(Some(0)).unwrap();
        for _ in 0..3 {
            env.step(&[0; 6]).unwrap();
        }
        let paths = env.output_data(tmp.path()).unwrap();
        assert_eq!(paths, vec![tmp.path().join("ma2c_test_traffic.csv")]);

        let mut reader = csv::Reader::from_path(&paths[0]).unwrap();
        assert_eq!(&reader.headers().unwrap()[0], "scenario");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| &r[0] == "grid" && &r[1] == "ma2c_test"));
    }
}
