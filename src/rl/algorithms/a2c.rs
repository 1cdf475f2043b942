//! Multi-Agent Advantage Actor-Critic
//!
//! One linear softmax actor and one linear critic per intersection. Each
//! agent sees its own queues, spatially discounted neighbour queues and the
//! neighbours' latest policies (fingerprints), and learns from spatially
//! discounted rewards with n-step returns.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{PolicyModel, PolicyOutput, Transition, UpdateStats};
use crate::config::{LrDecay, ModelConfig};
use crate::error::{GreenwaveError, Result};
use crate::rl::core::PolicyType;
use crate::rl::environment::EnvDims;
use crate::rl::training::Checkpointer;

const INIT_SCALE: f32 = 0.01;
const LOG_EPS: f32 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AgentParams {
    /// [n_a][input_dim]
    actor: Vec<Vec<f32>>,
    actor_bias: Vec<f32>,
    critic: Vec<f32>,
    critic_bias: f32,
}

impl AgentParams {
    fn new(input_dim: usize, n_actions: usize, rng: &mut StdRng) -> Self {
        let mut init = |len: usize| -> Vec<f32> {
            (0..len)
                .map(|_| rng.gen_range(-INIT_SCALE..INIT_SCALE))
                .collect()
        };
        let actor = (0..n_actions).map(|_| init(input_dim)).collect();
        let critic = init(input_dim);
        Self {
            actor,
            actor_bias: vec![0.0; n_actions],
            critic,
            critic_bias: 0.0,
        }
    }

    fn policy(&self, x: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = self
            .actor
            .iter()
            .zip(&self.actor_bias)
            .map(|(w, b)| dot(w, x) + b)
            .collect();
        softmax(&logits)
    }

    fn value(&self, x: &[f32]) -> f32 {
        dot(&self.critic, x) + self.critic_bias
    }
}

/// Serialized form of the model
#[derive(Debug, Serialize, Deserialize)]
struct ModelRecord {
    step: u64,
    input_dims: Vec<usize>,
    n_a_ls: Vec<usize>,
    agents: Vec<AgentParams>,
}

/// Linear multi-agent A2C
pub struct LinearA2c {
    input_dims: Vec<usize>,
    n_a_ls: Vec<usize>,
    config: ModelConfig,
    total_step: u64,
    agents: Vec<AgentParams>,
    buffer: Vec<Transition>,
    rng: StdRng,
}

impl LinearA2c {
    /// Build a model for the given environment dimensions.
    ///
    /// `total_step` drives the learning-rate schedule; pass 0 for a model
    /// that is only loaded and evaluated.
    pub fn new(dims: &EnvDims, total_step: u64, config: &ModelConfig, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let input_dims: Vec<usize> = (0..dims.n_agents()).map(|i| dims.input_dim(i)).collect();
        let agents = input_dims
            .iter()
            .zip(&dims.n_a_ls)
            .map(|(&d, &a)| AgentParams::new(d, a, &mut rng))
            .collect();

        Self {
            input_dims,
            n_a_ls: dims.n_a_ls.clone(),
            config: config.clone(),
            total_step,
            agents,
            buffer: Vec::with_capacity(config.batch_size),
            rng,
        }
    }

    pub fn n_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Learning rate at `step`
    pub fn learning_rate(&self, step: u64) -> f64 {
        match self.config.lr_decay {
            LrDecay::Constant => self.config.lr_init,
            LrDecay::Linear if self.total_step == 0 => self.config.lr_init,
            LrDecay::Linear => {
                let frac = 1.0 - step.min(self.total_step) as f64 / self.total_step as f64;
                (self.config.lr_init * frac).max(self.config.lr_min)
            }
        }
    }

    fn shape_reward(&self, reward: f32) -> f32 {
        let r = reward / self.config.reward_norm as f32;
        let clip = self.config.reward_clip as f32;
        if clip > 0.0 {
            r.clamp(-clip, clip)
        } else {
            r
        }
    }

    /// n-step discounted returns for agent `i` over the buffer
    fn returns(&self, i: usize, last_value: f32) -> Vec<f32> {
        let gamma = self.config.gamma as f32;
        let mut ret = last_value;
        let mut out = vec![0.0; self.buffer.len()];
        for (t, tr) in self.buffer.iter().enumerate().rev() {
            let r = self.shape_reward(tr.rewards[i]);
            ret = if tr.done { r } else { r + gamma * ret };
            out[t] = ret;
        }
        out
    }
}

impl PolicyModel for LinearA2c {
    fn forward(&self, observations: &[Vec<f32>]) -> PolicyOutput {
        let mut out = PolicyOutput::default();
        for (agent, x) in self.agents.iter().zip(observations) {
            out.policies.push(agent.policy(x));
            out.values.push(agent.value(x));
        }
        out
    }

    fn select_actions(&mut self, policies: &[Vec<f32>], policy_type: PolicyType) -> Vec<usize> {
        policies
            .iter()
            .map(|pi| match policy_type {
                PolicyType::Deterministic => argmax(pi),
                // A2C acts by sampling unless told otherwise.
                PolicyType::Stochastic | PolicyType::Default => match WeightedIndex::new(pi) {
                    Ok(dist) => dist.sample(&mut self.rng),
                    Err(_) => argmax(pi),
                },
            })
            .collect()
    }

    fn add_transition(&mut self, transition: Transition) {
        self.buffer.push(transition);
    }

    fn backward(&mut self, last_values: &[f32], step: u64) -> Result<UpdateStats> {
        if self.buffer.is_empty() {
            return Ok(UpdateStats::default());
        }
        if last_values.len() != self.agents.len() {
            return Err(GreenwaveError::Internal(format!(
                "expected {} bootstrap values, got {}",
                self.agents.len(),
                last_values.len()
            )));
        }

        let lr = self.learning_rate(step) as f32;
        let beta = self.config.entropy_coef as f32;
        let value_coef = self.config.value_coef as f32;
        let max_norm = self.config.max_grad_norm as f32;
        let batch = self.buffer.len();
        let mut stats = UpdateStats {
            lr,
            batch_len: batch,
            ..Default::default()
        };

        for i in 0..self.agents.len() {
            let returns = self.returns(i, last_values[i]);
            let params = &self.agents[i];
            let n_a = self.n_a_ls[i];
            let d = self.input_dims[i];

            let mut g_actor = vec![vec![0.0f32; d]; n_a];
            let mut g_actor_bias = vec![0.0f32; n_a];
            let mut g_critic = vec![0.0f32; d];
            let mut g_critic_bias = 0.0f32;

            for (tr, &ret) in self.buffer.iter().zip(&returns) {
                let x = &tr.observations[i];
                let action = tr.actions[i];
                let pi = params.policy(x);
                let v = params.value(x);
                let adv = ret - v;
                let entropy: f32 = -pi.iter().map(|&p| p * p.max(LOG_EPS).ln()).sum::<f32>();

                for k in 0..n_a {
                    let indicator = if k == action { 1.0 } else { 0.0 };
                    let g = adv * (indicator - pi[k])
                        - beta * pi[k] * (pi[k].max(LOG_EPS).ln() + entropy);
                    g_actor_bias[k] += g;
                    for (gw, &xj) in g_actor[k].iter_mut().zip(x) {
                        *gw += g * xj;
                    }
                }
                let gv = value_coef * adv;
                g_critic_bias += gv;
                for (gc, &xj) in g_critic.iter_mut().zip(x) {
                    *gc += gv * xj;
                }

                stats.policy_loss += -pi[action].max(LOG_EPS).ln() * adv;
                stats.value_loss += 0.5 * adv * adv;
                stats.entropy += entropy;
            }

            let scale = 1.0 / batch as f32;
            let norm = (g_actor
                .iter()
                .flatten()
                .chain(&g_actor_bias)
                .chain(&g_critic)
                .map(|g| (g * scale).powi(2))
                .sum::<f32>()
                + (g_critic_bias * scale).powi(2))
            .sqrt();
            let clip = if norm > max_norm { max_norm / norm } else { 1.0 };
            let step_size = lr * scale * clip;

            let params = &mut self.agents[i];
            for (row, grow) in params.actor.iter_mut().zip(&g_actor) {
                for (w, g) in row.iter_mut().zip(grow) {
                    *w += step_size * g;
                }
            }
            for (b, g) in params.actor_bias.iter_mut().zip(&g_actor_bias) {
                *b += step_size * g;
            }
            for (w, g) in params.critic.iter_mut().zip(&g_critic) {
                *w += step_size * g;
            }
            params.critic_bias += step_size * g_critic_bias;
        }

        let denom = (batch * self.agents.len()) as f32;
        stats.policy_loss /= denom;
        stats.value_loss /= denom;
        stats.entropy /= denom;
        self.buffer.clear();

        debug!(
            "A2C update at step {}: batch={}, lr={:.2e}, policy_loss={:.4}, value_loss={:.4}",
            step, batch, lr, stats.policy_loss, stats.value_loss
        );
        Ok(stats)
    }

    fn save(&self, dir: &Path, step: u64) -> Result<PathBuf> {
        let record = ModelRecord {
            step,
            input_dims: self.input_dims.clone(),
            n_a_ls: self.n_a_ls.clone(),
            agents: self.agents.clone(),
        };
        Checkpointer::new(dir).save(&record, step)
    }

    fn load(&mut self, dir: &Path) -> Result<u64> {
        let model_load = |reason: String| GreenwaveError::ModelLoad {
            dir: dir.to_path_buf(),
            reason,
        };

        let checkpointer = Checkpointer::new(dir);
        let step = checkpointer
            .latest_checkpoint()
            .ok_or_else(|| model_load("no checkpoint found".to_string()))?;
        let record: ModelRecord = checkpointer
            .load(step)
            .map_err(|e| model_load(e.to_string()))?;

        if record.input_dims != self.input_dims || record.n_a_ls != self.n_a_ls {
            return Err(model_load(format!(
                "checkpoint shape {:?}/{:?} does not match environment {:?}/{:?}",
                record.input_dims, record.n_a_ls, self.input_dims, self.n_a_ls
            )));
        }

        self.agents = record.agents;
        debug!("Loaded checkpoint at step {} from {:?}", record.step, dir);
        Ok(record.step)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
