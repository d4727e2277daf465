// ============================================================
// Layer 5 — Latent Mixture and VAE
// ============================================================
// K decomposable-attention members combined under a latent
// variable z ∈ {0..K}:
//
//   LatentMixture   uniform prior, trained on the marginal
//     log p(y|x) = logsumexp_k log p(y|x, z=k) - log K
//
//   Vae             variational training against an inference
//                   network q(z | x, y)
//     ELBO = E_q[log p(y|x,z)] - kl_weight · KL(q || Uniform(K))
//     KL   = Σ_k q_k (log q_k + log K)
//
// The ELBO gradient w.r.t. q is estimated either exactly (sum
// over all K components) or with REINFORCE: one z per example
// drawn by Gumbel-max, reward log p(y|x,z) minus the batch-mean
// reward as a baseline.
//
// At test time the VAE predicts with the members' uniform-prior
// marginal, exactly like LatentMixture.
//
// Reference: Williams (1992) REINFORCE
//            Kingma & Welling (2014) Auto-Encoding Variational Bayes

use anyhow::Result;
use burn::{
    prelude::*,
    tensor::{backend::AutodiffBackend, Distribution},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::data::batcher::{float_values, int_values, NliBatch};
use crate::domain::{example::Label, posterior::PosteriorTable};
use crate::ml::{
    attention::{AttentionConfig, AttentionModel},
    loss::{nll_per_item, scalar},
    predictor::Classify,
    step::{classification_eval, classification_step, EvalOutput, EvalStep, StepOutput, TrainStep},
};

/// Keeps Gumbel noise finite
const UNIFORM_EPS: f64 = 1e-6;

/// log Σ exp over `dim`, keeping `dim` with size 1.
pub fn log_sum_exp<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let max   = x.clone().max_dim(dim).detach();
    let shift = max.clone().expand(x.dims());
    (x - shift).exp().sum_dim(dim).log() + max
}

// ─── LatentMixture ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct LatentMixture<B: Backend> {
    pub members: Vec<AttentionModel<B>>,
}

impl<B: Backend> LatentMixture<B> {
    pub fn new(members: Vec<AttentionModel<B>>) -> Self {
        Self { members }
    }

    /// Identical members built from one config
    pub fn init(config: &AttentionConfig, k: usize, device: &B::Device) -> Self {
        Self::new((0..k).map(|_| config.init(device)).collect())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Per-member log p(y | x, z=k) stacked as [batch, classes, K]
    fn member_log_probs(&self, batch: &NliBatch<B>) -> Tensor<B, 3> {
        let per_member = self
            .members
            .iter()
            .map(|m| m.forward(batch, None).log_probs)
            .collect();
        Tensor::stack(per_member, 2)
    }

    /// Marginal log p(y | x) under the uniform prior: [batch, classes]
    pub fn forward(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
        let stacked = self.member_log_probs(batch);
        let [n, c, k] = stacked.dims();
        log_sum_exp(stacked, 2)
            .reshape([n, c])
            .sub_scalar((k.max(1) as f64).ln())
    }

    /// Gold-label log p(y | x, z=k) for every member: [batch, K]
    fn gold_log_probs(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
        let per_member = self
            .members
            .iter()
            .map(|m| nll_per_item(m.forward(batch, None).log_probs, batch.labels.clone()).neg())
            .collect();
        Tensor::stack(per_member, 1)
    }
}

impl<B: AutodiffBackend> TrainStep<B, NliBatch<B>> for LatentMixture<B> {
    fn train_step(&self, batch: NliBatch<B>) -> StepOutput<B> {
        classification_step(self.forward(&batch), batch.labels)
    }
}

impl<B: Backend> EvalStep<B, NliBatch<B>> for LatentMixture<B> {
    fn eval_step(&self, batch: NliBatch<B>, _capture_attention: bool) -> Result<EvalOutput> {
        Ok(classification_eval(self.forward(&batch), batch.labels))
    }
}

impl<B: Backend> Classify<B> for LatentMixture<B> {
    fn log_probs(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
        self.forward(batch)
    }
}

// ─── ELBO estimator ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElboEstimator {
    /// Score-function estimate from one sampled z per example
    #[default]
    Reinforce,
    /// Full expectation over all K components
    Exact,
}

impl FromStr for ElboEstimator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reinforce" => Ok(Self::Reinforce),
            "exact"     => Ok(Self::Exact),
            other       => Err(format!("unknown ELBO estimator '{other}' (expected reinforce or exact)")),
        }
    }
}

impl fmt::Display for ElboEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reinforce => write!(f, "reinforce"),
            Self::Exact     => write!(f, "exact"),
        }
    }
}

// ─── VAE ──────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct VaeConfig {
    /// Architecture of each mixture member
    pub member:     AttentionConfig,
    pub num_models: usize,
    pub kl_weight:  f64,
    pub estimator:  ElboEstimator,
}

impl VaeConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vae<B> {
        let k = self.num_models.max(1);
        let q = self
            .member
            .clone()
            .with_intra_attn(false)
            .with_label_conditioned(true)
            .with_num_outputs(k)
            .init(device);
        Vae {
            q,
            mixture:   LatentMixture::init(&self.member, k, device),
            kl_weight: self.kl_weight,
            reinforce: self.estimator == ElboEstimator::Reinforce,
        }
    }
}

#[derive(Module, Debug)]
pub struct Vae<B: Backend> {
    /// Inference network q(z | x, y)
    pub q:         AttentionModel<B>,
    pub mixture:   LatentMixture<B>,
    pub kl_weight: f64,
    pub reinforce: bool,
}

/// Per-batch ELBO terms
pub struct ElboTerms<B: Backend> {
    /// Scalar to differentiate
    pub surrogate: Tensor<B, 1>,
    /// Batch-mean ELBO, detached
    pub elbo:      f64,
}

impl<B: Backend> Vae<B> {
    /// q(z | x, y) as log-probabilities: [batch, K]
    pub fn posterior_log_probs(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
        self.q.forward(batch, Some(batch.labels.clone())).log_probs
    }

    pub fn elbo_terms(&self, batch: &NliBatch<B>) -> ElboTerms<B> {
        let n      = batch.len();
        let k      = self.mixture.len().max(1);
        let log_k  = (k as f64).ln();
        let q_log  = self.posterior_log_probs(batch);
        let q      = q_log.clone().exp();
        let gold   = self.mixture.gold_log_probs(batch); // [n, K]

        // KL(q || Uniform(K)) per example, [n]
        let kl = (q.clone() * q_log.clone().add_scalar(log_k)).sum_dim(1).reshape([n]);
        let weighted_kl = kl.mul_scalar(self.kl_weight);

        let expected = (q.clone() * gold.clone()).sum_dim(1).reshape([n]);
        let elbo     = scalar((expected.clone() - weighted_kl.clone()).mean().detach());

        let surrogate = if self.reinforce {
            let z      = self.sample(q_log.clone().detach());
            let lp_z   = gold.gather(1, z.clone()).reshape([n]);
            let logq_z = q_log.gather(1, z).reshape([n]);

            let reward    = lp_z.clone().detach();
            let baseline  = reward.clone().mean().expand([n]);
            let advantage = reward - baseline;

            (lp_z + advantage * logq_z).neg().mean() + weighted_kl.mean()
        } else {
            (expected.neg() + weighted_kl).mean()
        };

        ElboTerms { surrogate, elbo }
    }

    /// One z per row via Gumbel-max: [batch, 1]
    fn sample(&self, q_log: Tensor<B, 2>) -> Tensor<B, 2, Int> {
        let shape   = q_log.shape();
        let uniform = Tensor::random(shape, Distribution::Uniform(0.0, 1.0), &q_log.device())
            .clamp(UNIFORM_EPS, 1.0 - UNIFORM_EPS);
        let gumbel  = uniform.log().neg().log().neg();
        (q_log + gumbel).argmax(1)
    }
}

impl<B: AutodiffBackend> TrainStep<B, NliBatch<B>> for Vae<B> {
    fn train_step(&self, batch: NliBatch<B>) -> StepOutput<B> {
        let terms = self.elbo_terms(&batch);
        StepOutput {
            loss:          terms.surrogate,
            reported_loss: -terms.elbo,
            correct:       None,
            count:         batch.len(),
        }
    }
}

impl<B: Backend> EvalStep<B, NliBatch<B>> for Vae<B> {
    fn eval_step(&self, batch: NliBatch<B>, _capture_attention: bool) -> Result<EvalOutput> {
        let n = batch.len();
        let k = self.mixture.len();

        let q      = float_values(self.posterior_log_probs(&batch).exp())?;
        let labels = int_values(batch.labels.clone())?;

        let mut table = PosteriorTable::new(Label::COUNT, k);
        for (row, &label) in labels.iter().enumerate().take(n) {
            let posterior: Vec<f64> = q
                .iter()
                .skip(row * k)
                .take(k)
                .map(|&p| p as f64)
                .collect();
            table.add(label.max(0) as usize, &posterior);
        }

        Ok(EvalOutput {
            posterior: Some(table),
            ..classification_eval(self.mixture.forward(&batch), batch.labels)
        })
    }
}

impl<B: Backend> Classify<B> for Vae<B> {
    fn log_probs(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
        self.mixture.forward(batch)
    }
}
