// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One generic loop drives every model in the crate:
//
//   validate once            → initial best accuracy
//   for each epoch:
//     for each batch:
//       stop flag set?       → abort the epoch
//       train_step           → forward + scalar loss
//       backward             → fresh gradients for this step
//       clip                 → global gradient norm ≤ grad_clip
//       Adam step            → weight decay
//       every log_freq       → log window averages
//     validate               → loss / accuracy / perplexity
//     strictly better?       → snapshot + checkpoint
//   return the best snapshot
//
// An epoch is one fallible unit. If anything inside it fails
// (including Ctrl-C, surfaced as `Interrupted`) the error is
// logged, training stops, and the best snapshot is returned
// instead of the error.
//
// Key Burn insight:
//   - Training uses the autodiff backend B
//   - model.valid() gives the same module on B::InnerBackend,
//     so validation batches must be built for the inner backend
//     and no autodiff graph is recorded
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::DataLoader,
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{sync::Arc, time::Instant};

use crate::domain::{
    posterior::PosteriorTable,
    summary::{BestTracker, EvalTotals, RunningWindow, ValidationSummary},
    traits::AttentionSink,
};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointMeta},
    interrupt::StopFlag,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    grad_clip::clip_global_norm,
    step::{EvalStep, TrainStep},
};

/// Raised inside an epoch when the stop flag is set.
#[derive(Debug, thiserror::Error)]
#[error("training interrupted by user")]
pub struct Interrupted;

// ─── Settings ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct FitSettings {
    pub epochs:         usize,
    pub lr:             f64,
    pub weight_decay:   f64,
    /// Maximum global gradient norm; None disables clipping
    pub grad_clip:      Option<f64>,
    /// Log the running window every this many batches
    pub log_freq:       usize,
    /// Batches per epoch, used for the progress fraction
    pub num_batches:    usize,
    /// Capture attention every this many validation batches (0 = never)
    pub visualize_freq: usize,
}

impl FitSettings {
    /// Adam with the run's weight decay. Clipping is applied to the
    /// global norm in `train_epoch`, not per parameter by the optimizer.
    pub fn optimizer(&self) -> AdamConfig {
        let mut cfg = AdamConfig::new();
        if self.weight_decay > 0.0 {
            cfg = cfg.with_weight_decay(Some(WeightDecayConfig::new(self.weight_decay as f32)));
        }
        cfg
    }
}

/// Side channels of a run. Only the checkpoint and stop flag are required.
pub struct FitHooks<'a> {
    pub checkpoint: &'a CheckpointManager,
    pub stop:       &'a StopFlag,
    pub metrics:    Option<&'a MetricsLogger>,
    pub attention:  Option<&'a mut dyn AttentionSink>,
}

pub struct FitReport<M> {
    /// The best snapshot (not necessarily the last epoch's weights)
    pub model:            M,
    pub best:             ValidationSummary,
    /// 0 if no epoch beat the initial validation
    pub best_epoch:       usize,
    pub epochs_completed: usize,
    pub stopped_early:    bool,
}

// ─── fit ──────────────────────────────────────────────────────────────────────
/// Train `model` for `settings.epochs` epochs and return the best snapshot.
///
/// `train_eval_loader`, when given, re-evaluates the training data after
/// each epoch (the language-model trainer reports train perplexity).
pub fn fit<B, M, TB, VB>(
    model:             M,
    train_loader:      Arc<dyn DataLoader<TB>>,
    valid_loader:      Arc<dyn DataLoader<VB>>,
    train_eval_loader: Option<Arc<dyn DataLoader<VB>>>,
    settings:          &FitSettings,
    mut hooks:         FitHooks<'_>,
) -> Result<FitReport<M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + TrainStep<B, TB>,
    M::InnerModule: EvalStep<B::InnerBackend, VB>,
{
    let start = Instant::now();

    // ── Initial validation sets the bar ───────────────────────────────────────
    let initial = validate(
        &model.valid(),
        valid_loader.as_ref(),
        settings.visualize_freq,
        hooks.attention.as_deref_mut(),
    )?;
    tracing::info!(
        "Initial | Val Loss: {:.4} | Val Acc: {:.2}% | Val Ppl: {:.3}",
        initial.loss, initial.accuracy, initial.perplexity
    );

    let mut tracker    = BestTracker::new(initial);
    let mut best_model = model.clone();
    let mut optim      = settings.optimizer().init();

    let mut current          = model;
    let mut epochs_completed = 0usize;
    let mut stopped_early    = false;

    for epoch in 1..=settings.epochs {
        let outcome = train_epoch(current, &mut optim, train_loader.as_ref(), settings, hooks.stop, epoch)
            .and_then(|(trained, train_loss)| {
                let val = validate(
                    &trained.valid(),
                    valid_loader.as_ref(),
                    settings.visualize_freq,
                    hooks.attention.as_deref_mut(),
                )?;
                Ok((trained, train_loss, val))
            });

        let (trained, train_loss, val) = match outcome {
            Ok(out) => out,
            Err(err) => {
                report_abort(&err, epoch);
                stopped_early = true;
                break;
            }
        };

        if let Some(loader) = &train_eval_loader {
            match validate(&trained.valid(), loader.as_ref(), 0, None) {
                Ok(train) => tracing::info!(
                    "Epoch {:02} | Train Acc: {:.2}% | Train Loss: {:.3} | Train Ppl: {:.3}",
                    epoch, train.accuracy, train.loss, train.perplexity
                ),
                Err(err) => {
                    report_abort(&err, epoch);
                    stopped_early = true;
                    break;
                }
            }
        }

        tracing::info!(
            "Epoch {:02} | Val. Acc: {:.2}% | Val. Loss: {:.3} | Val. Ppl: {:.3}",
            epoch, val.accuracy, val.loss, val.perplexity
        );

        let saved = checkpoint_if_improved(&mut tracker, epoch, val, &trained, hooks.checkpoint)
            .and_then(|improved| {
                if let Some(metrics) = hooks.metrics {
                    metrics.log(&EpochMetrics::new(epoch, train_loss, &val))?;
                }
                Ok(improved)
            });

        match saved {
            Ok(true) => best_model = trained.clone(),
            Ok(false) => {}
            Err(err) => {
                report_abort(&err, epoch);
                stopped_early = true;
                break;
            }
        }

        epochs_completed = epoch;
        current = trained;
    }

    let best = tracker.best();
    tracing::info!(
        "Val Loss: {:.4} | Val Acc: {:.4} | Time: {:.4}",
        best.loss,
        best.accuracy,
        start.elapsed().as_secs_f64()
    );

    Ok(FitReport {
        model: best_model,
        best,
        best_epoch: tracker.epoch(),
        epochs_completed,
        stopped_early,
    })
}

fn report_abort(err: &anyhow::Error, epoch: usize) {
    if err.is::<Interrupted>() {
        tracing::warn!("{err}");
    } else {
        tracing::error!("Got unexpected failure during epoch {epoch}: {err:?}");
    }
    tracing::warn!("Stopped training after {} epochs...", epoch - 1);
}

/// Save `model` if `val` strictly beats the best accuracy so far.
/// Returns whether a checkpoint was written.
pub fn checkpoint_if_improved<B: Backend, M: Module<B>>(
    tracker: &mut BestTracker,
    epoch:   usize,
    val:     ValidationSummary,
    model:   &M,
    ckpt:    &CheckpointManager,
) -> Result<bool> {
    if !tracker.observe(epoch, val) {
        return Ok(false);
    }
    ckpt.save_model(model, &CheckpointMeta::new(epoch, &val))?;
    tracing::info!(
        "New best validation accuracy {:.2}% at epoch {}, checkpoint saved to '{}'",
        val.accuracy,
        epoch,
        ckpt.weights_path().display()
    );
    Ok(true)
}

// ─── One training epoch ───────────────────────────────────────────────────────
/// Returns the updated model and the mean reported loss over the epoch.
fn train_epoch<B, M, O, TB>(
    mut model: M,
    optim:     &mut O,
    loader:    &dyn DataLoader<TB>,
    settings:  &FitSettings,
    stop:      &StopFlag,
    epoch:     usize,
) -> Result<(M, f64)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + TrainStep<B, TB>,
    O: Optimizer<M, B>,
{
    let mut window       = RunningWindow::new();
    let mut window_start = Instant::now();
    let mut loss_sum     = 0.0f64;
    let mut batches      = 0usize;

    for (i, batch) in loader.iter().enumerate() {
        if stop.is_set() {
            return Err(Interrupted.into());
        }

        let out = model.train_step(batch);
        if !out.reported_loss.is_finite() {
            anyhow::bail!("non-finite training loss {} at batch {}", out.reported_loss, i + 1);
        }
        window.record(out.reported_loss, out.correct, out.count);
        loss_sum += out.reported_loss;
        batches  += 1;

        // Backward pass, global-norm clipping, Adam update
        let mut grads = GradientsParams::from_grads(out.loss.backward(), &model);
        if let Some(max_norm) = settings.grad_clip {
            clip_global_norm::<B, M>(&model, &mut grads, max_norm);
        }
        model = optim.step(settings.lr, model, grads);

        let done = i + 1;
        if done % settings.log_freq.max(1) == 0 {
            let stats    = window.take();
            let progress = done as f64 / settings.num_batches.max(1) as f64;
            let elapsed  = window_start.elapsed().as_secs_f64();
            match stats.accuracy {
                Some(acc) => tracing::info!(
                    "Epoch {} | Batch Progress: {:.4} | Training Loss: {:.4} | Training Acc: {:.4} | Time: {:.4}",
                    epoch, progress, stats.loss, acc, elapsed
                ),
                None => tracing::info!(
                    "Epoch {} | Batch Progress: {:.4} | Training Loss: {:.4} | Time: {:.4}",
                    epoch, progress, stats.loss, elapsed
                ),
            }
            window_start = Instant::now();
        }
    }

    let mean_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
    Ok((model, mean_loss))
}

// ─── Validation ───────────────────────────────────────────────────────────────
/// Evaluate `model` over `loader` without tracking gradients.
///
/// Every `visualize_freq`-th batch (when non-zero and a sink is given)
/// the first example's attention matrix is passed to `sink`.
pub fn validate<B, M, VB>(
    model:          &M,
    loader:         &dyn DataLoader<VB>,
    visualize_freq: usize,
    mut sink:       Option<&mut (dyn AttentionSink + '_)>,
) -> Result<ValidationSummary>
where
    B: Backend,
    M: EvalStep<B, VB>,
{
    let mut totals                            = EvalTotals::default();
    let mut posterior: Option<PosteriorTable> = None;

    for (i, batch) in loader.iter().enumerate() {
        let capture = visualize_freq > 0 && sink.is_some() && i % visualize_freq == 0;
        let out     = model.eval_step(batch, capture)?;

        totals.add(out.loss_sum, out.correct, out.count);

        if let Some(table) = &out.posterior {
            match posterior.as_mut() {
                Some(acc) => acc.merge(table),
                None      => posterior = Some(table.clone()),
            }
        }
        if let (Some(sample), Some(sink)) = (&out.attention, sink.as_deref_mut()) {
            sink.record(sample)?;
        }
    }

    if let Some(table) = posterior {
        tracing::info!("Posterior q(z | x, y) by label, row-normalised:\n{}", table.normalized());
    }

    Ok(totals.summary())
}
