// ============================================================
// Layer 2 — EntailUseCase
// ============================================================
// Orchestrates the entailment pipeline in order:
//
//   Step 1: Validate and save the config      (Layer 6 - infra)
//   Step 2: Load train / valid / test pairs   (Layer 4 - data)
//           no valid file → hold out 10% of train
//   Step 3: Build or load the vocabulary      (Layer 6 - infra)
//   Step 4: Encode pairs into id sequences    (Layer 4 - data)
//   Step 5: Build the model for --algo        (Layer 5 - ml)
//           attention | ensemble | vae
//   Step 6: Run the training loop             (Layer 5 - ml)
//   Step 7: Predict the test set, write files (Layer 5 + 6)
//
// Reference: Parikh et al. (2016), Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};
use std::path::{Path, PathBuf};

use crate::application::config::{Algo, DeviceKind, EntailConfig};
use crate::data::{
    batcher::{NliBatch, NliBatcher},
    dataset::{NliDataset, NliExample},
    loader::NliTsvLoader,
    splitter::split_train_val,
};
use crate::domain::{example::NliPair, traits::{AttentionSink, ExampleSource}};
use crate::infra::{
    checkpoint::{load_weights, CheckpointManager, WEIGHTS_EXTENSION},
    export::{AttentionCsvSink, PredictionWriter},
    interrupt::StopFlag,
    metrics::MetricsLogger,
    vocab_store::{VocabStore, Vocabulary},
};
use crate::ml::{
    attention::AttentionConfig,
    mixture::{LatentMixture, VaeConfig},
    predictor::{predict, Classify},
    step::{EvalStep, TrainStep},
    trainer::{fit, FitHooks},
};

/// Fraction kept for training when no validation file exists
const TRAIN_FRACTION: f64 = 0.9;
/// Directory --load-model names are resolved against
const TRAINED_MODELS_DIR: &str = "./trained_models";
/// Directory attention CSVs are written to
const IMG_DIR: &str = "img";

pub struct EntailUseCase {
    config: EntailConfig,
}

/// Encoded examples for all three splits
struct EntailData {
    train: Vec<NliExample>,
    valid: Vec<NliExample>,
    test:  Vec<NliExample>,
    vocab: Vocabulary,
}

impl EntailUseCase {
    pub fn new(config: EntailConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Validate and save config ──────────────────────────────────
        cfg.validate()?;
        let ckpt = CheckpointManager::new(&cfg.save_file)?;
        ckpt.save_config(cfg)?;

        // ── Steps 2-4: Data ───────────────────────────────────────────────────
        let data = self.prepare_data(&ckpt)?;

        // ── Steps 5-7: Train and predict on the chosen device ─────────────────
        let stop = StopFlag::install_ctrlc()?;
        match cfg.device {
            DeviceKind::Gpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.run::<Autodiff<Wgpu>>(&data, &ckpt, &stop, device)
            }
            DeviceKind::Cpu => {
                tracing::info!("Using NdArray CPU backend");
                self.run::<Autodiff<NdArray>>(&data, &ckpt, &stop, NdArrayDevice::Cpu)
            }
        }
    }

    fn prepare_data(&self, ckpt: &CheckpointManager) -> Result<EntailData> {
        let cfg = &self.config;

        let train_pairs = NliTsvLoader::new(&cfg.train_file).load_all()?;
        let (train_pairs, valid_pairs) = if Path::new(&cfg.val_file).exists() {
            (train_pairs, NliTsvLoader::new(&cfg.val_file).load_all()?)
        } else {
            tracing::warn!(
                "Validation file '{}' not found, holding out {:.0}% of the training data",
                cfg.val_file,
                (1.0 - TRAIN_FRACTION) * 100.0
            );
            split_train_val(train_pairs, TRAIN_FRACTION, cfg.seed)
        };
        let test_pairs = NliTsvLoader::new(&cfg.test_file).load_all()?;
        tracing::info!(
            "Split: {} train, {} validation, {} test",
            train_pairs.len(),
            valid_pairs.len(),
            test_pairs.len()
        );

        let texts: Vec<&str> = train_pairs
            .iter()
            .flat_map(|p| [p.premise.as_str(), p.hypothesis.as_str()])
            .collect();
        let vocab = VocabStore::new(ckpt.sibling("tokenizer.json")).load_or_build(&texts, cfg.vocab_size)?;
        tracing::info!("Vocabulary size: {}", vocab.size());

        Ok(EntailData {
            train: encode_pairs(&train_pairs, &vocab)?,
            valid: encode_pairs(&valid_pairs, &vocab)?,
            test:  encode_pairs(&test_pairs, &vocab)?,
            vocab,
        })
    }

    fn run<B: AutodiffBackend>(
        &self,
        data:   &EntailData,
        ckpt:   &CheckpointManager,
        stop:   &StopFlag,
        device: B::Device,
    ) -> Result<()> {
        let cfg = &self.config;
        B::seed(cfg.seed);

        let member = AttentionConfig::new(data.vocab.size(), cfg.embed_dim, cfg.hidden_size)
            .with_num_layers(cfg.num_layers)
            .with_dropout(cfg.dropout);

        match cfg.algo {
            Algo::Attention => {
                let mut model = member.with_intra_attn(cfg.intra_attn).init::<B>(&device);
                if !cfg.load_model.is_empty() {
                    let path = Path::new(TRAINED_MODELS_DIR).join(&cfg.load_model);
                    model = load_weights(model, &path, &device)?;
                }
                self.train_and_predict::<B, _>(model, data, ckpt, stop, &device)
            }
            Algo::Ensemble => {
                if !cfg.load_model.is_empty() {
                    check_ensemble_dir(Path::new(&cfg.load_model), cfg.num_models)?;
                }
                let members = ensemble_members(cfg.num_models)
                    .into_iter()
                    .map(|(intra, name)| {
                        let model = member.clone().with_intra_attn(intra).init::<B>(&device);
                        if cfg.load_model.is_empty() {
                            Ok(model)
                        } else {
                            load_weights(model, &Path::new(&cfg.load_model).join(name), &device)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.train_and_predict::<B, _>(LatentMixture::new(members), data, ckpt, stop, &device)
            }
            Algo::Vae => {
                let vae = VaeConfig {
                    member,
                    num_models: cfg.num_models,
                    kl_weight:  cfg.kl_weight,
                    estimator:  cfg.elbo,
                }
                .init::<B>(&device);
                self.train_and_predict::<B, _>(vae, data, ckpt, stop, &device)
            }
        }
    }

    fn train_and_predict<B, M>(
        &self,
        model:  M,
        data:   &EntailData,
        ckpt:   &CheckpointManager,
        stop:   &StopFlag,
        device: &B::Device,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + TrainStep<B, NliBatch<B>>,
        M::InnerModule: EvalStep<B::InnerBackend, NliBatch<B::InnerBackend>> + Classify<B::InnerBackend>,
    {
        let cfg = &self.config;

        // Resume from an earlier run's best weights
        let model = ckpt.resume(model, device)?;
        tracing::info!("{} model ready: {} parameters", cfg.algo, model.num_params());

        let num_batches  = data.train.len().div_ceil(cfg.batch_size);
        let train_loader = DataLoaderBuilder::new(NliBatcher::<B>::new(device.clone()))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .build(NliDataset::new(data.train.clone()));
        let valid_loader = DataLoaderBuilder::new(NliBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(cfg.batch_size)
            .build(NliDataset::new(data.valid.clone()));

        let settings     = cfg.fit_settings(num_batches);
        let metrics      = MetricsLogger::new(ckpt.dir())?;
        let mut csv_sink = if settings.visualize_freq > 0 {
            Some(AttentionCsvSink::new(attention_csv_path(&cfg.save_img), &data.vocab)?)
        } else {
            None
        };
        let hooks = FitHooks {
            checkpoint: ckpt,
            stop,
            metrics:   Some(&metrics),
            attention: csv_sink.as_mut().map(|s| s as &mut dyn AttentionSink),
        };

        let report = fit::<B, _, _, _>(model, train_loader, valid_loader, None, &settings, hooks)?;
        if report.stopped_early {
            tracing::warn!("Predicting with the best model from epoch {}", report.best_epoch);
        }

        // ── Step 7: Test-set predictions ──────────────────────────────────────
        let predictions = predict::<B::InnerBackend, _>(&report.model.valid(), &data.test, device)?;
        let writer      = PredictionWriter::new(".", cfg.pred_suffix.as_str());
        writer.write(&predictions.labels, predictions.accuracy)?;
        tracing::info!(
            "Wrote {} predictions to '{}'",
            predictions.labels.len(),
            writer.predictions_path().display()
        );
        Ok(())
    }
}

fn encode_pairs(pairs: &[NliPair], vocab: &Vocabulary) -> Result<Vec<NliExample>> {
    pairs
        .iter()
        .map(|p| {
            Ok(NliExample {
                premise:    vocab.encode(&p.premise)?,
                hypothesis: vocab.encode(&p.hypothesis)?,
                label:      p.label.index(),
            })
        })
        .collect()
}

/// Member layout of the ensemble: the first half plain attention,
/// the second half with intra-attention, with their weight file names.
fn ensemble_members(k: usize) -> Vec<(bool, String)> {
    let plain = k / 2;
    (0..k)
        .map(|i| {
            if i < plain {
                (false, format!("attn-smol-{i}"))
            } else {
                (true, format!("intra-attn-smol-{}", i - plain))
            }
        })
        .collect()
}

fn attention_csv_path(save_img: &str) -> PathBuf {
    Path::new(IMG_DIR).join(format!("{save_img}.csv"))
}

/// Reject an ensemble --load-model directory missing any member file.
fn check_ensemble_dir(dir: &Path, k: usize) -> Result<()> {
    for (_, name) in ensemble_members(k) {
        let weights = dir.join(name).with_extension(WEIGHTS_EXTENSION);
        if !weights.exists() {
            bail!("Ensemble member weights '{}' not found", weights.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Label;

    #[test]
    fn test_ensemble_layout_matches_weight_files() {
        let members = ensemble_members(4);
        assert_eq!(
            members,
            vec![
                (false, "attn-smol-0".to_string()),
                (false, "attn-smol-1".to_string()),
                (true, "intra-attn-smol-0".to_string()),
                (true, "intra-attn-smol-1".to_string()),
            ]
        );
        assert_eq!(ensemble_members(1), vec![(true, "intra-attn-smol-0".to_string())]);
    }

    #[test]
    fn test_ensemble_dir_must_hold_every_member() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_ensemble_dir(dir.path(), 2).is_err());

        std::fs::write(dir.path().join("attn-smol-0.mpk"), b"").unwrap();
        std::fs::write(dir.path().join("intra-attn-smol-0.mpk"), b"").unwrap();
        assert!(check_ensemble_dir(dir.path(), 2).is_ok());
    }

    #[test]
    fn test_encode_pairs_keeps_labels() {
        let dir   = tempfile::tempdir().unwrap();
        let pairs = vec![
            NliPair::new("a man sleeps", "a person rests", Label::Entailment),
            NliPair::new("a man sleeps", "nobody sleeps", Label::Contradiction),
        ];
        let texts: Vec<&str> = pairs.iter().flat_map(|p| [p.premise.as_str(), p.hypothesis.as_str()]).collect();
        let vocab = VocabStore::new(dir.path().join("vocab.json")).load_or_build(&texts, 100).unwrap();

        let encoded = encode_pairs(&pairs, &vocab).unwrap();
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded[0].premise.len(), 3);
        assert_eq!(encoded[0].label, 0);
        assert_eq!(encoded[1].label, 1);
        assert_eq!(encoded[0].premise, encoded[1].premise);
    }

    #[test]
    fn test_missing_validation_file_splits_train() {
        let dir   = tempfile::tempdir().unwrap();
        let train = dir.path().join("train.tsv");
        let test  = dir.path().join("test.tsv");
        let rows: String = (0..20)
            .map(|i| format!("neutral\tpremise number {i}\thypothesis {i}\n"))
            .collect();
        std::fs::write(&train, &rows).unwrap();
        std::fs::write(&test, "entailment\ta b\ta\n").unwrap();

        let cfg = EntailConfig {
            train_file: train.display().to_string(),
            val_file:   dir.path().join("missing.tsv").display().to_string(),
            test_file:  test.display().to_string(),
            save_file:  dir.path().join("attn.pt").display().to_string(),
            ..Default::default()
        };
        let ckpt = CheckpointManager::new(&cfg.save_file).unwrap();
        let data = EntailUseCase::new(cfg).prepare_data(&ckpt).unwrap();

        assert_eq!(data.train.len(), 18);
        assert_eq!(data.valid.len(), 2);
        assert_eq!(data.test.len(), 1);
        assert!(ckpt.sibling("tokenizer.json").exists());
    }
}
