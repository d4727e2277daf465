// ============================================================
// Layer 2 — LmUseCase
// ============================================================
// Orchestrates the language-model pipeline in order:
//
//   Step 1: Validate and save the config    (Layer 6 - infra)
//   Step 2: Load train / valid corpora      (Layer 4 - data)
//   Step 3: Build or load the vocabulary    (Layer 6 - infra)
//   Step 4: Encode into one token stream    (Layer 4 - data)
//   Step 5: Cut BPTT windows                (Layer 4 - data)
//   Step 6: Build the model, resume weights (Layer 5 - ml)
//   Step 7: Run the training loop           (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};

use crate::application::config::{DeviceKind, LmConfig, LmKind};
use crate::data::{
    batcher::{LmBatch, LmBatcher},
    dataset::LmDataset,
    loader::TextCorpusLoader,
    windows::{BpttWindower, LmWindow},
};
use crate::domain::traits::ExampleSource;
use crate::infra::{
    checkpoint::CheckpointManager,
    interrupt::StopFlag,
    metrics::MetricsLogger,
    vocab_store::{VocabStore, Vocabulary, EOS_ID},
};
use crate::ml::{
    lm::{LstmLmConfig, NnlmConfig},
    step::{EvalStep, TrainStep},
    trainer::{fit, FitHooks, FitReport},
};

pub struct LmUseCase {
    config: LmConfig,
}

/// Encoded windows for both splits
struct LmData {
    train:      Vec<LmWindow>,
    valid:      Vec<LmWindow>,
    vocab_size: usize,
}

impl LmUseCase {
    pub fn new(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Validate and save config ──────────────────────────────────
        cfg.validate()?;
        let ckpt = CheckpointManager::new(&cfg.save_file)?;
        ckpt.save_config(cfg)?;

        // ── Steps 2-5: Data ───────────────────────────────────────────────────
        let data = self.prepare_data(&ckpt)?;

        // ── Steps 6-7: Train on the chosen device ─────────────────────────────
        let stop = StopFlag::install_ctrlc()?;
        match cfg.device {
            DeviceKind::Gpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.run::<Autodiff<Wgpu>>(data, &ckpt, &stop, device)
            }
            DeviceKind::Cpu => {
                tracing::info!("Using NdArray CPU backend");
                self.run::<Autodiff<NdArray>>(data, &ckpt, &stop, NdArrayDevice::Cpu)
            }
        }
    }

    fn prepare_data(&self, ckpt: &CheckpointManager) -> Result<LmData> {
        let cfg = &self.config;

        tracing::info!("Loading corpora '{}' and '{}'", cfg.train_file, cfg.val_file);
        let train_lines = TextCorpusLoader::new(&cfg.train_file).load_all()?;
        let valid_lines = TextCorpusLoader::new(&cfg.val_file).load_all()?;

        let texts: Vec<&str> = train_lines.iter().map(String::as_str).collect();
        let vocab = VocabStore::new(ckpt.sibling("tokenizer.json")).load_or_build(&texts, cfg.vocab_size)?;
        tracing::info!("Vocabulary size: {}", vocab.size());

        let windower = BpttWindower::new(cfg.seq_len);
        let train    = windower.windows(&token_stream(&train_lines, &vocab)?);
        let valid    = windower.windows(&token_stream(&valid_lines, &vocab)?);
        tracing::info!("Windows: {} train, {} validation (seq_len {})", train.len(), valid.len(), cfg.seq_len);

        Ok(LmData { train, valid, vocab_size: vocab.size() })
    }

    fn run<B: AutodiffBackend>(
        &self,
        data:   LmData,
        ckpt:   &CheckpointManager,
        stop:   &StopFlag,
        device: B::Device,
    ) -> Result<()> {
        let cfg = &self.config;
        B::seed(cfg.seed);

        match cfg.model {
            LmKind::Nnlm => {
                let model = NnlmConfig::new(data.vocab_size, cfg.embed_dim, cfg.hidden_size)
                    .with_context(cfg.context)
                    .with_dropout(cfg.dropout)
                    .init::<B>(&device);
                self.train::<B, _>(model, data, ckpt, stop, &device)?;
            }
            LmKind::Lstm => {
                let model = LstmLmConfig::new(data.vocab_size, cfg.embed_dim, cfg.hidden_size)
                    .with_dropout(cfg.dropout)
                    .init::<B>(&device);
                self.train::<B, _>(model, data, ckpt, stop, &device)?;
            }
        }
        Ok(())
    }

    fn train<B, M>(
        &self,
        model:  M,
        data:   LmData,
        ckpt:   &CheckpointManager,
        stop:   &StopFlag,
        device: &B::Device,
    ) -> Result<FitReport<M>>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + TrainStep<B, LmBatch<B>>,
        M::InnerModule: EvalStep<B::InnerBackend, LmBatch<B::InnerBackend>>,
    {
        let cfg = &self.config;

        // Resume from an earlier run's best weights
        let model = ckpt.resume(model, device)?;
        tracing::info!("Model ready: {} parameters", model.num_params());

        let train_tokens = LmDataset::new(data.train.clone()).token_count();
        let num_batches  = data.train.len().div_ceil(cfg.batch_size);
        tracing::info!("Training on {} tokens in {} batches per epoch", train_tokens, num_batches);

        // Windows keep corpus order, so no shuffling
        let train_loader = DataLoaderBuilder::new(LmBatcher::<B>::new(device.clone()))
            .batch_size(cfg.batch_size)
            .build(LmDataset::new(data.train.clone()));
        let valid_loader = DataLoaderBuilder::new(LmBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(cfg.batch_size)
            .build(LmDataset::new(data.valid));
        let train_eval_loader = DataLoaderBuilder::new(LmBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(cfg.batch_size)
            .build(LmDataset::new(data.train));

        let metrics = MetricsLogger::new(ckpt.dir())?;
        let hooks   = FitHooks { checkpoint: ckpt, stop, metrics: Some(&metrics), attention: None };

        let report = fit::<B, _, _, _>(
            model,
            train_loader,
            valid_loader,
            Some(train_eval_loader),
            &cfg.fit_settings(num_batches),
            hooks,
        )?;
        tracing::info!(
            "Best validation perplexity {:.3} (epoch {}), {} epochs completed",
            report.best.perplexity, report.best_epoch, report.epochs_completed
        );
        Ok(report)
    }
}

/// Encode every line and terminate it with [EOS], concatenated into one stream.
pub fn token_stream(lines: &[String], vocab: &Vocabulary) -> Result<Vec<u32>> {
    let mut stream = Vec::new();
    for line in lines {
        stream.extend(vocab.encode(line)?);
        stream.push(EOS_ID);
    }
    Ok(stream)
}
