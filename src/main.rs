#![recursion_limit = "256"]

use anyhow::{bail, Result};
use burn::backend::ndarray::NdArray;
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use clap::{Args, Parser, Subcommand};
use seq2seq_translate::config::{ModelConfig, ModelVariant, TrainingConfig};
use seq2seq_translate::metrics::{print_test_loss, save_metrics, Metadata};
use seq2seq_translate::random::seeded_rng;
use seq2seq_translate::seq2seq::{AttentionSeq2Seq, FromModelConfig, GruSeq2Seq, LstmSeq2Seq, Seq2Seq};
use seq2seq_translate::translation_checkpoint::{
    check_vocab_sizes, load_model_config, load_training_config, load_vocabularies, save_run_files,
};
use seq2seq_translate::translation_data::{DatasetSplits, TranslationData};
use seq2seq_translate::translation_inference::{run_translation_inference, BackendKind};
use seq2seq_translate::translation_training::{evaluate_checkpoint, fit};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// GRU / LSTM / Attention Seq2Seq翻訳モデル
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 訓練してベストモデルを保存
    Train(TrainArgs),
    /// 保存済みモデルの損失・Perplexityを計算
    Evaluate(EvaluateArgs),
    /// 保存済みモデルで翻訳
    Translate(TranslateArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// モデルの種類
    #[arg(long, value_enum, default_value = "attention")]
    variant: ModelVariant,

    /// train.tsv / valid.tsv / test.tsv を含むディレクトリ
    #[arg(long, default_value = "data/toy")]
    data: PathBuf,

    /// モデルを保存するディレクトリ
    #[arg(long, default_value = "models/seq2seq")]
    checkpoint: PathBuf,

    /// バックエンドの選択（ndarray, wgpu）
    #[arg(long, value_enum, default_value = "ndarray")]
    backend: BackendKind,

    /// 訓練設定のJSON（未指定の項目はデフォルト値）
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// 勾配ノルムのクリップ値
    #[arg(long)]
    clip: Option<f64>,

    #[arg(long)]
    teacher_forcing: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// 語彙に含める最小出現回数
    #[arg(long)]
    min_freq: Option<usize>,

    /// ソース文を逆順にする
    #[arg(long)]
    reverse_source: bool,

    #[arg(long)]
    emb_dim: Option<usize>,

    #[arg(long)]
    hidden_dim: Option<usize>,

    /// LSTMの層数（GRU/Attentionでは無視）
    #[arg(long)]
    num_layers: Option<usize>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// 保存済みモデルのディレクトリ
    #[arg(long, default_value = "models/seq2seq")]
    checkpoint: PathBuf,

    /// 評価データのTSV
    #[arg(long, default_value = "data/toy/test.tsv")]
    data: PathBuf,

    #[arg(long, value_enum, default_value = "ndarray")]
    backend: BackendKind,
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// 保存済みモデルのディレクトリ
    #[arg(long, default_value = "models/seq2seq")]
    checkpoint: PathBuf,

    #[arg(long, value_enum, default_value = "ndarray")]
    backend: BackendKind,

    /// 翻訳するテキスト
    #[arg(required = true)]
    texts: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seq2seq_translate=info".into()),
        )
        .init();

    let start_time = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => run_train(args)?,
        Command::Evaluate(args) => run_evaluate(args)?,
        Command::Translate(args) => {
            let translations = run_translation_inference(args.backend, &args.checkpoint, &args.texts)?;
            for (text, translation) in args.texts.iter().zip(translations) {
                println!("入力: {} → 翻訳: {}", text, translation);
            }
        }
    }

    let duration = start_time.elapsed();
    println!("\n実行時間: {:.2}秒", duration.as_secs_f64());

    Ok(())
}

/// 設定ファイル → コマンドライン引数の順で上書き
fn training_config(args: &TrainArgs) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::load(path)
            .map_err(|e| anyhow::anyhow!("{} を読み込めません: {:?}", path.display(), e))?,
        None => TrainingConfig::new(),
    };

    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(clip) = args.clip {
        config.clip = clip;
    }
    if let Some(teacher_forcing) = args.teacher_forcing {
        config.teacher_forcing = teacher_forcing;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(min_freq) = args.min_freq {
        config.min_freq = min_freq;
    }
    if args.reverse_source {
        config.reverse_source = true;
    }

    config.validate()?;
    Ok(config)
}

fn run_train(args: TrainArgs) -> Result<()> {
    println!("\n===== 訓練開始 =====");
    let training_config = training_config(&args)?;

    let splits = DatasetSplits::load(
        &args.data,
        training_config.min_freq,
        training_config.reverse_source,
    )?;
    if splits.train.is_empty() {
        bail!("訓練データが空です: {}", args.data.display());
    }
    if splits.valid.is_empty() {
        tracing::warn!("検証データが空のため、チェックポイントは保存されません");
    }

    let mut model_config = ModelConfig::new(
        args.variant,
        splits.src_vocab.len(),
        splits.trg_vocab.len(),
    );
    if let Some(emb_dim) = args.emb_dim {
        model_config.enc_emb_dim = emb_dim;
        model_config.dec_emb_dim = emb_dim;
    }
    if let Some(hidden_dim) = args.hidden_dim {
        model_config.enc_hidden_dim = hidden_dim;
        model_config.dec_hidden_dim = hidden_dim;
    }
    if let Some(num_layers) = args.num_layers {
        model_config.num_layers = num_layers;
    }
    model_config.validate()?;

    save_run_files(
        &args.checkpoint,
        &model_config,
        &training_config,
        &splits.src_vocab,
        &splits.trg_vocab,
    )?;

    match args.backend {
        BackendKind::Wgpu => train_variant::<Autodiff<Wgpu>>(
            &splits,
            &model_config,
            &training_config,
            &args.checkpoint,
            WgpuDevice::default(),
        ),
        BackendKind::Ndarray => train_variant::<Autodiff<NdArray>>(
            &splits,
            &model_config,
            &training_config,
            &args.checkpoint,
            Default::default(),
        ),
    }
}

fn train_variant<B: AutodiffBackend>(
    splits: &DatasetSplits,
    model_config: &ModelConfig,
    training_config: &TrainingConfig,
    save_dir: &Path,
    device: B::Device,
) -> Result<()> {
    match model_config.variant {
        ModelVariant::Gru => {
            train_model::<B, GruSeq2Seq<B>>(splits, model_config, training_config, save_dir, device)
        }
        ModelVariant::Lstm => {
            train_model::<B, LstmSeq2Seq<B>>(splits, model_config, training_config, save_dir, device)
        }
        ModelVariant::Attention => train_model::<B, AttentionSeq2Seq<B>>(
            splits,
            model_config,
            training_config,
            save_dir,
            device,
        ),
    }
}

fn train_model<B, M>(
    splits: &DatasetSplits,
    model_config: &ModelConfig,
    training_config: &TrainingConfig,
    save_dir: &Path,
    device: B::Device,
) -> Result<()>
where
    B: AutodiffBackend,
    M: Seq2Seq<B> + AutodiffModule<B> + FromModelConfig<B>,
    M::InnerModule: Seq2Seq<B::InnerBackend> + FromModelConfig<B::InnerBackend>,
{
    let mut rng = seeded_rng(training_config.seed);

    let model = M::from_config(model_config, &device, &mut rng)?;
    let num_params = model.num_params();
    tracing::info!("{:?}モデル: 訓練可能なパラメータ数 {}", model_config.variant, num_params);

    let (_, mut training_metrics) = fit::<B, M>(
        model,
        &splits.train,
        &splits.valid,
        splits.src_vocab.pad_id,
        splits.trg_vocab.pad_id,
        training_config,
        save_dir,
        &mut rng,
        &device,
    )?;
    println!("訓練完了！");

    // ベストモデルでテスト
    if training_metrics.best_epoch.is_some() {
        let test_loss = evaluate_checkpoint::<B::InnerBackend, M::InnerModule>(
            model_config,
            save_dir,
            &splits.test,
            training_config.batch_size,
            splits.src_vocab.pad_id,
            splits.trg_vocab.pad_id,
            &mut rng,
            &device,
        )?;
        print_test_loss(test_loss);
        training_metrics.test_loss = Some(test_loss);
    }

    save_metrics(
        save_dir,
        model_config,
        training_config,
        &training_metrics,
        &Metadata::now(num_params),
    )?;

    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    println!("\n===== 評価 =====");
    let model_config = load_model_config(&args.checkpoint)?;
    let training_config = load_training_config(&args.checkpoint)?;
    let (src_vocab, trg_vocab) = load_vocabularies(&args.checkpoint)?;
    check_vocab_sizes(&model_config, &src_vocab, &trg_vocab)?;

    let pairs = TranslationData::read_pairs(&args.data)?;
    let data = TranslationData::from_pairs(
        &pairs,
        &src_vocab,
        &trg_vocab,
        training_config.reverse_source,
    );
    println!("評価サンプル数: {}サンプル", data.len());

    let test_loss = match args.backend {
        BackendKind::Wgpu => evaluate_variant::<Wgpu>(
            &model_config,
            &training_config,
            &args.checkpoint,
            &data,
            (src_vocab.pad_id, trg_vocab.pad_id),
            WgpuDevice::default(),
        )?,
        BackendKind::Ndarray => evaluate_variant::<NdArray>(
            &model_config,
            &training_config,
            &args.checkpoint,
            &data,
            (src_vocab.pad_id, trg_vocab.pad_id),
            Default::default(),
        )?,
    };
    print_test_loss(test_loss);

    Ok(())
}

fn evaluate_variant<B: Backend>(
    model_config: &ModelConfig,
    training_config: &TrainingConfig,
    load_dir: &Path,
    data: &TranslationData,
    (src_pad_id, trg_pad_id): (usize, usize),
    device: B::Device,
) -> Result<f64> {
    let mut rng = seeded_rng(training_config.seed);
    let batch_size = training_config.batch_size;

    match model_config.variant {
        ModelVariant::Gru => evaluate_checkpoint::<B, GruSeq2Seq<B>>(
            model_config,
            load_dir,
            data,
            batch_size,
            src_pad_id,
            trg_pad_id,
            &mut rng,
            &device,
        ),
        ModelVariant::Lstm => evaluate_checkpoint::<B, LstmSeq2Seq<B>>(
            model_config,
            load_dir,
            data,
            batch_size,
            src_pad_id,
            trg_pad_id,
            &mut rng,
            &device,
        ),
        ModelVariant::Attention => evaluate_checkpoint::<B, AttentionSeq2Seq<B>>(
            model_config,
            load_dir,
            data,
            batch_size,
            src_pad_id,
            trg_pad_id,
            &mut rng,
            &device,
        ),
    }
}
