use crate::config::{ModelConfig, TrainingConfig};
use crate::error::Result as Seq2SeqResult;
use crate::gradients::clip_grad_norm;
use crate::metrics::{EpochReport, TrainingMetrics};
use crate::seq2seq::{ForwardOptions, FromModelConfig, Seq2Seq};
use crate::translation_checkpoint::{load_model, save_model};
use crate::translation_data::{TranslationBatch, TranslationData};
use anyhow::Result;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use std::path::Path;
use std::time::Instant;

/// パディング位置を除いたクロスエントロピー
///
/// logits: [N, vocab_size], targets: [N]。非パディングトークン数で平均する。
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    pad_id: usize,
) -> Tensor<B, 1> {
    let [n, _] = logits.dims();

    let log_probs = log_softmax(logits, 1);
    let target_log_probs = log_probs
        .gather(1, targets.clone().reshape([n, 1]))
        .reshape([n]);

    let mask = targets.not_equal_elem(pad_id as i64).float();
    let count = mask.clone().sum().clamp_min(1.0);

    (target_log_probs.neg() * mask).sum() / count
}

/// Seq2Seqの出力とターゲットから損失を計算（時刻0は除外）
///
/// output: [trg_len, batch, vocab_size], trg: [trg_len, batch]
pub fn sequence_loss<B: Backend>(
    output: Tensor<B, 3>,
    trg: Tensor<B, 2, Int>,
    pad_id: usize,
) -> Tensor<B, 1> {
    let [trg_len, batch_size, vocab_size] = output.dims();
    let rows = (trg_len - 1) * batch_size;

    let logits = output
        .slice([1..trg_len, 0..batch_size, 0..vocab_size])
        .reshape([rows, vocab_size]);
    let targets = trg.slice([1..trg_len, 0..batch_size]).reshape([rows]);

    masked_cross_entropy(logits, targets, pad_id)
}

/// 1エポック分の訓練。戻り値は更新後のモデルとバッチ平均損失
pub fn train_epoch<B, M, O>(
    model: M,
    optimizer: &mut O,
    batches: &[TranslationBatch],
    config: &TrainingConfig,
    trg_pad_id: usize,
    rng: &mut StdRng,
    device: &B::Device,
) -> Seq2SeqResult<(M, f64)>
where
    B: AutodiffBackend,
    M: Seq2Seq<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let options = ForwardOptions::training(config);
    let mut model = model;
    let mut total_loss = 0.0;

    for (i, batch) in batches.iter().enumerate() {
        let src = batch.src.to_tensor::<B>(device);
        let trg = batch.trg.to_tensor::<B>(device);

        // フォワードパス
        let output = model.forward(src, trg.clone(), &options, rng)?;
        let loss = sequence_loss(output, trg, trg_pad_id);
        let loss_value: f64 = loss.clone().into_scalar().elem();

        // バックプロパゲーション
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        let (clipped, grad_norm) = clip_grad_norm::<B, M>(&model, grads, config.clip);

        // パラメータ更新（勾配ノルムが有限でなければスキップ）
        match clipped {
            Some(grads) => model = optimizer.step(config.learning_rate, model, grads),
            None => tracing::warn!(
                "batch {}/{}: 勾配ノルムが有限ではないため更新をスキップ ({})",
                i + 1,
                batches.len(),
                grad_norm
            ),
        }

        tracing::trace!(
            "batch {}/{}: loss={:.4}, grad_norm={:.4}",
            i + 1,
            batches.len(),
            loss_value,
            grad_norm
        );
        total_loss += loss_value;
    }

    let avg_loss = if batches.is_empty() {
        f64::NAN
    } else {
        total_loss / batches.len() as f64
    };

    Ok((model, avg_loss))
}

/// Teacher Forcing・Dropoutなしでの平均損失（勾配は計算しない）
pub fn evaluate<B, M>(
    model: &M,
    batches: &[TranslationBatch],
    trg_pad_id: usize,
    rng: &mut StdRng,
    device: &B::Device,
) -> Seq2SeqResult<f64>
where
    B: Backend,
    M: Seq2Seq<B>,
{
    if batches.is_empty() {
        return Ok(f64::NAN);
    }

    let options = ForwardOptions::evaluation();
    let mut total_loss = 0.0;

    for batch in batches {
        let src = batch.src.to_tensor::<B>(device);
        let trg = batch.trg.to_tensor::<B>(device);

        let output = model.forward(src, trg.clone(), &options, rng)?;
        let loss: f64 = sequence_loss(output, trg, trg_pad_id).into_scalar().elem();
        total_loss += loss;
    }

    Ok(total_loss / batches.len() as f64)
}

/// 訓練ループ
///
/// 各エポックで訓練データをシャッフルして1周し、検証損失が過去最良を下回った
/// エポックだけ `save_dir` にモデルを保存する。
#[allow(clippy::too_many_arguments)]
pub fn fit<B, M>(
    model: M,
    train_data: &TranslationData,
    valid_data: &TranslationData,
    src_pad_id: usize,
    trg_pad_id: usize,
    config: &TrainingConfig,
    save_dir: &Path,
    rng: &mut StdRng,
    device: &B::Device,
) -> Result<(M, TrainingMetrics)>
where
    B: AutodiffBackend,
    M: Seq2Seq<B> + AutodiffModule<B>,
    M::InnerModule: Seq2Seq<B::InnerBackend>,
{
    config.validate()?;

    let mut optimizer = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .init::<B, M>();

    let valid_batches = valid_data.batches(config.batch_size, src_pad_id, trg_pad_id)?;

    let mut model = model;
    let mut metrics = TrainingMetrics::default();
    let mut best_valid_loss = f64::INFINITY;

    tracing::info!(
        "訓練開始: {}エポック, 訓練バッチ数 {}",
        config.epochs,
        train_data.len().div_ceil(config.batch_size)
    );

    for epoch in 1..=config.epochs {
        let start_time = Instant::now();

        let train_batches =
            train_data.shuffled_batches(config.batch_size, src_pad_id, trg_pad_id, rng)?;
        let (trained, train_loss) = train_epoch::<B, M, _>(
            model,
            &mut optimizer,
            &train_batches,
            config,
            trg_pad_id,
            rng,
            device,
        )?;
        model = trained;

        let valid_loss = evaluate::<B::InnerBackend, _>(
            &model.valid(),
            &valid_batches,
            trg_pad_id,
            rng,
            device,
        )?;

        // 検証損失が改善したときのみ保存
        let improved = valid_loss < best_valid_loss;
        if improved {
            best_valid_loss = valid_loss;
            save_model::<B, M>(&model, save_dir)?;
            tracing::info!("エポック {}: 検証損失が改善 ({:.4})、保存しました", epoch, valid_loss);
        }

        let report = EpochReport {
            epoch,
            elapsed: start_time.elapsed(),
            train_loss,
            valid_loss,
            improved,
        };
        report.print();
        metrics.record(&report);
    }

    Ok((model, metrics))
}

/// 保存済みのベストモデルで損失を計算
#[allow(clippy::too_many_arguments)]
pub fn evaluate_checkpoint<B, M>(
    model_config: &ModelConfig,
    load_dir: &Path,
    data: &TranslationData,
    batch_size: usize,
    src_pad_id: usize,
    trg_pad_id: usize,
    rng: &mut StdRng,
    device: &B::Device,
) -> Result<f64>
where
    B: Backend,
    M: Seq2Seq<B> + FromModelConfig<B> + Module<B>,
{
    let model = M::from_config(model_config, device, rng)?;
    let model = load_model::<B, M>(model, load_dir, device)?;

    let batches = data.batches(batch_size, src_pad_id, trg_pad_id)?;
    Ok(evaluate::<B, M>(&model, &batches, trg_pad_id, rng, device)?)
}
