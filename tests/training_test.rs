use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::nn::{Linear, LinearConfig};
use burn::optim::{AdamConfig, GradientsParams};
use burn::prelude::*;
use seq2seq_translate::config::{ModelConfig, ModelVariant, TrainingConfig};
use seq2seq_translate::gradients::{clip_grad_norm, gradient_norm};
use seq2seq_translate::random::seeded_rng;
use seq2seq_translate::seq2seq::{ForwardOptions, FromModelConfig, GruSeq2Seq, Seq2Seq};
use seq2seq_translate::translation_data::{TokenBatch, TranslationBatch};
use seq2seq_translate::translation_training::{
    evaluate, masked_cross_entropy, sequence_loss, train_epoch,
};

type TestBackend = NdArray;
type TrainingBackend = Autodiff<NdArray>;

const VOCAB_SIZE: usize = 10;
const PAD_ID: usize = 0;

fn small_config() -> ModelConfig {
    ModelConfig::new(ModelVariant::Gru, VOCAB_SIZE, VOCAB_SIZE)
        .with_enc_emb_dim(4)
        .with_dec_emb_dim(4)
        .with_enc_hidden_dim(8)
        .with_dec_hidden_dim(8)
}

/// パディングを含むバッチ（2文）
fn padded_batch() -> TranslationBatch {
    let src = TokenBatch::from_sequences(&[vec![2, 4, 5, 6, 3], vec![2, 7, 3]], PAD_ID);
    let trg = TokenBatch::from_sequences(&[vec![2, 5, 4, 3], vec![2, 8, 9, 6, 3]], PAD_ID);
    TranslationBatch::new(src, trg).expect("バッチ作成失敗")
}

fn float_tensor(values: Vec<f32>, shape: [usize; 2]) -> Tensor<TestBackend, 2> {
    Tensor::from_data(TensorData::new(values, shape), &Default::default())
}

fn int_tensor(values: Vec<i64>) -> Tensor<TestBackend, 1, Int> {
    let len = values.len();
    Tensor::from_data(TensorData::new(values, [len]), &Default::default())
}

#[test]
fn test_masked_cross_entropy_ignores_padding() {
    println!("=== テスト: パディングを除いた損失 ===");

    let logits = float_tensor(
        vec![
            0.1, 2.0, -1.0, 0.5, //
            3.0, 0.0, 1.0, -2.0, //
            -0.5, 0.2, 1.5, 0.0,
        ],
        [3, 4],
    );

    let with_pad: f32 = masked_cross_entropy(logits.clone(), int_tensor(vec![1, 0, 2]), PAD_ID)
        .into_scalar();

    // パディング行を除いた2行だけの損失と一致する
    let rows = Tensor::cat(
        vec![
            logits.clone().slice([0..1, 0..4]),
            logits.slice([2..3, 0..4]),
        ],
        0,
    );
    let without_pad: f32 = masked_cross_entropy(rows, int_tensor(vec![1, 2]), PAD_ID).into_scalar();

    assert!(
        (with_pad - without_pad).abs() < 1e-6,
        "パディングが損失に含まれています: {} != {}",
        with_pad,
        without_pad
    );

    println!("✓ 損失: {:.4}", with_pad);
}

#[test]
fn test_masked_cross_entropy_uniform_logits() {
    // 一様なスコアなら損失は ln(V)
    let logits = float_tensor(vec![0.0; 2 * VOCAB_SIZE], [2, VOCAB_SIZE]);
    let loss: f32 = masked_cross_entropy(logits, int_tensor(vec![4, 7]), PAD_ID).into_scalar();

    assert!((loss - (VOCAB_SIZE as f32).ln()).abs() < 1e-5);
}

#[test]
fn test_masked_cross_entropy_all_padding_is_zero() {
    let logits = float_tensor(vec![1.0; 2 * VOCAB_SIZE], [2, VOCAB_SIZE]);
    let loss: f32 = masked_cross_entropy(logits, int_tensor(vec![0, 0]), PAD_ID).into_scalar();

    assert!(loss.is_finite());
    assert_eq!(loss, 0.0);
}

/// 1バッチ分の勾配（クリップ前）
fn batch_gradients(
    model: &GruSeq2Seq<TrainingBackend>,
    rng: &mut rand::rngs::StdRng,
) -> GradientsParams {
    let device = Default::default();
    let batch = padded_batch();

    let output = model
        .forward(
            batch.src.to_tensor::<TrainingBackend>(&device),
            batch.trg.to_tensor::<TrainingBackend>(&device),
            &ForwardOptions::evaluation().with_teacher_forcing(1.0),
            rng,
        )
        .expect("フォワード失敗");
    let loss = sequence_loss(output, batch.trg.to_tensor::<TrainingBackend>(&device), PAD_ID);

    GradientsParams::from_grads(loss.backward(), model)
}

#[test]
fn test_clip_grad_norm_bounds_large_gradients() {
    println!("=== テスト: 勾配ノルムのクリッピング ===");

    let device = Default::default();
    let mut rng = seeded_rng(1234);
    let model = GruSeq2Seq::<TrainingBackend>::from_config(&small_config(), &device, &mut rng)
        .expect("モデル作成失敗");

    let grads = batch_gradients(&model, &mut rng);
    let norm = gradient_norm::<TrainingBackend, _>(&model, &grads);
    assert!(norm > 0.0, "勾配がゼロです");

    // ノルムの1/10にクリップ
    let max_norm = norm / 10.0;
    let (clipped, reported) = clip_grad_norm::<TrainingBackend, _>(&model, grads, max_norm);
    let clipped = clipped.expect("有限のノルムでクリップされませんでした");
    assert!((reported - norm).abs() < 1e-9, "戻り値はクリップ前のノルム");

    let clipped_norm = gradient_norm::<TrainingBackend, _>(&model, &clipped);
    assert!(
        clipped_norm <= max_norm * (1.0 + 1e-4),
        "クリップ後のノルムが上限を超えています: {} > {}",
        clipped_norm,
        max_norm
    );
    assert!((clipped_norm - max_norm).abs() / max_norm < 1e-3);

    println!("✓ ノルム {:.6} → {:.6}", norm, clipped_norm);
}

#[test]
fn test_clip_grad_norm_leaves_small_gradients() {
    let device = Default::default();
    let mut rng = seeded_rng(1234);
    let model = GruSeq2Seq::<TrainingBackend>::from_config(&small_config(), &device, &mut rng)
        .expect("モデル作成失敗");

    let grads = batch_gradients(&model, &mut rng);
    let norm = gradient_norm::<TrainingBackend, _>(&model, &grads);

    let (unchanged, _) = clip_grad_norm::<TrainingBackend, _>(&model, grads, norm * 10.0);
    let unchanged = unchanged.expect("有限のノルムでクリップされませんでした");
    let unchanged_norm = gradient_norm::<TrainingBackend, _>(&model, &unchanged);

    assert!(
        (unchanged_norm - norm).abs() / norm < 1e-6,
        "閾値以下の勾配が変更されました: {} != {}",
        unchanged_norm,
        norm
    );
}

/// 重みだけに同じ値の勾配を登録した2x2線形層
fn linear_with_constant_grad(value: f32) -> (Linear<TrainingBackend>, GradientsParams) {
    let device = Default::default();
    let linear = LinearConfig::new(2, 2).init::<TrainingBackend>(&device);

    let mut grads = GradientsParams::new();
    grads.register::<TestBackend, 2>(
        linear.weight.id,
        Tensor::full([2, 2], value, &device),
    );
    (linear, grads)
}

#[test]
fn test_clip_grad_norm_handles_huge_finite_gradients() {
    // 要素の二乗は f32 の範囲を超えるがノルム自体は有限
    let (linear, grads) = linear_with_constant_grad(1e30);

    let norm = gradient_norm::<TrainingBackend, _>(&linear, &grads);
    assert!(norm.is_finite(), "ノルムがオーバーフローしました: {}", norm);
    assert!((norm / 2e30 - 1.0).abs() < 1e-4, "ノルムが不正です: {}", norm);

    let (clipped, _) = clip_grad_norm::<TrainingBackend, _>(&linear, grads, 1.0);
    let clipped = clipped.expect("有限のノルムでクリップされませんでした");
    let clipped_norm = gradient_norm::<TrainingBackend, _>(&linear, &clipped);
    assert!((clipped_norm - 1.0).abs() < 1e-3, "クリップ後のノルム: {}", clipped_norm);
}

#[test]
fn test_clip_grad_norm_rejects_non_finite_gradients() {
    for value in [f32::INFINITY, f32::NAN] {
        let (linear, grads) = linear_with_constant_grad(value);

        let (clipped, norm) = clip_grad_norm::<TrainingBackend, _>(&linear, grads, 1.0);
        assert!(!norm.is_finite(), "ノルムが有限です: {}", norm);
        assert!(clipped.is_none(), "有限でない勾配が返されました（{}）", value);
    }
}

#[test]
fn test_training_reduces_loss_on_single_batch() {
    println!("=== テスト: 1バッチの過学習 ===");

    let device = Default::default();
    let mut rng = seeded_rng(1234);
    let model = GruSeq2Seq::<TrainingBackend>::from_config(&small_config(), &device, &mut rng)
        .expect("モデル作成失敗");

    let config = TrainingConfig::new()
        .with_learning_rate(0.03)
        .with_teacher_forcing(1.0)
        .with_encoder_dropout(0.0)
        .with_decoder_dropout(0.0);
    let mut optimizer = AdamConfig::new().init::<TrainingBackend, GruSeq2Seq<TrainingBackend>>();
    let batches = vec![padded_batch()];

    let mut model = model;
    let mut losses = Vec::new();
    for _ in 0..50 {
        let (trained, loss) = train_epoch::<TrainingBackend, _, _>(
            model,
            &mut optimizer,
            &batches,
            &config,
            PAD_ID,
            &mut rng,
            &device,
        )
        .expect("訓練失敗");
        model = trained;
        losses.push(loss);
    }

    let first = losses[0];
    let last = losses[losses.len() - 1];
    println!("損失: {:.4} → {:.4}", first, last);
    assert!(last < first * 0.75, "損失が十分に減少していません: {} → {}", first, last);

    // 評価は推論用バックエンドで実行できる
    let valid_loss = evaluate::<TestBackend, _>(&model.valid(), &batches, PAD_ID, &mut rng, &device)
        .expect("評価失敗");
    assert!(valid_loss.is_finite());

    println!("✓ 損失が減少");
}

#[test]
fn test_evaluate_without_batches_is_nan() {
    let device = Default::default();
    let mut rng = seeded_rng(1);
    let model = GruSeq2Seq::<TestBackend>::from_config(&small_config(), &device, &mut rng)
        .expect("モデル作成失敗");

    let loss = evaluate::<TestBackend, _>(&model, &[], PAD_ID, &mut rng, &device).expect("評価失敗");
    assert!(loss.is_nan());
}
