use burn::backend::ndarray::NdArray;
use burn::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use seq2seq_translate::config::{ModelConfig, ModelVariant, TrainingConfig};
use seq2seq_translate::error::Seq2SeqError;
use seq2seq_translate::random::seeded_rng;
use seq2seq_translate::seq2seq::{
    AttentionSeq2Seq, ForwardOptions, FromModelConfig, GruSeq2Seq, LstmSeq2Seq, Seq2Seq,
};
use seq2seq_translate::translation_checkpoint::{
    check_vocab_sizes, checkpoint_exists, load_model, load_model_config, load_vocabularies,
    save_model, save_run_files,
};
use seq2seq_translate::translation_inference::Translator;
use seq2seq_translate::translation_vocabulary::Vocabulary;

type TestBackend = NdArray;

/// テスト用の一時ディレクトリを作成（テストごとに別のディレクトリ）
fn create_test_dir(name: &str) -> PathBuf {
    let test_dir = PathBuf::from("tests").join(name);
    if test_dir.exists() {
        fs::remove_dir_all(&test_dir).ok();
    }
    fs::create_dir_all(&test_dir).unwrap();
    test_dir
}

/// テスト用の一時ディレクトリを削除
fn cleanup_test_dir(test_dir: &Path) {
    if test_dir.exists() {
        fs::remove_dir_all(test_dir).ok();
    }
}

/// テンソル間の最大誤差
fn max_abs_diff<B: Backend>(a: &Tensor<B, 3>, b: &Tensor<B, 3>) -> f32 {
    let diff = (a.clone() - b.clone()).abs();
    diff.to_data()
        .iter::<f32>()
        .fold(0.0_f32, f32::max)
}

fn small_config(variant: ModelVariant, src_vocab: usize, trg_vocab: usize) -> ModelConfig {
    ModelConfig::new(variant, src_vocab, trg_vocab)
        .with_enc_emb_dim(4)
        .with_dec_emb_dim(4)
        .with_enc_hidden_dim(8)
        .with_dec_hidden_dim(8)
}

fn toy_batch() -> (Tensor<TestBackend, 2, Int>, Tensor<TestBackend, 2, Int>) {
    let device = Default::default();
    let src = Tensor::from_data(
        TensorData::new(vec![2i64, 2, 4, 5, 6, 7, 3, 3], [4, 2]),
        &device,
    );
    let trg = Tensor::from_data(
        TensorData::new(vec![2i64, 2, 5, 4, 7, 6, 3, 3], [4, 2]),
        &device,
    );
    (src, trg)
}

/// 保存 → 別のシードで作ったモデルに読み込み → 出力が一致
fn assert_roundtrip<M>(variant: ModelVariant, dir_name: &str)
where
    M: Seq2Seq<TestBackend> + FromModelConfig<TestBackend> + Module<TestBackend>,
{
    let device = Default::default();
    let test_dir = create_test_dir(dir_name);
    let config = small_config(variant, 10, 10);

    let mut rng = seeded_rng(1);
    let model = M::from_config(&config, &device, &mut rng).expect("モデル作成失敗");

    let (src, trg) = toy_batch();
    let options = ForwardOptions::evaluation();

    // 保存前の出力
    let output_before = model
        .forward(src.clone(), trg.clone(), &options, &mut seeded_rng(0))
        .expect("フォワード失敗");

    // モデル保存
    save_model(&model, &test_dir).expect("モデル保存失敗");
    assert!(checkpoint_exists(&test_dir));

    // 異なる初期値のモデルに読み込み
    let fresh = M::from_config(&config, &device, &mut seeded_rng(99)).expect("モデル作成失敗");
    let output_fresh = fresh
        .forward(src.clone(), trg.clone(), &options, &mut seeded_rng(0))
        .expect("フォワード失敗");
    assert!(
        max_abs_diff(&output_before, &output_fresh) > 1e-6,
        "読み込み前から出力が一致しています"
    );

    let loaded = load_model(fresh, &test_dir, &device).expect("モデル読み込み失敗");
    let output_after = loaded
        .forward(src, trg, &options, &mut seeded_rng(0))
        .expect("フォワード失敗");

    let diff = max_abs_diff(&output_before, &output_after);
    assert!(diff < 1e-5, "保存前後の出力が一致しません（最大誤差: {}）", diff);

    cleanup_test_dir(&test_dir);
}

#[test]
fn test_checkpoint_roundtrip_gru() {
    println!("=== テスト: モデル保存/読み込み（GRU） ===");
    assert_roundtrip::<GruSeq2Seq<TestBackend>>(ModelVariant::Gru, "temp_checkpoint_gru");
    println!("✓ 保存前後の出力が一致しました");
}

#[test]
fn test_checkpoint_roundtrip_lstm() {
    println!("=== テスト: モデル保存/読み込み（LSTM） ===");
    assert_roundtrip::<LstmSeq2Seq<TestBackend>>(ModelVariant::Lstm, "temp_checkpoint_lstm");
    println!("✓ 保存前後の出力が一致しました");
}

#[test]
fn test_checkpoint_roundtrip_attention() {
    println!("=== テスト: モデル保存/読み込み（Attention） ===");
    assert_roundtrip::<AttentionSeq2Seq<TestBackend>>(
        ModelVariant::Attention,
        "temp_checkpoint_attention",
    );
    println!("✓ 保存前後の出力が一致しました");
}

#[test]
fn test_missing_checkpoint() {
    let device = Default::default();
    let test_dir = create_test_dir("temp_checkpoint_missing");

    let model = GruSeq2Seq::<TestBackend>::from_config(
        &small_config(ModelVariant::Gru, 10, 10),
        &device,
        &mut seeded_rng(1),
    )
    .expect("モデル作成失敗");

    let result = load_model(model, &test_dir, &device);
    assert!(matches!(result, Err(Seq2SeqError::MissingCheckpoint(_))));

    let result = load_model_config(&test_dir);
    assert!(matches!(result, Err(Seq2SeqError::MissingCheckpoint(_))));

    cleanup_test_dir(&test_dir);
}

#[test]
fn test_vocabulary_size_mismatch() {
    let src_vocab = Vocabulary::build(["ein mann", "eine frau"], 1);
    let trg_vocab = Vocabulary::build(["a man", "a woman"], 1);

    let config = small_config(ModelVariant::Gru, src_vocab.len(), trg_vocab.len());
    assert!(check_vocab_sizes(&config, &src_vocab, &trg_vocab).is_ok());

    let config = small_config(ModelVariant::Gru, src_vocab.len(), trg_vocab.len() + 1);
    let result = check_vocab_sizes(&config, &src_vocab, &trg_vocab);
    match result {
        Err(Seq2SeqError::VocabularyMismatch { saved, current, .. }) => {
            assert_eq!(saved, trg_vocab.len() + 1);
            assert_eq!(current, trg_vocab.len());
        }
        other => panic!("VocabularyMismatch が返されませんでした: {:?}", other),
    }
}

#[test]
fn test_run_files_and_translator() {
    println!("=== テスト: 設定・語彙の保存と推論 ===");

    let device: <TestBackend as Backend>::Device = Default::default();
    let test_dir = create_test_dir("temp_checkpoint_translator");

    let src_vocab = Vocabulary::build(["ein mann läuft .", "eine frau läuft ."], 1);
    let trg_vocab = Vocabulary::build(["a man runs .", "a woman runs ."], 1);
    let model_config = small_config(ModelVariant::Attention, src_vocab.len(), trg_vocab.len());
    let training_config = TrainingConfig::new().with_reverse_source(true);

    save_run_files(&test_dir, &model_config, &training_config, &src_vocab, &trg_vocab)
        .expect("設定保存失敗");

    let loaded_config = load_model_config(&test_dir).expect("設定読み込み失敗");
    assert_eq!(loaded_config.variant, ModelVariant::Attention);
    assert_eq!(loaded_config.src_vocab_size, src_vocab.len());

    let (loaded_src, loaded_trg) = load_vocabularies(&test_dir).expect("語彙読み込み失敗");
    assert_eq!(loaded_src.len(), src_vocab.len());
    assert_eq!(loaded_trg.token_to_id("woman"), trg_vocab.token_to_id("woman"));

    // 重みがないと推論器は作れない
    let result = Translator::<TestBackend, AttentionSeq2Seq<TestBackend>>::load(&test_dir, device);
    assert!(result.is_err());

    let model = AttentionSeq2Seq::<TestBackend>::from_config(&model_config, &device, &mut seeded_rng(5))
        .expect("モデル作成失敗");
    save_model(&model, &test_dir).expect("モデル保存失敗");

    let translator = Translator::<TestBackend, AttentionSeq2Seq<TestBackend>>::load(&test_dir, device)
        .expect("推論器の読み込み失敗");
    let translation = translator.translate("ein mann läuft .").expect("翻訳失敗");
    println!("翻訳: {}", translation);

    // 特殊トークンは出力に含まれない
    assert!(!translation.contains("<sos>"));
    assert!(!translation.contains("<eos>"));

    cleanup_test_dir(&test_dir);
    println!("✓ 保存した設定と語彙で推論できました");
}
