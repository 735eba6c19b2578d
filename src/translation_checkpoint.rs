use crate::config::{
    ModelConfig, TrainingConfig, MODEL_CONFIG_FILE, MODEL_FILE, SRC_VOCAB_FILE, TRAINING_CONFIG_FILE,
    TRG_VOCAB_FILE,
};
use crate::error::{Result, Seq2SeqError};
use crate::translation_vocabulary::Vocabulary;
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use std::fs;
use std::path::{Path, PathBuf};

/// 重みファイルのパス（拡張子はレコーダーが付与）
fn model_file_path(dir: &Path) -> PathBuf {
    dir.join(MODEL_FILE).with_extension("bin")
}

pub fn checkpoint_exists(dir: &Path) -> bool {
    model_file_path(dir).exists()
}

/// モデルを保存
pub fn save_model<B: Backend, M: Module<B>>(model: &M, save_dir: &Path) -> Result<()> {
    fs::create_dir_all(save_dir)?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

    model
        .clone()
        .save_file(save_dir.join(MODEL_FILE), &recorder)
        .map_err(|e| Seq2SeqError::Recorder(format!("モデル保存エラー: {:?}", e)))?;

    tracing::debug!("モデルを保存: {}", save_dir.display());
    Ok(())
}

/// 同じ構成で作ったモデルに重みを読み込む
pub fn load_model<B: Backend, M: Module<B>>(model: M, load_dir: &Path, device: &B::Device) -> Result<M> {
    if !checkpoint_exists(load_dir) {
        return Err(Seq2SeqError::MissingCheckpoint(model_file_path(load_dir)));
    }

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

    let model = model
        .load_file(load_dir.join(MODEL_FILE), &recorder, device)
        .map_err(|e| Seq2SeqError::Recorder(format!("モデル読み込みエラー: {:?}", e)))?;

    tracing::info!(
        "モデルを読み込み（{}バックエンド）: {}",
        std::any::type_name::<B>(),
        load_dir.display()
    );
    Ok(model)
}

/// 設定と語彙を保存（推論時にモデルを同じ構成で再構築するため）
pub fn save_run_files(
    save_dir: &Path,
    model_config: &ModelConfig,
    training_config: &TrainingConfig,
    src_vocab: &Vocabulary,
    trg_vocab: &Vocabulary,
) -> anyhow::Result<()> {
    fs::create_dir_all(save_dir)?;

    model_config.save(save_dir.join(MODEL_CONFIG_FILE))?;
    training_config.save(save_dir.join(TRAINING_CONFIG_FILE))?;
    src_vocab.save(&save_dir.join(SRC_VOCAB_FILE))?;
    trg_vocab.save(&save_dir.join(TRG_VOCAB_FILE))?;

    tracing::info!("設定と語彙を保存: {}", save_dir.display());
    Ok(())
}

/// チェックポイントの設定
pub fn load_model_config(load_dir: &Path) -> Result<ModelConfig> {
    let path = load_dir.join(MODEL_CONFIG_FILE);
    if !path.exists() {
        return Err(Seq2SeqError::MissingCheckpoint(path));
    }
    ModelConfig::load(&path).map_err(|e| {
        Seq2SeqError::InvalidConfig(format!("{} を読み込めません: {:?}", path.display(), e))
    })
}

pub fn load_training_config(load_dir: &Path) -> Result<TrainingConfig> {
    let path = load_dir.join(TRAINING_CONFIG_FILE);
    if !path.exists() {
        return Err(Seq2SeqError::MissingCheckpoint(path));
    }
    TrainingConfig::load(&path).map_err(|e| {
        Seq2SeqError::InvalidConfig(format!("{} を読み込めません: {:?}", path.display(), e))
    })
}

/// チェックポイントの語彙 (ソース, ターゲット)
pub fn load_vocabularies(load_dir: &Path) -> anyhow::Result<(Vocabulary, Vocabulary)> {
    let src_vocab = Vocabulary::load(&load_dir.join(SRC_VOCAB_FILE))?;
    let trg_vocab = Vocabulary::load(&load_dir.join(TRG_VOCAB_FILE))?;
    Ok((src_vocab, trg_vocab))
}

/// 保存済みモデルの語彙サイズと現在の語彙が一致するか
pub fn check_vocab_sizes(config: &ModelConfig, src_vocab: &Vocabulary, trg_vocab: &Vocabulary) -> Result<()> {
    if config.src_vocab_size != src_vocab.len() {
        return Err(Seq2SeqError::VocabularyMismatch {
            side: "ソース",
            saved: config.src_vocab_size,
            current: src_vocab.len(),
        });
    }
    if config.trg_vocab_size != trg_vocab.len() {
        return Err(Seq2SeqError::VocabularyMismatch {
            side: "ターゲット",
            saved: config.trg_vocab_size,
            current: trg_vocab.len(),
        });
    }
    Ok(())
}
