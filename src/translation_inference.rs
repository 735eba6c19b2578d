use crate::config::{ModelConfig, ModelVariant, MAX_DECODE_LEN};
use crate::error::Result as Seq2SeqResult;
use crate::random::seeded_rng;
use crate::seq2seq::{AttentionSeq2Seq, FromModelConfig, GruSeq2Seq, LstmSeq2Seq, Seq2Seq};
use crate::translation_checkpoint::{
    check_vocab_sizes, load_model, load_model_config, load_training_config, load_vocabularies,
};
use crate::translation_data::TokenBatch;
use crate::translation_vocabulary::Vocabulary;
use anyhow::Result;
use burn::backend::ndarray::NdArray;
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use burn::prelude::*;
use std::path::Path;

/// 推論に使うバックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    Ndarray,
    Wgpu,
}

/// 1文を翻訳（ジェネリックBackend）
pub fn translate_sentence<B: Backend, M: Seq2Seq<B>>(
    model: &M,
    src_vocab: &Vocabulary,
    trg_vocab: &Vocabulary,
    input_text: &str,
    reverse_source: bool,
    max_len: usize,
    device: &B::Device,
) -> Seq2SeqResult<String> {
    // [<sos>, w1, ..., wN, <eos>] を [src_len, 1] に
    let tokens = src_vocab.encode_sequence(input_text, reverse_source);
    let src = TokenBatch::from_sequences(&[tokens], src_vocab.pad_id).to_tensor::<B>(device);

    let generated = model.greedy_decode(src, trg_vocab.sos_id, trg_vocab.eos_id, max_len)?;

    Ok(generated
        .first()
        .map(|ids| trg_vocab.decode(ids))
        .unwrap_or_default())
}

/// チェックポイントから読み込んだモデルと語彙
pub struct Translator<B: Backend, M: Seq2Seq<B>> {
    model: M,
    src_vocab: Vocabulary,
    trg_vocab: Vocabulary,
    reverse_source: bool,
    device: B::Device,
}

impl<B, M> Translator<B, M>
where
    B: Backend,
    M: Seq2Seq<B> + FromModelConfig<B> + Module<B>,
{
    /// 設定・語彙・重みを読み込む（語彙サイズが保存時と異なればエラー）
    pub fn load(load_dir: &Path, device: B::Device) -> Result<Self> {
        let model_config = load_model_config(load_dir)?;
        let training_config = load_training_config(load_dir)?;
        let (src_vocab, trg_vocab) = load_vocabularies(load_dir)?;
        check_vocab_sizes(&model_config, &src_vocab, &trg_vocab)?;

        // 初期値は load_model で上書きされる
        let mut rng = seeded_rng(training_config.seed);
        let model = M::from_config(&model_config, &device, &mut rng)?;
        let model = load_model::<B, M>(model, load_dir, &device)?;

        Ok(Self {
            model,
            src_vocab,
            trg_vocab,
            reverse_source: training_config.reverse_source,
            device,
        })
    }

    pub fn translate(&self, input_text: &str) -> Seq2SeqResult<String> {
        translate_sentence::<B, M>(
            &self.model,
            &self.src_vocab,
            &self.trg_vocab,
            input_text,
            self.reverse_source,
            MAX_DECODE_LEN,
            &self.device,
        )
    }
}

fn translate_with<B, M>(load_dir: &Path, device: B::Device, texts: &[String]) -> Result<Vec<String>>
where
    B: Backend,
    M: Seq2Seq<B> + FromModelConfig<B> + Module<B>,
{
    let translator = Translator::<B, M>::load(load_dir, device)?;
    texts
        .iter()
        .map(|text| translator.translate(text).map_err(anyhow::Error::from))
        .collect()
}

fn translate_variant<B: Backend>(
    config: &ModelConfig,
    load_dir: &Path,
    device: B::Device,
    texts: &[String],
) -> Result<Vec<String>> {
    match config.variant {
        ModelVariant::Gru => translate_with::<B, GruSeq2Seq<B>>(load_dir, device, texts),
        ModelVariant::Lstm => translate_with::<B, LstmSeq2Seq<B>>(load_dir, device, texts),
        ModelVariant::Attention => {
            translate_with::<B, AttentionSeq2Seq<B>>(load_dir, device, texts)
        }
    }
}

/// バックエンドとモデルの種類を選択して推論実行
pub fn run_translation_inference(
    backend: BackendKind,
    load_dir: &Path,
    texts: &[String],
) -> Result<Vec<String>> {
    let model_config = load_model_config(load_dir)?;
    tracing::info!("モデル: {:?}, バックエンド: {:?}", model_config.variant, backend);

    match backend {
        BackendKind::Wgpu => {
            translate_variant::<Wgpu>(&model_config, load_dir, WgpuDevice::default(), texts)
        }
        BackendKind::Ndarray => {
            translate_variant::<NdArray>(&model_config, load_dir, Default::default(), texts)
        }
    }
}
