use crate::error::{Result as Seq2SeqResult, Seq2SeqError};
use crate::translation_vocabulary::Vocabulary;
use anyhow::{Context, Result};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::fs;
use std::path::Path;

/// 右詰めパディング済みのトークンバッチ（時間軸が先: [seq_len, batch]）
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBatch {
    ids: Vec<i64>,
    seq_len: usize,
    batch_size: usize,
}

impl TokenBatch {
    /// 可変長シーケンスをバッチ内の最大長までパディング
    pub fn from_sequences(sequences: &[Vec<usize>], pad_id: usize) -> Self {
        let batch_size = sequences.len();
        let seq_len = sequences.iter().map(Vec::len).max().unwrap_or(0);

        let mut ids = vec![pad_id as i64; seq_len * batch_size];
        for (b, sequence) in sequences.iter().enumerate() {
            for (t, &id) in sequence.iter().enumerate() {
                ids[t * batch_size + b] = id as i64;
            }
        }

        Self {
            ids,
            seq_len,
            batch_size,
        }
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 時刻t、バッチ内b番目のトークン
    pub fn get(&self, t: usize, b: usize) -> Option<usize> {
        if t < self.seq_len && b < self.batch_size {
            Some(self.ids[t * self.batch_size + b] as usize)
        } else {
            None
        }
    }

    /// Tensor [seq_len, batch] に変換
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        Tensor::<B, 2, Int>::from_data(
            TensorData::new(self.ids.clone(), [self.seq_len, self.batch_size]),
            device,
        )
    }
}

/// ソースとターゲットの組
#[derive(Debug, Clone)]
pub struct TranslationBatch {
    pub src: TokenBatch,
    pub trg: TokenBatch,
}

impl TranslationBatch {
    pub fn new(src: TokenBatch, trg: TokenBatch) -> Seq2SeqResult<Self> {
        if src.batch_size() != trg.batch_size() {
            return Err(Seq2SeqError::BatchShape(format!(
                "ソースとターゲットのバッチサイズが異なります: {} != {}",
                src.batch_size(),
                trg.batch_size()
            )));
        }
        if src.seq_len() == 0 || trg.seq_len() < 2 {
            return Err(Seq2SeqError::BatchShape(format!(
                "シーケンス長が不足しています（src: {}, trg: {}）",
                src.seq_len(),
                trg.seq_len()
            )));
        }
        Ok(Self { src, trg })
    }

    pub fn batch_size(&self) -> usize {
        self.src.batch_size()
    }
}

/// 対訳データ（各サンプルは <sos>/<eos> 付きのトークン列）
pub struct TranslationData {
    pub samples: Vec<(Vec<usize>, Vec<usize>)>,
}

impl TranslationData {
    /// TSV形式の対訳を読み込む
    /// 形式: ソース文[TAB]ターゲット文（空行と # で始まる行はスキップ）
    pub fn read_pairs(file_path: &Path) -> Result<Vec<(String, String)>> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("対訳データファイルが読み込めません: {}", file_path.display()))?;

        let mut pairs = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((source, target)) = line.split_once('\t') else {
                tracing::warn!(
                    "{}:{}: TAB区切りではない行をスキップ",
                    file_path.display(),
                    line_no + 1
                );
                continue;
            };

            let (source, target) = (source.trim(), target.trim());
            if source.is_empty() || target.is_empty() {
                tracing::warn!("{}:{}: 空の文をスキップ", file_path.display(), line_no + 1);
                continue;
            }

            pairs.push((source.to_string(), target.to_string()));
        }

        Ok(pairs)
    }

    /// 文のペアをトークン列に変換
    pub fn from_pairs(
        pairs: &[(String, String)],
        src_vocab: &Vocabulary,
        trg_vocab: &Vocabulary,
        reverse_source: bool,
    ) -> Self {
        let samples = pairs
            .iter()
            .map(|(source, target)| {
                (
                    src_vocab.encode_sequence(source, reverse_source),
                    trg_vocab.encode_sequence(target, false),
                )
            })
            .collect();

        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// バッチを生成（ソース・ターゲットそれぞれバッチ内の最大長でパディング）
    pub fn batches(
        &self,
        batch_size: usize,
        src_pad_id: usize,
        trg_pad_id: usize,
    ) -> Seq2SeqResult<Vec<TranslationBatch>> {
        let order: Vec<usize> = (0..self.samples.len()).collect();
        self.batches_in_order(&order, batch_size, src_pad_id, trg_pad_id)
    }

    /// エポックごとにシャッフルしたバッチ
    pub fn shuffled_batches(
        &self,
        batch_size: usize,
        src_pad_id: usize,
        trg_pad_id: usize,
        rng: &mut StdRng,
    ) -> Seq2SeqResult<Vec<TranslationBatch>> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        order.shuffle(rng);
        self.batches_in_order(&order, batch_size, src_pad_id, trg_pad_id)
    }

    fn batches_in_order(
        &self,
        order: &[usize],
        batch_size: usize,
        src_pad_id: usize,
        trg_pad_id: usize,
    ) -> Seq2SeqResult<Vec<TranslationBatch>> {
        if batch_size == 0 {
            return Err(Seq2SeqError::InvalidConfig(
                "batch_size は1以上が必要です".to_string(),
            ));
        }

        order
            .chunks(batch_size)
            .map(|chunk| {
                let sources: Vec<Vec<usize>> =
                    chunk.iter().map(|&i| self.samples[i].0.clone()).collect();
                let targets: Vec<Vec<usize>> =
                    chunk.iter().map(|&i| self.samples[i].1.clone()).collect();

                TranslationBatch::new(
                    TokenBatch::from_sequences(&sources, src_pad_id),
                    TokenBatch::from_sequences(&targets, trg_pad_id),
                )
            })
            .collect()
    }
}

/// 訓練・検証・テストの3分割
pub struct DatasetSplits {
    pub src_vocab: Vocabulary,
    pub trg_vocab: Vocabulary,
    pub train: TranslationData,
    pub valid: TranslationData,
    pub test: TranslationData,
}

impl DatasetSplits {
    /// `data_dir` の train.tsv / valid.tsv / test.tsv を読み込み、訓練データから語彙を構築
    pub fn load(data_dir: &Path, min_freq: usize, reverse_source: bool) -> Result<Self> {
        let train_pairs = TranslationData::read_pairs(&data_dir.join("train.tsv"))?;
        let valid_pairs = TranslationData::read_pairs(&data_dir.join("valid.tsv"))?;
        let test_pairs = TranslationData::read_pairs(&data_dir.join("test.tsv"))?;

        let src_vocab = Vocabulary::build(train_pairs.iter().map(|(s, _)| s.as_str()), min_freq);
        let trg_vocab = Vocabulary::build(train_pairs.iter().map(|(_, t)| t.as_str()), min_freq);

        Ok(Self::from_parts(
            src_vocab,
            trg_vocab,
            &train_pairs,
            &valid_pairs,
            &test_pairs,
            reverse_source,
        ))
    }

    /// 訓練データから作った語彙で各分割を変換
    fn from_parts(
        src_vocab: Vocabulary,
        trg_vocab: Vocabulary,
        train_pairs: &[(String, String)],
        valid_pairs: &[(String, String)],
        test_pairs: &[(String, String)],
        reverse_source: bool,
    ) -> Self {
        let train = TranslationData::from_pairs(train_pairs, &src_vocab, &trg_vocab, reverse_source);
        let valid = TranslationData::from_pairs(valid_pairs, &src_vocab, &trg_vocab, reverse_source);
        let test = TranslationData::from_pairs(test_pairs, &src_vocab, &trg_vocab, reverse_source);

        tracing::info!(
            "サンプル数: train={}, valid={}, test={} / 語彙: src={}, trg={}",
            train.len(),
            valid.len(),
            test.len(),
            src_vocab.len(),
            trg_vocab.len()
        );

        Self {
            src_vocab,
            trg_vocab,
            train,
            valid,
            test,
        }
    }
}
