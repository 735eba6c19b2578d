use crate::error::Seq2SeqError;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

// チェックポイントディレクトリ内のファイル名
pub const MODEL_FILE: &str = "model"; // BinFileRecorderが .bin を付与
pub const MODEL_CONFIG_FILE: &str = "model_config.json";
pub const TRAINING_CONFIG_FILE: &str = "training_config.json";
pub const SRC_VOCAB_FILE: &str = "src_vocab.json";
pub const TRG_VOCAB_FILE: &str = "trg_vocab.json";

// 推論設定
pub const MAX_DECODE_LEN: usize = 50; // 貪欲デコードの最大トークン数

/// モデルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// GRU Encoder + 文脈ベクトル再注入Decoder
    Gru,
    /// 多層LSTM Encoder/Decoder
    Lstm,
    /// 双方向GRU Encoder + Attention Decoder
    Attention,
}

impl ModelVariant {
    /// 各モデルの標準的なパラメータ初期化
    pub fn default_init(&self) -> ParamInit {
        match self {
            ModelVariant::Gru => ParamInit::Normal { std: 0.01 },
            ModelVariant::Lstm => ParamInit::Uniform { bound: 0.08 },
            ModelVariant::Attention => ParamInit::NormalZeroBias { std: 0.01 },
        }
    }
}

/// パラメータ初期化方式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamInit {
    /// 全パラメータを N(0, std) から
    Normal { std: f64 },
    /// 全パラメータを U(-bound, bound) から
    Uniform { bound: f64 },
    /// 重みは N(0, std)、バイアスは0
    NormalZeroBias { std: f64 },
}

/// モデル構造の設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    pub variant: ModelVariant,
    pub src_vocab_size: usize,
    pub trg_vocab_size: usize,
    #[config(default = 256)]
    pub enc_emb_dim: usize,
    #[config(default = 256)]
    pub dec_emb_dim: usize,
    #[config(default = 512)]
    pub enc_hidden_dim: usize,
    #[config(default = 512)]
    pub dec_hidden_dim: usize,
    /// LSTMの層数（GRU/Attentionでは無視され、常に1層）
    #[config(default = 2)]
    pub num_layers: usize,
    /// 未指定の場合はvariantごとの標準初期化
    pub init: Option<ParamInit>,
}

impl ModelConfig {
    pub fn param_init(&self) -> ParamInit {
        self.init.unwrap_or_else(|| self.variant.default_init())
    }

    /// 実際に構築される再帰層の数
    pub fn recurrent_layers(&self) -> usize {
        match self.variant {
            ModelVariant::Lstm => self.num_layers,
            ModelVariant::Gru | ModelVariant::Attention => 1,
        }
    }

    /// 構築前の整合性チェック
    pub fn validate(&self) -> crate::error::Result<()> {
        let dims = [
            ("src_vocab_size", self.src_vocab_size),
            ("trg_vocab_size", self.trg_vocab_size),
            ("enc_emb_dim", self.enc_emb_dim),
            ("dec_emb_dim", self.dec_emb_dim),
            ("enc_hidden_dim", self.enc_hidden_dim),
            ("dec_hidden_dim", self.dec_hidden_dim),
            ("num_layers", self.recurrent_layers()),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(Seq2SeqError::InvalidConfig(format!("{} は1以上が必要です", name)));
            }
        }

        // 文脈ベクトルをそのままDecoderの初期状態に使うため次元が一致する必要がある
        if self.variant != ModelVariant::Attention && self.enc_hidden_dim != self.dec_hidden_dim {
            return Err(Seq2SeqError::InvalidConfig(format!(
                "{:?}ではEncoderとDecoderの隠れ次元が一致する必要があります: {} != {}",
                self.variant, self.enc_hidden_dim, self.dec_hidden_dim
            )));
        }

        match self.param_init() {
            ParamInit::Normal { std } | ParamInit::NormalZeroBias { std } if !(std > 0.0) => {
                Err(Seq2SeqError::InvalidConfig(format!("std は正の値が必要です: {}", std)))
            }
            ParamInit::Uniform { bound } if !(bound > 0.0) => Err(Seq2SeqError::InvalidConfig(
                format!("bound は正の値が必要です: {}", bound),
            )),
            _ => Ok(()),
        }
    }
}

/// 訓練ハイパーパラメータ
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 10)]
    pub epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// 勾配ノルムのクリップ値
    #[config(default = 1.0)]
    pub clip: f64,
    #[config(default = 0.5)]
    pub teacher_forcing: f64,
    #[config(default = 0.5)]
    pub encoder_dropout: f64,
    #[config(default = 0.5)]
    pub decoder_dropout: f64,
    #[config(default = 1234)]
    pub seed: u64,
    /// 語彙に含める最小出現回数
    #[config(default = 2)]
    pub min_freq: usize,
    /// ソース文を逆順にする（LSTM論文の手法）
    #[config(default = false)]
    pub reverse_source: bool,
}

impl TrainingConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(Seq2SeqError::InvalidConfig(
                "epochs と batch_size は1以上が必要です".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) || !(self.clip > 0.0) {
            return Err(Seq2SeqError::InvalidConfig(format!(
                "learning_rate と clip は正の値が必要です: lr={}, clip={}",
                self.learning_rate, self.clip
            )));
        }
        if !(0.0..=1.0).contains(&self.teacher_forcing) {
            return Err(Seq2SeqError::InvalidConfig(format!(
                "teacher_forcing は [0, 1] の範囲が必要です: {}",
                self.teacher_forcing
            )));
        }
        for (name, rate) in [
            ("encoder_dropout", self.encoder_dropout),
            ("decoder_dropout", self.decoder_dropout),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(Seq2SeqError::InvalidConfig(format!(
                    "{} は [0, 1) の範囲が必要です: {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }
}
