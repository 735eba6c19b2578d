use crate::config::{ModelConfig, ModelVariant, TrainingConfig};
use crate::decoder::{AttentionDecoder, ContextDecoder, LstmDecoder};
use crate::encoder::{BiGruEncoder, GruEncoder, LstmEncoder};
use crate::error::{Result, Seq2SeqError};
use crate::init::ParamInitializer;
use crate::random::{coin_flip, seeded_rng};
use burn::prelude::*;
use rand::rngs::StdRng;

// ===== 共通インターフェース =====

/// ソースバッチ [src_len, batch] から、Decoderが参照する記憶を作る
pub trait Encoder<B: Backend> {
    type Memory: Clone;

    fn encode(&self, src: Tensor<B, 2, Int>, dropout_rate: f64, rng: &mut StdRng) -> Self::Memory;
}

/// 前のトークン・状態・Encoderの記憶から、次トークンのスコアと新しい状態を返す
pub trait Decoder<B: Backend> {
    type Memory;
    type State;

    fn initial_state(&self, memory: &Self::Memory) -> Self::State;

    /// input: [batch] → (logits [batch, vocab_size], 新しい状態)
    fn step(
        &self,
        input: Tensor<B, 1, Int>,
        state: Self::State,
        memory: &Self::Memory,
        dropout_rate: f64,
        rng: &mut StdRng,
    ) -> (Tensor<B, 2>, Self::State);

    fn vocab_size(&self) -> usize;
}

/// 1回のフォワードパスの確率的な設定
///
/// モデル自体は訓練/評価モードを持たず、呼び出しごとにこの値を渡す。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwardOptions {
    /// 各ステップで正解トークンを次の入力にする確率
    pub teacher_forcing: f64,
    pub encoder_dropout: f64,
    pub decoder_dropout: f64,
}

impl ForwardOptions {
    pub fn training(config: &TrainingConfig) -> Self {
        Self {
            teacher_forcing: config.teacher_forcing,
            encoder_dropout: config.encoder_dropout,
            decoder_dropout: config.decoder_dropout,
        }
    }

    /// Dropoutなし、Teacher Forcingなし（貪欲デコード）
    pub fn evaluation() -> Self {
        Self {
            teacher_forcing: 0.0,
            encoder_dropout: 0.0,
            decoder_dropout: 0.0,
        }
    }

    pub fn with_teacher_forcing(mut self, teacher_forcing: f64) -> Self {
        self.teacher_forcing = teacher_forcing;
        self
    }
}

/// フォワードパスの結果
#[derive(Debug, Clone)]
pub struct Seq2SeqOutput<B: Backend> {
    /// [trg_len, batch, vocab_size]。時刻0は常にゼロ
    pub logits: Tensor<B, 3>,
    /// [trg_len - 1, batch]。inputs[i] は logits[i + 1] を出したステップへの入力
    pub inputs: Tensor<B, 2, Int>,
}

fn check_batch_shapes(src_dims: [usize; 2], trg_dims: [usize; 2]) -> Result<()> {
    let [src_len, src_batch] = src_dims;
    let [trg_len, trg_batch] = trg_dims;

    if src_batch != trg_batch {
        return Err(Seq2SeqError::BatchShape(format!(
            "ソースとターゲットのバッチサイズが異なります: {} != {}",
            src_batch, trg_batch
        )));
    }
    if src_batch == 0 || src_len == 0 {
        return Err(Seq2SeqError::BatchShape(format!(
            "空のソースバッチです: [{}, {}]",
            src_len, src_batch
        )));
    }
    if trg_len < 2 {
        return Err(Seq2SeqError::BatchShape(format!(
            "ターゲットには <sos> と少なくとも1トークンが必要です（長さ {}）",
            trg_len
        )));
    }
    Ok(())
}

/// Encoder + Decoder のオーケストレーション（モデルの種類に依存しない）
pub trait Seq2Seq<B: Backend> {
    type Encoder: Encoder<B>;
    type Decoder: Decoder<B, Memory = <Self::Encoder as Encoder<B>>::Memory>;

    fn encoder(&self) -> &Self::Encoder;
    fn decoder(&self) -> &Self::Decoder;

    /// Teacher Forcing付きのフォワードパス
    ///
    /// src: [src_len, batch], trg: [trg_len, batch]（trg[0] は <sos>）
    fn forward(
        &self,
        src: Tensor<B, 2, Int>,
        trg: Tensor<B, 2, Int>,
        options: &ForwardOptions,
        rng: &mut StdRng,
    ) -> Result<Tensor<B, 3>> {
        self.forward_traced(src, trg, options, rng)
            .map(|output| output.logits)
    }

    /// フォワードパス（各ステップの入力トークンも返す）
    fn forward_traced(
        &self,
        src: Tensor<B, 2, Int>,
        trg: Tensor<B, 2, Int>,
        options: &ForwardOptions,
        rng: &mut StdRng,
    ) -> Result<Seq2SeqOutput<B>> {
        check_batch_shapes(src.dims(), trg.dims())?;

        let [trg_len, batch_size] = trg.dims();
        let vocab_size = self.decoder().vocab_size();
        let device = trg.device();

        // Encoderは1回だけ実行し、同じ記憶を全ステップで参照する
        let memory = self.encoder().encode(src, options.encoder_dropout, rng);
        let mut state = self.decoder().initial_state(&memory);

        // 最初の入力は <sos>
        let mut input = trg.clone().slice([0..1, 0..batch_size]).reshape([batch_size]);

        let mut outputs = Vec::with_capacity(trg_len);
        let mut inputs = Vec::with_capacity(trg_len - 1);
        outputs.push(Tensor::<B, 2>::zeros([batch_size, vocab_size], &device));

        for t in 1..trg_len {
            inputs.push(input.clone());

            let (logits, next_state) =
                self.decoder()
                    .step(input, state, &memory, options.decoder_dropout, rng);
            state = next_state;

            // バッチ全体で1回だけコインを投げる
            let teacher_force = coin_flip(rng, options.teacher_forcing);
            let top1 = logits.clone().argmax(1).reshape([batch_size]);
            outputs.push(logits);

            input = if teacher_force {
                trg.clone().slice([t..t + 1, 0..batch_size]).reshape([batch_size])
            } else {
                top1
            };
        }

        Ok(Seq2SeqOutput {
            logits: Tensor::stack(outputs, 0),
            inputs: Tensor::stack(inputs, 0),
        })
    }

    /// ターゲットなしの貪欲デコード（推論用）
    ///
    /// 全ての例が <eos> を出すか `max_len` に達したら終了。戻り値に <eos> は含まない。
    fn greedy_decode(
        &self,
        src: Tensor<B, 2, Int>,
        sos_id: usize,
        eos_id: usize,
        max_len: usize,
    ) -> Result<Vec<Vec<usize>>> {
        let [src_len, batch_size] = src.dims();
        if src_len == 0 || batch_size == 0 {
            return Err(Seq2SeqError::BatchShape(format!(
                "空のソースバッチです: [{}, {}]",
                src_len, batch_size
            )));
        }
        let device = src.device();
        // Dropout率0では乱数を引かない
        let mut rng = seeded_rng(0);

        let memory = self.encoder().encode(src, 0.0, &mut rng);
        let mut state = self.decoder().initial_state(&memory);
        let mut input = Tensor::<B, 1, Int>::from_data(
            TensorData::new(vec![sos_id as i64; batch_size], [batch_size]),
            &device,
        );

        let mut generated: Vec<Vec<usize>> = vec![Vec::new(); batch_size];
        let mut finished = vec![false; batch_size];

        for _ in 0..max_len {
            let (logits, next_state) = self.decoder().step(input, state, &memory, 0.0, &mut rng);
            state = next_state;

            let predicted = logits.argmax(1).reshape([batch_size]);
            let predicted_ids: Vec<i64> = predicted.to_data().iter::<i64>().collect();

            for (i, &id) in predicted_ids.iter().enumerate() {
                if finished[i] {
                    continue;
                }
                if id as usize == eos_id {
                    finished[i] = true;
                } else {
                    generated[i].push(id as usize);
                }
            }

            if finished.iter().all(|&done| done) {
                break;
            }
            input = predicted;
        }

        Ok(generated)
    }
}

/// 設定と乱数生成器からモデルを構築する
pub trait FromModelConfig<B: Backend>: Sized {
    fn from_config(config: &ModelConfig, device: &B::Device, rng: &mut StdRng) -> Result<Self>;
}

fn check_variant(config: &ModelConfig, expected: ModelVariant) -> Result<()> {
    config.validate()?;
    if config.variant != expected {
        return Err(Seq2SeqError::InvalidConfig(format!(
            "{:?}モデルに{:?}の設定が渡されました",
            expected, config.variant
        )));
    }
    Ok(())
}

// ===== GRU Seq2Seq =====

#[derive(Module, Debug)]
pub struct GruSeq2Seq<B: Backend> {
    encoder: GruEncoder<B>,
    decoder: ContextDecoder<B>,
}

impl<B: Backend> Seq2Seq<B> for GruSeq2Seq<B> {
    type Encoder = GruEncoder<B>;
    type Decoder = ContextDecoder<B>;

    fn encoder(&self) -> &Self::Encoder {
        &self.encoder
    }

    fn decoder(&self) -> &Self::Decoder {
        &self.decoder
    }
}

impl<B: Backend> FromModelConfig<B> for GruSeq2Seq<B> {
    fn from_config(config: &ModelConfig, device: &B::Device, rng: &mut StdRng) -> Result<Self> {
        check_variant(config, ModelVariant::Gru)?;
        let mut init = ParamInitializer::new(config.param_init(), rng)?;

        let encoder = GruEncoder::new(
            config.src_vocab_size,
            config.enc_emb_dim,
            config.enc_hidden_dim,
            &mut init,
            device,
        );
        let decoder = ContextDecoder::new(
            config.trg_vocab_size,
            config.dec_emb_dim,
            config.dec_hidden_dim,
            &mut init,
            device,
        );

        Ok(Self { encoder, decoder })
    }
}

// ===== LSTM Seq2Seq =====

#[derive(Module, Debug)]
pub struct LstmSeq2Seq<B: Backend> {
    encoder: LstmEncoder<B>,
    decoder: LstmDecoder<B>,
}

impl<B: Backend> Seq2Seq<B> for LstmSeq2Seq<B> {
    type Encoder = LstmEncoder<B>;
    type Decoder = LstmDecoder<B>;

    fn encoder(&self) -> &Self::Encoder {
        &self.encoder
    }

    fn decoder(&self) -> &Self::Decoder {
        &self.decoder
    }
}

impl<B: Backend> FromModelConfig<B> for LstmSeq2Seq<B> {
    fn from_config(config: &ModelConfig, device: &B::Device, rng: &mut StdRng) -> Result<Self> {
        check_variant(config, ModelVariant::Lstm)?;
        let mut init = ParamInitializer::new(config.param_init(), rng)?;

        let encoder = LstmEncoder::new(
            config.src_vocab_size,
            config.enc_emb_dim,
            config.enc_hidden_dim,
            config.recurrent_layers(),
            &mut init,
            device,
        );
        let decoder = LstmDecoder::new(
            config.trg_vocab_size,
            config.dec_emb_dim,
            config.dec_hidden_dim,
            config.recurrent_layers(),
            &mut init,
            device,
        );

        Ok(Self { encoder, decoder })
    }
}

// ===== Attention Seq2Seq =====

#[derive(Module, Debug)]
pub struct AttentionSeq2Seq<B: Backend> {
    encoder: BiGruEncoder<B>,
    decoder: AttentionDecoder<B>,
}

impl<B: Backend> Seq2Seq<B> for AttentionSeq2Seq<B> {
    type Encoder = BiGruEncoder<B>;
    type Decoder = AttentionDecoder<B>;

    fn encoder(&self) -> &Self::Encoder {
        &self.encoder
    }

    fn decoder(&self) -> &Self::Decoder {
        &self.decoder
    }
}

impl<B: Backend> FromModelConfig<B> for AttentionSeq2Seq<B> {
    fn from_config(config: &ModelConfig, device: &B::Device, rng: &mut StdRng) -> Result<Self> {
        check_variant(config, ModelVariant::Attention)?;
        let mut init = ParamInitializer::new(config.param_init(), rng)?;

        let encoder = BiGruEncoder::new(
            config.src_vocab_size,
            config.enc_emb_dim,
            config.enc_hidden_dim,
            config.dec_hidden_dim,
            &mut init,
            device,
        );
        let decoder = AttentionDecoder::new(
            config.trg_vocab_size,
            config.dec_emb_dim,
            config.enc_hidden_dim,
            config.dec_hidden_dim,
            &mut init,
            device,
        );

        Ok(Self { encoder, decoder })
    }
}
