use crate::attention::AdditiveAttention;
use crate::encoder::AttentionMemory;
use crate::init::ParamInitializer;
use crate::random::dropout;
use crate::recurrent::{GruCell, LstmState, StackedLstm};
use crate::seq2seq::Decoder;
use burn::nn::{Embedding, Linear};
use burn::prelude::*;
use rand::rngs::StdRng;

/// 1ステップ分の入力トークン [batch] を埋め込み [batch, emb_dim] に変換
fn embed_step<B: Backend>(embedding: &Embedding<B>, input: Tensor<B, 1, Int>) -> Tensor<B, 2> {
    let [batch_size] = input.dims();
    let embedded = embedding.forward(input.reshape([1, batch_size]));
    let [_, _, emb_dim] = embedded.dims();
    embedded.reshape([batch_size, emb_dim])
}

// ===== 文脈ベクトル再注入Decoder（GRU） =====

/// GRU入力は 埋め込み ‖ 文脈、出力層は 埋め込み ‖ 隠れ状態 ‖ 文脈
#[derive(Module, Debug)]
pub struct ContextDecoder<B: Backend> {
    embedding: Embedding<B>,
    rnn: GruCell<B>,
    fc_out: Linear<B>,
    vocab_size: usize,
}

impl<B: Backend> ContextDecoder<B> {
    pub fn new(
        vocab_size: usize,
        emb_dim: usize,
        hidden_dim: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let embedding = init.embedding(vocab_size, emb_dim, device);
        let rnn = GruCell::new(emb_dim + hidden_dim, hidden_dim, init, device);
        let fc_out = init.linear(emb_dim + 2 * hidden_dim, vocab_size, device);

        Self {
            embedding,
            rnn,
            fc_out,
            vocab_size,
        }
    }
}

impl<B: Backend> Decoder<B> for ContextDecoder<B> {
    type Memory = Tensor<B, 2>;
    type State = Tensor<B, 2>;

    /// Decoderは文脈ベクトルを初期隠れ状態として開始する
    fn initial_state(&self, memory: &Self::Memory) -> Self::State {
        memory.clone()
    }

    fn step(
        &self,
        input: Tensor<B, 1, Int>,
        hidden: Self::State,
        context: &Self::Memory,
        dropout_rate: f64,
        rng: &mut StdRng,
    ) -> (Tensor<B, 2>, Self::State) {
        let embedded = dropout(embed_step(&self.embedding, input), dropout_rate, rng);

        let rnn_input = Tensor::cat(vec![embedded.clone(), context.clone()], 1);
        let hidden = self.rnn.forward(rnn_input, hidden);

        let output = Tensor::cat(vec![embedded, hidden.clone(), context.clone()], 1);
        let logits = self.fc_out.forward(output);

        (logits, hidden)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

// ===== LSTM Decoder =====

#[derive(Module, Debug)]
pub struct LstmDecoder<B: Backend> {
    embedding: Embedding<B>,
    rnn: StackedLstm<B>,
    fc_out: Linear<B>,
    vocab_size: usize,
}

impl<B: Backend> LstmDecoder<B> {
    pub fn new(
        vocab_size: usize,
        emb_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let embedding = init.embedding(vocab_size, emb_dim, device);
        let rnn = StackedLstm::new(emb_dim, hidden_dim, num_layers, init, device);
        let fc_out = init.linear(hidden_dim, vocab_size, device);

        Self {
            embedding,
            rnn,
            fc_out,
            vocab_size,
        }
    }
}

impl<B: Backend> Decoder<B> for LstmDecoder<B> {
    type Memory = LstmState<B>;
    type State = LstmState<B>;

    fn initial_state(&self, memory: &Self::Memory) -> Self::State {
        memory.clone()
    }

    fn step(
        &self,
        input: Tensor<B, 1, Int>,
        state: Self::State,
        _memory: &Self::Memory,
        dropout_rate: f64,
        rng: &mut StdRng,
    ) -> (Tensor<B, 2>, Self::State) {
        let embedded = dropout(embed_step(&self.embedding, input), dropout_rate, rng);
        let (output, state) = self.rnn.step(embedded, state, dropout_rate, rng);

        (self.fc_out.forward(output), state)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

// ===== Attention Decoder =====

/// 各ステップでEncoderの全出力に対するAttentionを計算し、重み付き和をGRU入力と出力層に渡す
#[derive(Module, Debug)]
pub struct AttentionDecoder<B: Backend> {
    embedding: Embedding<B>,
    attention: AdditiveAttention<B>,
    rnn: GruCell<B>,
    fc_out: Linear<B>,
    vocab_size: usize,
}

impl<B: Backend> AttentionDecoder<B> {
    pub fn new(
        vocab_size: usize,
        emb_dim: usize,
        enc_hidden_dim: usize,
        dec_hidden_dim: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let embedding = init.embedding(vocab_size, emb_dim, device);
        let attention = AdditiveAttention::new(enc_hidden_dim, dec_hidden_dim, init, device);
        let rnn = GruCell::new(2 * enc_hidden_dim + emb_dim, dec_hidden_dim, init, device);
        let fc_out = init.linear(2 * enc_hidden_dim + dec_hidden_dim + emb_dim, vocab_size, device);

        Self {
            embedding,
            attention,
            rnn,
            fc_out,
            vocab_size,
        }
    }

    /// 1ステップ分のAttention重み [batch, src_len]
    pub fn attention_weights(&self, hidden: Tensor<B, 2>, memory: &AttentionMemory<B>) -> Tensor<B, 2> {
        self.attention.forward(hidden, memory.outputs.clone())
    }
}

impl<B: Backend> Decoder<B> for AttentionDecoder<B> {
    type Memory = AttentionMemory<B>;
    type State = Tensor<B, 2>;

    fn initial_state(&self, memory: &Self::Memory) -> Self::State {
        memory.hidden.clone()
    }

    fn step(
        &self,
        input: Tensor<B, 1, Int>,
        hidden: Self::State,
        memory: &Self::Memory,
        dropout_rate: f64,
        rng: &mut StdRng,
    ) -> (Tensor<B, 2>, Self::State) {
        let embedded = dropout(embed_step(&self.embedding, input), dropout_rate, rng);
        let [batch_size, src_len, enc_dim] = memory.outputs.dims();

        // 重み付き和: [batch, 1, src_len] x [batch, src_len, 2H] → [batch, 2H]
        let weights = self.attention_weights(hidden.clone(), memory);
        let weighted = weights
            .reshape([batch_size, 1, src_len])
            .matmul(memory.outputs.clone())
            .reshape([batch_size, enc_dim]);

        let rnn_input = Tensor::cat(vec![embedded.clone(), weighted.clone()], 1);
        let hidden = self.rnn.forward(rnn_input, hidden);

        let output = Tensor::cat(vec![hidden.clone(), weighted, embedded], 1);
        let logits = self.fc_out.forward(output);

        (logits, hidden)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}
