use crate::init::ParamInitializer;
use crate::random::dropout;
use crate::recurrent::{GruCell, LstmState, StackedLstm};
use crate::seq2seq::Encoder;
use burn::nn::{Embedding, Linear};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use rand::rngs::StdRng;

// ===== GRU Encoder =====

/// 埋め込み → GRU。最終ステップの隠れ状態を文脈ベクトルとする
#[derive(Module, Debug)]
pub struct GruEncoder<B: Backend> {
    embedding: Embedding<B>,
    rnn: GruCell<B>,
}

impl<B: Backend> GruEncoder<B> {
    pub fn new(
        vocab_size: usize,
        emb_dim: usize,
        hidden_dim: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let embedding = init.embedding(vocab_size, emb_dim, device);
        let rnn = GruCell::new(emb_dim, hidden_dim, init, device);

        Self { embedding, rnn }
    }
}

impl<B: Backend> Encoder<B> for GruEncoder<B> {
    /// 文脈ベクトル [batch, hidden_dim]
    type Memory = Tensor<B, 2>;

    fn encode(&self, src: Tensor<B, 2, Int>, dropout_rate: f64, rng: &mut StdRng) -> Self::Memory {
        let [_, batch_size] = src.dims();
        let device = src.device();

        let embedded = dropout(self.embedding.forward(src), dropout_rate, rng);
        let initial = Tensor::zeros([batch_size, self.rnn.d_hidden()], &device);
        let (_, context) = self.rnn.scan(embedded, initial);

        context
    }
}

// ===== LSTM Encoder =====

/// 埋め込み → 多層LSTM。各層の最終 (hidden, cell) をDecoderに渡す
#[derive(Module, Debug)]
pub struct LstmEncoder<B: Backend> {
    embedding: Embedding<B>,
    rnn: StackedLstm<B>,
}

impl<B: Backend> LstmEncoder<B> {
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

        Self { embedding, rnn }
    }
}

impl<B: Backend> Encoder<B> for LstmEncoder<B> {
    type Memory = LstmState<B>;

    fn encode(&self, src: Tensor<B, 2, Int>, dropout_rate: f64, rng: &mut StdRng) -> Self::Memory {
        let [src_len, batch_size] = src.dims();
        let device = src.device();

        let embedded = dropout(self.embedding.forward(src), dropout_rate, rng);
        let [_, _, emb_dim] = embedded.dims();

        let mut state = LstmState::zeros(
            self.rnn.num_layers(),
            batch_size,
            self.rnn.d_hidden(),
            &device,
        );

        for t in 0..src_len {
            let x_t = embedded
                .clone()
                .slice([t..t + 1, 0..batch_size, 0..emb_dim])
                .reshape([batch_size, emb_dim]);
            let (_, next_state) = self.rnn.step(x_t, state, dropout_rate, rng);
            state = next_state;
        }

        state
    }
}

// ===== 双方向GRU Encoder（Attention用） =====

/// Attention付きDecoderが参照するEncoderの出力
#[derive(Debug, Clone)]
pub struct AttentionMemory<B: Backend> {
    /// 各時刻の出力 [batch, src_len, 2 * enc_hidden_dim]
    pub outputs: Tensor<B, 3>,
    /// Decoderの初期隠れ状態 [batch, dec_hidden_dim]
    pub hidden: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct BiGruEncoder<B: Backend> {
    embedding: Embedding<B>,
    forward_rnn: GruCell<B>,
    backward_rnn: GruCell<B>,
    fc: Linear<B>,
}

impl<B: Backend> BiGruEncoder<B> {
    pub fn new(
        vocab_size: usize,
        emb_dim: usize,
        enc_hidden_dim: usize,
        dec_hidden_dim: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let embedding = init.embedding(vocab_size, emb_dim, device);
        let forward_rnn = GruCell::new(emb_dim, enc_hidden_dim, init, device);
        let backward_rnn = GruCell::new(emb_dim, enc_hidden_dim, init, device);
        let fc = init.linear(2 * enc_hidden_dim, dec_hidden_dim, device);

        Self {
            embedding,
            forward_rnn,
            backward_rnn,
            fc,
        }
    }
}

impl<B: Backend> Encoder<B> for BiGruEncoder<B> {
    type Memory = AttentionMemory<B>;

    fn encode(&self, src: Tensor<B, 2, Int>, dropout_rate: f64, rng: &mut StdRng) -> Self::Memory {
        let [_, batch_size] = src.dims();
        let device = src.device();

        let embedded = dropout(self.embedding.forward(src), dropout_rate, rng);
        let initial = Tensor::zeros([batch_size, self.forward_rnn.d_hidden()], &device);

        // 順方向と逆方向（時間軸を反転して走査し、出力を元の順に戻す）
        let (forward_outputs, forward_last) = self.forward_rnn.scan(embedded.clone(), initial.clone());
        let (backward_outputs, backward_last) = self.backward_rnn.scan(embedded.flip([0]), initial);
        let backward_outputs = backward_outputs.flip([0]);

        // [src_len, batch, 2H] → [batch, src_len, 2H]
        let outputs = Tensor::cat(vec![forward_outputs, backward_outputs], 2).swap_dims(0, 1);
        let hidden = tanh(self.fc.forward(Tensor::cat(vec![forward_last, backward_last], 1)));

        AttentionMemory { outputs, hidden }
    }
}
