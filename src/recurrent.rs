use crate::init::ParamInitializer;
use crate::random::dropout;
use burn::nn::Linear;
use burn::prelude::*;
use burn::tensor::activation::{sigmoid, tanh};
use rand::rngs::StdRng;

// ===== GRU =====

/// 1ステップ分のGRUセル
///
/// r = σ(W_ir x + W_hr h), z = σ(W_iz x + W_hz h),
/// n = tanh(W_in x + r * (W_hn h)), h' = (1 - z) * n + z * h
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    input_gates: Linear<B>,  // [d_input, 3 * d_hidden]（r | z | n）
    hidden_gates: Linear<B>, // [d_hidden, 3 * d_hidden]
    d_hidden: usize,
}

impl<B: Backend> GruCell<B> {
    pub fn new(
        d_input: usize,
        d_hidden: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let input_gates = init.linear(d_input, 3 * d_hidden, device);
        let hidden_gates = init.linear(d_hidden, 3 * d_hidden, device);

        Self {
            input_gates,
            hidden_gates,
            d_hidden,
        }
    }

    pub fn d_hidden(&self) -> usize {
        self.d_hidden
    }

    /// x: [batch, d_input], hidden: [batch, d_hidden] → [batch, d_hidden]
    pub fn forward(&self, x: Tensor<B, 2>, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, _] = x.dims();
        let d = self.d_hidden;

        let gi = self.input_gates.forward(x);
        let gh = self.hidden_gates.forward(hidden.clone());

        let gate = |t: &Tensor<B, 2>, idx: usize| t.clone().slice([0..batch_size, idx * d..(idx + 1) * d]);

        let reset = sigmoid(gate(&gi, 0) + gate(&gh, 0));
        let update = sigmoid(gate(&gi, 1) + gate(&gh, 1));
        let candidate = tanh(gate(&gi, 2) + reset * gate(&gh, 2));

        // (1 - z) * n + z * h
        candidate.clone() + update * (hidden - candidate)
    }

    /// 時間方向に走査
    ///
    /// inputs: [seq_len, batch, d_input] → (全ステップの出力 [seq_len, batch, d_hidden], 最終隠れ状態)
    pub fn scan(&self, inputs: Tensor<B, 3>, initial: Tensor<B, 2>) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let [seq_len, batch_size, d_input] = inputs.dims();

        let mut hidden = initial;
        let mut outputs = Vec::with_capacity(seq_len);

        for t in 0..seq_len {
            let x_t = inputs
                .clone()
                .slice([t..t + 1, 0..batch_size, 0..d_input])
                .reshape([batch_size, d_input]);
            hidden = self.forward(x_t, hidden);
            outputs.push(hidden.clone());
        }

        (Tensor::stack(outputs, 0), hidden)
    }
}

// ===== LSTM =====

/// 多層LSTMの状態（層ごとの隠れ状態とセル状態）
#[derive(Debug, Clone)]
pub struct LstmState<B: Backend> {
    pub hidden: Vec<Tensor<B, 2>>,
    pub cell: Vec<Tensor<B, 2>>,
}

impl<B: Backend> LstmState<B> {
    pub fn zeros(num_layers: usize, batch_size: usize, d_hidden: usize, device: &B::Device) -> Self {
        let hidden = (0..num_layers)
            .map(|_| Tensor::zeros([batch_size, d_hidden], device))
            .collect();
        let cell = (0..num_layers)
            .map(|_| Tensor::zeros([batch_size, d_hidden], device))
            .collect();

        Self { hidden, cell }
    }
}

/// 1ステップ分のLSTMセル（ゲート順: i | f | g | o）
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    input_gates: Linear<B>,
    hidden_gates: Linear<B>,
    d_hidden: usize,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(
        d_input: usize,
        d_hidden: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let input_gates = init.linear(d_input, 4 * d_hidden, device);
        let hidden_gates = init.linear(d_hidden, 4 * d_hidden, device);

        Self {
            input_gates,
            hidden_gates,
            d_hidden,
        }
    }

    /// (hidden, cell) → (hidden', cell')
    pub fn forward(
        &self,
        x: Tensor<B, 2>,
        hidden: Tensor<B, 2>,
        cell: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch_size, _] = x.dims();
        let d = self.d_hidden;

        let gates = self.input_gates.forward(x) + self.hidden_gates.forward(hidden);
        let gate = |idx: usize| gates.clone().slice([0..batch_size, idx * d..(idx + 1) * d]);

        let input_gate = sigmoid(gate(0));
        let forget_gate = sigmoid(gate(1));
        let candidate = tanh(gate(2));
        let output_gate = sigmoid(gate(3));

        let cell = forget_gate * cell + input_gate * candidate;
        let hidden = output_gate * tanh(cell.clone());

        (hidden, cell)
    }
}

/// 多層LSTM（層間にDropout）
#[derive(Module, Debug)]
pub struct StackedLstm<B: Backend> {
    layers: Vec<LstmCell<B>>,
    d_hidden: usize,
}

impl<B: Backend> StackedLstm<B> {
    pub fn new(
        d_input: usize,
        d_hidden: usize,
        num_layers: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let mut layers = Vec::with_capacity(num_layers);
        for layer_idx in 0..num_layers {
            let layer_input = if layer_idx == 0 { d_input } else { d_hidden };
            layers.push(LstmCell::new(layer_input, d_hidden, init, device));
        }

        Self { layers, d_hidden }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn d_hidden(&self) -> usize {
        self.d_hidden
    }

    /// 1ステップ進める。戻り値は (最上層の出力, 新しい状態)
    pub fn step(
        &self,
        x: Tensor<B, 2>,
        state: LstmState<B>,
        dropout_rate: f64,
        rng: &mut StdRng,
    ) -> (Tensor<B, 2>, LstmState<B>) {
        let num_layers = self.layers.len();
        let mut next_hidden = Vec::with_capacity(num_layers);
        let mut next_cell = Vec::with_capacity(num_layers);
        let mut layer_input = x;

        for (layer_idx, ((layer, hidden), cell)) in self
            .layers
            .iter()
            .zip(state.hidden)
            .zip(state.cell)
            .enumerate()
        {
            let (hidden, cell) = layer.forward(layer_input, hidden, cell);

            // 最上層以外の出力にDropout
            layer_input = if layer_idx + 1 < num_layers {
                dropout(hidden.clone(), dropout_rate, rng)
            } else {
                hidden.clone()
            };

            next_hidden.push(hidden);
            next_cell.push(cell);
        }

        let state = LstmState {
            hidden: next_hidden,
            cell: next_cell,
        };

        (layer_input, state)
    }
}
