use crate::init::ParamInitializer;
use burn::nn::Linear;
use burn::prelude::*;
use burn::tensor::activation::{softmax, tanh};

/// 加法Attention（Bahdanau）
///
/// energy = tanh(W [h ‖ enc_outputs])、a = softmax(v · energy)。
/// パディング位置のマスクは行わない。
#[derive(Module, Debug)]
pub struct AdditiveAttention<B: Backend> {
    attn: Linear<B>,
    v: Linear<B>,
}

impl<B: Backend> AdditiveAttention<B> {
    pub fn new(
        enc_hidden_dim: usize,
        dec_hidden_dim: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let attn = init.linear(2 * enc_hidden_dim + dec_hidden_dim, dec_hidden_dim, device);
        let v = init.linear_no_bias(dec_hidden_dim, 1, device);

        Self { attn, v }
    }

    /// hidden: [batch, dec_hidden], encoder_outputs: [batch, src_len, 2 * enc_hidden]
    /// → Attention重み [batch, src_len]（各行の和は1）
    pub fn forward(&self, hidden: Tensor<B, 2>, encoder_outputs: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, src_len, _] = encoder_outputs.dims();

        // Decoderの隠れ状態をソース長だけ複製
        let hidden = hidden.unsqueeze_dim::<3>(1).repeat_dim(1, src_len);

        let energy = tanh(self.attn.forward(Tensor::cat(vec![hidden, encoder_outputs], 2)));
        let scores = self.v.forward(energy).reshape([batch_size, src_len]);

        softmax(scores, 1)
    }
}
