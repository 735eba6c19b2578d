use crate::config::ParamInit;
use crate::error::{Result, Seq2SeqError};
use burn::module::Param;
use burn::nn::{Embedding, EmbeddingConfig, Initializer, Linear, LinearConfig};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

enum Sampler {
    Normal(Normal<f64>),
    Uniform(f64),
}

/// 明示的な乱数生成器からパラメータを初期化する
///
/// Burnの標準Initializerはバックエンド側の乱数を使うため、ここでは層を作った後に
/// 重みを差し替える。同じシードなら同じ初期値になる。
pub struct ParamInitializer<'a> {
    sampler: Sampler,
    zero_bias: bool,
    rng: &'a mut StdRng,
}

impl<'a> ParamInitializer<'a> {
    pub fn new(scheme: ParamInit, rng: &'a mut StdRng) -> Result<Self> {
        let (sampler, zero_bias) = match scheme {
            ParamInit::Normal { std } => (Sampler::Normal(normal(std)?), false),
            ParamInit::NormalZeroBias { std } => (Sampler::Normal(normal(std)?), true),
            ParamInit::Uniform { bound } => (Sampler::Uniform(bound), false),
        };

        Ok(Self {
            sampler,
            zero_bias,
            rng,
        })
    }

    fn sample(&mut self, count: usize) -> Vec<f32> {
        match &self.sampler {
            Sampler::Normal(dist) => (0..count)
                .map(|_| dist.sample(&mut *self.rng) as f32)
                .collect(),
            Sampler::Uniform(bound) => {
                let bound = *bound;
                (0..count)
                    .map(|_| self.rng.random_range(-bound..bound) as f32)
                    .collect()
            }
        }
    }

    fn tensor<B: Backend, const D: usize>(
        &mut self,
        shape: [usize; D],
        is_bias: bool,
        device: &B::Device,
    ) -> Tensor<B, D> {
        let count = shape.iter().product();
        let values = if is_bias && self.zero_bias {
            vec![0.0_f32; count]
        } else {
            self.sample(count)
        };
        Tensor::<B, D>::from_data(TensorData::new(values, shape), device)
    }

    /// 全結合層 [d_input, d_output]（バイアス付き）
    pub fn linear<B: Backend>(&mut self, d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
        let mut linear = LinearConfig::new(d_input, d_output)
            .with_initializer(Initializer::Zeros)
            .init(device);
        linear.weight = Param::from_tensor(self.tensor([d_input, d_output], false, device));
        linear.bias = Some(Param::from_tensor(self.tensor([d_output], true, device)));
        linear
    }

    /// 全結合層（バイアスなし）
    pub fn linear_no_bias<B: Backend>(
        &mut self,
        d_input: usize,
        d_output: usize,
        device: &B::Device,
    ) -> Linear<B> {
        let mut linear = LinearConfig::new(d_input, d_output)
            .with_bias(false)
            .with_initializer(Initializer::Zeros)
            .init(device);
        linear.weight = Param::from_tensor(self.tensor([d_input, d_output], false, device));
        linear
    }

    /// 埋め込み層 [vocab_size, d_model]
    pub fn embedding<B: Backend>(
        &mut self,
        vocab_size: usize,
        d_model: usize,
        device: &B::Device,
    ) -> Embedding<B> {
        let mut embedding = EmbeddingConfig::new(vocab_size, d_model)
            .with_initializer(Initializer::Zeros)
            .init(device);
        embedding.weight = Param::from_tensor(self.tensor([vocab_size, d_model], false, device));
        embedding
    }
}

fn normal(std: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, std)
        .map_err(|e| Seq2SeqError::InvalidConfig(format!("正規分布の初期化に失敗: {}", e)))
}
