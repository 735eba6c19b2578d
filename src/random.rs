use burn::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// シード付き乱数生成器（初期化・Dropout・Teacher Forcing・シャッフルで共有）
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// 確率pでtrue（1ステップに1回だけ引く）
pub fn coin_flip(rng: &mut StdRng, p: f64) -> bool {
    rng.random::<f64>() < p
}

/// Inverted Dropout
///
/// `rate` が0なら乱数を消費せずそのまま返す。マスクは明示的な `rng` から生成するので
/// 同じシードなら同じマスクになる。
pub fn dropout<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    rate: f64,
    rng: &mut StdRng,
) -> Tensor<B, D> {
    if rate <= 0.0 {
        return x;
    }

    let dims = x.dims();
    let num_elements: usize = dims.iter().product();
    let keep = 1.0 - rate;
    let scale = (1.0 / keep) as f32;

    let mask: Vec<f32> = (0..num_elements)
        .map(|_| if rng.random::<f64>() < keep { scale } else { 0.0 })
        .collect();
    let mask = Tensor::<B, D>::from_data(TensorData::new(mask, dims), &x.device());

    x * mask
}
