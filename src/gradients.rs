use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use std::marker::PhantomData;

/// 全パラメータの勾配の二乗和を集計
struct GradNormVisitor<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum_sq: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            // f32での二乗和のオーバーフローを避けるため最大絶対値で正規化してから集計
            let max_abs: f64 = grad.clone().abs().max().into_scalar().elem();
            if max_abs == 0.0 {
                return;
            }
            let scaled_sum_sq: f64 = grad
                .div_scalar(max_abs)
                .powf_scalar(2.0)
                .sum()
                .into_scalar()
                .elem();
            self.sum_sq += scaled_sum_sq * max_abs * max_abs;
        }
    }
}

/// 全パラメータの勾配を同じ係数で縮小
struct GradScaleVisitor<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScaleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
        }
    }
}

/// 連結した勾配ベクトルのL2ノルム
pub fn gradient_norm<B, M>(model: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradNormVisitor::<B> {
        grads,
        sum_sq: 0.0,
        _backend: PhantomData,
    };
    model.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

/// 勾配ノルムのクリッピング
///
/// ```text
/// norm = ||g||
/// if norm > max_norm:
///     g *= max_norm / norm
/// ```
///
/// ノルムが `max_norm` 以下なら勾配はそのまま。ノルムが inf / NaN の場合は
/// 上限を保証できないので `None` を返す（呼び出し側はそのバッチの更新をスキップ）。
/// 2つ目の戻り値はクリップ前のノルム。
pub fn clip_grad_norm<B, M>(
    model: &M,
    mut grads: GradientsParams,
    max_norm: f64,
) -> (Option<GradientsParams>, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm = gradient_norm::<B, M>(model, &grads);

    if !norm.is_finite() {
        return (None, norm);
    }

    if norm > max_norm {
        let mut visitor = GradScaleVisitor::<B> {
            grads: &mut grads,
            scale: max_norm / norm,
            _backend: PhantomData,
        };
        model.visit(&mut visitor);
    }

    (Some(grads), norm)
}
