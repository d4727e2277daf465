// ============================================================
// Layer 5 — Global Gradient-Norm Clipping
// ============================================================
// The training loop clips the norm of the whole gradient vector,
// not of each parameter tensor on its own:
//
//   total = sqrt(Σ_p ||g_p||²)
//   g_p  ← g_p · max_norm / (total + ε)     when total > max_norm
//
// Gradients are looked up through the model's parameter ids,
// the same walk GradientsParams::from_grads uses to collect them.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::ml::loss::scalar;

/// Keeps the scale finite for an all-zero gradient
const EPS: f64 = 1e-6;

// ─── Visitors ─────────────────────────────────────────────────────────────────
struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    total: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += scalar(grad.powf_scalar(2.0).sum());
        }
    }
}

struct Rescale<'a> {
    grads:  &'a mut GradientsParams,
    factor: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

// ─── Public API ───────────────────────────────────────────────────────────────
/// L2 norm over every gradient belonging to `model`'s parameters.
pub fn global_grad_norm<B, M>(model: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm { grads, total: 0.0 };
    model.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Rescale all gradients so their global norm is at most `max_norm`.
/// Returns the norm measured before clipping.
pub fn clip_global_norm<B, M>(model: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let total = global_grad_norm::<B, M>(model, grads);
    if total > max_norm {
        let mut visitor = Rescale { grads, factor: max_norm / (total + EPS) };
        model.visit(&mut visitor);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        module::Param,
    };

    type TestAutodiff = Autodiff<NdArray>;

    #[derive(Module, Debug)]
    struct TwoWeights<B: Backend> {
        left:  Param<Tensor<B, 1>>,
        right: Param<Tensor<B, 1>>,
    }

    /// Gradients [3, 0] for `left` and [0, 3] for `right`: each of norm 3,
    /// global norm sqrt(18) ≈ 4.243.
    fn model_and_grads() -> (TwoWeights<TestAutodiff>, GradientsParams) {
        let device = Default::default();
        let model  = TwoWeights::<TestAutodiff> {
            left:  Param::from_tensor(Tensor::ones([2], &device)),
            right: Param::from_tensor(Tensor::ones([2], &device)),
        };
        let a    = Tensor::<TestAutodiff, 1>::from_floats([3.0, 0.0], &device);
        let b    = Tensor::<TestAutodiff, 1>::from_floats([0.0, 3.0], &device);
        let loss = (model.left.val() * a).sum() + (model.right.val() * b).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        (model, grads)
    }

    #[test]
    fn test_global_norm_covers_every_parameter() {
        let (model, grads) = model_and_grads();
        let norm = global_grad_norm::<TestAutodiff, _>(&model, &grads);
        assert!((norm - 18f64.sqrt()).abs() < 1e-5, "norm {norm}");
    }

    #[test]
    fn test_clipping_bounds_the_global_norm() {
        let (model, mut grads) = model_and_grads();

        let before = clip_global_norm::<TestAutodiff, _>(&model, &mut grads, 4.0);
        let after  = global_grad_norm::<TestAutodiff, _>(&model, &grads);
        assert!((before - 18f64.sqrt()).abs() < 1e-5);
        assert!(after <= 4.0 + 1e-5, "global norm {after} exceeds 4.0");
        assert!(after > 3.99, "clipping should scale down, not zero out: {after}");

        // Every tensor is scaled by the same factor
        let left: Vec<f32> = grads
            .get::<NdArray, 1>(model.left.id)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        let right: Vec<f32> = grads
            .get::<NdArray, 1>(model.right.id)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        assert!((left[0] - right[1]).abs() < 1e-6);
        assert_eq!(left[1], 0.0);
    }

    #[test]
    fn test_small_gradients_are_untouched() {
        let (model, mut grads) = model_and_grads();
        clip_global_norm::<TestAutodiff, _>(&model, &mut grads, 10.0);
        let norm = global_grad_norm::<TestAutodiff, _>(&model, &grads);
        assert!((norm - 18f64.sqrt()).abs() < 1e-5);
    }
}
