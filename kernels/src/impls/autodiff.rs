use std::fmt::Debug;

use burn::{
    backend::autodiff::{
        Autodiff, NodeId,
        checkpoint::{base::Checkpointer, strategy::CheckpointStrategy},
        grads::Gradients,
        ops::{Backward, Ops, OpsKind},
    },
    tensor::ops::FloatTensor,
};

use crate::{
    TensorBundle,
    kernel::{FusedKernel, FusedKernelBackend},
};

/// No-op backward used to wrap primitives into untracked `AutodiffTensors`.
/// With 0 parents, `prepare([])` always yields `UnTracked`, allowing us to
/// convert inner primitives to autodiff tensors without memory allocation.
#[derive(Debug)]
struct NoOpBackward;

impl<B: burn_backend::Backend> Backward<B, 0> for NoOpBackward {
    type State = ();

    fn backward(self, _ops: Ops<(), 0>, _grads: &mut Gradients, _checkpointer: &mut Checkpointer) {
        // Never called since we're always untracked
    }
}

/// Backward op for a single-output kernel: the upstream gradient of the one
/// output is handed to the backward kernel, and the resulting input gradients
/// are registered on every tracked parent.
#[derive(Debug)]
struct KernelBackwardOp<K, const N: usize, const S: usize> {
    _marker: std::marker::PhantomData<K>,
}

impl<K, const N: usize, const S: usize, B> Backward<B, N> for KernelBackwardOp<K, N, S>
where
    K: FusedKernel,
    B: FusedKernelBackend<K>,
    B::FloatTensorPrimitive: Send,
    K::SavedState<B::FloatTensorPrimitive>:
        TensorBundle<B::FloatTensorPrimitive, Array = [B::FloatTensorPrimitive; S]>,
    K::Outputs<B::FloatTensorPrimitive>:
        TensorBundle<B::FloatTensorPrimitive, Array = [B::FloatTensorPrimitive; 1]>,
    K::Inputs<B::FloatTensorPrimitive>:
        TensorBundle<B::FloatTensorPrimitive, Array = [B::FloatTensorPrimitive; N]>,
{
    type State = (
        K::SavedState<B::FloatTensorPrimitive>, // Saved state from forward
        [Option<NodeId>; N],                    // Input node IDs for gradient registration
        K::Config,                              // Saved config
    );

    fn backward(
        self,
        ops: Ops<Self::State, N>,
        grads: &mut Gradients,
        _checkpointer: &mut Checkpointer,
    ) {
        let grad_output = grads.consume::<B>(&ops.node);
        let (saved_state, input_node_ids, config) = ops.state;

        let grad_outputs = K::Outputs::from_array([grad_output]);
        let grad_inputs = B::backward(saved_state, grad_outputs, config);

        // Register gradients for all tracked parents (accumulates if called
        // multiple times)
        for (grad, node_id) in grad_inputs
            .into_array()
            .into_iter()
            .zip(input_node_ids.iter())
        {
            if let Some(id) = node_id {
                grads.register::<B>(*id, grad);
            }
        }
    }
}

impl<K, B, C, const N: usize, const S: usize> FusedKernelBackend<K> for Autodiff<B, C>
where
    K: FusedKernel,
    B: FusedKernelBackend<K>,
    C: CheckpointStrategy,
    B::FloatTensorPrimitive: Clone,
    // Extract N and S from the Array associated types; Outputs is pinned to
    // exactly one tensor.
    K::Inputs<B::FloatTensorPrimitive>:
        TensorBundle<B::FloatTensorPrimitive, Array = [B::FloatTensorPrimitive; N]>,
    K::Outputs<B::FloatTensorPrimitive>:
        TensorBundle<B::FloatTensorPrimitive, Array = [B::FloatTensorPrimitive; 1]>,
    K::SavedState<B::FloatTensorPrimitive>:
        TensorBundle<B::FloatTensorPrimitive, Array = [B::FloatTensorPrimitive; S]>,
    K::Inputs<FloatTensor<Self>>: TensorBundle<FloatTensor<Self>, Array = [FloatTensor<Self>; N]>,
    K::Outputs<FloatTensor<Self>>: TensorBundle<FloatTensor<Self>, Array = [FloatTensor<Self>; 1]>,
    K::SavedState<FloatTensor<Self>>:
        TensorBundle<FloatTensor<Self>, Array = [FloatTensor<Self>; S]>,
{
    fn forward(
        inputs: K::Inputs<FloatTensor<Self>>,
        config: K::Config,
    ) -> (
        K::Outputs<FloatTensor<Self>>,
        K::SavedState<FloatTensor<Self>>,
    ) {
        let input_arr = inputs.into_array();
        let nodes_array: [_; N] = input_arr.each_ref().map(|t| t.node.clone());
        let input_node_ids: [Option<NodeId>; N] = nodes_array.each_ref().map(|n| Some(n.id));
        let primitives: [_; N] = input_arr.map(|t| t.primitive.clone());

        let inner_inputs = K::Inputs::from_array(primitives);
        let (outputs, saved_state) = B::forward(inner_inputs, config.clone());
        let [output_primitive] = outputs.into_array();
        let saved_primitives: [_; S] = saved_state.into_array();

        let saved_state_for_backward = K::SavedState::from_array(saved_primitives.clone());

        let backward_op = KernelBackwardOp::<K, N, S> {
            _marker: std::marker::PhantomData,
        };

        let tracked_output = match backward_op
            .prepare::<C>(nodes_array)
            .compute_bound()
            .stateful()
        {
            OpsKind::Tracked(prep) => prep.finish(
                (saved_state_for_backward, input_node_ids, config),
                output_primitive,
            ),
            OpsKind::UnTracked(prep) => prep.finish(output_primitive),
        };

        // Wrap saved state primitives as untracked AutodiffTensors.
        let wrapped_saved: [FloatTensor<Self>; S] = std::array::from_fn(|i| {
            match NoOpBackward.prepare::<C>([]).compute_bound().stateful() {
                OpsKind::UnTracked(prep) => prep.finish(saved_primitives[i].clone()),
                OpsKind::Tracked(_) => unreachable!("0 parents always yields UnTracked"),
            }
        });

        (
            K::Outputs::from_array([tracked_output]),
            K::SavedState::from_array(wrapped_saved),
        )
    }

    fn backward(
        _saved: K::SavedState<FloatTensor<Self>>,
        _grad_outputs: K::Outputs<FloatTensor<Self>>,
        _config: K::Config,
    ) -> K::Inputs<FloatTensor<Self>> {
        panic!("Second-order gradients not supported")
    }
}
