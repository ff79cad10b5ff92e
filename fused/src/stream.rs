//! Stream orchestration for the sequential cell pipeline.
//!
//! The recurrence itself is strictly ordered, so the per-step GEMM,
//! layer-norm, and pointwise kernels all go down one "step" stream and
//! ordering within a timestep comes for free. A second "reduce" stream
//! carries the final weight-gradient GEMM of the backward pass; a blocking
//! barrier on the step stream stands in for the cross-stream event wait.

use std::sync::atomic::{AtomicU64, Ordering};

use burn_backend::StreamId;
use burn_cubecl::CubeRuntime;
use cubecl::prelude::*;
use tracing::trace;

// Start at 1 to avoid colliding with the default stream (id 0).
static CELL_STREAM_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_cell_stream_id() -> StreamId {
    StreamId {
        value: CELL_STREAM_COUNTER.fetch_add(1, Ordering::Relaxed),
    }
}

/// Block until all work queued on the client's stream has completed.
pub fn wait_for_sync<R: CubeRuntime>(
    client: &ComputeClient<R>,
) -> Result<(), cubecl::server::ExecutionError> {
    pollster::block_on(client.sync())
}

/// Pair of compute streams driving one cell pass.
///
/// `step` carries the ordered per-timestep work, `reduce` carries the
/// time-batched weight-gradient reduction. When a `sync` client is handed in,
/// the caller owns synchronization and `Drop` is non-blocking; otherwise
/// `Drop` drains both streams.
pub struct CellStreams<R: CubeRuntime> {
    pub step: ComputeClient<R>,
    pub reduce: ComputeClient<R>,
    sync: Option<ComputeClient<R>>,
}

impl<R: CubeRuntime> CellStreams<R> {
    pub fn new(client: &ComputeClient<R>, sync: Option<ComputeClient<R>>) -> Self {
        let step = client.clone();
        let step_id = next_cell_stream_id();
        // SAFETY: the stream id is freshly allocated and only used by this
        // client clone, so no other handle can race on the same stream.
        unsafe {
            step.set_stream(step_id);
        }

        let reduce = client.clone();
        let reduce_id = next_cell_stream_id();
        // SAFETY: as above.
        unsafe {
            reduce.set_stream(reduce_id);
        }

        trace!(
            step = step_id.value,
            reduce = reduce_id.value,
            "cell streams created"
        );

        Self { step, reduce, sync }
    }

    /// Make the reduce stream safe to read results produced on the step
    /// stream: blocks the host until the step stream has drained.
    pub fn barrier(&self) -> Result<(), cubecl::server::ExecutionError> {
        wait_for_sync(&self.step)
    }
}

impl<R: CubeRuntime> Drop for CellStreams<R> {
    fn drop(&mut self) {
        if self.sync.is_some() {
            // The caller synchronizes through its own client; queued work
            // stays in flight.
            trace!("cell streams dropped, sync handed off");
            return;
        }
        if let Err(err) = wait_for_sync(&self.step) {
            trace!(?err, "step stream drain failed on drop");
        }
        if let Err(err) = wait_for_sync(&self.reduce) {
            trace!(?err, "reduce stream drain failed on drop");
        }
    }
}
