// SPDX-License-Identifier: GPL-3.0-only

//! Compute dispatcher: encoding and submission on the shared queue
//!
//! Every submission from the live and still paths goes through one
//! dispatcher so their order is observable. Each gets a sequence number
//! taken before `submit`, under the same lock, so sequence order equals
//! queue order.

use crate::errors::PipelineResult;
use crate::gpu::{GpuContext, wgpu};
use crate::shaders::{DispatchSize, KernelPipeline};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, trace};

/// Record of one queue submission
#[derive(Debug, Clone)]
pub struct Submission {
    /// Strictly increasing per dispatcher, starting at 1
    pub sequence: u64,
    pub index: wgpu::SubmissionIndex,
    pub submitted_at: Instant,
}

pub struct ComputeDispatcher {
    ctx: Arc<GpuContext>,
    next_sequence: AtomicU64,
    completed: Arc<AtomicU64>,
    submit_lock: Mutex<()>,
}

impl ComputeDispatcher {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx,
            next_sequence: AtomicU64::new(1),
            completed: Arc::new(AtomicU64::new(0)),
            submit_lock: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Record one compute pass running `kernel` over `size` workgroups
    pub fn encode_dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        kernel: &KernelPipeline,
        bind_group: &wgpu::BindGroup,
        size: DispatchSize,
    ) {
        if size.is_empty() {
            debug!(kernel = kernel.name(), "Skipping empty dispatch");
            return;
        }

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(kernel.pipeline());
        compute_pass.set_bind_group(0, Some(bind_group), &[]);
        compute_pass.dispatch_workgroups(size.x, size.y, size.z);

        trace!(kernel = kernel.name(), ?size, "Encoded dispatch");
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) -> Submission {
        let command_buffer = encoder.finish();
        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let index = self.ctx.queue().submit(std::iter::once(command_buffer));
        Submission {
            sequence,
            index,
            submitted_at: Instant::now(),
        }
    }

    /// Submit and block until the GPU has finished the work
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> PipelineResult<Submission> {
        let submission = self.submit(encoder);
        self.ctx.wait_idle()?;
        self.completed.fetch_max(submission.sequence, Ordering::SeqCst);

        debug!(
            sequence = submission.sequence,
            elapsed_ms = format!("{:.2}", submission.submitted_at.elapsed().as_micros() as f64 / 1000.0),
            "Synchronous submission finished"
        );
        Ok(submission)
    }

    /// Submit and return at once; `on_complete` runs with the sequence number
    /// once the GPU is done
    ///
    /// Callbacks fire from [`Self::poll`] or any other device poll.
    pub fn submit_async<F>(&self, encoder: wgpu::CommandEncoder, on_complete: F) -> Submission
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let submission = self.submit(encoder);
        let sequence = submission.sequence;
        let completed = Arc::clone(&self.completed);

        // Registered after submit so it tracks this submission. The counter
        // moves only after the callback, so observers never see the work done
        // while its result is still being handed off.
        self.ctx.queue().on_submitted_work_done(move || {
            on_complete(sequence);
            completed.fetch_max(sequence, Ordering::SeqCst);
        });

        trace!(sequence, "Asynchronous submission queued");
        submission
    }

    /// Run completion callbacks for work that has finished
    pub fn poll(&self) {
        self.ctx.poll();
    }

    /// Number of submissions made so far
    pub fn submitted(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst) - 1
    }

    /// Highest sequence number known to have completed
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GpuPowerPreference;
    use std::sync::mpsc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sequences_increase_and_complete() {
        let ctx = match GpuContext::new("dispatcher_test", GpuPowerPreference::default()).await {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };
        let dispatcher = ComputeDispatcher::new(ctx);

        let first = dispatcher.submit_and_wait(dispatcher.create_encoder("first")).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(dispatcher.completed(), 1);

        let (tx, rx) = mpsc::channel();
        let second = dispatcher.submit_async(dispatcher.create_encoder("second"), move |seq| {
            let _ = tx.send(seq);
        });
        assert!(second.sequence > first.sequence);

        dispatcher.context().wait_idle().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(second.sequence));
        assert_eq!(dispatcher.submitted(), 2);
        assert_eq!(dispatcher.completed(), 2);
    }
}
