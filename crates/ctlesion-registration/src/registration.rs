use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use ctlesion_core::image::Image;
use ctlesion_core::transform::Transform;
use ctlesion_core::util::to_host_scalar;
use crate::error::{RegistrationError, Result};
use crate::metric::Metric;
use crate::optimizer::Optimizer;
use crate::regularization::TransformPenalty;
use std::marker::PhantomData;
use tracing::{debug, info};

/// Iterations between loss log lines.
pub const LOG_INTERVAL: usize = 50;

/// Result of a gradient-based registration run.
#[derive(Debug)]
pub struct RegistrationOutcome<T> {
    /// The optimized transform.
    pub transform: T,
    /// Loss of the starting transform.
    pub initial_loss: f64,
    /// Loss of the returned transform.
    pub final_loss: f64,
    /// Loss before each optimizer step.
    pub history: Vec<f64>,
}

pub struct Registration<B, O, M, T, const D: usize>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B, D>,
    T: Transform<B, D> + AutodiffModule<B>,
{
    optimizer: O,
    metric: M,
    penalty: Option<Box<dyn TransformPenalty<B, T>>>,
    _phantom: PhantomData<(B, T)>,
}

impl<B, O, M, T, const D: usize> Registration<B, O, M, T, D>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B, D>,
    T: Transform<B, D> + AutodiffModule<B>,
{
    pub fn new(optimizer: O, metric: M) -> Self {
        Self {
            optimizer,
            metric,
            penalty: None,
            _phantom: PhantomData,
        }
    }

    /// Add a parameter penalty to the loss.
    pub fn with_penalty(mut self, penalty: impl TransformPenalty<B, T> + 'static) -> Self {
        self.penalty = Some(Box::new(penalty));
        self
    }

    fn loss(&self, fixed: &Image<B, D>, moving: &Image<B, D>, transform: &T) -> Result<burn::tensor::Tensor<B, 1>> {
        let loss = self.metric.forward(fixed, moving, transform)?;
        Ok(match &self.penalty {
            Some(penalty) => loss + penalty.compute_loss(transform),
            None => loss,
        })
    }

    /// Optimize `transform` for `iterations` steps.
    ///
    /// Fails as soon as the loss is not finite. Whether the final loss is
    /// acceptable is left to the caller.
    pub fn execute(
        &mut self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        mut transform: T,
        iterations: usize,
        learning_rate: f64,
    ) -> Result<RegistrationOutcome<T>> {
        self.optimizer.set_learning_rate(learning_rate);
        let mut history = Vec::with_capacity(iterations);

        for i in 0..iterations {
            // Forward pass
            let loss = self.loss(fixed, moving, &transform)?;
            let value = to_host_scalar(loss.clone())?;
            history.push(value);

            if !value.is_finite() {
                return Err(RegistrationError::NonConvergence {
                    iterations: i,
                    initial_loss: history[0],
                    final_loss: value,
                });
            }

            // Log loss periodically
            if i % LOG_INTERVAL == 0 {
                info!(metric = self.metric.name(), "Iteration {}: Loss {:.6}", i, value);
            }

            // Backward pass
            let grads = loss.backward();
            let grads_params = GradientsParams::from_grads(grads, &transform);

            // Optimizer step
            transform = self.optimizer.step(transform, grads_params);
        }

        let final_loss = to_host_scalar(self.loss(fixed, moving, &transform)?)?;
        let initial_loss = history.first().copied().unwrap_or(final_loss);
        debug!(iterations, initial_loss, final_loss, "optimization finished");

        Ok(RegistrationOutcome {
            transform,
            initial_loss,
            final_loss,
            history,
        })
    }
}
