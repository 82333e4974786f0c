use crate::optimizer::Optimizer;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer as BurnOptimizer};
use burn::tensor::backend::AutodiffBackend;

/// Adam optimizer.
///
/// A wrapper around Burn's Adam optimizer. Adam normalises each parameter's
/// step by its gradient history, so the learning rate is roughly the
/// per-iteration step in parameter units.
pub struct AdamOptimizer<M: AutodiffModule<B>, B: AutodiffBackend> {
    optimizer: OptimizerAdaptor<Adam, M, B>,
    learning_rate: f64,
    steps: usize,
}

impl<M: AutodiffModule<B>, B: AutodiffBackend> AdamOptimizer<M, B> {
    /// Create a new Adam optimizer with burn's default moments.
    pub fn new(learning_rate: f64) -> Self {
        Self::from_config(AdamConfig::new(), learning_rate)
    }

    /// Create a new Adam optimizer with custom beta values.
    pub fn with_betas(learning_rate: f64, beta_1: f32, beta_2: f32) -> Self {
        Self::from_config(AdamConfig::new().with_beta_1(beta_1).with_beta_2(beta_2), learning_rate)
    }

    fn from_config(config: AdamConfig, learning_rate: f64) -> Self {
        Self {
            optimizer: config.init(),
            learning_rate,
            steps: 0,
        }
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl<M, B> Optimizer<M, B> for AdamOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        self.steps += 1;
        self.optimizer.step(self.learning_rate, module, gradients)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
