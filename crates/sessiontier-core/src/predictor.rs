//! Prediction of the next optimization period.
//!
//! The utility model discounts local memory by the probability that it
//! survives until the next cycle, so the orchestrator needs an estimate of
//! how long that will be. [`IntegratingPredictor`] is an integral controller:
//!
//! ```text
//! error        = previous_prediction - observed      (0 before the first prediction)
//! accumulated += error
//! next         = observed - accumulated
//! ```
//!
//! For a constant observed value the prediction settles on that value.

/// Estimates the next value of an observed series.
pub trait Predictor: Send + std::fmt::Debug {
    fn predict_next(&mut self, observed: f64) -> f64;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegratingPredictor {
    previous: Option<f64>,
    accumulated_error: f64,
}

impl IntegratingPredictor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn accumulated_error(&self) -> f64 {
        self.accumulated_error
    }
}

impl Predictor for IntegratingPredictor {
    fn predict_next(&mut self, observed: f64) -> f64 {
        let error = self.previous.map_or(0.0, |previous| previous - observed);
        self.accumulated_error += error;
        let next = observed - self.accumulated_error;
        self.previous = Some(next);
        next
    }
}
