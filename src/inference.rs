// =============================================================================
// FEDREC CORE — inference.rs
// Rating prediction from a trained parameter set
// =============================================================================
//
// The model behind `RatingModel` is opaque to the core: it receives an
// encoded FeatureVector and answers with a rating. Failures propagate as
// CodecError::Prediction; there is no retry and no fallback value.
// =============================================================================

use crate::codec::{encode, FeatureMapping, FeatureVector, RawUserAttributes};
use crate::constants::{FEATURE_COUNT, RATING_MAX, RATING_MIN};
use crate::error::CodecError;
use crate::params::GlobalParameters;

pub trait RatingModel: Send + Sync {
    fn predict(&self, vector: &FeatureVector) -> Result<f64, CodecError>;
}

pub fn predict(vector: &FeatureVector, model: &dyn RatingModel) -> Result<f64, CodecError> {
    model.predict(vector)
}

/// Encode raw attributes and score them in one step.
pub fn predict_rating(user: &RawUserAttributes, mapping: &FeatureMapping,
                      model: &dyn RatingModel) -> Result<(FeatureVector, f64), CodecError> {
    let vector = encode(user, mapping)?;
    let rating = predict(&vector, model)?;
    Ok((vector, rating))
}

// -----------------------------------------------------------------------------
// LinearRatingModel — rating = clamp(w · x + b, 0, 5)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LinearRatingModel {
    pub weights: [f64; FEATURE_COUNT],
    pub bias: f64,
}

impl LinearRatingModel {
    /// Expects `[weights (10), bias (1)]`, the layout trained by the
    /// simulation clients.
    pub fn from_parameters(params: &GlobalParameters) -> Result<Self, CodecError> {
        let shapes = params.shapes();
        if shapes != vec![vec![FEATURE_COUNT], vec![1]] {
            return Err(CodecError::Prediction(format!(
                "expected parameter shapes [[{}], [1]], got {:?}", FEATURE_COUNT, shapes)));
        }
        let w = params.flat(0).unwrap_or_default();
        let b = params.flat(1).unwrap_or_default();
        let mut weights = [0.0; FEATURE_COUNT];
        weights.copy_from_slice(&w);
        Ok(LinearRatingModel { weights, bias: b[0] })
    }

    pub fn raw_score(&self, vector: &FeatureVector) -> f64 {
        self.weights.iter().zip(vector.0.iter()).map(|(w, x)| w * x).sum::<f64>() + self.bias
    }
}

impl RatingModel for LinearRatingModel {
    fn predict(&self, vector: &FeatureVector) -> Result<f64, CodecError> {
        let score = self.raw_score(vector);
        if !score.is_finite() {
            return Err(CodecError::Prediction(format!("non-finite score {}", score)));
        }
        Ok(score.clamp(RATING_MIN, RATING_MAX))
    }
}
