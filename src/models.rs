use serde::Serialize;

use crate::classifier::{Label, ModelInfo};
use crate::features::{FeatureRow, FeatureValue, FieldSpec, PredictionRequest, FIELDS};
use crate::presenter::Verdict;

/// API Response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

/// Prediction payload of POST /api/predict
#[derive(Debug, Serialize)]
pub struct PredictionData {
    pub request_id: String,
    pub label: Label,
    pub probability_of_purchase: f64,
    pub verdict: &'static str,
    pub confidence: f64,
    pub confidence_text: String,
    pub predicted_at: String,
}

impl PredictionData {
    pub fn new(request_id: String, verdict: Verdict, predicted_at: String) -> Self {
        Self {
            request_id,
            label: verdict.label,
            probability_of_purchase: verdict.probability_of_purchase,
            verdict: verdict.verdict,
            confidence: verdict.confidence,
            confidence_text: verdict.confidence_text,
            predicted_at,
        }
    }
}

/// Field catalogue entry with its collector default
#[derive(Debug, Serialize)]
pub struct SchemaField {
    #[serde(flatten)]
    pub spec: FieldSpec,
    pub dtype: crate::features::Dtype,
    pub default: FeatureValue,
}

/// Payload of GET /api/schema
#[derive(Debug, Serialize)]
pub struct SchemaData {
    pub fields: Vec<SchemaField>,
    pub model: ModelInfo,
}

impl SchemaData {
    pub fn new(model: ModelInfo) -> Self {
        let defaults = FeatureRow::from_request(&PredictionRequest::default());
        let fields = FIELDS
            .iter()
            .zip(defaults.cells())
            .map(|(spec, (_, value))| SchemaField {
                spec: *spec,
                dtype: spec.kind.dtype(),
                default: value.clone(),
            })
            .collect();

        Self { fields, model }
    }
}
