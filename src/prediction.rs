use crate::classifier::Classifier;
use crate::error::PredictionError;
use crate::features::{FeatureRow, PredictionRequest};
use crate::presenter::{present, Verdict};

/// Collector -> builder -> classifier -> presenter, all or nothing.
pub fn run_prediction(
    classifier: &dyn Classifier,
    request: &PredictionRequest,
) -> Result<Verdict, PredictionError> {
    request.validate()?;

    let row = FeatureRow::from_request(request);
    tracing::debug!(
        row = %serde_json::to_string(&row).unwrap_or_default(),
        "Assembled feature row"
    );

    let label = classifier.predict(&row)?;
    let [_, p1] = classifier.predict_proba(&row)?;

    Ok(present(label, p1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Label, PipelineModel};
    use crate::features::Month;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed answer regardless of input; counts calls
    struct FixedClassifier {
        label: Label,
        proba: [f64; 2],
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(label: Label, p1: f64) -> Self {
            Self {
                label,
                proba: [1.0 - p1, p1],
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, row: &FeatureRow) -> Result<Label, PredictionError> {
            assert_eq!(row.len(), 17);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label)
        }

        fn predict_proba(&self, _row: &FeatureRow) -> Result<[f64; 2], PredictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.proba)
        }
    }

    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn predict(&self, _row: &FeatureRow) -> Result<Label, PredictionError> {
            Err(PredictionError::SchemaMismatch("column 0 is 'Administrative'".to_string()))
        }

        fn predict_proba(&self, _row: &FeatureRow) -> Result<[f64; 2], PredictionError> {
            unreachable!("predict already failed")
        }
    }

    fn bundled() -> PipelineModel {
        PipelineModel::load(&PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("model/purchase_model.json"))
            .unwrap()
    }

    #[test]
    fn test_label_comes_from_classifier() {
        // p1 below 0.5 with a positive label: no independent derivation
        let classifier = FixedClassifier::new(Label::Purchase, 0.4);
        let verdict = run_prediction(&classifier, &PredictionRequest::default()).unwrap();

        assert_eq!(verdict.label, Label::Purchase);
        assert_eq!(verdict.confidence_text, "40.00%");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_out_of_domain_input_never_reaches_classifier() {
        let classifier = FixedClassifier::new(Label::NoPurchase, 0.1);
        let mut request = PredictionRequest::default();
        request.bounce_rates = -0.2;

        let err = run_prediction(&classifier, &request).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_classifier_failure_yields_no_result() {
        let err = run_prediction(&BrokenClassifier, &PredictionRequest::default()).unwrap_err();
        assert!(matches!(err, PredictionError::SchemaMismatch(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_default_scenario_against_bundled_model() {
        let model = bundled();
        let verdict = run_prediction(&model, &PredictionRequest::default()).unwrap();

        assert!(verdict.label.as_u8() <= 1);
        assert!((0.0..=1.0).contains(&verdict.probability_of_purchase));
        assert!(verdict.confidence_text.ends_with('%'));
    }

    #[test]
    fn test_identical_input_identical_verdict() {
        let model = bundled();
        let mut request = PredictionRequest::default();
        request.product_related = 40;
        request.product_related_duration = 1800.0;
        request.page_values = 8.5;
        request.month = Month::Nov;

        let first = run_prediction(&model, &request).unwrap();
        let second = run_prediction(&model, &request).unwrap();
        assert_eq!(first, second);
    }
}
