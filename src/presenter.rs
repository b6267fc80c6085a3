use serde::Serialize;

use crate::classifier::Label;

pub const POSITIVE_VERDICT: &str = "Likely to Purchase";
pub const NEGATIVE_VERDICT: &str = "Not Likely to Purchase";

/// Human-readable outcome of one prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub label: Label,
    pub probability_of_purchase: f64,
    pub verdict: &'static str,
    /// Probability of the predicted class
    pub confidence: f64,
    pub confidence_text: String,
}

impl Verdict {
    pub fn is_positive(&self) -> bool {
        self.label == Label::Purchase
    }
}

/// Confidence is `p1` for a positive label and `1 - p1` otherwise.
pub fn present(label: Label, probability_of_purchase: f64) -> Verdict {
    let (verdict, confidence) = match label {
        Label::Purchase => (POSITIVE_VERDICT, probability_of_purchase),
        Label::NoPurchase => (NEGATIVE_VERDICT, 1.0 - probability_of_purchase),
    };

    Verdict {
        label,
        probability_of_purchase,
        verdict,
        confidence,
        confidence_text: format_percentage(confidence),
    }
}

pub fn format_percentage(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_verdict() {
        let verdict = present(Label::Purchase, 0.83);

        assert!(verdict.is_positive());
        assert_eq!(verdict.verdict, "Likely to Purchase");
        assert_eq!(verdict.confidence_text, "83.00%");
        assert_eq!(verdict.probability_of_purchase, 0.83);
    }

    #[test]
    fn test_negative_verdict_reports_complement() {
        let verdict = present(Label::NoPurchase, 0.20);

        assert!(!verdict.is_positive());
        assert_eq!(verdict.verdict, "Not Likely to Purchase");
        assert_eq!(verdict.confidence_text, "80.00%");
        assert!((verdict.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_label_is_not_rederived() {
        // a threshold other than 0.5 can yield label 1 with p1 < 0.5
        let verdict = present(Label::Purchase, 0.35);
        assert_eq!(verdict.verdict, POSITIVE_VERDICT);
        assert_eq!(verdict.confidence_text, "35.00%");
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(format_percentage(1.0), "100.00%");
        assert_eq!(format_percentage(0.0), "0.00%");
        assert_eq!(format_percentage(0.123456), "12.35%");
    }

    #[test]
    fn test_presenter_is_idempotent() {
        assert_eq!(present(Label::NoPurchase, 0.42), present(Label::NoPurchase, 0.42));
    }
}
