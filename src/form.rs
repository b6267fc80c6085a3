//! HTML input collector and result region.

use std::collections::HashMap;
use std::fmt::Write;

use crate::error::PredictionError;
use crate::features::{
    Browser, FeatureRow, FieldKind, FieldSpec, OperatingSystem, PredictionRequest, Region, Section,
    TrafficType, Weekend, FIELDS,
};
use crate::presenter::Verdict;

/// What the result region shows
#[derive(Debug, Clone, Copy)]
pub enum PageState<'a> {
    /// Awaiting the trigger
    Idle,
    Predicted(&'a Verdict),
    Failed(&'a str),
}

/// Submitted form fields as raw strings, keyed by column name
pub type RawForm = HashMap<String, String>;

/// Builds a request from submitted form fields. Missing fields keep
/// their defaults, unknown keys are ignored.
pub fn parse_form(form: &RawForm) -> Result<PredictionRequest, PredictionError> {
    let mut request = PredictionRequest::default();
    for spec in FIELDS.iter() {
        if let Some(raw) = form.get(spec.column) {
            set_field(&mut request, spec.column, raw.trim())?;
        }
    }
    Ok(request)
}

fn set_field(request: &mut PredictionRequest, column: &str, raw: &str) -> Result<(), PredictionError> {
    match column {
        "Administrative" => request.administrative = parse_int(column, raw)?,
        "Administrative_Duration" => request.administrative_duration = parse_float(column, raw)?,
        "Informational" => request.informational = parse_int(column, raw)?,
        "Informational_Duration" => request.informational_duration = parse_float(column, raw)?,
        "ProductRelated" => request.product_related = parse_int(column, raw)?,
        "ProductRelated_Duration" => request.product_related_duration = parse_float(column, raw)?,
        "BounceRates" => request.bounce_rates = parse_float(column, raw)?,
        "ExitRates" => request.exit_rates = parse_float(column, raw)?,
        "PageValues" => request.page_values = parse_float(column, raw)?,
        "SpecialDay" => request.special_day = parse_float(column, raw)?,
        "Weekend" => request.weekend = Weekend::new(parse_int(column, raw)?)?,
        "OperatingSystems" => request.operating_systems = OperatingSystem::new(parse_int(column, raw)?)?,
        "Browser" => request.browser = Browser::new(parse_int(column, raw)?)?,
        "Region" => request.region = Region::new(parse_int(column, raw)?)?,
        "TrafficType" => request.traffic_type = TrafficType::new(parse_int(column, raw)?)?,
        "Month" => request.month = raw.parse()?,
        "VisitorType" => request.visitor_type = raw.parse()?,
        _ => {}
    }
    Ok(())
}

fn parse_int(column: &str, raw: &str) -> Result<i64, PredictionError> {
    raw.parse()
        .map_err(|_| PredictionError::out_of_domain(column, format!("'{}' is not an integer", raw)))
}

fn parse_float(column: &str, raw: &str) -> Result<f64, PredictionError> {
    raw.parse()
        .map_err(|_| PredictionError::out_of_domain(column, format!("'{}' is not a number", raw)))
}

/// Display values for every field, in column order
pub fn values_from_request(request: &PredictionRequest) -> Vec<String> {
    FeatureRow::from_request(request)
        .cells()
        .iter()
        .map(|(_, value)| value.to_string())
        .collect()
}

/// Display values echoing what was submitted, defaults for the rest
pub fn values_from_form(form: &RawForm) -> Vec<String> {
    let defaults = values_from_request(&PredictionRequest::default());
    FIELDS
        .iter()
        .zip(defaults)
        .map(|(spec, default)| form.get(spec.column).cloned().unwrap_or(default))
        .collect()
}

const STYLE: &str = r#"
body { font-family: sans-serif; background-color: #f6f8fb; margin: 0; }
main { max-width: 760px; margin: 0 auto; padding: 24px; }
.title-text { text-align: center; font-size: 36px; font-weight: 700; color: #1f2937; }
.subtitle-text { text-align: center; font-size: 16px; color: #4b5563; margin-bottom: 30px; }
.block { background-color: white; padding: 25px; border-radius: 12px; box-shadow: 0 4px 14px rgba(0,0,0,0.08); margin-bottom: 25px; }
.grid { display: grid; grid-template-columns: 1fr 1fr; gap: 12px 24px; }
label { display: block; font-size: 14px; color: #374151; }
input, select { width: 100%; padding: 6px; box-sizing: border-box; }
button { width: 100%; background-color: #2563eb; color: white; font-size: 18px; padding: 10px; border: 0; border-radius: 10px; }
button:hover { background-color: #1d4ed8; }
.result { margin-top: 25px; padding: 16px; border-radius: 10px; white-space: pre-line; }
.positive { background-color: #dcfce7; color: #166534; }
.negative, .failed { background-color: #fee2e2; color: #991b1b; }
"#;

// Any edit drops the result region; a new prediction needs the button again.
const SCRIPT: &str = r#"
const form = document.getElementById('predict-form');
const clearResult = () => { const r = document.getElementById('result'); if (r) r.remove(); };
form.addEventListener('input', clearResult);
form.addEventListener('change', clearResult);
"#;

pub fn render_page(values: &[String], state: PageState<'_>) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Online Shoppers Prediction</title>\n");
    let _ = write!(html, "<style>{}</style>\n</head>\n<body>\n<main>\n", STYLE);
    html.push_str("<div class=\"title-text\">&#128722; Online Shoppers Purchase Prediction</div>\n");
    html.push_str(
        "<div class=\"subtitle-text\">Machine Learning model to predict customer buying intention</div>\n",
    );
    html.push_str("<form id=\"predict-form\" method=\"post\" action=\"/predict\">\n");

    for (section, heading) in [
        (Section::Behavior, "User Behavior Information"),
        (Section::Technical, "Technical &amp; Visit Details"),
    ] {
        let _ = write!(html, "<div class=\"block\">\n<h3>{}</h3>\n<div class=\"grid\">\n", heading);
        for (spec, value) in FIELDS.iter().zip(values) {
            if spec.section == section {
                render_field(&mut html, spec, value);
            }
        }
        html.push_str("</div>\n</div>\n");
    }

    html.push_str("<button type=\"submit\">Predict Purchase</button>\n</form>\n");
    render_result(&mut html, state);
    let _ = write!(html, "</main>\n<script>{}</script>\n</body>\n</html>\n", SCRIPT);
    html
}

fn render_field(html: &mut String, spec: &FieldSpec, value: &str) {
    let column = spec.column;
    let _ = write!(html, "<div><label for=\"{}\">{}</label>", column, spec.label);
    let value = escape(value);
    match spec.kind {
        FieldKind::Count => {
            let _ = write!(
                html,
                "<input type=\"number\" id=\"{0}\" name=\"{0}\" min=\"0\" step=\"1\" value=\"{1}\">",
                column, value
            );
        }
        FieldKind::Amount => {
            let _ = write!(
                html,
                "<input type=\"number\" id=\"{0}\" name=\"{0}\" min=\"0\" step=\"any\" value=\"{1}\">",
                column, value
            );
        }
        FieldKind::Range { min, max } => {
            let options: Vec<String> = (min..=max).map(|id| id.to_string()).collect();
            render_select(html, column, &options, &value);
        }
        FieldKind::Options { values } => {
            let options: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            render_select(html, column, &options, &value);
        }
    }
    html.push_str("</div>\n");
}

fn render_select(html: &mut String, column: &str, options: &[String], selected: &str) {
    let _ = write!(html, "<select id=\"{0}\" name=\"{0}\">", column);
    for option in options {
        let marker = if option == selected { " selected" } else { "" };
        let _ = write!(html, "<option value=\"{0}\"{1}>{0}</option>", option, marker);
    }
    html.push_str("</select>");
}

fn render_result(html: &mut String, state: PageState<'_>) {
    match state {
        PageState::Idle => {}
        PageState::Predicted(verdict) => {
            let (class, icon) = if verdict.is_positive() {
                ("positive", "&#9989;")
            } else {
                ("negative", "&#10060;")
            };
            let _ = write!(
                html,
                "<div id=\"result\" class=\"result {}\">{} {}\n\nConfidence: {}</div>\n",
                class, icon, verdict.verdict, verdict.confidence_text
            );
        }
        PageState::Failed(message) => {
            let _ = write!(
                html,
                "<div id=\"result\" class=\"result failed\">Prediction failed: {}</div>\n",
                escape(message)
            );
        }
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Label;
    use crate::features::{Month, VisitorType};
    use crate::presenter::present;

    fn form(pairs: &[(&str, &str)]) -> RawForm {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn defaults() -> Vec<String> {
        values_from_request(&PredictionRequest::default())
    }

    #[test]
    fn test_idle_page_has_every_field_and_no_result() {
        let html = render_page(&defaults(), PageState::Idle);

        for spec in FIELDS.iter() {
            assert!(html.contains(&format!("name=\"{}\"", spec.column)), "{}", spec.column);
        }
        assert!(html.contains("Predict Purchase"));
        assert!(!html.contains("id=\"result\""));
    }

    #[test]
    fn test_choices_are_closed() {
        let html = render_page(&defaults(), PageState::Idle);

        assert!(html.contains("<select id=\"Month\" name=\"Month\"><option value=\"Feb\" selected>Feb</option>"));
        assert!(html.contains("<option value=\"June\">June</option>"));
        assert!(html.contains("<option value=\"20\">20</option></select>"));
        assert!(!html.contains("<option value=\"21\">"));
        assert!(html.contains("<option value=\"Returning_Visitor\" selected>"));
        assert!(html.contains("id=\"Administrative\" name=\"Administrative\" min=\"0\""));
    }

    #[test]
    fn test_predicted_page_shows_verdict() {
        let verdict = present(Label::Purchase, 0.83);
        let html = render_page(&defaults(), PageState::Predicted(&verdict));

        assert!(html.contains("class=\"result positive\""));
        assert!(html.contains("Likely to Purchase"));
        assert!(html.contains("Confidence: 83.00%"));

        let verdict = present(Label::NoPurchase, 0.20);
        let html = render_page(&defaults(), PageState::Predicted(&verdict));
        assert!(html.contains("Not Likely to Purchase"));
        assert!(html.contains("Confidence: 80.00%"));
    }

    #[test]
    fn test_failed_page_escapes_message() {
        let html = render_page(&defaults(), PageState::Failed("Month: unknown value '<b>'"));
        assert!(html.contains("Prediction failed: Month: unknown value &#39;&lt;b&gt;&#39;"));
    }

    #[test]
    fn test_submitted_values_are_kept() {
        let mut request = PredictionRequest::default();
        request.page_values = 12.5;
        request.month = Month::Nov;
        request.visitor_type = VisitorType::Other;

        let html = render_page(&values_from_request(&request), PageState::Idle);
        assert!(html.contains("name=\"PageValues\" min=\"0\" step=\"any\" value=\"12.5\""));
        assert!(html.contains("<option value=\"Nov\" selected>"));
        assert!(html.contains("<option value=\"Other\" selected>"));
    }

    #[test]
    fn test_parse_form() {
        let request = parse_form(&form(&[
            ("Administrative", "3"),
            ("ExitRates", " 0.05 "),
            ("Browser", "13"),
            ("Month", "Dec"),
            ("VisitorType", "New_Visitor"),
            ("csrf", "ignored"),
        ]))
        .unwrap();

        assert_eq!(request.administrative, 3);
        assert_eq!(request.exit_rates, 0.05);
        assert_eq!(request.browser.get(), 13);
        assert_eq!(request.month, Month::Dec);
        assert_eq!(request.visitor_type, VisitorType::NewVisitor);
        assert_eq!(request.region.get(), 1);
    }

    #[test]
    fn test_parse_form_rejects_bad_values() {
        let err = parse_form(&form(&[("ProductRelated", "many")])).unwrap_err();
        assert_eq!(err, PredictionError::out_of_domain("ProductRelated", "'many' is not an integer"));

        assert!(parse_form(&form(&[("TrafficType", "21")])).is_err());
        assert!(parse_form(&form(&[("Month", "Jan")])).is_err());

        // negatives parse; range checks happen before classification
        let request = parse_form(&form(&[("BounceRates", "-1")])).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_values_from_form_falls_back_to_defaults() {
        let values = values_from_form(&form(&[("Administrative", "abc")]));
        assert_eq!(values.len(), FIELDS.len());
        assert_eq!(values[0], "abc");
        assert_eq!(values[15], "Feb");
    }
}
