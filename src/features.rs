use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::PredictionError;

/// Column dtype as the classifier sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    Int,
    Float,
    Str,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::Int => write!(f, "int"),
            Dtype::Float => write!(f, "float"),
            Dtype::Str => write!(f, "str"),
        }
    }
}

/// How a field is collected from the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Non-negative integer (page counts)
    Count,
    /// Non-negative float (durations, rates, values)
    Amount,
    /// Closed integer choice
    Range { min: u8, max: u8 },
    /// Closed string choice
    Options { values: &'static [&'static str] },
}

impl FieldKind {
    pub fn dtype(&self) -> Dtype {
        match self {
            FieldKind::Count | FieldKind::Range { .. } => Dtype::Int,
            FieldKind::Amount => Dtype::Float,
            FieldKind::Options { .. } => Dtype::Str,
        }
    }
}

/// Form section a field is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Behavior,
    Technical,
}

/// One entry of the field catalogue
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub column: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub section: Section,
}

const fn field(column: &'static str, label: &'static str, kind: FieldKind, section: Section) -> FieldSpec {
    FieldSpec {
        column,
        label,
        kind,
        section,
    }
}

/// The 17 session attributes, in the column order the classifier was fit on.
pub const FIELDS: [FieldSpec; 17] = [
    field("Administrative", "Administrative Pages", FieldKind::Count, Section::Behavior),
    field("Administrative_Duration", "Administrative Duration", FieldKind::Amount, Section::Behavior),
    field("Informational", "Informational Pages", FieldKind::Count, Section::Behavior),
    field("Informational_Duration", "Informational Duration", FieldKind::Amount, Section::Behavior),
    field("ProductRelated", "Product Related Pages", FieldKind::Count, Section::Behavior),
    field("ProductRelated_Duration", "Product Related Duration", FieldKind::Amount, Section::Behavior),
    field("BounceRates", "Bounce Rate", FieldKind::Amount, Section::Behavior),
    field("ExitRates", "Exit Rate", FieldKind::Amount, Section::Behavior),
    field("PageValues", "Page Value", FieldKind::Amount, Section::Behavior),
    field("SpecialDay", "Special Day", FieldKind::Amount, Section::Behavior),
    field("Weekend", "Weekend", FieldKind::Range { min: Weekend::MIN, max: Weekend::MAX }, Section::Behavior),
    field("OperatingSystems", "Operating System", FieldKind::Range { min: OperatingSystem::MIN, max: OperatingSystem::MAX }, Section::Technical),
    field("Browser", "Browser", FieldKind::Range { min: Browser::MIN, max: Browser::MAX }, Section::Technical),
    field("Region", "Region", FieldKind::Range { min: Region::MIN, max: Region::MAX }, Section::Technical),
    field("TrafficType", "Traffic Type", FieldKind::Range { min: TrafficType::MIN, max: TrafficType::MAX }, Section::Technical),
    field("Month", "Month", FieldKind::Options { values: Month::NAMES }, Section::Technical),
    field("VisitorType", "Visitor Type", FieldKind::Options { values: VisitorType::NAMES }, Section::Technical),
];

/// Integer id restricted to a closed range.
/// Deserialization rejects anything outside `MIN..=MAX`.
macro_rules! categorical_id {
    ($name:ident, $column:literal, $min:literal, $max:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(u8);

        impl $name {
            pub const MIN: u8 = $min;
            pub const MAX: u8 = $max;

            pub fn new(id: i64) -> Result<Self, PredictionError> {
                if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&id) {
                    Ok(Self(id as u8))
                } else {
                    Err(PredictionError::out_of_domain(
                        $column,
                        format!("{} is not one of {}..={}", id, Self::MIN, Self::MAX),
                    ))
                }
            }

            pub fn get(self) -> u8 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(Self::MIN)
            }
        }

        impl TryFrom<i64> for $name {
            type Error = PredictionError;

            fn try_from(id: i64) -> Result<Self, Self::Error> {
                Self::new(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                i64::from(id.0)
            }
        }
    };
}

categorical_id!(Weekend, "Weekend", 0, 1);
categorical_id!(OperatingSystem, "OperatingSystems", 1, 8);
categorical_id!(Browser, "Browser", 1, 13);
categorical_id!(Region, "Region", 1, 9);
categorical_id!(TrafficType, "TrafficType", 1, 20);

/// String enum restricted to a closed set of spellings.
/// The first variant is the default.
macro_rules! closed_choice {
    ($name:ident, $column:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::ALL[0]
            }
        }

        impl FromStr for $name {
            type Err = PredictionError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|choice| choice.as_str() == raw)
                    .ok_or_else(|| unknown_choice($column, raw, Self::NAMES))
            }
        }

        impl TryFrom<String> for $name {
            type Error = PredictionError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                raw.parse()
            }
        }

        impl From<$name> for &'static str {
            fn from(choice: $name) -> &'static str {
                choice.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_choice!(Month, "Month", {
    Feb => "Feb",
    Mar => "Mar",
    May => "May",
    June => "June",
    Jul => "Jul",
    Aug => "Aug",
    Sep => "Sep",
    Oct => "Oct",
    Nov => "Nov",
    Dec => "Dec",
});

closed_choice!(VisitorType, "VisitorType", {
    ReturningVisitor => "Returning_Visitor",
    NewVisitor => "New_Visitor",
    Other => "Other",
});

const SUGGESTION_THRESHOLD: f64 = 0.7;

fn unknown_choice(column: &str, raw: &str, allowed: &[&str]) -> PredictionError {
    let needle = raw.to_lowercase();
    let closest = allowed
        .iter()
        .map(|candidate| (candidate, strsim::jaro_winkler(&needle, &candidate.to_lowercase())))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let reason = match closest {
        Some((candidate, _)) => format!("unknown value '{}', did you mean '{}'?", raw, candidate),
        None => format!("unknown value '{}', expected one of {}", raw, allowed.join(", ")),
    };
    PredictionError::out_of_domain(column, reason)
}

/// One session as collected from the operator.
/// Omitted fields take the collector defaults; unknown names are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictionRequest {
    #[serde(rename = "Administrative")]
    pub administrative: i64,
    #[serde(rename = "Administrative_Duration")]
    pub administrative_duration: f64,
    #[serde(rename = "Informational")]
    pub informational: i64,
    #[serde(rename = "Informational_Duration")]
    pub informational_duration: f64,
    #[serde(rename = "ProductRelated")]
    pub product_related: i64,
    #[serde(rename = "ProductRelated_Duration")]
    pub product_related_duration: f64,
    #[serde(rename = "BounceRates")]
    pub bounce_rates: f64,
    #[serde(rename = "ExitRates")]
    pub exit_rates: f64,
    #[serde(rename = "PageValues")]
    pub page_values: f64,
    #[serde(rename = "SpecialDay")]
    pub special_day: f64,
    #[serde(rename = "Weekend")]
    pub weekend: Weekend,
    #[serde(rename = "OperatingSystems")]
    pub operating_systems: OperatingSystem,
    #[serde(rename = "Browser")]
    pub browser: Browser,
    #[serde(rename = "Region")]
    pub region: Region,
    #[serde(rename = "TrafficType")]
    pub traffic_type: TrafficType,
    #[serde(rename = "Month")]
    pub month: Month,
    #[serde(rename = "VisitorType")]
    pub visitor_type: VisitorType,
}

impl Default for PredictionRequest {
    fn default() -> Self {
        Self {
            administrative: 0,
            administrative_duration: 0.0,
            informational: 0,
            informational_duration: 0.0,
            product_related: 0,
            product_related_duration: 0.0,
            bounce_rates: 0.0,
            exit_rates: 0.0,
            page_values: 0.0,
            special_day: 0.0,
            weekend: Weekend::default(),
            operating_systems: OperatingSystem::default(),
            browser: Browser::default(),
            region: Region::default(),
            traffic_type: TrafficType::default(),
            month: Month::default(),
            visitor_type: VisitorType::default(),
        }
    }
}

impl PredictionRequest {
    /// Range check on the numeric fields. Negative input is rejected, not
    /// clamped. Fields are not checked against each other.
    pub fn validate(&self) -> Result<(), PredictionError> {
        let counts = [
            ("Administrative", self.administrative),
            ("Informational", self.informational),
            ("ProductRelated", self.product_related),
        ];
        for (column, value) in counts {
            if value < 0 {
                return Err(PredictionError::out_of_domain(
                    column,
                    format!("must be non-negative, got {}", value),
                ));
            }
        }

        let amounts = [
            ("Administrative_Duration", self.administrative_duration),
            ("Informational_Duration", self.informational_duration),
            ("ProductRelated_Duration", self.product_related_duration),
            ("BounceRates", self.bounce_rates),
            ("ExitRates", self.exit_rates),
            ("PageValues", self.page_values),
            ("SpecialDay", self.special_day),
        ];
        for (column, value) in amounts {
            if !value.is_finite() {
                return Err(PredictionError::out_of_domain(
                    column,
                    format!("must be a finite number, got {}", value),
                ));
            }
            if value < 0.0 {
                return Err(PredictionError::out_of_domain(
                    column,
                    format!("must be non-negative, got {}", value),
                ));
            }
        }

        Ok(())
    }
}

/// A single cell value of the feature row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FeatureValue {
    pub fn dtype(&self) -> Dtype {
        match self {
            FeatureValue::Int(_) => Dtype::Int,
            FeatureValue::Float(_) => Dtype::Float,
            FeatureValue::Str(_) => Dtype::Str,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Str(v) => f.write_str(v),
        }
    }
}

/// One row of tabular classifier input: named, typed cells in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    cells: Vec<(String, FeatureValue)>,
}

impl FeatureRow {
    /// Lays the request out in `FIELDS` order. Values pass through
    /// unencoded; the model artifact owns any categorical encoding.
    pub fn from_request(request: &PredictionRequest) -> Self {
        use FeatureValue::{Float, Int, Str};

        let values = [
            Int(request.administrative),
            Float(request.administrative_duration),
            Int(request.informational),
            Float(request.informational_duration),
            Int(request.product_related),
            Float(request.product_related_duration),
            Float(request.bounce_rates),
            Float(request.exit_rates),
            Float(request.page_values),
            Float(request.special_day),
            Int(request.weekend.into()),
            Int(request.operating_systems.into()),
            Int(request.browser.into()),
            Int(request.region.into()),
            Int(request.traffic_type.into()),
            Str(request.month.as_str().to_string()),
            Str(request.visitor_type.as_str().to_string()),
        ];

        let cells = FIELDS
            .iter()
            .zip(values)
            .map(|(spec, value)| (spec.column.to_string(), value))
            .collect();

        Self { cells }
    }

    #[cfg(test)]
    pub fn from_cells(cells: Vec<(String, FeatureValue)>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[(String, FeatureValue)] {
        &self.cells
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

impl Serialize for FeatureRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
