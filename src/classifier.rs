use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ArtifactLoadError, PredictionError};
use crate::features::{Dtype, FeatureRow, FeatureValue, FIELDS};

const SUPPORTED_FORMAT_VERSION: u32 = 1;
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Binary purchase-intention label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum Label {
    NoPurchase,
    Purchase,
}

impl Label {
    pub fn as_u8(self) -> u8 {
        match self {
            Label::NoPurchase => 0,
            Label::Purchase => 1,
        }
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> u8 {
        label.as_u8()
    }
}

/// A trained binary classifier over a single feature row.
/// Implementations are immutable once loaded and shared across requests.
pub trait Classifier: Send + Sync {
    fn predict(&self, row: &FeatureRow) -> Result<Label, PredictionError>;

    /// `[p(label = 0), p(label = 1)]`, summing to 1
    fn predict_proba(&self, row: &FeatureRow) -> Result<[f64; 2], PredictionError>;
}

/// Column the model was fit on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub dtype: Dtype,
}

/// Descriptive metadata reported by /health
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub estimator: &'static str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Category {
    Int(i64),
    Str(String),
}

impl Category {
    fn matches(&self, value: &FeatureValue) -> bool {
        match (self, value) {
            (Category::Int(c), FeatureValue::Int(v)) => c == v,
            (Category::Str(c), FeatureValue::Str(v)) => c == v,
            _ => false,
        }
    }

    fn dtype(&self) -> Dtype {
        match self {
            Category::Int(_) => Dtype::Int,
            Category::Str(_) => Dtype::Str,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HandleUnknown {
    #[default]
    Error,
    Ignore,
}

/// Per-column encoding step
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Transform {
    Passthrough {
        column: String,
    },
    StandardScaler {
        column: String,
        mean: f64,
        scale: f64,
    },
    OneHot {
        column: String,
        categories: Vec<Category>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
    },
    Ordinal {
        column: String,
        categories: Vec<Category>,
    },
}

impl Transform {
    fn column(&self) -> &str {
        match self {
            Transform::Passthrough { column }
            | Transform::StandardScaler { column, .. }
            | Transform::OneHot { column, .. }
            | Transform::Ordinal { column, .. } => column,
        }
    }

    fn width(&self) -> usize {
        match self {
            Transform::OneHot { categories, .. } => categories.len(),
            _ => 1,
        }
    }

    fn validate(&self, dtype: Dtype) -> Result<(), String> {
        let column = self.column();
        match self {
            Transform::Passthrough { .. } | Transform::StandardScaler { .. } if dtype == Dtype::Str => {
                Err(format!("column '{}' is str and cannot be used as a number", column))
            }
            Transform::StandardScaler { mean, scale, .. } => {
                if !mean.is_finite() || !scale.is_finite() || *scale == 0.0 {
                    Err(format!("column '{}' has an invalid scaler (mean {}, scale {})", column, mean, scale))
                } else {
                    Ok(())
                }
            }
            Transform::OneHot { categories, .. } | Transform::Ordinal { categories, .. } => {
                if categories.is_empty() {
                    return Err(format!("column '{}' has no categories", column));
                }
                match categories.iter().find(|c| c.dtype() != dtype) {
                    Some(category) => Err(format!(
                        "column '{}' is {} but has category {:?}",
                        column, dtype, category
                    )),
                    None => Ok(()),
                }
            }
            Transform::Passthrough { .. } => Ok(()),
        }
    }

    fn encode(&self, value: &FeatureValue, out: &mut Vec<f64>) -> Result<(), PredictionError> {
        match self {
            Transform::Passthrough { column } => out.push(numeric(column, value)?),
            Transform::StandardScaler { column, mean, scale } => {
                out.push((numeric(column, value)? - mean) / scale)
            }
            Transform::OneHot {
                column,
                categories,
                handle_unknown,
            } => {
                let hit = categories.iter().position(|c| c.matches(value));
                if hit.is_none() && *handle_unknown == HandleUnknown::Error {
                    return Err(unknown_category(column, value));
                }
                out.extend((0..categories.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
            }
            Transform::Ordinal { column, categories } => {
                let index = categories
                    .iter()
                    .position(|c| c.matches(value))
                    .ok_or_else(|| unknown_category(column, value))?;
                out.push(index as f64);
            }
        }
        Ok(())
    }
}

fn numeric(column: &str, value: &FeatureValue) -> Result<f64, PredictionError> {
    match value {
        FeatureValue::Int(v) => Ok(*v as f64),
        FeatureValue::Float(v) => Ok(*v),
        FeatureValue::Str(_) => Err(PredictionError::SchemaMismatch(format!(
            "column '{}' holds a string where a number is expected",
            column
        ))),
    }
}

fn unknown_category(column: &str, value: &FeatureValue) -> PredictionError {
    PredictionError::SchemaMismatch(format!(
        "column '{}' has category '{}' the model was not fit on",
        column, value
    ))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: [f64; 2],
    },
}

#[derive(Debug, Deserialize)]
struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Children must come after their parent, so every walk terminates.
    fn validate(&self, width: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= width {
                        return Err(format!("node {} splits on feature {} of {}", idx, feature, width));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", idx));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(format!("node {} points at invalid child {}", idx, child));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    let total: f64 = value.iter().sum();
                    if value.iter().any(|w| !w.is_finite() || *w < 0.0) || total <= 0.0 {
                        return Err(format!("leaf {} has invalid class weights {:?}", idx, value));
                    }
                }
            }
        }
        Ok(())
    }

    fn proba(&self, x: &[f64]) -> [f64; 2] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if x[*feature] <= *threshold { *left } else { *right },
                TreeNode::Leaf { value } => {
                    let total = value[0] + value[1];
                    return [value[0] / total, value[1] / total];
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Estimator {
    LogisticRegression { coefficients: Vec<f64>, intercept: f64 },
    RandomForest { trees: Vec<DecisionTree> },
}

impl Estimator {
    fn kind(&self) -> &'static str {
        match self {
            Estimator::LogisticRegression { .. } => "logistic_regression",
            Estimator::RandomForest { .. } => "random_forest",
        }
    }

    fn validate(&self, width: usize) -> Result<(), String> {
        match self {
            Estimator::LogisticRegression {
                coefficients,
                intercept,
            } => {
                if coefficients.len() != width {
                    return Err(format!(
                        "estimator expects {} inputs but the preprocessor produces {}",
                        coefficients.len(),
                        width
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("logistic regression has non-finite weights".to_string());
                }
                Ok(())
            }
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err("random forest has no trees".to_string());
                }
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate(width).map_err(|e| format!("tree {}: {}", i, e))?;
                }
                Ok(())
            }
        }
    }

    fn proba(&self, x: &[f64]) -> [f64; 2] {
        match self {
            Estimator::LogisticRegression {
                coefficients,
                intercept,
            } => {
                let z = intercept + coefficients.iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
                let p1 = sigmoid(z);
                [1.0 - p1, p1]
            }
            Estimator::RandomForest { trees } => {
                let mut sum = [0.0, 0.0];
                for tree in trees {
                    let p = tree.proba(x);
                    sum[0] += p[0];
                    sum[1] += p[1];
                }
                let n = trees.len() as f64;
                [sum[0] / n, sum[1] / n]
            }
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn default_threshold() -> f64 {
    0.5
}

/// On-disk artifact layout (JSON)
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    name: String,
    version: String,
    schema: Vec<SchemaColumn>,
    preprocessor: Vec<Transform>,
    estimator: Estimator,
    #[serde(default = "default_threshold")]
    decision_threshold: f64,
}

/// Preprocessing + estimator pipeline loaded from a single artifact file.
/// The artifact declares the schema it was fit on and owns the
/// categorical encoding, so rows arrive with raw values.
#[derive(Debug)]
pub struct PipelineModel {
    info: ModelInfo,
    schema: Vec<SchemaColumn>,
    preprocessor: Vec<Transform>,
    estimator: Estimator,
    decision_threshold: f64,
}

impl PipelineModel {
    pub fn load(path: &Path) -> Result<Self, ArtifactLoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&text).map_err(|source| ArtifactLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: ModelArtifact) -> Result<Self, ArtifactLoadError> {
        let incompatible = ArtifactLoadError::Incompatible;

        if artifact.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(incompatible(format!(
                "format version {} is not supported (expected {})",
                artifact.format_version, SUPPORTED_FORMAT_VERSION
            )));
        }
        if artifact.schema.is_empty() {
            return Err(incompatible("schema is empty".to_string()));
        }

        {
            let mut seen = HashSet::new();
            if let Some(dup) = artifact.schema.iter().find(|c| !seen.insert(c.name.as_str())) {
                return Err(incompatible(format!("column '{}' appears twice in the schema", dup.name)));
            }
        }

        if artifact.preprocessor.len() != artifact.schema.len() {
            return Err(incompatible(format!(
                "preprocessor has {} steps for {} columns",
                artifact.preprocessor.len(),
                artifact.schema.len()
            )));
        }
        for (column, transform) in artifact.schema.iter().zip(&artifact.preprocessor) {
            if transform.column() != column.name {
                return Err(incompatible(format!(
                    "preprocessor step for '{}' is out of order (expected '{}')",
                    transform.column(),
                    column.name
                )));
            }
            transform.validate(column.dtype).map_err(incompatible)?;
        }

        let width = artifact.preprocessor.iter().map(Transform::width).sum();
        artifact.estimator.validate(width).map_err(incompatible)?;

        if !(0.0..=1.0).contains(&artifact.decision_threshold) {
            return Err(incompatible(format!(
                "decision threshold {} is outside [0, 1]",
                artifact.decision_threshold
            )));
        }

        Ok(Self {
            info: ModelInfo {
                name: artifact.name,
                version: artifact.version,
                estimator: artifact.estimator.kind(),
            },
            schema: artifact.schema,
            preprocessor: artifact.preprocessor,
            estimator: artifact.estimator,
            decision_threshold: artifact.decision_threshold,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn schema(&self) -> &[SchemaColumn] {
        &self.schema
    }

    fn check_row(&self, row: &FeatureRow) -> Result<(), PredictionError> {
        if row.len() != self.schema.len() {
            return Err(PredictionError::SchemaMismatch(format!(
                "row has {} columns, model expects {}",
                row.len(),
                self.schema.len()
            )));
        }
        for (idx, ((name, value), expected)) in row.cells().iter().zip(&self.schema).enumerate() {
            if *name != expected.name {
                return Err(PredictionError::SchemaMismatch(format!(
                    "column {} is '{}', model expects '{}'",
                    idx, name, expected.name
                )));
            }
            if value.dtype() != expected.dtype {
                return Err(PredictionError::SchemaMismatch(format!(
                    "column '{}' is {}, model expects {}",
                    name,
                    value.dtype(),
                    expected.dtype
                )));
            }
        }
        Ok(())
    }

    fn encode(&self, row: &FeatureRow) -> Result<Vec<f64>, PredictionError> {
        let mut x = Vec::with_capacity(self.schema.len());
        for ((_, value), transform) in row.cells().iter().zip(&self.preprocessor) {
            transform.encode(value, &mut x)?;
        }
        Ok(x)
    }
}

impl Classifier for PipelineModel {
    fn predict(&self, row: &FeatureRow) -> Result<Label, PredictionError> {
        let [_, p1] = self.predict_proba(row)?;
        // ties go to class 0, same as argmax
        Ok(if p1 > self.decision_threshold {
            Label::Purchase
        } else {
            Label::NoPurchase
        })
    }

    fn predict_proba(&self, row: &FeatureRow) -> Result<[f64; 2], PredictionError> {
        self.check_row(row)?;
        let x = self.encode(row)?;
        let proba = self.estimator.proba(&x);

        let in_range = |p: f64| p.is_finite() && (-PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE).contains(&p);
        if !proba.iter().all(|p| in_range(*p)) || (proba[0] + proba[1] - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(PredictionError::InvalidOutput(format!(
                "probabilities {:?} are not a distribution",
                proba
            )));
        }
        Ok(proba)
    }
}

/// Differences between a model schema and the columns the row builder
/// produces. Empty when they agree.
pub fn schema_drift(schema: &[SchemaColumn]) -> Vec<String> {
    let mut drift = Vec::new();
    if schema.len() != FIELDS.len() {
        drift.push(format!("model has {} columns, form has {}", schema.len(), FIELDS.len()));
    }
    for (idx, (column, spec)) in schema.iter().zip(FIELDS.iter()).enumerate() {
        if column.name != spec.column || column.dtype != spec.kind.dtype() {
            drift.push(format!(
                "column {}: model has {} {}, form has {} {}",
                idx,
                column.name,
                column.dtype,
                spec.column,
                spec.kind.dtype()
            ));
        }
    }
    drift
}
