use anyhow::Context;
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod classifier;
mod config;
mod error;
mod features;
mod form;
mod models;
mod prediction;
mod presenter;


use classifier::{schema_drift, Classifier, ModelInfo, PipelineModel};
use config::Config;
use features::PredictionRequest;
use form::{parse_form, render_page, values_from_form, values_from_request, PageState, RawForm};
use models::{ApiResponse, PredictionData, SchemaData};
use prediction::run_prediction;

/// Purchase-intention prediction service
/// The classifier is loaded once and never mutated
#[derive(Clone)]
struct AppState {
    classifier: Arc<dyn Classifier>,
    model: ModelInfo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "purchase_intent=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    let model = PipelineModel::load(&config.model_path)
        .with_context(|| format!("Failed to load model from {}", config.model_path.display()))?;
    tracing::info!(
        name = %model.info().name,
        version = %model.info().version,
        estimator = model.info().estimator,
        "Loaded classifier"
    );
    for drift in schema_drift(model.schema()) {
        tracing::warn!("Model schema differs from the form: {}", drift);
    }

    let state = AppState {
        model: model.info().clone(),
        classifier: Arc::new(model),
    };

    let app = app(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/predict", post(submit_form))
        .route("/api/predict", post(predict_json))
        .route("/api/schema", get(get_schema))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Empty form, defaults prefilled
async fn index() -> Html<String> {
    let values = values_from_request(&PredictionRequest::default());
    Html(render_page(&values, PageState::Idle))
}

/// Form submission from the "Predict Purchase" button
async fn submit_form(
    State(state): State<AppState>,
    form: Result<Form<RawForm>, FormRejection>,
) -> (StatusCode, Html<String>) {
    let raw = match form {
        Ok(Form(raw)) => raw,
        Err(rejection) => {
            tracing::warn!("Rejected form body: {}", rejection.body_text());
            let message = rejection.body_text();
            let values = values_from_request(&PredictionRequest::default());
            return (
                rejection.status(),
                Html(render_page(&values, PageState::Failed(&message))),
            );
        }
    };

    let request_id = Uuid::new_v4();

    let outcome = parse_form(&raw).and_then(|request| {
        let verdict = run_prediction(state.classifier.as_ref(), &request)?;
        Ok((request, verdict))
    });

    match outcome {
        Ok((request, verdict)) => {
            tracing::info!(
                %request_id,
                label = verdict.label.as_u8(),
                p1 = verdict.probability_of_purchase,
                "Form prediction served"
            );
            let page = render_page(&values_from_request(&request), PageState::Predicted(&verdict));
            (StatusCode::OK, Html(page))
        }
        Err(e) => {
            log_failure(request_id, &e);
            let message = e.to_string();
            let page = render_page(&values_from_form(&raw), PageState::Failed(&message));
            (e.status_code(), Html(page))
        }
    }
}

/// JSON prediction endpoint
async fn predict_json(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("Rejected prediction body: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(ApiResponse::<()>::error(rejection.body_text())),
            )
                .into_response();
        }
    };

    let request_id = Uuid::new_v4();
    match run_prediction(state.classifier.as_ref(), &request) {
        Ok(verdict) => {
            tracing::info!(
                %request_id,
                label = verdict.label.as_u8(),
                p1 = verdict.probability_of_purchase,
                "Prediction served"
            );
            let data = PredictionData::new(request_id.to_string(), verdict, Utc::now().to_rfc3339());
            (StatusCode::OK, Json(ApiResponse::success("Prediction complete", data))).into_response()
        }
        Err(e) => {
            log_failure(request_id, &e);
            e.into_response()
        }
    }
}

fn log_failure(request_id: Uuid, e: &error::PredictionError) {
    if e.is_client_error() {
        tracing::warn!(%request_id, "Prediction rejected: {}", e);
    } else {
        tracing::error!(%request_id, "Prediction failed: {}", e);
    }
}

/// Field catalogue for API clients
async fn get_schema(State(state): State<AppState>) -> Json<ApiResponse<SchemaData>> {
    Json(ApiResponse::success(
        "Field catalogue",
        SchemaData::new(state.model.clone()),
    ))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "model": state.model,
    }))
}
