use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use spendcurve_core::analysis::{analyze_channel, sort_analyses, AnalysisSettings, ChannelAnalysis};
use spendcurve_core::curve::FitOptions;
use spendcurve_core::domain::contract::{AnalysisRequestInput, FitModelRequestInput, ScenarioRequestInput};
use spendcurve_core::domain::ScenarioPlan;

#[derive(Debug, Clone)]
pub struct AppState {
    pub default_target_cpa: f64,
    pub fit: FitOptions,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn unprocessable(err: anyhow::Error) -> (StatusCode, String) {
    tracing::info!(error = %format!("{err:#}"), "rejected request");
    (StatusCode::UNPROCESSABLE_ENTITY, format!("{err:#}"))
}

fn internal(err: anyhow::Error) -> (StatusCode, String) {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/fit-model", post(fit_model))
        .route("/api/analyze-channels", post(analyze_channels))
        .route("/api/scenarios/recommend", post(recommend_scenario))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct FitModelResponse {
    success: bool,
    message: String,
    result: Option<ChannelAnalysis>,
}

async fn fit_model(
    State(state): State<AppState>,
    Json(input): Json<FitModelRequestInput>,
) -> ApiResult<FitModelResponse> {
    let (history, settings) = input
        .validate_and_into_parts(state.default_target_cpa, state.fit.clone())
        .map_err(unprocessable)?;

    let analysis = tokio::task::spawn_blocking(move || analyze_channel(&history, &settings))
        .await
        .map_err(|e| internal(anyhow::Error::new(e)))?;

    let response = match (&analysis.model_params, &analysis.fit_message) {
        (Some(params), _) => FitModelResponse {
            success: true,
            message: format!(
                "Fitted {} days for {} (R² {:.3})",
                analysis.history_days, analysis.channel_name, params.r_squared
            ),
            result: Some(analysis),
        },
        (None, message) => FitModelResponse {
            success: false,
            message: message
                .clone()
                .unwrap_or_else(|| "no response curve could be fit".to_string()),
            result: None,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct AnalyzeChannelsResponse {
    channels: Vec<ChannelAnalysis>,
}

async fn analyze_channels(
    State(state): State<AppState>,
    Json(input): Json<AnalysisRequestInput>,
) -> ApiResult<AnalyzeChannelsResponse> {
    let (channels, settings) = input
        .validate_and_into_parts(state.default_target_cpa, state.fit.clone())
        .map_err(unprocessable)?;
    let settings = Arc::new(settings);

    let handles: Vec<_> = channels
        .into_iter()
        .map(|channel| {
            let settings = Arc::clone(&settings);
            tokio::task::spawn_blocking(move || analyze_channel(&channel, &settings))
        })
        .collect();

    let mut analyses = Vec::with_capacity(handles.len());
    for handle in handles {
        analyses.push(handle.await.map_err(|e| internal(anyhow::Error::new(e)))?);
    }
    sort_analyses(&mut analyses);

    Ok(Json(AnalyzeChannelsResponse { channels: analyses }))
}

async fn recommend_scenario(Json(input): Json<ScenarioRequestInput>) -> ApiResult<ScenarioPlan> {
    let (channels, request) = input.validate_and_into_parts().map_err(unprocessable)?;
    let plan = spendcurve_core::scenario::recommend(&channels, &request).map_err(unprocessable)?;
    Ok(Json(plan))
}
