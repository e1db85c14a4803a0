// Urban Insights - Web Server
// JSON API over the load → clean → aggregate → export pipeline

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use urban_insights::schema::YEAR;
use urban_insights::{export, views};
use urban_insights::{Dashboard, DatasetKind, PipelineError, Settings, StoreQuery, YearRange};

/// Shared application state
#[derive(Clone)]
struct AppState {
    dashboard: Arc<Mutex<Dashboard>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

/// Map pipeline errors onto HTTP statuses; the store being down is a 503
fn pipeline_failure(e: PipelineError) -> Response {
    let status = match &e {
        PipelineError::StoreConnection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::FileNotFound { .. } => StatusCode::NOT_FOUND,
        PipelineError::UnknownColumn { .. } | PipelineError::InvalidArgument { .. } => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::Parse { .. } | PipelineError::EmptyResult { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{}", e);
    }
    failure(status, e.to_string())
}

/// Parse the dataset segment and run `f` against the locked dashboard
fn with_dataset<F>(state: &AppState, kind: &str, f: F) -> Response
where
    F: FnOnce(&mut Dashboard, DatasetKind) -> Result<Response, PipelineError>,
{
    let kind = match DatasetKind::from_str(kind) {
        Ok(kind) => kind,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };
    let mut dashboard = match state.dashboard.lock() {
        Ok(guard) => guard,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "dashboard lock poisoned".to_string()),
    };
    f(&mut dashboard, kind).unwrap_or_else(pipeline_failure)
}

#[derive(Debug, Default, Deserialize)]
struct RangeParams {
    from: Option<i64>,
    to: Option<i64>,
    bins: Option<usize>,
}

impl RangeParams {
    fn range(&self) -> Option<YearRange> {
        match (self.from, self.to) {
            (None, None) => None,
            (from, to) => Some(YearRange::new(from.unwrap_or(i64::MIN), to.unwrap_or(i64::MAX))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScatterParams {
    x: String,
    y: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryParams {
    column: Option<String>,
    threshold: Option<f64>,
}

#[derive(Serialize)]
struct DatasetInfo {
    code: String,
    name: String,
    source: String,
    store_table: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/datasets - Known datasets and where they come from
async fn list_datasets(State(state): State<AppState>) -> Response {
    let dashboard = match state.dashboard.lock() {
        Ok(guard) => guard,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "dashboard lock poisoned".to_string()),
    };
    let datasets: Vec<DatasetInfo> = DatasetKind::all()
        .iter()
        .map(|kind| DatasetInfo {
            code: kind.code().to_string(),
            name: kind.name().to_string(),
            source: dashboard.settings().source_path(*kind).display().to_string(),
            store_table: kind.schema().store.table,
        })
        .collect();
    ApiResponse::ok(datasets)
}

/// GET /api/datasets/:kind/raw - Source table as loaded
async fn get_raw(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        let raw = dashboard.raw(kind)?;
        Ok(ApiResponse::ok(&*raw))
    })
}

/// GET /api/datasets/:kind/clean - Cleaned table plus cleaning report
async fn get_clean(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        Ok(ApiResponse::ok(dashboard.clean(kind)?))
    })
}

/// GET /api/datasets/:kind/summary - Descriptive stats and correlation
async fn get_summary(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        Ok(ApiResponse::ok(dashboard.view(kind)?.summary))
    })
}

/// GET /api/datasets/:kind/decades - Averages per decade
async fn get_decades(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        match dashboard.view(kind)?.decades {
            Some(decades) => Ok(ApiResponse::ok(decades)),
            None => Ok(failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("{} has no year column", kind),
            )),
        }
    })
}

/// GET /api/datasets/:kind/kpis - Latest value per indicator
async fn get_kpis(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        let view = dashboard.view(kind)?;
        let kpis = views::latest_kpis(&view.cleaned.table, YEAR, &view.numeric_columns())?;
        Ok(ApiResponse::ok(kpis))
    })
}

/// GET /api/datasets/:kind/trends?from=&to= - Year-on-year series
async fn get_trends(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<RangeParams>,
) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        let view = dashboard.view(kind)?;
        let table = match params.range() {
            Some(range) => views::filter_years(&view.cleaned.table, YEAR, range)?,
            None => view.cleaned.table.clone(),
        };
        Ok(ApiResponse::ok(views::trend_series(&table, YEAR, &view.numeric_columns())?))
    })
}

/// GET /api/datasets/:kind/histogram/:column?bins=&from=&to=
async fn get_histogram(
    State(state): State<AppState>,
    Path((kind, column)): Path<(String, String)>,
    Query(params): Query<RangeParams>,
) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        let view = dashboard.view(kind)?;
        let table = match params.range() {
            Some(range) => views::filter_years(&view.cleaned.table, YEAR, range)?,
            None => view.cleaned.table.clone(),
        };
        let bins = params.bins.unwrap_or(views::DEFAULT_HISTOGRAM_BINS);
        Ok(ApiResponse::ok(views::histogram(&table, &column, bins)?))
    })
}

/// GET /api/datasets/:kind/box/:column?from=&to=
async fn get_box(
    State(state): State<AppState>,
    Path((kind, column)): Path<(String, String)>,
    Query(params): Query<RangeParams>,
) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        let view = dashboard.view(kind)?;
        let table = match params.range() {
            Some(range) => views::filter_years(&view.cleaned.table, YEAR, range)?,
            None => view.cleaned.table.clone(),
        };
        Ok(ApiResponse::ok(views::box_summary(&table, &column)?))
    })
}

/// GET /api/datasets/:kind/scatter?x=&y= - Paired observations
async fn get_scatter(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ScatterParams>,
) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        let view = dashboard.view(kind)?;
        Ok(ApiResponse::ok(views::scatter_points(&view.cleaned.table, &params.x, &params.y)?))
    })
}

/// GET /api/datasets/:kind/export.csv - Cleaned table as a CSV download
async fn download_csv(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        let cleaned = dashboard.clean(kind)?;
        let bytes = export::csv_bytes(cleaned.ensure_rows()?)?;
        let filename = format!("{}_cleaned.csv", kind.code());
        let disposition = format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            filename,
            urlencoding::encode(&filename)
        );
        Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            bytes,
        )
            .into_response())
    })
}

/// POST /api/datasets/:kind/export - Write CSV + spreadsheet to the export dir
async fn post_export(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        Ok(ApiResponse::ok(dashboard.export(kind)?))
    })
}

/// POST /api/store/:kind/seed - Seed the store (skipped if already populated)
async fn post_seed(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    with_dataset(&state, &kind, |dashboard, kind| {
        Ok(ApiResponse::ok(dashboard.seed(kind)?))
    })
}

/// GET /api/store/:kind/query/:name?column=&threshold= - Read-only query
async fn get_store_query(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
    Query(params): Query<QueryParams>,
) -> Response {
    let query = match StoreQuery::from_name(&name, params.column.as_deref(), params.threshold) {
        Ok(query) => query,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };
    with_dataset(&state, &kind, |dashboard, kind| {
        Ok(ApiResponse::ok(dashboard.query(kind, &query)?))
    })
}

/// GET /api/store/events - Seed audit trail
async fn get_store_events(State(state): State<AppState>) -> Response {
    let dashboard = match state.dashboard.lock() {
        Ok(guard) => guard,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "dashboard lock poisoned".to_string()),
    };
    match dashboard.store().events() {
        Ok(events) => ApiResponse::ok(events),
        Err(e) => pipeline_failure(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState, exports_dir: std::path::PathBuf) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/datasets", get(list_datasets))
        .route("/datasets/:kind/raw", get(get_raw))
        .route("/datasets/:kind/clean", get(get_clean))
        .route("/datasets/:kind/summary", get(get_summary))
        .route("/datasets/:kind/decades", get(get_decades))
        .route("/datasets/:kind/kpis", get(get_kpis))
        .route("/datasets/:kind/trends", get(get_trends))
        .route("/datasets/:kind/histogram/:column", get(get_histogram))
        .route("/datasets/:kind/box/:column", get(get_box))
        .route("/datasets/:kind/scatter", get(get_scatter))
        .route("/datasets/:kind/export.csv", get(download_csv))
        .route("/datasets/:kind/export", post(post_export))
        .route("/store/events", get(get_store_events))
        .route("/store/:kind/seed", post(post_seed))
        .route("/store/:kind/query/:name", get(get_store_query))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .nest_service("/exports", ServeDir::new(exports_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    println!("🌐 Urban Insights - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    let bind = settings.server.bind.clone();
    let exports_dir = settings.export.dir.clone();

    for kind in DatasetKind::all() {
        let path = settings.source_path(kind);
        if path.exists() {
            println!("✓ {}: {}", kind.name(), path.display());
        } else {
            println!("⚠️  {}: {} not found (endpoints will answer 404)", kind.name(), path.display());
        }
    }
    println!("✓ Store: {}", settings.store.path.display());

    let state = AppState {
        dashboard: Arc::new(Mutex::new(Dashboard::new(settings))),
    };
    let app = router(state, exports_dir);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "listening");

    println!("\n🚀 Server running on http://{}", bind);
    println!("   API: http://{}/api/datasets/trends/summary", bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}
