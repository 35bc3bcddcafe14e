// Pathogen Dashboard - Web Server
// JSON API over the same views the TUI shows

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use pathogen_dashboard::{
    build_view, load_dataset, CacheStats, CaseFilter, CaseRecord, DashboardConfig, DataLoader,
    Dataset, LoadReport, PathogenProfile, View, ViewOutput,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pathogen-server
#[derive(Parser, Debug)]
#[command(name = "pathogen-server")]
#[command(about = "HTTP API for the pathogen dashboard views")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "PATHOGEN_DASHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Case CSV file (repeatable); overrides the config file
    #[arg(short, long = "data", env = "PATHOGEN_DASHBOARD_DATA", value_delimiter = ',')]
    data: Vec<PathBuf>,

    /// Hospital CSV file (Name, Infection_Rate)
    #[arg(long, env = "PATHOGEN_DASHBOARD_HOSPITALS")]
    hospitals: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "PATHOGEN_DASHBOARD_PORT")]
    port: Option<u16>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    loader: Arc<DataLoader>,
    config: Arc<DashboardConfig>,
}

impl AppState {
    /// Every request re-runs against the memoized load. File stats and any
    /// reload are blocking, so they run off the async workers.
    async fn dataset(&self) -> Result<Dataset, Response> {
        let state = self.clone();
        let task = tokio::task::spawn_blocking(move || load_dataset(&state.loader, &state.config));
        match task.await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => Err(load_failed(e)),
            Err(e) => {
                error!("Load task failed: {}", e);
                Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Load task failed"))
            }
        }
    }
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
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

fn load_failed(err: pathogen_dashboard::DashboardError) -> Response {
    error!("Error loading data: {}", err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Query string for view endpoints: ?hospitals=A,B&from=2024-01-01&to=2024-02-01
#[derive(Debug, Default, Deserialize)]
struct ViewQuery {
    hospitals: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

impl ViewQuery {
    fn to_filter(&self) -> pathogen_dashboard::Result<CaseFilter> {
        let filter = match &self.hospitals {
            None => CaseFilter::all(),
            Some(list) => CaseFilter::hospitals(
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
        };
        filter.with_range_str(self.from.as_deref(), self.to.as_deref())
    }
}

#[derive(Serialize)]
struct ReportResponse {
    report: LoadReport,
    cache: CacheStats,
    views: Vec<ViewSummary>,
}

#[derive(Serialize)]
struct ViewSummary {
    slug: &'static str,
    title: &'static str,
}

#[derive(Serialize)]
struct CaseResponse {
    date: String,
    number_of_cases: u64,
    antibiotic: Option<String>,
    resistance_level: Option<f64>,
    outcome: Option<String>,
    mortality_rate: Option<f64>,
}

impl From<&CaseRecord> for CaseResponse {
    fn from(record: &CaseRecord) -> Self {
        Self {
            date: record.date.format("%Y-%m-%d").to_string(),
            number_of_cases: record.number_of_cases,
            antibiotic: record.antibiotic.clone(),
            resistance_level: record.resistance_level,
            outcome: record.outcome.clone(),
            mortality_rate: record.mortality_rate,
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/profile - Pathogen information text
async fn get_profile(State(state): State<AppState>) -> Response {
    ApiResponse::<PathogenProfile>::ok(state.config.pathogen.clone())
}

/// GET /api/hospitals - Distinct hospital names (sidebar options)
async fn get_hospitals(State(state): State<AppState>) -> Response {
    match state.dataset().await {
        Ok(data) => ApiResponse::ok(data.cases.hospitals()),
        Err(response) => response,
    }
}

/// GET /api/report - Load report and cache statistics
async fn get_report(State(state): State<AppState>) -> Response {
    match state.dataset().await {
        Ok(data) => ApiResponse::ok(ReportResponse {
            report: data.cases.report.clone(),
            cache: state.loader.stats(),
            views: View::ALL
                .iter()
                .map(|v| ViewSummary {
                    slug: v.slug(),
                    title: v.title(),
                })
                .collect(),
        }),
        Err(response) => response,
    }
}

/// GET /api/views/:slug - One dashboard view
async fn get_view(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Response {
    let view: View = match slug.parse() {
        Ok(view) => view,
        Err(e) => return api_error(StatusCode::NOT_FOUND, e.to_string()),
    };

    let filter = match query.to_filter() {
        Ok(filter) => filter,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.dataset().await {
        Ok(data) => ApiResponse::<ViewOutput>::ok(build_view(view, &data, &filter)),
        Err(response) => response,
    }
}

/// GET /api/hospitals/:name/cases - Raw cleaned rows for one hospital
async fn get_hospital_cases(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    // Path has already percent-decoded the name
    let data = match state.dataset().await {
        Ok(data) => data,
        Err(response) => return response,
    };

    let filter = CaseFilter::hospitals([name.clone()]);
    let outcome = filter.apply(&data.cases.records);
    if outcome.rows.is_empty() {
        return api_error(StatusCode::NOT_FOUND, format!("No rows for hospital: {}", name));
    }
    let rows: Vec<CaseResponse> = outcome.rows.into_iter().map(CaseResponse::from).collect();
    ApiResponse::ok(rows)
}

/// GET / - Minimal landing page listing the endpoints
async fn serve_index(State(state): State<AppState>) -> Response {
    let data = match state.dataset().await {
        Ok(data) => data,
        Err(response) => return response,
    };

    let views: String = View::ALL
        .iter()
        .map(|v| format!("<li><a href=\"/api/views/{0}\">{1}</a></li>", v.slug(), v.title()))
        .collect();

    let hospitals: String = data
        .cases
        .hospitals()
        .iter()
        .map(|h| {
            format!(
                "<li><a href=\"/api/hospitals/{}/cases\">{}</a></li>",
                urlencoding::encode(h),
                escape_html(h)
            )
        })
        .collect();

    Html(format!(
        "<!doctype html><html><head><title>{0} Dashboard</title></head>\
         <body><h1>{0}</h1><p>{1}</p><h2>Views</h2><ul>{2}</ul>\
         <h2>Hospitals</h2><ul>{3}</ul>\
         <p><a href=\"/api/report\">Load report</a></p>\
         </body></html>",
        escape_html(&state.config.pathogen.name),
        escape_html(&state.config.pathogen.summary),
        views,
        hospitals
    ))
    .into_response()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/profile", get(get_profile))
        .route("/hospitals", get(get_hospitals))
        .route("/hospitals/:name/cases", get(get_hospital_cases))
        .route("/report", get(get_report))
        .route("/views/:slug", get(get_view))
        .with_state(state.clone());

    Router::new()
        .route("/", get(serve_index))
        .with_state(state)
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pathogen_server=info,pathogen_dashboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = DashboardConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if !args.data.is_empty() {
        config.data_files = args.data;
    }
    if args.hospitals.is_some() {
        config.hospital_file = args.hospitals;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let loader = Arc::new(DataLoader::from_config(&config));

    // Fail fast on unreadable input; later requests hit the cache
    let dataset = load_dataset(&loader, &config).context("Failed to load data")?;
    info!(
        "Loaded {} case rows ({} excluded)",
        dataset.cases.report.rows_kept,
        dataset.cases.report.rows_excluded()
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        loader,
        config: Arc::new(config),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("🚀 Server running on http://{}", addr);
    info!("   API: http://{}/api/views/infection-trends", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pathogen_dashboard::{DashboardError, HospitalSelection};
    use serde_json::{json, Value};
    use std::collections::BTreeSet;
    use std::io::Write;
    use tower::ServiceExt;

    fn state_for(data_files: Vec<PathBuf>, hospital_file: Option<PathBuf>) -> AppState {
        let config = DashboardConfig {
            data_files,
            hospital_file,
            ..DashboardConfig::default()
        };
        AppState {
            loader: Arc::new(DataLoader::from_config(&config)),
            config: Arc::new(config),
        }
    }

    fn sample_state() -> AppState {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
        state_for(
            vec![dir.join("sample_cases.csv")],
            Some(dir.join("hospitals.csv")),
        )
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn query(hospitals: Option<&str>, from: Option<&str>) -> ViewQuery {
        ViewQuery {
            hospitals: hospitals.map(str::to_string),
            from: from.map(str::to_string),
            to: None,
        }
    }

    #[test]
    fn test_query_splits_and_trims_hospitals() {
        let filter = query(Some(" General Hospital , St. Mary's ,"), None)
            .to_filter()
            .unwrap();

        let expected: BTreeSet<String> = ["General Hospital", "St. Mary's"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(filter.hospitals, HospitalSelection::Only(expected));
    }

    #[test]
    fn test_query_without_hospitals_selects_all() {
        let filter = ViewQuery::default().to_filter().unwrap();

        assert_eq!(filter, CaseFilter::all());
    }

    #[test]
    fn test_query_blank_hospitals_is_empty_selection() {
        let filter = query(Some(""), None).to_filter().unwrap();

        assert!(filter.is_selection_empty());
    }

    #[test]
    fn test_query_rejects_bad_date() {
        let err = query(None, Some("last tuesday")).to_filter().unwrap_err();

        assert!(matches!(err, DashboardError::InvalidDate(_)));
    }

    #[tokio::test]
    async fn test_view_route_filters_hospitals() {
        let (status, body) = get_json(
            sample_state(),
            "/api/views/hospital-comparisons?hospitals=St.%20Mary's",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["table"]["Hospital"], json!(["St. Mary's"]));
        assert_eq!(body["data"]["table"]["Number_of_Cases"], json!([27.0]));
    }

    #[tokio::test]
    async fn test_view_route_blank_selection_warns() {
        let (status, body) =
            get_json(sample_state(), "/api/views/infection-trends?hospitals=").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["warnings"][0]["kind"], json!("empty_selection"));
        assert_eq!(body["data"]["table"]["Number_of_Cases"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_view_is_404() {
        let (status, body) = get_json(sample_state(), "/api/views/no-such-view").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].is_string());
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_bad_date_is_400() {
        let (status, body) =
            get_json(sample_state(), "/api/views/infection-trends?from=2024-13-40").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_hospital_cases_decodes_name_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Date,Hospital,Number_of_Cases").unwrap();
        writeln!(file, "2024-01-01,Ward%41,3").unwrap();
        writeln!(file, "2024-01-01,WardA,8").unwrap();
        file.flush().unwrap();
        let state = state_for(vec![file.path().to_path_buf()], None);

        let (status, body) = get_json(state.clone(), "/api/hospitals/Ward%2541/cases").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["number_of_cases"], json!(3));

        let (status, _) = get_json(state, "/api/hospitals/Nowhere/cases").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dataset_loads_off_the_runtime_and_memoizes() {
        let state = sample_state();

        for _ in 0..3 {
            let (status, _) = get_json(state.clone(), "/api/hospitals").await;
            assert_eq!(status, StatusCode::OK);
        }

        assert_eq!(state.loader.stats().misses, 2);
        assert_eq!(state.loader.stats().hits, 4);
    }
}
