use archflow::gemini_client::GeminiClient;
use archflow::{app_router, AppState, Settings, SharedGateway};
use std::sync::Arc;
use std::time::Duration;

const DEV_LOG_FILTER: &str = "debug,archflow=trace,reqwest=info,hyper=info,tower_http=info";
const PROD_LOG_FILTER: &str = "info,archflow=info,reqwest=warn,hyper=warn,tower_http=warn";

/// How often expired runs are swept from the store between uploads
const RUN_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;
    let settings = Settings::from_env();
    log_settings(&settings);

    let gateway: SharedGateway = Arc::new(GeminiClient::new(&settings));
    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(gateway, settings);

    let sweeper = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(RUN_SWEEP_INTERVAL).await;
            let removed = sweeper.sessions.sweep().await;
            if removed > 0 {
                tracing::info!("🧹 Swept {} expired runs", removed);
            }
        }
    });

    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the build-mode filter;
/// `LOG_FORMAT=json` emits one flattened JSON object per event.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let directives = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| {
            let fallback = if cfg!(debug_assertions) { DEV_LOG_FILTER } else { PROD_LOG_FILTER };
            fallback.to_string()
        });
    let filter = EnvFilter::try_new(&directives)?;

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let output = if json {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions))
            .boxed()
    };

    tracing_subscriber::registry().with(filter).with(output).try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        filter = %directives,
        json,
        "🏛️ ArchFlow starting up..."
    );
    Ok(())
}

/// Startup summary of the effective settings; never prints the key itself.
fn log_settings(settings: &Settings) {
    tracing::info!(
        analysis = %settings.models.analysis,
        image = %settings.models.image,
        video = %settings.models.video,
        "Models configured"
    );
    tracing::info!(
        interval_secs = settings.video_poll.interval.as_secs(),
        max_wait_secs = settings.video_poll.max_wait.as_secs(),
        "⏱️ Video polling policy"
    );
    tracing::info!(ttl_hours = settings.run_ttl.num_hours(), "Runs expire after their TTL");
    match settings.gemini_api_key {
        Some(_) => tracing::info!("🔑 API key loaded from environment"),
        None => tracing::warn!("GEMINI_API_KEY not set; runs are blocked until POST /api/credential supplies one"),
    }
}
