use health_guardian::{GuardianConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match GuardianConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: API_KEY environment variable is required");
            std::process::exit(1);
        }
    };

    info!(
        analysis_model = %config.analysis_model,
        care_plan_model = %config.care_plan_model,
        chat_model = %config.chat_model,
        "Model configuration loaded"
    );

    let app = create_app(&config)?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("Health Guardian starting on {}", addr);
    info!("API overview available at http://{}/", addr);
    info!("Analysis endpoint: POST http://{}/documents/analyze", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
