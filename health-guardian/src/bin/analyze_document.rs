use anyhow::{Context, Result};
use health_guardian::{
    DocumentInput, GeminiClient, GuardianConfig, report::render_analysis,
    tasks::analyze_document,
};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <document_path>", args[0]);
        eprintln!("Example: {} ./blood-test.png", args[0]);
        std::process::exit(1);
    }

    let config = GuardianConfig::from_env().context("Please set the API_KEY environment variable")?;
    let input = DocumentInput::from_path(&args[1])
        .await
        .with_context(|| format!("Could not load {}", args[1]))?;

    println!("Analyzing {} ({} document) with {}", args[1], input.kind(), config.analysis_model);
    println!();

    let client = GeminiClient::new(&config)?;
    let analysis = analyze_document(&client, &config.analysis_model, &input).await?;

    print!("{}", render_analysis(&analysis));
    Ok(())
}
