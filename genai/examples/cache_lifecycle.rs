use display_error_chain::DisplayErrorChain;
use futures::TryStreamExt;
use genai::cache::{CreateCachedContentConfig, UpdateCachedContentConfig};
use genai::model_info::ListConfig;
use genai::{BearerToken, ClientBuilder, GenerateContentConfig};
use std::process::ExitCode;
use tracing::info;

const MODEL: &str = "gemini-1.5-flash-002";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    match do_main().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error_chain = DisplayErrorChain::new(e.as_ref());
            tracing::error!(error.debug = ?e, error.chained = %error_chain, "execution failed");
            ExitCode::FAILURE
        }
    }
}

async fn do_main() -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = ClientBuilder::from_env();
    if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
        builder = builder.with_credentials(BearerToken::new(token));
    }
    let client = builder.build()?;

    // Caches need a minimum token count, so repeat the context.
    let context = "The quick brown fox jumps over the lazy dog. ".repeat(4096);
    let cache = client
        .caches()
        .create(
            MODEL,
            CreateCachedContentConfig::default()
                .with_display_name("genai-example")
                .with_contents(context)
                .with_system_instruction("You count animals.")
                .with_ttl("300s"),
        )
        .await?;
    let name = cache.name.clone().unwrap_or_default();
    info!(%name, expire_time = ?cache.expire_time, "cache created");

    let config = GenerateContentConfig { cached_content: Some(name.clone()), ..Default::default() };
    let response = client.models().generate_content(MODEL, "How many animals are mentioned?", config).await?;
    println!("{}", response.text()?.unwrap_or_default());

    let updated = client
        .caches()
        .update(&name, UpdateCachedContentConfig { ttl: Some("600s".to_string()), ..Default::default() })
        .await?;
    info!(expire_time = ?updated.expire_time, "cache extended");

    let caches: Vec<_> = client.caches().list(ListConfig { page_size: Some(10), ..Default::default() }).try_collect().await?;
    info!(count = caches.len(), "caches listed");

    client.caches().delete(&name).await?;
    info!(%name, "cache deleted");
    Ok(())
}
