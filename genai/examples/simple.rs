use display_error_chain::DisplayErrorChain;
use futures::TryStreamExt;
use genai::{BearerToken, ClientBuilder, GenerateContentConfig};
use std::process::ExitCode;
use tracing::info;

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
    // GOOGLE_API_KEY, or GOOGLE_GENAI_USE_VERTEXAI=1 with GOOGLE_CLOUD_PROJECT
    // and an access token from `gcloud auth print-access-token`.
    let mut builder = ClientBuilder::from_env();
    if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
        builder = builder.with_credentials(BearerToken::new(token));
    }
    let client = builder.build()?;
    info!(backend = %client.backend(), "client ready");

    let config = GenerateContentConfig::default()
        .with_system_instruction("Answer in one short paragraph.")
        .with_temperature(0.2);
    let response = client
        .models()
        .generate_content("gemini-2.0-flash", "Why is the sky blue?", config.clone())
        .await?;
    println!("{}", response.text()?.unwrap_or_default());

    let mut stream = client
        .models()
        .generate_content_stream("gemini-2.0-flash", "Count from one to five.", config)
        .await?;
    while let Some(chunk) = stream.try_next().await? {
        print!("{}", chunk.text()?.unwrap_or_default());
    }
    println!();

    Ok(())
}
