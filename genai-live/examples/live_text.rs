use display_error_chain::DisplayErrorChain;
use futures::StreamExt;
use genai::generation::Modality;
use genai_live::{LiveClient, LiveConnectConfig, ServerMessage};
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
    let client = match std::env::var("GOOGLE_ACCESS_TOKEN") {
        Ok(token) => LiveClient::vertex(
            std::env::var("GOOGLE_CLOUD_PROJECT")?,
            std::env::var("GOOGLE_CLOUD_LOCATION").unwrap_or_else(|_| "us-central1".into()),
            token,
        ),
        Err(_) => LiveClient::studio(std::env::var("GOOGLE_API_KEY")?),
    };

    let config = LiveConnectConfig::default()
        .with_response_modalities([Modality::Text])
        .with_system_instruction("You are a terse assistant.");
    let session = client.connect("gemini-2.0-flash-live-001", config).await?;
    info!(session_id = session.session_id(), "connected");

    let (sender, receiver) = session.split();
    let mut messages = Box::pin(receiver.into_stream());

    for prompt in ["Name three prime numbers.", "Now add them up."] {
        println!("> {prompt}");
        sender.send_client_content(prompt, true).await?;
        while let Some(message) = messages.next().await {
            match message? {
                ServerMessage::ServerContent(content) => {
                    print!("{}", content.text()?.unwrap_or_default());
                    if content.turn_complete || content.interrupted {
                        println!();
                        break;
                    }
                }
                other => info!(kind = other.kind(), "ignoring message"),
            }
        }
    }

    sender.close().await?;
    Ok(())
}
