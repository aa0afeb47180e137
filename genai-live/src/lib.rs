//! # genai-live
//!
//! Bidirectional live sessions with Gemini models over WebSocket, for both
//! the Gemini Developer API and Vertex AI.
//!
//! A session starts with a `setup` envelope and becomes usable once the
//! server acknowledges it. After that the client may stream turns, media
//! and tool responses while the server streams content, tool calls and
//! cancellations. A dropped connection simply ends the session.
//!
//! ```no_run
//! use genai::generation::Modality;
//! use genai_live::{LiveClient, LiveConnectConfig, ServerMessage};
//!
//! # async fn run() -> genai_live::Result<()> {
//! let client = LiveClient::studio(std::env::var("GOOGLE_API_KEY").unwrap_or_default());
//! let config = LiveConnectConfig::default().with_response_modalities([Modality::Text]);
//! let mut session = client.connect("gemini-2.0-flash-live-001", config).await?;
//!
//! session.send_client_content("Hello!", true).await?;
//! while let Some(message) = session.receive().await? {
//!     if let ServerMessage::ServerContent(content) = message {
//!         print!("{}", content.text()?.unwrap_or_default());
//!         if content.turn_complete {
//!             break;
//!         }
//!     }
//! }
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod messages;
pub mod protocol;
pub mod session;

pub use error::{LiveError, Result};
pub use messages::{ClientMessage, LiveConnectConfig, ServerContent, ServerMessage, ToolCall};
pub use protocol::{Protocol, SessionState};
pub use session::{LiveClient, LiveReceiver, LiveSender, LiveSession, studio_url, vertex_url};
