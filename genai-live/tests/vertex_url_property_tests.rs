//! Property tests for live endpoint construction.

use genai_live::{LiveClient, studio_url, vertex_url};
use proptest::prelude::*;

/// GCP region strings such as `us-central1` or `europe-west4`.
fn arb_region() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9\\-]{0,20}[a-z0-9]"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn vertex_url_targets_the_regional_bidi_service(region in arb_region()) {
        let url = vertex_url(&region).unwrap();
        prop_assert_eq!(url.scheme(), "wss");
        let expected_host = format!("{region}-aiplatform.googleapis.com");
        prop_assert_eq!(url.host_str(), Some(expected_host.as_str()));
        prop_assert_eq!(url.path(), "/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent");
        prop_assert!(url.query().is_none());
    }

    #[test]
    fn studio_url_escapes_the_key(key in "[ -~]{1,40}") {
        let url = studio_url(&key);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        prop_assert_eq!(pairs, vec![("key".to_string(), key)]);
    }

    #[test]
    fn vertex_setup_models_are_fully_qualified(region in arb_region(), model in "gemini-[a-z0-9.-]{1,20}") {
        let client = LiveClient::vertex("my-project", region.clone(), "token");
        let expected = format!("projects/my-project/locations/{region}/publishers/google/models/{model}");
        prop_assert_eq!(client.setup_model(&model).unwrap(), expected.clone());
        prop_assert_eq!(client.setup_model(&expected).unwrap(), expected);
    }
}

#[test]
fn empty_region_is_rejected() {
    let err = vertex_url("").unwrap_err();
    assert!(err.to_string().contains("location"), "{err}");
}
