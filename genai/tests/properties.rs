use genai::coerce::coerce_contents;
use genai::models::{CodeExecutionResult, ExecutableCode, VideoMetadata};
use genai::resource::{ResourceKind, Target, resolve};
use genai::{
    ApiRequest, Client, ClientBuilder, Content, FileData, FunctionCall, FunctionResponse, GenerateContentConfig, Part,
    Role,
};
use proptest::prelude::*;
use serde_json::{Map, Value};

const VERTEX: Target<'static> = Target::Vertex { project: "my-project", location: "us-central1" };

fn bare_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,24}"
}

fn part() -> impl Strategy<Value = Part> {
    prop_oneof![
        "[a-zA-Z ]{1,16}".prop_map(Part::text),
        prop::collection::vec(any::<u8>(), 1..16).prop_map(|data| Part::inline_data("image/png", data)),
        "[a-z_]{1,8}".prop_map(|name| Part::function_call(name, Default::default())),
    ]
}

fn args() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9 ]{0,12}", 0..4)
        .prop_map(|entries| entries.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

fn wire_part() -> impl Strategy<Value = Part> {
    prop_oneof![
        ("[a-zA-Z ]{1,16}", prop::option::of(any::<bool>())).prop_map(|(text, thought)| Part::Text { text, thought }),
        ("(image/png|audio/pcm|application/pdf)", prop::collection::vec(any::<u8>(), 1..32))
            .prop_map(|(mime, data)| Part::inline_data(mime, data)),
        ("[a-z]{1,8}", prop::option::of("(video/mp4|image/jpeg)")).prop_map(|(id, mime_type)| {
            let file_uri = format!("https://generativelanguage.googleapis.com/v1beta/files/{id}");
            Part::FileData(FileData { file_uri, mime_type })
        }),
        (prop::option::of("[a-z0-9]{1,8}"), "[a-z_]{1,8}", args()).prop_map(|(id, name, args)| {
            Part::FunctionCall(FunctionCall { id, name, args })
        }),
        (prop::option::of("[a-z0-9]{1,8}"), "[a-z_]{1,8}", args()).prop_map(|(id, name, response)| {
            Part::FunctionResponse(FunctionResponse { id, name, response })
        }),
        "print\\([0-9]{1,3}\\)".prop_map(|code| Part::ExecutableCode(ExecutableCode { code, language: "PYTHON".into() })),
        ("(OUTCOME_OK|OUTCOME_FAILED)", prop::option::of("[a-z0-9 ]{0,12}"))
            .prop_map(|(outcome, output)| Part::CodeExecutionResult(CodeExecutionResult { outcome, output })),
    ]
}

fn arb_contents(part: impl Strategy<Value = Part>) -> impl Strategy<Value = Vec<Content>> {
    let role = prop::option::of(prop_oneof![Just(Role::User), Just(Role::Model)]);
    let content = (role, prop::collection::vec(part, 0..5)).prop_map(|(role, parts)| Content::new(role, parts));
    prop::collection::vec(content, 1..4)
}

fn video_part() -> impl Strategy<Value = Part> {
    (prop::option::of("[0-9]{1,3}s"), prop::option::of("[0-9]{1,3}\\.5s"))
        .prop_map(|(start_offset, end_offset)| Part::VideoMetadata(VideoMetadata { start_offset, end_offset }))
}

fn studio() -> Client {
    ClientBuilder::new().with_api_key("key").build().unwrap()
}

fn vertex() -> Client {
    ClientBuilder::new().with_vertex("my-project", "us-central1").with_api_key("key").build().unwrap()
}

/// Encodes `contents` as a generate request body and decodes them back.
fn through_the_wire(client: &Client, contents: &[Content]) -> Vec<Content> {
    let request = ApiRequest::GenerateContent {
        model: "gemini-2.0-flash".into(),
        contents: contents.to_vec(),
        config: GenerateContentConfig::default(),
        stream: false,
    };
    let mut body = client.transcode(&request).unwrap().body.unwrap();
    serde_json::from_value(body["contents"].take()).unwrap()
}

proptest! {
    #[test]
    fn contents_survive_the_studio_wire(contents in arb_contents(wire_part())) {
        prop_assert_eq!(through_the_wire(&studio(), &contents), contents);
    }

    #[test]
    fn contents_survive_the_vertex_wire(contents in arb_contents(prop_oneof![4 => wire_part(), 1 => video_part()])) {
        prop_assert_eq!(through_the_wire(&vertex(), &contents), contents);
    }

    #[test]
    fn coercion_is_idempotent(parts in prop::collection::vec(part(), 1..8)) {
        let once = coerce_contents(parts).unwrap();
        let twice = coerce_contents(once.clone()).unwrap();
        prop_assert_eq!(&once, &twice);
    }

    #[test]
    fn coerced_parts_keep_their_order(parts in prop::collection::vec(part(), 1..8)) {
        let contents = coerce_contents(parts.clone()).unwrap();
        let flattened: Vec<Part> = contents.iter().flat_map(|content| content.parts.clone()).collect();
        prop_assert_eq!(flattened, parts);
        for content in &contents {
            let role = content.role;
            let function_calls = content.parts.iter().all(|part| matches!(part, Part::FunctionCall(_)));
            prop_assert_eq!(role == Some(Role::Model), function_calls);
        }
    }

    #[test]
    fn resolution_is_idempotent(id in bare_id()) {
        for kind in [ResourceKind::Model, ResourceKind::TuningJob, ResourceKind::CachedContent] {
            for target in [Target::Studio, VERTEX] {
                let once = resolve(kind, &id, target).unwrap();
                let twice = resolve(kind, &once, target).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn vertex_batch_ids_must_be_numeric(id in "[0-9]{1,12}", junk in "[a-z]{1,8}") {
        let resolved = resolve(ResourceKind::BatchJob, &id, VERTEX).unwrap();
        prop_assert_eq!(resolved, format!("projects/my-project/locations/us-central1/batchPredictionJobs/{id}"));
        prop_assert!(resolve(ResourceKind::BatchJob, &junk, VERTEX).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn studio_rejects_vertex_paths(id in bare_id()) {
        let path = format!("projects/p/locations/l/cachedContents/{id}");
        prop_assert!(resolve(ResourceKind::CachedContent, &path, Target::Studio).unwrap_err().is_invalid_argument());
    }
}
