//! Tool declarations: typed function declarations, callables that are
//! introspected into declarations during transcoding, and the built-in tools.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, invalid_argument};
use crate::schema::Schema;

/// Structured representation of a function the model may call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Schema>,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: Some(description.into()), ..Default::default() }
    }

    pub fn with_parameters(mut self, parameters: Schema) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_response(mut self, response: Schema) -> Self {
        self.response = Some(response);
        self
    }

    /// Builds a declaration from the argument struct and return type of a
    /// Rust function.
    ///
    /// ```
    /// # use genai::FunctionDeclaration;
    /// #[derive(schemars::JsonSchema)]
    /// struct WeatherArgs {
    ///     /// City name
    ///     location: String,
    /// }
    ///
    /// let decl = FunctionDeclaration::from_fn::<WeatherArgs, String>("get_weather", "Current weather").unwrap();
    /// assert!(decl.parameters.is_some());
    /// ```
    pub fn from_fn<Args: JsonSchema, Ret: JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, Error> {
        function::<Args, Ret>(name, description).declaration()
    }
}

/// A callable exposed to the model whose typing is only known through the
/// JSON Schema of its argument object and return value.
pub trait Callable: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    /// JSON Schema of the argument object.
    fn parameters(&self) -> Value;

    /// JSON Schema of the return value, `None` for callables returning nothing.
    fn returns(&self) -> Option<Value> {
        None
    }

    fn declaration(&self) -> Result<FunctionDeclaration, Error> {
        introspect(self)
    }
}

/// A [`Callable`] whose schemas come from Rust types.
pub struct TypedFunction<Args, Ret> {
    name: String,
    description: Option<String>,
    _types: PhantomData<fn(Args) -> Ret>,
}

impl<Args, Ret> Debug for TypedFunction<Args, Ret> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

pub fn function<Args: JsonSchema, Ret: JsonSchema>(
    name: impl Into<String>,
    description: impl Into<String>,
) -> TypedFunction<Args, Ret> {
    TypedFunction { name: name.into(), description: Some(description.into()), _types: PhantomData }
}

impl<Args: JsonSchema, Ret: JsonSchema> Callable for TypedFunction<Args, Ret> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn parameters(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(Args)).unwrap_or(Value::Null)
    }

    fn returns(&self) -> Option<Value> {
        let value = serde_json::to_value(schemars::schema_for!(Ret)).ok()?;
        (value.get("type").and_then(Value::as_str) != Some("null")).then_some(value)
    }
}

fn introspect<C: Callable + ?Sized>(callable: &C) -> Result<FunctionDeclaration, Error> {
    let name = callable.name();
    let parameters = Schema::from_json_schema(&callable.parameters())?;
    if let Some(properties) = &parameters.properties {
        for (property, schema) in properties {
            if schema.schema_type.is_none() && schema.any_of.is_none() {
                return Err(invalid_argument(format!(
                    "parameter '{property}' of function '{name}' has no resolvable type"
                )));
            }
        }
    } else if parameters.schema_type.is_none() {
        return Err(invalid_argument(format!(
            "arguments of function '{name}' have no resolvable type"
        )));
    }

    let response = match callable.returns() {
        Some(document) => {
            let response = Schema::from_json_schema(&document)?;
            if response.schema_type.is_none() && response.any_of.is_none() {
                return Err(invalid_argument(format!(
                    "return value of function '{name}' has no resolvable type"
                )));
            }
            Some(response)
        }
        None => None,
    };

    Ok(FunctionDeclaration {
        name: name.to_string(),
        description: callable.description().map(str::to_string),
        parameters: Some(parameters),
        response,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleSearch {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicRetrievalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSearchRetrieval {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_retrieval_config: Option<DynamicRetrievalConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeExecution {}

/// A tool the model may use. Callables are resolved into
/// `function_declarations` when the request is transcoded.
#[derive(Debug, Clone, Default)]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
    pub callables: Vec<Arc<dyn Callable>>,
    pub google_search: Option<GoogleSearch>,
    pub google_search_retrieval: Option<GoogleSearchRetrieval>,
    pub code_execution: Option<CodeExecution>,
    /// Vertex AI retrieval source, passed through as-is.
    pub retrieval: Option<Value>,
}

impl Tool {
    pub fn functions(declarations: impl IntoIterator<Item = FunctionDeclaration>) -> Self {
        Self { function_declarations: declarations.into_iter().collect(), ..Default::default() }
    }

    pub fn callable(callable: impl Callable + 'static) -> Self {
        Self { callables: vec![Arc::new(callable)], ..Default::default() }
    }

    pub fn google_search() -> Self {
        Self { google_search: Some(GoogleSearch {}), ..Default::default() }
    }

    pub fn code_execution() -> Self {
        Self { code_execution: Some(CodeExecution {}), ..Default::default() }
    }

    /// Typed declarations followed by introspected callables.
    pub(crate) fn resolved_declarations(&self) -> Result<Vec<FunctionDeclaration>, Error> {
        let mut declarations = self.function_declarations.clone();
        for callable in &self.callables {
            declarations.push(callable.declaration()?);
        }
        Ok(declarations)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
    ModeUnspecified,
    Auto,
    Any,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<FunctionCallingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_calling_config: Option<FunctionCallingConfig>,
}
