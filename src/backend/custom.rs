// Generic HTTP backend driven entirely by configuration
//
// Requests are built from field-name mappings or a JSON body template, and
// the translated text is pulled out of the response with a dotted path.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::CustomApiConfig;
use crate::error::{RelingoError, Result, TransportError};
use crate::language::LanguageCode;
use crate::transport::{HttpMethod, HttpTransport, RequestOptions};
use super::{AdapterRequest, BackendAdapter, BackendConfig, BackendType, common};

/// Values available to `{{...}}` placeholders
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub text: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub api_key: &'a str,
}

/// Replace `{{text}}`, `{{from}}`, `{{to}}` and `{{apiKey}}` in `template`.
///
/// One left-to-right pass: inserted values are never rescanned, so
/// placeholders inside the user's text stay literal. Unknown `{{...}}`
/// tokens are kept as they are. With `json_escape` set, values are escaped
/// for use inside a JSON string literal.
pub fn substitute(template: &str, vars: &TemplateVars<'_>, json_escape: bool) -> String {
    let escape = |value: &str| -> String {
        if json_escape {
            let quoted = Value::String(value.to_string()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        } else {
            value.to_string()
        }
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };

        let value = match &after[..end] {
            "text" => Some(vars.text),
            "from" => Some(vars.from),
            "to" => Some(vars.to),
            "apiKey" => Some(vars.api_key),
            _ => None,
        };
        match value {
            Some(value) => out.push_str(&escape(value)),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Walk a dotted path such as `choices.0.text`; numeric segments index arrays.
pub fn extract_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.trim().is_empty() {
        return Some(value);
    }

    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

pub struct CustomApiAdapter {
    config: CustomApiConfig,
    transport: HttpTransport,
}

impl CustomApiAdapter {
    pub fn new(config: CustomApiConfig) -> Result<Self> {
        Ok(Self {
            config,
            transport: HttpTransport::new()?,
        })
    }

    pub fn config(&self) -> &CustomApiConfig {
        &self.config
    }

    /// Assemble transport options (method, headers, query or body) for one call
    pub fn build_request(&self, request: &AdapterRequest<'_>) -> Result<RequestOptions> {
        let config = &self.config;
        let vars = TemplateVars {
            text: request.text,
            from: request.from.code(),
            to: request.to.code(),
            api_key: &config.api_key,
        };

        let mut options =
            common::request_options(config.timeout_secs, config.retry_count, config.retry_delay_ms);
        options.method = config.method;
        for (name, value) in &config.headers {
            options = options.header(name.clone(), substitute(value, &vars, false));
        }

        let mut fields = vec![
            (config.text_field.clone(), vars.text.to_string()),
            (config.from_field.clone(), vars.from.to_string()),
            (config.to_field.clone(), vars.to.to_string()),
        ];
        if let Some(key_field) = &config.api_key_field {
            fields.push((key_field.clone(), config.api_key.clone()));
        }

        match config.method {
            HttpMethod::Get => {
                options.query = fields;
            }
            HttpMethod::Post => {
                let body = match &config.request_template {
                    Some(template) => {
                        let rendered = substitute(template, &vars, true);
                        serde_json::from_str(&rendered).map_err(|e| {
                            RelingoError::ConfigInvalid(format!(
                                "Request template is not valid JSON after substitution: {}",
                                e
                            ))
                        })?
                    }
                    None => Value::Object(
                        fields
                            .into_iter()
                            .map(|(k, v)| (k, Value::String(v)))
                            .collect::<Map<_, _>>(),
                    ),
                };
                options.body = Some(body);
            }
        }

        Ok(options)
    }

    /// Extract the translation from a response, failing on a configured error field
    pub fn parse_response(&self, data: &Value) -> Result<String> {
        if let Some(error_field) = &self.config.error_field {
            if let Some(message) = extract_path(data, error_field).and_then(error_message) {
                return Err(common::backend_error(
                    BackendType::CustomApi,
                    format!("Custom API returned an error: {}", message),
                ));
            }
        }

        let value = extract_path(data, &self.config.response_path).ok_or_else(|| {
            common::backend_error(
                BackendType::CustomApi,
                format!(
                    "Response path '{}' not found in custom API response",
                    self.config.response_path
                ),
            )
        })?;

        match value {
            Value::String(text) => Ok(text.clone()),
            other => Err(common::backend_error(
                BackendType::CustomApi,
                format!(
                    "Value at '{}' is not a string: {}",
                    self.config.response_path, other
                ),
            )),
        }
    }

    fn describe_error(&self, error: TransportError) -> RelingoError {
        let Some(status) = error.status else {
            return common::backend_error(
                BackendType::CustomApi,
                format!("Network error contacting custom API: {}", error.message),
            );
        };

        let detail = error
            .body
            .as_deref()
            .and_then(|body| serde_json::from_str::<Value>(body).ok())
            .and_then(|body| {
                let field = self.config.error_field.as_deref().unwrap_or("error");
                extract_path(&body, field).and_then(error_message)
            })
            .or_else(|| error.body.clone())
            .unwrap_or_default();

        common::backend_error(
            BackendType::CustomApi,
            format!("Custom API error {}: {}", status, detail),
        )
    }
}

#[async_trait]
impl BackendAdapter for CustomApiAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::CustomApi
    }

    fn display_name(&self) -> &str {
        "Custom API"
    }

    fn supported_languages(&self) -> Vec<LanguageCode> {
        if self.config.supported_languages.is_empty() {
            LanguageCode::ALL.to_vec()
        } else {
            self.config.supported_languages.clone()
        }
    }

    fn configure(&mut self, config: BackendConfig) -> Result<()> {
        match config {
            BackendConfig::CustomApi(config) => {
                self.config = config;
                Ok(())
            }
            other => Err(RelingoError::ConfigInvalid(format!(
                "Custom API backend cannot use {} configuration",
                other.backend_type()
            ))),
        }
    }

    fn validate_config(&self) -> Result<()> {
        let config = &self.config;
        common::validate_url("endpoint", &config.endpoint)?;

        match (&config.request_template, config.method) {
            (Some(_), HttpMethod::Get) => {
                return Err(RelingoError::ConfigInvalid(
                    "request_template is only supported for POST requests".to_string(),
                ));
            }
            (Some(template), HttpMethod::Post) if !template.contains("{{text}}") => {
                return Err(RelingoError::ConfigInvalid(
                    "request_template must contain the {{text}} placeholder".to_string(),
                ));
            }
            _ => {}
        }

        if config.request_template.is_none() && config.text_field.trim().is_empty() {
            return Err(RelingoError::ConfigInvalid("text_field must not be empty".to_string()));
        }
        if config.api_key_field.is_some() && config.api_key.trim().is_empty() {
            return Err(RelingoError::ConfigInvalid(
                "api_key is required when api_key_field is set".to_string(),
            ));
        }

        common::validate_timing(config.timeout_secs, config.retry_count)
    }

    async fn translate_raw(&self, request: AdapterRequest<'_>) -> Result<String> {
        let options = self.build_request(&request)?;

        debug!("Sending {:?} request to custom API: {}", options.method, self.config.endpoint);

        let response = self
            .transport
            .send(&self.config.endpoint, &options)
            .await
            .map_err(|e| self.describe_error(e))?;

        self.parse_response(&response.data)
    }
}
