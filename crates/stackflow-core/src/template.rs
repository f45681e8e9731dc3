//! Template expansion
//!
//! `deploy.kdl` is rendered with Tera before it is parsed, so the description
//! can refer to `{{ DOMAIN_NAME }}`, `{{ BACKEND_FQDN }}`, values from its own
//! `variables` block and `STACKFLOW_*` environment variables. Later layers
//! replace earlier ones.

use crate::error::{CoreError, Result};
use kdl::{KdlDocument, KdlValue};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// Template variables
pub type Variables = BTreeMap<String, serde_json::Value>;

/// Environment variables with this prefix are visible to templates
pub const ENV_PREFIX: &str = "STACKFLOW_";

#[derive(Default)]
pub struct TemplateProcessor {
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    /// Add a layer of variables on top of the current ones
    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.add_variable(key, value);
        }
    }

    /// Add the `STACKFLOW_*` entries of `vars`, returning how many were taken
    pub fn add_prefixed<I>(&mut self, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut count = 0;
        for (key, value) in vars.into_iter().filter(|(k, _)| k.starts_with(ENV_PREFIX)) {
            debug!(key = %key, "Adding environment variable");
            self.add_variable(key, serde_json::Value::String(value));
            count += 1;
        }
        count
    }

    /// Add `STACKFLOW_*` variables from the process environment
    pub fn add_env_variables(&mut self) {
        let count = self.add_prefixed(std::env::vars());
        info!(env_var_count = count, "Added filtered environment variables");
    }

    /// Render `template`; with `origin` set, failures carry the file path
    pub fn render(&self, template: &str, origin: Option<&Path>) -> Result<String> {
        Tera::one_off(template, &self.context, false).map_err(|e| {
            let message = describe(&e);
            match origin {
                Some(file) => CoreError::TemplateError {
                    file: file.to_path_buf(),
                    line: None,
                    message,
                },
                None => CoreError::TemplateRenderError(message),
            }
        })
    }
}

/// Collect the top-level `variables { ... }` blocks
///
/// The blocks are cut out before rendering and parsed on their own, so
/// template expressions elsewhere in the file need not be valid KDL yet.
pub fn extract_variables(content: &str) -> Result<Variables> {
    let re = Regex::new(r"(?ms)^\s*variables\s*\{(?P<body>[^{}]*)\}")
        .map_err(|e| CoreError::InvalidConfig(format!("variables pattern: {}", e)))?;

    let mut variables = Variables::new();
    for body in re.captures_iter(content).filter_map(|c| c.name("body")) {
        let doc: KdlDocument = body.as_str().parse().map_err(|e| {
            CoreError::InvalidConfig(format!("variables block is not valid KDL: {}", e))
        })?;
        for node in doc.nodes() {
            if let Some(entry) = node.entries().iter().find(|e| e.name().is_none()) {
                variables.insert(node.name().value().to_string(), to_json(entry.value()));
            }
        }
    }
    Ok(variables)
}

fn to_json(value: &KdlValue) -> serde_json::Value {
    match value {
        KdlValue::String(s) => serde_json::Value::String(s.clone()),
        KdlValue::Integer(i) => i64::try_from(*i)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(i.to_string())),
        KdlValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        KdlValue::Bool(b) => serde_json::Value::Bool(*b),
        KdlValue::Null => serde_json::Value::Null,
    }
}

/// Flatten Tera's error chain; undefined variables get a hint
fn describe(e: &tera::Error) -> String {
    use std::error::Error;

    let mut chain = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        chain.push(err.to_string());
        source = err.source();
    }
    let joined = chain.join(" | ");

    let undefined = joined
        .split_once("Variable `")
        .and_then(|(_, rest)| rest.split_once("` not found"))
        .map(|(name, _)| name);
    match undefined {
        Some(name) => format!(
            "undefined variable: `{}`\nhint: define it in the variables block or as a {}* environment variable",
            name, ENV_PREFIX
        ),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_variable_expansion() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("DOMAIN_NAME", serde_json::json!("example.com"));

        let result = processor.render(r#"zone "{{ DOMAIN_NAME }}""#, None).unwrap();
        assert_eq!(result, r#"zone "example.com""#);
    }

    #[test]
    fn test_later_layer_wins() {
        let mut processor = TemplateProcessor::new();
        processor.add_variables(Variables::from([(
            "BACKEND_FQDN".to_string(),
            serde_json::json!("from-file.example.com"),
        )]));
        processor.add_variable("BACKEND_FQDN", serde_json::json!("api.example.com"));
        assert_eq!(
            processor.render("{{ BACKEND_FQDN }}", None).unwrap(),
            "api.example.com"
        );
    }

    #[test]
    fn test_undefined_variable_hint() {
        let processor = TemplateProcessor::new();
        match processor.render("{{ app_ref }}", None).unwrap_err() {
            CoreError::TemplateRenderError(message) => {
                assert!(message.contains("undefined variable: `app_ref`"));
                assert!(message.contains("STACKFLOW_*"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_only_prefixed_variables_are_taken() {
        let mut processor = TemplateProcessor::new();
        let taken = processor.add_prefixed([
            ("STACKFLOW_APP_REF".to_string(), "v1.2.0".to_string()),
            ("STRIPE_SECRET".to_string(), "sk_live_x".to_string()),
        ]);
        assert_eq!(taken, 1);
        assert_eq!(
            processor.render("{{ STACKFLOW_APP_REF }}", None).unwrap(),
            "v1.2.0"
        );
        assert!(processor.render("{{ STRIPE_SECRET }}", None).is_err());
    }

    #[test]
    fn test_extract_variables() {
        let kdl = r#"
project "rese"

variables {
    app_ref "v1.0.0"
    instances 1
    ssh #true
}

backend {
    application {
        ref "{{ app_ref }}"
    }
}
"#;
        let vars = extract_variables(kdl).unwrap();
        assert_eq!(vars.len(), 3);
        assert_eq!(vars["app_ref"], "v1.0.0");
        assert_eq!(vars["instances"], 1);
        assert_eq!(vars["ssh"], true);
    }

    #[test]
    fn test_render_with_origin_reports_path() {
        let processor = TemplateProcessor::new();
        let path = Path::new("/srv/rese/deploy.kdl");
        match processor.render("region \"{{ missing }}\"", Some(path)).unwrap_err() {
            CoreError::TemplateError { file, message, .. } => {
                assert_eq!(file, path);
                assert!(message.contains("missing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
