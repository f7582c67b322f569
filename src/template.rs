//! `%KEY%` placeholder templates, cached through [`mache::Mache`].

use std::collections::BTreeMap;

use bytes::Bytes;
use mache::{BuildError, ObjectBuilder};

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    /// Interpret `content` as a UTF-8 template.
    pub fn from_bytes(content: Bytes) -> Result<Self, BuildError> {
        let source = String::from_utf8(content.to_vec()).map_err(BuildError::new)?;
        Ok(Self { source })
    }

    /// Substitute every `%KEY%` occurrence with the matching value.
    ///
    /// Placeholders without a value are left as they are.
    pub fn render(&self, vars: &BTreeMap<String, String>) -> String {
        vars.iter()
            .fold(self.source.clone(), |rendered, (key, value)| {
                rendered.replace(&format!("%{key}%"), value)
            })
    }
}

/// Builds [`Template`]s from file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateBuilder;

impl ObjectBuilder<Template> for TemplateBuilder {
    async fn build(&self, _key: &str, content: Bytes) -> Result<Template, BuildError> {
        Template::from_bytes(content)
    }
}

/// Parse a `KEY=VALUE` command line argument.
pub fn parse_var(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got {arg:?}")),
    }
}
