// crates/portico-gateway/src/route.rs
//
// A GatewayRoute binds one HTTP verb + path template to one RPC method.
// Built once at registration; immutable afterwards.

use axum::routing::MethodFilter;

use portico_rpc::{HttpVerb, RestMapping};

use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct GatewayRoute {
    verb: HttpVerb,
    template: &'static str,
    mapping: RestMapping,
}

impl GatewayRoute {
    /// Build a route from a mapping. The mapping must carry an HTTP binding
    /// whose template starts with `/` and uses whole-segment `{name}`
    /// variables.
    pub fn from_mapping(mapping: RestMapping) -> Result<Self, GatewayError> {
        let descriptor = *mapping.descriptor();
        let invalid = |reason: String| GatewayError::InvalidRoute {
            method: descriptor.path(),
            reason,
        };

        let rule = descriptor
            .http
            .ok_or_else(|| invalid("no HTTP binding".to_string()))?;
        descriptor.validate().map_err(invalid)?;

        Ok(Self {
            verb: rule.verb,
            template: rule.path,
            mapping,
        })
    }

    pub fn verb(&self) -> HttpVerb {
        self.verb
    }

    /// Declared path template, e.g. `/users/{id}`.
    pub fn template(&self) -> &'static str {
        self.template
    }

    pub fn mapping(&self) -> &RestMapping {
        &self.mapping
    }

    /// The template in axum's path syntax: `/users/{id}` -> `/users/:id`.
    pub fn axum_path(&self) -> String {
        to_axum_path(self.template)
    }

    pub(crate) fn method_filter(&self) -> MethodFilter {
        match self.verb {
            HttpVerb::Get => MethodFilter::GET,
            HttpVerb::Post => MethodFilter::POST,
            HttpVerb::Put => MethodFilter::PUT,
            HttpVerb::Patch => MethodFilter::PATCH,
            HttpVerb::Delete => MethodFilter::DELETE,
        }
    }
}

fn to_axum_path(template: &str) -> String {
    template
        .split('/')
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => format!(":{}", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
