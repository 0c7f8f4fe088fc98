// crates/portico-rpc/src/descriptor.rs
//
// Static description of an RPC method: where it lives on the wire, what it
// exchanges, and (optionally) which REST verb and path the gateway exposes
// it under. Descriptors are consts declared next to the handlers.

use std::fmt;

/// HTTP verbs a method can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    /// The equivalent `http::Method`.
    pub fn as_method(&self) -> http::Method {
        match self {
            HttpVerb::Get => http::Method::GET,
            HttpVerb::Post => http::Method::POST,
            HttpVerb::Put => http::Method::PUT,
            HttpVerb::Patch => http::Method::PATCH,
            HttpVerb::Delete => http::Method::DELETE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// REST binding of a method: verb plus a path template such as `/users/{id}`.
/// Template variables name fields of the request message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HttpRule {
    pub verb: HttpVerb,
    pub path: &'static str,
}

impl HttpRule {
    /// Names of the `{...}` variables in the path template, in order.
    pub fn variables(&self) -> Vec<&'static str> {
        self.path
            .split('/')
            .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
            .collect()
    }
}

/// Description of one unary RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Fully-qualified service name, e.g. `platform.v1.PlatformService`.
    pub service: &'static str,
    /// Method name within the service, e.g. `Ping`.
    pub method: &'static str,
    /// Fully-qualified request message name.
    pub input_type: &'static str,
    /// Fully-qualified response message name.
    pub output_type: &'static str,
    /// Optional REST binding used by the gateway.
    pub http: Option<HttpRule>,
}

impl MethodDescriptor {
    pub const fn new(
        service: &'static str,
        method: &'static str,
        input_type: &'static str,
        output_type: &'static str,
    ) -> Self {
        Self {
            service,
            method,
            input_type,
            output_type,
            http: None,
        }
    }

    /// Bind the method to a REST verb and path template.
    pub const fn with_http(self, verb: HttpVerb, path: &'static str) -> Self {
        Self {
            http: Some(HttpRule { verb, path }),
            ..self
        }
    }

    /// Wire path of the method: `/{service}/{method}`.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }

    /// Check that the names can form a routable path and that any REST
    /// template is well formed.
    pub fn validate(&self) -> Result<(), String> {
        for (label, value) in [("service", self.service), ("method", self.method)] {
            if value.is_empty() || value.contains('/') || value.contains(char::is_whitespace) {
                return Err(format!("{} name '{}' is not routable", label, value));
            }
        }
        if let Some(rule) = &self.http {
            if !rule.path.starts_with('/') {
                return Err(format!("http path '{}' must start with '/'", rule.path));
            }
            for segment in rule.path.split('/') {
                let opens = segment.contains('{');
                let closes = segment.contains('}');
                let whole = segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2;
                if (opens || closes) && !whole {
                    return Err(format!("http path '{}' has a malformed segment '{}'", rule.path, segment));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET_THING: MethodDescriptor =
        MethodDescriptor::new("demo.v1.Things", "GetThing", "demo.v1.GetThingRequest", "demo.v1.Thing")
            .with_http(HttpVerb::Get, "/things/{id}/parts/{part}");

    #[test]
    fn path_joins_service_and_method() {
        assert_eq!(GET_THING.path(), "/demo.v1.Things/GetThing");
    }

    #[test]
    fn template_variables_are_listed_in_order() {
        let rule = GET_THING.http.unwrap();
        assert_eq!(rule.variables(), vec!["id", "part"]);
    }

    #[test]
    fn validate_rejects_bad_names_and_templates() {
        assert!(GET_THING.validate().is_ok());

        let slashed = MethodDescriptor::new("a/b", "M", "I", "O");
        assert!(slashed.validate().is_err());

        let relative = MethodDescriptor::new("s", "M", "I", "O").with_http(HttpVerb::Get, "things");
        assert!(relative.validate().is_err());

        let broken = MethodDescriptor::new("s", "M", "I", "O").with_http(HttpVerb::Get, "/things/{id");
        assert!(broken.validate().is_err());
    }
}
