//! Pure transforms over a dereferenced API document.
//!
//! Every function takes the document by reference and returns a new one, so
//! the whole transformation can be tested without provisioning anything.

use crate::core::types::{SkipReason, SkippedBinding};
use serde_json::{json, Map, Value};

/// Operation keys of an OpenAPI path item.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Authorizer result cache, in seconds.
pub const AUTHORIZER_CACHE_TTL_SECONDS: u64 = 300;

pub const CORS_EXTENSION: &str = "x-amazon-apigateway-cors";
pub const INTEGRATION_EXTENSION: &str = "x-amazon-apigateway-integration";
pub const AUTHORIZER_EXTENSION: &str = "x-amazon-apigateway-authorizer";

/// A transformed document plus what did and did not attach.
#[derive(Debug, Clone)]
pub struct BindOutcome {
    pub document: Value,
    /// (path, method) pairs that received a binding
    pub bound: Vec<(String, String)>,
    pub skipped: Vec<SkippedBinding>,
}

/// Gateway-side URI that invokes a function.
pub fn invocation_uri(region: &str, function_arn: &str) -> String {
    format!(
        "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{}/invocations",
        region, function_arn
    )
}

/// Add a wildcard CORS policy.
pub fn with_cors(doc: &Value) -> Value {
    let mut out = doc.clone();
    if let Some(root) = out.as_object_mut() {
        root.insert(
            CORS_EXTENSION.to_string(),
            json!({
                "allowOrigins": ["*"],
                "allowMethods": ["*"],
                "allowHeaders": ["*"],
                "exposeHeaders": ["*"],
                "maxAge": 3600
            }),
        );
    }
    out
}

/// Rewrite the descriptive metadata for a project and stage.
pub fn with_metadata(doc: &Value, project: &str, stage: &str) -> Value {
    let mut out = doc.clone();
    if let Some(root) = out.as_object_mut() {
        let info = root
            .entry("info")
            .or_insert_with(|| Value::Object(Map::new()));
        if !info.is_object() {
            *info = Value::Object(Map::new());
        }
        if let Some(info) = info.as_object_mut() {
            info.insert("title".to_string(), json!(format!("{}-{}", project, stage)));
            info.insert(
                "description".to_string(),
                json!(format!("{} API, stage {}", project, stage)),
            );
        }
    }
    out
}

/// Attach a proxy integration to every operation under each listed path.
/// Paths absent from the document are reported, not bound.
pub fn bind_controller(doc: &Value, controller: &str, paths: &[String], uri: &str) -> BindOutcome {
    let mut out = doc.clone();
    let mut bound = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        let item = out
            .get_mut("paths")
            .and_then(|p| p.get_mut(path.as_str()))
            .and_then(Value::as_object_mut);
        let Some(item) = item else {
            skipped.push(SkippedBinding {
                controller: controller.to_string(),
                path: path.clone(),
                reason: SkipReason::PathNotInDocument,
            });
            continue;
        };
        for method in HTTP_METHODS {
            if let Some(op) = item.get_mut(method).and_then(Value::as_object_mut) {
                op.insert(
                    INTEGRATION_EXTENSION.to_string(),
                    json!({
                        "type": "aws_proxy",
                        "httpMethod": "POST",
                        "uri": uri,
                        "payloadFormatVersion": "2.0"
                    }),
                );
                bound.push((path.clone(), method.to_string()));
            }
        }
    }

    BindOutcome {
        document: out,
        bound,
        skipped,
    }
}

/// Install a request authorizer on the security scheme named after the
/// controller. A missing scheme is reported, not created.
pub fn bind_authorizer(doc: &Value, controller: &str, uri: &str) -> BindOutcome {
    let mut out = doc.clone();
    let scheme = out
        .get_mut("components")
        .and_then(|c| c.get_mut("securitySchemes"))
        .and_then(|s| s.get_mut(controller))
        .and_then(Value::as_object_mut);

    let Some(scheme) = scheme else {
        return BindOutcome {
            document: out,
            bound: Vec::new(),
            skipped: vec![SkippedBinding {
                controller: controller.to_string(),
                path: controller.to_string(),
                reason: SkipReason::SecuritySchemeMissing,
            }],
        };
    };

    scheme.insert("type".to_string(), json!("apiKey"));
    scheme.insert("name".to_string(), json!("Authorization"));
    scheme.insert("in".to_string(), json!("header"));
    scheme.insert(
        AUTHORIZER_EXTENSION.to_string(),
        json!({
            "type": "request",
            "identitySource": "$request.header.Authorization",
            "authorizerUri": uri,
            "authorizerPayloadFormatVersion": "2.0",
            "authorizerResultTtlInSeconds": AUTHORIZER_CACHE_TTL_SECONDS,
            "enableSimpleResponses": true
        }),
    );

    BindOutcome {
        document: out,
        bound: vec![(controller.to_string(), "authorizer".to_string())],
        skipped: Vec::new(),
    }
}

/// Every (path, method, integration uri) in the document, in document order.
pub fn integrations(doc: &Value) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return out;
    };
    for (path, item) in paths {
        for method in HTTP_METHODS {
            let uri = item
                .get(method)
                .and_then(|op| op.get(INTEGRATION_EXTENSION))
                .and_then(|i| i.get("uri"))
                .and_then(Value::as_str);
            if let Some(uri) = uri {
                out.push((path.clone(), method.to_string(), uri.to_string()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn books_doc() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Books", "version": "1.0.0"},
            "paths": {
                "/books": {
                    "summary": "collection",
                    "get": {"operationId": "listBooks"},
                    "post": {"operationId": "createBook"}
                },
                "/books/{bookId}": {
                    "parameters": [{"name": "bookId", "in": "path"}],
                    "get": {"operationId": "getBook"},
                    "put": {"operationId": "updateBook"},
                    "delete": {"operationId": "deleteBook"}
                },
                "/topics": {"get": {"operationId": "listTopics"}}
            },
            "components": {
                "securitySchemes": {"auth": {"type": "apiKey"}}
            }
        })
    }

    #[test]
    fn test_invocation_uri() {
        assert_eq!(
            invocation_uri("eu-south-1", "${books.Arn}"),
            "arn:aws:apigateway:eu-south-1:lambda:path/2015-03-31/functions/${books.Arn}/invocations"
        );
    }

    #[test]
    fn test_with_cors_is_pure() {
        let doc = books_doc();
        let out = with_cors(&doc);
        assert!(doc.get(CORS_EXTENSION).is_none());
        assert_eq!(out[CORS_EXTENSION]["allowOrigins"], json!(["*"]));
        assert_eq!(out[CORS_EXTENSION]["allowMethods"], json!(["*"]));
        assert_eq!(out[CORS_EXTENSION]["allowHeaders"], json!(["*"]));
    }

    #[test]
    fn test_with_metadata() {
        let out = with_metadata(&books_doc(), "members", "dev");
        assert_eq!(out["info"]["title"], "members-dev");
        assert_eq!(out["info"]["description"], "members API, stage dev");
        assert_eq!(out["info"]["version"], "1.0.0");
    }

    #[test]
    fn test_with_metadata_creates_info() {
        let out = with_metadata(&json!({"paths": {}}), "members", "prod");
        assert_eq!(out["info"]["title"], "members-prod");
    }

    #[test]
    fn test_bind_controller_all_methods() {
        let paths = vec!["/books".to_string(), "/books/{bookId}".to_string()];
        let outcome = bind_controller(&books_doc(), "books", &paths, "uri:books");
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.bound.len(), 5);

        let bound = integrations(&outcome.document);
        assert_eq!(bound.len(), 5);
        assert!(bound.iter().all(|(_, _, uri)| uri == "uri:books"));
        let integration = &outcome.document["paths"]["/books"]["get"][INTEGRATION_EXTENSION];
        assert_eq!(integration["type"], "aws_proxy");
        assert_eq!(integration["payloadFormatVersion"], "2.0");
        // non-operation keys untouched
        assert_eq!(outcome.document["paths"]["/books"]["summary"], "collection");
        assert!(outcome.document["paths"]["/books/{bookId}"]["parameters"].is_array());
    }

    #[test]
    fn test_bind_controller_skips_absent_path() {
        let paths = vec!["/books".to_string(), "/books/{bookId}/cover".to_string()];
        let outcome = bind_controller(&books_doc(), "books", &paths, "uri:books");
        assert_eq!(outcome.bound.len(), 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, "/books/{bookId}/cover");
        assert_eq!(outcome.skipped[0].reason, SkipReason::PathNotInDocument);
        assert!(outcome.document["paths"].get("/books/{bookId}/cover").is_none());
    }

    #[test]
    fn test_bind_controller_leaves_other_paths() {
        let paths = vec!["/books".to_string()];
        let outcome = bind_controller(&books_doc(), "books", &paths, "uri:books");
        assert!(outcome.document["paths"]["/topics"]["get"]
            .get(INTEGRATION_EXTENSION)
            .is_none());
    }

    #[test]
    fn test_bind_authorizer() {
        let outcome = bind_authorizer(&books_doc(), "auth", "uri:auth");
        assert!(outcome.skipped.is_empty());
        let scheme = &outcome.document["components"]["securitySchemes"]["auth"];
        assert_eq!(scheme["in"], "header");
        let authorizer = &scheme[AUTHORIZER_EXTENSION];
        assert_eq!(authorizer["type"], "request");
        assert_eq!(authorizer["authorizerUri"], "uri:auth");
        assert_eq!(authorizer["authorizerResultTtlInSeconds"], 300);
        assert_eq!(authorizer["enableSimpleResponses"], true);
    }

    #[test]
    fn test_bind_authorizer_name_mismatch() {
        let outcome = bind_authorizer(&books_doc(), "authorizer", "uri:auth");
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason, SkipReason::SecuritySchemeMissing);
        assert_eq!(outcome.document, books_doc());
    }
}
