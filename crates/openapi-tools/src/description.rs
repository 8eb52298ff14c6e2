//! Markdown-ish prose describing a tool to the model that will call it.

use crate::model::{Endpoint, MediaTypeSpec};
use crate::resolver::OpenApiResolver;
use serde_json::Value;

pub const NO_SUMMARY: &str = "No summary available.";

/// Summary line shown next to the tool name in listings.
#[must_use]
pub fn tool_summary(endpoint: &Endpoint) -> String {
    endpoint
        .summary
        .clone()
        .unwrap_or_else(|| NO_SUMMARY.to_string())
}

/// Build the full description: API and controller, summary, parameters, request body schema
/// and the declared responses.
#[must_use]
pub fn describe_endpoint(endpoint: &Endpoint, resolver: &OpenApiResolver) -> String {
    let mut lines = vec![format!(
        "API: {}. Controller: {}. Summary: {}",
        endpoint.project_id,
        endpoint.controller(),
        endpoint.summary.as_deref().unwrap_or(NO_SUMMARY)
    )];
    if let Some(desc) = &endpoint.description {
        lines.push(desc.trim().to_string());
    }

    let params: Vec<_> = endpoint.visible_parameters().collect();
    if !params.is_empty() {
        lines.push("Request parameters:".to_string());
        lines.extend(params.into_iter().map(|p| {
            format!(
                "- **{}** ({}, {}): {}{}",
                p.name,
                p.location,
                p.param_type,
                p.description.as_deref().unwrap_or(""),
                if p.required { " (required)" } else { "" }
            )
        }));
    }

    if let Some(body) = &endpoint.request_body
        && let Some((media_type, media)) = body.preferred_media_type()
    {
        lines.push("Request body:".to_string());
        if let Some(desc) = body.description.as_deref() {
            lines.push(desc.trim().to_string());
        }
        if let Some(source) = &media.schema {
            let tree = resolver.expand_schema(&source.doc, &source.schema);
            if tree.get("properties").is_none() {
                lines.push(format!("Sent as `{media_type}`:"));
            }
            lines.push(format!("```json\n{}\n```", pretty(&tree)));
        }
    }

    if !endpoint.responses.is_empty() {
        lines.push("Possible responses:".to_string());
        for (code, response) in &endpoint.responses {
            lines.push(format!("- **{code}**: {}", response.description));

            if !response.headers.is_empty() {
                lines.push("  - Response headers:".to_string());
                lines.extend(response.headers.iter().map(|(name, header)| {
                    format!(
                        "    - **{name}**: {}",
                        header.description.as_deref().unwrap_or("")
                    )
                }));
            }

            for (media_type, media) in &response.content {
                describe_response_media(&mut lines, resolver, media_type, media);
            }
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Named examples win over a single example, which wins over the expanded schema.
fn describe_response_media(
    lines: &mut Vec<String>,
    resolver: &OpenApiResolver,
    media_type: &str,
    media: &MediaTypeSpec,
) {
    if !media.examples.is_empty() {
        lines.push(format!("  - Response examples (`{media_type}`):"));
        for (name, example) in &media.examples {
            lines.push(format!("    - Example '{name}':"));
            if let Some(desc) = example.description.as_deref().or(example.summary.as_deref()) {
                lines.push(format!("      > {desc}"));
            }
            if let Some(value) = &example.value {
                lines.push(format!("      ```json\n{}\n      ```", pretty(value)));
            }
        }
    } else if let Some(example) = &media.example {
        lines.push(format!("  - Response example (`{media_type}`):"));
        lines.push(format!("    ```json\n{}\n    ```", pretty(example)));
    } else if let Some(source) = &media.schema {
        let tree = resolver.expand_schema(&source.doc, &source.schema);
        lines.push(format!("  - Response structure (`{media_type}`):"));
        lines.push(format!("    ```json\n{}\n    ```", pretty(&tree)));
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SpecLoader;

    fn describe(yaml: &str) -> String {
        let doc = SpecLoader::new("http://localhost:8080")
            .load_str("test", yaml)
            .unwrap();
        describe_endpoint(&doc.endpoints[0], &doc.resolver)
    }

    #[test]
    fn every_line_ends_with_a_newline() {
        let text = describe(
            "openapi: 3.0.0\ninfo: { title: Ping, version: '1' }\npaths:\n  /ping:\n    get:\n      operationId: ping\n      summary: Ping it\n      responses:\n        '204': { description: No content }\n",
        );
        assert_eq!(
            text,
            "API: ping. Controller: general. Summary: Ping it\nPossible responses:\n- **204**: No content\n"
        );
    }

    #[test]
    fn header_line_and_parameters() {
        let text = describe(
            r"
info: { title: Shop, version: '1' }
paths:
  /orders/{id}:
    get:
      tags: [order-controller]
      summary: Fetch one order
      parameters:
        - { name: id, in: path, description: Order id, schema: { type: integer } }
        - { name: expand, in: query, schema: { type: boolean } }
        - { name: Authorization, in: header, schema: { type: string } }
",
        );
        assert!(text.starts_with("API: shop. Controller: order. Summary: Fetch one order\n"));
        assert!(text.contains("- **id** (path, integer): Order id (required)\n"));
        assert!(text.contains("- **expand** (query, boolean): \n"));
        assert!(!text.contains("Authorization"));
    }

    #[test]
    fn missing_summary_uses_placeholder() {
        let text = describe("paths:\n  /ping:\n    get: {}\n");
        assert!(text.contains("Controller: general. Summary: No summary available."));
    }

    #[test]
    fn body_schema_is_embedded_as_json() {
        let text = describe(
            r"
components:
  schemas:
    Order:
      type: object
      properties:
        sku: { type: string }
paths:
  /orders:
    post:
      requestBody:
        content:
          application/json:
            schema: { $ref: '#/components/schemas/Order' }
",
        );
        assert!(text.contains("Request body:\n```json\n"));
        assert!(text.contains("\"sku\""));
    }

    #[test]
    fn responses_prefer_named_examples_then_example_then_schema() {
        let text = describe(
            r"
paths:
  /things:
    get:
      responses:
        '200':
          description: OK
          headers:
            X-Rate-Limit: { description: Calls left }
          content:
            application/json:
              examples:
                small:
                  description: A short list
                  value: [1]
        '404':
          description: Not found
          content:
            application/json:
              example: { message: nope }
        default:
          description: Error
          content:
            application/json:
              schema:
                type: object
                properties:
                  code: { type: integer }
",
        );
        assert!(text.contains("- **200**: OK\n  - Response headers:\n    - **X-Rate-Limit**: Calls left\n"));
        assert!(text.contains("    - Example 'small':\n      > A short list\n"));
        assert!(text.contains("  - Response example (`application/json`):"));
        assert!(text.contains("\"message\": \"nope\""));
        assert!(text.contains("- **default**: Error\n  - Response structure (`application/json`):"));
    }
}
