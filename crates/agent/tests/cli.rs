use anyhow::Context as _;
use serde_json::{Value, json};
use std::path::Path;
use swagger_agent_test_support::EchoServer;
use tempfile::tempdir;
use tokio::process::Command;

fn write_pets_spec(dir: &Path, base_url: &str) -> anyhow::Result<()> {
    std::fs::write(
        dir.join("pets.yaml"),
        format!(
            r"
openapi: 3.0.3
info: {{ title: Pet Store, version: '1' }}
servers: [{{ url: '{base_url}' }}]
paths:
  /pets/{{petId}}:
    get:
      operationId: getPetById
      tags: [pet-controller]
      summary: Find a pet
      parameters:
        - {{ name: petId, in: path, required: true, schema: {{ type: integer }} }}
"
        ),
    )
    .context("write pets.yaml")
}

async fn run(specs: &Path, args: &[&str]) -> anyhow::Result<std::process::Output> {
    Command::new(env!("CARGO_BIN_EXE_swagger-agent"))
        .arg("--specs-dir")
        .arg(specs)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("SWAGGER_AGENT_AUTH_TOKEN")
        .env_remove("SWAGGER_AGENT_TRAFFIC_CODE")
        .output()
        .await
        .context("run swagger-agent")
}

fn stdout_json(output: &std::process::Output) -> anyhow::Result<Value> {
    serde_json::from_slice(&output.stdout).with_context(|| {
        format!(
            "stdout is not JSON; stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[tokio::test]
async fn tools_lists_by_project() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_pets_spec(dir.path(), "http://localhost:9")?;

    let output = run(dir.path(), &["tools"]).await?;
    assert!(output.status.success());
    let listing = stdout_json(&output)?;
    assert_eq!(listing["totalTools"], 1);
    let tool = &listing["toolsByProject"]["pet-store"][0];
    assert_eq!(tool["name"], "pet_store-pet-get_pet_by_id");
    assert_eq!(tool["method"], "GET");
    assert_eq!(tool["path"], "/pets/{petId}");
    assert_eq!(tool["baseUrl"], "http://localhost:9");
    Ok(())
}

#[tokio::test]
async fn describe_prints_schema_and_rejects_unknown_tools() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_pets_spec(dir.path(), "http://localhost:9")?;

    let output = run(dir.path(), &["describe", "pet_store-pet-get_pet_by_id"]).await?;
    assert!(output.status.success());
    let described = stdout_json(&output)?;
    assert_eq!(described["summary"], "Find a pet");
    assert_eq!(
        described["inputSchema"],
        json!({
            "type": "object",
            "properties": {"petId": {"type": "number"}},
            "required": ["petId"]
        })
    );

    let output = run(dir.path(), &["describe", "nope"]).await?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown tool 'nope'"));
    Ok(())
}

#[tokio::test]
async fn call_prints_execution_result() -> anyhow::Result<()> {
    let server = EchoServer::start().await?;
    let dir = tempdir()?;
    write_pets_spec(dir.path(), server.base_url())?;

    let output = run(
        dir.path(),
        &[
            "call",
            "pet_store-pet-get_pet_by_id",
            r#"{"petId": 42}"#,
            "--auth-token",
            "cli-token",
        ],
    )
    .await?;
    assert!(output.status.success());
    let result = stdout_json(&output)?;
    assert_eq!(result["httpStatusCode"], 200);
    let echoed: Value = serde_json::from_str(result["body"].as_str().context("body")?)?;
    assert_eq!(echoed["path"], "/pets/42");
    assert_eq!(echoed["headers"]["authorization"], "Bearer cli-token");

    server.shutdown().await
}

#[tokio::test]
async fn missing_specs_directory_fails_startup() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let output = run(&dir.path().join("missing"), &["tools"]).await?;
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    Ok(())
}
