//! The dispatcher spoken to with raw JSON lines.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use std::os::unix::fs::PermissionsExt;

use jsc_core::{Assembly, HandlerError, Server, ServerError, Wire};
use jsc_test_utils::TestAssembly;

struct Raw {
    lines: tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
    writer: tokio::io::WriteHalf<DuplexStream>,
    server: tokio::task::JoinHandle<Result<(), ServerError>>,
}

impl Raw {
    fn start(assembly: &TestAssembly) -> Self {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, writer) = tokio::io::split(client);
        let config = assembly.config();
        let server = tokio::spawn(
            Server::new(
                Assembly::from_config(&config),
                Wire::new(server_read, server_write),
            )
            .run(),
        );
        Self {
            lines: BufReader::new(client_read).lines(),
            writer,
            server,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = self.lines.next_line().await.unwrap().expect("server hung up");
        serde_json::from_str(&line).unwrap()
    }

    /// Lock and initialize, as the operator does at session start.
    async fn start_session(&mut self) {
        self.send(r#"{"id":100,"method":"do_lock_session","params":{"hostname":"h","unix_epoch":1}}"#)
            .await;
        assert_eq!(self.recv().await["error"], Value::Null);
        self.send(r#"{"id":101,"method":"do_init","params":{}}"#).await;
        assert_eq!(self.recv().await["error"], Value::Null);
    }

    /// Collect stdout notifications until the response to `id` arrives.
    async fn until_response(&mut self, id: u64) -> (String, Value) {
        let mut stdout = String::new();
        loop {
            let msg = self.recv().await;
            if msg["id"].is_null() {
                stdout.push_str(msg["stdout"].as_str().unwrap_or_default());
            } else {
                assert_eq!(msg["id"], id);
                return (stdout, msg);
            }
        }
    }

    async fn finish(mut self) -> Result<(), ServerError> {
        self.writer.shutdown().await.unwrap();
        self.server.await.unwrap()
    }
}

#[tokio::test]
async fn test_call_and_response_shape() {
    let assembly = TestAssembly::new();
    let mut raw = Raw::start(&assembly);

    raw.send(r#"{"id":7,"method":"do_check_init","params":{}}"#).await;
    assert_eq!(
        raw.recv().await,
        json!({ "id": 7, "result": { "needs_init": true }, "error": null })
    );
    raw.finish().await.unwrap();
}

#[tokio::test]
async fn test_notifications_outside_calls_are_ignored() {
    let assembly = TestAssembly::new();
    let mut raw = Raw::start(&assembly);

    raw.send(r#"{"id":null,"stdin":"ignored"}"#).await;
    raw.send(r#"{"id":1,"method":"do_assert_is_assembly","params":null}"#)
        .await;
    let response = raw.recv().await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["error"], Value::Null);
    raw.finish().await.unwrap();
}

#[tokio::test]
async fn test_progress_precedes_response() {
    let assembly = TestAssembly::new();
    assembly.write_code("index.html", "x");
    let mut raw = Raw::start(&assembly);

    raw.start_session().await;
    raw.send(r#"{"id":2,"method":"do_backup_new","params":{}}"#).await;

    let mut progress = Vec::new();
    let response = loop {
        let msg = raw.recv().await;
        if msg["id"].is_null() {
            progress.push(msg["stdout"].as_str().unwrap_or_default().to_string());
        } else {
            break msg;
        }
    };
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"]["id"], 1);
    assert_eq!(progress.first().map(String::as_str), Some("Creating backup 1\n"));
    raw.finish().await.unwrap();
}

#[tokio::test]
async fn test_garbage_line_ends_session() {
    let assembly = TestAssembly::new();
    let mut raw = Raw::start(&assembly);

    raw.send("this is not json").await;
    let result = raw.finish().await;
    assert!(matches!(result, Err(ServerError::Wire(_))));
}

fn write_init(assembly: &TestAssembly, script: &str) {
    assembly.write_code("init", script);
    let path = assembly.code_path("init");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_run_forwards_terminal_both_ways() {
    let assembly = TestAssembly::new();
    write_init(
        &assembly,
        "#!/bin/sh\nread line\necho \"got:$line\"\nexit 3\n",
    );
    let mut raw = Raw::start(&assembly);
    raw.start_session().await;

    raw.send(r#"{"id":1,"method":"do_run","params":{}}"#).await;
    raw.send(r#"{"id":null,"stdin":"ping\n"}"#).await;
    let (stdout, response) = raw.until_response(1).await;
    assert_eq!(response["error"], Value::Null);
    assert_eq!(response["result"], 3);
    assert!(stdout.contains("got:ping"), "terminal output was {stdout:?}");

    // Plain dispatch resumes once the command is done.
    raw.send(r#"{"id":2,"method":"do_check_init","params":{}}"#).await;
    let (_, response) = raw.until_response(2).await;
    assert_eq!(response["result"]["needs_init"], false);
    raw.finish().await.unwrap();
}

#[tokio::test]
async fn test_call_during_run_ends_session() {
    let assembly = TestAssembly::new();
    write_init(&assembly, "#!/bin/sh\nread line\n");
    let mut raw = Raw::start(&assembly);
    raw.start_session().await;

    raw.send(r#"{"id":1,"method":"do_run","params":{}}"#).await;
    raw.send(r#"{"id":2,"method":"do_version","params":{}}"#).await;
    let result = raw.finish().await;
    match result {
        Err(ServerError::Handler { method, source }) => {
            assert_eq!(method, "do_run");
            assert!(matches!(source, HandlerError::ProtocolViolation(_)));
        }
        other => panic!("expected a protocol violation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_run_without_init_script() {
    let assembly = TestAssembly::new();
    let mut raw = Raw::start(&assembly);
    raw.start_session().await;

    raw.send(r#"{"id":1,"method":"do_run","params":{}}"#).await;
    let (_, response) = raw.until_response(1).await;
    assert_eq!(response["error"]["code"], -32603);
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap_or_default()
            .contains("init does not exist")
    );
    raw.finish().await.unwrap();
}
