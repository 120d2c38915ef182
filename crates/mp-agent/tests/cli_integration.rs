//! CLI integration tests
//!
//! Tests the mcp-pipe binary using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary with a clean environment and an empty config directory
fn mcp_pipe(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mcp-pipe")
        .expect("Failed to locate mcp-pipe binary - ensure it's built before running tests");
    cmd.env_remove("MCP_ENDPOINT")
        .env_remove("RUST_LOG")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path());
    cmd
}

/// A ws:// endpoint on a port with nothing listening
#[cfg(unix)]
fn refused_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    format!("ws://127.0.0.1:{}/mcp/", port)
}

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    mcp_pipe(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("mcp-pipe"))
        .stdout(predicate::str::contains("--endpoint"))
        .stdout(predicate::str::contains("COMMAND"));
}

#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    mcp_pipe(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mcp-pipe"));
}

#[test]
fn test_missing_endpoint_fails_before_connecting() {
    let home = TempDir::new().unwrap();
    mcp_pipe(&home)
        .args(["python", "server.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MCP_ENDPOINT"))
        .stderr(predicate::str::contains("Connecting").not());
}

#[test]
fn test_missing_command_fails() {
    let home = TempDir::new().unwrap();
    mcp_pipe(&home)
        .env("MCP_ENDPOINT", "wss://api.example.com/mcp/")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing command"));
}

#[test]
fn test_non_websocket_endpoint_rejected() {
    let home = TempDir::new().unwrap();
    mcp_pipe(&home)
        .env("MCP_ENDPOINT", "http://api.example.com/mcp/")
        .arg("cat")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid endpoint"));
}

#[test]
fn test_endpoint_flag_is_validated() {
    let home = TempDir::new().unwrap();
    mcp_pipe(&home)
        .args(["--endpoint", "not a url", "cat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid endpoint"));
}

#[test]
fn test_explicit_config_must_exist() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("missing.toml");
    mcp_pipe(&home)
        .env("MCP_ENDPOINT", "wss://api.example.com/mcp/")
        .arg("--config")
        .arg(&missing)
        .arg("cat")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_config_file_supplies_command() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("mcp-pipe.toml");
    std::fs::write(
        &path,
        "endpoint = \"http://api.example.com/mcp/\"\ncommand = [\"cat\"]\n",
    )
    .unwrap();

    // The file's endpoint is read, so validation gets past the command
    mcp_pipe(&home)
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid endpoint"))
        .stderr(predicate::str::contains("Missing command").not());
}

#[cfg(unix)]
mod signals {
    use std::process::{Child, ExitStatus, Stdio};
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    use tempfile::TempDir;

    use super::refused_endpoint;

    fn spawn_bridge(home: &TempDir, endpoint: &str, args: &[&str]) -> Child {
        std::process::Command::new(assert_cmd::cargo::cargo_bin("mcp-pipe"))
            .env_remove("RUST_LOG")
            .env("HOME", home.path())
            .env("XDG_CONFIG_HOME", home.path())
            .env("MCP_ENDPOINT", endpoint)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    fn sigterm(child: &Child) {
        let killed = std::process::Command::new("kill")
            .args(["-TERM", &child.id().to_string()])
            .status()
            .unwrap();
        assert!(killed.success());
    }

    fn wait_with_deadline(child: &mut Child, limit: Duration) -> ExitStatus {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait().unwrap() {
                return status;
            }
            if Instant::now() > deadline {
                let _ = child.kill();
                panic!("mcp-pipe did not exit within {:?}", limit);
            }
            sleep(Duration::from_millis(50));
        }
    }

    #[test]
    fn test_sigterm_shuts_down_cleanly() {
        let home = TempDir::new().unwrap();
        let mut child = spawn_bridge(&home, &refused_endpoint(), &["cat"]);

        // Give the bridge time to fail its first attempt and start backing off
        sleep(Duration::from_millis(500));
        sigterm(&child);

        let status = wait_with_deadline(&mut child, Duration::from_secs(10));
        assert!(status.success(), "exit status: {:?}", status);
    }

    #[test]
    fn test_second_sigterm_skips_child_grace() {
        let home = TempDir::new().unwrap();
        let config = home.path().join("mcp-pipe.toml");
        std::fs::write(&config, "child_grace = 30\n").unwrap();
        let config = config.to_str().unwrap();

        // Server that accepts one WebSocket client and holds the connection open
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (connected_tx, connected) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut ws = tokio_tungstenite::tungstenite::accept(socket).unwrap();
            connected_tx.send(()).unwrap();
            while ws.read().is_ok() {}
        });

        // The child ignores end-of-input, so graceful teardown would last the grace period
        let endpoint = format!("ws://127.0.0.1:{}/mcp/", port);
        let mut child = spawn_bridge(&home, &endpoint, &["--config", config, "sleep", "10"]);

        connected.recv_timeout(Duration::from_secs(10)).unwrap();
        sleep(Duration::from_millis(300));

        sigterm(&child);
        sleep(Duration::from_millis(300));
        assert!(child.try_wait().unwrap().is_none(), "first SIGTERM should wait for teardown");

        sigterm(&child);
        let status = wait_with_deadline(&mut child, Duration::from_secs(3));
        assert_eq!(status.code(), Some(143));
    }
}
