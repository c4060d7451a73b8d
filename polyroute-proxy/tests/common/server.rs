// See mod.rs for why this is needed.
#![allow(dead_code)]

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// A managed mock backend process (HTTP backend + gRPC backend + region
/// lookup on ephemeral ports). Killed when dropped.
pub struct MockBackend {
    process: Child,
    pub http_port: u16,
    pub grpc_port: u16,
    pub lookup_port: u16,
}

impl MockBackend {
    /// Start a mockbackend process serving all three endpoints.
    ///
    /// Panics if the process fails to start or the ports are not ready
    /// within 10s.
    pub fn start(name: &str) -> Self {
        let http_port = find_free_port();
        let grpc_port = find_free_port();
        let lookup_port = find_free_port();

        let process = Command::new(workspace_bin("mockbackend"))
            .args([
                "--name",
                name,
                "--http-port",
                &http_port.to_string(),
                "--grpc-port",
                &grpc_port.to_string(),
                "--lookup-port",
                &lookup_port.to_string(),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start mockbackend");

        for port in [http_port, grpc_port, lookup_port] {
            wait_for_port(port, Duration::from_secs(10));
        }

        MockBackend {
            process,
            http_port,
            grpc_port,
            lookup_port,
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// A managed proxy process started from a configuration written to a
/// temporary file. Killed when dropped.
pub struct Proxy {
    process: Child,
    // Keeps the configuration file alive for the proxy's lifetime.
    _config: tempfile::NamedTempFile,
    pub http_port: u16,
    pub grpc_port: u16,
}

impl Proxy {
    /// Start the proxy with the given configuration. `{http_port}` and
    /// `{grpc_port}` placeholders in the template are replaced with fresh
    /// ephemeral ports; the template must configure both protocols.
    pub fn start(config_template: &str) -> Self {
        let http_port = find_free_port();
        let grpc_port = find_free_port();
        let config_text = config_template
            .replace("{http_port}", &http_port.to_string())
            .replace("{grpc_port}", &grpc_port.to_string());

        let mut config = tempfile::NamedTempFile::new().expect("failed to create config file");
        config
            .write_all(config_text.as_bytes())
            .expect("failed to write config file");

        let process = Command::new(env!("CARGO_BIN_EXE_polyroute"))
            .args(["--config"])
            .arg(config.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start polyroute");

        for port in [http_port, grpc_port] {
            wait_for_port(port, Duration::from_secs(10));
        }

        Proxy {
            process,
            _config: config,
            http_port,
            grpc_port,
        }
    }

    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }

    pub fn grpc_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.grpc_port)
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Find a workspace binary built alongside the polyroute binary.
///
/// Workspace members share a target directory, so the path is derived from
/// the polyroute binary location set by Cargo.
fn workspace_bin(name: &str) -> PathBuf {
    let polyroute = PathBuf::from(env!("CARGO_BIN_EXE_polyroute"));
    let target_dir = polyroute
        .parent()
        .expect("polyroute binary has no parent dir");
    target_dir.join(name)
}

/// Bind to port 0 to get an ephemeral port from the OS.
fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    listener.local_addr().unwrap().port()
}

/// Wait for a TCP port to accept connections, or panic after timeout.
fn wait_for_port(port: u16, timeout: Duration) {
    let start = Instant::now();
    loop {
        if TcpStream::connect_timeout(
            &format!("127.0.0.1:{port}").parse().unwrap(),
            Duration::from_millis(100),
        )
        .is_ok()
        {
            return;
        }
        if start.elapsed() > timeout {
            panic!("Timed out waiting for port {port}");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
