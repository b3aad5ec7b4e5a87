// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const CONFIG_VARS: [&str; 6] = [
    "MODULE",
    "PORT",
    "MODULE_PATH",
    "WORKERS",
    "GRACE_PERIOD_SECS",
    "LOG_LEVEL",
];

#[derive(Clone, Copy, Debug)]
pub enum Service {
    ImageGeneric,
    ImageWithPoses,
}

impl Service {
    fn binary(self) -> &'static str {
        match self {
            Service::ImageGeneric => env!("CARGO_BIN_EXE_image-generic-service"),
            Service::ImageWithPoses => env!("CARGO_BIN_EXE_image-with-poses-service"),
        }
    }
}

/// Handle to a running service binary.
pub struct ServiceHandle {
    child: Child,
    log_lines: Arc<Mutex<Vec<String>>>,
    _reader_thread: std::thread::JoinHandle<()>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

fn capture<R: std::io::Read + Send + 'static>(
    stream: R,
    prefix: &'static str,
    lines: Arc<Mutex<Vec<String>>>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(l) => {
                    eprintln!("[{prefix}] {l}");
                    lines.lock().unwrap().push(l);
                }
                Err(_) => break,
            }
        }
    })
}

impl ServiceHandle {
    /// Start `service` with a clean configuration environment plus `env`.
    pub fn start(service: Service, env: &[(&str, &str)]) -> Self {
        let mut command = Command::new(service.binary());
        for var in CONFIG_VARS {
            command.env_remove(var);
        }
        let mut child = command
            .envs(env.iter().copied())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start service");

        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));

        // simple_logger writes INFO to stdout, WARN/ERROR to stderr.
        let reader_thread = capture(stdout, "service", Arc::clone(&log_lines));
        let stderr_thread = capture(stderr, "service:err", Arc::clone(&log_lines));

        Self {
            child,
            log_lines,
            _reader_thread: reader_thread,
            _stderr_thread: stderr_thread,
        }
    }

    /// Wait until a log line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_log(pattern) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn wait_for_log_default(&self, pattern: &str) -> bool {
        self.wait_for_log(pattern, DEFAULT_TIMEOUT)
    }

    pub fn has_log(&self, pattern: &str) -> bool {
        let lines = self.log_lines.lock().unwrap();
        lines.iter().any(|l| l.contains(pattern))
    }

    pub fn send_signal(&self, sig: Signal) {
        let pid = self.child.id() as i32;
        signal::kill(Pid::from_raw(pid), sig).expect("failed to send signal to service");
    }

    /// Send SIGTERM and wait for the service to exit.
    pub fn stop(&mut self) -> ExitStatus {
        self.send_signal(Signal::SIGTERM);
        self.wait_with_timeout(DEFAULT_TIMEOUT)
    }

    /// Wait for the service to exit within the given timeout, killing it otherwise.
    pub fn wait_with_timeout(&mut self, timeout: Duration) -> ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .child
                .try_wait()
                .expect("failed to check service status")
            {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed service");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    listener.local_addr().unwrap().port()
}

/// Path of the compiled echo plugin library, if cargo has built it.
pub fn echo_plugin_library() -> Option<PathBuf> {
    let file_name = format!("{DLL_PREFIX}echo_plugin{DLL_SUFFIX}");
    let exe = std::env::current_exe().ok()?;
    // target/<profile>/deps/<test binary>
    exe.ancestors()
        .skip(1)
        .take(2)
        .flat_map(|dir| [dir.join(&file_name), dir.join("deps").join(&file_name)])
        .find(|candidate| candidate.is_file())
}
