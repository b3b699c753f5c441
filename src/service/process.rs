//! Driver-process-backed sessions.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use uuid::Uuid;

use crate::error::StartError;
use crate::service::handle::{BackendId, CancelHandle, SessionHandle, endpoint_url};
use crate::service::{BackendKind, ResolvedService, Starter};

const PORT_FLAG: &str = "--port=";

/// Spawns the driver command once per session.
pub struct ProcessStarter {
    service: ResolvedService,
    command: Vec<String>,
}

impl ProcessStarter {
    /// Create a starter for `command` (program followed by arguments).
    pub fn new(service: ResolvedService, command: Vec<String>) -> Self {
        Self { service, command }
    }
}

/// Port given as `--port=N` in the arguments, if any.
fn driver_port(args: &[String]) -> Result<Option<u16>, StartError> {
    let Some(value) = args.iter().find_map(|arg| arg.strip_prefix(PORT_FLAG)) else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| StartError::InvalidPort {
            value: value.to_string(),
        })
}

/// Ask the OS for a free local port.
fn allocate_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn forward_output<R>(service: &str, pid: u32, stream: Option<R>, name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else {
        return;
    };
    let service = service.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(service = %service, pid, stream = name, "{}", line);
        }
    });
}

async fn stop_process(mut child: Child, pid: u32) {
    match child.kill().await {
        Ok(()) => tracing::info!(pid, "Stopped driver process"),
        Err(e) => tracing::warn!(pid, error = %e, "Failed to stop driver process"),
    }
}

#[async_trait]
impl Starter for ProcessStarter {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn start_with_cancel(&self) -> Result<SessionHandle, StartError> {
        let Some((program, args)) = self
            .command
            .split_first()
            .filter(|(program, _)| !program.trim().is_empty())
        else {
            return Err(StartError::EmptyCommand {
                service: self.service.name.clone(),
            });
        };

        let mut args = args.to_vec();
        let port = match driver_port(&args)? {
            Some(port) => port,
            None => {
                let port = allocate_port().map_err(StartError::PortAllocation)?;
                tracing::debug!(port, "Allocated driver port");
                args.push(format!("{PORT_FLAG}{port}"));
                port
            }
        };

        // Resolved before spawning so a bad path cannot leak a process.
        let endpoint = endpoint_url(&format!("127.0.0.1:{port}"), &self.service.descriptor.path)?;

        let env = self
            .service
            .descriptor
            .env
            .iter()
            .filter_map(|entry| entry.split_once('='));

        let mut child = Command::new(program)
            .args(&args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StartError::SpawnFailed {
                program: program.clone(),
                source,
            })?;

        let pid = child.id().unwrap_or_default();
        forward_output(&self.service.name, pid, child.stdout.take(), "stdout");
        forward_output(&self.service.name, pid, child.stderr.take(), "stderr");

        tracing::info!(
            service = %self.service.name,
            version = %self.service.version,
            pid,
            endpoint = %endpoint,
            "Started driver process"
        );

        let cancel = CancelHandle::new(BackendId::Process(pid), move || stop_process(child, pid));
        Ok(SessionHandle::new(Uuid::new_v4(), endpoint, cancel))
    }
}
