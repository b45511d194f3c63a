//! Control daemon: a unix socket in front of a running [`LifecycleController`].
//!
//! Each connection carries one newline-terminated [`ControlRequest`] and gets
//! one [`ControlResponse`] back.
//!
//! [`LifecycleController`]: tabflow::LifecycleController

mod handler;
mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
pub use handler::handle_request;
pub use server::Daemon;
use tabflow_protocol::{ControlRequest, ControlResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

/// Returns the daemon socket path for the current user.
///
/// Uses `$XDG_RUNTIME_DIR/tabflow.sock` if available (already user-permissioned),
/// otherwise falls back to `/tmp/tabflow-{uid}.sock`.
pub fn socket_path() -> PathBuf {
	if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
		return PathBuf::from(runtime_dir).join("tabflow.sock");
	}

	let uid = unsafe { libc::getuid() };
	PathBuf::from(format!("/tmp/tabflow-{uid}.sock"))
}

/// Sends `request` to the daemon at `path`. `Ok(None)` means no daemon is
/// listening there.
pub async fn try_request(path: &Path, request: &ControlRequest) -> Result<Option<ControlResponse>> {
	let stream = match UnixStream::connect(path).await {
		Ok(stream) => stream,
		Err(err) if is_not_running(&err) => {
			debug!(target = "tabflow.daemon", socket = %path.display(), error = %err, "daemon not running");
			return Ok(None);
		}
		Err(err) => return Err(err).with_context(|| format!("Failed to connect to daemon at {}", path.display())),
	};
	send_request_stream(stream, request).await.map(Some)
}

/// Like [`try_request`], but a missing daemon is an error.
pub async fn request(path: &Path, request: &ControlRequest) -> Result<ControlResponse> {
	match try_request(path, request).await? {
		Some(response) => Ok(response),
		None => bail!("tabflow daemon is not running at {} (start it with `tabflow run`)", path.display()),
	}
}

fn is_not_running(err: &std::io::Error) -> bool {
	matches!(
		err.kind(),
		std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
	)
}

async fn send_request_stream<S>(mut stream: S, request: &ControlRequest) -> Result<ControlResponse>
where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	let payload = serde_json::to_string(request).context("Failed to serialize daemon request")?;
	stream
		.write_all(format!("{payload}\n").as_bytes())
		.await
		.context("Failed writing daemon request")?;
	stream.flush().await.context("Failed flushing daemon request")?;

	let mut reader = BufReader::new(stream);
	let mut line = String::new();
	let bytes = reader.read_line(&mut line).await.context("Failed reading daemon response")?;
	if bytes == 0 {
		bail!("daemon closed the connection without responding");
	}
	serde_json::from_str(&line).context("Failed parsing daemon response")
}

#[cfg(test)]
mod tests;
