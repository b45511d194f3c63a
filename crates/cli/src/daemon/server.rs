use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tabflow::LifecycleController;
use tabflow_protocol::{ControlRequest, ControlResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::handler::handle_request;

pub struct Daemon {
	controller: Arc<LifecycleController>,
	listener: UnixListener,
	socket_path: PathBuf,
	shutdown_tx: watch::Sender<bool>,
	shutdown_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for Daemon {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Daemon").field("socket_path", &self.socket_path).finish_non_exhaustive()
	}
}

impl Daemon {
	/// Binds the control socket, replacing a stale socket file left by a
	/// daemon that did not exit cleanly.
	pub async fn bind(controller: Arc<LifecycleController>, socket_path: PathBuf) -> Result<Self> {
		if socket_path.exists() {
			if UnixStream::connect(&socket_path).await.is_ok() {
				bail!("a tabflow daemon is already listening on {}", socket_path.display());
			}
			std::fs::remove_file(&socket_path)
				.with_context(|| format!("Failed to remove stale socket: {}", socket_path.display()))?;
		}
		if let Some(parent) = socket_path.parent() {
			if !parent.exists() {
				std::fs::create_dir_all(parent)
					.with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
			}
		}
		let listener = UnixListener::bind(&socket_path)
			.with_context(|| format!("Failed to bind daemon socket: {}", socket_path.display()))?;
		info!(target = "tabflow.daemon", socket = %socket_path.display(), "daemon listening");

		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		Ok(Self {
			controller,
			listener,
			socket_path,
			shutdown_tx,
			shutdown_rx,
		})
	}

	pub fn socket_path(&self) -> &Path {
		&self.socket_path
	}

	/// Flips to `true` once the daemon stops accepting requests.
	pub fn subscribe(&self) -> watch::Receiver<bool> {
		self.shutdown_tx.subscribe()
	}

	/// Serves requests until a `shutdown` request, SIGTERM or SIGINT.
	pub async fn run(self) -> Result<()> {
		use tokio::signal::unix::{SignalKind, signal};

		let Self {
			controller,
			listener,
			socket_path,
			shutdown_tx,
			mut shutdown_rx,
		} = self;

		let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
		let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

		loop {
			tokio::select! {
				_ = shutdown_rx.changed() => {
					if *shutdown_rx.borrow() {
						info!(target = "tabflow.daemon", "shutdown requested via message");
						break;
					}
				}
				_ = sigterm.recv() => {
					info!(target = "tabflow.daemon", "received SIGTERM, shutting down");
					break;
				}
				_ = sigint.recv() => {
					info!(target = "tabflow.daemon", "received SIGINT, shutting down");
					break;
				}
				accept = listener.accept() => {
					let (stream, _) = match accept {
						Ok(accepted) => accepted,
						Err(err) => {
							warn!(target = "tabflow.daemon", error = %err, "accept failed");
							continue;
						}
					};
					let controller = Arc::clone(&controller);
					let shutdown_tx = shutdown_tx.clone();
					tokio::spawn(async move {
						if let Err(err) = handle_client(stream, controller, shutdown_tx).await {
							warn!(target = "tabflow.daemon", error = %err, "daemon connection error");
						}
					});
				}
			}
		}

		let _ = shutdown_tx.send(true);
		if let Err(err) = std::fs::remove_file(&socket_path) {
			debug!(target = "tabflow.daemon", error = %err, "socket cleanup failed");
		}
		Ok(())
	}
}

async fn handle_client<S>(stream: S, controller: Arc<LifecycleController>, shutdown_tx: watch::Sender<bool>) -> Result<()>
where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	let (read_half, mut write_half) = tokio::io::split(stream);
	let mut reader = BufReader::new(read_half);
	let mut line = String::new();

	loop {
		line.clear();
		let bytes = reader.read_line(&mut line).await.context("Failed reading daemon request")?;
		if bytes == 0 {
			break;
		}

		let request = match serde_json::from_str::<ControlRequest>(line.trim_end()) {
			Ok(request) => request,
			Err(err) => {
				let response = ControlResponse::Error {
					message: format!("invalid request: {err}"),
				};
				write_response(&mut write_half, &response).await?;
				continue;
			}
		};
		debug!(target = "tabflow.daemon", ?request, "request");

		let shutdown = request == ControlRequest::Shutdown;
		let response = handle_request(&controller, request).await;
		write_response(&mut write_half, &response).await?;
		if shutdown {
			let _ = shutdown_tx.send(true);
			break;
		}
	}

	Ok(())
}

async fn write_response<W>(writer: &mut W, response: &ControlResponse) -> Result<()>
where
	W: tokio::io::AsyncWrite + Unpin,
{
	let payload = serde_json::to_string(response).context("Failed to serialize response")?;
	writer
		.write_all(format!("{payload}\n").as_bytes())
		.await
		.context("Failed writing daemon response")?;
	writer.flush().await.context("Failed flushing daemon response")?;
	Ok(())
}
