use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::classify;
use crate::model::{DnsServerRecord, LeakTestResult};
use crate::orchestrator::run_probe_sequence;
use crate::transport::{LeakTestConfig, ProbeTransport};

/// Events relayed from the isolated probe context back to the host.
#[derive(Debug)]
pub enum ProbeEvent {
	/// A new resolver was detected; zero or more per run
	ServerDetected(DnsServerRecord),
	/// Terminal event, exactly one per run
	TestCompleted(LeakTestResult),
}

/// Failure of the isolation mechanism itself. Distinct from probe
/// failures, which the orchestrator absorbs.
#[derive(Debug, Error)]
pub enum SandboxError {
	#[error("isolated probe context produced no result within {0:?}")]
	Timeout(std::time::Duration),
	#[error("isolated probe context closed before completing")]
	ContextClosed,
}

/// Host-side callback invoked as each resolver is detected.
pub type ServerCallback = Arc<dyn Fn(&DnsServerRecord) + Send + Sync>;

/// Tears the isolated context down on every exit path, including
/// cancellation of the host future itself.
struct ContextGuard {
	handle: JoinHandle<()>,
	active: Arc<AtomicUsize>,
}

impl Drop for ContextGuard {
	fn drop(&mut self) {
		self.handle.abort();
		self.active.fetch_sub(1, Ordering::SeqCst);
	}
}

/// Run the full probe-and-parse sequence in an isolated execution context.
///
/// The sequence runs on a detached task; the only coupling to the host is
/// the typed event channel. The host relays `ServerDetected` events to the
/// callback and resolves on `TestCompleted`. If no terminal event arrives
/// within the overall run timeout, or the context dies without one, the
/// host fails with a typed error and the context is torn down. The
/// `active` counter tracks live contexts so callers can verify teardown.
pub(crate) async fn run_isolated<T: ProbeTransport>(
	transport: Arc<T>,
	config: LeakTestConfig,
	on_server: Option<ServerCallback>,
	active: Arc<AtomicUsize>,
) -> Result<LeakTestResult, SandboxError> {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let run_timeout = config.run_timeout;

	active.fetch_add(1, Ordering::SeqCst);
	let handle = tokio::spawn(async move {
		let started = Instant::now();
		let servers = run_probe_sequence(&*transport, &config, |server| {
			let _ = tx.send(ProbeEvent::ServerDetected(server.clone()));
		})
		.await;
		let result = classify::finalize(
			servers,
			config.expected_location.as_ref(),
			started.elapsed(),
		);
		let _ = tx.send(ProbeEvent::TestCompleted(result));
	});
	let _guard = ContextGuard { handle, active };

	let deadline = Instant::now() + run_timeout;
	loop {
		let remaining = deadline.saturating_duration_since(Instant::now());
		match tokio::time::timeout(remaining, rx.recv()).await {
			Ok(Some(ProbeEvent::ServerDetected(server))) => {
				if let Some(callback) = &on_server {
					callback(&server);
				}
			}
			Ok(Some(ProbeEvent::TestCompleted(result))) => return Ok(result),
			Ok(None) => return Err(SandboxError::ContextClosed),
			Err(_) => return Err(SandboxError::Timeout(run_timeout)),
		}
	}
}
