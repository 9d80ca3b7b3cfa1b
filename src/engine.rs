use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::classify;
use crate::model::{DnsServerRecord, LeakTestResult, UserLocation, UNKNOWN_COUNTRY, UNKNOWN_PROVIDER};
use crate::sandbox::{self, ServerCallback};
use crate::transport::{HttpTransport, LeakTestConfig, ProbeTransport};

type SharedRun = Shared<BoxFuture<'static, LeakTestResult>>;

/// Owns the run state of the DNS leak test.
///
/// One engine runs at most one probe sequence at a time: a `run` call while
/// another is in flight joins the existing run and resolves to the same
/// result, so probe sequences are never doubled and dedup stays intact.
/// After a run completes the next call starts a fresh one.
///
/// `run` never fails. Failures of the probing mechanism itself come back
/// as a result with error status and a descriptive message.
pub struct LeakTestEngine<T: ProbeTransport = HttpTransport> {
	config: LeakTestConfig,
	transport: Arc<T>,
	on_server: Option<ServerCallback>,
	in_flight: Mutex<Option<SharedRun>>,
	active_contexts: Arc<AtomicUsize>,
}

impl LeakTestEngine<HttpTransport> {
	pub fn new(config: LeakTestConfig) -> Self {
		Self::with_transport(config, HttpTransport::default())
	}
}

impl<T: ProbeTransport> LeakTestEngine<T> {
	pub fn with_transport(config: LeakTestConfig, transport: T) -> Self {
		LeakTestEngine {
			config,
			transport: Arc::new(transport),
			on_server: None,
			in_flight: Mutex::new(None),
			active_contexts: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Register the live-update callback, invoked once per newly detected
	/// resolver, always before the run resolves.
	pub fn on_server_detected(
		mut self,
		callback: impl Fn(&DnsServerRecord) + Send + Sync + 'static,
	) -> Self {
		self.on_server = Some(Arc::new(callback));
		self
	}

	/// Number of isolated probe contexts currently alive. Returns to its
	/// pre-run value after every run, regardless of outcome.
	pub fn active_contexts(&self) -> usize {
		self.active_contexts.load(Ordering::SeqCst)
	}

	/// Run the leak test, or join the run already in flight.
	pub async fn run(&self) -> LeakTestResult {
		let run = {
			let mut slot = self.in_flight.lock().unwrap();
			match slot.as_ref() {
				// Join the in-flight run instead of starting a duplicate
				Some(existing) if existing.peek().is_none() => existing.clone(),
				_ => {
					let fresh = start_run(
						self.config.clone(),
						self.transport.clone(),
						self.on_server.clone(),
						self.active_contexts.clone(),
					);
					*slot = Some(fresh.clone());
					fresh
				}
			}
		};
		run.await
	}
}

fn start_run<T: ProbeTransport>(
	config: LeakTestConfig,
	transport: Arc<T>,
	on_server: Option<ServerCallback>,
	active: Arc<AtomicUsize>,
) -> SharedRun {
	async move {
		match sandbox::run_isolated(transport, config, on_server, active).await {
			Ok(result) => result,
			Err(e) => {
				tracing::error!(error = %e, "leak test mechanism failed");
				classify::error_result(format!("DNS leak test failed: {}. Please try again.", e))
			}
		}
	}
	.boxed()
	.shared()
}

/// One-shot trigger with default configuration. The optional country hint
/// comes from an upstream geolocation lookup; without it the classifier
/// compares against the first detected record's country.
pub async fn run_dns_leak_test(expected_country: Option<String>) -> LeakTestResult {
	let config = LeakTestConfig {
		expected_location: expected_country.map(|country| UserLocation {
			country,
			region: UNKNOWN_COUNTRY.to_string(),
			city: UNKNOWN_COUNTRY.to_string(),
			provider_name: UNKNOWN_PROVIDER.to_string(),
			autonomous_system_id: UNKNOWN_COUNTRY.to_string(),
		}),
		..LeakTestConfig::default()
	};
	LeakTestEngine::new(config).run().await
}
