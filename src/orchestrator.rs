use crate::model::{AddressFamily, Confidence, DnsServerRecord, ProbeTask};
use crate::parse::parse_probe_payload;
use crate::transport::{LeakTestConfig, ProbeTransport};

/// Build the probe schedule: the configured number of IPv4 probes followed
/// by the IPv6 probes, sequence numbers 1..N.
pub(crate) fn build_schedule(config: &LeakTestConfig) -> Vec<ProbeTask> {
	let mut schedule = Vec::with_capacity((config.probes_v4 + config.probes_v6) as usize);
	let mut sequence = 1;
	for _ in 0..config.probes_v4 {
		schedule.push(ProbeTask {
			sequence_number: sequence,
			family: AddressFamily::V4,
		});
		sequence += 1;
	}
	for _ in 0..config.probes_v6 {
		schedule.push(ProbeTask {
			sequence_number: sequence,
			family: AddressFamily::V6,
		});
		sequence += 1;
	}
	schedule
}

/// Run the configured probe sequence and accumulate detected resolvers.
///
/// Probes run sequentially with the configured inter-probe delay to avoid
/// rate limiting on the probe endpoints; the final probe has no trailing
/// delay. Records are deduplicated by address across all probes. Each new
/// record gets the measured probe latency attached and is delivered to the
/// callback immediately, in discovery order. A record re-observed by a
/// later probe is not re-emitted but its confidence is upgraded to High.
///
/// A failed probe is logged and skipped; the sequence always completes.
pub(crate) async fn run_probe_sequence<T, F>(
	transport: &T,
	config: &LeakTestConfig,
	mut on_server: F,
) -> Vec<DnsServerRecord>
where
	T: ProbeTransport,
	F: FnMut(&DnsServerRecord),
{
	let schedule = build_schedule(config);
	let total = schedule.len();
	let mut servers: Vec<DnsServerRecord> = Vec::new();

	for (i, task) in schedule.into_iter().enumerate() {
		tracing::debug!(
			probe = task.sequence_number,
			of = total,
			family = %task.family,
			"running probe",
		);
		match transport.probe(task, config.probe_timeout).await {
			Ok(raw) => {
				let latency_ms = raw.latency.as_millis() as u64;
				let parsed = parse_probe_payload(&raw.payload, task.sequence_number, task.family);
				for mut server in parsed {
					if let Some(existing) =
						servers.iter_mut().find(|s| s.address == server.address)
					{
						// Corroborated by a second independent probe
						existing.confidence = Confidence::High;
						continue;
					}
					server.response_time_ms = Some(latency_ms);
					if server.confidence < Confidence::Medium {
						server.confidence = Confidence::Medium;
					}
					on_server(&server);
					servers.push(server);
				}
			}
			Err(e) => {
				tracing::warn!(probe = task.sequence_number, error = %e, "probe failed, continuing");
			}
		}
		if i + 1 < total && !config.inter_probe_delay.is_zero() {
			tokio::time::sleep(config.inter_probe_delay).await;
		}
	}

	servers
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::transport::{ProbeError, RawProbe};
	use serde_json::json;
	use std::collections::VecDeque;
	use std::future::Future;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;
	use std::time::Duration;

	/// Transport that replays a scripted list of probe outcomes.
	pub(crate) struct ScriptedTransport {
		replies: Mutex<VecDeque<Result<RawProbe, ProbeError>>>,
		pub(crate) calls: AtomicUsize,
	}

	impl ScriptedTransport {
		pub(crate) fn new(replies: Vec<Result<RawProbe, ProbeError>>) -> Self {
			ScriptedTransport {
				replies: Mutex::new(replies.into()),
				calls: AtomicUsize::new(0),
			}
		}

		pub(crate) fn ok(payload: serde_json::Value, latency_ms: u64) -> Result<RawProbe, ProbeError> {
			Ok(RawProbe {
				payload,
				latency: Duration::from_millis(latency_ms),
			})
		}
	}

	impl ProbeTransport for ScriptedTransport {
		fn probe(
			&self,
			_task: ProbeTask,
			timeout: Duration,
		) -> impl Future<Output = Result<RawProbe, ProbeError>> + Send {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let next = self.replies.lock().unwrap().pop_front();
			async move { next.unwrap_or(Err(ProbeError::Timeout(timeout))) }
		}
	}

	pub(crate) fn fast_config() -> LeakTestConfig {
		LeakTestConfig {
			inter_probe_delay: Duration::ZERO,
			probe_timeout: Duration::from_millis(100),
			..LeakTestConfig::default()
		}
	}

	fn payload(addr: &str, country: &str, org: &str) -> serde_json::Value {
		json!({ addr: ["XX", country, org] })
	}

	#[test]
	fn test_schedule_default_order() {
		let schedule = build_schedule(&LeakTestConfig::default());
		assert_eq!(schedule.len(), 4);
		assert_eq!(schedule[0].family, AddressFamily::V4);
		assert_eq!(schedule[1].family, AddressFamily::V4);
		assert_eq!(schedule[2].family, AddressFamily::V6);
		assert_eq!(schedule[3].family, AddressFamily::V6);
		let sequences: Vec<u32> = schedule.iter().map(|t| t.sequence_number).collect();
		assert_eq!(sequences, vec![1, 2, 3, 4]);
	}

	#[test]
	fn test_schedule_configurable_counts() {
		let config = LeakTestConfig {
			probes_v4: 3,
			probes_v6: 0,
			..LeakTestConfig::default()
		};
		let schedule = build_schedule(&config);
		assert_eq!(schedule.len(), 3);
		assert!(schedule.iter().all(|t| t.family == AddressFamily::V4));
	}

	#[tokio::test]
	async fn test_dedup_and_corroboration() {
		let transport = ScriptedTransport::new(vec![
			ScriptedTransport::ok(payload("8.8.8.8", "United States, Mountain View", "Google LLC"), 30),
			ScriptedTransport::ok(payload("8.8.8.8", "United States, Mountain View", "Google LLC"), 40),
			ScriptedTransport::ok(payload("9.9.9.9", "Switzerland, Zurich", "Quad9"), 50),
			ScriptedTransport::ok(json!({}), 10),
		]);
		let mut seen = Vec::new();
		let servers =
			run_probe_sequence(&transport, &fast_config(), |s| seen.push(s.address.clone())).await;

		// Dedup invariant: no two entries share an address
		assert_eq!(servers.len(), 2);
		assert_eq!(servers[0].address, "8.8.8.8");
		assert_eq!(servers[1].address, "9.9.9.9");
		// Re-observed record upgraded, not re-emitted
		assert_eq!(servers[0].confidence, Confidence::High);
		assert_eq!(servers[1].confidence, Confidence::Medium);
		// Callback fired once per unique record, in discovery order
		assert_eq!(seen, vec!["8.8.8.8".to_string(), "9.9.9.9".to_string()]);
	}

	#[tokio::test]
	async fn test_measured_latency_attached() {
		let transport = ScriptedTransport::new(vec![ScriptedTransport::ok(
			payload("1.1.1.1", "Australia, Sydney", "Cloudflare"),
			37,
		)]);
		let config = LeakTestConfig {
			probes_v4: 1,
			probes_v6: 0,
			..fast_config()
		};
		let servers = run_probe_sequence(&transport, &config, |_| {}).await;
		assert_eq!(servers[0].response_time_ms, Some(37));
	}

	#[tokio::test]
	async fn test_single_failure_does_not_abort_run() {
		let transport = ScriptedTransport::new(vec![
			Err(ProbeError::Status(502)),
			ScriptedTransport::ok(payload("9.9.9.9", "Switzerland, Zurich", "Quad9"), 20),
			Err(ProbeError::Timeout(Duration::from_millis(100))),
			Err(ProbeError::Request("connection refused".into())),
		]);
		let servers = run_probe_sequence(&transport, &fast_config(), |_| {}).await;
		assert_eq!(servers.len(), 1);
		// Every scheduled probe was still attempted
		assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
	}

	#[tokio::test]
	async fn test_total_probe_exhaustion_yields_empty() {
		let transport = ScriptedTransport::new(vec![]);
		let servers = run_probe_sequence(&transport, &fast_config(), |_| {}).await;
		assert!(servers.is_empty());
		assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
	}
}
