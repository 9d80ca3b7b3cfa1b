use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde_json::Value;
use thiserror::Error;

use crate::ident::random_label;
use crate::model::{AddressFamily, ProbeTask, UserLocation};

/// Length of the random cache-busting subdomain label
const LABEL_LENGTH: usize = 16;

/// Base domains of the DNS fingerprinting endpoints, one per address family.
///
/// The probe URL is `https://{random-label}.{base}/`; the endpoint records
/// which resolver performed the lookup for the random label and returns it
/// as a JSON object keyed by resolver address.
#[derive(Debug, Clone)]
pub struct ProbeEndpoints {
	pub v4_base: String,
	pub v6_base: String,
}

impl Default for ProbeEndpoints {
	fn default() -> Self {
		ProbeEndpoints {
			v4_base: "dns4.browserleaks.org".to_string(),
			v6_base: "dns6.browserleaks.org".to_string(),
		}
	}
}

impl ProbeEndpoints {
	/// Build the probe URL for one task using a fresh random label.
	pub fn probe_url(&self, label: &str, family: AddressFamily) -> String {
		let base = match family {
			AddressFamily::V4 => &self.v4_base,
			AddressFamily::V6 => &self.v6_base,
		};
		format!("https://{}.{}/", label, base)
	}
}

/// Leak test configuration
#[derive(Debug, Clone)]
pub struct LeakTestConfig {
	/// Number of IPv4 probes in the schedule
	pub probes_v4: u32,
	/// Number of IPv6 probes in the schedule
	pub probes_v6: u32,
	/// Per-probe network timeout
	pub probe_timeout: Duration,
	/// Delay between consecutive probes (none after the last)
	pub inter_probe_delay: Duration,
	/// Overall deadline for the isolated run
	pub run_timeout: Duration,
	/// Externally supplied location of the subject IP; when absent the
	/// expected country falls back to the first detected record
	pub expected_location: Option<UserLocation>,
}

impl Default for LeakTestConfig {
	fn default() -> Self {
		LeakTestConfig {
			probes_v4: 2,
			probes_v6: 2,
			probe_timeout: Duration::from_secs(6),
			inter_probe_delay: Duration::from_secs(1),
			run_timeout: Duration::from_secs(20),
			expected_location: None,
		}
	}
}

/// Raw reply of one successful probe
#[derive(Debug, Clone)]
pub struct RawProbe {
	pub payload: Value,
	/// Measured round trip of the probe request
	pub latency: Duration,
}

/// Typed failure of a single probe. Never aborts the run; the orchestrator
/// logs it and moves on to the next scheduled probe.
#[derive(Debug, Error)]
pub enum ProbeError {
	#[error("probe timed out after {0:?}")]
	Timeout(Duration),
	#[error("probe endpoint returned status {0}")]
	Status(u16),
	#[error("probe request failed: {0}")]
	Request(String),
}

/// A source of probe replies.
///
/// The production implementation is [`HttpTransport`]; tests substitute
/// scripted transports to drive the orchestrator and sandbox.
pub trait ProbeTransport: Send + Sync + 'static {
	/// Issue a single probe with an explicit timeout. Must not retry
	/// internally; retry policy belongs to the orchestrator.
	fn probe(
		&self,
		task: ProbeTask,
		timeout: Duration,
	) -> impl Future<Output = Result<RawProbe, ProbeError>> + Send;
}

/// HTTPS transport against the DNS fingerprinting endpoints
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: reqwest::Client,
	endpoints: ProbeEndpoints,
}

impl HttpTransport {
	pub fn new(endpoints: ProbeEndpoints) -> Self {
		let client = reqwest::Client::builder()
			.user_agent(concat!("leakprobe/", env!("CARGO_PKG_VERSION")))
			.build()
			.unwrap_or_else(|_| reqwest::Client::new());
		HttpTransport { client, endpoints }
	}
}

impl Default for HttpTransport {
	fn default() -> Self {
		HttpTransport::new(ProbeEndpoints::default())
	}
}

impl ProbeTransport for HttpTransport {
	fn probe(
		&self,
		task: ProbeTask,
		timeout: Duration,
	) -> impl Future<Output = Result<RawProbe, ProbeError>> + Send {
		let url = self
			.endpoints
			.probe_url(&random_label(LABEL_LENGTH), task.family);
		let client = self.client.clone();
		async move {
			tracing::debug!(%url, sequence = task.sequence_number, "sending probe");
			let started = Instant::now();
			let response = client
				.get(&url)
				.header(ACCEPT, "application/json, text/plain, */*")
				.header(CACHE_CONTROL, "no-cache")
				.timeout(timeout)
				.send()
				.await
				.map_err(|e| {
					if e.is_timeout() {
						ProbeError::Timeout(timeout)
					} else {
						ProbeError::Request(e.to_string())
					}
				})?;

			let status = response.status();
			if !status.is_success() {
				return Err(ProbeError::Status(status.as_u16()));
			}

			let text = response
				.text()
				.await
				.map_err(|e| ProbeError::Request(e.to_string()))?;
			let latency = started.elapsed();
			Ok(RawProbe {
				payload: decode_payload(text),
				latency,
			})
		}
	}
}

/// Decode a probe body as JSON, falling back to a string value so the
/// parser can still attempt address extraction on plain-text replies.
fn decode_payload(text: String) -> Value {
	serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_probe_url_per_family() {
		let endpoints = ProbeEndpoints::default();
		assert_eq!(
			endpoints.probe_url("abc123", AddressFamily::V4),
			"https://abc123.dns4.browserleaks.org/",
		);
		assert_eq!(
			endpoints.probe_url("abc123", AddressFamily::V6),
			"https://abc123.dns6.browserleaks.org/",
		);
	}

	#[test]
	fn test_decode_payload_json() {
		let value = decode_payload(r#"{"8.8.8.8": ["US", "United States", "Google"]}"#.into());
		assert!(value.is_object());
	}

	#[test]
	fn test_decode_payload_plain_text() {
		let value = decode_payload("resolver 8.8.8.8".into());
		assert_eq!(value, Value::String("resolver 8.8.8.8".into()));
	}

	#[test]
	fn test_default_config() {
		let config = LeakTestConfig::default();
		assert_eq!(config.probes_v4, 2);
		assert_eq!(config.probes_v6, 2);
		assert_eq!(config.probe_timeout, Duration::from_secs(6));
		assert_eq!(config.inter_probe_delay, Duration::from_secs(1));
		assert!(config.expected_location.is_none());
	}

	#[test]
	fn test_probe_error_display() {
		let err = ProbeError::Status(503);
		assert_eq!(err.to_string(), "probe endpoint returned status 503");
		let err = ProbeError::Timeout(Duration::from_secs(6));
		assert!(err.to_string().contains("timed out"));
	}
}
