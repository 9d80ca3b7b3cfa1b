use chrono::{DateTime, Utc};
use serde::Serialize;

/// Placeholder country for records with no geolocation data.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Placeholder provider for records with no attribution data.
pub const UNKNOWN_PROVIDER: &str = "Unknown ISP";

/// Synthetic country assigned to resolvers on the local network.
/// Such records never count as leak evidence.
pub const LOCAL_NETWORK: &str = "Local Network";

/// Address family of a probe or a detected resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
	V4,
	V6,
}

impl AddressFamily {
	/// Short lowercase label used in derived hostnames
	pub fn label(&self) -> &'static str {
		match self {
			AddressFamily::V4 => "ipv4",
			AddressFamily::V6 => "ipv6",
		}
	}

	/// Transport protocol name reported for resolvers of this family
	pub fn protocol(&self) -> &'static str {
		match self {
			AddressFamily::V4 => "UDP",
			AddressFamily::V6 => "UDP6",
		}
	}
}

impl std::fmt::Display for AddressFamily {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AddressFamily::V4 => write!(f, "IPv4"),
			AddressFamily::V6 => write!(f, "IPv6"),
		}
	}
}

/// Role of a detected DNS server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Resolver,
	Authoritative,
}

/// Heuristic reliability of a detected record.
///
/// The parser assigns Low (no timing evidence), the orchestrator upgrades
/// to Medium once measured latency is attached, and to High when the same
/// address is observed by more than one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
	Low,
	Medium,
	High,
}

impl std::fmt::Display for Confidence {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Confidence::Low => write!(f, "low"),
			Confidence::Medium => write!(f, "medium"),
			Confidence::High => write!(f, "high"),
		}
	}
}

/// Lifecycle state of a leak test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
	Running,
	Completed,
	Error,
}

/// One detected DNS resolver
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsServerRecord {
	/// IP address (v4 or v6) of the responding resolver
	pub address: String,
	/// Synthetic hostname derived from probe index and address
	pub hostname: Option<String>,
	pub country: String,
	pub location: String,
	pub provider_name: String,
	pub organization: String,
	pub address_family: AddressFamily,
	pub role: Role,
	pub transport_protocol: String,
	pub port: u16,
	/// Round-trip latency of the probe that discovered this record
	pub response_time_ms: Option<u64>,
	pub confidence: Confidence,
	pub autonomous_system_id: Option<String>,
	pub organization_detail: Option<String>,
}

impl DnsServerRecord {
	/// Build a record with placeholder attribution for the given address.
	pub fn new(address: impl Into<String>, family: AddressFamily) -> Self {
		DnsServerRecord {
			address: address.into(),
			hostname: None,
			country: UNKNOWN_COUNTRY.to_string(),
			location: UNKNOWN_COUNTRY.to_string(),
			provider_name: UNKNOWN_PROVIDER.to_string(),
			organization: UNKNOWN_COUNTRY.to_string(),
			address_family: family,
			role: Role::Resolver,
			transport_protocol: family.protocol().to_string(),
			port: 53,
			response_time_ms: None,
			confidence: Confidence::Low,
			autonomous_system_id: None,
			organization_detail: None,
		}
	}
}

/// One scheduled probe. Immutable once scheduled, consumed exactly once.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTask {
	pub sequence_number: u32,
	pub family: AddressFamily,
}

/// Best-known location and attribution for the subject IP
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocation {
	pub country: String,
	pub region: String,
	pub city: String,
	pub provider_name: String,
	pub autonomous_system_id: String,
}

/// Summary statistics for one full run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
	pub total_servers: usize,
	pub unique_countries: usize,
	pub unique_providers: usize,
	pub average_response_time_ms: u64,
	pub duration_ms: u64,
	pub completed_at: DateTime<Utc>,
}

/// Detected servers partitioned by provider category.
///
/// A record may appear in more than one bucket; every bucket is derived
/// purely from already-computed record fields.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedServers {
	pub google: Vec<DnsServerRecord>,
	pub cloudflare: Vec<DnsServerRecord>,
	pub quad9: Vec<DnsServerRecord>,
	pub opendns: Vec<DnsServerRecord>,
	/// Union of the recognized public operators above
	pub public: Vec<DnsServerRecord>,
	/// Loopback/private-network resolvers
	pub local: Vec<DnsServerRecord>,
	/// Resolvers operated by the subject's own ISP
	pub isp_owned: Vec<DnsServerRecord>,
	/// Resolvers whose country differs from the expected country
	pub international: Vec<DnsServerRecord>,
}

/// The aggregate produced by one full leak test run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakTestResult {
	/// Detection order, deduplicated by address
	pub servers: Vec<DnsServerRecord>,
	pub leak_detected: bool,
	pub user_location: Option<UserLocation>,
	pub status: TestStatus,
	pub message: Option<String>,
	pub summary: TestSummary,
	pub grouped_by_category: GroupedServers,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_record_defaults() {
		let rec = DnsServerRecord::new("8.8.8.8", AddressFamily::V4);
		assert_eq!(rec.country, UNKNOWN_COUNTRY);
		assert_eq!(rec.provider_name, UNKNOWN_PROVIDER);
		assert_eq!(rec.port, 53);
		assert_eq!(rec.transport_protocol, "UDP");
		assert_eq!(rec.confidence, Confidence::Low);
		assert!(rec.response_time_ms.is_none());
	}

	#[test]
	fn test_family_labels() {
		assert_eq!(AddressFamily::V4.label(), "ipv4");
		assert_eq!(AddressFamily::V6.label(), "ipv6");
		assert_eq!(AddressFamily::V4.protocol(), "UDP");
		assert_eq!(AddressFamily::V6.protocol(), "UDP6");
	}

	#[test]
	fn test_confidence_ordering() {
		assert!(Confidence::Low < Confidence::Medium);
		assert!(Confidence::Medium < Confidence::High);
	}

	#[test]
	fn test_record_serializes_camel_case() {
		let rec = DnsServerRecord::new("1.1.1.1", AddressFamily::V4);
		let json = serde_json::to_value(&rec).unwrap();
		assert!(json.get("providerName").is_some());
		assert!(json.get("addressFamily").is_some());
		assert!(json.get("responseTimeMs").is_some());
	}
}
