use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;

use crate::model::{
	DnsServerRecord, GroupedServers, LeakTestResult, TestStatus, TestSummary, UserLocation,
	LOCAL_NETWORK, UNKNOWN_COUNTRY, UNKNOWN_PROVIDER,
};

/// Recognized public DNS operators, matched by provider-name substring.
const PUBLIC_PROVIDERS: [&str; 4] = ["google", "cloudflare", "quad9", "opendns"];

/// Aggregate the collected records into the final test result.
///
/// The expected country comes from the externally supplied location when
/// present, otherwise from the first detected record. Leak rule: at least
/// one record has a real country (not "Unknown", not the "Local Network"
/// placeholder) that differs case-insensitively from the expected one.
///
/// Zero collected records is a well-formed completed result, distinct from
/// the error status reserved for failures of the probing mechanism itself.
pub fn finalize(
	servers: Vec<DnsServerRecord>,
	expected_location: Option<&UserLocation>,
	elapsed: Duration,
) -> LeakTestResult {
	let user_location = expected_location
		.cloned()
		.or_else(|| servers.first().map(infer_location));
	let expected_country = user_location.as_ref().map(|l| l.country.as_str());

	let unique_countries = servers
		.iter()
		.map(|s| s.country.as_str())
		.filter(|c| *c != UNKNOWN_COUNTRY)
		.collect::<BTreeSet<_>>()
		.len();
	let unique_providers = servers
		.iter()
		.map(|s| s.provider_name.as_str())
		.filter(|p| *p != UNKNOWN_PROVIDER)
		.collect::<BTreeSet<_>>()
		.len();

	let timings: Vec<u64> = servers.iter().filter_map(|s| s.response_time_ms).collect();
	let average_response_time_ms = if timings.is_empty() {
		0
	} else {
		timings.iter().sum::<u64>() / timings.len() as u64
	};

	let leak_detected = expected_country
		.map(|expected| servers.iter().any(|s| is_foreign(s, expected)))
		.unwrap_or(false);

	let message = if servers.is_empty() {
		"No DNS servers detected; no leak evidence found.".to_string()
	} else if leak_detected {
		format!(
			"DNS leak detected! Found {} DNS servers across {} different countries.",
			servers.len(),
			unique_countries,
		)
	} else {
		format!("No DNS leak detected. Analyzed {} DNS servers.", servers.len())
	};

	let grouped_by_category = group_by_category(&servers, user_location.as_ref(), expected_country);

	LeakTestResult {
		summary: TestSummary {
			total_servers: servers.len(),
			unique_countries,
			unique_providers,
			average_response_time_ms,
			duration_ms: elapsed.as_millis() as u64,
			completed_at: Utc::now(),
		},
		servers,
		leak_detected,
		user_location,
		status: TestStatus::Completed,
		message: Some(message),
		grouped_by_category,
	}
}

/// Build the error-status result used when the probing mechanism itself
/// failed (sandbox never loaded, overall timeout). Always well formed so
/// the consumer never sees an exception.
pub fn error_result(message: impl Into<String>) -> LeakTestResult {
	LeakTestResult {
		servers: Vec::new(),
		leak_detected: false,
		user_location: None,
		status: TestStatus::Error,
		message: Some(message.into()),
		summary: TestSummary {
			total_servers: 0,
			unique_countries: 0,
			unique_providers: 0,
			average_response_time_ms: 0,
			duration_ms: 0,
			completed_at: Utc::now(),
		},
		grouped_by_category: GroupedServers::default(),
	}
}

/// True when a record is leak evidence against the expected country.
fn is_foreign(server: &DnsServerRecord, expected_country: &str) -> bool {
	server.country != UNKNOWN_COUNTRY
		&& server.country != LOCAL_NETWORK
		&& !server.country.eq_ignore_ascii_case(expected_country)
}

/// Infer the subject location from the first detected record when no
/// external geolocation was supplied.
fn infer_location(server: &DnsServerRecord) -> UserLocation {
	UserLocation {
		country: server.country.clone(),
		region: "Detected from DNS".to_string(),
		city: "Detected from DNS".to_string(),
		provider_name: server.provider_name.clone(),
		autonomous_system_id: server
			.autonomous_system_id
			.clone()
			.unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()),
	}
}

/// Partition records into display buckets. A record may land in several
/// buckets; every bucket is a pure function of already-collected fields.
fn group_by_category(
	servers: &[DnsServerRecord],
	user_location: Option<&UserLocation>,
	expected_country: Option<&str>,
) -> GroupedServers {
	let mut grouped = GroupedServers::default();
	let own_provider = user_location
		.map(|l| l.provider_name.to_lowercase())
		.filter(|p| !p.is_empty() && p != &UNKNOWN_PROVIDER.to_lowercase());

	for server in servers {
		let provider = server.provider_name.to_lowercase();
		let mut public = false;
		for name in PUBLIC_PROVIDERS {
			if provider.contains(name) {
				public = true;
				match name {
					"google" => grouped.google.push(server.clone()),
					"cloudflare" => grouped.cloudflare.push(server.clone()),
					"quad9" => grouped.quad9.push(server.clone()),
					_ => grouped.opendns.push(server.clone()),
				}
			}
		}
		if public {
			grouped.public.push(server.clone());
		}
		if is_local(server) {
			grouped.local.push(server.clone());
		}
		if !public {
			if let Some(own) = &own_provider {
				if provider.contains(own.as_str()) || own.contains(&provider) {
					grouped.isp_owned.push(server.clone());
				}
			}
		}
		if let Some(expected) = expected_country {
			if is_foreign(server, expected) {
				grouped.international.push(server.clone());
			}
		}
	}
	grouped
}

/// True for resolvers that answered from the local network.
fn is_local(server: &DnsServerRecord) -> bool {
	if server.country == LOCAL_NETWORK {
		return true;
	}
	match server.address.parse::<IpAddr>() {
		Ok(IpAddr::V4(v4)) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
		Ok(IpAddr::V6(v6)) => {
			let first = v6.segments()[0];
			v6.is_loopback() || (first & 0xffc0) == 0xfe80 || (first & 0xfe00) == 0xfc00
		}
		Err(_) => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::AddressFamily;

	fn record(address: &str, country: &str, provider: &str) -> DnsServerRecord {
		let mut rec = DnsServerRecord::new(address, AddressFamily::V4);
		rec.country = country.to_string();
		rec.provider_name = provider.to_string();
		rec
	}

	fn expecting(country: &str) -> UserLocation {
		UserLocation {
			country: country.to_string(),
			region: "Bucharest".to_string(),
			city: "Bucharest".to_string(),
			provider_name: "RCS & RDS".to_string(),
			autonomous_system_id: "AS8708".to_string(),
		}
	}

	#[test]
	fn test_matching_country_is_clean() {
		let servers = vec![record("81.180.223.1", "Germany", "Deutsche Telekom")];
		let result = finalize(servers, Some(&expecting("Germany")), Duration::from_secs(4));
		assert!(!result.leak_detected);
		assert_eq!(result.status, TestStatus::Completed);
	}

	#[test]
	fn test_differing_country_is_a_leak() {
		let servers = vec![record("81.180.223.1", "Germany", "Deutsche Telekom")];
		let result = finalize(servers, Some(&expecting("Romania")), Duration::from_secs(4));
		assert!(result.leak_detected);
		assert!(result.message.unwrap().contains("DNS leak detected"));
	}

	#[test]
	fn test_country_comparison_is_case_insensitive() {
		let servers = vec![record("1.2.3.4", "GERMANY", "Telekom")];
		let result = finalize(servers, Some(&expecting("germany")), Duration::ZERO);
		assert!(!result.leak_detected);
	}

	#[test]
	fn test_local_network_never_triggers_leak() {
		let servers = vec![record("192.168.1.1", LOCAL_NETWORK, "Local Router")];
		let result = finalize(servers, Some(&expecting("Romania")), Duration::ZERO);
		assert!(!result.leak_detected);
		assert_eq!(result.grouped_by_category.local.len(), 1);
	}

	#[test]
	fn test_unknown_country_never_triggers_leak() {
		let servers = vec![record("10.0.0.1", UNKNOWN_COUNTRY, UNKNOWN_PROVIDER)];
		let result = finalize(servers, Some(&expecting("Romania")), Duration::ZERO);
		assert!(!result.leak_detected);
	}

	#[test]
	fn test_expected_country_defaults_to_first_record() {
		let servers = vec![
			record("5.5.5.5", "Romania", "RCS & RDS"),
			record("8.8.8.8", "United States", "Google LLC"),
		];
		let result = finalize(servers, None, Duration::ZERO);
		// Self-referential comparison against the first record's country
		assert!(result.leak_detected);
		let location = result.user_location.unwrap();
		assert_eq!(location.country, "Romania");
		assert_eq!(location.provider_name, "RCS & RDS");
	}

	#[test]
	fn test_count_consistency() {
		let mut a = record("8.8.8.8", "United States", "Google LLC");
		a.response_time_ms = Some(30);
		let mut b = record("8.8.4.4", "United States", "Google LLC");
		b.response_time_ms = Some(50);
		let c = record("10.1.1.1", UNKNOWN_COUNTRY, UNKNOWN_PROVIDER);

		let result = finalize(vec![a, b, c], Some(&expecting("United States")), Duration::ZERO);
		assert_eq!(result.summary.total_servers, result.servers.len());
		assert_eq!(result.summary.unique_countries, 1);
		assert_eq!(result.summary.unique_providers, 1);
		// Mean over the records that carry a latency only
		assert_eq!(result.summary.average_response_time_ms, 40);
	}

	#[test]
	fn test_zero_servers_is_completed_not_error() {
		let result = finalize(Vec::new(), None, Duration::from_secs(12));
		assert_eq!(result.status, TestStatus::Completed);
		assert!(!result.leak_detected);
		assert!(result.servers.is_empty());
		assert_eq!(result.summary.average_response_time_ms, 0);
		assert!(result.message.unwrap().contains("no leak evidence"));
	}

	#[test]
	fn test_grouping_buckets() {
		let servers = vec![
			record("8.8.8.8", "United States", "Google LLC"),
			record("1.1.1.1", "Australia", "Cloudflare, Inc."),
			record("9.9.9.9", "Switzerland", "Quad9"),
			record("208.67.222.222", "United States", "OpenDNS, LLC"),
			record("192.168.0.1", LOCAL_NETWORK, "Local Router"),
			record("81.180.223.1", "Romania", "RCS & RDS"),
		];
		let result = finalize(servers, Some(&expecting("Romania")), Duration::ZERO);
		let grouped = &result.grouped_by_category;
		assert_eq!(grouped.google.len(), 1);
		assert_eq!(grouped.cloudflare.len(), 1);
		assert_eq!(grouped.quad9.len(), 1);
		assert_eq!(grouped.opendns.len(), 1);
		assert_eq!(grouped.public.len(), 4);
		assert_eq!(grouped.local.len(), 1);
		assert_eq!(grouped.isp_owned.len(), 1);
		assert_eq!(grouped.isp_owned[0].address, "81.180.223.1");
		// Countries differing from Romania, excluding the local placeholder
		assert_eq!(grouped.international.len(), 4);
	}

	#[test]
	fn test_every_record_lands_in_at_least_one_bucket() {
		let servers = vec![
			record("8.8.8.8", "United States", "Google LLC"),
			record("9.9.9.9", "Switzerland", "Quad9"),
			record("81.180.223.1", "Romania", "RCS & RDS"),
		];
		let result = finalize(servers, Some(&expecting("Romania")), Duration::ZERO);
		let grouped = &result.grouped_by_category;
		for server in &result.servers {
			let buckets = [
				&grouped.google,
				&grouped.cloudflare,
				&grouped.quad9,
				&grouped.opendns,
				&grouped.public,
				&grouped.local,
				&grouped.isp_owned,
				&grouped.international,
			];
			assert!(
				buckets.iter().any(|b| b.iter().any(|s| s.address == server.address)),
				"record {} not in any bucket",
				server.address,
			);
		}
	}

	#[test]
	fn test_private_addresses_group_as_local() {
		let servers = vec![
			record("127.0.0.1", UNKNOWN_COUNTRY, UNKNOWN_PROVIDER),
			record("10.0.0.53", UNKNOWN_COUNTRY, UNKNOWN_PROVIDER),
		];
		let result = finalize(servers, Some(&expecting("Romania")), Duration::ZERO);
		assert_eq!(result.grouped_by_category.local.len(), 2);
	}

	#[test]
	fn test_error_result_shape() {
		let result = error_result("isolated probe context timed out");
		assert_eq!(result.status, TestStatus::Error);
		assert!(!result.leak_detected);
		assert!(result.servers.is_empty());
		assert_eq!(result.summary.total_servers, 0);
		assert!(result.message.unwrap().contains("timed out"));
	}
}
