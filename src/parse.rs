use std::net::IpAddr;

use serde_json::Value;

use crate::model::{AddressFamily, DnsServerRecord, UNKNOWN_COUNTRY};

/// Parse a probe endpoint payload into detected resolver records.
///
/// The primary expected shape is a JSON object keyed by resolver address,
/// each value a `[countryCode, "Country, City", organization]` tuple.
/// A plain string payload is scanned for an embedded IP address. Anything
/// else (null, arrays, malformed entries) yields no records -- probe
/// endpoints are best effort and a bad reply must never abort the run.
pub fn parse_probe_payload(
	payload: &Value,
	sequence_number: u32,
	family: AddressFamily,
) -> Vec<DnsServerRecord> {
	match payload {
		Value::Object(map) => {
			let mut servers = Vec::new();
			for (address, details) in map {
				// Garbage entries are skipped individually rather than
				// failing the whole batch
				if let Some(server) = parse_entry(address, details, sequence_number, family) {
					servers.push(server);
				}
			}
			servers
		}
		Value::String(text) => extract_address(text)
			.map(|address| {
				let mut server = DnsServerRecord::new(address.to_string(), family);
				server.hostname = Some(derive_hostname(&address.to_string(), sequence_number, family));
				vec![server]
			})
			.unwrap_or_default(),
		_ => Vec::new(),
	}
}

/// Parse one `address -> details` entry, or None if it is unusable.
fn parse_entry(
	address: &str,
	details: &Value,
	sequence_number: u32,
	family: AddressFamily,
) -> Option<DnsServerRecord> {
	// Some probe endpoints emit sentinel keys for failed lookups
	if address.is_empty() || address == "undefined" || address == "0.0.0.0" {
		return None;
	}
	if address.parse::<IpAddr>().is_err() {
		return None;
	}

	let tuple = details.as_array()?;
	if tuple.len() < 3 {
		return None;
	}
	let location = tuple[1].as_str()?;
	let organization = tuple[2].as_str()?;

	// "Country, City" -- the first segment is the country
	let country = location
		.split(", ")
		.next()
		.filter(|c| !c.is_empty())
		.unwrap_or(UNKNOWN_COUNTRY);

	let mut server = DnsServerRecord::new(address, family);
	server.hostname = Some(derive_hostname(address, sequence_number, family));
	server.country = country.to_string();
	server.location = location.to_string();
	server.provider_name = organization.to_string();
	server.organization = organization.to_string();
	Some(server)
}

/// Derive the synthetic hostname for a detected resolver.
fn derive_hostname(address: &str, sequence_number: u32, family: AddressFamily) -> String {
	format!(
		"{}-dns-{}-{}",
		family.label(),
		sequence_number,
		address.replace(['.', ':'], "-"),
	)
}

/// Find the first token in free-form text that parses as an IP address.
fn extract_address(text: &str) -> Option<IpAddr> {
	text.split(|c: char| !(c.is_ascii_hexdigit() || c == '.' || c == ':'))
		.filter(|token| !token.is_empty())
		.find_map(|token| token.parse::<IpAddr>().ok())
}
