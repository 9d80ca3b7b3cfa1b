use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use crate::intel::{BlacklistReport, FraudReport, GeoInfo};
use crate::model::{DnsServerRecord, LeakTestResult, TestStatus};
use crate::transport::LeakTestConfig;

/// Print a summary of the test configuration before running.
pub fn print_config_summary(config: &LeakTestConfig) {
	println!("DNS Leak Test Configuration");
	println!("===========================");
	println!("IPv4 probes:    {}", config.probes_v4);
	println!("IPv6 probes:    {}", config.probes_v6);
	println!("Probe timeout:  {} ms", config.probe_timeout.as_millis());
	println!("Probe spacing:  {} ms", config.inter_probe_delay.as_millis());
	println!("Run timeout:    {} ms", config.run_timeout.as_millis());
	match &config.expected_location {
		Some(location) => println!("Expected:       {} ({})", location.country, location.provider_name),
		None => println!("Expected:       (from first detected resolver)"),
	}
	println!();
}

/// Print the subject geolocation block.
pub fn print_geo(geo: &GeoInfo) {
	println!("Subject IP:     {}", geo.ip);
	println!("Location:       {}, {}, {}", geo.city, geo.region, geo.country);
	println!("ISP:            {} ({})", geo.isp, geo.org);
	if !geo.timezone.is_empty() {
		println!("Timezone:       {}", geo.timezone);
	}
	println!();
}

/// Print the blacklist block.
pub fn print_blacklists(report: &BlacklistReport) {
	if report.is_blacklisted {
		let sources: Vec<&str> = report
			.blacklists
			.iter()
			.filter(|(_, flagged)| **flagged)
			.map(|(source, _)| source.as_str())
			.collect();
		println!(
			"Blacklists:     listed on {} source(s): {}",
			report.blacklist_count,
			sources.join(", "),
		);
	} else {
		println!("Blacklists:     clean ({} sources checked)", report.blacklists.len());
	}
}

/// Print the fraud score block.
pub fn print_fraud(report: &FraudReport) {
	println!(
		"Fraud score:    {}/100 ({})",
		report.fraud_score, report.risk_label,
	);
	if report.vpn_detected {
		println!("                VPN detected");
	}
	if report.proxy_detected {
		println!("                Datacenter/proxy detected");
	}
}

/// Live-update line for one newly detected resolver.
pub fn print_server_detected(server: &DnsServerRecord) {
	println!(
		"  detected {} ({}, {})",
		server.address, server.country, server.provider_name,
	);
}

/// Print the final result as a formatted table plus a summary block.
pub fn print_result(result: &LeakTestResult) {
	println!("\nDNS Leak Test Results");
	println!("=====================\n");

	if result.status == TestStatus::Error {
		if let Some(message) = &result.message {
			println!("Test failed: {}", message);
		}
		return;
	}

	if !result.servers.is_empty() {
		let mut table = Table::new();
		table.load_preset(UTF8_FULL);
		table.set_content_arrangement(ContentArrangement::Dynamic);
		table.set_header(vec![
			"#", "Address", "Family", "Country", "Provider", "Latency", "Confidence",
		]);
		for (i, server) in result.servers.iter().enumerate() {
			let latency = server
				.response_time_ms
				.map(|ms| format!("{} ms", ms))
				.unwrap_or_else(|| "-".to_string());
			table.add_row(vec![
				format!("{}", i + 1),
				server.address.clone(),
				server.address_family.to_string(),
				server.country.clone(),
				server.provider_name.clone(),
				latency,
				server.confidence.to_string(),
			]);
		}
		println!("{table}\n");
	}

	let summary = &result.summary;
	println!("Servers:        {}", summary.total_servers);
	println!("Countries:      {}", summary.unique_countries);
	println!("Providers:      {}", summary.unique_providers);
	println!("Avg latency:    {} ms", summary.average_response_time_ms);
	println!("Duration:       {} ms", summary.duration_ms);
	if let Some(location) = &result.user_location {
		println!("Expected:       {} ({})", location.country, location.provider_name);
	}
	let public = result.grouped_by_category.public.len();
	if public > 0 {
		println!("Public DNS:     {} resolver(s)", public);
	}
	let international = result.grouped_by_category.international.len();
	if international > 0 {
		println!("International:  {} resolver(s)", international);
	}
	println!();
	if let Some(message) = &result.message {
		println!("{}", message);
	}
}

/// Write the detected servers to a CSV file.
pub fn write_csv(path: &str, result: &LeakTestResult) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;

	writer.write_record([
		"address", "family", "country", "location", "provider", "organization",
		"protocol", "port", "response_time_ms", "confidence", "hostname",
	])?;

	for server in &result.servers {
		writer.write_record([
			server.address.clone(),
			server.address_family.to_string(),
			server.country.clone(),
			server.location.clone(),
			server.provider_name.clone(),
			server.organization.clone(),
			server.transport_protocol.clone(),
			server.port.to_string(),
			server
				.response_time_ms
				.map(|ms| ms.to_string())
				.unwrap_or_default(),
			server.confidence.to_string(),
			server.hostname.clone().unwrap_or_default(),
		])?;
	}

	writer.flush()?;
	println!("Results written to: {}", path);
	Ok(())
}

/// Serialize the full result as pretty JSON.
pub fn to_json(result: &LeakTestResult) -> Result<String> {
	Ok(serde_json::to_string_pretty(result)?)
}
