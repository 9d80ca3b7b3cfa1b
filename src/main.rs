use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use leakprobe::cli::Cli;
use leakprobe::intel::{FraudCredentials, IntelClient};
use leakprobe::model::{TestStatus, UserLocation};
use leakprobe::transport::LeakTestConfig;
use leakprobe::{output, LeakTestEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_target(false)
		.init();

	let cli = Cli::parse();

	// Resolve the expected location: explicit override first, then the
	// upstream geolocation lookup, then the self-referential fallback
	// (compare against the first detected resolver's country).
	let intel = IntelClient::default();
	let mut expected_location: Option<UserLocation> = cli.expected_country.as_ref().map(|country| {
		UserLocation {
			country: country.clone(),
			region: "Unknown".to_string(),
			city: "Unknown".to_string(),
			provider_name: "Unknown ISP".to_string(),
			autonomous_system_id: "Unknown".to_string(),
		}
	});

	if expected_location.is_none() && !cli.no_intel {
		let lookup = match &cli.ip {
			Some(ip) => intel.geo(ip).await,
			None => intel.own_geo().await,
		};
		match lookup {
			Ok(geo) => {
				output::print_geo(&geo);
				match &cli.ip {
					Some(ip) => match intel.blacklists(ip).await {
						Ok(report) => output::print_blacklists(&report),
						Err(e) => tracing::warn!(error = %e, "blacklist lookup failed"),
					},
					None => match intel.own_blacklists().await {
						Ok(report) => output::print_blacklists(&report),
						Err(e) => tracing::warn!(error = %e, "blacklist lookup failed"),
					},
				}
				if cli.fraud {
					match FraudCredentials::from_env() {
						Some(credentials) => {
							let target = cli.ip.clone().unwrap_or_else(|| geo.ip.clone());
							match intel.fraud(&target, &credentials).await {
								Ok(report) => output::print_fraud(&report),
								Err(e) => tracing::warn!(error = %e, "fraud lookup failed"),
							}
						}
						None => eprintln!(
							"Fraud lookup skipped: set SCAMALYTICS_USER and SCAMALYTICS_API_KEY",
						),
					}
				}
				println!();
				expected_location = Some(geo.to_user_location());
			}
			Err(e) => {
				// The leak test never depends on this layer
				tracing::warn!(error = %e, "geolocation lookup failed, using first-record fallback");
			}
		}
	}

	let config = LeakTestConfig {
		probes_v4: cli.v4_probes,
		probes_v6: cli.v6_probes,
		probe_timeout: Duration::from_millis(cli.timeout),
		inter_probe_delay: Duration::from_millis(cli.spacing),
		run_timeout: Duration::from_millis(cli.run_timeout),
		expected_location,
	};
	output::print_config_summary(&config);

	println!("Running DNS leak test...");
	let engine = LeakTestEngine::new(config).on_server_detected(output::print_server_detected);
	let result = engine.run().await;

	if cli.json {
		println!("{}", output::to_json(&result)?);
	} else {
		output::print_result(&result);
	}

	if let Some(path) = &cli.output {
		output::write_csv(path, &result)?;
	}

	if result.status == TestStatus::Error {
		std::process::exit(1);
	}
	Ok(())
}
