use clap::Parser;

/// DNS leak detection tool
#[derive(Parser, Debug)]
#[command(name = "leakprobe")]
#[command(about = "Detect DNS leaks by probing which resolvers answer randomized subdomain lookups")]
pub struct Cli {
	/// Analyze this IP instead of the caller's own
	#[arg(long = "ip")]
	pub ip: Option<String>,

	/// Expected country override (skips the geolocation lookup)
	#[arg(long = "expected-country")]
	pub expected_country: Option<String>,

	/// Skip the upstream geolocation/blacklist lookups entirely
	#[arg(long = "no-intel")]
	pub no_intel: bool,

	/// Also query the fraud-scoring API (needs SCAMALYTICS_USER/SCAMALYTICS_API_KEY)
	#[arg(long = "fraud")]
	pub fraud: bool,

	/// Number of IPv4 probes
	#[arg(long = "v4-probes", default_value = "2")]
	pub v4_probes: u32,

	/// Number of IPv6 probes
	#[arg(long = "v6-probes", default_value = "2")]
	pub v6_probes: u32,

	/// Per-probe timeout in milliseconds
	#[arg(short = 't', long = "timeout", default_value = "6000")]
	pub timeout: u64,

	/// Delay between consecutive probes in milliseconds
	#[arg(long = "spacing", default_value = "1000")]
	pub spacing: u64,

	/// Overall run timeout in milliseconds
	#[arg(long = "run-timeout", default_value = "20000")]
	pub run_timeout: u64,

	/// Output CSV file path
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,

	/// Print the full result as JSON instead of a table
	#[arg(long = "json")]
	pub json: bool,
}
