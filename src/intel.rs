use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::model::UserLocation;

const DEFAULT_BASE: &str = "https://ip-score.com";
const FRAUD_BASE: &str = "https://api11.scamalytics.com/v3";

/// Geolocation and attribution for one IP, as reported by the upstream
/// IP intelligence service.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoInfo {
	#[serde(default)]
	pub ip: String,
	#[serde(default)]
	pub city: String,
	#[serde(default)]
	pub region: String,
	#[serde(default)]
	pub country: String,
	#[serde(default)]
	pub isp: String,
	#[serde(default)]
	pub org: String,
	#[serde(default)]
	pub timezone: String,
	#[serde(default)]
	pub lat: f64,
	#[serde(default)]
	pub lon: f64,
}

impl GeoInfo {
	/// Convert to the expected-location input of the leak classifier.
	pub fn to_user_location(&self) -> UserLocation {
		UserLocation {
			country: self.country.clone(),
			region: self.region.clone(),
			city: self.city.clone(),
			provider_name: self.isp.clone(),
			autonomous_system_id: self.org.clone(),
		}
	}
}

#[derive(Debug, Deserialize)]
struct BlacklistRaw {
	#[serde(default)]
	ip: String,
	#[serde(default)]
	blacklists: BTreeMap<String, bool>,
}

/// Per-source blacklist flags with derived totals
#[derive(Debug, Clone)]
pub struct BlacklistReport {
	pub ip: String,
	pub blacklists: BTreeMap<String, bool>,
	pub is_blacklisted: bool,
	pub blacklist_count: usize,
}

impl From<BlacklistRaw> for BlacklistReport {
	fn from(raw: BlacklistRaw) -> Self {
		let blacklist_count = raw.blacklists.values().filter(|flagged| **flagged).count();
		BlacklistReport {
			ip: raw.ip,
			is_blacklisted: blacklist_count > 0,
			blacklist_count,
			blacklists: raw.blacklists,
		}
	}
}

#[derive(Debug, Deserialize)]
struct ScamalyticsEnvelope {
	scamalytics: ScamalyticsBody,
}

#[derive(Debug, Deserialize)]
struct ScamalyticsBody {
	#[serde(default)]
	scamalytics_score: u32,
	#[serde(default)]
	scamalytics_risk: String,
	#[serde(default)]
	scamalytics_proxy: ScamalyticsProxy,
}

#[derive(Debug, Default, Deserialize)]
struct ScamalyticsProxy {
	#[serde(default)]
	is_datacenter: bool,
	#[serde(default)]
	is_vpn: bool,
}

/// Fraud-scoring summary for one IP
#[derive(Debug, Clone)]
pub struct FraudReport {
	pub fraud_score: u32,
	pub risk_label: String,
	pub vpn_detected: bool,
	pub proxy_detected: bool,
}

/// Credentials for the fraud-scoring API, read from the environment.
#[derive(Debug, Clone)]
pub struct FraudCredentials {
	pub user: String,
	pub key: String,
}

impl FraudCredentials {
	pub fn from_env() -> Option<Self> {
		let user = std::env::var("SCAMALYTICS_USER").ok()?;
		let key = std::env::var("SCAMALYTICS_API_KEY").ok()?;
		Some(FraudCredentials { user, key })
	}
}

/// Map a raw risk string and score to a display label.
fn risk_label(risk: &str, score: u32) -> &'static str {
	if risk == "very high" || score >= 75 {
		"Very high risk"
	} else if risk == "high" || score >= 50 {
		"High risk"
	} else if risk == "medium" || score >= 25 {
		"Moderate risk"
	} else {
		"Low risk"
	}
}

/// Client for the upstream geolocation/blacklist/fraud services.
///
/// This layer is an optional collaborator: the leak test only consumes the
/// resolved country as its expected-country input, and every lookup
/// failure degrades to the self-referential fallback.
#[derive(Debug, Clone)]
pub struct IntelClient {
	client: reqwest::Client,
	base: String,
}

impl Default for IntelClient {
	fn default() -> Self {
		IntelClient::with_base(DEFAULT_BASE)
	}
}

impl IntelClient {
	pub fn with_base(base: impl Into<String>) -> Self {
		let client = reqwest::Client::builder()
			.user_agent(concat!("leakprobe/", env!("CARGO_PKG_VERSION")))
			.build()
			.unwrap_or_else(|_| reqwest::Client::new());
		IntelClient {
			client,
			base: base.into(),
		}
	}

	/// Geolocation of the caller's own IP.
	pub async fn own_geo(&self) -> Result<GeoInfo> {
		let url = format!("{}/json", self.base);
		let response = self
			.client
			.get(&url)
			.send()
			.await
			.with_context(|| format!("geolocation request to {} failed", url))?
			.error_for_status()?;
		Ok(response.json().await?)
	}

	/// Geolocation of a user-supplied IP. The upstream expects the target
	/// quoted inside the form field.
	pub async fn geo(&self, ip: &str) -> Result<GeoInfo> {
		let url = format!("{}/json", self.base);
		let response = self
			.client
			.post(&url)
			.form(&[("ip", format!("\"{}\"", ip))])
			.send()
			.await
			.with_context(|| format!("geolocation request to {} failed", url))?
			.error_for_status()?;
		Ok(response.json().await?)
	}

	/// Blacklist flags for the caller's own IP.
	pub async fn own_blacklists(&self) -> Result<BlacklistReport> {
		let url = format!("{}/spamjson", self.base);
		let raw: BlacklistRaw = self
			.client
			.get(&url)
			.send()
			.await
			.with_context(|| format!("blacklist request to {} failed", url))?
			.error_for_status()?
			.json()
			.await?;
		Ok(raw.into())
	}

	/// Blacklist flags for a user-supplied IP.
	pub async fn blacklists(&self, ip: &str) -> Result<BlacklistReport> {
		let url = format!("{}/spamjson", self.base);
		let raw: BlacklistRaw = self
			.client
			.post(&url)
			.form(&[("ip", format!("\"{}\"", ip))])
			.send()
			.await
			.with_context(|| format!("blacklist request to {} failed", url))?
			.error_for_status()?
			.json()
			.await?;
		Ok(raw.into())
	}

	/// Fraud score for an IP via the scoring API.
	pub async fn fraud(&self, ip: &str, credentials: &FraudCredentials) -> Result<FraudReport> {
		let url = format!(
			"{}/{}/?key={}&ip={}",
			FRAUD_BASE, credentials.user, credentials.key, ip,
		);
		let envelope: ScamalyticsEnvelope = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| anyhow!("fraud score request failed: {}", e))?
			.error_for_status()?
			.json()
			.await?;
		let body = envelope.scamalytics;
		Ok(FraudReport {
			fraud_score: body.scamalytics_score,
			risk_label: risk_label(&body.scamalytics_risk, body.scamalytics_score).to_string(),
			vpn_detected: body.scamalytics_proxy.is_vpn,
			proxy_detected: body.scamalytics_proxy.is_datacenter,
		})
	}
}
