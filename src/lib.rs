//! DNS leak detection built on randomized-subdomain probing.
//!
//! Each probe fetches a freshly generated random hostname under a DNS
//! fingerprinting endpoint; whichever resolver performs that lookup is
//! reported back and recorded. The orchestrator runs a short schedule of
//! IPv4 and IPv6 probes inside an isolated execution context, streams each
//! newly detected resolver to a live-update callback, and the classifier
//! flags a leak when a detected resolver's country differs from the
//! subject's expected location.
//!
//! The probing is best effort by nature: endpoints time out, answer with
//! malformed bodies, or get blocked entirely. All of that degrades to
//! "fewer records", never to a failed run.

pub mod classify;
pub mod cli;
pub mod engine;
pub mod ident;
pub mod intel;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod parse;
pub mod sandbox;
pub mod transport;

pub use engine::{run_dns_leak_test, LeakTestEngine};
pub use model::{
	AddressFamily, Confidence, DnsServerRecord, GroupedServers, LeakTestResult, ProbeTask, Role,
	TestStatus, TestSummary, UserLocation,
};
pub use transport::{HttpTransport, LeakTestConfig, ProbeEndpoints, ProbeError, ProbeTransport};
