use rand::Rng;

const LABEL_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random DNS label of the given length from `[a-z0-9]`.
///
/// Used to defeat DNS/HTTP caching between probes: each probe targets a
/// hostname that no resolver has seen before, forcing a fresh lookup.
/// Statistically collision resistant, no uniqueness guarantee and no
/// shared state, so it is safe to call from concurrent tasks.
pub fn random_label(length: usize) -> String {
	let mut rng = rand::thread_rng();
	(0..length)
		.map(|_| LABEL_CHARS[rng.gen_range(0..LABEL_CHARS.len())] as char)
		.collect()
}
