use std::collections::BTreeMap;

/// Resolves a colo id or kafka cluster id to its region URL (the source
/// system conflates the two; we keep them as two separate
/// injected mappings rather than merging them).
pub trait ClusterIdResolver: Send + Sync {
	fn region_url_for_colo_id(&self, colo_id: &str) -> Option<&str>;
	fn region_url_for_kafka_cluster_id(&self, kafka_cluster_id: &str) -> Option<&str>;
}

/// A static, injected implementation backed by two read-only maps loaded
/// once at startup from configuration, never discovered at runtime.
pub struct StaticClusterIdResolver {
	colo_id_to_region_url: BTreeMap<String, String>,
	kafka_cluster_id_to_region_url: BTreeMap<String, String>,
}

impl StaticClusterIdResolver {
	pub fn new(
		colo_id_to_region_url: BTreeMap<String, String>,
		kafka_cluster_id_to_region_url: BTreeMap<String, String>,
	) -> Self {
		Self {
			colo_id_to_region_url,
			kafka_cluster_id_to_region_url,
		}
	}
}

impl ClusterIdResolver for StaticClusterIdResolver {
	fn region_url_for_colo_id(&self, colo_id: &str) -> Option<&str> {
		self.colo_id_to_region_url.get(colo_id).map(String::as_str)
	}

	fn region_url_for_kafka_cluster_id(&self, kafka_cluster_id: &str) -> Option<&str> {
		self.kafka_cluster_id_to_region_url
			.get(kafka_cluster_id)
			.map(String::as_str)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolves_known_ids_and_returns_none_for_unknown() {
		let mut colo = BTreeMap::new();
		colo.insert("colo-east".to_string(), "https://region-0".to_string());
		let resolver = StaticClusterIdResolver::new(colo, BTreeMap::new());

		assert_eq!(resolver.region_url_for_colo_id("colo-east"), Some("https://region-0"));
		assert_eq!(resolver.region_url_for_colo_id("colo-west"), None);
		assert_eq!(resolver.region_url_for_kafka_cluster_id("anything"), None);
	}
}
