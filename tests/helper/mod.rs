use std::sync::Arc;

use policy_hub::policy::catalog::Catalog;
use policy_hub::policy::store::PolicyStore;
use policy_hub::policy::types::{Checksum, NewPolicyVersion};
use tempfile::TempDir;

pub fn create_catalog() -> (TempDir, Arc<PolicyStore>, Catalog<PolicyStore>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("policies.db");
    let store = Arc::new(PolicyStore::new(&db_path).unwrap());
    let catalog = Catalog::new(Arc::clone(&store), 100);
    (temp_dir, store, catalog)
}

pub fn release(name: &str, version: &str) -> NewPolicyVersion {
    NewPolicyVersion {
        policy_name: name.to_string(),
        version: version.to_string(),
        display_name: format!("{name} policy"),
        provider: "acme".to_string(),
        definition: format!("{{\"name\":\"{name}\",\"version\":\"{version}\"}}"),
        download_url: Some(format!("https://cdn.example.com/{name}/{version}.zip")),
        checksum: Some(Checksum {
            algorithm: "sha256".to_string(),
            value: format!("{name}-{version}"),
        }),
        ..Default::default()
    }
}

/// Publish every version of `name` without docs
pub async fn publish_all(catalog: &Catalog<PolicyStore>, name: &str, versions: &[&str]) {
    for version in versions {
        catalog
            .publish(release(name, version), &Default::default())
            .await
            .unwrap();
    }
}
