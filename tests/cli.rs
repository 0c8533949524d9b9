mod helper;

use clap::Parser;
use helper::{create_catalog, publish_all};
use policy_hub::cli::{Cli, execute};
use policy_hub::config::HubConfig;

fn command(args: &[&str]) -> policy_hub::cli::Command {
    let mut argv = vec!["policy-hub"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
}

#[tokio::test]
async fn publish_then_show_latest() {
    let (temp_dir, _store, catalog) = create_catalog();
    let manifest = temp_dir.path().join("jwt.json");
    std::fs::write(
        &manifest,
        r##"{
            "policyName": "jwt",
            "version": "v1.4.0",
            "provider": "acme",
            "definition": "{\"kind\":\"jwt\"}",
            "docs": { "overview": "# JWT" }
        }"##,
    )
    .unwrap();
    let config = HubConfig::default();

    let published = execute(&catalog, &config, command(&["publish", manifest.to_str().unwrap()]))
        .await
        .unwrap();
    assert_eq!(published["version"], "1.4.0");
    assert_eq!(published["isLatest"], true);

    let shown = execute(&catalog, &config, command(&["show", "jwt"])).await.unwrap();
    assert_eq!(shown["displayName"], "jwt");

    let definition = execute(&catalog, &config, command(&["definition", "jwt", "1.4.0"]))
        .await
        .unwrap();
    assert_eq!(definition["kind"], "jwt");

    let overview = execute(
        &catalog,
        &config,
        command(&["docs", "jwt", "1.4.0", "--page", "overview"]),
    )
    .await
    .unwrap();
    assert_eq!(overview, "# JWT");
}

#[tokio::test]
async fn resolve_correlated_prints_one_entry_per_request() {
    let (_temp_dir, _store, catalog) = create_catalog();
    publish_all(&catalog, "cors", &["1.0.0", "1.0.7", "1.1.0"]).await;

    let output = execute(
        &catalog,
        &HubConfig::default(),
        command(&["resolve", "--correlated", "cors@1.0:patch", "ghost@1.0.0"]),
    )
    .await
    .unwrap();

    let entries = output.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["resolved"]["version"], "1.0.7");
    assert!(entries[1]["resolved"].is_null());
}

#[tokio::test]
async fn resolve_reports_invalid_strategy() {
    let (_temp_dir, _store, catalog) = create_catalog();

    let err = execute(
        &catalog,
        &HubConfig::default(),
        command(&["resolve", "cors@1.0.0:newest"]),
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "invalid versionResolution");
}
