//! Command line surface, driven through the built binary.

mod common;

use common::{penhance, stdout, ProjectTree};

fn project_arg(tree: &ProjectTree) -> String {
    tree.root().to_string_lossy().into_owned()
}

#[test]
fn init_enables_every_manifest_unit() {
    let tree = ProjectTree::two_unit_project();
    let root = project_arg(&tree);

    let output = penhance(&["init", "--project", &root]);
    assert!(output.status.success(), "init failed: {output:?}");
    let config = tree.read_json(".penhance/config.json");
    assert_eq!(config["enabled_units"], serde_json::json!(["model", "app"]));
    assert_eq!(config["backend"], "OPENJPA");

    let again = penhance(&["init", "--project", &root]);
    assert!(!again.status.success());
    assert!(penhance(&["init", "--project", &root, "--force"]).status.success());
}

#[test]
fn init_enables_discovered_classes_for_the_next_build() {
    let tree = ProjectTree::two_unit_project();
    let root = project_arg(&tree);
    assert!(penhance(&["init", "--project", &root]).status.success());
    let config = tree.read_json(".penhance/config.json");
    assert_eq!(
        config["enabled_classes"],
        serde_json::json!(["shop.Order", "shop.Missing", "shop.Customer"])
    );

    // the default backend may or may not run here; discovery does not depend on it
    let output = penhance(&["enhance", "--project", &root, "--json"]);
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(summary["discovered"], 3);
}

#[test]
fn toggle_flips_and_forces_enabled_flag() {
    let tree = ProjectTree::two_unit_project();
    let root = project_arg(&tree);
    assert!(penhance(&["init", "--project", &root]).status.success());

    let output = penhance(&["toggle", "--project", &root]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("enhancer disabled"));
    assert_eq!(tree.read_json(".penhance/config.json")["enabled"], false);

    assert!(penhance(&["toggle", "--project", &root, "--on"]).status.success());
    assert_eq!(tree.read_json(".penhance/config.json")["enabled"], true);
    assert!(!penhance(&["toggle", "--project", &root, "--on", "--off"]).status.success());
}

#[test]
fn list_reports_display_paths_and_classes() {
    let tree = ProjectTree::two_unit_project();
    let root = project_arg(&tree);
    tree.write_config(&serde_json::json!({
        "enabled_units": ["model", "app"],
        "enabled_classes": ["shop.Order"]
    }));

    let output = penhance(&["list", "--project", &root, "--json"]);
    assert!(output.status.success(), "list failed: {output:?}");
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).expect("listing json");

    let descriptor = &listing["metadata_files"]["model"][0];
    assert_eq!(descriptor["filename"], "mapping.orm");
    assert_eq!(descriptor["path"], "out/META-INF");
    assert_eq!(descriptor["classes"], serde_json::json!(["shop.Order", "shop.Missing"]));

    // listings ignore the class restriction
    let annotated = &listing["annotated_classes"]["model"][0];
    assert_eq!(annotated["filename"], "Customer.class");
    assert_eq!(annotated["path"], "out/shop");
    assert!(listing["annotated_classes"].get("app").is_none());
}

#[test]
fn disabled_enhancer_does_nothing() {
    let tree = ProjectTree::two_unit_project();
    let root = project_arg(&tree);
    tree.write_config(&serde_json::json!({
        "enabled": false,
        "enabled_units": ["model"]
    }));

    let output = penhance(&["enhance", "--project", &root, "--json"]);
    assert!(output.status.success(), "enhance failed: {output:?}");
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(summary["discovered"], 0);
    assert_eq!(summary["messages"], serde_json::json!([]));
}

#[test]
fn unknown_config_fields_are_rejected() {
    let tree = ProjectTree::two_unit_project();
    let root = project_arg(&tree);
    tree.write(".penhance/config.json", r#"{"tmp_loader": true}"#);

    let output = penhance(&["list", "--project", &root]);
    assert!(!output.status.success());
}

#[test]
fn backends_marks_the_selected_backend() {
    let tree = ProjectTree::two_unit_project();
    let root = project_arg(&tree);
    tree.write_config(&serde_json::json!({
        "backend": "ECLIPSELINK",
        "backends": [{
            "id": "ECLIPSELINK",
            "name": "EclipseLink",
            "command": "java org.eclipse.persistence.tools.weaving.jpa.StaticWeave"
        }]
    }));

    let output = penhance(&["backends", "--project", &root]);
    assert!(output.status.success(), "backends failed: {output:?}");
    let text = stdout(&output);
    assert!(text.contains("  OPENJPA (OpenJpa)"));
    assert!(text.contains("* ECLIPSELINK (EclipseLink)"));
}
