//! Bare module names resolved through package.json manifests.

mod common;

use codescript_engine::{RequireOptions, ResolvedType, Settings};
use common::{FakeEvaluator, Vault};
use serde_json::json;

fn from_script(vault: &Vault) -> RequireOptions {
    RequireOptions::new().parent_path(vault.path("scripts/main.js"))
}

fn write_package(vault: &Vault, name: &str, manifest: serde_json::Value) {
    vault.write(&format!("node_modules/{name}/package.json"), &manifest.to_string());
}

#[test]
fn test_wildcard_exports() {
    let vault = Vault::new();
    vault.write("package.json", "{}");
    write_package(&vault, "pkg", json!({ "name": "pkg", "exports": { "./data/*": "./json/*.json" } }));
    vault.write("node_modules/pkg/json/a.json", r#"{ "id": "a" }"#);
    let handler = vault.handler(FakeEvaluator::new());

    let resolved = handler.resolve("pkg/data/a", Some(&vault.path("scripts/main.js"))).unwrap();
    assert_eq!(resolved.resolved_type, ResolvedType::Module);
    assert_eq!(resolved.resolved_id, format!("{}*pkg/data/a", vault.path("scripts")));

    let exports = handler.require("pkg/data/a", from_script(&vault)).unwrap();
    assert_eq!(exports.get("id").unwrap().as_json(), Some(&json!("a")));
    assert!(handler.is_cached(&vault.path("node_modules/pkg/json/a.json")));

    let err = handler.require("pkg/other/a", from_script(&vault)).unwrap_err();
    assert_eq!(err.to_string(), "Could not resolve module: pkg/other/a");
}

#[test]
fn test_conditional_entry_point() {
    let vault = Vault::new();
    vault.write("package.json", "{}");
    write_package(
        &vault,
        "@scope/lib",
        json!({
            "name": "@scope/lib",
            "exports": {
                ".": {
                    "types": "./index.d.ts",
                    "require": "./cjs/index.js",
                    "import": "./esm/index.js"
                }
            }
        }),
    );
    vault.write("node_modules/@scope/lib/cjs/index.js", "module.exports = 'cjs';");
    vault.write("node_modules/@scope/lib/esm/index.js", "export default 'esm';");
    let evaluator = FakeEvaluator::new();
    let handler = vault.handler(evaluator.clone());

    handler.require("@scope/lib", from_script(&vault)).unwrap();
    assert_eq!(evaluator.count("/esm/index.js"), 1);
    assert_eq!(evaluator.count("/cjs/index.js"), 0);
}

#[test]
fn test_main_field_and_private_imports() {
    let vault = Vault::new();
    vault.write(
        "package.json",
        &json!({ "imports": { "#config": "./config/settings.json" } }).to_string(),
    );
    vault.write("config/settings.json", r#"{ "debug": true }"#);
    write_package(&vault, "plain", json!({ "name": "plain", "main": "lib/entry.js" }));
    vault.write("node_modules/plain/lib/entry.js", "module.exports = 1;");
    let evaluator = FakeEvaluator::new();
    let handler = vault.handler(evaluator.clone());

    let config = handler.require("#config", from_script(&vault)).unwrap();
    assert_eq!(config.get("debug").unwrap().as_json(), Some(&json!(true)));

    handler.require("plain", from_script(&vault)).unwrap();
    assert_eq!(evaluator.count("/lib/entry.js"), 1);
}

#[test]
fn test_modules_root_packages() {
    let vault = Vault::new();
    vault.write("code/package.json", "{}");
    vault.write("code/node_modules/shared/package.json", r#"{ "name": "shared" }"#);
    vault.write("code/node_modules/shared/index.json", "[1, 2]");
    let handler = vault.handler(FakeEvaluator::new());
    handler.update_settings(|settings: &mut Settings| settings.modules_root = "code".into());

    // Required from a note outside the modules root.
    let options = RequireOptions::new().parent_path(vault.path("notes/today.md"));
    let exports = handler.require("shared/index.json", options).unwrap();
    assert_eq!(exports.as_json(), Some(&json!([1, 2])));
}

#[test]
fn test_manifest_change_reloads_dependents() {
    let vault = Vault::new();
    vault.write("package.json", "{}");
    write_package(&vault, "dep", json!({ "name": "dep", "main": "index.js" }));
    vault.write("node_modules/dep/index.js", "module.exports = 1;");
    vault.write("scripts/main.js", "module.exports = require('dep');");

    let evaluator = FakeEvaluator::new();
    evaluator.module("/scripts/main.js", |ctx| {
        let dep = ctx.require.require("dep", RequireOptions::new())?;
        ctx.module.set_exports(dep);
        Ok(())
    });
    let handler = vault.handler(evaluator.clone());

    handler.require("//scripts/main.js", RequireOptions::new()).unwrap();
    handler.require("//scripts/main.js", RequireOptions::new()).unwrap();
    assert_eq!(evaluator.count("/scripts/main.js"), 1);

    vault.touch_later("package.json", 5);
    handler.require("//scripts/main.js", RequireOptions::new()).unwrap();
    assert_eq!(evaluator.count("/scripts/main.js"), 2);
}

#[test]
fn test_invalid_scoped_name() {
    let vault = Vault::new();
    let handler = vault.handler(FakeEvaluator::new());

    let err = handler.require("@scope", from_script(&vault)).unwrap_err();
    assert_eq!(err.to_string(), "Invalid scoped module name: '@scope'.");
}
