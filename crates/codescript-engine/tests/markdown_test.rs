//! Code blocks loaded out of markdown notes.

mod common;

use codescript_engine::{RequireError, RequireOptions};
use common::{FakeEvaluator, Vault};
use serde_json::json;

const NOTE: &str = "---
codeScriptToolkit:
  defaultCodeScriptName: second
---
# Helpers

```code-script
// codeScriptName: first
exports.which = 'first';
```

```code-script
// codeScriptName: second
exports.which = 'second';
```
";

fn evaluator() -> std::sync::Arc<FakeEvaluator> {
    let evaluator = FakeEvaluator::new();
    evaluator.module(".code-script.first.ts", |ctx| {
        ctx.exports.set("which", json!("first").into());
        Ok(())
    });
    evaluator.module(".code-script.second.ts", |ctx| {
        ctx.exports.set("which", json!("second").into());
        Ok(())
    });
    evaluator
}

#[test]
fn test_default_block_from_frontmatter() {
    let vault = Vault::new();
    let note = vault.write("note.md", NOTE);
    let evaluator = evaluator();
    let handler = vault.handler(evaluator.clone());

    let exports = handler.require("//note.md", RequireOptions::new()).unwrap();
    assert_eq!(exports.get("which").unwrap().as_json(), Some(&json!("second")));

    let unit = &evaluator.units()[0];
    assert_eq!(unit.path, format!("{note}.code-script.second.ts"));
    assert!(handler.is_cached(&note));
}

#[tokio::test]
async fn test_named_block_from_query() {
    let vault = Vault::new();
    let note = vault.write("note.md", NOTE);
    let evaluator = evaluator();
    let handler = vault.handler(evaluator.clone());

    let id = "//note.md?codeScriptName=first";
    let first = handler.require_async(id, RequireOptions::new()).await.unwrap();
    assert_eq!(first.get("which").unwrap().as_json(), Some(&json!("first")));
    assert!(handler.is_cached(&format!("{note}?codeScriptName=first")));

    // A query pins the cached value.
    vault.touch_later("note.md", 5);
    let again = handler.require_async(id, RequireOptions::new()).await.unwrap();
    assert!(first.ptr_eq(&again));
    assert_eq!(evaluator.count(".code-script.first.ts"), 1);
}

#[test]
fn test_block_requires_are_recorded_against_the_note() {
    let vault = Vault::new();
    let note = vault.write(
        "note.md",
        "```code-script\nmodule.exports = require('./data.json');\n```\n",
    );
    vault.write("data.json", "[1]");
    let evaluator = FakeEvaluator::new();
    evaluator.module(".code-script.(default).ts", |ctx| {
        let data = ctx.require.require("./data.json", RequireOptions::new())?;
        ctx.module.set_exports(data);
        Ok(())
    });
    let handler = vault.handler(evaluator.clone());

    let exports = handler.require("//note.md", RequireOptions::new()).unwrap();
    assert_eq!(exports.as_json(), Some(&json!([1])));
    assert_eq!(handler.dependencies_of(&note), vec!["./data.json"]);

    vault.write("data.json", "[2]");
    vault.touch_later("data.json", 5);
    let reloaded = handler.require("//note.md", RequireOptions::new()).unwrap();
    assert_eq!(reloaded.as_json(), Some(&json!([2])));
    assert_eq!(evaluator.count(".code-script.(default).ts"), 2);
}

#[test]
fn test_bad_query_and_missing_block() {
    let vault = Vault::new();
    vault.write("note.md", NOTE);
    vault.write("empty.md", "# Nothing to run\n");
    let handler = vault.handler(evaluator());

    let err = handler.require("//note.md?other=1", RequireOptions::new()).unwrap_err();
    assert!(err.to_string().contains("Invalid query"));

    let err = handler.require("//note.md?codeScriptName=third", RequireOptions::new()).unwrap_err();
    assert!(err.to_string().contains("Code script with name third not found"));

    let err = handler.require("//empty.md", RequireOptions::new()).unwrap_err();
    assert!(err.to_string().contains("No code-script code block found"));
    assert!(handler.cached_ids().is_empty());
}

#[test]
fn test_failing_block_is_wrapped() {
    let vault = Vault::new();
    vault.write("bad.md", "```code-script\nthrow new Error('boom');\n```\n");
    let evaluator = FakeEvaluator::new();
    evaluator.module(".code-script.(default).ts", |_| Err(RequireError::evaluation("boom")));
    let handler = vault.handler(evaluator);

    let err = handler.require("//bad.md", RequireOptions::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Failed to load module: {}.code-script.(default).ts", vault.path("bad.md"))
    );
    assert_eq!(err.root_cause().to_string(), "Evaluation error: boom");
    assert!(!handler.is_cached(&vault.path("bad.md")));
}
