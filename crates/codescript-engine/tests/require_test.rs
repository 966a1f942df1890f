//! Loading, caching and invalidation through the public require API.

mod common;

use std::time::Duration;

use codescript_engine::{CacheInvalidationMode, ModuleExports, RequireError, RequireOptions};
use common::{FakeEvaluator, Vault};
use futures_util::FutureExt;
use serde_json::json;

fn never() -> RequireOptions {
    RequireOptions::new().cache_invalidation_mode(CacheInvalidationMode::Never)
}

#[tokio::test]
async fn test_json_module_sync_and_async() {
    let vault = Vault::new();
    vault.write("data.json", r#"{ "answer": 42 }"#);
    let handler = vault.handler(FakeEvaluator::new());

    let sync = handler.require("//data.json", RequireOptions::new()).unwrap();
    assert_eq!(sync.get("answer").unwrap().as_json(), Some(&json!(42)));

    let async_ = handler.require_async("//data.json", RequireOptions::new()).await.unwrap();
    assert!(sync.ptr_eq(&async_));
    assert!(handler.is_cached(&vault.path("data.json")));
}

#[test]
fn test_invalid_json_is_reported() {
    let vault = Vault::new();
    vault.write("broken.json", "{ nope");
    let handler = vault.handler(FakeEvaluator::new());

    let err = handler.require("//broken.json", RequireOptions::new()).unwrap_err();
    assert!(matches!(err.root_cause(), RequireError::Json { .. }));
    assert!(!handler.is_cached(&vault.path("broken.json")));
}

#[test]
fn test_never_keeps_cached_value() {
    let vault = Vault::new();
    vault.write("data.json", "[1]");
    let handler = vault.handler(FakeEvaluator::new());

    let first = handler.require("//data.json", RequireOptions::new()).unwrap();

    vault.write("data.json", "[2]");
    vault.touch_later("data.json", 5);

    let cached = handler.require("//data.json", never()).unwrap();
    assert!(first.ptr_eq(&cached));

    let reloaded = handler.require("//data.json", RequireOptions::new()).unwrap();
    assert!(!first.ptr_eq(&reloaded));
    assert_eq!(reloaded.as_json(), Some(&json!([2])));
}

#[test]
fn test_unchanged_module_is_not_reevaluated() {
    let vault = Vault::new();
    vault.write("lib/util.ts", "export const x = 1;");
    let evaluator = FakeEvaluator::new();
    evaluator.module("/util.ts", |ctx| {
        ctx.exports.set("x", json!(1).into());
        Ok(())
    });
    let handler = vault.handler(evaluator.clone());

    let first = handler.require("//lib/util", RequireOptions::new()).unwrap();
    let second = handler.require("//lib/util.ts", RequireOptions::new()).unwrap();

    assert_eq!(evaluator.count("/util.ts"), 1);
    assert!(first.ptr_eq(&second));
    assert_eq!(first.get("x").unwrap().as_json(), Some(&json!(1)));
}

#[test]
fn test_dependency_change_reloads_dependents() {
    let vault = Vault::new();
    vault.write("a.js", "module.exports = require('./b.js');");
    vault.write("b.js", "exports.value = 1;");

    let evaluator = FakeEvaluator::new();
    evaluator.module("/a.js", |ctx| {
        let b = ctx.require.require("./b.js", RequireOptions::new())?;
        ctx.module.set_exports(b);
        Ok(())
    });
    evaluator.module("/b.js", |ctx| {
        ctx.exports.set("value", json!(1).into());
        Ok(())
    });
    let handler = vault.handler(evaluator.clone());

    let first = handler.require("//a.js", RequireOptions::new()).unwrap();
    assert_eq!(first.get("value").unwrap().as_json(), Some(&json!(1)));
    assert_eq!(handler.dependencies_of(&vault.path("a.js")), vec!["./b.js"]);

    handler.require("//a.js", RequireOptions::new()).unwrap();
    assert_eq!(evaluator.count("/a.js"), 1);
    assert_eq!(evaluator.count("/b.js"), 1);

    vault.touch_later("b.js", 5);
    let reloaded = handler.require("//a.js", RequireOptions::new()).unwrap();
    assert_eq!(evaluator.count("/a.js"), 2);
    assert_eq!(evaluator.count("/b.js"), 2);
    assert!(!first.ptr_eq(&reloaded));
}

#[test]
fn test_always_reevaluates() {
    let vault = Vault::new();
    vault.write("a.js", "exports.x = 1;");
    let evaluator = FakeEvaluator::new();
    let handler = vault.handler(evaluator.clone());

    let always = RequireOptions::new().cache_invalidation_mode(CacheInvalidationMode::Always);
    handler.require("//a.js", always.clone()).unwrap();
    handler.require("//a.js", always).unwrap();
    handler.require("//a.js", never()).unwrap();

    assert_eq!(evaluator.count("/a.js"), 2);
}

#[test]
fn test_sync_cycle_yields_placeholder() {
    let vault = Vault::new();
    vault.write("a.js", "exports.b = require('./b.js'); exports.name = 'a';");
    vault.write("b.js", "exports.a = require('./a.js');");

    let evaluator = FakeEvaluator::new();
    evaluator.module("/a.js", |ctx| {
        let b = ctx.require.require("./b.js", RequireOptions::new())?;
        ctx.exports.set("b", b);
        ctx.exports.set("name", json!("a").into());
        Ok(())
    });
    evaluator.module("/b.js", |ctx| {
        let a = ctx.require.require("./a.js", RequireOptions::new())?;
        assert!(a.is_pending());
        ctx.exports.set("a", a);
        Ok(())
    });
    let handler = vault.handler(evaluator.clone());

    let a = handler.require("//a.js", RequireOptions::new()).unwrap();
    let placeholder = a.get("b").unwrap().get("a").unwrap();
    assert!(placeholder.is_pending());
    assert!(placeholder.resolve().ptr_eq(&a));
    assert_eq!(placeholder.get("name").unwrap().as_json(), Some(&json!("a")));
    assert_eq!(evaluator.count("/a.js"), 1);
}

#[tokio::test]
async fn test_async_cycle_completes_after_timeout() {
    let vault = Vault::new();
    vault.write("a.ts", "exports.b = await requireAsync('./b.ts');");
    vault.write("b.ts", "exports.a = await requireAsync('./a.ts');");

    let evaluator = FakeEvaluator::new();
    evaluator.async_module("/a.ts", |ctx| {
        async move {
            let b = ctx.require_async.require_async("./b.ts", RequireOptions::new()).await?;
            ctx.exports.set("b", b);
            Ok::<_, RequireError>(())
        }
        .boxed()
    });
    evaluator.async_module("/b.ts", |ctx| {
        async move {
            let a = ctx.require_async.require_async("./a.ts", RequireOptions::new()).await?;
            ctx.exports.set("a", a);
            Ok::<_, RequireError>(())
        }
        .boxed()
    });
    let handler = vault.handler(evaluator.clone());

    let a = tokio::time::timeout(
        Duration::from_secs(10),
        handler.require_async("//a.ts", RequireOptions::new()),
    )
    .await
    .unwrap()
    .unwrap();

    let inner = a.get("b").unwrap().get("a").unwrap();
    assert!(inner.is_pending());
    assert!(inner.resolve().ptr_eq(&a));
    assert!(evaluator.units().iter().all(|unit| unit.is_async));
}

#[tokio::test]
async fn test_concurrent_requires_share_one_load() {
    let vault = Vault::new();
    vault.write("shared.js", "exports.x = 1;");
    let evaluator = FakeEvaluator::new();
    let handler = codescript_engine::RequireHandler::builder(vault.config().in_flight_timeout(Duration::from_secs(5)))
        .evaluator(evaluator.clone())
        .build();

    let (first, second) = tokio::join!(
        handler.require_async("//shared.js", RequireOptions::new()),
        handler.require_async("//shared.js", RequireOptions::new()),
    );

    assert_eq!(evaluator.count("/shared.js"), 1);
    assert!(first.unwrap().ptr_eq(&second.unwrap()));
}

#[tokio::test]
async fn test_top_level_await_needs_async() {
    let vault = Vault::new();
    vault.write("tla.js", "await Promise.resolve(1);\nexports.done = true;");
    let evaluator = FakeEvaluator::new();
    let handler = vault.handler(evaluator.clone());

    let err = handler.require("//tla.js", RequireOptions::new()).unwrap_err();
    assert_eq!(err.to_string(), format!("Failed to load module: {}", vault.path("tla.js")));
    assert!(matches!(err.root_cause(), RequireError::TopLevelSuspend { .. }));
    assert!(err.root_cause().to_string().contains("requireAsync"));
    assert_eq!(evaluator.count("/tla.js"), 0);
    assert!(!handler.is_cached(&vault.path("tla.js")));

    handler.require_async("//tla.js", RequireOptions::new()).await.unwrap();
    assert_eq!(evaluator.count("/tla.js"), 1);
}

#[tokio::test]
async fn test_overlapping_roots_keep_invalidating() {
    let vault = Vault::new();
    vault.write("a.js", "exports.a = true;");
    vault.write("b.js", "exports.d = await requireAsync('./d.js'); exports.e = await requireAsync('./e.js');");
    vault.write("d.js", "exports.d = true;");
    vault.write("e.js", "exports.e = true;");

    let evaluator = FakeEvaluator::new();
    evaluator.async_module("/a.js", |ctx| {
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ctx.exports.set("a", json!(true).into());
            Ok::<_, RequireError>(())
        }
        .boxed()
    });
    evaluator.async_module("/b.js", |ctx| {
        async move {
            let d = ctx.require_async.require_async("./d.js", RequireOptions::new()).await?;
            let e = ctx.require_async.require_async("./e.js", RequireOptions::new()).await?;
            ctx.exports.set("d", d);
            ctx.exports.set("e", e);
            Ok::<_, RequireError>(())
        }
        .boxed()
    });
    evaluator.async_module("/d.js", |ctx| {
        async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            ctx.exports.set("d", json!(true).into());
            Ok::<_, RequireError>(())
        }
        .boxed()
    });
    let handler = vault.handler(evaluator.clone());
    let always = RequireOptions::new().cache_invalidation_mode(CacheInvalidationMode::Always);

    handler.require_async("//a.js", RequireOptions::new()).await.unwrap();
    handler.require_async("//b.js", RequireOptions::new()).await.unwrap();

    // `a` finishes while `b` is still reloading `d`.
    vault.touch_later("d.js", 5);
    let (a, b) = tokio::join!(
        handler.require_async("//a.js", always),
        handler.require_async("//b.js", RequireOptions::new()),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(evaluator.count("/a.js"), 2);
    assert_eq!(evaluator.count("/b.js"), 2);
    assert_eq!(evaluator.count("/d.js"), 2);
    assert_eq!(evaluator.count("/e.js"), 1);

    // Later roots still see fresh timestamps.
    vault.touch_later("e.js", 10);
    handler.require_async("//e.js", RequireOptions::new()).await.unwrap();
    assert_eq!(evaluator.count("/e.js"), 2);

    handler.require_async("//b.js", RequireOptions::new()).await.unwrap();
    assert_eq!(evaluator.count("/b.js"), 3);
    assert_eq!(evaluator.count("/d.js"), 2);
    assert_eq!(evaluator.count("/e.js"), 2);
}

#[tokio::test]
async fn test_url_dependency_invalidation() {
    let vault = Vault::new();
    vault.write("a.js", "require('https://example.invalid/lib.js');");

    let evaluator = FakeEvaluator::new();
    evaluator.module("/a.js", |ctx| {
        // Sync URL requires are refused, but the dependency is still recorded.
        let refused = ctx.require.require("https://example.invalid/lib.js", RequireOptions::new());
        assert!(matches!(refused, Err(RequireError::UnsupportedSyncLoad { .. })));
        ctx.exports.set("a", json!(true).into());
        Ok(())
    });
    let handler = vault.handler(evaluator.clone());

    handler.require("//a.js", RequireOptions::new()).unwrap();
    assert_eq!(
        handler.dependencies_of(&vault.path("a.js")),
        vec!["https://example.invalid/lib.js"]
    );

    // Sync requires cannot validate the URL and keep the cached copy.
    handler.require("//a.js", RequireOptions::new()).unwrap();
    assert_eq!(evaluator.count("/a.js"), 1);

    // Async requires treat the URL as changed now.
    handler.require_async("//a.js", RequireOptions::new()).await.unwrap();
    assert_eq!(evaluator.count("/a.js"), 2);

    let always = RequireOptions::new().cache_invalidation_mode(CacheInvalidationMode::Always);
    let err = handler.require("//a.js", always).unwrap_err();
    assert!(matches!(err, RequireError::UnsupportedSyncLoad { .. }));
    assert!(err.to_string().contains("URL dependencies validation is not supported"));
    assert_eq!(evaluator.count("/a.js"), 2);
}

#[test]
fn test_missing_file() {
    let vault = Vault::new();
    let handler = vault.handler(FakeEvaluator::new());

    let err = handler.require("//nope.js", RequireOptions::new()).unwrap_err();
    assert!(err.to_string().starts_with("File not found"));
    assert!(handler.cached_ids().is_empty());
}

#[test]
fn test_module_context_bindings() {
    let vault = Vault::new();
    let path = vault.write("scripts/ctx.js", "module.exports = __dirname;");
    let evaluator = FakeEvaluator::new();
    evaluator.module("/ctx.js", |ctx| {
        ctx.module.set_exports(ModuleExports::json(json!({
            "dirname": ctx.dirname,
            "filename": ctx.filename,
            "parent": ctx.require.parent_path(),
        })));
        Ok(())
    });
    let handler = vault.handler(evaluator.clone());

    let exports = handler.require("//scripts/ctx.js", RequireOptions::new()).unwrap();
    assert_eq!(
        exports.as_json(),
        Some(&json!({
            "dirname": vault.path("scripts"),
            "filename": path,
            "parent": path,
        }))
    );

    let unit = &evaluator.units()[0];
    assert_eq!(unit.eval_name, format!("requireString/{path}"));
    assert!(unit.source_url.starts_with("app://local/"));
    assert!(!unit.is_async);
}

#[tokio::test]
async fn test_require_string() {
    let vault = Vault::new();
    let evaluator = FakeEvaluator::new();
    evaluator.module("/virtual.js", |ctx| {
        ctx.exports.set("ok", json!(true).into());
        Ok(())
    });
    let handler = vault.handler(evaluator.clone());
    let path = vault.path("virtual.js");

    let exports = handler.require_string("exports.ok = true;", &path, Some("block-1")).unwrap();
    assert_eq!(exports.get("ok").unwrap().as_json(), Some(&json!(true)));
    assert!(handler.is_cached(&path));

    handler
        .require_string_async("exports.ok = true;", &path, None)
        .await
        .unwrap();

    let names: Vec<String> = evaluator.units().into_iter().map(|unit| unit.eval_name).collect();
    assert_eq!(
        names,
        vec![
            format!("requireString/{path}/block-1"),
            format!("requireStringAsync/{path}"),
        ]
    );
}

#[test]
fn test_require_string_wraps_errors() {
    let vault = Vault::new();
    let handler = vault.handler(FakeEvaluator::new());

    let err = handler
        .require_string("const = ;", &vault.path("bad.js"), None)
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to load module"));
    assert!(matches!(err.root_cause(), RequireError::Transform { .. }));
}

#[test]
fn test_clear_cache() {
    let vault = Vault::new();
    vault.write("a.json", "1");
    vault.write("b.json", "2");
    let handler = vault.handler(FakeEvaluator::new());

    handler.require("//a.json", RequireOptions::new()).unwrap();
    handler.require("//b.json", RequireOptions::new()).unwrap();
    assert_eq!(handler.cached_ids(), vec![vault.path("a.json"), vault.path("b.json")]);

    assert_eq!(handler.clear_cache(), 2);
    assert!(handler.cached_ids().is_empty());
}
