//! End-to-end runs of the `files` binary through the harness.

use storage_files::harness::{
    CleanupOutcome, HarnessConfig, ObjectCheck, OutputCheck, Pipeline, Scenario, ScenarioOutcome,
    TestContext,
};
use tempfile::TempDir;

fn harness_config(dir: &TempDir) -> HarnessConfig {
    HarnessConfig::new(env!("CARGO_BIN_EXE_files"), dir.path())
}

#[tokio::test]
async fn standard_pipeline_passes_and_cleans_up() {
    // Given a fresh bucket backed by a per-test storage directory
    let dir = TempDir::new().unwrap();
    let ctx = TestContext::setup(harness_config(&dir)).await.unwrap();
    let invoker = ctx.invoker();

    // When every scenario runs in order
    let report = Pipeline::standard(&ctx).run(&ctx, &invoker).await;

    // Then all of them pass
    assert_eq!(report.scenarios.len(), 12);
    assert!(report.all_passed(), "{}", report);

    let downloaded = std::fs::read_to_string(&ctx.config.download_path).unwrap();
    assert_eq!(downloaded, "Hello World!\n");
    assert!(ctx.exists("test2.txt").await.unwrap());
    assert!(!ctx.exists("test3.txt").await.unwrap());

    // And teardown removes the bucket together with what is left in it
    let storage = ctx.storage.clone();
    let bucket = ctx.bucket.clone();
    let download_path = ctx.config.download_path.clone();
    assert_eq!(ctx.teardown().await, CleanupOutcome::Removed { attempts: 1 });
    assert!(!storage.bucket_exists(&bucket).await.unwrap());
    assert!(!download_path.exists());
}

#[tokio::test]
async fn failed_scenario_skips_dependents() {
    let dir = TempDir::new().unwrap();
    let ctx = TestContext::setup(harness_config(&dir)).await.unwrap();
    let invoker = ctx.invoker();
    let missing = dir.path().join("missing.txt").display().to_string();

    let pipeline = Pipeline::new()
        .push(
            Scenario::new("upload", ["upload", ctx.bucket.as_str(), missing.as_str()])
                .expect(OutputCheck::contains("uploaded to"))
                .effect(ObjectCheck::Exists("missing.txt".into())),
        )
        .push(
            Scenario::new(
                "move",
                ["move", ctx.bucket.as_str(), "missing.txt", "moved.txt"],
            )
            .requires(ObjectCheck::Exists("missing.txt".into())),
        );

    let report = pipeline.run(&ctx, &invoker).await;

    assert_eq!(report.failures().len(), 1);
    match report.outcome("upload") {
        Some(ScenarioOutcome::Failed { reasons, output }) => {
            assert_eq!(reasons.len(), 2);
            assert!(output.as_deref().unwrap_or_default().contains("Error:"));
        }
        other => panic!("unexpected upload outcome: {:?}", other),
    }
    assert_eq!(
        report.outcome("move"),
        Some(&ScenarioOutcome::Skipped {
            unmet: vec!["`missing.txt` exists".to_string()]
        })
    );

    assert_eq!(ctx.teardown().await, CleanupOutcome::Removed { attempts: 1 });
}

#[tokio::test]
async fn cli_errors_exit_non_zero() {
    let dir = TempDir::new().unwrap();
    let ctx = TestContext::setup(harness_config(&dir)).await.unwrap();
    let invoker = ctx.invoker();

    let output = invoker
        .run(["delete", ctx.bucket.as_str(), "nothing-here.txt"])
        .await
        .unwrap();
    assert!(!output.success());
    assert!(output.stdout.is_empty());
    assert!(output.stderr.contains("not found"), "{}", output.stderr);

    let output = invoker
        .run(["list", "no-such-bucket-for-files"])
        .await
        .unwrap();
    assert!(!output.success());
    assert!(output.stderr.contains("not found"), "{}", output.stderr);

    ctx.teardown().await;
}

#[tokio::test]
async fn bucket_subcommands_round_trip() {
    let dir = TempDir::new().unwrap();
    let ctx = TestContext::setup(harness_config(&dir)).await.unwrap();
    let invoker = ctx.invoker();
    let extra = format!("{}-extra", ctx.bucket);

    let output = invoker
        .run(["create-bucket", extra.as_str()])
        .await
        .unwrap();
    assert!(output.success(), "{}", output.combined());
    assert_eq!(output.stdout, format!("Bucket {} created.\n", extra));
    assert!(ctx.storage.bucket_exists(&extra).await.unwrap());

    let output = invoker
        .run(["delete-bucket", extra.as_str()])
        .await
        .unwrap();
    assert!(output.success(), "{}", output.combined());
    assert_eq!(output.stdout, format!("Bucket {} deleted.\n", extra));
    assert!(!ctx.storage.bucket_exists(&extra).await.unwrap());

    ctx.teardown().await;
}
