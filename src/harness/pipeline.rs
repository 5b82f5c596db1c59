//! Ordered, strictly serial scenario execution and its report.

use std::{
    fmt,
    time::{Duration, Instant},
};

use tracing::{info, warn};

use super::{CliInvoker, ObjectCheck, OutputCheck, Scenario, ScenarioOutcome, TestContext};

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub outcome: ScenarioOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub scenarios: Vec<ScenarioReport>,
}

impl PipelineReport {
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.outcome.is_passed())
    }

    pub fn failures(&self) -> Vec<&ScenarioReport> {
        self.scenarios
            .iter()
            .filter(|s| matches!(s.outcome, ScenarioOutcome::Failed { .. }))
            .collect()
    }

    pub fn skipped(&self) -> Vec<&ScenarioReport> {
        self.scenarios
            .iter()
            .filter(|s| matches!(s.outcome, ScenarioOutcome::Skipped { .. }))
            .collect()
    }

    pub fn outcome(&self, name: &str) -> Option<&ScenarioOutcome> {
        self.scenarios
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.outcome)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed = self
            .scenarios
            .iter()
            .filter(|s| s.outcome.is_passed())
            .count();
        writeln!(
            f,
            "{} scenarios: {} passed, {} failed, {} skipped",
            self.scenarios.len(),
            passed,
            self.failures().len(),
            self.skipped().len()
        )?;
        for report in &self.scenarios {
            match &report.outcome {
                ScenarioOutcome::Passed => {
                    writeln!(f, "  ok    {} ({:?})", report.name, report.elapsed)?
                }
                ScenarioOutcome::Failed { reasons, output } => {
                    writeln!(f, "  FAIL  {}", report.name)?;
                    for reason in reasons {
                        writeln!(f, "        - {}", reason)?;
                    }
                    if let Some(output) = output {
                        for line in output.lines() {
                            writeln!(f, "        | {}", line)?;
                        }
                    }
                }
                ScenarioOutcome::Skipped { unmet } => {
                    writeln!(f, "  skip  {} (needs {})", report.name, unmet.join(", "))?
                }
            }
        }
        Ok(())
    }
}

/// Scenarios in execution order.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    scenarios: Vec<Scenario>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// The full walk of one object through every subcommand: upload,
    /// upload with a KMS key, download, move, copy, the three listings,
    /// make-public, signed URL, metadata, delete.
    pub fn standard(ctx: &TestContext) -> Self {
        let cfg = &ctx.config;
        let bucket = ctx.bucket.as_str();
        let source = cfg.source_file.display().to_string();
        let download = cfg.download_path.display().to_string();
        let uploaded = ctx.keys.uploaded.as_str();
        let moved = ctx.keys.moved.as_str();
        let copied = ctx.keys.copied.as_str();
        let control = ctx.keys.control.as_str();
        let exists = |key: &str| ObjectCheck::Exists(key.to_string());
        let absent = |key: &str| ObjectCheck::Absent(key.to_string());

        let signed_url = OutputCheck::matches(&format!(
            r"^The signed url for {key} is {base}/{bucket}/{key}\?Expires=\d+&Signature=[0-9a-f]{{64}}\.$",
            key = regex::escape(copied),
            base = regex::escape(cfg.base_url.trim_end_matches('/')),
            bucket = regex::escape(bucket),
        ));

        let mut pipeline = Self::new()
            .push(
                Scenario::new("upload", ["upload", bucket, source.as_str()])
                    .expect(OutputCheck::contains(format!(
                        "{} uploaded to {}.",
                        source, bucket
                    )))
                    .effect(exists(uploaded)),
            )
            .push(
                Scenario::new(
                    "upload-with-kms-key",
                    [
                        "upload-with-kms-key",
                        bucket,
                        source.as_str(),
                        cfg.kms_key_name.as_str(),
                    ],
                )
                .expect(OutputCheck::contains(format!(
                    "{} uploaded to {} using {}.",
                    source, bucket, cfg.kms_key_name
                )))
                .effect(ObjectCheck::KmsKey {
                    key: uploaded.to_string(),
                    kms_key_name: cfg.kms_key_name.clone(),
                }),
            )
            .push(
                Scenario::new("download", ["download", bucket, uploaded, download.as_str()])
                    .requires(exists(uploaded))
                    .expect(OutputCheck::contains(format!(
                        "{} downloaded to {}.",
                        ctx.object_uri(uploaded),
                        download
                    )))
                    .writes_file(&cfg.download_path),
            )
            .push(
                Scenario::new("move", ["move", bucket, uploaded, moved])
                    .requires(exists(uploaded))
                    .requires(absent(moved))
                    .expect(OutputCheck::contains(format!(
                        "{} moved to {}.",
                        ctx.object_uri(uploaded),
                        ctx.object_uri(moved)
                    )))
                    .effect(absent(uploaded))
                    .effect(exists(moved)),
            )
            .push(
                Scenario::new("copy", ["copy", bucket, moved, bucket, copied])
                    .requires(exists(moved))
                    .expect(OutputCheck::contains(format!(
                        "{} copied to {}.",
                        ctx.object_uri(moved),
                        ctx.object_uri(copied)
                    )))
                    .effect(exists(moved))
                    .effect(exists(copied)),
            )
            .push(
                Scenario::new("list", ["list", bucket])
                    .requires(exists(moved))
                    .requires(exists(copied))
                    .requires(exists(control))
                    .expect(OutputCheck::contains("Files:"))
                    .expect(OutputCheck::contains(moved))
                    .expect(OutputCheck::contains(copied))
                    .expect(OutputCheck::contains(control)),
            )
            .push(
                Scenario::new("list-by-prefix", ["list", bucket, "test", "/"])
                    .requires(exists(moved))
                    .requires(exists(copied))
                    .requires(exists(control))
                    .expect(OutputCheck::contains(moved))
                    .expect(OutputCheck::contains(copied))
                    .expect(OutputCheck::not_contains(control)),
            )
            .push(
                Scenario::new("list-by-non-matching-prefix", ["list", bucket, "foo"])
                    .expect(OutputCheck::contains("Files:"))
                    .expect(OutputCheck::not_contains(uploaded))
                    .expect(OutputCheck::not_contains(moved))
                    .expect(OutputCheck::not_contains(copied))
                    .expect(OutputCheck::not_contains(control)),
            )
            .push(
                Scenario::new("make-public", ["make-public", bucket, copied])
                    .requires(exists(copied))
                    .expect(OutputCheck::contains(format!(
                        "{} is now public.",
                        ctx.object_uri(copied)
                    )))
                    .effect(ObjectCheck::Public(copied.to_string())),
            );

        let mut signed = Scenario::new("generate-signed-url", ["generate-signed-url", bucket, copied])
            .requires(exists(copied));
        match signed_url {
            Ok(check) => signed = signed.expect(check),
            Err(err) => {
                warn!("signed url pattern rejected: {}", err);
                signed = signed.expect(OutputCheck::contains(format!(
                    "The signed url for {} is ",
                    copied
                )));
            }
        }
        pipeline = pipeline.push(signed);

        pipeline
            .push(
                Scenario::new("get-metadata", ["get-metadata", bucket, copied])
                    .requires(exists(copied))
                    .expect(OutputCheck::contains(format!("File: {}", copied)))
                    .expect(OutputCheck::contains(format!("Bucket: {}", bucket))),
            )
            .push(
                Scenario::new("delete", ["delete", bucket, copied])
                    .requires(exists(copied))
                    .expect(OutputCheck::contains(format!(
                        "{} deleted.",
                        ctx.object_uri(copied)
                    )))
                    .effect(absent(copied)),
            )
    }

    /// Run every scenario in order. A failure never aborts the run; later
    /// scenarios whose preconditions no longer hold report `Skipped`.
    pub async fn run(&self, ctx: &TestContext, invoker: &CliInvoker) -> PipelineReport {
        let mut report = PipelineReport::default();
        for scenario in &self.scenarios {
            info!(scenario = scenario.name, "running scenario");
            let started = Instant::now();
            let outcome = scenario.run(ctx, invoker).await;
            let elapsed = started.elapsed();

            match &outcome {
                ScenarioOutcome::Passed => info!(scenario = scenario.name, ?elapsed, "passed"),
                ScenarioOutcome::Failed { reasons, .. } => {
                    info!(scenario = scenario.name, ?reasons, "failed")
                }
                ScenarioOutcome::Skipped { unmet } => {
                    warn!(scenario = scenario.name, ?unmet, "skipped")
                }
            }

            report.scenarios.push(ScenarioReport {
                name: scenario.name,
                outcome,
                elapsed,
            });
        }
        report
    }
}
