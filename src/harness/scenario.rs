//! A single CLI scenario: preconditions, one invocation, output and effect
//! checks.

use std::{fmt, path::PathBuf};

use regex::Regex;
use tracing::debug;

use super::{CliInvoker, HarnessError, TestContext};

/// State of one object key in the run's bucket, checked directly against
/// storage rather than through the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectCheck {
    Exists(String),
    Absent(String),
    /// Live and recorded with this KMS key name.
    KmsKey { key: String, kms_key_name: String },
    /// Live and publicly readable.
    Public(String),
}

impl ObjectCheck {
    pub async fn holds(&self, ctx: &TestContext) -> Result<bool, HarnessError> {
        Ok(match self {
            ObjectCheck::Exists(key) => ctx.exists(key).await?,
            ObjectCheck::Absent(key) => !ctx.exists(key).await?,
            ObjectCheck::KmsKey { key, kms_key_name } => {
                ctx.metadata(key).await?.is_some_and(|object| {
                    object.kms_key_name.as_deref() == Some(kms_key_name.as_str())
                })
            }
            ObjectCheck::Public(key) => ctx
                .metadata(key)
                .await?
                .is_some_and(|object| object.is_public),
        })
    }
}

impl fmt::Display for ObjectCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectCheck::Exists(key) => write!(f, "`{}` exists", key),
            ObjectCheck::Absent(key) => write!(f, "`{}` is absent", key),
            ObjectCheck::KmsKey { key, kms_key_name } => {
                write!(f, "`{}` uses KMS key `{}`", key, kms_key_name)
            }
            ObjectCheck::Public(key) => write!(f, "`{}` is public", key),
        }
    }
}

/// Expectation on the combined CLI output.
#[derive(Debug, Clone)]
pub enum OutputCheck {
    Contains(String),
    NotContains(String),
    Matches(Regex),
}

impl OutputCheck {
    pub fn contains(text: impl Into<String>) -> Self {
        OutputCheck::Contains(text.into())
    }

    pub fn not_contains(text: impl Into<String>) -> Self {
        OutputCheck::NotContains(text.into())
    }

    /// Multi-line regex; `^` and `$` match at line boundaries.
    pub fn matches(pattern: &str) -> Result<Self, regex::Error> {
        Ok(OutputCheck::Matches(Regex::new(&format!("(?m){}", pattern))?))
    }

    pub fn verify(&self, output: &str) -> Result<(), String> {
        match self {
            OutputCheck::Contains(text) if !output.contains(text.as_str()) => {
                Err(format!("expected output to contain {:?}", text))
            }
            OutputCheck::NotContains(text) if output.contains(text.as_str()) => {
                Err(format!("expected output not to contain {:?}", text))
            }
            OutputCheck::Matches(re) if !re.is_match(output) => {
                Err(format!("expected output to match /{}/", re.as_str()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed,
    Failed {
        reasons: Vec<String>,
        output: Option<String>,
    },
    /// Not run because the state it builds on is missing.
    Skipped { unmet: Vec<String> },
}

impl ScenarioOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, ScenarioOutcome::Passed)
    }
}

/// One CLI invocation with its expectations.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub requires: Vec<ObjectCheck>,
    pub args: Vec<String>,
    pub output: Vec<OutputCheck>,
    pub effects: Vec<ObjectCheck>,
    pub local_files: Vec<PathBuf>,
}

impl Scenario {
    pub fn new<I, S>(name: &'static str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            requires: Vec::new(),
            args: args.into_iter().map(Into::into).collect(),
            output: Vec::new(),
            effects: Vec::new(),
            local_files: Vec::new(),
        }
    }

    pub fn requires(mut self, check: ObjectCheck) -> Self {
        self.requires.push(check);
        self
    }

    pub fn expect(mut self, check: OutputCheck) -> Self {
        self.output.push(check);
        self
    }

    pub fn effect(mut self, check: ObjectCheck) -> Self {
        self.effects.push(check);
        self
    }

    /// The invocation must leave a local file at `path`.
    pub fn writes_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_files.push(path.into());
        self
    }

    pub async fn run(&self, ctx: &TestContext, invoker: &CliInvoker) -> ScenarioOutcome {
        let mut unmet = Vec::new();
        for check in &self.requires {
            match check.holds(ctx).await {
                Ok(true) => {}
                Ok(false) => unmet.push(check.to_string()),
                Err(err) => unmet.push(format!("{} (could not check: {})", check, err)),
            }
        }
        if !unmet.is_empty() {
            return ScenarioOutcome::Skipped { unmet };
        }

        let output = match invoker.run(&self.args).await {
            Ok(output) => output,
            Err(err) => {
                return ScenarioOutcome::Failed {
                    reasons: vec![err.to_string()],
                    output: None,
                };
            }
        };
        let text = output.combined();
        debug!(scenario = self.name, status = ?output.status, "cli output:\n{}", text);

        let mut reasons: Vec<String> = self
            .output
            .iter()
            .filter_map(|check| check.verify(&text).err())
            .collect();

        for check in &self.effects {
            match check.holds(ctx).await {
                Ok(true) => {}
                Ok(false) => reasons.push(format!("expected {} afterwards", check)),
                Err(err) => reasons.push(format!("could not verify {}: {}", check, err)),
            }
        }

        for path in &self.local_files {
            if !path.is_file() {
                reasons.push(format!("expected local file {}", path.display()));
            }
        }

        if reasons.is_empty() {
            ScenarioOutcome::Passed
        } else {
            ScenarioOutcome::Failed {
                reasons,
                output: Some(text),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{harness::HarnessConfig, services::storage_service::UploadOptions};
    use bytes::Bytes;
    use tempfile::TempDir;

    #[test]
    fn output_checks_report_what_was_expected() {
        let output = "Files:\ntest2.txt\ntest3.txt\n";

        assert!(OutputCheck::contains("test2.txt").verify(output).is_ok());
        assert!(OutputCheck::not_contains("test.txt\n").verify(output).is_ok());
        assert!(OutputCheck::matches("^Files:$").unwrap().verify(output).is_ok());

        let err = OutputCheck::contains("foo.txt").verify(output).unwrap_err();
        assert!(err.contains("foo.txt"));
        let err = OutputCheck::not_contains("test3.txt")
            .verify(output)
            .unwrap_err();
        assert!(err.contains("not to contain"));
        assert!(OutputCheck::matches("^test4").unwrap().verify(output).is_err());
    }

    #[test]
    fn builder_collects_checks_in_order() {
        let scenario = Scenario::new("move", ["move", "b", "test.txt", "test2.txt"])
            .requires(ObjectCheck::Exists("test.txt".into()))
            .expect(OutputCheck::contains("moved"))
            .effect(ObjectCheck::Absent("test.txt".into()))
            .effect(ObjectCheck::Exists("test2.txt".into()));

        assert_eq!(scenario.args, vec!["move", "b", "test.txt", "test2.txt"]);
        assert_eq!(scenario.requires.len(), 1);
        assert_eq!(
            scenario.effects,
            vec![
                ObjectCheck::Absent("test.txt".into()),
                ObjectCheck::Exists("test2.txt".into())
            ]
        );
        assert_eq!(
            scenario.effects[0].to_string(),
            "`test.txt` is absent".to_string()
        );
    }

    #[tokio::test]
    async fn attribute_checks_read_stored_metadata() {
        let dir = TempDir::new().unwrap();
        let ctx = TestContext::setup(HarnessConfig::new("files", dir.path()))
            .await
            .unwrap();
        let options = UploadOptions {
            kms_key_name: Some("projects/p/locations/us/keyRings/r/cryptoKeys/k".into()),
            ..Default::default()
        };
        let body = futures::stream::iter(vec![Ok(Bytes::from_static(b"secret"))]);
        ctx.storage
            .upload_object_stream(&ctx.bucket, "sealed.txt", options, body)
            .await
            .unwrap();

        let kms = ObjectCheck::KmsKey {
            key: "sealed.txt".into(),
            kms_key_name: "projects/p/locations/us/keyRings/r/cryptoKeys/k".into(),
        };
        let other_kms = ObjectCheck::KmsKey {
            key: "sealed.txt".into(),
            kms_key_name: "projects/p/locations/us/keyRings/r/cryptoKeys/other".into(),
        };
        let public = ObjectCheck::Public("sealed.txt".into());
        let missing_public = ObjectCheck::Public("missing.txt".into());

        assert!(kms.holds(&ctx).await.unwrap());
        assert!(!other_kms.holds(&ctx).await.unwrap());
        assert!(!public.holds(&ctx).await.unwrap());
        assert!(!missing_public.holds(&ctx).await.unwrap());

        ctx.storage.make_public(&ctx.bucket, "sealed.txt").await.unwrap();
        assert!(public.holds(&ctx).await.unwrap());
        assert_eq!(public.to_string(), "`sealed.txt` is public");

        ctx.teardown().await;
    }
}
