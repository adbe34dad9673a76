//! Scenario runner: one isolated browser context per scenario, scenarios optionally run
//! concurrently.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::browser::Browser;
use crate::config::HarnessConfig;
use crate::errors::HarnessError;
use crate::flow::{FlowDriver, FlowOptions, FlowOutcome, FlowVariant};
use crate::registration::ClientRegistration;
use crate::verifier::{
    OutcomeVerifier, TokenKind, assert_access_denied, assert_failure, assert_introspection,
    assert_revoked, assert_success, assert_tokens_match_grant,
};

/// What to verify once the flow has produced an outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Token presence follows the granted scopes
    TokensMatchGrant,
    /// The token introspects as active, owned by the expected subject
    Introspect(TokenKind),
    /// Revoking the token makes userinfo refuse the session's access token
    RevokeThenUserinfoDenied(TokenKind),
    /// The flow is expected to fail, optionally with a specific error code
    ExpectFailure { error_code: Option<String> },
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokensMatchGrant => write!(f, "tokens match grant"),
            Self::Introspect(kind) => write!(f, "introspect {kind}"),
            Self::RevokeThenUserinfoDenied(kind) => {
                write!(f, "revoke {kind} then userinfo denied")
            }
            Self::ExpectFailure {
                error_code: Some(code),
            } => write!(f, "expect failure {code}"),
            Self::ExpectFailure { error_code: None } => write!(f, "expect failure"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub registration: ClientRegistration,
    pub options: FlowOptions,
    pub variant: FlowVariant,
    pub checks: Vec<Check>,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        registration: ClientRegistration,
        options: FlowOptions,
        variant: FlowVariant,
    ) -> Self {
        Self {
            name: name.into(),
            registration,
            options,
            variant,
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    fn expects_failure(&self) -> bool {
        self.checks
            .iter()
            .any(|c| matches!(c, Check::ExpectFailure { .. }))
    }
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    /// Outcome of the flow, if it got that far
    pub outcome: Option<FlowOutcome>,
    /// Checks that passed, in order
    pub checks: Vec<Check>,
    /// First error; the scenario stopped there
    pub error: Option<HarnessError>,
    pub elapsed: Duration,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub struct SuiteReport {
    /// One report per scenario, in the order the scenarios were given
    pub reports: Vec<ScenarioReport>,
    /// Scenario tasks that panicked or were cancelled
    pub aborted: usize,
    pub elapsed: Duration,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.aborted == 0 && self.reports.iter().all(ScenarioReport::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.reports.iter().filter(|r| !r.passed())
    }
}

/// Runs scenarios against the deployment described by its `HarnessConfig`
#[derive(Clone)]
pub struct Harness {
    config: Arc<HarnessConfig>,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs one scenario in a fresh browser context. Every step is attempted once and the
    /// scenario stops at the first error.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        tracing::info!("Running scenario '{}'", scenario.name);
        let started = Instant::now();
        let mut report = ScenarioReport {
            name: scenario.name.clone(),
            outcome: None,
            checks: Vec::new(),
            error: None,
            elapsed: Duration::ZERO,
        };

        if let Err(e) = self.execute(scenario, &mut report).await {
            report.error = Some(e.log());
        }
        report.elapsed = started.elapsed();

        match &report.error {
            None => tracing::info!(
                "Scenario '{}' passed in {:?}",
                scenario.name,
                report.elapsed
            ),
            Some(e) => tracing::warn!(
                "Scenario '{}' failed in {:?} (step: {})",
                scenario.name,
                report.elapsed,
                e.step().map_or("none", |step| step.as_str())
            ),
        }
        report
    }

    async fn execute(
        &self,
        scenario: &Scenario,
        report: &mut ScenarioReport,
    ) -> Result<(), HarnessError> {
        let browser = Browser::new(&self.config)?;
        let outcome = FlowDriver::new(&self.config, &browser)
            .run_authorization_code_flow(&scenario.registration, &scenario.options, scenario.variant)
            .await?;
        report.outcome = Some(outcome.clone());

        if !scenario.expects_failure() {
            assert_success(&outcome)?;
        }

        let verifier = OutcomeVerifier::new(&self.config, &browser);
        for check in &scenario.checks {
            self.run_check(check, &outcome, &scenario.options, &verifier)
                .await?;
            tracing::debug!("[{}] check passed: {}", scenario.name, check);
            report.checks.push(check.clone());
        }
        Ok(())
    }

    async fn run_check(
        &self,
        check: &Check,
        outcome: &FlowOutcome,
        options: &FlowOptions,
        verifier: &OutcomeVerifier<'_>,
    ) -> Result<(), HarnessError> {
        match check {
            Check::TokensMatchGrant => {
                assert_tokens_match_grant(assert_success(outcome)?, options.granted_scopes())
            }
            Check::Introspect(kind) => {
                assert_success(outcome)?;
                let result = verifier.introspect(*kind).await?;
                assert_introspection(&result, *kind, &self.config.expected_subject)
            }
            Check::RevokeThenUserinfoDenied(kind) => {
                assert_success(outcome)?;
                assert_revoked(&verifier.revoke(*kind).await?)?;
                assert_access_denied(&verifier.userinfo().await?)
            }
            Check::ExpectFailure { error_code } => {
                assert_failure(outcome, error_code.as_deref()).map(|_| ())
            }
        }
    }

    /// Runs `scenarios` on tokio tasks, at most `concurrency` at a time
    pub async fn run_suite(&self, scenarios: Vec<Scenario>, concurrency: usize) -> SuiteReport {
        let started = Instant::now();
        let total = scenarios.len();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, scenario) in scenarios.into_iter().enumerate() {
            let harness = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, harness.run_scenario(&scenario).await)
            });
        }

        let mut reports = Vec::with_capacity(total);
        let mut aborted = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!("Scenario task did not complete: {}", e);
                    aborted += 1;
                }
            }
        }
        reports.sort_by_key(|(index, _)| *index);

        let suite = SuiteReport {
            reports: reports.into_iter().map(|(_, report)| report).collect(),
            aborted,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Suite finished in {:?}: {} passed, {} failed, {} aborted",
            suite.elapsed,
            suite.reports.iter().filter(|r| r.passed()).count(),
            suite.failures().count(),
            suite.aborted
        );
        suite
    }
}
