/// Software access point ("hosted network") control.
///
/// The OS network stack owns the truth about whether the access point is up;
/// [`HotspotState`] only caches the intent and result of the last command.
/// `Starting`/`Stopping` are held while `netsh` runs and double as the lock
/// that keeps start and stop from overlapping.
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{CommandRunner, CommandSpec};

const MAX_SSID_BYTES: usize = 32;
const MIN_PASSWORD_CHARS: usize = 8;
const MAX_PASSWORD_CHARS: usize = 63;

/// Output fragments (lowercased) that mean the adapter or its driver cannot
/// host a network at all, as opposed to a transient failure.
const UNSUPPORTED_SIGNATURES: &[&str] = &[
    "hosted network couldn't be started",
    "not in the correct state to perform the requested operation",
    "hosted network supported : no",
    "wireless local area network interface is powered down",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotspotPhase {
    Inactive,
    Starting,
    Active,
    Stopping,
    Error,
}

impl HotspotPhase {
    fn is_transient(self) -> bool {
        matches!(self, HotspotPhase::Starting | HotspotPhase::Stopping)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotState {
    pub phase: HotspotPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for HotspotState {
    fn default() -> Self {
        Self {
            phase: HotspotPhase::Inactive,
            ssid: None,
            last_error: None,
        }
    }
}

/// Result of a driver query. Never cached: adapters get re-plugged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityReport {
    pub supported: bool,
    pub raw_details: String,
}

/// Stopping is never fatal to the caller; failures are reported here instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HotspotError {
    #[error("Administrator privileges are required to configure the hotspot. Restart the application as administrator.")]
    PrivilegeRequired,

    #[error("This WiFi adapter or its driver does not support hosted networks. Use the operating system's Mobile Hotspot feature instead. Details: {details}")]
    AdapterUnsupported { details: String },

    #[error("Hotspot command failed: {0}")]
    CommandFailed(String),

    #[error("Another hotspot operation is in progress ({phase:?})")]
    OperationInProgress { phase: HotspotPhase },

    #[error("Invalid hotspot credentials: {0}")]
    InvalidCredentials(String),
}

pub struct HotspotManager {
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
    state: Mutex<HotspotState>,
}

impl HotspotManager {
    pub fn new(runner: Arc<dyn CommandRunner>, command_timeout: Duration) -> Self {
        Self {
            runner,
            command_timeout,
            state: Mutex::new(HotspotState::default()),
        }
    }

    /// Snapshot of the cached hotspot state.
    pub fn state(&self) -> HotspotState {
        self.lock().clone()
    }

    /// Returns whether this process may change network configuration.
    /// `net session` only succeeds for elevated callers; any failure reads as "no".
    pub async fn check_privilege(&self) -> bool {
        match self.runner.run(&self.command("net", &["session"])).await {
            Ok(out) => out.success(),
            Err(e) => {
                debug!(error = %e, "Privilege probe failed");
                false
            }
        }
    }

    /// Queries the wireless driver for hosted network support.
    pub async fn probe_capability(&self) -> CapabilityReport {
        match self
            .runner
            .run(&self.command("netsh", &["wlan", "show", "drivers"]))
            .await
        {
            Ok(out) if out.success() => CapabilityReport {
                supported: reports_hosted_network_support(&out.stdout),
                raw_details: out.stdout,
            },
            Ok(out) => CapabilityReport {
                supported: false,
                raw_details: out.combined(),
            },
            Err(e) => CapabilityReport {
                supported: false,
                raw_details: e.to_string(),
            },
        }
    }

    /// Configures and starts the access point.
    pub async fn start(&self, ssid: &str, password: &str) -> Result<(), HotspotError> {
        validate_credentials(ssid, password)?;
        let guard = self.enter(HotspotPhase::Starting)?;

        if !self.check_privilege().await {
            warn!("Hotspot start refused: process is not elevated");
            // Guard drops here and restores the previous phase.
            return Err(HotspotError::PrivilegeRequired);
        }

        // A leftover session would make `set hostednetwork` fail; not running is fine.
        if let Err(text) = self.netsh(&["wlan", "stop", "hostednetwork"]).await {
            debug!(output = %text, "Pre-start stop ignored");
        }

        let ssid_arg = format!("ssid={ssid}");
        let key_arg = format!("key={password}");
        let result = match self
            .netsh(&[
                "wlan",
                "set",
                "hostednetwork",
                "mode=allow",
                ssid_arg.as_str(),
                key_arg.as_str(),
            ])
            .await
        {
            Ok(_) => self.netsh(&["wlan", "start", "hostednetwork"]).await,
            Err(text) => Err(text),
        };

        match result {
            Ok(_) => {
                info!(ssid, "Hotspot active");
                guard.settle(|state| {
                    state.phase = HotspotPhase::Active;
                    state.ssid = Some(ssid.to_string());
                    state.last_error = None;
                });
                Ok(())
            }
            Err(text) => {
                let err = classify_failure(&text);
                warn!(error = %err, "Hotspot start failed");
                let message = err.to_string();
                guard.settle(|state| {
                    state.phase = HotspotPhase::Error;
                    state.ssid = None;
                    state.last_error = Some(message);
                });
                Err(err)
            }
        }
    }

    /// Stops the access point. Only an overlapping operation is an error;
    /// a failed `netsh` call comes back as `success: false`.
    pub async fn stop(&self) -> Result<StopOutcome, HotspotError> {
        let guard = self.enter(HotspotPhase::Stopping)?;
        let previous = guard.previous;

        match self.netsh(&["wlan", "stop", "hostednetwork"]).await {
            Ok(_) => {
                info!("Hotspot stopped");
                guard.settle(|state| {
                    state.phase = HotspotPhase::Inactive;
                    state.ssid = None;
                    state.last_error = None;
                });
                Ok(StopOutcome {
                    success: true,
                    error: None,
                })
            }
            Err(text) => {
                warn!(output = %text, "Hotspot stop failed");
                guard.settle(|state| {
                    // Stop is the manual way out of Error.
                    state.phase = match previous {
                        HotspotPhase::Error => HotspotPhase::Inactive,
                        other => other,
                    };
                });
                Ok(StopOutcome {
                    success: false,
                    error: Some(text),
                })
            }
        }
    }

    fn command(&self, program: &str, args: &[&str]) -> CommandSpec {
        CommandSpec::new(program, args.iter().copied()).with_timeout(self.command_timeout)
    }

    /// Runs `netsh`; `Err` carries the text to classify or report.
    async fn netsh(&self, args: &[&str]) -> Result<String, String> {
        let spec = self.command("netsh", args);
        let shown: Vec<&str> = args
            .iter()
            .map(|&a| if a.starts_with("key=") { "key=***" } else { a })
            .collect();
        debug!(command = %shown.join(" "), "Running netsh");
        match self.runner.run(&spec).await {
            Ok(out) if out.success() => Ok(out.stdout),
            Ok(out) => {
                let text = out.combined();
                Err(if text.is_empty() {
                    format!("`{}` exited with {:?}", spec.display(), out.exit_code)
                } else {
                    text
                })
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn enter(&self, phase: HotspotPhase) -> Result<PhaseGuard<'_>, HotspotError> {
        let mut state = self.lock();
        if state.phase.is_transient() {
            return Err(HotspotError::OperationInProgress { phase: state.phase });
        }
        let previous = state.phase;
        state.phase = phase;
        Ok(PhaseGuard {
            state: &self.state,
            previous,
            armed: true,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HotspotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a transient phase. Dropping it without `settle` (early return or a
/// cancelled future) puts the previous phase back.
struct PhaseGuard<'a> {
    state: &'a Mutex<HotspotState>,
    previous: HotspotPhase,
    armed: bool,
}

impl PhaseGuard<'_> {
    fn settle(mut self, apply: impl FnOnce(&mut HotspotState)) {
        self.armed = false;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.phase = self.previous;
        }
    }
}

fn validate_credentials(ssid: &str, password: &str) -> Result<(), HotspotError> {
    if ssid.trim().is_empty() || ssid.len() > MAX_SSID_BYTES {
        return Err(HotspotError::InvalidCredentials(format!(
            "SSID must be between 1 and {MAX_SSID_BYTES} bytes"
        )));
    }
    let chars = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&chars) {
        return Err(HotspotError::InvalidCredentials(format!(
            "password must be between {MIN_PASSWORD_CHARS} and {MAX_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

/// Collapses runs of whitespace and lowercases, so `Hosted network supported  : Yes`
/// and `hosted network supported : yes` compare equal.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Looks for the `Hosted network supported : Yes` line in `netsh wlan show drivers`.
pub fn reports_hosted_network_support(driver_report: &str) -> bool {
    driver_report
        .lines()
        .map(normalize)
        .any(|line| line.starts_with("hosted network supported") && line.ends_with(": yes"))
}

/// Maps raw `netsh` failure text onto the error the caller can act on.
pub fn classify_failure(text: &str) -> HotspotError {
    let normalized = normalize(text);
    if UNSUPPORTED_SIGNATURES
        .iter()
        .any(|signature| normalized.contains(signature))
    {
        HotspotError::AdapterUnsupported {
            details: text.trim().to_string(),
        }
    } else {
        HotspotError::CommandFailed(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::FakeRunner;

    const SET_CMD: &str = "netsh wlan set hostednetwork mode=allow ssid=HoloNet key=hologram123";
    const START_CMD: &str = "netsh wlan start hostednetwork";
    const STOP_CMD: &str = "netsh wlan stop hostednetwork";

    fn manager() -> (Arc<FakeRunner>, HotspotManager) {
        let runner = Arc::new(FakeRunner::new());
        let manager = HotspotManager::new(runner.clone(), Duration::from_secs(10));
        (runner, manager)
    }

    // ── classification ────────────────────────────────────────────────────────

    #[test]
    fn driver_report_with_support_marker() {
        let report = "Driver : Intel(R) Wi-Fi 6\n    Hosted network supported  : Yes\n";
        assert!(reports_hosted_network_support(report));
    }

    #[test]
    fn driver_report_without_support() {
        let report = "Driver : Realtek\n    Hosted network supported  : No\n";
        assert!(!reports_hosted_network_support(report));
        assert!(!reports_hosted_network_support(""));
    }

    #[test]
    fn known_signature_becomes_adapter_unsupported() {
        let err = classify_failure(
            "The hosted network couldn't be started.\nThe group or resource is not in the correct state to perform the requested operation.",
        );
        assert!(matches!(err, HotspotError::AdapterUnsupported { .. }));
        assert!(err.to_string().contains("Mobile Hotspot"));
    }

    #[test]
    fn unknown_failure_stays_raw() {
        let err = classify_failure("  The wireless service is not running.  ");
        assert_eq!(
            err,
            HotspotError::CommandFailed("The wireless service is not running.".to_string())
        );
    }

    #[test]
    fn credentials_are_validated() {
        assert!(validate_credentials("HoloNet", "hologram123").is_ok());
        assert!(validate_credentials("", "hologram123").is_err());
        assert!(validate_credentials(&"x".repeat(33), "hologram123").is_err());
        assert!(validate_credentials("HoloNet", "short").is_err());
        assert!(validate_credentials("HoloNet", &"p".repeat(64)).is_err());
    }

    // ── privilege / capability ────────────────────────────────────────────────

    #[tokio::test]
    async fn privilege_follows_net_session_exit_code() {
        let (runner, manager) = manager();
        assert!(manager.check_privilege().await);
        runner.fail("net session", 2, "Access is denied.");
        assert!(!manager.check_privilege().await);
    }

    #[tokio::test]
    async fn privilege_probe_launch_failure_is_not_privileged() {
        let (runner, manager) = manager();
        runner.fail_to_launch("net session");
        assert!(!manager.check_privilege().await);
    }

    #[tokio::test]
    async fn probe_reports_support() {
        let (runner, manager) = manager();
        runner.succeed(
            "netsh wlan show drivers",
            "Hosted network supported  : Yes",
        );
        let report = manager.probe_capability().await;
        assert!(report.supported);
        assert!(report.raw_details.contains("Yes"));
    }

    #[tokio::test]
    async fn probe_failure_is_reported_not_raised() {
        let (runner, manager) = manager();
        runner.fail_to_launch("netsh wlan show drivers");
        let report = manager.probe_capability().await;
        assert!(!report.supported);
        assert!(report.raw_details.contains("netsh"));
    }

    // ── start ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_without_privilege_leaves_phase_inactive() {
        let (runner, manager) = manager();
        runner.fail("net session", 2, "Access is denied.");

        let err = manager.start("HoloNet", "hologram123").await.unwrap_err();
        assert_eq!(err, HotspotError::PrivilegeRequired);
        assert_eq!(manager.state().phase, HotspotPhase::Inactive);
        assert!(!runner.calls().iter().any(|c| c.starts_with("netsh")));
    }

    #[tokio::test]
    async fn start_success_configures_then_starts() {
        let (runner, manager) = manager();
        manager.start("HoloNet", "hologram123").await.unwrap();

        let calls = runner.calls();
        let set = calls.iter().position(|c| c == SET_CMD).unwrap();
        let start = calls.iter().position(|c| c == START_CMD).unwrap();
        assert!(set < start);

        let state = manager.state();
        assert_eq!(state.phase, HotspotPhase::Active);
        assert_eq!(state.ssid.as_deref(), Some("HoloNet"));
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn start_ignores_failed_pre_stop() {
        let (runner, manager) = manager();
        runner.fail(STOP_CMD, 1, "The hosted network is not started.");
        manager.start("HoloNet", "hologram123").await.unwrap();
        assert_eq!(manager.state().phase, HotspotPhase::Active);
    }

    #[tokio::test]
    async fn failed_configure_never_attempts_start() {
        let (runner, manager) = manager();
        runner.fail(SET_CMD, 1, "The wireless service is not running.");

        let err = manager.start("HoloNet", "hologram123").await.unwrap_err();
        assert!(matches!(err, HotspotError::CommandFailed(_)));
        assert!(!runner.calls().iter().any(|c| c == START_CMD));

        let state = manager.state();
        assert_eq!(state.phase, HotspotPhase::Error);
        assert!(state.last_error.unwrap().contains("wireless service"));
    }

    #[tokio::test]
    async fn unsupported_adapter_is_explained() {
        let (runner, manager) = manager();
        runner.fail(
            START_CMD,
            1,
            "The hosted network couldn't be started.\nThe group or resource is not in the correct state to perform the requested operation.",
        );

        let err = manager.start("HoloNet", "hologram123").await.unwrap_err();
        assert!(matches!(err, HotspotError::AdapterUnsupported { .. }));
        assert_eq!(manager.state().phase, HotspotPhase::Error);
    }

    #[tokio::test]
    async fn invalid_credentials_run_no_commands() {
        let (runner, manager) = manager();
        let err = manager.start("HoloNet", "short").await.unwrap_err();
        assert!(matches!(err, HotspotError::InvalidCredentials(_)));
        assert!(runner.calls().is_empty());
        assert_eq!(manager.state().phase, HotspotPhase::Inactive);
    }

    // ── stop ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stop_after_start_returns_to_inactive() {
        let (_runner, manager) = manager();
        manager.start("HoloNet", "hologram123").await.unwrap();
        let outcome = manager.stop().await.unwrap();
        assert!(outcome.success);
        let state = manager.state();
        assert_eq!(state.phase, HotspotPhase::Inactive);
        assert!(state.ssid.is_none());
    }

    #[tokio::test]
    async fn failed_stop_is_soft() {
        let (runner, manager) = manager();
        manager.start("HoloNet", "hologram123").await.unwrap();
        runner.fail(STOP_CMD, 1, "The hosted network couldn't be stopped.");

        let outcome = manager.stop().await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("couldn't be stopped"));
        assert_eq!(manager.state().phase, HotspotPhase::Active);
    }

    #[tokio::test]
    async fn stop_recovers_from_error_even_when_netsh_fails() {
        let (runner, manager) = manager();
        runner.fail(START_CMD, 1, "boom");
        manager.start("HoloNet", "hologram123").await.unwrap_err();
        assert_eq!(manager.state().phase, HotspotPhase::Error);
        runner.fail(STOP_CMD, 1, "The hosted network is not started.");

        let outcome = manager.stop().await.unwrap();
        assert!(!outcome.success);
        assert_eq!(manager.state().phase, HotspotPhase::Inactive);
    }

    #[tokio::test]
    async fn overlapping_operation_fails_fast() {
        let (_runner, manager) = manager();
        let guard = manager.enter(HotspotPhase::Starting).unwrap();

        let err = manager.stop().await.unwrap_err();
        assert_eq!(
            err,
            HotspotError::OperationInProgress {
                phase: HotspotPhase::Starting
            }
        );
        let err = manager.start("HoloNet", "hologram123").await.unwrap_err();
        assert!(matches!(err, HotspotError::OperationInProgress { .. }));

        drop(guard);
        assert_eq!(manager.state().phase, HotspotPhase::Inactive);
    }
}
