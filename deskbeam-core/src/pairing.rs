//! PIN-based pairing authority.
//!
//! The host shows a six-digit PIN; a viewer must present it before any
//! screen, input or auxiliary traffic flows. One credential is live at a
//! time. Regenerating replaces it and clears the failure counter, which
//! is also the only way out of a lockout.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::PairingFailure;

/// Default credential lifetime.
pub const DEFAULT_PIN_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of wrong guesses before lockout.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const PIN_RANGE: std::ops::RangeInclusive<u32> = 100_000..=999_999;

const EVENT_CAPACITY: usize = 32;

// ── PairingConfig ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingConfig {
    pub ttl: Duration,
    pub max_attempts: u32,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_PIN_TTL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

// ── PairingCredential ────────────────────────────────────────────

/// A live six-digit PIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCredential {
    pub digits: String,
    pub generated_at: Instant,
    pub ttl: Duration,
}

impl PairingCredential {
    /// Expired once strictly more than `ttl` has passed.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.generated_at) > self.ttl
    }

    /// Time left before expiry at `now`.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.generated_at))
    }
}

// ── PairingOutcome ───────────────────────────────────────────────

/// Result of one validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    Accepted,
    Rejected(PairingFailure),
}

impl PairingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PairingOutcome::Accepted)
    }

    pub fn failure(&self) -> Option<PairingFailure> {
        match self {
            PairingOutcome::Accepted => None,
            PairingOutcome::Rejected(reason) => Some(*reason),
        }
    }

    pub fn into_result(self) -> Result<(), PairingFailure> {
        match self {
            PairingOutcome::Accepted => Ok(()),
            PairingOutcome::Rejected(reason) => Err(reason),
        }
    }
}

// ── PairingEvent ─────────────────────────────────────────────────

/// Notifications for the hosting shell.
#[derive(Debug, Clone)]
pub enum PairingEvent {
    CredentialGenerated(PairingCredential),
    AttemptCompleted(PairingOutcome),
}

// ── PairingAuthority ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct PairingState {
    credential: Option<PairingCredential>,
    failures: u32,
}

/// Issues and checks pairing credentials.
pub struct PairingAuthority {
    state: Mutex<PairingState>,
    config: PairingConfig,
    events: broadcast::Sender<PairingEvent>,
}

impl PairingAuthority {
    pub fn new(config: PairingConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(PairingState::default()),
            config,
            events,
        }
    }

    pub fn config(&self) -> PairingConfig {
        self.config
    }

    /// Subscribe to credential and attempt notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PairingEvent> {
        self.events.subscribe()
    }

    /// Issue a fresh random PIN, replacing any live one.
    pub fn generate(&self) -> PairingCredential {
        self.generate_at(Instant::now())
    }

    pub fn generate_at(&self, now: Instant) -> PairingCredential {
        let digits = rand::thread_rng().gen_range(PIN_RANGE).to_string();
        self.install(digits, now)
    }

    /// Install a caller-chosen PIN. Used by tests and fixed-PIN setups.
    pub fn generate_with(&self, digits: impl Into<String>, now: Instant) -> PairingCredential {
        self.install(digits.into(), now)
    }

    /// Check `candidate` against the live credential.
    pub fn validate(&self, candidate: &str) -> PairingOutcome {
        self.validate_at(candidate, Instant::now())
    }

    /// Decision order: no credential, lockout, expiry, mismatch, success.
    /// A success does not clear the failure counter.
    pub fn validate_at(&self, candidate: &str, now: Instant) -> PairingOutcome {
        let outcome = {
            let mut state = self.lock();
            match state.credential.as_ref() {
                None => PairingOutcome::Rejected(PairingFailure::PinExpired),
                Some(_) if state.failures >= self.config.max_attempts => {
                    PairingOutcome::Rejected(PairingFailure::TooManyAttempts)
                }
                Some(cred) if cred.is_expired_at(now) => {
                    PairingOutcome::Rejected(PairingFailure::PinExpired)
                }
                Some(cred) if candidate.is_empty() || candidate != cred.digits => {
                    state.failures += 1;
                    PairingOutcome::Rejected(PairingFailure::InvalidPin)
                }
                Some(_) => PairingOutcome::Accepted,
            }
        };

        match outcome {
            PairingOutcome::Accepted => info!("pairing attempt accepted"),
            PairingOutcome::Rejected(reason) => warn!(%reason, "pairing attempt rejected"),
        }
        let _ = self.events.send(PairingEvent::AttemptCompleted(outcome));
        outcome
    }

    /// The live credential, if one has been generated.
    pub fn current(&self) -> Option<PairingCredential> {
        self.lock().credential.clone()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.lock().failures
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.config
            .max_attempts
            .saturating_sub(self.lock().failures)
    }

    pub fn is_locked_out(&self) -> bool {
        self.lock().failures >= self.config.max_attempts
    }

    /// Time before the live credential expires; zero if none.
    pub fn time_remaining(&self) -> Duration {
        self.time_remaining_at(Instant::now())
    }

    pub fn time_remaining_at(&self, now: Instant) -> Duration {
        self.lock()
            .credential
            .as_ref()
            .map(|c| c.remaining_at(now))
            .unwrap_or_default()
    }

    // ── Internal ─────────────────────────────────────────────────

    fn install(&self, digits: String, now: Instant) -> PairingCredential {
        let credential = PairingCredential {
            digits,
            generated_at: now,
            ttl: self.config.ttl,
        };
        {
            let mut state = self.lock();
            state.credential = Some(credential.clone());
            state.failures = 0;
        }
        debug!(ttl = ?self.config.ttl, "pairing credential generated");
        let _ = self
            .events
            .send(PairingEvent::CredentialGenerated(credential.clone()));
        credential
    }

    fn lock(&self) -> MutexGuard<'_, PairingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PairingAuthority {
    fn default() -> Self {
        Self::new(PairingConfig::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn authority(max_attempts: u32) -> PairingAuthority {
        PairingAuthority::new(PairingConfig {
            ttl: DEFAULT_PIN_TTL,
            max_attempts,
        })
    }

    #[test]
    fn generated_pin_is_six_digits() {
        let auth = PairingAuthority::default();
        for _ in 0..50 {
            let cred = auth.generate();
            assert_eq!(cred.digits.len(), 6);
            let n: u32 = cred.digits.parse().unwrap();
            assert!(PIN_RANGE.contains(&n));
        }
    }

    #[test]
    fn validate_without_credential_is_expired() {
        let auth = PairingAuthority::default();
        assert_eq!(
            auth.validate("123456"),
            PairingOutcome::Rejected(PairingFailure::PinExpired)
        );
    }

    #[test]
    fn correct_pin_is_accepted() {
        let auth = PairingAuthority::default();
        let cred = auth.generate();
        assert!(auth.validate(&cred.digits).is_success());
    }

    #[test]
    fn wrong_and_empty_pins_count_as_failures() {
        let auth = PairingAuthority::default();
        auth.generate_with("123456", Instant::now());
        assert_eq!(
            auth.validate("654321"),
            PairingOutcome::Rejected(PairingFailure::InvalidPin)
        );
        assert_eq!(
            auth.validate(""),
            PairingOutcome::Rejected(PairingFailure::InvalidPin)
        );
        assert_eq!(auth.failed_attempts(), 2);
        assert_eq!(auth.remaining_attempts(), DEFAULT_MAX_ATTEMPTS - 2);
    }

    #[test]
    fn pin_expires_after_ttl() {
        let auth = PairingAuthority::default();
        let t0 = Instant::now();
        auth.generate_with("123456", t0);

        let outcome = auth.validate_at("123456", t0 + Duration::from_secs(6 * 60));
        assert_eq!(outcome, PairingOutcome::Rejected(PairingFailure::PinExpired));
        // Expiry does not count as a failed guess.
        assert_eq!(auth.failed_attempts(), 0);
    }

    #[test]
    fn lockout_rejects_even_correct_pin() {
        let auth = authority(3);
        let t0 = Instant::now();
        auth.generate_with("123456", t0);

        for _ in 0..3 {
            assert_eq!(
                auth.validate_at("000000", t0),
                PairingOutcome::Rejected(PairingFailure::InvalidPin)
            );
        }
        assert!(auth.is_locked_out());
        assert_eq!(
            auth.validate_at("123456", t0),
            PairingOutcome::Rejected(PairingFailure::TooManyAttempts)
        );
    }

    #[test]
    fn lockout_takes_precedence_over_expiry() {
        let auth = authority(1);
        let t0 = Instant::now();
        auth.generate_with("123456", t0);
        auth.validate_at("1", t0);
        assert_eq!(
            auth.validate_at("123456", t0 + Duration::from_secs(3600)),
            PairingOutcome::Rejected(PairingFailure::TooManyAttempts)
        );
    }

    #[test]
    fn success_does_not_clear_failures() {
        let auth = authority(3);
        auth.generate_with("123456", Instant::now());
        auth.validate("111111");
        auth.validate("222222");
        assert!(auth.validate("123456").is_success());
        assert_eq!(auth.failed_attempts(), 2);

        auth.validate("333333");
        assert_eq!(
            auth.validate("123456"),
            PairingOutcome::Rejected(PairingFailure::TooManyAttempts)
        );
    }

    #[test]
    fn regeneration_clears_lockout() {
        let auth = authority(1);
        auth.generate_with("123456", Instant::now());
        auth.validate("000000");
        assert!(auth.is_locked_out());

        let cred = auth.generate();
        assert!(!auth.is_locked_out());
        assert!(auth.validate(&cred.digits).is_success());
    }

    #[test]
    fn time_remaining_counts_down() {
        let auth = PairingAuthority::default();
        let t0 = Instant::now();
        assert_eq!(auth.time_remaining_at(t0), Duration::ZERO);
        auth.generate_with("123456", t0);
        assert_eq!(
            auth.time_remaining_at(t0 + Duration::from_secs(60)),
            Duration::from_secs(4 * 60)
        );
        assert_eq!(
            auth.time_remaining_at(t0 + Duration::from_secs(600)),
            Duration::ZERO
        );
    }

    #[test]
    fn every_call_fires_events() {
        let auth = PairingAuthority::default();
        let mut events = auth.subscribe();

        auth.generate_with("123456", Instant::now());
        auth.validate("123456");
        auth.validate("nope");

        assert!(matches!(
            events.try_recv(),
            Ok(PairingEvent::CredentialGenerated(c)) if c.digits == "123456"
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(PairingEvent::AttemptCompleted(PairingOutcome::Accepted))
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(PairingEvent::AttemptCompleted(PairingOutcome::Rejected(
                PairingFailure::InvalidPin
            )))
        ));
    }
}
