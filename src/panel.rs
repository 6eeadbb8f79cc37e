//! The token panel: current input, its persistence, and the countdown that
//! keeps the displayed code fresh.

use std::{cell::RefCell, fmt::Display, rc::Rc, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    code::{
        format_code, CodeError, CodeSource, PLACEHOLDER_FAILED, PLACEHOLDER_NO_INPUT,
        PLACEHOLDER_UNAVAILABLE,
    },
    config::{ConfigError, TokenSettings},
    scheduler::CountdownScheduler,
    secret::{is_valid_secret, normalize_secret},
    store::KeyValueStore,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Digits {
    #[default]
    Six,
    Eight,
}

impl Digits {
    pub fn get(self) -> u32 {
        match self {
            Self::Six => 6,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u32> for Digits {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(Self::Six),
            8 => Ok(Self::Eight),
            other => Err(ConfigError::InvalidDigits(other)),
        }
    }
}

impl From<Digits> for u32 {
    fn from(value: Digits) -> Self {
        value.get()
    }
}

impl FromStr for Digits {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidDigits(0))?;
        Self::try_from(value)
    }
}

impl Display for Digits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// What the user typed and picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotpConfig {
    /// Trimmed as typed; normalized only when a code is computed.
    pub secret: String,
    pub digits: Digits,
    pub step_seconds: u64,
}

/// The two display points the panel updates.
pub trait TokenView {
    fn show_code(&self, code: &str);
    fn show_remaining(&self, seconds: u64);
}

/// Owns the input, the store it is persisted to, and the countdown.
///
/// Countdown ticks run as local tasks, so the panel must live inside a
/// [`tokio::task::LocalSet`].
pub struct TokenPanel {
    inner: Rc<PanelInner>,
}

struct PanelInner {
    config: RefCell<TotpConfig>,
    settings: TokenSettings,
    store: Rc<dyn KeyValueStore>,
    source: Rc<dyn CodeSource>,
    clock: Rc<dyn Clock>,
    view: Rc<dyn TokenView>,
    countdown: RefCell<CountdownScheduler>,
}

impl TokenPanel {
    pub fn new(
        settings: TokenSettings,
        store: Rc<dyn KeyValueStore>,
        source: Rc<dyn CodeSource>,
        clock: Rc<dyn Clock>,
        view: Rc<dyn TokenView>,
    ) -> Self {
        let config = TotpConfig {
            secret: String::new(),
            digits: settings.default_digits,
            step_seconds: settings.default_period,
        };

        Self {
            inner: Rc::new(PanelInner {
                config: RefCell::new(config),
                countdown: RefCell::new(CountdownScheduler::new(Rc::clone(&clock))),
                settings,
                store,
                source,
                clock,
                view,
            }),
        }
    }

    /// Restores the persisted input and starts the countdown if it is usable.
    pub fn load(&self) {
        let inner = &self.inner;
        let settings = &inner.settings;

        let secret = inner.read(&settings.secret_key).unwrap_or_default();
        let digits = inner
            .read(&settings.digits_key)
            .and_then(|raw| match raw.parse::<Digits>() {
                Ok(digits) => Some(digits),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Ignoring stored digits");
                    None
                }
            })
            .unwrap_or(settings.default_digits);
        let step_seconds = inner
            .read(&settings.period_key)
            .and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(period) if period > 0 => Some(period),
                _ => {
                    tracing::warn!(value = %raw, "Ignoring stored period");
                    None
                }
            })
            .unwrap_or(settings.default_period);

        *inner.config.borrow_mut() = TotpConfig {
            secret: secret.trim().to_string(),
            digits,
            step_seconds,
        };
        tracing::debug!(%digits, step_seconds, has_secret = !secret.is_empty(), "Input restored");

        self.reconcile();
    }

    pub fn secret_changed(&self, raw: &str) {
        let secret = raw.trim().to_string();
        let key = &self.inner.settings.secret_key;
        if secret.is_empty() {
            self.inner.forget(key);
        } else {
            self.inner.write(key, &secret);
        }

        self.inner.config.borrow_mut().secret = secret;
        self.reconcile();
    }

    pub fn digits_changed(&self, digits: Digits) {
        self.inner
            .write(&self.inner.settings.digits_key, &digits.to_string());
        self.inner.config.borrow_mut().digits = digits;

        if self.has_valid_secret() {
            self.inner.refresh_code();
        }
    }

    pub fn period_changed(&self, step_seconds: u64) -> Result<(), ConfigError> {
        if step_seconds == 0 {
            return Err(ConfigError::InvalidPeriod);
        }

        self.inner
            .write(&self.inner.settings.period_key, &step_seconds.to_string());
        self.inner.config.borrow_mut().step_seconds = step_seconds;

        if self.has_valid_secret() {
            self.restart_countdown();
        }
        Ok(())
    }

    /// Recomputes the displayed code for the current input.
    pub fn refresh_code(&self) {
        self.inner.refresh_code();
    }

    pub fn config(&self) -> TotpConfig {
        self.inner.config.borrow().clone()
    }

    pub fn is_counting(&self) -> bool {
        self.inner.countdown.borrow().is_armed()
    }

    /// Stops the countdown, leaving the display as it is.
    pub fn stop(&self) {
        self.inner.countdown.borrow_mut().stop();
    }

    fn has_valid_secret(&self) -> bool {
        is_valid_secret(&self.inner.config.borrow().secret)
    }

    /// Counting with a fresh code when the secret is usable, placeholders otherwise.
    fn reconcile(&self) {
        if self.has_valid_secret() {
            self.restart_countdown();
            return;
        }

        self.inner.countdown.borrow_mut().stop();
        let step_seconds = self.inner.config.borrow().step_seconds;
        self.inner.view.show_code(PLACEHOLDER_NO_INPUT);
        self.inner.view.show_remaining(step_seconds);
    }

    fn restart_countdown(&self) {
        let step_seconds = self.inner.config.borrow().step_seconds;
        let view = Rc::clone(&self.inner.view);
        let panel = Rc::downgrade(&self.inner);

        self.inner.countdown.borrow_mut().start(
            step_seconds,
            move |remaining| view.show_remaining(remaining),
            move || {
                if let Some(inner) = panel.upgrade() {
                    inner.refresh_code();
                }
            },
        );
        self.inner.refresh_code();
    }
}

impl PanelInner {
    fn refresh_code(&self) {
        let config = self.config.borrow().clone();
        if !is_valid_secret(&config.secret) {
            self.view.show_code(PLACEHOLDER_NO_INPUT);
            return;
        }

        let digits = config.digits.get();
        let result = self.source.compute(
            &normalize_secret(&config.secret),
            digits,
            config.step_seconds,
            self.clock.now(),
        );

        match result {
            Ok(code) => self.view.show_code(&format_code(&code, digits)),
            Err(CodeError::Unavailable) => {
                tracing::error!("Code source is not loaded");
                self.view.show_code(PLACEHOLDER_UNAVAILABLE);
            }
            Err(e) => {
                tracing::error!(error = %e, "Error generating code");
                self.view.show_code(PLACEHOLDER_FAILED);
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Store unavailable, using defaults");
            None
        })
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!(key, error = %e, "Store unavailable, keeping value in memory");
        }
    }

    fn forget(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(key, error = %e, "Store unavailable, could not remove value");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        rc::Rc,
        time::Duration,
    };

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::{task::LocalSet, time::sleep};

    use super::{Digits, TokenPanel, TokenView};
    use crate::{
        clock::{Clock, TokioClock},
        code::{format_code, CodeError, CodeSource, TotpCodeSource},
        config::{ConfigError, TokenSettings},
        store::{KeyValueStore, MemoryStore, StorageError},
    };

    // 1_699_999_985 % 30 == 5
    const FIVE_INTO_STEP: u64 = 1_699_999_985;
    const SECRET: &str = "JBSWY3DPEHPK3PXP";

    #[derive(Default)]
    struct RecordingView {
        codes: RefCell<Vec<String>>,
        remaining: RefCell<Vec<u64>>,
    }

    impl RecordingView {
        fn code(&self) -> Option<String> {
            self.codes.borrow().last().cloned()
        }

        fn remaining(&self) -> Option<u64> {
            self.remaining.borrow().last().copied()
        }
    }

    impl TokenView for RecordingView {
        fn show_code(&self, code: &str) {
            self.codes.borrow_mut().push(code.to_string());
        }

        fn show_remaining(&self, seconds: u64) {
            self.remaining.borrow_mut().push(seconds);
        }
    }

    /// Counts calls and hands out a different code per step window.
    #[derive(Default)]
    struct CountingSource {
        calls: Cell<u32>,
    }

    impl CodeSource for CountingSource {
        fn compute(
            &self,
            _secret: &str,
            digits: u32,
            step_seconds: u64,
            unix_seconds: u64,
        ) -> Result<String, CodeError> {
            self.calls.set(self.calls.get() + 1);
            let window = unix_seconds / step_seconds;
            Ok(format!("{:0width$}", window % 1000, width = digits as usize))
        }
    }

    struct UnavailableSource;

    impl CodeSource for UnavailableSource {
        fn compute(&self, _: &str, _: u32, _: u64, _: u64) -> Result<String, CodeError> {
            Err(CodeError::Unavailable)
        }
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }

        fn set(&self, _: &str, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }

        fn remove(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }
    }

    struct Fixture {
        panel: TokenPanel,
        view: Rc<RecordingView>,
        store: Rc<MemoryStore>,
        clock: Rc<dyn Clock>,
    }

    fn fixture_with(source: Rc<dyn CodeSource>, store: Rc<MemoryStore>) -> Fixture {
        let view = Rc::new(RecordingView::default());
        let clock: Rc<dyn Clock> = Rc::new(TokioClock::starting_at(FIVE_INTO_STEP));
        let panel = TokenPanel::new(
            TokenSettings::default(),
            Rc::clone(&store) as Rc<dyn KeyValueStore>,
            source,
            Rc::clone(&clock),
            Rc::clone(&view) as Rc<dyn TokenView>,
        );

        Fixture {
            panel,
            view,
            store,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Rc::new(TotpCodeSource), Rc::new(MemoryStore::new()))
    }

    fn expected_code(secret: &str, digits: u32, step: u64, now: u64) -> String {
        format_code(
            &TotpCodeSource.compute(secret, digits, step, now).unwrap(),
            digits,
        )
    }

    #[rstest]
    #[case(Digits::Six, 3)]
    #[case(Digits::Eight, 4)]
    #[tokio::test(start_paused = true)]
    async fn valid_secret_shows_split_code_and_remaining(
        #[case] digits: Digits,
        #[case] half: usize,
    ) {
        LocalSet::new()
            .run_until(async {
                let f = fixture();
                f.panel.digits_changed(digits);
                f.panel.secret_changed(SECRET);

                let code = f.view.code().unwrap();
                assert_eq!(
                    expected_code(SECRET, digits.get(), 30, f.clock.now()),
                    code
                );
                assert_eq!(Some(' '), code.chars().nth(half));
                assert_eq!(2 * half + 1, code.len());
                assert_eq!(Some(25), f.view.remaining());
                assert!(f.panel.is_counting());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_secret_resets_display_and_stops() {
        LocalSet::new()
            .run_until(async {
                let f = fixture();
                f.panel.secret_changed(SECRET);
                assert!(f.panel.is_counting());

                f.panel.secret_changed("   ");

                assert_eq!(Some("------".to_string()), f.view.code());
                assert_eq!(Some(30), f.view.remaining());
                assert!(!f.panel.is_counting());
                assert_eq!(None, f.store.get("totp-secret-key").unwrap());

                let shown = f.view.remaining.borrow().len();
                sleep(Duration::from_secs(5)).await;
                assert_eq!(shown, f.view.remaining.borrow().len());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_secret_shows_placeholder() {
        LocalSet::new()
            .run_until(async {
                let f = fixture();
                f.panel.secret_changed("not a secret!");

                assert_eq!(Some("------".to_string()), f.view.code());
                assert!(!f.panel.is_counting());
                // kept so the user does not lose what they typed
                assert_eq!(
                    Some("not a secret!".to_string()),
                    f.store.get("totp-secret-key").unwrap()
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn code_regenerates_at_boundary() {
        LocalSet::new()
            .run_until(async {
                let source = Rc::new(CountingSource::default());
                let f = fixture_with(
                    Rc::clone(&source) as Rc<dyn CodeSource>,
                    Rc::new(MemoryStore::new()),
                );
                f.panel.secret_changed(SECRET);
                let before = f.view.code().unwrap();
                let calls = source.calls.get();

                sleep(Duration::from_millis(24_500)).await;
                assert_eq!(calls, source.calls.get());

                sleep(Duration::from_secs(1)).await;
                assert_eq!(calls + 1, source.calls.get());
                assert_ne!(before, f.view.code().unwrap());
                assert_eq!(Some(30), f.view.remaining());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_source_shows_library_placeholder() {
        LocalSet::new()
            .run_until(async {
                let f = fixture_with(Rc::new(UnavailableSource), Rc::new(MemoryStore::new()));
                f.panel.secret_changed(SECRET);

                assert_eq!(Some("LIB ERROR".to_string()), f.view.code());
                assert!(f.panel.is_counting());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_computation_keeps_counting() {
        LocalSet::new()
            .run_until(async {
                let f = fixture();
                // valid hex, but not decodable as base32
                f.panel.secret_changed("0189ABCD");

                assert_eq!(Some("ERROR".to_string()), f.view.code());
                assert!(f.panel.is_counting());

                sleep(Duration::from_millis(25_500)).await;
                assert_eq!(Some(30), f.view.remaining());
                assert_eq!(Some("ERROR".to_string()), f.view.code());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn period_change_restarts_with_new_step() {
        LocalSet::new()
            .run_until(async {
                let f = fixture();
                f.panel.secret_changed(SECRET);

                f.panel.period_changed(60).unwrap();

                // 1_699_999_985 % 60 == 5
                assert_eq!(Some(55), f.view.remaining());
                assert_eq!(
                    Some(expected_code(SECRET, 6, 60, f.clock.now())),
                    f.view.code()
                );
                assert_eq!(Some("60".to_string()), f.store.get("totp-period").unwrap());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_rejected() {
        LocalSet::new()
            .run_until(async {
                let f = fixture();
                f.panel.secret_changed(SECRET);

                assert!(matches!(
                    f.panel.period_changed(0),
                    Err(ConfigError::InvalidPeriod)
                ));
                assert_eq!(30, f.panel.config().step_seconds);
                assert_eq!(None, f.store.get("totp-period").unwrap());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn load_restores_persisted_input() {
        LocalSet::new()
            .run_until(async {
                let store = Rc::new(MemoryStore::new());
                store.set("totp-secret-key", SECRET).unwrap();
                store.set("totp-digits", "8").unwrap();
                store.set("totp-period", "60").unwrap();

                let f = fixture_with(Rc::new(TotpCodeSource), store);
                f.panel.load();

                let config = f.panel.config();
                assert_eq!(SECRET, config.secret);
                assert_eq!(Digits::Eight, config.digits);
                assert_eq!(60, config.step_seconds);
                assert!(f.panel.is_counting());
                assert_eq!(
                    Some(expected_code(SECRET, 8, 60, f.clock.now())),
                    f.view.code()
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn load_ignores_malformed_values() {
        LocalSet::new()
            .run_until(async {
                let store = Rc::new(MemoryStore::new());
                store.set("totp-digits", "7").unwrap();
                store.set("totp-period", "0").unwrap();

                let f = fixture_with(Rc::new(TotpCodeSource), store);
                f.panel.load();

                assert_eq!(Digits::Six, f.panel.config().digits);
                assert_eq!(30, f.panel.config().step_seconds);
                assert_eq!(Some("------".to_string()), f.view.code());
                assert_eq!(Some(30), f.view.remaining());
                assert!(!f.panel.is_counting());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn broken_store_degrades_to_memory() {
        LocalSet::new()
            .run_until(async {
                let view = Rc::new(RecordingView::default());
                let clock: Rc<dyn Clock> = Rc::new(TokioClock::starting_at(FIVE_INTO_STEP));
                let panel = TokenPanel::new(
                    TokenSettings::default(),
                    Rc::new(BrokenStore),
                    Rc::new(TotpCodeSource),
                    Rc::clone(&clock),
                    Rc::clone(&view) as Rc<dyn TokenView>,
                );

                panel.load();
                panel.secret_changed(SECRET);

                assert_eq!(SECRET, panel.config().secret);
                assert_eq!(
                    Some(expected_code(SECRET, 6, 30, clock.now())),
                    view.code()
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_panel_stops_the_countdown() {
        LocalSet::new()
            .run_until(async {
                let f = fixture();
                f.panel.secret_changed(SECRET);
                let view = Rc::clone(&f.view);
                drop(f);

                let shown = view.remaining.borrow().len();
                sleep(Duration::from_secs(5)).await;
                assert_eq!(shown, view.remaining.borrow().len());
            })
            .await;
    }
}
