//! Keeps the applied theme in step with a preference that other contexts
//! (other tabs, sibling subdomains) may change at any time.
//!
//! The shared store is the source of truth. Other contexts cannot notify us,
//! so the shared value is re-read on a fixed interval and re-applied when it
//! differs from the last value this context applied or wrote. Local writes
//! update that marker first, so a context never re-applies its own write.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    config::ThemeSettings,
    cookie::SharedStore,
    store::KeyValueStore,
    theme::{AppliedTheme, Scheme, SchemeObserver, ThemeApplier, ThemeMode},
};

/// Cheap to clone; all clones drive the same state.
///
/// The poll runs as a local task, so the synchronizer must live inside a
/// [`tokio::task::LocalSet`]. Dropping the last clone cancels the poll.
#[derive(Clone)]
pub struct ThemeSynchronizer {
    inner: Rc<SyncInner>,
}

struct SyncInner {
    settings: ThemeSettings,
    shared: Rc<dyn SharedStore>,
    cache: Rc<dyn KeyValueStore>,
    system: Rc<dyn SchemeObserver>,
    applier: Rc<dyn ThemeApplier>,
    mode: Cell<ThemeMode>,
    last_seen: Cell<Option<ThemeMode>>,
    subscribed: Cell<bool>,
    poll: RefCell<Option<JoinHandle<()>>>,
}

impl ThemeSynchronizer {
    pub fn new(
        settings: ThemeSettings,
        shared: Rc<dyn SharedStore>,
        cache: Rc<dyn KeyValueStore>,
        system: Rc<dyn SchemeObserver>,
        applier: Rc<dyn ThemeApplier>,
    ) -> Self {
        Self {
            inner: Rc::new(SyncInner {
                settings,
                shared,
                cache,
                system,
                applier,
                mode: Cell::new(ThemeMode::Auto),
                last_seen: Cell::new(None),
                subscribed: Cell::new(false),
                poll: RefCell::new(None),
            }),
        }
    }

    /// Applies the stored preference (`Auto` when none), writes its tag back
    /// to both stores, follows system changes and starts polling.
    pub fn initialize(&self) -> ThemeMode {
        let inner = &self.inner;
        let mode = inner.read_preference().unwrap_or_default();

        inner.last_seen.set(Some(mode));
        inner.apply(mode);
        inner.persist(mode);

        if !inner.subscribed.replace(true) {
            let weak = Rc::downgrade(inner);
            inner.system.on_change(Box::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    // only a live Auto preference follows the system
                    if inner.mode.get() == ThemeMode::Auto {
                        inner.apply(ThemeMode::Auto);
                    }
                }
            }));
        }

        self.start_polling();
        tracing::debug!(%mode, "Theme initialized");
        mode
    }

    /// A user's explicit choice in this context.
    pub fn set_preference(&self, mode: ThemeMode) {
        let inner = &self.inner;
        inner.last_seen.set(Some(mode));
        inner.apply(mode);
        inner.persist(mode);
    }

    /// Switches to the explicit opposite of what is shown now.
    pub fn toggle(&self) -> ThemeMode {
        let next = match self.effective() {
            Scheme::Dark => ThemeMode::Light,
            Scheme::Light => ThemeMode::Dark,
        };
        self.set_preference(next);
        next
    }

    /// Shows `mode` without persisting it.
    ///
    /// This is a preview: the next poll puts the stored preference back.
    pub fn apply_theme(&self, mode: ThemeMode) -> Scheme {
        self.inner.last_seen.set(None);
        self.inner.apply(mode).scheme
    }

    /// One reconciliation round; true when another context's change was applied.
    pub fn poll_once(&self) -> bool {
        self.inner.poll_once()
    }

    pub fn mode(&self) -> ThemeMode {
        self.inner.mode.get()
    }

    pub fn effective(&self) -> Scheme {
        AppliedTheme::new(self.mode(), self.inner.system.current()).scheme
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poll.borrow().is_some()
    }

    /// Cancels the poll; does nothing when not polling.
    pub fn stop(&self) {
        self.inner.stop();
    }

    fn start_polling(&self) {
        self.stop();

        let period = self.inner.settings.poll_interval();
        let weak: Weak<SyncInner> = Rc::downgrade(&self.inner);
        let poll = tokio::task::spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(inner) => {
                        inner.poll_once();
                    }
                    None => break,
                }
            }
        });

        *self.inner.poll.borrow_mut() = Some(poll);
        tracing::debug!(interval_ms = period.as_millis() as u64, "Theme poll started");
    }
}

impl SyncInner {
    /// Shared store first, then the local cache. `None` when neither holds a
    /// readable preference.
    fn read_preference(&self) -> Option<ThemeMode> {
        let name = &self.settings.cookie_name;
        match self.shared.get(name) {
            Ok(Some(tag)) => match tag.parse() {
                Ok(mode) => return Some(mode),
                Err(e) => tracing::warn!(error = %e, "Ignoring shared theme entry"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Shared store unavailable, using local cache"),
        }

        match self.cache.get(&self.settings.cache_key) {
            Ok(tag) => tag.and_then(|tag| tag.parse().ok()),
            Err(e) => {
                tracing::warn!(error = %e, "Local cache unavailable");
                None
            }
        }
    }

    fn poll_once(&self) -> bool {
        let Some(current) = self.read_preference() else {
            return false;
        };
        let previous = self.last_seen.get();
        if previous == Some(current) {
            tracing::trace!(mode = %current, "Theme unchanged");
            return false;
        }

        tracing::info!(from = ?previous, to = %current, "Theme changed in another context");
        self.last_seen.set(Some(current));
        self.apply(current);
        if let Err(e) = self.cache.set(&self.settings.cache_key, current.as_str()) {
            tracing::warn!(error = %e, "Local cache unavailable");
        }
        true
    }

    /// The single path every trigger goes through to reach the UI.
    fn apply(&self, mode: ThemeMode) -> AppliedTheme {
        let applied = AppliedTheme::new(mode, self.system.current());
        self.mode.set(mode);
        self.applier.apply(&applied);

        tracing::debug!(%mode, scheme = %applied.scheme, "Theme applied");
        applied
    }

    fn persist(&self, mode: ThemeMode) {
        let settings = &self.settings;
        if let Err(e) = self.shared.set(
            &settings.cookie_name,
            mode.as_str(),
            settings.max_age(),
            settings.cookie_domain.as_deref(),
        ) {
            tracing::warn!(error = %e, "Shared store unavailable, preference kept locally");
        }
        if let Err(e) = self.cache.set(&settings.cache_key, mode.as_str()) {
            tracing::warn!(error = %e, "Local cache unavailable");
        }
    }

    fn stop(&self) {
        if let Some(poll) = self.poll.borrow_mut().take() {
            poll.abort();
            tracing::debug!("Theme poll stopped");
        }
    }
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        self.stop();
    }
}
