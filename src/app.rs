//! Start-up wiring: the token panel and the theme synchronizer share nothing
//! but the local store and the clock, and are brought up side by side.

use std::rc::Rc;

use crate::{
    clock::Clock,
    code::CodeSource,
    config::Settings,
    cookie::SharedStore,
    panel::{TokenPanel, TokenView},
    store::KeyValueStore,
    sync::ThemeSynchronizer,
    theme::{SchemeObserver, ThemeApplier},
};

/// The collaborators a host provides.
pub struct Environment {
    /// Local store for the token input and the theme cache.
    pub store: Rc<dyn KeyValueStore>,
    /// Store shared with sibling contexts, holding the theme preference.
    pub shared: Rc<dyn SharedStore>,
    pub source: Rc<dyn CodeSource>,
    pub clock: Rc<dyn Clock>,
    pub system: Rc<dyn SchemeObserver>,
    pub view: Rc<dyn TokenView>,
    pub applier: Rc<dyn ThemeApplier>,
}

pub struct App {
    pub panel: TokenPanel,
    pub theme: ThemeSynchronizer,
}

impl App {
    /// Restores both subsystems and arms their timers.
    ///
    /// Must be called from within a [`tokio::task::LocalSet`].
    pub fn start(settings: Settings, env: Environment) -> Self {
        let panel = TokenPanel::new(
            settings.token,
            Rc::clone(&env.store),
            env.source,
            env.clock,
            env.view,
        );
        panel.load();

        let theme = ThemeSynchronizer::new(
            settings.theme,
            env.shared,
            env.store,
            env.system,
            env.applier,
        );
        let mode = theme.initialize();

        tracing::info!(
            %mode,
            counting = panel.is_counting(),
            "Application started"
        );
        Self { panel, theme }
    }

    /// Cancels both timers.
    pub fn stop(&self) {
        self.panel.stop();
        self.theme.stop();
    }
}
