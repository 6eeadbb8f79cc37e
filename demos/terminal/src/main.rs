use std::{cell::RefCell, io::Write, path::PathBuf, rc::Rc};

use anyhow::Context;
use clap::Parser;
use oxitoken::{
    app::{App, Environment},
    clock::{Clock, SystemClock},
    code::TotpCodeSource,
    config::Settings,
    cookie::{host_of, parent_domain, FileCookieJar},
    panel::TokenView,
    store::JsonFileStore,
    theme::{
        AppliedTheme, ManualScheme, Scheme, SchemeObserver, ThemeApplier, ThemeIcon, ThemeMode,
    },
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::LocalSet,
};
use tracing_subscriber::EnvFilter;

/// Shows a rolling TOTP code on one status line.
///
/// Commands on stdin: `secret <s>`, `digits <6|8>`, `period <n>`, `light`,
/// `dark`, `auto`, `toggle`, `system <light|dark>`, `quit`.
#[derive(Debug, Parser)]
#[command(name = "oxitoken", version)]
struct Cli {
    /// Address this instance stands in for. Instances under the same parent
    /// domain share their theme preference.
    #[arg(long, env = "OXITOKEN_ADDRESS", default_value = "https://totp.example.com")]
    address: String,

    /// Directory holding the per-host store and the shared theme jar.
    #[arg(long, env = "OXITOKEN_DATA_DIR", default_value = ".oxitoken")]
    data_dir: PathBuf,

    /// Optional JSON settings file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Color scheme reported as the system preference.
    #[arg(long, default_value = "light", value_parser = parse_scheme)]
    system: Scheme,
}

fn parse_scheme(raw: &str) -> Result<Scheme, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "light" => Ok(Scheme::Light),
        "dark" => Ok(Scheme::Dark),
        other => Err(format!("unknown scheme {other:?}, expected light or dark")),
    }
}

#[derive(Default)]
struct StatusLine {
    code: RefCell<String>,
    remaining: RefCell<u64>,
    theme: RefCell<Option<AppliedTheme>>,
}

impl StatusLine {
    fn render(&self) {
        let theme = match *self.theme.borrow() {
            Some(applied) => {
                let icon = match applied.icon {
                    ThemeIcon::Sun => "sun",
                    ThemeIcon::Moon => "moon",
                };
                format!("{} ({}, {icon})", applied.scheme, applied.mode)
            }
            None => "-".to_string(),
        };

        let mut stdout = std::io::stdout().lock();
        let written = write!(
            stdout,
            "\r\x1b[2K{:>9}  {:>3}s  {theme}",
            self.code.borrow(),
            self.remaining.borrow()
        )
        .and_then(|()| stdout.flush());
        if let Err(e) = written {
            tracing::debug!(error = %e, "Status line not written");
        }
    }
}

impl TokenView for StatusLine {
    fn show_code(&self, code: &str) {
        *self.code.borrow_mut() = code.to_string();
        self.render();
    }

    fn show_remaining(&self, seconds: u64) {
        *self.remaining.borrow_mut() = seconds;
        self.render();
    }
}

impl ThemeApplier for StatusLine {
    fn apply(&self, theme: &AppliedTheme) {
        *self.theme.borrow_mut() = Some(*theme);
        self.render();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.settings.as_deref()).context("Failed to load settings")?;
    if settings.theme.cookie_domain.is_none() {
        settings.theme.cookie_domain = parent_domain(&cli.address);
    }
    let host = host_of(&cli.address).context("The address has no host")?;

    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let system = Rc::new(ManualScheme::new(cli.system));
    let status = Rc::new(StatusLine::default());

    let app = App::start(
        settings,
        Environment {
            store: Rc::new(JsonFileStore::new(cli.data_dir.join(format!("{host}.json")))),
            shared: Rc::new(FileCookieJar::new(
                cli.data_dir.join("cookies.json"),
                &host,
                Rc::clone(&clock),
            )),
            source: Rc::new(TotpCodeSource),
            clock,
            system: Rc::clone(&system) as Rc<dyn SchemeObserver>,
            view: Rc::clone(&status) as Rc<dyn TokenView>,
            applier: Rc::clone(&status) as Rc<dyn ThemeApplier>,
        },
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
        let argument = argument.trim();

        match command {
            "" => {}
            "secret" => app.panel.secret_changed(argument),
            "digits" => match argument.parse() {
                Ok(digits) => app.panel.digits_changed(digits),
                Err(e) => tracing::warn!(error = %e, "Ignoring digits"),
            },
            "period" => match argument.parse::<u64>() {
                Ok(period) => {
                    if let Err(e) = app.panel.period_changed(period) {
                        tracing::warn!(error = %e, "Ignoring period");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring period"),
            },
            "light" | "dark" | "auto" => match command.parse::<ThemeMode>() {
                Ok(mode) => app.theme.set_preference(mode),
                Err(e) => tracing::warn!(error = %e, "Ignoring theme"),
            },
            "toggle" => {
                app.theme.toggle();
            }
            "system" => match parse_scheme(argument) {
                Ok(scheme) => system.set(scheme),
                Err(e) => tracing::warn!(error = %e, "Ignoring system scheme"),
            },
            "quit" | "exit" => break,
            other => tracing::warn!(command = other, "Unknown command"),
        }
    }

    app.stop();
    println!();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the runtime")?;

    LocalSet::new().block_on(&runtime, run(cli))
}
