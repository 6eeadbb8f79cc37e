//! Cookie-like storage shared by every host under a parent domain.
//!
//! Entries expire after their max age and are visible according to cookie
//! domain matching: an entry set for `.example.com` is readable from
//! `example.com` and every subdomain, an entry set without a domain only from
//! the host that wrote it.

use std::{
    cell::RefCell,
    io::ErrorKind,
    path::{Path, PathBuf},
    rc::Rc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::{clock::Clock, store::StorageError};

pub trait SharedStore {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError>;
    fn set(
        &self,
        name: &str,
        value: &str,
        max_age: Duration,
        domain: Option<&str>,
    ) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Cookie {
    name: String,
    value: String,
    /// Lower-case domain without a leading dot, or the writing host.
    scope: String,
    host_only: bool,
    expires_at: u64,
}

impl Cookie {
    fn visible_from(&self, host: &str) -> bool {
        if self.host_only {
            return self.scope == host;
        }
        host == self.scope || host.ends_with(&format!(".{}", self.scope))
    }
}

/// The entries of one jar, independent of where they are kept.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    /// The most recently written live entry named `name` visible from `host`.
    pub fn get(&self, name: &str, host: &str, now: u64) -> Option<&str> {
        let host = host.to_ascii_lowercase();
        self.cookies
            .iter()
            .rev()
            .find(|c| c.name == name && c.expires_at > now && c.visible_from(&host))
            .map(|c| c.value.as_str())
    }

    pub fn set(
        &mut self,
        name: &str,
        value: &str,
        host: &str,
        domain: Option<&str>,
        expires_at: u64,
    ) -> Result<(), StorageError> {
        let host = host.to_ascii_lowercase();
        let (scope, host_only) = match domain {
            Some(domain) => {
                let scope = domain.trim_start_matches('.').to_ascii_lowercase();
                if host != scope && !host.ends_with(&format!(".{scope}")) {
                    return Err(StorageError::DomainMismatch {
                        domain: domain.to_string(),
                        host,
                    });
                }
                (scope, false)
            }
            None => (host, true),
        };

        self.cookies
            .retain(|c| !(c.name == name && c.scope == scope && c.host_only == host_only));
        self.cookies.push(Cookie {
            name: name.to_string(),
            value: value.to_string(),
            scope,
            host_only,
            expires_at,
        });
        Ok(())
    }

    pub fn purge_expired(&mut self, now: u64) {
        self.cookies.retain(|c| c.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// A jar kept in process memory; each host reads it through [`HostCookies`].
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    jar: RefCell<CookieJar>,
}

impl MemoryCookieJar {
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// A view of the jar as seen from `host`.
    pub fn context(self: &Rc<Self>, host: &str, clock: Rc<dyn Clock>) -> HostCookies {
        HostCookies {
            jar: Rc::clone(self),
            host: host.to_ascii_lowercase(),
            clock,
        }
    }
}

pub struct HostCookies {
    jar: Rc<MemoryCookieJar>,
    host: String,
    clock: Rc<dyn Clock>,
}

impl SharedStore for HostCookies {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let jar = self.jar.jar.borrow();
        let value = jar
            .get(name, &self.host, self.clock.now())
            .map(str::to_string);
        Ok(value)
    }

    fn set(
        &self,
        name: &str,
        value: &str,
        max_age: Duration,
        domain: Option<&str>,
    ) -> Result<(), StorageError> {
        let now = self.clock.now();
        let mut jar = self.jar.jar.borrow_mut();
        jar.set(name, value, &self.host, domain, now.saturating_add(max_age.as_secs()))?;
        jar.purge_expired(now);
        Ok(())
    }
}

/// A jar kept in a JSON file, shared by independent processes.
///
/// The file is re-read on every access so writes from other processes are
/// observed on the next read.
pub struct FileCookieJar {
    path: PathBuf,
    host: String,
    clock: Rc<dyn Clock>,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>, host: &str, clock: Rc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            host: host.to_ascii_lowercase(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CookieJar, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CookieJar::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SharedStore for FileCookieJar {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let jar = self.load()?;
        let value = jar
            .get(name, &self.host, self.clock.now())
            .map(str::to_string);
        Ok(value)
    }

    fn set(
        &self,
        name: &str,
        value: &str,
        max_age: Duration,
        domain: Option<&str>,
    ) -> Result<(), StorageError> {
        let now = self.clock.now();
        let mut jar = self.load()?;
        jar.set(name, value, &self.host, domain, now.saturating_add(max_age.as_secs()))?;
        jar.purge_expired(now);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&jar)?)?;
        Ok(())
    }
}

fn parse_address(address: &str) -> Option<Url> {
    Url::parse(address)
        .ok()
        .filter(Url::has_host)
        .or_else(|| Url::parse(&format!("http://{address}")).ok())
}

/// The host name of a URL or bare host, lower-cased.
pub fn host_of(address: &str) -> Option<String> {
    parse_address(address)?
        .host_str()
        .map(|host| host.trim_end_matches('.').to_ascii_lowercase())
}

/// The domain to scope shared entries to so sibling subdomains see them.
///
/// `https://totp.example.com` yields `.example.com`. IP literals and
/// single-label hosts such as `localhost` yield `None` (host-only entries).
///
/// Only the last two labels are kept; there is no public suffix list, so
/// `totp.example.co.uk` yields `.co.uk`. Set the cookie domain explicitly
/// for hosts under a multi-label suffix.
pub fn parent_domain(address: &str) -> Option<String> {
    let url = parse_address(address)?;
    match url.host()? {
        Host::Domain(domain) => {
            let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
            if labels.len() < 2 {
                return None;
            }
            Some(format!(".{}", labels[labels.len() - 2..].join(".")))
        }
        Host::Ipv4(_) | Host::Ipv6(_) => None,
    }
}
