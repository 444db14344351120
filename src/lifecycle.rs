//! Package lifecycle: countdown derivation, the live countdown panel and the
//! manual override arithmetic.
//!
//! Status is a pure function of (expiry, now). The panel recomputes it on a
//! fixed tick from a background thread that it owns; replacing the record or
//! unmounting always joins the old thread before a new one starts.

use crate::clock::Clock;
use crate::i18n::{Language, Message};
use crate::navigation::Page;
use crate::session::User;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WARNING_SECS: u64 = 600;

const MS_PER_MINUTE: i64 = 60 * 1000;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Whole seconds left until `expiry_ms`, never negative
pub fn remaining_secs(expiry_ms: i64, now_ms: i64) -> u64 {
    let diff = expiry_ms.saturating_sub(now_ms);
    if diff <= 0 {
        0
    } else {
        (diff / 1000) as u64
    }
}

/// Zero-padded `HH:MM:SS`. Hours keep counting past 99.
pub fn format_hms(total_secs: u64) -> String {
    let hrs = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hrs, mins, secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    None,
    Active,
    Warning,
    Expired,
}

impl PackageStatus {
    pub fn from_remaining(remaining_secs: u64, warning_secs: u64) -> Self {
        if remaining_secs == 0 {
            Self::Expired
        } else if remaining_secs <= warning_secs {
            Self::Warning
        } else {
            Self::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Active => "active",
            Self::Warning => "warning",
            Self::Expired => "expired",
        }
    }

    pub fn label(&self, lang: Language) -> &'static str {
        match self {
            Self::None => lang.text(Message::NoActivePackage),
            Self::Active => lang.text(Message::Active),
            Self::Warning => lang.text(Message::Warning),
            Self::Expired => lang.text(Message::Expired),
        }
    }
}

/// One recomputation of the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    pub package: Option<String>,
    pub remaining_secs: u64,
    pub status: PackageStatus,
}

impl Countdown {
    pub fn compute(user: Option<&User>, now_ms: i64, warning_secs: u64) -> Self {
        let active = user.and_then(|u| match (&u.active_package, u.expiry_timestamp) {
            (Some(name), Some(expiry)) => Some((name.clone(), expiry)),
            _ => None,
        });
        match active {
            Some((name, expiry)) => {
                let remaining = remaining_secs(expiry, now_ms);
                Self {
                    package: Some(name),
                    remaining_secs: remaining,
                    status: PackageStatus::from_remaining(remaining, warning_secs),
                }
            }
            None => Self::none(),
        }
    }

    pub fn none() -> Self {
        Self {
            package: None,
            remaining_secs: 0,
            status: PackageStatus::None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs == 0
    }

    pub fn formatted(&self) -> String {
        format_hms(self.remaining_secs)
    }
}

/// User actions offered by the panel. They only name a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    BrowsePackages,
    Renew,
    Dashboard,
    Extend,
}

impl PanelAction {
    pub fn target(&self) -> Page {
        match self {
            Self::BrowsePackages | Self::Renew | Self::Extend => Page::Packages,
            Self::Dashboard => Page::Profile,
        }
    }

    pub fn label(&self, lang: Language) -> &'static str {
        match self {
            Self::BrowsePackages => lang.text(Message::BrowsePackages),
            Self::Renew => lang.text(Message::RenewLink),
            Self::Dashboard => lang.text(Message::Dashboard),
            Self::Extend => lang.text(Message::Extend),
        }
    }

    pub fn for_status(status: PackageStatus) -> Vec<Self> {
        match status {
            PackageStatus::None => vec![Self::BrowsePackages],
            PackageStatus::Expired => vec![Self::Renew],
            PackageStatus::Active | PackageStatus::Warning => vec![Self::Dashboard, Self::Extend],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[serde(alias = "mins")]
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "m" | "min" | "mins" | "minute" | "minutes" => Some(Self::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(Self::Hours),
            "d" | "day" | "days" => Some(Self::Days),
            _ => None,
        }
    }

    pub fn millis(&self) -> i64 {
        match self {
            Self::Minutes => MS_PER_MINUTE,
            Self::Hours => MS_PER_HOUR,
            Self::Days => MS_PER_DAY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minutes => "mins",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    #[error("package name is empty")]
    EmptyName,
    #[error("duration '{0}' is not a whole number")]
    InvalidDuration(String),
    #[error("unknown duration unit '{0}' (use mins, hours or days)")]
    UnknownUnit(String),
}

/// Validated manual override: package name plus absolute expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub package: String,
    pub expiry_ms: i64,
}

impl Override {
    pub fn parse(name: &str, value: &str, unit: &str, now_ms: i64) -> Result<Self, OverrideError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OverrideError::EmptyName);
        }
        let amount: u32 = value
            .trim()
            .parse()
            .map_err(|_| OverrideError::InvalidDuration(value.to_string()))?;
        let unit =
            DurationUnit::from_str(unit.trim()).ok_or_else(|| OverrideError::UnknownUnit(unit.to_string()))?;
        let expiry_ms = now_ms
            .checked_add(i64::from(amount) * unit.millis())
            .ok_or_else(|| OverrideError::InvalidDuration(value.to_string()))?;
        Ok(Self {
            package: name.to_string(),
            expiry_ms,
        })
    }
}

type Listener = Arc<dyn Fn(&Countdown) + Send + Sync>;

/// Recurring recomputation on its own thread. Dropping the sender wakes the
/// thread immediately so cancellation never waits out a tick.
struct Ticker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    fn spawn<F>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => on_tick(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self {
            stop: Some(tx),
            handle: Some(handle),
        }
    }

    fn cancel(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Live countdown for the current user record
pub struct CountdownPanel {
    clock: Arc<dyn Clock>,
    tick: Duration,
    warning_secs: u64,
    latest: Arc<Mutex<Countdown>>,
    listener: Option<Listener>,
    ticker: Option<Ticker>,
    // (package, expiry) the current ticker was started for
    tracking: Option<(Option<String>, Option<i64>)>,
}

impl CountdownPanel {
    pub fn new(clock: Arc<dyn Clock>, tick: Duration, warning_secs: u64) -> Self {
        Self {
            clock,
            tick,
            warning_secs,
            latest: Arc::new(Mutex::new(Countdown::none())),
            listener: None,
            ticker: None,
            tracking: None,
        }
    }

    /// Called with every recomputation, including the immediate one on mount
    pub fn with_listener(mut self, listener: impl Fn(&Countdown) + Send + Sync + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Mount the panel for `user`, or react to the record being replaced.
    /// A record with the same package and expiry keeps the running ticker.
    pub fn sync(&mut self, user: Option<&User>) {
        let key = user
            .map(|u| (u.active_package.clone(), u.expiry_timestamp))
            .unwrap_or((None, None));
        if self.tracking.as_ref() == Some(&key) {
            return;
        }

        // Old ticker must be gone before anything new starts
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }

        let snapshot = Countdown::compute(user, self.clock.now_ms(), self.warning_secs);
        let status = snapshot.status;
        let has_package = status != PackageStatus::None;
        publish(&self.latest, self.listener.as_ref(), snapshot);

        if has_package {
            let latest = Arc::clone(&self.latest);
            let listener = self.listener.clone();
            let clock = Arc::clone(&self.clock);
            let warning_secs = self.warning_secs;
            let user = user.cloned();
            self.ticker = Some(Ticker::spawn(self.tick, move || {
                let snapshot = Countdown::compute(user.as_ref(), clock.now_ms(), warning_secs);
                publish(&latest, listener.as_ref(), snapshot);
            }));
        }
        self.tracking = Some(key);
        tracing::debug!(status = status.as_str(), ticking = has_package, "countdown panel synced");
    }

    pub fn unmount(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
        self.tracking = None;
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn current(&self) -> Countdown {
        match self.latest.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn actions(&self) -> Vec<PanelAction> {
        PanelAction::for_status(self.current().status)
    }
}

impl Drop for CountdownPanel {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn publish(latest: &Mutex<Countdown>, listener: Option<&Listener>, snapshot: Countdown) {
    match latest.lock() {
        Ok(mut guard) => *guard = snapshot.clone(),
        Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
    }
    if let Some(listener) = listener {
        listener(&snapshot);
    }
}
