//! Local audit trail of session changes and scan outcomes. The session record
//! itself only keeps the latest state; the journal keeps how it got there.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSON-lines log, one object per event
pub struct Journal {
    pub path: PathBuf,
    session_id: String,
    file: File,
}

#[derive(Serialize)]
struct Record<'a, T: Serialize> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    event: &'a T,
}

#[derive(Serialize)]
struct LoginEvent<'a> {
    name: &'a str,
    package: Option<&'a str>,
    expiry_ms: Option<i64>,
}

#[derive(Serialize)]
struct LogoutEvent {}

#[derive(Serialize)]
struct OverrideEvent<'a> {
    package: &'a str,
    expiry_ms: Option<i64>,
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct PurchaseEvent<'a> {
    package_id: &'a str,
    expiry_ms: Option<i64>,
}

#[derive(Serialize)]
struct ScanEvent<'a> {
    status: &'a str,
    payload: Option<&'a str>,
}

impl Journal {
    pub fn new(path: &Path, session_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            session_id: session_id.to_string(),
            file,
        })
    }

    fn append<T: Serialize>(&mut self, kind: &'static str, event: &T) -> Result<()> {
        let record = Record {
            ts: Utc::now(),
            session_id: &self.session_id,
            kind,
            event,
        };
        let line = serde_json::to_string(&record)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn login(&mut self, name: &str, package: Option<&str>, expiry_ms: Option<i64>) -> Result<()> {
        self.append(
            "login",
            &LoginEvent {
                name,
                package,
                expiry_ms,
            },
        )
    }

    pub fn logout(&mut self) -> Result<()> {
        self.append("logout", &LogoutEvent {})
    }

    /// Accepted overrides carry the new expiry, rejected ones the reason
    pub fn manual_override(
        &mut self,
        package: &str,
        expiry_ms: Option<i64>,
        error: Option<&str>,
    ) -> Result<()> {
        self.append(
            "manual_override",
            &OverrideEvent {
                package,
                expiry_ms,
                error,
            },
        )
    }

    pub fn purchase(&mut self, package_id: &str, expiry_ms: Option<i64>) -> Result<()> {
        self.append(
            "purchase",
            &PurchaseEvent {
                package_id,
                expiry_ms,
            },
        )
    }

    pub fn scan(&mut self, status: &str, payload: Option<&str>) -> Result<()> {
        self.append("scan", &ScanEvent { status, payload })
    }
}
