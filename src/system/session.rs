//! User-session control behind an async trait

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("not supported on {0}")]
    Unsupported(&'static str),

    #[error("{program} exited with {code:?}")]
    CommandFailed { program: String, code: Option<i32> },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("simulated failure")]
    Simulated,
}

/// Operations on the interactive user session
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn lock_session(&self) -> Result<(), SessionError>;

    async fn logout_session(&self) -> Result<(), SessionError>;

    fn name(&self) -> &'static str;
}

/// An OS program plus its arguments
type Invocation = (&'static str, Vec<String>);

/// Calls the platform's own session tools
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSessionControl;

impl OsSessionControl {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, (program, args): Invocation) -> Result<(), SessionError> {
        debug!("Running {} {:?}", program, args);
        let status = Command::new(program)
            .args(&args)
            .status()
            .await
            .map_err(|source| SessionError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SessionError::CommandFailed {
                program: program.to_string(),
                code: status.code(),
            })
        }
    }
}

#[cfg(target_os = "linux")]
fn lock_invocation() -> Option<Invocation> {
    let mut args = vec!["lock-session".to_string()];
    if let Ok(id) = std::env::var("XDG_SESSION_ID") {
        args.push(id);
    }
    Some(("loginctl", args))
}

#[cfg(target_os = "linux")]
fn logout_invocation() -> Option<Invocation> {
    if let Ok(id) = std::env::var("XDG_SESSION_ID") {
        return Some(("loginctl", vec!["terminate-session".into(), id]));
    }
    let user = std::env::var("USER").ok()?;
    Some(("loginctl", vec!["terminate-user".into(), user]))
}

#[cfg(target_os = "macos")]
fn lock_invocation() -> Option<Invocation> {
    Some(("pmset", vec!["displaysleepnow".into()]))
}

#[cfg(target_os = "macos")]
fn logout_invocation() -> Option<Invocation> {
    Some((
        "osascript",
        vec![
            "-e".into(),
            "tell application \"System Events\" to log out".into(),
        ],
    ))
}

#[cfg(target_os = "windows")]
fn lock_invocation() -> Option<Invocation> {
    Some(("rundll32.exe", vec!["user32.dll,LockWorkStation".into()]))
}

#[cfg(target_os = "windows")]
fn logout_invocation() -> Option<Invocation> {
    Some(("shutdown", vec!["/l".into()]))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn lock_invocation() -> Option<Invocation> {
    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn logout_invocation() -> Option<Invocation> {
    None
}

#[async_trait]
impl SessionControl for OsSessionControl {
    async fn lock_session(&self) -> Result<(), SessionError> {
        let invocation =
            lock_invocation().ok_or(SessionError::Unsupported(std::env::consts::OS))?;
        self.run(invocation).await?;
        info!("Session locked");
        Ok(())
    }

    async fn logout_session(&self) -> Result<(), SessionError> {
        let invocation =
            logout_invocation().ok_or(SessionError::Unsupported(std::env::consts::OS))?;
        self.run(invocation).await?;
        info!("Session terminated");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "os"
    }
}

/// Records session actions without touching the OS
#[derive(Debug, Default)]
pub struct DryRunSession {
    locks: AtomicUsize,
    logouts: AtomicUsize,
    fail: AtomicBool,
}

impl DryRunSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent action fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn locks(&self) -> usize {
        self.locks.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), SessionError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(SessionError::Simulated)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionControl for DryRunSession {
    async fn lock_session(&self) -> Result<(), SessionError> {
        self.check()?;
        self.locks.fetch_add(1, Ordering::SeqCst);
        info!("[dry-run] Session locked");
        Ok(())
    }

    async fn logout_session(&self) -> Result<(), SessionError> {
        self.check()?;
        self.logouts.fetch_add(1, Ordering::SeqCst);
        info!("[dry-run] Session terminated");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
