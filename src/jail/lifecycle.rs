//! Jail lifecycle controller
//!
//! Drives jail(8) and jls(8) through a [`ProcessRunner`]:
//! - Create compiles and appends the jail's config block
//! - Start runs `jail -f <conf> -c <name> -i` and records the returned JID
//! - Stop runs `jail -f <conf> -r <name>`; the JID is kept for audit
//! - List runs `jls` and parses the table
//!
//! Create, start and stop hold a per-name lock for their whole duration.

use crate::error::{Error, Result};
use crate::jail::compiler;
use crate::jail::listing::{self, LIST_ARGS, Listing};
use crate::jail::options::Options;
use crate::jail::state::{self, Event, State};
use crate::jail::writer;
use crate::process::{ProcessRunner, RunContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Default jail(8) location
pub const DEFAULT_JAIL_BIN: &str = "/usr/sbin/jail";

/// Default jls(8) location
pub const DEFAULT_JLS_BIN: &str = "/usr/sbin/jls";

/// Runtime record of a managed jail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jail {
    /// Host-assigned JID; set by the first successful start
    pub id: Option<i32>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub state: State,
    /// Options the jail was created from
    pub config: Options,
}

impl Jail {
    fn new(config: Options) -> Self {
        Self {
            id: None,
            name: config.name.clone(),
            created_at: Utc::now(),
            state: State::Created,
            config,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.config_file_path()
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }
}

/// Per-name locks; entries are created on first use and never removed
#[derive(Default)]
struct NameLocks(Mutex<HashMap<String, Arc<Mutex<()>>>>);

impl NameLocks {
    fn get(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.0.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(name.to_string()).or_default().clone()
    }
}

fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|e| e.into_inner())
}

/// Orchestrates jail creation, start, stop and enumeration
pub struct LifecycleController<R: ProcessRunner> {
    runner: R,
    jail_bin: String,
    jls_bin: String,
    locks: NameLocks,
}

impl<R: ProcessRunner> LifecycleController<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            jail_bin: DEFAULT_JAIL_BIN.to_string(),
            jls_bin: DEFAULT_JLS_BIN.to_string(),
            locks: NameLocks::default(),
        }
    }

    /// Use a different control program
    pub fn jail_bin(mut self, bin: impl Into<String>) -> Self {
        self.jail_bin = bin.into();
        self
    }

    /// Use a different enumerate command
    pub fn jls_bin(mut self, bin: impl Into<String>) -> Self {
        self.jls_bin = bin.into();
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Compile and append the jail's config block
    pub fn create(&self, opts: Options) -> Result<Jail> {
        let lock = self.locks.get(&opts.name);
        let _guard = hold(&lock);

        let text = compiler::compile(&opts).map_err(|e| e.in_jail(&opts.name, "compile"))?;
        let path = writer::write(&opts.config_dir, &opts.name, &text)
            .map_err(|e| e.in_jail(&opts.name, "write config"))?;

        info!(jail = %opts.name, path = %path.display(), "jail created");
        Ok(Jail::new(opts))
    }

    /// Create and start the jail from its config file, returning its JID
    ///
    /// The record is only updated when both the invocation and the JID
    /// parse succeed.
    pub fn start(&self, jail: &mut Jail, ctx: &RunContext) -> Result<i32> {
        let lock = self.locks.get(&jail.name);
        let _guard = hold(&lock);

        if jail.is_running() {
            return Err(Error::JailAlreadyRunning(jail.name.clone()));
        }
        let next = transition(jail, Event::Start)?;

        let args = vec![
            "-f".to_string(),
            jail.config_path().display().to_string(),
            "-c".to_string(),
            jail.name.clone(),
            "-i".to_string(),
        ];
        debug!(jail = %jail.name, ?args, "starting jail");

        let output = self
            .runner
            .run(&self.jail_bin, &args, ctx)
            .map_err(|e| e.in_jail(&jail.name, "start"))?;
        let jid = parse_jid(&output.stdout).map_err(|e| e.in_jail(&jail.name, "start"))?;

        jail.id = Some(jid);
        jail.state = next;
        info!(jail = %jail.name, jid, "jail started");
        Ok(jid)
    }

    /// Remove the running jail; its JID stays on the record
    pub fn stop(&self, jail: &mut Jail, ctx: &RunContext) -> Result<()> {
        let lock = self.locks.get(&jail.name);
        let _guard = hold(&lock);

        let next = transition(jail, Event::Stop)?;

        let args = vec![
            "-f".to_string(),
            jail.config_path().display().to_string(),
            "-r".to_string(),
            jail.name.clone(),
        ];
        debug!(jail = %jail.name, ?args, "stopping jail");

        self.runner
            .run(&self.jail_bin, &args, ctx)
            .map_err(|e| e.in_jail(&jail.name, "stop"))?;

        jail.state = next;
        info!(jail = %jail.name, jid = ?jail.id, "jail stopped");
        Ok(())
    }

    /// Enumerate active jails
    ///
    /// Malformed rows are returned in [`Listing::errors`] next to the rows
    /// that parsed.
    pub fn list(&self, ctx: &RunContext) -> Result<Listing> {
        let args: Vec<String> = LIST_ARGS.iter().map(|a| a.to_string()).collect();
        let output = self
            .runner
            .run(&self.jls_bin, &args, ctx)
            .map_err(|e| e.in_step("list"))?;
        let listing = listing::parse(&output.stdout);
        debug!(
            jails = listing.jails.len(),
            errors = listing.errors.len(),
            "listed jails"
        );
        Ok(listing)
    }
}

fn transition(jail: &Jail, event: Event) -> Result<State> {
    state::next(jail.state, event).ok_or_else(|| Error::InvalidState {
        name: jail.name.clone(),
        state: jail.state.to_string(),
        operation: event.to_string(),
    })
}

/// Parse the JID printed by `jail -i`
///
/// JIDs are positive and printed as plain decimal digits.
fn parse_jid(stdout: &str) -> Result<i32> {
    let invalid = |reason: String| Error::InvalidJid {
        output: stdout.to_string(),
        reason,
    };

    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty output".to_string()));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a decimal number".to_string()));
    }
    let jid = trimmed
        .parse::<i32>()
        .map_err(|e| invalid(e.to_string()))?;
    if jid <= 0 {
        return Err(invalid("jail ID must be positive".to_string()));
    }
    Ok(jid)
}
