//! jail.conf(5) compiler
//!
//! Renders an [`Options`] model into a single named configuration block.
//! Pure: no I/O, and the same options always produce the same text.

use crate::error::{Error, Result};
use crate::jail::options::Options;
use std::fmt::Write;

/// Joins an address list into the value of an `ip4.addr` directive
pub type Joiner = fn(&[String]) -> String;

/// Default joiner: `a, b, c`
pub fn join_addrs(addrs: &[String]) -> String {
    addrs.join(", ")
}

const BANNER: &str = "# File created by jamctl\n# DO NOT EDIT\n";

/// Compile options into configuration text using the default joiner
pub fn compile(opts: &Options) -> Result<String> {
    compile_with(opts, join_addrs)
}

/// Compile options into configuration text
///
/// Fails only when `name` or `path` is empty. Sections that are absent emit
/// nothing; `ipv6` and `allow` are never rendered.
pub fn compile_with(opts: &Options, join: Joiner) -> Result<String> {
    if opts.name.is_empty() {
        return Err(Error::ConfigValidation("jail name is required".into()));
    }
    if opts.path.as_os_str().is_empty() {
        return Err(Error::ConfigValidation(format!(
            "jail '{}' has no path",
            opts.name
        )));
    }

    let mut out = String::new();
    writeln!(out, "{}", BANNER)?;
    writeln!(out, "{} {{", opts.name)?;

    if let Some(mount) = &opts.mount {
        if mount.devfs {
            directive(&mut out, "mount.devfs")?;
        }
        if mount.nodevfs {
            directive(&mut out, "mount.nodevfs")?;
        }
    }

    if opts.vnet.as_ref().is_some_and(|v| v.enable) {
        directive(&mut out, "vnet")?;
    }

    if !opts.interface.is_empty() {
        assign(&mut out, "interface", &opts.interface)?;
    }

    if let Some(host) = &opts.host {
        assign(&mut out, "host.hostname", &host.hostname)?;
    }

    if let Some(ip4) = opts.ipv4.as_ref().filter(|ip| !ip.addr.is_empty()) {
        assign(&mut out, "ip4.addr", &join(&ip4.addr))?;
    }

    assign_quoted(&mut out, "path", &opts.path.display().to_string())?;

    if let Some(exec) = &opts.exec {
        let hooks = [
            ("exec.start", &exec.start),
            ("exec.prestart", &exec.prestart),
            ("exec.poststart", &exec.poststart),
            ("exec.stop", &exec.stop),
            ("exec.prestop", &exec.prestop),
            ("exec.poststop", &exec.poststop),
        ];
        for (key, command) in hooks {
            if !command.is_empty() {
                assign_quoted(&mut out, key, command)?;
            }
        }
        if exec.clean {
            directive(&mut out, "exec.clean")?;
        }
    }

    if opts.persist {
        directive(&mut out, "persist")?;
    }

    writeln!(out, "}}")?;
    Ok(out)
}

fn directive(out: &mut String, key: &str) -> std::fmt::Result {
    writeln!(out, "    {};", key)
}

fn assign(out: &mut String, key: &str, value: &str) -> std::fmt::Result {
    writeln!(out, "    {} = {};", key, value)
}

fn assign_quoted(out: &mut String, key: &str, value: &str) -> std::fmt::Result {
    writeln!(out, "    {} = \"{}\";", key, escape(value))
}

/// Backslash-escape characters that would end or corrupt a quoted value
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}
