//! Functions the host registers with the interpreter.
//!
//! Scripts call these by name. They follow the interpreter's numeric
//! calling convention: every call returns a [`Numvar`], and failures the
//! script is expected to test (a file that will not open, a command that
//! cannot start) come back as 0 or -1 rather than as errors.
//!
//! | name | behavior |
//! |---|---|
//! | `system(cmd)` | run `cmd` in the OS shell, return its exit status |
//! | `exit([code])` | terminate the process (default code 0) |
//! | `save([file])` | write the interpreter state listing to `file` |

use crate::host::Host;
use crate::interpreter::StateListing;
use host_common::error::HostResult;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// The interpreter's numeric value type.
pub type Numvar = i32;

/// One argument passed by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Numeric argument.
    Num(Numvar),
    /// String literal argument.
    Str(String),
}

impl Arg {
    /// Numeric value; strings convert as decimal text or 0.
    #[must_use]
    pub fn as_num(&self) -> Numvar {
        match self {
            Arg::Num(n) => *n,
            Arg::Str(s) => s.trim().parse().unwrap_or(0),
        }
    }

    /// Text value; numbers render as decimal.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Arg::Num(n) => Cow::Owned(n.to_string()),
            Arg::Str(s) => Cow::Borrowed(s),
        }
    }
}

/// Everything an extension function can see during a call.
pub struct Invocation<'a> {
    /// Board services.
    pub host: &'a Host,
    /// Arguments in call order.
    pub args: &'a [Arg],
    /// The calling interpreter's state listing.
    pub listing: &'a dyn StateListing,
}

impl Invocation<'_> {
    /// Number of arguments passed.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Numeric value of argument `n`, counting from 1.
    #[must_use]
    pub fn num(&self, n: usize) -> Option<Numvar> {
        self.arg(n).map(Arg::as_num)
    }

    /// Text of argument `n`, counting from 1.
    #[must_use]
    pub fn text(&self, n: usize) -> Option<Cow<'_, str>> {
        self.arg(n).map(Arg::as_text)
    }

    fn arg(&self, n: usize) -> Option<&Arg> {
        n.checked_sub(1).and_then(|i| self.args.get(i))
    }

    fn num_or_zero(&self, n: usize) -> Numvar {
        self.num(n).unwrap_or(0)
    }
}

/// Signature of a registered function.
pub type ExtensionFn = fn(&Invocation<'_>) -> HostResult<Numvar>;

/// Name → function registry consulted by the interpreter.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, ExtensionFn>,
}

impl FunctionTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the system extensions and the hardware builtins.
    #[must_use]
    pub fn standard() -> Self {
        Self::new().with_system_extensions().with_hardware_builtins()
    }

    /// Register `f` under `name`, returning any function it replaces.
    pub fn register(&mut self, name: &str, f: ExtensionFn) -> Option<ExtensionFn> {
        debug!(name, "Registering function");
        self.functions.insert(name.to_string(), f)
    }

    /// Function registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ExtensionFn> {
        self.functions.get(name).copied()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Add `system`, `exit`, and `save`.
    #[must_use]
    pub fn with_system_extensions(mut self) -> Self {
        self.register("system", func_system);
        self.register("exit", func_exit);
        self.register("save", func_save);
        self
    }

    /// Add the emulated board functions.
    #[must_use]
    pub fn with_hardware_builtins(mut self) -> Self {
        self.register("pinMode", func_pin_mode);
        self.register("digitalRead", func_digital_read);
        self.register("digitalWrite", func_digital_write);
        self.register("analogRead", func_analog_read);
        self.register("analogWrite", func_analog_write);
        self.register("pulseIn", func_pulse_in);
        self.register("millis", func_millis);
        self.register("delay", func_delay);
        self.register("delayMicroseconds", func_delay_micros);
        self.register("eeread", func_eeread);
        self.register("eewrite", func_eewrite);
        self.register("setBaud", func_set_baud);
        self
    }
}

// ---------------------------------------------------------------------------
// System extensions
// ---------------------------------------------------------------------------

fn func_system(inv: &Invocation<'_>) -> HostResult<Numvar> {
    let Some(cmd) = inv.text(1) else {
        warn!("system() called without a command");
        return Ok(-1);
    };
    Ok(run_shell(&cmd))
}

/// Run `cmd` through the OS shell and return its exit code, or -1 if it
/// could not be started or was killed by a signal.
#[must_use]
pub fn run_shell(cmd: &str) -> Numvar {
    #[cfg(unix)]
    let status = Command::new("sh").arg("-c").arg(cmd).status();
    #[cfg(not(unix))]
    let status = Command::new("cmd").arg("/C").arg(cmd).status();

    match status {
        Ok(status) => {
            debug!(cmd, ?status, "Shell command finished");
            status.code().unwrap_or(-1)
        }
        Err(e) => {
            warn!(cmd, error = %e, "Shell command could not start");
            -1
        }
    }
}

fn func_exit(inv: &Invocation<'_>) -> HostResult<Numvar> {
    let code = inv.num(1).unwrap_or(0);
    inv.host.terminate(code);
    Ok(0)
}

fn func_save(inv: &Invocation<'_>) -> HostResult<Numvar> {
    let path = match inv.text(1) {
        Some(name) => Cow::Owned(PathBuf::from(name.into_owned())),
        None => Cow::Borrowed(inv.host.default_save_file.as_path()),
    };
    Ok(save_state(inv.host, inv.listing, &path))
}

/// Write the state listing to `path`: 1 on success, 0 if the file cannot
/// be opened or fully written. Console output is restored either way.
pub fn save_state(host: &Host, listing: &dyn StateListing, path: &Path) -> Numvar {
    let file = match File::create(path) {
        Ok(file) => file,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "save: cannot open file");
            return 0;
        }
    };

    let redirect = host.output.redirect(Box::new(BufWriter::new(file)));
    listing.list_state();
    match redirect.finish() {
        Ok(()) => {
            info!(path = %path.display(), "State saved");
            1
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "save: writing file failed");
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware builtins
// ---------------------------------------------------------------------------

fn pin_arg(inv: &Invocation<'_>) -> u32 {
    u32::try_from(inv.num_or_zero(1)).unwrap_or(u32::MAX)
}

fn address_arg(inv: &Invocation<'_>) -> usize {
    usize::try_from(inv.num_or_zero(1)).unwrap_or(usize::MAX)
}

fn millis_arg(inv: &Invocation<'_>) -> u64 {
    u64::try_from(inv.num_or_zero(1)).unwrap_or(0)
}

fn func_pin_mode(inv: &Invocation<'_>) -> HostResult<Numvar> {
    let mode = u8::try_from(inv.num_or_zero(2)).unwrap_or(0);
    inv.host.pins.pin_mode(pin_arg(inv), mode)?;
    Ok(0)
}

fn func_digital_read(inv: &Invocation<'_>) -> HostResult<Numvar> {
    Ok(Numvar::from(inv.host.pins.digital_read(pin_arg(inv))?))
}

fn func_digital_write(inv: &Invocation<'_>) -> HostResult<Numvar> {
    inv.host
        .pins
        .digital_write(pin_arg(inv), inv.num_or_zero(2) != 0)?;
    Ok(0)
}

fn func_analog_read(inv: &Invocation<'_>) -> HostResult<Numvar> {
    Ok(inv.host.pins.analog_read(pin_arg(inv)))
}

fn func_analog_write(inv: &Invocation<'_>) -> HostResult<Numvar> {
    inv.host.pins.analog_write(pin_arg(inv), inv.num_or_zero(2));
    Ok(0)
}

fn func_pulse_in(inv: &Invocation<'_>) -> HostResult<Numvar> {
    Ok(inv
        .host
        .pins
        .pulse_in(pin_arg(inv), inv.num_or_zero(2), inv.num_or_zero(3)))
}

fn func_millis(inv: &Invocation<'_>) -> HostResult<Numvar> {
    // Wraps like the 32-bit counter scripts expect.
    Ok(inv.host.clock.elapsed_millis() as u32 as Numvar)
}

fn func_delay(inv: &Invocation<'_>) -> HostResult<Numvar> {
    inv.host.clock.delay(millis_arg(inv));
    Ok(0)
}

fn func_delay_micros(inv: &Invocation<'_>) -> HostResult<Numvar> {
    inv.host.clock.delay_micros(millis_arg(inv));
    Ok(0)
}

fn func_eeread(inv: &Invocation<'_>) -> HostResult<Numvar> {
    Ok(Numvar::from(inv.host.storage.read(address_arg(inv))?))
}

fn func_eewrite(inv: &Invocation<'_>) -> HostResult<Numvar> {
    let value = inv.num_or_zero(2) as u8;
    inv.host.storage.write(address_arg(inv), value)?;
    Ok(0)
}

fn func_set_baud(inv: &Invocation<'_>) -> HostResult<Numvar> {
    let baud = u32::try_from(inv.num_or_zero(2)).unwrap_or(0);
    Ok(inv.host.serial.set_baud(inv.num_or_zero(1), baud))
}
