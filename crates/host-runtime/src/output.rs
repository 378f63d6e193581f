//! Character output routing.
//!
//! Everything the interpreter prints goes through [`OutputRouter`]. By
//! default bytes go to the console sink, flushed after every byte. While
//! an [`OutputRedirect`] guard is alive they go to its writer instead;
//! dropping the guard restores the console, on every exit path.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

type Sink = Box<dyn Write + Send>;

#[derive(Default)]
struct Routes {
    console: Option<Sink>,
    redirect: Option<Sink>,
    /// First write failure on the current redirect.
    write_error: Option<io::Error>,
}

/// Routes emitted bytes to the console or an installed override.
pub struct OutputRouter {
    routes: Mutex<Routes>,
}

impl std::fmt::Debug for OutputRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRouter")
            .field("redirected", &self.is_redirected())
            .finish_non_exhaustive()
    }
}

impl Default for OutputRouter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl OutputRouter {
    /// Router whose console is the process stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::with_console(Box::new(io::stdout()))
    }

    /// Router with an explicit console sink.
    #[must_use]
    pub fn with_console(console: Box<dyn Write + Send>) -> Self {
        Self {
            routes: Mutex::new(Routes {
                console: Some(console),
                ..Routes::default()
            }),
        }
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Emit one byte.
    pub fn emit_byte(&self, byte: u8) {
        self.emit(&[byte]);
    }

    /// Emit a string.
    pub fn emit_str(&self, text: &str) {
        self.emit(text.as_bytes());
    }

    /// Emit the console line terminator (CR LF).
    pub fn emit_eol(&self) {
        self.emit(b"\r\n");
    }

    fn emit(&self, bytes: &[u8]) {
        let mut routes = self.routes();
        if let Some(redirect) = routes.redirect.as_mut() {
            if let Err(e) = redirect.write_all(bytes) {
                warn!(error = %e, "Redirected output write failed");
                if routes.write_error.is_none() {
                    routes.write_error = Some(e);
                }
            }
            return;
        }
        if let Some(console) = routes.console.as_mut() {
            // Console output is flushed per byte so partial lines show up.
            for byte in bytes {
                let result = console
                    .write_all(std::slice::from_ref(byte))
                    .and_then(|()| console.flush());
                if result.is_err() {
                    return;
                }
            }
        }
    }

    /// Whether an override is currently installed.
    #[must_use]
    pub fn is_redirected(&self) -> bool {
        self.routes().redirect.is_some()
    }

    /// Install `writer` as the output target until the returned guard drops.
    ///
    /// A redirect already in place is stacked and restored afterwards.
    #[must_use = "output is restored as soon as the guard is dropped"]
    pub fn redirect(&self, writer: Box<dyn Write + Send>) -> OutputRedirect<'_> {
        let mut routes = self.routes();
        let previous = Saved {
            redirect: routes.redirect.replace(writer),
            write_error: routes.write_error.take(),
        };
        debug!(nested = previous.redirect.is_some(), "Output redirected");
        OutputRedirect {
            router: self,
            previous: Some(previous),
        }
    }
}

/// Route state stacked under a redirect.
struct Saved {
    redirect: Option<Sink>,
    write_error: Option<io::Error>,
}

/// Scoped output override; see [`OutputRouter::redirect`].
pub struct OutputRedirect<'a> {
    router: &'a OutputRouter,
    previous: Option<Saved>,
}

impl OutputRedirect<'_> {
    /// Restore the previous route, flushing the override writer.
    ///
    /// # Errors
    ///
    /// Returns the first write error seen while redirected, otherwise the
    /// flush error of the override writer.
    pub fn finish(mut self) -> io::Result<()> {
        self.restore()
    }

    fn restore(&mut self) -> io::Result<()> {
        let Some(previous) = self.previous.take() else {
            return Ok(());
        };
        let (replaced, write_error) = {
            let mut routes = self.router.routes();
            (
                std::mem::replace(&mut routes.redirect, previous.redirect),
                std::mem::replace(&mut routes.write_error, previous.write_error),
            )
        };
        debug!("Output restored");
        let flushed = match replaced {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        };
        match write_error {
            Some(e) => Err(e),
            None => flushed,
        }
    }
}

impl Drop for OutputRedirect<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(error = %e, "Flushing redirected output failed");
        }
    }
}
