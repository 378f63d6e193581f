//! The console interpreter.
//!
//! Executes command lines, keeps macros in emulated storage, and runs
//! macros as background tasks when the scheduler asks.

use crate::error::{ConsoleError, ConsoleResult};
use crate::lexer::{tokenize, Token};
use crate::macros;
use crate::tasks::TaskTable;
use host_common::config::ConsoleConfig;
use host_runtime::extensions::{Arg, FunctionTable, Invocation};
use host_runtime::host::Host;
use host_runtime::interpreter::{Deadline, Interpreter, StateListing};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deepest allowed chain of macro calls.
pub const MAX_DEPTH: usize = 16;

const KEYWORDS: &[&str] = &["function", "rm", "ls", "peep", "ps", "run", "stop", "print"];

/// Token stream for one line.
struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Semi))
    }

    fn ident(&mut self) -> ConsoleResult<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => Err(ConsoleError::syntax(format!("expected a name, found {other}"))),
            None => Err(ConsoleError::syntax("expected a name")),
        }
    }
}

/// Reference interpreter driven by the foreground and background threads.
pub struct Console {
    host: Arc<Host>,
    functions: FunctionTable,
    tasks: TaskTable,
    idle_interval: Duration,
    depth: usize,
}

impl Console {
    /// Interpreter over `host` calling into `functions`.
    #[must_use]
    pub fn new(host: Arc<Host>, functions: FunctionTable, config: &ConsoleConfig) -> Self {
        Self {
            host,
            functions,
            tasks: TaskTable::new(config.max_tasks),
            idle_interval: config.idle_interval,
            depth: 0,
        }
    }

    #[must_use]
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    #[must_use]
    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    /// Execute `line`, returning the value of its last expression.
    ///
    /// # Errors
    ///
    /// The first error aborts the rest of the line.
    pub fn execute(&mut self, line: &str) -> ConsoleResult<Arg> {
        let mut cursor = Cursor {
            tokens: tokenize(line)?,
            pos: 0,
        };
        let mut last = Arg::Num(0);
        loop {
            while cursor.eat(&Token::Semi) {}
            if cursor.peek().is_none() {
                break;
            }
            if let Some(value) = self.statement(&mut cursor)? {
                last = value;
            }
            match cursor.next() {
                None | Some(Token::Semi) => {}
                Some(other) => {
                    return Err(ConsoleError::syntax(format!("unexpected {other}")));
                }
            }
        }
        Ok(last)
    }

    fn report(&self, error: &ConsoleError) {
        debug!(error = %error, "Command failed");
        self.host.output.emit_str(&format!("error: {error}"));
        self.host.output.emit_eol();
    }

    fn println(&self, text: &str) {
        self.host.output.emit_str(text);
        self.host.output.emit_eol();
    }

    fn statement(&mut self, cursor: &mut Cursor) -> ConsoleResult<Option<Arg>> {
        let keyword = match cursor.peek() {
            Some(Token::Ident(word)) if KEYWORDS.contains(&word.as_str()) => word.clone(),
            _ => return self.expression(cursor).map(Some),
        };
        cursor.next();

        match keyword.as_str() {
            "function" => {
                let name = cursor.ident()?;
                let body = match cursor.next() {
                    Some(Token::Body(body)) => body,
                    _ => return Err(ConsoleError::syntax("expected {body}")),
                };
                self.define(&name, &body)?;
            }
            "rm" => {
                if cursor.eat(&Token::Star) {
                    self.host.storage.erase();
                    info!("All macros removed");
                } else {
                    let name = cursor.ident()?;
                    if !macros::remove(&self.host.storage, &name) {
                        return Err(ConsoleError::UnknownName(name));
                    }
                }
            }
            "ls" => self.list_state(),
            "peep" => self.peep(),
            "ps" => self.ps(),
            "run" => {
                let name = cursor.ident()?;
                let interval = if cursor.eat(&Token::Comma) {
                    self.expression(cursor)?.as_num()
                } else {
                    0
                };
                if macros::find(&self.host.storage, &name).is_none() {
                    return Err(ConsoleError::UnknownName(name));
                }
                let interval_ms = u64::try_from(interval).unwrap_or(0);
                let now = self.host.clock.elapsed_millis();
                let id = self.tasks.start(&name, interval_ms, now)?;
                info!(id, name = %name, interval_ms, "Task started");
            }
            "stop" => {
                if cursor.at_statement_end() {
                    self.tasks.stop_all();
                } else {
                    let id = self.expression(cursor)?.as_num();
                    if let Some(task) = usize::try_from(id).ok().and_then(|id| self.tasks.stop(id)) {
                        info!(id = task.id, name = %task.macro_name, "Task stopped");
                    }
                }
            }
            "print" => {
                let mut parts = Vec::new();
                if !cursor.at_statement_end() {
                    loop {
                        parts.push(self.expression(cursor)?.as_text().into_owned());
                        if !cursor.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.println(&parts.join(" "));
            }
            other => return Err(ConsoleError::UnknownName(other.to_string())),
        }
        Ok(None)
    }

    fn expression(&mut self, cursor: &mut Cursor) -> ConsoleResult<Arg> {
        match cursor.next() {
            Some(Token::Bang) => {
                let value = self.expression(cursor)?.as_num();
                Ok(Arg::Num(i32::from(value == 0)))
            }
            Some(Token::Minus) => Ok(Arg::Num(self.expression(cursor)?.as_num().wrapping_neg())),
            Some(Token::Num(n)) => Ok(Arg::Num(n)),
            Some(Token::Str(s)) => Ok(Arg::Str(s)),
            Some(Token::Ident(name)) => {
                let mut args = Vec::new();
                if cursor.eat(&Token::LParen) && !cursor.eat(&Token::RParen) {
                    loop {
                        args.push(self.expression(cursor)?);
                        if cursor.eat(&Token::Comma) {
                            continue;
                        }
                        if cursor.eat(&Token::RParen) {
                            break;
                        }
                        return Err(ConsoleError::syntax("expected ')'"));
                    }
                }
                self.call(&name, &args)
            }
            Some(other) => Err(ConsoleError::syntax(format!("unexpected {other}"))),
            None => Err(ConsoleError::syntax("expression expected")),
        }
    }

    fn call(&mut self, name: &str, args: &[Arg]) -> ConsoleResult<Arg> {
        if let Some(function) = self.functions.lookup(name) {
            let value = function(&Invocation {
                host: &self.host,
                args,
                listing: &*self,
            })?;
            return Ok(Arg::Num(value));
        }

        let Some(body) = macros::find(&self.host.storage, name) else {
            return Err(ConsoleError::UnknownName(name.to_string()));
        };
        if !args.is_empty() {
            return Err(ConsoleError::syntax(format!("macro '{name}' takes no arguments")));
        }
        if self.depth >= MAX_DEPTH {
            return Err(ConsoleError::RecursionLimit(MAX_DEPTH));
        }
        self.depth += 1;
        let result = self.execute(&body);
        self.depth -= 1;
        result
    }

    fn define(&mut self, name: &str, body: &str) -> ConsoleResult<()> {
        if KEYWORDS.contains(&name) {
            return Err(ConsoleError::syntax(format!("'{name}' is reserved")));
        }
        if body.contains('\0') {
            return Err(ConsoleError::syntax("body contains a NUL byte"));
        }
        macros::define(&self.host.storage, name, body)?;
        debug!(name, "Macro defined");
        Ok(())
    }

    fn peep(&self) {
        let usage = macros::usage(&self.host.storage);
        let count = macros::list(&self.host.storage).len();
        self.println(&format!(
            "storage: {} bytes used, {} free, {count} macros",
            usage.used, usage.free
        ));
    }

    fn ps(&self) {
        for task in self.tasks.iter() {
            self.println(&format!(
                "{}: {} every {}ms",
                task.id, task.macro_name, task.interval_ms
            ));
        }
    }
}

impl StateListing for Console {
    fn list_state(&self) {
        for entry in macros::list(&self.host.storage) {
            self.println(&format!("function {} {{{}}};", entry.name, entry.body));
        }
    }
}

impl Interpreter for Console {
    fn run_background_tasks(&mut self) -> Deadline {
        let now = self.host.clock.elapsed_millis();
        for id in self.tasks.due(now) {
            let Some(name) = self.tasks.get(id).map(|t| t.macro_name.clone()) else {
                continue;
            };
            let Some(body) = macros::find(&self.host.storage, &name) else {
                info!(id, name = %name, "Macro removed, stopping task");
                self.tasks.stop(id);
                continue;
            };
            match self.execute(&body) {
                Ok(_) => self.tasks.rearm(id, now),
                Err(e) => {
                    self.report(&e);
                    warn!(id, name = %name, error = %e, "Task failed, stopping it");
                    self.tasks.stop(id);
                }
            }
        }

        // Never sleep past the idle interval; tasks started from the
        // foreground are picked up within it.
        let idle = Deadline::from_duration(self.idle_interval);
        let now = self.host.clock.elapsed_millis();
        match self.tasks.next_deadline(now) {
            Some(ms) => Deadline::from_millis(ms.min(idle.as_millis())),
            None => idle,
        }
    }

    fn do_command(&mut self, line: &str) {
        self.depth = 0;
        if let Err(e) = self.execute(line) {
            self.report(&e);
        }
    }
}
