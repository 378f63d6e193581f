//! Reference command interpreter for the script host.
//!
//! A small line-oriented language, enough to drive the host end to end:
//!
//! - **Macros** ([`macros`]): `function NAME {BODY}`, `rm`, `ls`, `peep`,
//!   stored in emulated non-volatile memory
//! - **Tasks** ([`tasks`]): `run NAME[,MS]`, `stop`, `ps`
//! - **Expressions**: integers, strings, `!`, `-`, calls into the host
//!   function table and into macros
//!
//! # Example
//!
//! ```
//! use host_common::config::HostConfig;
//! use host_console::Console;
//! use host_runtime::{FunctionTable, HostBuilder, Interpreter};
//! use std::sync::Arc;
//!
//! let config = HostConfig::default();
//! let host = HostBuilder::new(&config).console(Box::new(std::io::sink())).build();
//! let mut console = Console::new(Arc::new(host), FunctionTable::standard(), &config.console);
//!
//! console.do_command("function blink {digitalWrite(13, !digitalRead(13))}");
//! console.do_command("blink");
//! assert!(console.host().pins.digital_read(13).unwrap());
//! ```

pub mod console;
pub mod error;
pub mod lexer;
pub mod macros;
pub mod tasks;

pub use console::{Console, MAX_DEPTH};
pub use error::{ConsoleError, ConsoleResult};
