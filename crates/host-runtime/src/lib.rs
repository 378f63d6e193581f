#![doc = "Execution services for the script host."]

pub mod extensions;
pub mod foreground;
pub mod host;
pub mod interpreter;
pub mod lock;
pub mod output;
pub mod scheduler;
pub mod sleep;
pub mod storage;
pub mod stubs;

pub use extensions::*;
pub use foreground::*;
pub use host::*;
pub use interpreter::*;
pub use lock::*;
pub use output::*;
pub use scheduler::*;
pub use sleep::*;
pub use storage::*;
pub use stubs::*;
