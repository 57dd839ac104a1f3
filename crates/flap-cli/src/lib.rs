// NOTE: flap process layout
//
// `trace` runs in one process: the main thread owns the session and blocks in
// the supervisor's completion loop, while ctrlc's handler thread triggers the
// shutdown on SIGINT/SIGTERM. Both paths meet in the supervisor's
// exactly-once shutdown gate, so a signal arriving while tracers exit on their
// own cannot start a second escalation.
//
// Decoding is a separate pass over the finished output directory. It needs
// nothing from the live session except `meta.json`, which is why `decode` can
// also be run later on a copied directory.

mod args;
mod commands;
mod handlers;
pub mod logging;
pub mod types;

pub use args::{Cli, Commands, DecodeArgs, TargetArgs};
pub use commands::run;
