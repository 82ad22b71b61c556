pub mod ai;
pub mod cli;
pub mod config;
pub mod context;
pub mod executor;
pub mod module;
pub mod serialize;
pub mod types;

// Re-export main types
pub use config::Config;
pub use executor::{run_until_pause, step, EngineError, Vm};
pub use module::{CodeParser, JsonParser, LoadedProgram, ModuleLoader};
pub use serialize::{deserialize_state, serialize_state};
pub use types::{AiInteraction, RunStatus};
