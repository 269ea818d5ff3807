//! Built-in structures

mod aliases;
mod command;
mod event;
mod function;
mod options;
mod variables;

pub use aliases::AliasesStructure;
pub use command::CommandStructure;
pub use event::EventStructure;
pub use function::FunctionStructure;
pub use options::OptionsStructure;
pub use variables::VariablesStructure;
