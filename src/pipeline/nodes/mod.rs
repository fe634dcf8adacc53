//! Built-in processors for the agents the compiler synthesizes itself.
//!
//! - `when` / `output_when`: conditional routers
//! - `use` / `input_use`: import joints that forward everything
//! - `route`: side-path splitter

pub mod passthrough;
pub mod route;
pub mod when;

pub use crate::scripting::CATCH_ALL;
pub use passthrough::Passthrough;
pub use route::Route;
pub use when::WhenRouter;

use crate::pipeline::processor::ProcessorRegistry;

/// Plugin name of imports.
pub const USE: &str = "use";
/// Plugin name of side-path imports.
pub const ROUTE: &str = "route";
/// Plugin name of conditional blocks.
pub const WHEN: &str = "when";

pub const INPUT_USE: &str = "input_use";
pub const OUTPUT_WHEN: &str = "output_when";

/// Register the built-in processors.
pub fn register_builtins(registry: &ProcessorRegistry) {
    registry.register(WHEN, || Box::new(WhenRouter::new()));
    registry.register(OUTPUT_WHEN, || Box::new(WhenRouter::new()));
    registry.register(USE, || Box::new(Passthrough::new()));
    registry.register(INPUT_USE, || Box::new(Passthrough::new()));
    registry.register(ROUTE, || Box::new(Route::new()));
}
