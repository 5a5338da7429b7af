//! Library half of the `heatcalc` operator CLI.

pub mod logging;
pub mod script;
