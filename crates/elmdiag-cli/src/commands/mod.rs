//! Command implementations for elmdiag

pub mod clear;
pub mod decode;
pub mod diff;
pub mod history;
pub mod modules;
pub mod scan;
pub mod vin;

pub use clear::clear;
pub use decode::decode;
pub use diff::diff;
pub use history::history;
pub use modules::modules;
pub use scan::scan;
pub use vin::vin;
