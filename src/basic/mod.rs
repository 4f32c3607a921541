pub mod config;
pub(crate) mod dcpf;
pub mod driver;
pub(crate) mod dsbus_dv;
pub mod error;
pub(crate) mod fdpf;
pub(crate) mod helm;
pub(crate) mod newtonpf;
pub mod post_processing;
pub mod qlim;
pub mod result;
pub mod solver;
pub(crate) mod sparse;
pub mod system;

pub use driver::{run, run_with_fallback};
