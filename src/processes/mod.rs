pub mod standalone;

pub use standalone::rescore::{RescoreArgs, rescore_process};
