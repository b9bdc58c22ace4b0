pub mod dates;
pub mod stats;

pub use stats::StatsHelper;
