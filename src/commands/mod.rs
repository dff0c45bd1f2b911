pub mod history;
pub mod separate;
pub mod stats;

pub use history::HistoryCommand;
pub use separate::SeparateCommand;
pub use stats::StatsCommand;
