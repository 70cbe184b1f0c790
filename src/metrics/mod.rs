pub mod daily;
pub mod stability;

pub use daily::daily_metrics;
pub use stability::stability;
