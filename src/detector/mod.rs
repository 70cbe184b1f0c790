pub mod dump;

pub use dump::scan_item;
