mod core;
pub use self::core::{InMemoryDataset, RgbdDataset};

mod views;
pub use views::ViewDataset;
