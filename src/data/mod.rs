//! Feature/target panel and its loading.
//!
//! - Date-indexed panel with explicit missing cells
//! - Ordered fill policy for missing values
//! - Parquet and CSV loading through polars

pub mod fill;
pub mod loader;
pub mod panel;

pub use fill::{FillPolicy, FillStep};
pub use loader::{LoaderError, PanelLoader};
pub use panel::{PanelError, TimeSeriesPanel, DEFAULT_TARGET_COLUMN};
