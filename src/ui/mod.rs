pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    banner, dim, error, file_failed, file_instrumented, file_skipped, file_unchanged, info,
    section, summary_row, warn,
};
pub use progress::{FileProgress, Spinner};
pub use table::{languages_table, points_table, TableBuilder};
pub use theme::{theme, Theme};
