//! Menu administration: which meals exist and which are offered on which
//! dates, maintained through `menu.toml` files.

pub mod parser;
pub mod service;
pub mod toml_format;

pub use parser::{Menu, MenuDate, MenuParseError, parse_menu_toml};
pub use service::{ImportSummary, import_menu, list_menu, remove_date, render_menu_toml};
pub use toml_format::{DateToml, MealToml, MenuToml};
