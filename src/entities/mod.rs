pub mod bom_item;
pub mod margin_settings;
pub mod product;
pub mod profile;
pub mod quote;
