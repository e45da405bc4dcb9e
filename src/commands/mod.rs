pub mod auth;
pub mod invoices;
pub mod menu;
pub mod settings;
