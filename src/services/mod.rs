pub mod auth;
pub mod compare;
pub mod fake_backend;
pub mod invoices;
pub mod menu_library;
pub mod menu_store;
pub mod poller;
pub mod preview;
pub mod sheets;
pub mod state;
pub mod upload;
