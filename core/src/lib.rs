pub mod app;
pub mod binding;
pub mod bus;
pub mod context;
pub mod deck;
pub mod errors;
pub mod explorer;
pub mod notification;
pub mod preferences;
pub mod repository;
pub mod s3;
pub mod settings;
pub mod viewmodel;
