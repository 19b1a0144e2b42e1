pub mod api;
pub mod models;

pub use models::{NewPlant, NewUser, Plant, User};
