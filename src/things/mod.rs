pub mod client;
pub mod models;
mod token;

pub use client::{HttpThingsClient, ThingsCache, ThingsClient, ThingsError};
pub use models::{JsonApiResponse, Location, Thing};
