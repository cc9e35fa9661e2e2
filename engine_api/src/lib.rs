pub use crate::{
    auth::{Auth, JwtSecretError, Options as AuthOptions},
    engine_api::{EngineApi, Error, Options},
};

mod auth;
mod engine_api;
