//! Authentication for the geolocation service.
//!
//! Provides the bearer token type and its storage (environment, keyring, file).

mod token;

pub use token::{
    delete_token, get_token_storage_info, load_token, parse_dotenv_token, save_token, ApiToken,
    TokenSource, TOKEN_ENV_VAR,
};
