//! Configuration module for the apiman client.
//!
//! This module handles all configuration-related functionality:
//! - Runtime settings (token location, timeouts, page size)
//! - Loading `.env` files next to the deploy file
//! - Locating the default deploy file

mod settings;

pub use settings::{
    default_token_file, find_deploy_file, load_dotenv, Settings, COLLECTION_SIZE,
    DEFAULT_DEPLOY_FILES, DEFAULT_TIMEOUT_SECS, TIMEOUT_ENV, TOKEN_FILE_ENV, TOKEN_FILE_NAME,
    TYPES_ENV,
};
