pub mod access_log;
pub mod http_client;
pub mod identity_provider;
