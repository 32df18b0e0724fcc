pub mod auth_redirect;
pub mod interceptor;
