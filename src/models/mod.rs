pub mod auth;
pub mod company;
pub mod ident;
pub mod user;

pub use auth::{
    ChangePasswordRequest, Credentials, DeviceInfo, LoginResponse, RefreshResponse,
    RegisterRequest,
};
pub use company::{Company, CompanyPayload};
pub use user::User;
