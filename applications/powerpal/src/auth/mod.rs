pub mod gateway;
pub mod jwt;
pub mod password;

pub use gateway::{AuthEvent, AuthGateway, AuthStateListener, Session, StoreAuthGateway, UserIdentity};
