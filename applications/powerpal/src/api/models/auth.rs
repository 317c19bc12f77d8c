use serde::{Deserialize, Serialize};

/// Body of the signup and login endpoints, JSON or form encoded.
/// Missing fields read as empty so the handler can report them.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub uid: String,
    pub email: String,
    pub expires_in: u64,
    pub message: String,
}
