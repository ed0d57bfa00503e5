use serde::{Deserialize, Serialize};

/// Profile of an authenticated user as reported by the identity provider.
///
/// `id` is the provider's composite identifier, `<prefix>;<localId>`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub username: Option<String>,
    pub picture: Option<String>,
    pub locale: Option<String>,
}

impl User {
    /// Local part of the composite identifier, used as the session key.
    ///
    /// Returns `None` when that part is empty.
    pub fn session_id(&self) -> Option<&str> {
        self.id.rsplit(';').next().filter(|uid| !uid.is_empty())
    }
}
