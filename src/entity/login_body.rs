use serde::Deserialize;

/// Body of `POST /auth/login`. Every field is optional.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    pub connection_id: Option<String>,
    pub organization_id: Option<String>,
    pub email: Option<String>,
}

impl LoginBody {
    /// Parses a request body, treating an empty one as `{}`.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }
}
