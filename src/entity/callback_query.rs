/// Query string of `GET /auth/callback`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error_description: Option<String>,
    pub idp_initiated_login: Option<String>,
}

impl CallbackQuery {
    /// Picks the known parameters out of decoded query pairs. A repeated
    /// parameter keeps its first value; unknown ones are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "code" => &mut query.code,
                "error_description" => &mut query.error_description,
                "idp_initiated_login" => &mut query.idp_initiated_login,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}
