//! `Set-Cookie` values for the session cookie.

use cookie::{Cookie, SameSite};

/// Name of the cookie carrying the session user id.
pub const SESSION_COOKIE: &str = "uid";

fn session_cookie(value: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie binding the browser to `uid`.
pub fn issue(uid: &str) -> String {
    session_cookie(uid).to_string()
}

/// Cookie that makes the browser drop the session: empty value, already expired.
pub fn clear() -> String {
    let mut cookie = session_cookie("");
    cookie.make_removal();
    cookie.to_string()
}

/// Session user id carried by a request cookie, ignoring empty values.
pub fn session_id(value: Option<String>) -> Option<String> {
    value.filter(|uid| !uid.is_empty())
}
