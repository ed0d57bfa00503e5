use std::{collections::HashMap, convert::Infallible, sync::Arc};

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use sso_warp_example::{
    entity::{Sessions, User},
    provider::{
        AuthenticationOptions, AuthenticationResponse, AuthorizationUrlOptions,
        IdentityProvider, IdpInitiatedLoginClaims, ProviderError,
    },
    Auth,
};
use warp::{http::Response, hyper::body::Bytes, test::request, Filter, Reply};

const HOST: &str = "http://localhost:8080";
const REDIRECT_URI: &str = "http://localhost:8080/auth/callback";
const WEB_BUILD_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/web/build");

#[derive(Default)]
struct FakeProvider {
    users: HashMap<String, User>,
    idp_tokens: HashMap<String, IdpInitiatedLoginClaims>,
    broken: bool,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(
        &self,
        redirect_uri: &str,
        options: &AuthorizationUrlOptions,
    ) -> Result<Url, ProviderError> {
        if self.broken {
            return Err(ProviderError::Url("environment unavailable".to_string()));
        }
        let mut url = Url::parse("https://idp.test/oauth/authorize").unwrap();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("redirect_uri", redirect_uri);
            for (name, value) in [
                ("connection_id", &options.connection_id),
                ("organization_id", &options.organization_id),
                ("login_hint", &options.login_hint),
            ] {
                if let Some(value) = value {
                    query.append_pair(name, value);
                }
            }
        }
        Ok(url)
    }

    async fn authenticate_with_code(
        &self,
        code: &str,
        redirect_uri: &str,
        _options: &AuthenticationOptions,
    ) -> Result<AuthenticationResponse, ProviderError> {
        assert_eq!(redirect_uri, REDIRECT_URI);
        match self.users.get(code) {
            Some(user) => Ok(AuthenticationResponse {
                user: user.clone(),
                id_token: "id-token".to_string(),
                access_token: "access-token".to_string(),
                expires_in: 3600,
            }),
            None => Err(ProviderError::Status {
                status: reqwest::StatusCode::BAD_REQUEST,
                body: "invalid_grant".to_string(),
            }),
        }
    }

    async fn idp_initiated_login_claims(
        &self,
        token: &str,
    ) -> Result<IdpInitiatedLoginClaims, ProviderError> {
        self.idp_tokens
            .get(token)
            .cloned()
            .ok_or(ProviderError::MissingKey(Some("unknown".to_string())))
    }
}

fn user(id: &str, email: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(email.to_string()),
        email_verified: true,
        given_name: Some(email.split('@').next().unwrap_or_default().to_string()),
        ..Default::default()
    }
}

fn provider() -> FakeProvider {
    let mut provider = FakeProvider::default();
    provider
        .users
        .insert("code-alice".to_string(), user("org1;alice", "alice@acme.test"));
    provider
        .users
        .insert("code-bob".to_string(), user("org1;bob", "bob@acme.test"));
    provider
        .users
        .insert("code-nobody".to_string(), user("org1;", "nobody@acme.test"));
    provider.idp_tokens.insert(
        "idp-token".to_string(),
        IdpInitiatedLoginClaims {
            connection_id: Some("conn_1".to_string()),
            organization_id: Some("org_1".to_string()),
            login_hint: Some("alice@acme.test".to_string()),
            relay_state: None,
        },
    );
    provider
}

fn app(
    provider: FakeProvider,
) -> (
    Arc<Auth>,
    impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone,
) {
    let auth = Arc::new(Auth::new(
        Arc::new(provider),
        HOST,
        REDIRECT_URI,
        Sessions::unbounded(),
    ));
    let routes = sso_warp_example::routes(auth.clone(), WEB_BUILD_DIR);
    (auth, routes)
}

fn header<'a>(response: &'a Response<Bytes>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing {} header", name))
        .to_str()
        .unwrap()
}

/// `name=value` part of the `Set-Cookie` header.
fn cookie_pair(response: &Response<Bytes>) -> String {
    header(response, "set-cookie")
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn json(response: &Response<Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

#[tokio::test]
async fn login_returns_authorization_url() {
    let (_, routes) = app(provider());

    let response = request()
        .method("POST")
        .path("/auth/login")
        .body(r#"{"connectionId":"conn_1","organizationId":"org_1","email":"alice@acme.test"}"#)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    let url = Url::parse(json(&response)["url"].as_str().unwrap()).unwrap();
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(query["redirect_uri"], REDIRECT_URI);
    assert_eq!(query["connection_id"], "conn_1");
    assert_eq!(query["organization_id"], "org_1");
    assert_eq!(query["login_hint"], "alice@acme.test");
}

#[tokio::test]
async fn login_with_empty_body_still_returns_url() {
    let (_, routes) = app(provider());

    for body in ["", "{}"] {
        let response = request()
            .method("POST")
            .path("/auth/login")
            .body(body)
            .reply(&routes)
            .await;

        assert_eq!(response.status(), 200, "body {:?}", body);
        let url = json(&response)["url"].as_str().unwrap().to_string();
        assert!(!url.contains("login_hint"));
        assert!(!url.contains("connection_id"));
    }
}

#[tokio::test]
async fn login_without_body_or_length_returns_url() {
    let (_, routes) = app(provider());

    let response = request()
        .method("POST")
        .path("/auth/login")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    assert!(json(&response)["url"].as_str().is_some());
}

#[tokio::test]
async fn login_with_oversized_body_is_payload_too_large() {
    let (_, routes) = app(provider());

    let email = "a".repeat(20_000);
    let response = request()
        .method("POST")
        .path("/auth/login")
        .body(format!(r#"{{"email":"{}"}}"#, email))
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn login_with_unparsable_length_is_bad_request() {
    let (_, routes) = app(provider());

    let response = request()
        .method("POST")
        .path("/auth/login")
        .header("content-length", "abc")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn login_ignores_empty_fields() {
    let (_, routes) = app(provider());

    let response = request()
        .method("POST")
        .path("/auth/login")
        .body(r#"{"email":"","organizationId":"org_1"}"#)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    let url = json(&response)["url"].as_str().unwrap().to_string();
    assert!(!url.contains("login_hint"));
    assert!(url.contains("organization_id=org_1"));
}

#[tokio::test]
async fn login_with_malformed_body_is_bad_request() {
    let (_, routes) = app(provider());

    let response = request()
        .method("POST")
        .path("/auth/login")
        .body(r#"{"email": "#)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 400);
    assert!(!response.body().is_empty());
}

#[tokio::test]
async fn login_provider_failure_is_json_error() {
    let (_, routes) = app(FakeProvider {
        broken: true,
        ..provider()
    });

    let response = request()
        .method("POST")
        .path("/auth/login")
        .body("{}")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 500);
    assert_eq!(
        json(&response)["error"],
        "invalid url: environment unavailable"
    );
}

#[tokio::test]
async fn callback_error_description_wins() {
    let (auth, routes) = app(provider());

    let response = request()
        .path("/auth/callback?code=code-alice&idp_initiated_login=idp-token&error_description=access_denied")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(response.body().as_ref(), b"access_denied");
    assert!(response.headers().get("set-cookie").is_none());
    assert!(auth.sessions().is_empty().await);
}

#[tokio::test]
async fn callback_with_repeated_parameters_uses_first_value() {
    let (auth, routes) = app(provider());

    let response = request()
        .path("/auth/callback?error_description=access_denied&code=a&code=b")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(response.body().as_ref(), b"access_denied");

    let response = request()
        .path("/auth/callback?code=code-alice&code=code-bob")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 302);
    assert_eq!(cookie_pair(&response), "uid=alice");
    assert!(auth.sessions().get("bob").await.is_none());
}

#[tokio::test]
async fn callback_without_code_is_bad_request() {
    let (_, routes) = app(provider());

    for path in ["/auth/callback", "/auth/callback?code="] {
        let response = request().path(path).reply(&routes).await;
        assert_eq!(response.status(), 400);
        assert_eq!(response.body().as_ref(), b"code not found");
    }
}

#[tokio::test]
async fn callback_with_idp_initiated_login_redirects_to_provider() {
    let (_, routes) = app(provider());

    let response = request()
        .path("/auth/callback?idp_initiated_login=idp-token")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 302);
    let location = Url::parse(header(&response, "location")).unwrap();
    let query: HashMap<String, String> = location.query_pairs().into_owned().collect();
    assert_eq!(query["connection_id"], "conn_1");
    assert_eq!(query["organization_id"], "org_1");
    assert_eq!(query["login_hint"], "alice@acme.test");
    assert!(response.headers().get("set-cookie").is_none());
}

#[tokio::test]
async fn callback_with_bad_idp_token_is_server_error() {
    let (_, routes) = app(provider());

    let response = request()
        .path("/auth/callback?idp_initiated_login=forged")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 500);
    assert!(String::from_utf8_lossy(response.body()).contains("unknown"));
}

#[tokio::test]
async fn callback_with_rejected_code_is_server_error() {
    let (auth, routes) = app(provider());

    let response = request()
        .path("/auth/callback?code=stale")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 500);
    assert!(String::from_utf8_lossy(response.body()).contains("invalid_grant"));
    assert!(auth.sessions().is_empty().await);
}

#[tokio::test]
async fn callback_without_local_user_id_is_server_error() {
    let (auth, routes) = app(provider());

    let response = request()
        .path("/auth/callback?code=code-nobody")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 500);
    assert!(auth.sessions().is_empty().await);
}

#[tokio::test]
async fn callback_sets_cookie_and_me_returns_profile() {
    let (_, routes) = app(provider());

    let response = request()
        .path("/auth/callback?code=code-alice")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 302);
    assert_eq!(header(&response, "location"), "http://localhost:8080/profile");
    let set_cookie = header(&response, "set-cookie");
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));
    let cookie = cookie_pair(&response);
    assert_eq!(cookie, "uid=alice");

    let response = request()
        .path("/auth/me")
        .header("cookie", cookie)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    let profile: User = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(profile, user("org1;alice", "alice@acme.test"));
}

#[tokio::test]
async fn me_without_session_is_not_found() {
    let (_, routes) = app(provider());

    let response = request().path("/auth/me").reply(&routes).await;
    assert_eq!(response.status(), 404);
    assert_eq!(response.body().as_ref(), b"user not found");

    let response = request()
        .path("/auth/me")
        .header("cookie", "uid=mallory")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 404);
    assert_eq!(response.body().as_ref(), b"user not found");
}

#[tokio::test]
async fn logout_clears_cookie_but_keeps_record() {
    let (auth, routes) = app(provider());

    request()
        .path("/auth/callback?code=code-alice")
        .reply(&routes)
        .await;

    let response = request()
        .method("POST")
        .path("/auth/logout")
        .header("cookie", "uid=alice")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 302);
    assert_eq!(header(&response, "location"), "http://localhost:8080/");
    assert!(header(&response, "set-cookie").contains("Max-Age=0"));
    let cleared = cookie_pair(&response);
    assert_eq!(cleared, "uid=");

    let response = request()
        .path("/auth/me")
        .header("cookie", cleared)
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 404);

    assert!(auth.sessions().get("alice").await.is_some());
}

#[tokio::test]
async fn concurrent_callbacks_keep_profiles_apart() {
    let (_, routes) = app(provider());

    let (alice, bob) = tokio::join!(
        request().path("/auth/callback?code=code-alice").reply(&routes),
        request().path("/auth/callback?code=code-bob").reply(&routes),
    );
    assert_eq!(alice.status(), 302);
    assert_eq!(bob.status(), 302);

    for (response, expected) in [
        (alice, user("org1;alice", "alice@acme.test")),
        (bob, user("org1;bob", "bob@acme.test")),
    ] {
        let response = request()
            .path("/auth/me")
            .header("cookie", cookie_pair(&response))
            .reply(&routes)
            .await;
        let profile: User = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(profile, expected);
    }
}

#[tokio::test]
async fn unknown_static_path_serves_entry_document() {
    let (_, routes) = app(provider());

    let entry = request().path("/index.html").reply(&routes).await;
    assert_eq!(entry.status(), 200);

    for path in ["/", "/profile", "/some/client/route"] {
        let response = request().path(path).reply(&routes).await;
        assert_eq!(response.status(), 200, "path {}", path);
        assert_eq!(response.body(), entry.body(), "path {}", path);
    }
}

#[tokio::test]
async fn bundle_files_are_served_as_is() {
    let (_, routes) = app(provider());

    let response = request().path("/assets/app.js").reply(&routes).await;
    assert_eq!(response.status(), 200);
    assert!(String::from_utf8_lossy(response.body()).contains("/auth/me"));
}

#[tokio::test]
async fn wrong_method_on_auth_route_is_rejected() {
    let (_, routes) = app(provider());

    let response = request()
        .method("DELETE")
        .path("/auth/logout")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 405);
}
