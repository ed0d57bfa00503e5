/*!
# sso-warp-example: single sign-on backend on warp

A small web application that hands every authentication step to a
[Scalekit](https://www.scalekit.com) environment and keeps nothing but the
last known profile of each logged in user.

You need to define the environment variables `SCALEKIT_ENV_URL`,
`SCALEKIT_CLIENT_ID`, `SCALEKIT_CLIENT_SECRET`, `AUTH_REDIRECT_URI` and `HOST`,
either directly or in a `.env` file.

## Endpoints

- `POST /auth/login`: JSON `{connectionId?, organizationId?, email?}`, answers `{url}`
- `GET /auth/callback`: provider redirect target, sets the `uid` cookie
- `GET /auth/me`: profile of the user behind the `uid` cookie
- `POST /auth/logout`: drops the `uid` cookie
- `GET /{path}`: frontend bundle from `web/build`

```bash
cp .env.example .env
cargo run
```

*/

use std::{convert::Infallible, path::PathBuf, sync::Arc};

use warp::{Filter, Reply};

pub mod assets;
pub mod auth;
pub mod config;
pub mod entity;
pub mod provider;
pub mod session_cookie;

pub use auth::Auth;

/// Target of the access log.
pub const LOG_TARGET: &str = "sso_warp_example";

/// Every route of the application, with rejections turned into replies.
pub fn routes(
    auth: Arc<Auth>,
    web_build_dir: impl Into<PathBuf>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    auth::routes(auth)
        .or(assets::routes(web_build_dir))
        .recover(auth::handle_rejections)
        .with(warp::log(LOG_TARGET))
}
