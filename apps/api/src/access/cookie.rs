use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie carrying the access token. `Max-Age` matches the token lifetime so
/// the browser drops it around the time it stops verifying.
pub fn access_cookie(name: &str, token: &str, ttl_secs: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX)))
        .build()
}
