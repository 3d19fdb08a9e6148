use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::model::VisitorId;

/// Name of the cookie that keeps the visitor id in the browser.
pub const VISITOR_COOKIE: &str = "visitor_id";

/// Find the visitor id of a request, or issue a new one.
///
/// The returned jar carries a `Set-Cookie` for fresh ids and has to be part of the response.
pub fn identify(jar: CookieJar) -> (CookieJar, VisitorId) {
    let existing = jar
        .get(VISITOR_COOKIE)
        .and_then(|cookie| cookie.value().parse::<VisitorId>().ok());

    if let Some(visitor) = existing {
        return (jar, visitor);
    }

    let visitor = VisitorId::generate();
    tracing::debug!(%visitor, "issued a new visitor id");

    let cookie = Cookie::build((VISITOR_COOKIE, visitor.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .permanent();

    (jar.add(cookie), visitor)
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderMap, HeaderValue};

    use super::*;

    fn jar_with(cookie: &'static str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn reuse_existing_visitor() {
        let (jar, visitor) = identify(jar_with("visitor_id=returning-visitor"));

        assert_eq!(visitor.as_str(), "returning-visitor");
        assert_eq!(
            jar.get(VISITOR_COOKIE).map(|cookie| cookie.value().to_owned()),
            Some("returning-visitor".to_owned())
        );
    }

    #[test]
    fn issue_visitor_when_missing() {
        let (jar, visitor) = identify(CookieJar::new());

        let cookie = jar.get(VISITOR_COOKIE).expect("a visitor cookie is set");
        assert_eq!(cookie.value(), visitor.as_str());
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[test]
    fn replace_invalid_visitor() {
        let (_, visitor) = identify(jar_with("visitor_id=not%20valid"));
        assert_ne!(visitor.as_str(), "not%20valid");
    }
}
