/// Classifies a request path for logging/metrics purposes. The actual
/// login/register handling lives in `http::request::HttpParser`, which
/// needs the classification inline to decide whether to consult the SQL
/// collaborator; this is a read-only view of the same decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Static,
    Login,
    Register,
}

pub fn classify(path: &str) -> RouteKind {
    match path {
        "/login" => RouteKind::Login,
        "/register" => RouteKind::Register,
        _ => RouteKind::Static,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_form_endpoints() {
        assert_eq!(classify("/login"), RouteKind::Login);
        assert_eq!(classify("/register"), RouteKind::Register);
        assert_eq!(classify("/index.html"), RouteKind::Static);
    }
}
