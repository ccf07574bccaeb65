use crate::Result;
use reqwest::header::HeaderValue;
use std::sync::{PoisonError, RwLock};

/// The token sent as `Authorization: token <value>` on every request.
///
/// The header value is built once per token and swapped wholesale on refresh, so readers
/// never observe a partially updated credential.
#[derive(Debug, Default)]
pub struct Credential {
    header: RwLock<Option<HeaderValue>>,
}

impl Credential {
    /// A credential that sends no `Authorization` header.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(token: Option<&str>) -> Result<Self> {
        Ok(Self {
            header: RwLock::new(token.map(header_for).transpose()?),
        })
    }

    /// Swap in a freshly issued token.
    pub fn replace(&self, token: &str) -> Result<()> {
        let header = header_for(token)?;
        *self.header.write().unwrap_or_else(PoisonError::into_inner) = Some(header);
        Ok(())
    }

    /// The current `Authorization` header value, if any.
    #[must_use]
    pub fn header(&self) -> Option<HeaderValue> {
        self.header.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn header_for(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("token {}", token.trim()))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_header() {
        let credential = Credential::anonymous();
        assert!(credential.header().is_none());
    }

    #[test]
    fn test_header_uses_token_scheme() {
        let credential = Credential::new(Some("abc123")).unwrap();
        let header = credential.header().unwrap();
        assert_eq!(header.to_str().unwrap(), "token abc123");
        assert!(header.is_sensitive());
    }

    #[test]
    fn test_replace_swaps_value() {
        let credential = Credential::new(Some("old")).unwrap();
        credential.replace("new").unwrap();
        assert_eq!(credential.header().unwrap().to_str().unwrap(), "token new");
    }

    #[test]
    fn test_rejects_control_characters() {
        assert!(Credential::new(Some("bad\u{7}token")).is_err());

        let credential = Credential::new(Some("good")).unwrap();
        assert!(credential.replace("bad\u{7}token").is_err());
        assert_eq!(credential.header().unwrap().to_str().unwrap(), "token good");
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let credential = Credential::new(Some("very-secret")).unwrap();
        assert!(!format!("{credential:?}").contains("very-secret"));
    }
}
