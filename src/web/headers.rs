use axum::http::HeaderName;
use headers::{Header, HeaderValue};

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// `X-Forwarded-For`: the client and proxy chain, client first.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct XForwardedFor(pub Vec<String>);

impl XForwardedFor {
    /// The originating client as reported by the first proxy.
    pub fn client(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

impl Header for XForwardedFor {
    fn name() -> &'static HeaderName {
        &X_FORWARDED_FOR
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let mut addrs = Vec::new();
        for value in values {
            let list = value.to_str().map_err(|_| headers::Error::invalid())?;
            for addr in list.split(',') {
                let addr = addr.trim();
                if addr.is_empty() {
                    continue;
                }
                addrs.push(addr.to_string());
            }
        }

        if addrs.is_empty() {
            return Err(headers::Error::invalid());
        }

        Ok(XForwardedFor(addrs))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        if let Ok(value) = HeaderValue::from_str(&self.0.join(", ")) {
            values.extend(std::iter::once(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_address() {
        let header_value = HeaderValue::from_static("203.0.113.7");
        let mut values = std::iter::once(&header_value);

        let xff = XForwardedFor::decode(&mut values).unwrap();
        assert_eq!(xff.client(), Some("203.0.113.7"));
    }

    #[test]
    fn test_proxy_chain_across_values() {
        let first = HeaderValue::from_static("203.0.113.7, 10.0.0.1");
        let second = HeaderValue::from_static("10.0.0.2");
        let mut values = [&first, &second].into_iter();

        let xff = XForwardedFor::decode(&mut values).unwrap();
        assert_eq!(xff.0, vec!["203.0.113.7", "10.0.0.1", "10.0.0.2"]);
        assert_eq!(xff.client(), Some("203.0.113.7"));
    }

    #[test]
    fn test_empty_header_is_invalid() {
        let header_value = HeaderValue::from_static(" , ");
        let mut values = std::iter::once(&header_value);
        assert!(XForwardedFor::decode(&mut values).is_err());
    }

    #[test]
    fn test_encode_joins_addresses() {
        let xff = XForwardedFor(vec!["a".into(), "b".into()]);
        let mut values = Vec::new();
        xff.encode(&mut values);
        assert_eq!(values, vec![HeaderValue::from_static("a, b")]);
    }
}
