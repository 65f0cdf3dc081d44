//! HTTP method as a typed enum.
//!
//! Covers the RFC 9110 methods plus [`Method::Any`], a routing wildcard that
//! matches every method no specific route claimed. Unknown method strings
//! are rejected at the server level with `405 Method Not Allowed` before they
//! ever reach a handler.

use std::fmt;
use std::str::FromStr;

/// A routable HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
    /// Routing wildcard. Never appears on an incoming request.
    Any,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
            Self::Any     => "ANY",
        }
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            "ANY"     => Ok(Self::Any),
            _         => Err(()),
        }
    }
}

/// Incoming requests never carry the wildcard, so `ANY` on the wire is rejected.
impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        match method.as_str().parse()? {
            Self::Any => Err(()),
            method => Ok(method),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names() {
        assert_eq!("PATCH".parse(), Ok(Method::Patch));
        assert_eq!("get".parse::<Method>(), Err(()));
    }

    #[test]
    fn wildcard_is_not_a_request_method() {
        let any = http::Method::from_bytes(b"ANY").unwrap();
        assert_eq!(Method::try_from(&any), Err(()));
        assert_eq!(Method::try_from(&http::Method::DELETE), Ok(Method::Delete));
    }
}
