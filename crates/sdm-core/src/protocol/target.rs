//! Parsed download URL.

use url::{Host, Url};

use crate::retry::TransferError;
use crate::transport::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
    Ftp,
    Ftps,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
            Scheme::Ftp => 21,
            Scheme::Ftps => 990,
        }
    }

    pub fn uses_tls(self) -> bool {
        matches!(self, Scheme::Https | Scheme::Ftps)
    }
}

/// A URL split into what the transports and protocols need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: Url,
    pub scheme: Scheme,
    /// Host to connect to (IPv6 without brackets).
    pub host: String,
    pub port: u16,
    /// FTP login; `anonymous` when the URL carries none.
    pub user: String,
    pub password: String,
}

const ANONYMOUS_PASSWORD: &str = "anonymous@";

impl Target {
    pub fn parse(input: &str) -> Result<Self, TransferError> {
        let url = Url::parse(input.trim())
            .map_err(|e| TransferError::protocol(format!("invalid URL {:?}: {}", input, e)))?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, TransferError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "ftp" => Scheme::Ftp,
            "ftps" => Scheme::Ftps,
            other => return Err(TransferError::UnsupportedScheme(other.to_string())),
        };
        let host = match url.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(a)) => a.to_string(),
            Some(Host::Ipv6(a)) => a.to_string(),
            None => return Err(TransferError::protocol(format!("URL has no host: {}", url))),
        };
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        let user = match url.username() {
            "" => "anonymous".to_string(),
            u => decode(u),
        };
        let password = url
            .password()
            .map(decode)
            .unwrap_or_else(|| ANONYMOUS_PASSWORD.to_string());
        Ok(Self {
            url,
            scheme,
            host,
            port,
            user,
            password,
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            use_tls: self.scheme.uses_tls(),
        }
    }

    /// Value for the HTTP `Host` header.
    pub fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or(&self.host);
        if self.port == self.scheme.default_port() {
            host.to_string()
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Path and query as sent in the HTTP request line.
    pub fn request_path(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    /// Resolves a redirect `Location` against this target.
    pub fn redirect(&self, location: &str) -> Result<Target, TransferError> {
        let next = self.url.join(location.trim()).map_err(|e| {
            TransferError::protocol(format!("bad redirect location {:?}: {}", location, e))
        })?;
        Target::from_url(next)
    }

    /// Decoded path segments: directory part and file name (FTP).
    pub fn split_path(&self) -> (String, String) {
        let path = decode(self.url.path());
        let trimmed = path.trim_start_matches('/');
        match trimmed.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (String::new(), trimmed.to_string()),
        }
    }
}

fn decode(s: &str) -> String {
    crate::url_model::percent_decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_per_scheme() {
        assert_eq!(Target::parse("http://h/x").unwrap().port, 80);
        assert_eq!(Target::parse("https://h/x").unwrap().port, 443);
        assert_eq!(Target::parse("ftp://h/x").unwrap().port, 21);
        assert_eq!(Target::parse("ftps://h/x").unwrap().port, 990);
        assert_eq!(Target::parse("http://h:8080/x").unwrap().port, 8080);
    }

    #[test]
    fn unsupported_scheme_rejected() {
        assert!(matches!(
            Target::parse("gopher://h/x"),
            Err(TransferError::UnsupportedScheme(s)) if s == "gopher"
        ));
        assert!(matches!(Target::parse("not a url"), Err(TransferError::Protocol(_))));
    }

    #[test]
    fn ipv6_host_and_header() {
        let t = Target::parse("http://[::1]:8080/f").unwrap();
        assert_eq!(t.host, "::1");
        assert_eq!(t.host_header(), "[::1]:8080");
        assert_eq!(Target::parse("http://example.com/f").unwrap().host_header(), "example.com");
    }

    #[test]
    fn request_path_keeps_query() {
        let t = Target::parse("http://h/dl.php?id=3&x=y").unwrap();
        assert_eq!(t.request_path(), "/dl.php?id=3&x=y");
    }

    #[test]
    fn ftp_credentials() {
        let anon = Target::parse("ftp://h/pub/f").unwrap();
        assert_eq!(anon.user, "anonymous");
        assert_eq!(anon.password, ANONYMOUS_PASSWORD);
        let named = Target::parse("ftp://bob:p%40ss@h/f").unwrap();
        assert_eq!(named.user, "bob");
        assert_eq!(named.password, "p@ss");
    }

    #[test]
    fn split_path_into_dir_and_file() {
        let t = Target::parse("ftp://h/pub/debian/my%20file.iso").unwrap();
        assert_eq!(t.split_path(), ("pub/debian".to_string(), "my file.iso".to_string()));
        let top = Target::parse("ftp://h/file").unwrap();
        assert_eq!(top.split_path(), (String::new(), "file".to_string()));
    }

    #[test]
    fn redirect_resolves_relative_location() {
        let t = Target::parse("http://h/a/b").unwrap();
        let r = t.redirect("/c/d.bin").unwrap();
        assert_eq!(r.url.as_str(), "http://h/c/d.bin");
        let abs = t.redirect("https://other/x").unwrap();
        assert_eq!(abs.scheme, Scheme::Https);
        assert_eq!(abs.host, "other");
    }
}
