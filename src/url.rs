//! `[transport:]host:port` URL grammar (component F), ported from `get_field`/
//! `xvcserver_start` in the original protocol source. Only `tcp` (case-insensitive) is an
//! accepted transport; trailing fields after `host:port` are a parse error (spec.md §4.6,
//! §6 exit codes 3/4).

use crate::error::UrlError;

/// A parsed `-s` argument: transport (always `"tcp"`, case-normalized away), host, and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrl {
    pub host: String,
    pub port: String,
}

/// Splits `field` into owned strings at a `sep` that may or may not be present, mirroring
/// `get_field`'s "consume up to and including the separator, or to the end" behavior.
fn split_field(input: &str, sep: char) -> (&str, &str) {
    match input.find(sep) {
        Some(idx) => (&input[..idx], &input[idx + 1..]),
        None => (input, ""),
    }
}

/// Parses a `-s` argument of the shape `[tcp:]host:port`.
///
/// If the first field is exactly `tcp` (any case), it's consumed as the transport and the
/// remainder is `host:port`. Otherwise, if no further `:` remains, the whole first field is
/// taken as `host` and transport defaults to `tcp` (spec.md's `tcp::2542` default omits the
/// transport entirely). Any other shape — a first field that isn't `tcp` but more fields
/// follow — names an unsupported transport.
pub fn parse_url(url: &str) -> Result<ServerUrl, UrlError> {
    let (first, rest) = split_field(url, ':');

    let (host_port, transport_is_tcp) = if first.eq_ignore_ascii_case("tcp") {
        (rest, true)
    } else if !rest.contains(':') {
        (url, true)
    } else {
        (rest, false)
    };

    if !transport_is_tcp {
        return Err(UrlError::InvalidTransport(first.to_owned()));
    }

    let (host, port_and_trailer) = split_field(host_port, ':');
    let (port, trailer) = split_field(port_and_trailer, ':');
    if !trailer.is_empty() {
        return Err(UrlError::UnexpectedField(trailer.to_owned()));
    }

    Ok(ServerUrl {
        host: host.to_owned(),
        port: port.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_defaults_to_tcp() {
        let url = parse_url("localhost:2542").unwrap();
        assert_eq!(url.host, "localhost");
        assert_eq!(url.port, "2542");
    }

    #[test]
    fn empty_host_means_any_address() {
        let url = parse_url("tcp::2542").unwrap();
        assert_eq!(url.host, "");
        assert_eq!(url.port, "2542");
    }

    #[test]
    fn transport_is_case_insensitive() {
        let url = parse_url("TCP:host:10200").unwrap();
        assert_eq!(url.host, "host");
        assert_eq!(url.port, "10200");
    }

    #[test]
    fn unsupported_transport_is_rejected() {
        let err = parse_url("udp:host:2542").unwrap_err();
        assert!(matches!(err, UrlError::InvalidTransport(t) if t == "udp"));
    }

    #[test]
    fn trailing_field_is_rejected() {
        let err = parse_url("tcp:host:2542:extra").unwrap_err();
        assert!(matches!(err, UrlError::UnexpectedField(t) if t == "extra"));
    }
}
