// Board wire format
//
// Every command is a plain-text POST to `http://{address}/command`, one
// command per line. The firmware answers 200 even for commands it does
// not know, signalling the rejection in-band with a fixed body prefix.

use url::Url;

use crate::error::Error;

/// Path of the command endpoint on the board's web server.
pub const COMMAND_PATH: &str = "/command";

/// Body prefix the firmware uses to reject an unknown command.
pub const UNSUPPORTED_MARKER: &str = "error:Unsupported command";

const ERROR_PREFIX: &str = "error:";

/// Build the command endpoint URL for a board address (IP or hostname,
/// optionally with a port).
pub fn command_url(address: &str) -> Result<Url, Error> {
    let url = Url::parse(&format!("http://{}{COMMAND_PATH}", address.trim()))?;
    Ok(url)
}

/// Normalize a command into its wire body: trimmed, newline-terminated.
pub fn command_body(text: &str) -> String {
    format!("{}\n", text.trim())
}

/// The command name is the first whitespace-separated token.
pub fn command_name(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

/// If `body` is an unsupported-command rejection, return the rejection
/// text with the `error:` prefix stripped.
pub fn unsupported_detail(body: &str) -> Option<&str> {
    if body.starts_with(UNSUPPORTED_MARKER) {
        body.get(ERROR_PREFIX.len()..)
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn url_targets_command_endpoint() {
        let url = command_url(" 192.168.1.102 ").unwrap();
        assert_eq!(url.as_str(), "http://192.168.1.102/command");
    }

    #[test]
    fn url_keeps_explicit_port() {
        let url = command_url("127.0.0.1:8080").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/command");
    }

    #[test]
    fn url_rejects_garbage_address() {
        assert!(command_url("bad host name").is_err());
    }

    #[test]
    fn body_is_trimmed_and_newline_terminated() {
        assert_eq!(command_body("  version \n"), "version\n");
        assert_eq!(command_body("M114"), "M114\n");
    }

    #[test]
    fn command_name_is_first_token() {
        assert_eq!(command_name("ls -s /sd"), "ls");
        assert_eq!(command_name("  version"), "version");
        assert_eq!(command_name(""), "");
    }

    #[test]
    fn unsupported_marker_is_detected_as_prefix_only() {
        assert_eq!(
            unsupported_detail("error:Unsupported command - foo\n"),
            Some("Unsupported command - foo\n")
        );
        assert_eq!(unsupported_detail("ok\nerror:Unsupported command"), None);
        assert_eq!(unsupported_detail("ok"), None);
    }
}
