//! Event feed transports: the remote server-sent event feed, a local file,
//! or stdin.

use sp_common::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::logging::event_names;

/// Connect timeout for the remote feed. Reads are unbounded because the feed
/// is a long-lived response.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed feed reader handed to `EventStream::attach`.
pub type FeedReader = Box<dyn Read + Send + 'static>;

/// Open the remote feed at `url` and return its body.
///
/// Connection failures and non-2xx statuses map to
/// [`Error::StreamUnavailable`].
pub fn open_remote(url: &str) -> Result<FeedReader> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .user_agent(concat!("social-pulse/", env!("CARGO_PKG_VERSION")))
        .build();

    let response = agent
        .get(url)
        .set("Accept", "text/event-stream")
        .call()
        .map_err(|e| match e {
            ureq::Error::Status(code, response) => Error::StreamUnavailable(format!(
                "{} answered {} {}",
                url,
                code,
                response.status_text()
            )),
            ureq::Error::Transport(transport) => {
                Error::StreamUnavailable(format!("{}: {}", url, transport))
            }
        })?;

    info!(
        event = event_names::STREAM_OPENED,
        url = %url,
        status = response.status(),
        content_type = %response.content_type(),
        "connected to event feed"
    );
    Ok(Box::new(response.into_reader()))
}

/// Open a local feed. `-` reads stdin.
pub fn open_input(path: &Path) -> Result<FeedReader> {
    if path.as_os_str() == "-" {
        debug!(event = event_names::STREAM_OPENED, "reading events from stdin");
        return Ok(Box::new(std::io::stdin()));
    }
    let file = File::open(path)?;
    debug!(event = event_names::STREAM_OPENED, path = %path.display(), "reading events from file");
    Ok(Box::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::thread;
    use tempfile::NamedTempFile;

    /// One-shot feed server answering the first request with `status` and
    /// `body`. Returns its URL and the Accept header it received.
    fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<Option<String>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let request = server.recv().unwrap();
            let accept = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Accept"))
                .map(|h| h.value.as_str().to_string());
            request
                .respond(tiny_http::Response::from_string(body).with_status_code(status))
                .unwrap();
            accept
        });
        (format!("http://{}/stream", addr), handle)
    }

    #[test]
    fn test_open_remote_reads_body() {
        let (url, server) = serve_once(200, "data: {\"pin\":{\"id\":1,\"timestamp\":2}}\n");
        let mut body = String::new();
        open_remote(&url).unwrap().read_to_string(&mut body).unwrap();

        assert!(body.starts_with("data: "));
        assert_eq!(server.join().unwrap().as_deref(), Some("text/event-stream"));
    }

    #[test]
    fn test_open_remote_rejects_error_status() {
        let (url, server) = serve_once(503, "down");
        let err = open_remote(&url).err().unwrap();
        assert!(matches!(err, Error::StreamUnavailable(ref msg) if msg.contains("503")));
        server.join().unwrap();
    }

    #[test]
    fn test_open_remote_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = open_remote(&format!("http://127.0.0.1:{}/stream", port))
            .err()
            .unwrap();
        assert!(matches!(err, Error::StreamUnavailable(_)));
    }

    #[test]
    fn test_open_input_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "data: {{}}").unwrap();

        let mut content = String::new();
        open_input(file.path())
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "data: {}\n");
    }

    #[test]
    fn test_open_input_missing_file() {
        let err = open_input(Path::new("/nonexistent/feed.txt")).err().unwrap();
        assert!(matches!(err, Error::Io(_)));
    }
}
