//! # Command protocol codec.
//!
//! Parses inbound datagrams into `(sequence prefix, command body)` and
//! serializes typed responses back into the textual wire format.
//!
//! ## Framing
//! ```text
//! Request:       <digits/spaces prefix><command text>
//! Status frame:  <prefix>P<alert><status>\n\n<one line per worker, each \n-terminated>\n
//! Reply frame:   <prefix>P<alert><message>\n
//! ```
//!
//! The sequence prefix is the longest leading run of ASCII digits and
//! spaces; it is opaque and echoed back verbatim. The alert renders as a
//! single digit (clamped to 9). Status text containing literal newlines
//! would be misread as frame boundaries; that constraint is documented,
//! not enforced.

/// One inbound request: opaque sequence prefix plus command body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Echoed back verbatim in the response.
    pub seq: String,
    /// Command text after the prefix. May be empty (a no-op receipt).
    pub body: String,
}

/// One decoded response, the counterpart of [`encode_status`] /
/// [`encode_reply`]. Used by tests and protocol clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Sequence prefix, verbatim.
    pub seq: String,
    /// Alert digit.
    pub alert: u8,
    /// Status or acknowledgement text from the first line.
    pub status: String,
    /// Per-worker status lines; empty for single-line replies.
    pub lines: Vec<String>,
}

/// Splits a datagram into sequence prefix and command body.
///
/// Returns `None` for non-UTF-8 payloads (the datagram is dropped by the
/// caller). The body is truncated at the first newline, so a trailing
/// newline from chatty clients is harmless.
pub fn parse_request(buf: &[u8]) -> Option<Request> {
    let text = std::str::from_utf8(buf).ok()?;
    let split = text
        .find(|c: char| !matches!(c, '0'..='9' | ' '))
        .unwrap_or(text.len());
    let (seq, rest) = text.split_at(split);
    let body = rest.lines().next().unwrap_or("");
    Some(Request {
        seq: seq.to_string(),
        body: body.to_string(),
    })
}

/// Serializes a status response: header line, blank separator, one line
/// per worker, and a final terminating newline.
pub fn encode_status(seq: &str, alert: u8, status: &str, lines: &[String]) -> String {
    let mut block = String::new();
    for line in lines {
        block.push_str(line);
        block.push('\n');
    }
    format!("{seq}P{}{status}\n\n{block}\n", alert_digit(alert))
}

/// Serializes a single-line command acknowledgement.
pub fn encode_reply(seq: &str, alert: u8, message: &str) -> String {
    format!("{seq}P{}{message}\n", alert_digit(alert))
}

/// Decodes a response frame produced by [`encode_status`] or
/// [`encode_reply`].
pub fn parse_response(text: &str) -> Option<Response> {
    let mut lines = text.lines();
    let header = lines.next()?;

    let split = header
        .find(|c: char| !matches!(c, '0'..='9' | ' '))
        .unwrap_or(header.len());
    let (seq, rest) = header.split_at(split);
    let rest = rest.strip_prefix('P')?;
    let digit = rest.chars().next().filter(char::is_ascii_digit)?;
    let status = &rest[1..];

    let body: Vec<&str> = lines.collect();
    let worker_lines = match body.split_first() {
        // Status frame: a blank separator, then worker lines (trailing
        // blanks are the frame terminator).
        Some((&"", tail)) => {
            let end = tail.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
            tail[..end].iter().map(|l| l.to_string()).collect()
        }
        // Single-line reply.
        None => Vec::new(),
        Some(_) => return None,
    };

    Some(Response {
        seq: seq.to_string(),
        alert: digit as u8 - b'0',
        status: status.to_string(),
        lines: worker_lines,
    })
}

fn alert_digit(alert: u8) -> char {
    (b'0' + alert.min(9)) as char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_prefix_is_digits_and_spaces() {
        let req = parse_request(b"42  status").unwrap();
        assert_eq!(req.seq, "42  ");
        assert_eq!(req.body, "status");
    }

    #[test]
    fn request_prefix_may_be_empty() {
        let req = parse_request(b"thread auth start").unwrap();
        assert_eq!(req.seq, "");
        assert_eq!(req.body, "thread auth start");
    }

    #[test]
    fn request_body_may_be_empty() {
        let req = parse_request(b"99 ").unwrap();
        assert_eq!(req.seq, "99 ");
        assert_eq!(req.body, "");

        let req = parse_request(b"").unwrap();
        assert_eq!(req.seq, "");
        assert_eq!(req.body, "");
    }

    #[test]
    fn request_body_stops_at_newline() {
        let req = parse_request(b"7status\njunk").unwrap();
        assert_eq!(req.body, "status");
    }

    #[test]
    fn request_rejects_invalid_utf8() {
        assert!(parse_request(&[0x31, 0xff, 0xfe]).is_none());
    }

    #[test]
    fn status_frame_with_empty_worker_list() {
        assert_eq!(encode_status("42", 2, "Ready", &[]), "42P2Ready\n\n\n");
    }

    #[test]
    fn status_frame_with_workers() {
        let lines = vec!["auth: Idle".to_string(), "admin: At 100".to_string()];
        assert_eq!(
            encode_status("7", 0, "Ready", &lines),
            "7P0Ready\n\nauth: Idle\nadmin: At 100\n\n"
        );
    }

    #[test]
    fn reply_frame() {
        assert_eq!(
            encode_reply("3 ", 2, "Thread auth started"),
            "3 P2Thread auth started\n"
        );
    }

    #[test]
    fn alert_clamps_to_single_digit() {
        assert_eq!(encode_reply("", 42, "hi"), "P9hi\n");
    }

    #[test]
    fn status_round_trip() {
        let lines = vec!["auth: Idle".to_string()];
        let frame = encode_status("42", 2, "Ready", &lines);
        let resp = parse_response(&frame).unwrap();
        assert_eq!(resp.seq, "42");
        assert_eq!(resp.alert, 2);
        assert_eq!(resp.status, "Ready");
        assert_eq!(resp.lines, lines);
    }

    #[test]
    fn empty_status_round_trip() {
        let resp = parse_response("42P2Ready\n\n\n").unwrap();
        assert_eq!(resp.seq, "42");
        assert_eq!(resp.alert, 2);
        assert_eq!(resp.status, "Ready");
        assert!(resp.lines.is_empty());
    }

    #[test]
    fn reply_round_trip() {
        let resp = parse_response("5P5No such thread\n").unwrap();
        assert_eq!(resp.seq, "5");
        assert_eq!(resp.alert, 5);
        assert_eq!(resp.status, "No such thread");
        assert!(resp.lines.is_empty());
    }

    #[test]
    fn response_without_alert_digit_is_rejected() {
        assert!(parse_response("42Ready\n").is_none());
        assert!(parse_response("42PReady\n").is_none());
    }
}
