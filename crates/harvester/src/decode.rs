use mailparse::{MailParseError, ParsedMail};
use tracing::debug;

/// Decode a raw message into one searchable text body.
///
/// Single-part messages yield their body whatever the declared type. Multi-part messages
/// concatenate every `text/plain` and `text/html` leaf in message order; a leaf that
/// fails to decode is skipped.
pub fn normalized_body(raw: &[u8]) -> Result<String, MailParseError> {
    let parsed = mailparse::parse_mail(raw)?;

    if parsed.subparts.is_empty() {
        return parsed.get_body();
    }

    let mut body = String::new();
    collect_text_parts(&parsed, &mut body);
    Ok(body)
}

fn collect_text_parts(part: &ParsedMail<'_>, out: &mut String) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_text_parts(sub, out);
        }
        return;
    }

    let mime = part.ctype.mimetype.to_ascii_lowercase();
    if mime != "text/plain" && mime != "text/html" {
        return;
    }

    match part.get_body() {
        Ok(text) => {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&text);
        }
        Err(e) => debug!("skipping undecodable {} part: {}", mime, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_plain() {
        let raw = b"From: AMOE <noreply@playatmcd.com>\r\n\
Subject: Verify your email\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Your One Time Password Code: 123456\r\n";

        let body = normalized_body(raw).unwrap();
        assert!(body.contains("Your One Time Password Code: 123456"));
    }

    #[test]
    fn test_multipart_concatenates_text_parts_and_decodes_qp() {
        let raw = b"From: AMOE <noreply@playatmcd.com>\r\n\
Subject: Verify your email\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain part\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
<a href=3D\"https://amoe.playatmcd.com/verify_your_email?token=3Dabc123\">Verify</a>=\r\n\
<strong>654321</strong>\r\n\
--XYZ\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--XYZ--\r\n";

        let body = normalized_body(raw).unwrap();
        assert!(body.contains("Plain part"));
        assert!(body.contains("https://amoe.playatmcd.com/verify_your_email?token=abc123"));
        assert!(body.contains("<strong>654321</strong>"));
        assert!(!body.contains("iVBORw0KGgo"));
    }
}
