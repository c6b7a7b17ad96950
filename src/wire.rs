//! Byte-level framing for the two streaming responses

use bytes::{BufMut, Bytes, BytesMut};

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Response content type of the Motion-JPEG stream
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Response content type of the diagnostic stream
pub const HTML_CONTENT_TYPE: &str = "text/html";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n\r\n";

/// Wrap a JPEG payload as one multipart part
///
/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<payload>\r\n\r\n`
pub fn jpeg_part(payload: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + payload.len() + PART_TRAILER.len());
    part.put_slice(PART_HEADER);
    part.put_slice(payload);
    part.put_slice(PART_TRAILER);
    part.freeze()
}

/// Wrap one diagnostic sample: `<strong><output></strong><br>\n`
pub fn html_line(output: &[u8]) -> Bytes {
    let mut line = BytesMut::with_capacity(output.len() + 22);
    line.put_slice(b"<strong>");
    line.put_slice(output);
    line.put_slice(b"</strong><br>\n");
    line.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_part_layout() {
        let part = jpeg_part(b"\xFF\xD8jpeg");
        assert_eq!(
            part.as_ref(),
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8jpeg\r\n\r\n".as_slice()
        );
        assert!(MULTIPART_CONTENT_TYPE.ends_with(&format!("boundary={BOUNDARY}")));
    }

    #[test]
    fn html_line_layout() {
        assert_eq!(html_line(b"up 3 days\n").as_ref(), b"<strong>up 3 days\n</strong><br>\n".as_slice());
    }
}
