use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::Comic;

const PROJECT_URL: &str = "https://github.com/bryanhiestand/xkcd_checker";

/// Rendered mail content, shared by every delivery backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachment: Option<Attachment>,
}

/// Archived comic image sent alongside the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            Error::Delivery(format!(
                "Failed to read attachment {}: {}",
                path.display(),
                e
            ))
        })?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("comic")
            .to_string();

        Ok(Self {
            content_type: content_type_for(&filename).to_string(),
            filename,
            data,
        })
    }
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

impl Message {
    pub fn render(comic: &Comic) -> Self {
        let subject = match comic.published_str() {
            Some(date) => format!("New xkcd {}: {} from {}", comic.num, comic.title, date),
            None => format!("New xkcd {}: {}", comic.num, comic.title),
        };

        let text = format!("{}: {}\n\n{}\n", comic.title, comic.img, comic.alt);

        let title = escape_html(&comic.title);
        let alt = escape_html(&comic.alt);
        let img = escape_html(&comic.img);

        let mut html = String::new();
        html.push_str("<html><body>\n");
        html.push_str("<h1>\n");
        html.push_str(&format!(
            "<a href=\"{img}\">{title}<img title=\"{alt}\" alt=\"{alt}\" style=\"display:block\" src=\"{img}\" /></a>\n"
        ));
        html.push_str("</h1>\n");
        html.push_str(&format!("<p><em>{alt}</em></p>\n"));
        html.push_str("<br>\n");
        html.push_str(&format!(
            "Mailed by <a href=\"{PROJECT_URL}\">xkcd-checker</a>\n"
        ));
        html.push_str("</body></html>\n");

        Self {
            subject,
            text,
            html,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn comic() -> Comic {
        Comic::new(
            1632,
            "Ghostbusters",
            "https://imgs.xkcd.com/comics/ghostbusters.png",
            "I tried to fight it but it was no use.",
        )
    }

    #[test]
    fn test_subject_without_date() {
        let message = Message::render(&comic());
        assert_eq!(message.subject, "New xkcd 1632: Ghostbusters");
    }

    #[test]
    fn test_subject_with_date() {
        let date = NaiveDate::from_ymd_opt(2016, 3, 4).unwrap();
        let message = Message::render(&comic().with_published(date));
        assert_eq!(message.subject, "New xkcd 1632: Ghostbusters from Fri 04 Mar 16");
    }

    #[test]
    fn test_text_body_has_image_and_alt() {
        let message = Message::render(&comic());
        assert!(message
            .text
            .starts_with("Ghostbusters: https://imgs.xkcd.com/comics/ghostbusters.png"));
        assert!(message.text.contains("I tried to fight it but it was no use."));
    }

    #[test]
    fn test_html_body_embeds_image_and_alt() {
        let message = Message::render(&comic());
        assert!(message
            .html
            .contains("src=\"https://imgs.xkcd.com/comics/ghostbusters.png\""));
        assert!(message
            .html
            .contains("alt=\"I tried to fight it but it was no use.\""));
        assert!(message.html.contains("xkcd-checker</a>"));
    }

    #[test]
    fn test_html_body_escapes_alt_text() {
        let c = Comic::new(327, "Exploits of a Mom", "https://x/y.png", "Her daughter is named <Help I'm \"trapped\">");
        let message = Message::render(&c);
        assert!(message
            .html
            .contains("Her daughter is named &lt;Help I&#39;m &quot;trapped&quot;&gt;"));
        assert!(!message.html.contains("<Help"));
    }

    #[test]
    fn test_escape_html_ampersand() {
        assert_eq!(escape_html("A & B"), "A &amp; B");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("1632-ghostbusters.png"), "image/png");
        assert_eq!(content_type_for("1-barrel_cropped_(1).JPG"), "image/jpeg");
        assert_eq!(content_type_for("5-comic"), "application/octet-stream");
    }

    #[test]
    fn test_attachment_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1632-ghostbusters.png");
        fs::write(&path, b"\x89PNG").unwrap();

        let attachment = Attachment::from_path(&path).unwrap();
        assert_eq!(attachment.filename, "1632-ghostbusters.png");
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(attachment.data, b"\x89PNG");
    }

    #[test]
    fn test_attachment_missing_file_is_delivery_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Attachment::from_path(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
    }
}
