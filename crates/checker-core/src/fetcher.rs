use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Comic;

pub const DEFAULT_API_URL: &str = "https://xkcd.com/info.0.json";

/// Source of the most recent comic.
#[async_trait]
pub trait ComicSource {
    async fn fetch_latest(&self) -> Result<Comic>;
}

#[derive(Debug, Deserialize)]
struct XkcdResponse {
    num: u32,
    #[serde(default)]
    safe_title: Option<String>,
    #[serde(default)]
    title: Option<String>,
    img: String,
    alt: String,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    month: Option<String>,
    #[serde(default)]
    day: Option<String>,
}

pub struct XkcdClient {
    client: Client,
    api_url: String,
}

impl XkcdClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("xkcd-checker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl ComicSource for XkcdClient {
    async fn fetch_latest(&self) -> Result<Comic> {
        let response = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("Failed to reach {}: {}", self.api_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(Error::Fetch(format!(
                "Comic API returned error: {} - {}",
                status, error_text
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Fetch(format!("Failed to read comic response: {}", e)))?;

        let comic = parse_comic(&body)?;
        debug!(num = comic.num, title = %comic.title, img = %comic.img, "Fetched latest comic");

        Ok(comic)
    }
}

/// Parse the comic API payload. `num`, a title, `img` and `alt` are required.
pub fn parse_comic(body: &str) -> Result<Comic> {
    let raw: XkcdResponse = serde_json::from_str(body)
        .map_err(|e| Error::Fetch(format!("Failed to parse comic JSON: {}", e)))?;

    if raw.num == 0 {
        return Err(Error::Fetch("Comic number must be positive".to_string()));
    }

    let title = raw
        .safe_title
        .filter(|t| !t.trim().is_empty())
        .or(raw.title)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::Fetch(format!("Comic {} has no title", raw.num)))?;

    if raw.img.trim().is_empty() {
        return Err(Error::Fetch(format!("Comic {} has no image URL", raw.num)));
    }

    let published = match (&raw.year, &raw.month, &raw.day) {
        (Some(y), Some(m), Some(d)) => parse_date(y, m, d),
        _ => None,
    };

    Ok(Comic {
        num: raw.num,
        title,
        img: raw.img,
        alt: raw.alt,
        published,
    })
}

fn parse_date(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    let year = year.trim().parse().ok()?;
    let month = month.trim().parse().ok()?;
    let day = day.trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "month": "3", "num": 1632, "link": "", "year": "2016",
        "news": "", "safe_title": "Ghostbusters",
        "transcript": "", "alt": "I tried to fight it but it was no use.",
        "img": "https://imgs.xkcd.com/comics/ghostbusters.png",
        "title": "Ghostbusters", "day": "4"
    }"#;

    #[test]
    fn test_parse_comic_full_payload() {
        let comic = parse_comic(SAMPLE).unwrap();
        assert_eq!(comic.num, 1632);
        assert_eq!(comic.title, "Ghostbusters");
        assert_eq!(comic.img, "https://imgs.xkcd.com/comics/ghostbusters.png");
        assert_eq!(comic.alt, "I tried to fight it but it was no use.");
        assert_eq!(comic.published, NaiveDate::from_ymd_opt(2016, 3, 4));
    }

    #[test]
    fn test_parse_comic_prefers_safe_title() {
        let body = r#"{"num": 259, "safe_title": "Clichéd Exchanges",
            "title": "Clich&eacute;d Exchanges", "img": "https://x/y.png", "alt": "a"}"#;
        let comic = parse_comic(body).unwrap();
        assert_eq!(comic.title, "Clichéd Exchanges");
        assert_eq!(comic.published, None);
    }

    #[test]
    fn test_parse_comic_falls_back_to_title() {
        let body = r#"{"num": 7, "title": "Girl Sleeping", "img": "https://x/y.png", "alt": "a"}"#;
        assert_eq!(parse_comic(body).unwrap().title, "Girl Sleeping");
    }

    #[test]
    fn test_parse_comic_missing_img_is_fetch_error() {
        let body = r#"{"num": 7, "title": "Girl Sleeping", "alt": "a"}"#;
        assert!(matches!(parse_comic(body), Err(Error::Fetch(_))));
    }

    #[test]
    fn test_parse_comic_missing_alt_is_fetch_error() {
        let body = r#"{"num": 7, "title": "Girl Sleeping", "img": "https://x/y.png"}"#;
        assert!(matches!(parse_comic(body), Err(Error::Fetch(_))));
    }

    #[test]
    fn test_parse_comic_missing_title_is_fetch_error() {
        let body = r#"{"num": 7, "img": "https://x/y.png", "alt": "a"}"#;
        assert!(matches!(parse_comic(body), Err(Error::Fetch(_))));
    }

    #[test]
    fn test_parse_comic_rejects_zero() {
        let body = r#"{"num": 0, "title": "t", "img": "https://x/y.png", "alt": "a"}"#;
        assert!(matches!(parse_comic(body), Err(Error::Fetch(_))));
    }

    #[test]
    fn test_parse_comic_invalid_json() {
        assert!(matches!(parse_comic("<html>"), Err(Error::Fetch(_))));
    }

    #[test]
    fn test_parse_comic_bad_date_is_ignored() {
        let body = r#"{"num": 9, "title": "t", "img": "https://x/y.png", "alt": "a",
            "year": "2006", "month": "13", "day": "1"}"#;
        assert_eq!(parse_comic(body).unwrap().published, None);
    }

    #[tokio::test]
    async fn test_fetch_latest_from_local_api() {
        let base = crate::test_support::serve_once("200 OK", SAMPLE);
        let client = XkcdClient::new(format!("{base}/info.0.json")).unwrap();

        let comic = client.fetch_latest().await.unwrap();
        assert_eq!(comic.num, 1632);
        assert_eq!(comic.title, "Ghostbusters");
    }

    #[tokio::test]
    async fn test_fetch_latest_server_error_is_fetch_error() {
        let base = crate::test_support::serve_once("503 Service Unavailable", "{}");
        let client = XkcdClient::new(format!("{base}/info.0.json")).unwrap();

        let err = client.fetch_latest().await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_latest_unreachable_is_fetch_error() {
        let port = crate::test_support::closed_port();
        let client = XkcdClient::new(format!("http://127.0.0.1:{port}/info.0.json")).unwrap();

        let err = client.fetch_latest().await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert!(err.to_string().contains("Failed to reach"));
    }
}
