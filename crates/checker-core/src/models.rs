use chrono::NaiveDate;

/// A single comic as published by the remote API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comic {
    pub num: u32,
    pub title: String,
    pub img: String,
    pub alt: String,
    pub published: Option<NaiveDate>,
}

impl Comic {
    pub fn new(
        num: u32,
        title: impl Into<String>,
        img: impl Into<String>,
        alt: impl Into<String>,
    ) -> Self {
        Self {
            num,
            title: title.into(),
            img: img.into(),
            alt: alt.into(),
            published: None,
        }
    }

    pub fn with_published(mut self, date: NaiveDate) -> Self {
        self.published = Some(date);
        self
    }

    /// Archive filename: `{num}-{image basename}`, e.g. `1632-ghostbusters.png`
    pub fn local_filename(&self) -> String {
        let basename = url::Url::parse(&self.img)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "comic".to_string());

        format!("{}-{}", self.num, basename)
    }

    /// Date formatted the way it appears in the mail subject ("Mon 07 Oct 24")
    pub fn published_str(&self) -> Option<String> {
        self.published
            .map(|date| date.format("%a %d %b %y").to_string())
    }
}
