//! Provider detection for video and embed URLs.
//!
//! Known providers get a Hugo shortcode (built into Hugo, so every theme
//! renders them) or the provider's own iframe. Anything else becomes a
//! generic lazy iframe.

use super::escape_attr;
use regex::Regex;
use std::sync::LazyLock;

static YOUTUBE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|embed/|shorts/|live/)|youtu\.be/)([A-Za-z0-9_-]{6,})",
    )
    .expect("youtube pattern is valid")
});

static VIMEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"vimeo\.com/(?:video/|channels/[^/]+/)?(\d+)").expect("vimeo pattern is valid")
});

static TWEET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|//|\.)(?:twitter|x)\.com/([A-Za-z0-9_]+)/status(?:es)?/(\d+)")
        .expect("tweet pattern is valid")
});

static GIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"gist\.github\.com/([A-Za-z0-9_-]+)/([0-9a-fA-F]+)").expect("gist pattern is valid")
});

static CODEPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"codepen\.io/([A-Za-z0-9_-]+)/(?:pen|full|details|embed)/([A-Za-z0-9]+)")
        .expect("codepen pattern is valid")
});

static CODESANDBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"codesandbox\.io/(?:s|embed|p/sandbox)/([A-Za-z0-9_-]+)")
        .expect("codesandbox pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    YouTube(String),
    Vimeo(String),
    Tweet { user: String, id: String },
    Gist { user: String, id: String },
    CodePen { user: String, id: String },
    CodeSandbox(String),
}

impl Provider {
    pub fn markup(&self) -> String {
        match self {
            Provider::YouTube(id) => format!("{{{{< youtube \"{id}\" >}}}}"),
            Provider::Vimeo(id) => format!("{{{{< vimeo \"{id}\" >}}}}"),
            Provider::Tweet { user, id } => {
                format!("{{{{< tweet user=\"{user}\" id=\"{id}\" >}}}}")
            }
            Provider::Gist { user, id } => format!("{{{{< gist {user} {id} >}}}}"),
            Provider::CodePen { user, id } => format!(
                "<iframe src=\"https://codepen.io/{user}/embed/{id}?default-tab=result\" style=\"width:100%; height:400px;\" loading=\"lazy\"></iframe>"
            ),
            Provider::CodeSandbox(id) => format!(
                "<iframe src=\"https://codesandbox.io/embed/{id}\" style=\"width:100%; height:500px; border:0;\" loading=\"lazy\"></iframe>"
            ),
        }
    }
}

/// Video hosts with a player shortcode.
pub fn detect_video(url: &str) -> Option<Provider> {
    if let Some(c) = YOUTUBE.captures(url) {
        return Some(Provider::YouTube(c[1].to_string()));
    }
    VIMEO
        .captures(url)
        .map(|c| Provider::Vimeo(c[1].to_string()))
}

/// Any known embed provider.
pub fn detect(url: &str) -> Option<Provider> {
    if let Some(c) = TWEET.captures(url) {
        return Some(Provider::Tweet {
            user: c[1].to_string(),
            id: c[2].to_string(),
        });
    }
    if let Some(c) = GIST.captures(url) {
        return Some(Provider::Gist {
            user: c[1].to_string(),
            id: c[2].to_string(),
        });
    }
    if let Some(c) = CODEPEN.captures(url) {
        return Some(Provider::CodePen {
            user: c[1].to_string(),
            id: c[2].to_string(),
        });
    }
    if let Some(c) = CODESANDBOX.captures(url) {
        return Some(Provider::CodeSandbox(c[1].to_string()));
    }
    detect_video(url)
}

/// Markup for an embed block.
pub fn embed_markup(url: &str) -> String {
    match detect(url) {
        Some(provider) => provider.markup(),
        None => format!(
            "<iframe src=\"{}\" style=\"width:100%; height:400px;\" loading=\"lazy\"></iframe>",
            escape_attr(url)
        ),
    }
}
