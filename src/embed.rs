//! Embeddable video recognition.
//!
//! Works purely on the URL. It never adds a host to fetch: thumbnail and embed
//! links are only strings handed to the caller.

use crate::VideoEmbed;
use url::Url;

const MAX_VIDEO_ID_LEN: usize = 64;

fn is_youtube_host(host: &str) -> bool {
    host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtube-nocookie.com"
        || host.ends_with(".youtube-nocookie.com")
}

fn valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_VIDEO_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extracts a YouTube video ID from the supported URL shapes:
/// `youtube.com/watch?v=ID`, `youtu.be/ID`, `/embed/ID`, `/v/ID`, `/shorts/ID`.
pub fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let id = if host == "youtu.be" || host == "www.youtu.be" {
        segments.next()?.to_string()
    } else if is_youtube_host(&host) {
        match segments.next()? {
            "watch" => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned())?,
            "embed" | "v" | "shorts" => segments.next()?.to_string(),
            _ => return None,
        }
    } else {
        return None;
    };

    valid_video_id(&id).then_some(id)
}

pub fn video_embed(url: &Url) -> Option<VideoEmbed> {
    let video_id = youtube_video_id(url)?;

    Some(VideoEmbed {
        embed_url: format!("https://www.youtube.com/embed/{video_id}"),
        thumbnail_url: format!("https://img.youtube.com/vi/{video_id}/hqdefault.jpg"),
        image_url: format!("https://img.youtube.com/vi/{video_id}/maxresdefault.jpg"),
        video_id,
    })
}
