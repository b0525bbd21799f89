use regex::Regex;
use std::sync::LazyLock;

pub const TITLE_CHARS: usize = 30;
pub const VIDEO_EXTENSION: &str = "mp4";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1F]"#).expect("filename regex is valid"));

/// Output filename for a post: its title cut to 30 characters, or a 1-based index when
/// the title is blank.
pub fn output_name(title: &str, index: usize) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return format!("reddit_video_{}.{}", index + 1, VIDEO_EXTENSION);
    }
    let truncated: String = trimmed.chars().take(TITLE_CHARS).collect();
    let safe = UNSAFE_FILENAME_CHARS.replace_all(truncated.trim_end(), "_");
    // "." and ".." would escape the sink directory
    if safe.chars().all(|c| c == '.') {
        return format!("reddit_video_{}.{}", index + 1, VIDEO_EXTENSION);
    }
    format!("{}.{}", safe, VIDEO_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_title_to_thirty_chars() {
        let name = output_name("This title is definitely longer than thirty characters", 0);
        assert_eq!(name, "This title is definitely longe.mp4");
        assert_eq!(name.chars().count(), TITLE_CHARS + ".mp4".len());
    }

    #[test]
    fn blank_title_falls_back_to_index() {
        assert_eq!(output_name("   ", 0), "reddit_video_1.mp4");
        assert_eq!(output_name("", 6), "reddit_video_7.mp4");
        assert_eq!(output_name("..", 2), "reddit_video_3.mp4");
    }

    #[test]
    fn replaces_path_separators() {
        assert_eq!(output_name("AC/DC: live?", 0), "AC_DC_ live_.mp4");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let name = output_name(&"é".repeat(40), 0);
        assert_eq!(name, format!("{}.mp4", "é".repeat(30)));
    }
}
