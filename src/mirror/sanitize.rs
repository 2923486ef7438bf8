use unicode_normalization::UnicodeNormalization;

/// Used when an album name has no usable characters left.
pub const PLACEHOLDER_ALBUM_NAME: &str = "Untitled Album";

const MAX_ALBUM_DIR_CHARS: usize = 100;

/// Well under the usual 255-byte NAME_MAX; NFD can triple the size of Hangul.
const MAX_ALBUM_DIR_BYTES: usize = 200;

/// Turn an album name into a single safe directory name.
///
/// Decomposes Unicode first, so accented letters keep their base letter
/// ("Éclair" becomes "Eclair") while separators and punctuation are dropped.
pub fn album_dir_name(name: &str) -> String {
    let kept: String = name
        .nfd()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_' || *c == '-')
        .collect();

    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut truncated = String::new();
    for c in collapsed.chars().take(MAX_ALBUM_DIR_CHARS) {
        if truncated.len() + c.len_utf8() > MAX_ALBUM_DIR_BYTES {
            break;
        }
        truncated.push(c);
    }
    let trimmed = truncated.trim();

    if trimmed.is_empty() {
        PLACEHOLDER_ALBUM_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_separators_and_punctuation() {
        assert_eq!(album_dir_name("Trip/Éclair: 2020!!"), "TripEclair 2020");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(album_dir_name("  Summer \t  Holiday  "), "Summer Holiday");
    }

    #[test]
    fn test_keeps_underscore_and_hyphen() {
        assert_eq!(album_dir_name("road_trip-2021"), "road_trip-2021");
    }

    #[test]
    fn test_keeps_non_latin_letters() {
        assert_eq!(album_dir_name("東京 2019"), "東京 2019");
    }

    #[test]
    fn test_empty_names_get_placeholder() {
        assert_eq!(album_dir_name(""), PLACEHOLDER_ALBUM_NAME);
        assert_eq!(album_dir_name("!!! ///"), PLACEHOLDER_ALBUM_NAME);
    }

    #[test]
    fn test_long_names_are_truncated() {
        let name = "a".repeat(250);
        assert_eq!(album_dir_name(&name).chars().count(), 100);
    }

    #[test]
    fn test_multibyte_names_fit_in_a_directory_entry() {
        let cjk = album_dir_name(&"東京".repeat(50));
        assert!(cjk.len() <= MAX_ALBUM_DIR_BYTES);
        assert_eq!(cjk.chars().count(), MAX_ALBUM_DIR_BYTES / 3);

        // Each precomposed syllable decomposes into three 3-byte jamo.
        let hangul = album_dir_name(&"한국".repeat(50));
        assert!(hangul.len() <= MAX_ALBUM_DIR_BYTES);
        assert!(!hangul.is_empty());
    }

    #[test]
    fn test_no_path_separators_survive() {
        let dir = album_dir_name("../../etc");
        assert!(!dir.contains('/'));
        assert!(!dir.contains(".."));
    }
}
