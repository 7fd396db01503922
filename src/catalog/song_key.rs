//! The composite `title---artist` key used by stores that keep a single
//! string per song.

/// Separator of key scheme v1.
pub const KEY_SEPARATOR: &str = "---";

/// Artist reported when a key carries no separator.
pub const UNKNOWN_ARTIST: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongKey {
    pub title: String,
    pub artist: String,
}

impl SongKey {
    /// Parses a v1 key, splitting at the first separator.
    ///
    /// A key without separator is taken as a bare title by an unknown artist.
    pub fn parse(key: &str) -> Self {
        match key.split_once(KEY_SEPARATOR) {
            Some((title, artist)) => {
                let artist = artist.trim();
                Self {
                    title: title.trim().to_string(),
                    artist: if artist.is_empty() {
                        UNKNOWN_ARTIST.to_string()
                    } else {
                        artist.to_string()
                    },
                }
            }
            None => Self {
                title: key.trim().to_string(),
                artist: UNKNOWN_ARTIST.to_string(),
            },
        }
    }

    pub fn compose(title: &str, artist: &str) -> String {
        format!("{}{}{}", title, KEY_SEPARATOR, artist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_title_and_artist() {
        let key = SongKey::parse("Bohemian Rhapsody---Queen");
        assert_eq!(key.title, "Bohemian Rhapsody");
        assert_eq!(key.artist, "Queen");
    }

    #[test]
    fn test_parse_without_separator_defaults_artist() {
        let key = SongKey::parse("Untitled demo");
        assert_eq!(key.title, "Untitled demo");
        assert_eq!(key.artist, UNKNOWN_ARTIST);
    }

    #[test]
    fn test_parse_splits_at_first_separator() {
        let key = SongKey::parse("A---B---C");
        assert_eq!(key.title, "A");
        assert_eq!(key.artist, "B---C");
    }

    #[test]
    fn test_parse_empty_artist_is_unknown() {
        assert_eq!(SongKey::parse("Title---").artist, UNKNOWN_ARTIST);
    }

    #[test]
    fn test_compose_then_parse() {
        let composed = SongKey::compose("Song", "Artist");
        assert_eq!(composed, "Song---Artist");
        assert_eq!(
            SongKey::parse(&composed),
            SongKey {
                title: "Song".into(),
                artist: "Artist".into()
            }
        );
    }
}
