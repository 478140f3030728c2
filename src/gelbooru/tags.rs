//! Rewrites the API's space separated tag string into sidecar text.

use serde::{Deserialize, Serialize};

/// Tags this short are left alone, they are mostly emoticons like `>_<`.
const MIN_REWRITE_LEN: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStyle {
    pub add_comma: bool,
    pub remove_underscore: bool,
    pub use_escape: bool,
}

pub fn process_tags(tags: &str, style: TagStyle) -> String {
    let rewritten: Vec<String> = tags
        .split(' ')
        .filter(|tag| !tag.is_empty())
        .map(|tag| rewrite_tag(tag, style))
        .collect();

    let separator = if style.add_comma { ", " } else { " " };
    rewritten.join(separator)
}

fn rewrite_tag(tag: &str, style: TagStyle) -> String {
    if tag.chars().count() < MIN_REWRITE_LEN {
        return tag.to_string();
    }

    let mut tag = tag.to_string();
    if style.remove_underscore {
        tag = tag.replace('_', " ");
    }
    if style.use_escape {
        tag = tag.replace('(', "\\(").replace(')', "\\)");
    }
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "long_hair >_< hatsune_miku_(cosplay) smile";

    #[test]
    fn default_style_keeps_tags() {
        assert_eq!(process_tags(RAW, TagStyle::default()), RAW);
    }

    #[test]
    fn every_option_together() {
        let style = TagStyle {
            add_comma: true,
            remove_underscore: true,
            use_escape: true,
        };
        assert_eq!(
            process_tags(RAW, style),
            "long hair, >_<, hatsune miku \\(cosplay\\), smile"
        );
    }

    #[test]
    fn short_tags_are_never_rewritten() {
        let style = TagStyle {
            add_comma: false,
            remove_underscore: true,
            use_escape: true,
        };
        assert_eq!(process_tags("^_^ (x) a_b_c", style), "^_^ (x) a b c");
    }

    #[test]
    fn repeated_spaces_do_not_create_empty_tags() {
        let style = TagStyle {
            add_comma: true,
            ..TagStyle::default()
        };
        assert_eq!(process_tags(" cat  dog ", style), "cat, dog");
    }
}
